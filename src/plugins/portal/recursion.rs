//! Recursive portal view rendering.
//!
//! Looking through a portal shows the scene from a virtual camera sitting behind the other
//! portal, which may itself show a portal, and so on. The recursion is unrolled into a fixed
//! number of levels rendered deepest first, each level reading the textures produced by the
//! previous (deeper) one. Every portal owns two offscreen buffers used as a ping-pong pair so
//! that a pass never samples the buffer it writes to.

use bevy::prelude::*;

use super::{
    geometry::teleport,
    pair::{PortalId, PortalPair},
};

/// Opaque handle of an offscreen color buffer owned by the `SceneRenderer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassTarget {
    Display,
    Buffer(BufferHandle),
}

/// How a portal quad appears in a given pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceParams {
    pub visible: bool,
    pub texture: BufferHandle,
}

/// Everything a scene draw depends on. Nothing else is read by the renderer.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawParams {
    pub camera: Transform,
    pub target: PassTarget,
    pub width: u32,
    pub height: u32,
    /// World space plane, only what is in front of it (`plane · p >= 0`) is drawn.
    pub clip_plane: Option<Vec4>,
    pub surfaces: [SurfaceParams; 2],
}

/// Rendering backend used by `RecursivePortalRenderer`.
pub trait SceneRenderer {
    fn create_buffer(&mut self, width: u32, height: u32) -> BufferHandle;
    fn resize_buffer(&mut self, buffer: BufferHandle, width: u32, height: u32);
    fn draw_scene(&mut self, params: &DrawParams);
}

/// Two buffers and the index of the one currently shown on the portal quad.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceBuffers {
    slots: [BufferHandle; 2],
    current: usize,
}

impl SurfaceBuffers {
    pub fn new<R: SceneRenderer>(renderer: &mut R, width: u32, height: u32) -> SurfaceBuffers {
        let slots = [
            renderer.create_buffer(width, height),
            renderer.create_buffer(width, height),
        ];
        assert_ne!(slots[0], slots[1], "renderer handed out the same buffer twice");
        SurfaceBuffers { slots, current: 0 }
    }

    /// Buffer sampled by the portal quad.
    pub fn current(&self) -> BufferHandle {
        self.slots[self.current]
    }

    /// Buffer the next pass for this portal renders into.
    pub fn next(&self) -> BufferHandle {
        self.slots[self.current ^ 1]
    }

    pub fn slots(&self) -> [BufferHandle; 2] {
        self.slots
    }

    pub fn flip(&mut self) {
        self.current ^= 1;
    }
}

/// Inputs of one frame.
pub struct FrameContext<'a, R: SceneRenderer> {
    pub camera: Transform,
    pub pair: &'a PortalPair,
    pub width: u32,
    pub height: u32,
    pub renderer: &'a mut R,
}

#[derive(Debug)]
pub struct RecursivePortalRenderer {
    levels: usize,
    buffers: [SurfaceBuffers; 2],
    size: UVec2,
}

impl RecursivePortalRenderer {
    /// `levels` counts the real camera, so `levels - 1` clipped passes run per portal.
    pub fn new<R: SceneRenderer>(
        levels: usize,
        renderer: &mut R,
        width: u32,
        height: u32,
    ) -> RecursivePortalRenderer {
        assert!(levels >= 1, "portal recursion needs at least one level");
        let buffers = [
            SurfaceBuffers::new(renderer, width, height),
            SurfaceBuffers::new(renderer, width, height),
        ];
        RecursivePortalRenderer {
            levels,
            buffers,
            size: UVec2::new(width, height),
        }
    }

    pub fn levels(&self) -> usize {
        self.levels
    }

    /// Number of clipped passes per frame, excluding the final on-screen pass.
    pub fn intermediate_passes(&self) -> usize {
        2 * (self.levels - 1)
    }

    pub fn buffers(&self, id: PortalId) -> &SurfaceBuffers {
        &self.buffers[id.index()]
    }

    pub fn size(&self) -> UVec2 {
        self.size
    }

    /// Virtual camera poses seen through portal `through`: the real camera first, then one
    /// more trip through the portal per level.
    pub fn virtual_poses(&self, camera: &Transform, through: PortalId, pair: &PortalPair) -> Vec<Transform> {
        let mut poses = Vec::with_capacity(self.levels);
        poses.push(*camera);
        for k in 1..self.levels {
            poses.push(teleport(&poses[k - 1], through, pair));
        }
        poses
    }

    /// Render one frame: every recursion level into the portal buffers, deepest first, then the
    /// real camera view to the display.
    pub fn render<R: SceneRenderer>(&mut self, ctx: FrameContext<R>) {
        let FrameContext {
            camera,
            pair,
            width,
            height,
            renderer,
        } = ctx;

        self.fit_buffers(renderer, width, height);

        let poses = PortalId::ALL.map(|id| self.virtual_poses(&camera, id, pair));
        let clip_planes = PortalId::ALL.map(|id| pair.counterpart(id).surface_plane());

        for level in (1..self.levels).rev() {
            for id in PortalId::ALL {
                // The virtual camera looks out of the counterpart, whose quad would cover the
                // whole view.
                let mut surfaces = self.surfaces();
                surfaces[id.counterpart().index()].visible = false;

                let target = self.buffers[id.index()].next();
                debug_assert!(
                    surfaces.iter().all(|s| s.texture != target),
                    "pass for {id:?} samples its own render target"
                );
                renderer.draw_scene(&DrawParams {
                    camera: poses[id.index()][level],
                    target: PassTarget::Buffer(target),
                    width,
                    height,
                    clip_plane: clip_planes[id.index()],
                    surfaces,
                });
            }
            for buffers in &mut self.buffers {
                buffers.flip();
            }
        }

        renderer.draw_scene(&DrawParams {
            camera,
            target: PassTarget::Display,
            width,
            height,
            clip_plane: None,
            surfaces: self.surfaces(),
        });
    }

    fn surfaces(&self) -> [SurfaceParams; 2] {
        PortalId::ALL.map(|id| SurfaceParams {
            visible: true,
            texture: self.buffers[id.index()].current(),
        })
    }

    /// Keep the offscreen buffers the size of the display.
    fn fit_buffers<R: SceneRenderer>(&mut self, renderer: &mut R, width: u32, height: u32) {
        let size = UVec2::new(width, height);
        if self.size == size {
            return;
        }
        debug!(
            "Resizing portal buffers from {}x{} to {}x{}",
            self.size.x, self.size.y, width, height
        );
        for buffers in &self.buffers {
            for slot in buffers.slots() {
                renderer.resize_buffer(slot, width, height);
            }
        }
        self.size = size;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::plugins::portal::{geometry::teleport, pair::PortalPlacement};

    /// Renderer which only remembers what it was asked to do.
    #[derive(Debug, Default)]
    struct RecordingRenderer {
        sizes: HashMap<BufferHandle, UVec2>,
        passes: Vec<DrawParams>,
        resizes: usize,
    }

    impl SceneRenderer for RecordingRenderer {
        fn create_buffer(&mut self, width: u32, height: u32) -> BufferHandle {
            let handle = BufferHandle(self.sizes.len());
            self.sizes.insert(handle, UVec2::new(width, height));
            handle
        }

        fn resize_buffer(&mut self, buffer: BufferHandle, width: u32, height: u32) {
            self.resizes += 1;
            self.sizes.insert(buffer, UVec2::new(width, height));
        }

        fn draw_scene(&mut self, params: &DrawParams) {
            self.passes.push(params.clone());
        }
    }

    fn pair() -> PortalPair {
        let a = Transform::from_xyz(0., 1., -10.).looking_at(Vec3::new(0., 1., -11.), Vec3::Y);
        let b = Transform::from_xyz(10., 1., 0.).looking_at(Vec3::new(11., 1., 0.), Vec3::Y);
        PortalPair::new([
            PortalPlacement::new(a, 1.5, 2., 2.),
            PortalPlacement::new(b, 1.5, 2., 2.),
        ])
    }

    fn camera() -> Transform {
        Transform::from_xyz(-2., 1.7, 4.).looking_at(Vec3::new(0., 1., -10.), Vec3::Y)
    }

    fn render_frame(levels: usize) -> (RecursivePortalRenderer, RecordingRenderer) {
        let mut backend = RecordingRenderer::default();
        let mut renderer = RecursivePortalRenderer::new(levels, &mut backend, 1280, 720);
        let pair = pair();
        renderer.render(FrameContext {
            camera: camera(),
            pair: &pair,
            width: 1280,
            height: 720,
            renderer: &mut backend,
        });
        (renderer, backend)
    }

    #[test]
    fn poses_count_matches_levels() {
        let mut backend = RecordingRenderer::default();
        let renderer = RecursivePortalRenderer::new(7, &mut backend, 4, 4);
        let pair = pair();
        for id in PortalId::ALL {
            let poses = renderer.virtual_poses(&camera(), id, &pair);
            assert_eq!(poses.len(), 7);
            assert_eq!(poses[0], camera());
            assert_eq!(poses[2], teleport(&poses[1], id, &pair));
        }
    }

    #[test]
    fn seven_levels_render_twelve_clipped_passes() {
        let (renderer, backend) = render_frame(7);
        assert_eq!(renderer.intermediate_passes(), 12);
        assert_eq!(backend.passes.len(), 13);
        assert_eq!(
            backend
                .passes
                .iter()
                .filter(|p| p.clip_plane.is_some())
                .count(),
            12
        );
    }

    #[test]
    fn three_levels_render_five_scene_draws() {
        let (_, backend) = render_frame(3);
        assert_eq!(backend.passes.len(), 5);
        let last = backend.passes.last().unwrap();
        assert_eq!(last.target, PassTarget::Display);
        assert_eq!(last.clip_plane, None);
        assert!(last.surfaces.iter().all(|s| s.visible));
        assert_eq!(last.camera, camera());
    }

    #[test]
    fn single_level_only_renders_the_display() {
        let (_, backend) = render_frame(1);
        assert_eq!(backend.passes.len(), 1);
        assert_eq!(backend.passes[0].target, PassTarget::Display);
    }

    #[test]
    fn deepest_level_renders_first() {
        let pair = pair();
        let (renderer, backend) = render_frame(4);
        let poses_a = renderer.virtual_poses(&camera(), PortalId::A, &pair);
        let poses_b = renderer.virtual_poses(&camera(), PortalId::B, &pair);
        let cameras: Vec<_> = backend.passes.iter().map(|p| p.camera).collect();
        assert_eq!(
            cameras,
            vec![
                poses_a[3], poses_b[3], poses_a[2], poses_b[2], poses_a[1], poses_b[1],
                camera()
            ]
        );
    }

    #[test]
    fn passes_clip_at_the_counterpart_and_hide_it() {
        let pair = pair();
        let (renderer, backend) = render_frame(3);
        let slots_a = renderer.buffers(PortalId::A).slots();
        for pass in &backend.passes[..4] {
            let PassTarget::Buffer(target) = pass.target else {
                panic!("intermediate pass rendered to the display");
            };
            let id = if slots_a.contains(&target) {
                PortalId::A
            } else {
                PortalId::B
            };
            assert_eq!(pass.clip_plane, pair.counterpart(id).surface_plane());
            assert!(pass.surfaces[id.index()].visible);
            assert!(!pass.surfaces[id.counterpart().index()].visible);
        }
    }

    #[test]
    fn no_pass_samples_its_own_target() {
        let (renderer, backend) = render_frame(7);
        for pass in &backend.passes {
            if let PassTarget::Buffer(target) = pass.target {
                assert!(pass.surfaces.iter().all(|s| s.texture != target));
            }
        }
        for id in PortalId::ALL {
            let buffers = renderer.buffers(id);
            assert_ne!(buffers.current(), buffers.next());
        }
    }

    #[test]
    fn each_level_samples_what_the_previous_level_wrote() {
        let (_, backend) = render_frame(4);
        for level in 1..backend.passes.len() / 2 {
            let previous = &backend.passes[2 * (level - 1)..2 * level];
            let current = &backend.passes[2 * level..2 * level + 2];
            for (before, now) in previous.iter().zip(current) {
                let PassTarget::Buffer(written) = before.target else {
                    unreachable!()
                };
                assert!(now.surfaces.iter().any(|s| s.texture == written));
            }
        }
        // The display shows the shallowest level.
        let display = backend.passes.last().unwrap();
        for before in &backend.passes[4..6] {
            let PassTarget::Buffer(written) = before.target else {
                unreachable!()
            };
            assert!(display.surfaces.iter().any(|s| s.texture == written));
        }
    }

    #[test]
    fn flip_alternates_slots() {
        let mut backend = RecordingRenderer::default();
        let mut buffers = SurfaceBuffers::new(&mut backend, 2, 2);
        let (current, next) = (buffers.current(), buffers.next());
        assert_ne!(current, next);
        buffers.flip();
        assert_eq!(buffers.current(), next);
        assert_eq!(buffers.next(), current);
        buffers.flip();
        assert_eq!(buffers.current(), current);
    }

    #[test]
    fn stale_buffers_are_resized_before_rendering() {
        let mut backend = RecordingRenderer::default();
        let mut renderer = RecursivePortalRenderer::new(3, &mut backend, 640, 480);
        let pair = pair();
        renderer.render(FrameContext {
            camera: camera(),
            pair: &pair,
            width: 800,
            height: 600,
            renderer: &mut backend,
        });
        assert_eq!(backend.resizes, 4);
        assert!(backend.sizes.values().all(|s| *s == UVec2::new(800, 600)));
        assert_eq!(renderer.size(), UVec2::new(800, 600));
        assert!(backend.passes.iter().all(|p| p.width == 800 && p.height == 600));

        renderer.render(FrameContext {
            camera: camera(),
            pair: &pair,
            width: 800,
            height: 600,
            renderer: &mut backend,
        });
        assert_eq!(backend.resizes, 4);
    }
}
