//! Bevy side of the portal renderer.
//!
//! Every intermediate pass owns a camera rendering into a portal buffer image, and its own
//! copies of the two portal quads on a render layer only that camera sees. Each frame the
//! planned passes are written into those cameras and quads. Bevy renders cameras by increasing
//! priority, so the deepest pass runs first and the main camera last.

use bevy::{
    prelude::*,
    render::{
        camera::{Projection, RenderTarget},
        render_resource::{
            Extent3d, TextureDescriptor, TextureDimension, TextureFormat, TextureUsages,
        },
        view::RenderLayers,
    },
};

use super::{
    camera_projection::PortalCameraProjection,
    lifecycle::OpenPortals,
    material::PortalSurfaceMaterial,
    pair::PortalId,
    recursion::{
        BufferHandle, DrawParams, FrameContext, PassTarget, RecursivePortalRenderer, SceneRenderer,
    },
    MainCamera, Portal,
};
use crate::config::PortalSettings;

/// Layer of the regular scene geometry, seen by every camera.
pub const SCENE_LAYER: u8 = 0;
/// First layer holding the portal quad copies of an intermediate pass.
pub const FIRST_PASS_LAYER: u8 = 2;

const FALLBACK_SIZE: UVec2 = UVec2::new(1280, 720);

/// Camera of the intermediate pass `index`, in render order.
#[derive(Debug, Default, Component, Clone, Copy, Reflect)]
#[reflect(Component)]
pub struct PortalPassCamera {
    pub index: usize,
}

/// Copy of the quad of portal `id`, only seen by the camera of pass `pass`.
#[derive(Debug, Default, Component, Clone, Copy, Reflect)]
#[reflect(Component)]
pub struct PortalPassSurface {
    pub pass: usize,
    pub id: PortalId,
}

#[derive(Debug, Clone, Copy)]
pub struct PassRig {
    pub camera: Entity,
    pub surfaces: [Entity; 2],
}

#[derive(Debug, Resource)]
pub struct PortalRig {
    pub renderer: RecursivePortalRenderer,
    /// Buffer images, indexed by `BufferHandle`.
    pub targets: Vec<Handle<Image>>,
    /// One material per buffer image.
    pub materials: Vec<Handle<PortalSurfaceMaterial>>,
    pub passes: Vec<PassRig>,
    pub quad: Handle<Mesh>,
}

impl PortalRig {
    pub fn material(&self, buffer: BufferHandle) -> Handle<PortalSurfaceMaterial> {
        debug_assert!(
            buffer.0 < self.materials.len(),
            "no material for portal buffer {:?}",
            buffer
        );
        self.materials.get(buffer.0).cloned().unwrap_or_default()
    }
}

pub fn pass_priority(index: usize, total: usize) -> isize {
    index as isize - total as isize
}

pub fn pass_layer(index: usize) -> u8 {
    FIRST_PASS_LAYER + index as u8
}

pub fn pass_camera_layers(index: usize) -> RenderLayers {
    RenderLayers::from_layers(&[SCENE_LAYER, pass_layer(index)])
}

fn render_target_image(width: u32, height: u32) -> Image {
    let size = Extent3d {
        width,
        height,
        ..default()
    };
    let mut image = Image {
        texture_descriptor: TextureDescriptor {
            label: Some("portal_buffer"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: TextureDimension::D2,
            format: TextureFormat::Bgra8UnormSrgb,
            usage: TextureUsages::TEXTURE_BINDING
                | TextureUsages::COPY_DST
                | TextureUsages::RENDER_ATTACHMENT,
        },
        ..default()
    };
    image.resize(size);
    image
}

/// `SceneRenderer` over bevy images. Draws are recorded, then applied to the pass cameras.
pub struct ImageBackend<'a> {
    images: &'a mut Assets<Image>,
    targets: &'a mut Vec<Handle<Image>>,
    passes: Vec<DrawParams>,
}

impl<'a> ImageBackend<'a> {
    pub fn new(images: &'a mut Assets<Image>, targets: &'a mut Vec<Handle<Image>>) -> Self {
        ImageBackend {
            images,
            targets,
            passes: Vec::new(),
        }
    }

    pub fn into_passes(self) -> Vec<DrawParams> {
        self.passes
    }
}

impl SceneRenderer for ImageBackend<'_> {
    fn create_buffer(&mut self, width: u32, height: u32) -> BufferHandle {
        let handle = self.images.add(render_target_image(width, height));
        self.targets.push(handle);
        BufferHandle(self.targets.len() - 1)
    }

    fn resize_buffer(&mut self, buffer: BufferHandle, width: u32, height: u32) {
        match self
            .targets
            .get(buffer.0)
            .and_then(|handle| self.images.get_mut(handle))
        {
            Some(image) => image.resize(Extent3d {
                width,
                height,
                ..default()
            }),
            None => warn!("Portal buffer {:?} is gone, cannot resize it", buffer),
        }
    }

    fn draw_scene(&mut self, params: &DrawParams) {
        self.passes.push(params.clone());
    }
}

fn display_size(windows: &Windows) -> Option<UVec2> {
    let window = windows.get_primary()?;
    let size = UVec2::new(window.physical_width(), window.physical_height());
    (size.x > 0 && size.y > 0).then_some(size)
}

pub fn setup_portal_rig(
    mut commands: Commands,
    settings: Res<PortalSettings>,
    windows: Res<Windows>,
    mut images: ResMut<Assets<Image>>,
    mut materials: ResMut<Assets<PortalSurfaceMaterial>>,
    mut meshes: ResMut<Assets<Mesh>>,
) {
    let size = display_size(&windows).unwrap_or(FALLBACK_SIZE);
    let mut targets = Vec::new();
    let mut backend = ImageBackend::new(&mut images, &mut targets);
    let renderer =
        RecursivePortalRenderer::new(settings.recursion_levels, &mut backend, size.x, size.y);

    let surface_materials: Vec<_> = targets
        .iter()
        .enumerate()
        .map(|(index, texture)| {
            let owner = PortalId::ALL
                .into_iter()
                .find(|id| renderer.buffers(*id).slots().contains(&BufferHandle(index)))
                .unwrap_or_default();
            materials.add(PortalSurfaceMaterial::for_buffer(texture.clone(), owner))
        })
        .collect();
    let quad = meshes.add(shape::Quad::new(Vec2::ONE).into());

    let total = renderer.intermediate_passes();
    let passes = (0..total)
        .map(|index| {
            let camera = commands
                .spawn((
                    Camera3dBundle {
                        camera: Camera {
                            priority: pass_priority(index, total),
                            is_active: false,
                            ..default()
                        },
                        ..default()
                    },
                    PortalCameraProjection {
                        fov: settings.fov,
                        ..default()
                    },
                    pass_camera_layers(index),
                    PortalPassCamera { index },
                    Name::from(format!("Portal pass camera {index}")),
                ))
                .remove::<Projection>()
                .id();
            let surfaces = PortalId::ALL.map(|id| {
                commands
                    .spawn((
                        MaterialMeshBundle::<PortalSurfaceMaterial> {
                            mesh: quad.clone(),
                            material: surface_materials[0].clone(),
                            visibility: Visibility { is_visible: false },
                            ..default()
                        },
                        RenderLayers::layer(pass_layer(index)),
                        PortalPassSurface { pass: index, id },
                        Name::from(format!("Portal {id:?} surface, pass {index}")),
                    ))
                    .id()
            });
            PassRig { camera, surfaces }
        })
        .collect();

    info!(
        "Portal rig ready: {} levels, {} offscreen passes, {}x{} buffers",
        renderer.levels(),
        total,
        size.x,
        size.y
    );
    commands.insert_resource(PortalRig {
        renderer,
        targets,
        materials: surface_materials,
        passes,
        quad,
    });
}

/// Give freshly opened portals their quad mesh and current surface texture.
pub fn dress_new_portals(
    mut commands: Commands,
    rig: Res<PortalRig>,
    portals: Query<(Entity, &Portal), Without<Handle<Mesh>>>,
) {
    for (entity, portal) in &portals {
        let current = rig.renderer.buffers(portal.id).current();
        commands
            .entity(entity)
            .insert((rig.quad.clone(), rig.material(current)));
    }
}

/// Plan the frame's recursive passes and write them into the pass cameras and quads.
pub fn render_portal_views(
    mut rig: ResMut<PortalRig>,
    portals: Res<OpenPortals>,
    windows: Res<Windows>,
    mut images: ResMut<Assets<Image>>,
    main_camera: Query<
        &GlobalTransform,
        (
            With<MainCamera>,
            Without<PortalPassCamera>,
            Without<PortalPassSurface>,
        ),
    >,
    mut cameras: Query<
        (
            &mut Camera,
            &mut Transform,
            &mut GlobalTransform,
            &mut PortalCameraProjection,
        ),
        (With<PortalPassCamera>, Without<PortalPassSurface>),
    >,
    mut surfaces: Query<
        (
            &mut Transform,
            &mut GlobalTransform,
            &mut Visibility,
            &mut Handle<PortalSurfaceMaterial>,
        ),
        (With<PortalPassSurface>, Without<PortalPassCamera>),
    >,
    mut on_screen: Query<
        (&Portal, &mut Visibility, &mut Handle<PortalSurfaceMaterial>),
        (Without<PortalPassSurface>, Without<PortalPassCamera>),
    >,
) {
    let (pair, camera, size) = match (
        portals.pair(),
        main_camera.get_single(),
        display_size(&windows),
    ) {
        (Some(pair), Ok(camera), Some(size)) => (pair, camera.compute_transform(), size),
        _ => {
            for (mut camera, ..) in &mut cameras {
                if camera.is_active {
                    camera.is_active = false;
                }
            }
            // A lone portal has nothing to show.
            for (_, mut visibility, _) in &mut on_screen {
                visibility.is_visible = false;
            }
            return;
        }
    };

    let rig = &mut *rig;
    let mut backend = ImageBackend::new(&mut images, &mut rig.targets);
    rig.renderer.render(FrameContext {
        camera,
        pair,
        width: size.x,
        height: size.y,
        renderer: &mut backend,
    });
    let passes = backend.into_passes();

    for (index, pass) in passes.iter().enumerate() {
        match pass.target {
            PassTarget::Buffer(buffer) => {
                let (Some(pass_rig), Some(target)) =
                    (rig.passes.get(index), rig.targets.get(buffer.0))
                else {
                    warn!("No camera for portal pass {}", index);
                    continue;
                };
                if let Ok((mut camera, mut transform, mut global, mut projection)) =
                    cameras.get_mut(pass_rig.camera)
                {
                    camera.is_active = true;
                    camera.target = RenderTarget::Image(target.clone());
                    *transform = pass.camera;
                    *global = GlobalTransform::from(pass.camera);
                    projection.clip_at(&pass.camera, pass.clip_plane);
                }
                for (id, entity) in PortalId::ALL.into_iter().zip(pass_rig.surfaces) {
                    if let Ok((mut transform, mut global, mut visibility, mut material)) =
                        surfaces.get_mut(entity)
                    {
                        let quad = pair.get(id).quad_transform();
                        let surface = pass.surfaces[id.index()];
                        *transform = quad;
                        *global = GlobalTransform::from(quad);
                        visibility.is_visible = surface.visible;
                        *material = rig.material(surface.texture);
                    }
                }
            }
            PassTarget::Display => {
                for (portal, mut visibility, mut material) in &mut on_screen {
                    let surface = pass.surfaces[portal.id.index()];
                    visibility.is_visible = surface.visible;
                    *material = rig.material(surface.texture);
                }
            }
        }
    }
}
