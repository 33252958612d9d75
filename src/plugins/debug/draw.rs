use bevy::{math::Vec4Swizzles, prelude::*, render::camera::CameraProjection};
use bevy_prototype_debug_lines::DebugLines;

use crate::plugins::portal::{
    OpenPortals, PortalCameraProjection, PortalPassCamera, TriggerVolume, PORTAL_RIM_COLORS,
};

const NORMAL_LENGTH: f32 = 0.5;
/// NDC depth the frusta are drawn down to. Reverse-Z puts infinity at 0.
const FRUSTUM_FAR_DEPTH: f32 = 0.02;

/// What gets drawn, toggled with F1 (trigger volumes), F2 (surface normals) and F3 (pass
/// camera frusta).
#[derive(Debug, Resource)]
pub struct PortalDebugDraw {
    pub trigger_volumes: bool,
    pub surface_normals: bool,
    pub pass_frusta: bool,
}

impl Default for PortalDebugDraw {
    fn default() -> Self {
        PortalDebugDraw {
            trigger_volumes: true,
            surface_normals: true,
            pass_frusta: false,
        }
    }
}

#[derive(Debug)]
pub struct PortalDebugDrawPlugin;

impl Plugin for PortalDebugDrawPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<PortalDebugDraw>()
            .add_system(toggle_debug_draw)
            .add_system(draw_portal_debug.after(toggle_debug_draw));
    }
}

fn toggle_debug_draw(keys: Res<Input<KeyCode>>, mut draw: ResMut<PortalDebugDraw>) {
    if keys.just_pressed(KeyCode::F1) {
        draw.trigger_volumes = !draw.trigger_volumes;
    }
    if keys.just_pressed(KeyCode::F2) {
        draw.surface_normals = !draw.surface_normals;
    }
    if keys.just_pressed(KeyCode::F3) {
        draw.pass_frusta = !draw.pass_frusta;
    }
}

fn draw_portal_debug(
    draw: Res<PortalDebugDraw>,
    portals: Res<OpenPortals>,
    cameras: Query<(&Camera, &Transform, &PortalCameraProjection), With<PortalPassCamera>>,
    mut lines: ResMut<DebugLines>,
) {
    for (id, portal) in portals.iter() {
        let color = PORTAL_RIM_COLORS[id.index()];
        if draw.trigger_volumes {
            draw_trigger_volume(&portal.placement.trigger, color, &mut lines);
        }
        if draw.surface_normals {
            if let Some(plane) = portal.placement.surface_plane() {
                let origin = portal.placement.transform.translation;
                lines.line_colored(origin, origin + plane.xyz() * NORMAL_LENGTH, 0., color);
            }
        }
    }
    if draw.pass_frusta {
        for (camera, transform, projection) in &cameras {
            if camera.is_active {
                draw_camera_frustum(transform, projection, &mut lines);
            }
        }
    }
}

pub fn draw_trigger_volume(volume: &TriggerVolume, color: Color, lines: &mut DebugLines) {
    const EDGES: [(usize, usize); 12] = [
        (0, 1),
        (1, 2),
        (2, 3),
        (3, 0),
        (4, 5),
        (5, 6),
        (6, 7),
        (7, 4),
        (0, 4),
        (1, 5),
        (2, 6),
        (3, 7),
    ];
    let corners = volume.corners();
    for (a, b) in EDGES {
        lines.line_colored(corners[a], corners[b], 0., color);
    }
}

/// Draw the frustum of a reverse-Z camera, from its (possibly oblique) near plane to
/// `FRUSTUM_FAR_DEPTH`.
pub fn draw_camera_frustum<P: CameraProjection>(
    camera: &Transform,
    projection: &P,
    lines: &mut DebugLines,
) {
    const NEAR_COLOR: Color = Color::BLACK;
    const FAR_COLOR: Color = Color::WHITE;

    let inv_view_projection =
        (projection.get_projection_matrix() * camera.compute_matrix().inverse()).inverse();
    let corner = |x: f32, y: f32, depth: f32| {
        let v = inv_view_projection * Vec4::new(x, y, depth, 1.);
        v.xyz() / v.w
    };
    let rim = [(-1., -1.), (1., -1.), (1., 1.), (-1., 1.)];
    let near = rim.map(|(x, y)| corner(x, y, 1.));
    let far = rim.map(|(x, y)| corner(x, y, FRUSTUM_FAR_DEPTH));

    for i in 0..4 {
        let j = (i + 1) % 4;
        lines.line_gradient(near[i], far[i], 0., NEAR_COLOR, FAR_COLOR);
        lines.line_colored(near[i], near[j], 0., NEAR_COLOR);
        lines.line_colored(far[i], far[j], 0., FAR_COLOR);
    }
}
