use bevy::{
    prelude::*,
    reflect::FromReflect,
    render::{
        camera::{CameraProjectionPlugin, CameraUpdateSystem},
        view::{update_frusta, VisibilitySystems},
    },
    transform::TransformSystem,
};
use iyes_loopless::prelude::*;

mod camera_projection;
mod geometry;
mod lifecycle;
mod material;
mod pair;
mod recursion;
mod rig;
mod teleport;

pub use camera_projection::*;
pub use geometry::*;
pub use lifecycle::*;
pub use material::{PortalSurfaceMaterial, PORTAL_RIM_COLORS};
pub use pair::*;
pub use rig::*;
pub use teleport::*;

use super::physics::PhysicsLabels;
use crate::config::PortalSettings;

/// Layer of the on-screen portal quads, only seen by the main camera.
pub const PORTAL_LAYER: u8 = 1;

#[derive(Debug)]
pub struct PortalPlugin;

/// On-screen quad of an open portal.
#[derive(Debug, Default, Component, Reflect, FromReflect)]
#[reflect(Component)]
pub struct Portal {
    pub id: PortalId,
}

/// Dynamic body which goes through portals, and stops colliding with their host while it does.
#[derive(Debug, Component, Clone, Default, Reflect, FromReflect)]
#[reflect(Component)]
pub struct PortalTraveler;

/// The real camera, looking at the portals.
#[derive(Debug, Component, Clone, Default, Reflect, FromReflect)]
#[reflect(Component)]
pub struct MainCamera;

#[derive(Debug, SystemLabel)]
pub enum PortalLabels {
    PlacePortals,
    ApplyRequests,
    TeleportTravelers,
    RenderViews,
}

impl Plugin for PortalPlugin {
    fn build(&self, app: &mut App) {
        app.add_plugin(MaterialPlugin::<PortalSurfaceMaterial>::default())
            .add_plugin(CameraProjectionPlugin::<PortalCameraProjection>::default())
            .register_type::<Portal>()
            .register_type::<PortalId>()
            .register_type::<PortalTraveler>()
            .register_type::<MainCamera>()
            .register_type::<PortalPassCamera>()
            .register_type::<PortalPassSurface>()
            .register_type::<PortalSurfaceMaterial>()
            .add_event::<PortalRequest>()
            .init_resource::<OpenPortals>()
            .init_resource::<PendingPortals>()
            .add_startup_system(queue_configured_portals)
            .add_startup_system(setup_portal_rig)
            .add_system_set(
                ConditionSet::new()
                    .label(PortalLabels::PlacePortals)
                    .run_if(portals_pending)
                    .with_system(place_configured_portals)
                    .into(),
            )
            .add_system(
                apply_portal_requests
                    .label(PortalLabels::ApplyRequests)
                    .after(PortalLabels::PlacePortals),
            )
            .add_system(dress_new_portals.after(PortalLabels::ApplyRequests))
            .add_system(
                teleport_travelers
                    .label(PortalLabels::TeleportTravelers)
                    .after(PortalLabels::ApplyRequests)
                    .before(PhysicsLabels::UpdateCollisionMasks),
            )
            .add_system_to_stage(
                CoreStage::PostUpdate,
                render_portal_views
                    .label(PortalLabels::RenderViews)
                    .after(TransformSystem::TransformPropagate)
                    .before(CameraUpdateSystem)
                    .before(VisibilitySystems::VisibilityPropagate),
            )
            .add_system_to_stage(
                CoreStage::PostUpdate,
                update_frusta::<PortalCameraProjection>
                    .after(PortalLabels::RenderViews)
                    .after(CameraUpdateSystem)
                    .before(VisibilitySystems::CheckVisibility),
            );
    }
}

fn portals_pending(pending: Res<PendingPortals>) -> bool {
    !pending.placements.is_empty()
}

/// Queue the portals of the settings for placement once the physics world is up.
fn queue_configured_portals(settings: Res<PortalSettings>, mut pending: ResMut<PendingPortals>) {
    pending.placements = PortalId::ALL
        .into_iter()
        .zip(&settings.portal_pair)
        .map(|(id, spec)| {
            let placement = PortalPlacement::new(
                spec.transform(),
                spec.width,
                spec.height,
                settings.trigger_depth,
            );
            (id, placement)
        })
        .collect();
    pending.attempts = 0;
    pending.max_attempts = settings.max_placement_attempts;
}
