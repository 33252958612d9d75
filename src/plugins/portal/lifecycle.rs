//! Opening and closing portals.
//!
//! Opening a portal mounts it on a host body, which trades its environment collision group for
//! the portal's host exempt group. Closing it gives the group back, unless the other open
//! portal is mounted on the same body.

use bevy::{prelude::*, render::view::RenderLayers};
use bevy_rapier3d::prelude::*;

use super::{
    pair::{PortalId, PortalPair, PortalPlacement},
    Portal, PortalTraveler, PORTAL_LAYER,
};
use crate::plugins::physics::{claim_host, release_host, stale_host_exemptions, CollisionBits};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OpenPortal {
    /// Entity carrying the on-screen portal quad.
    pub entity: Entity,
    /// Body the portal is mounted on.
    pub host: Entity,
    pub placement: PortalPlacement,
}

/// Portal table. The pair is only available while both portals are open.
#[derive(Debug, Default, Resource)]
pub struct OpenPortals {
    portals: [Option<OpenPortal>; 2],
    pair: Option<PortalPair>,
}

impl OpenPortals {
    pub fn get(&self, id: PortalId) -> Option<&OpenPortal> {
        self.portals[id.index()].as_ref()
    }

    pub fn iter(&self) -> impl Iterator<Item = (PortalId, &OpenPortal)> {
        PortalId::ALL
            .into_iter()
            .filter_map(|id| self.get(id).map(|portal| (id, portal)))
    }

    pub fn pair(&self) -> Option<&PortalPair> {
        self.pair.as_ref()
    }

    pub fn insert(&mut self, id: PortalId, portal: OpenPortal) -> Option<OpenPortal> {
        let previous = self.portals[id.index()].replace(portal);
        self.refresh_pair();
        previous
    }

    pub fn remove(&mut self, id: PortalId) -> Option<OpenPortal> {
        let previous = self.portals[id.index()].take();
        self.refresh_pair();
        previous
    }

    /// The other open portal, when it is mounted on `host` too.
    fn other_claimant(&self, id: PortalId, host: Entity) -> Option<PortalId> {
        let other = id.counterpart();
        self.get(other)
            .filter(|portal| portal.host == host)
            .map(|_| other)
    }

    fn refresh_pair(&mut self) {
        self.pair = match &self.portals {
            [Some(a), Some(b)] => Some(PortalPair::new([a.placement, b.placement])),
            _ => None,
        };
    }
}

/// Requests to open or close portals.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PortalRequest {
    Open {
        id: PortalId,
        placement: PortalPlacement,
        host: Entity,
    },
    Close(PortalId),
}

/// Portals from the settings, waiting for their host wall to be found.
#[derive(Debug, Default, Resource)]
pub struct PendingPortals {
    pub placements: Vec<(PortalId, PortalPlacement)>,
    pub attempts: u32,
    pub max_attempts: u32,
}

/// Find the wall behind each configured portal and request it to open there.
///
/// The rapier query pipeline is empty until the first physics step, so this retries every frame.
pub fn place_configured_portals(
    mut pending: ResMut<PendingPortals>,
    rapier: Res<RapierContext>,
    mut requests: EventWriter<PortalRequest>,
) {
    const HOST_SEARCH_DISTANCE: f32 = 1.;

    pending.attempts += 1;

    pending.placements.retain(|(id, placement)| {
        let hit = rapier.cast_ray(
            placement.transform.translation,
            placement.transform.forward(),
            HOST_SEARCH_DISTANCE,
            true,
            QueryFilter::only_fixed(),
        );
        match hit {
            Some((host, _distance)) => {
                requests.send(PortalRequest::Open {
                    id: *id,
                    placement: *placement,
                    host,
                });
                false
            }
            None => true,
        }
    });

    if pending.attempts >= pending.max_attempts && !pending.placements.is_empty() {
        for (id, placement) in pending.placements.drain(..) {
            warn!(
                "No wall found behind portal {:?} at {}, giving up",
                id, placement.transform.translation
            );
        }
    }
}

pub fn apply_portal_requests(
    mut commands: Commands,
    mut requests: EventReader<PortalRequest>,
    mut portals: ResMut<OpenPortals>,
    bits: Res<CollisionBits>,
    mut bodies: Query<(Entity, &mut CollisionGroups), Without<PortalTraveler>>,
) {
    let mut changed = false;
    for request in requests.iter() {
        changed = true;
        match *request {
            PortalRequest::Open {
                id,
                placement,
                host,
            } => {
                close_portal(&mut commands, &mut portals, &bits, &mut bodies, id);
                open_portal(&mut commands, &mut portals, &bits, &mut bodies, id, placement, host);
            }
            PortalRequest::Close(id) => {
                close_portal(&mut commands, &mut portals, &bits, &mut bodies, id);
            }
        }
    }

    if changed {
        debug_assert!(
            stale_host_exemptions(&bits, &portals, bodies.iter()).is_empty(),
            "host body kept a portal exemption after its portal closed"
        );
    }
}

fn open_portal(
    commands: &mut Commands,
    portals: &mut OpenPortals,
    bits: &CollisionBits,
    bodies: &mut Query<(Entity, &mut CollisionGroups), Without<PortalTraveler>>,
    id: PortalId,
    placement: PortalPlacement,
    host: Entity,
) {
    info!("Opening portal {:?} at {}", id, placement.transform.translation);
    if placement.trigger.is_degenerate() {
        warn!(
            "Portal {:?} has a degenerate trigger volume ({}), nothing will go through it",
            id, placement.trigger.half_extents
        );
    }
    if placement.surface_plane().is_none() {
        warn!("Portal {:?} has no usable surface plane, its views will not be clipped", id);
    }

    match bodies.get_mut(host) {
        Ok((_, mut groups)) => claim_host(bits, &mut groups, id),
        Err(_) => warn!("Portal {:?} host {:?} has no collision groups", id, host),
    }

    let entity = commands
        .spawn((
            SpatialBundle::from_transform(placement.quad_transform()),
            RenderLayers::layer(PORTAL_LAYER),
            Portal { id },
            Name::from(format!("Portal {:?}", id)),
        ))
        .id();

    portals.insert(
        id,
        OpenPortal {
            entity,
            host,
            placement,
        },
    );
}

fn close_portal(
    commands: &mut Commands,
    portals: &mut OpenPortals,
    bits: &CollisionBits,
    bodies: &mut Query<(Entity, &mut CollisionGroups), Without<PortalTraveler>>,
    id: PortalId,
) {
    let Some(portal) = portals.remove(id) else {
        return;
    };
    info!("Closing portal {:?}", id);
    commands.entity(portal.entity).despawn_recursive();

    if let Ok((_, mut groups)) = bodies.get_mut(portal.host) {
        let still_claimed_by = portals.other_claimant(id, portal.host);
        release_host(bits, &mut groups, still_claimed_by);
    }
}
