use bevy::prelude::*;
use bevy_rapier3d::prelude::Velocity;

use super::{
    geometry::{signed_distance, teleport, teleport_direction},
    lifecycle::OpenPortals,
    pair::{PortalId, PortalPair},
    PortalTraveler,
};

/// Portal a body at `position` just went through: inside its trigger volume, behind its surface.
pub fn crossed_portal(pair: &PortalPair, position: Vec3) -> Option<PortalId> {
    pair.iter()
        .find(|(_, placement)| {
            placement.trigger.contains(position)
                && signed_distance(&placement.transform, position).map_or(false, |d| d < 0.)
        })
        .map(|(id, _)| id)
}

/// Move travelers which went through a portal out of the other one, velocities included.
pub fn teleport_travelers(
    portals: Res<OpenPortals>,
    mut travelers: Query<(&mut Transform, Option<&mut Velocity>, Entity), With<PortalTraveler>>,
) {
    let Some(pair) = portals.pair() else {
        return;
    };
    for (mut transform, velocity, entity) in &mut travelers {
        if let Some(id) = crossed_portal(pair, transform.translation) {
            info!(
                "Teleporting {:?} from portal {:?} to portal {:?}",
                entity,
                id,
                id.counterpart()
            );
            *transform = teleport(&transform, id, pair);
            if let Some(mut velocity) = velocity {
                velocity.linvel = teleport_direction(velocity.linvel, id, pair);
                velocity.angvel = teleport_direction(velocity.angvel, id, pair);
            }
        }
    }
}
