use bevy::prelude::*;
use bevy_rapier3d::prelude::{CollisionGroups, Group, RapierConfiguration, TimestepMode};

use crate::config::CollisionGroupBits;

mod collision_groups;

pub use collision_groups::*;

pub const ENVIRONMENT_GROUP: Group = Group::GROUP_1;
pub const PORTAL_A_HOST_GROUP: Group = Group::GROUP_2;
pub const PORTAL_B_HOST_GROUP: Group = Group::GROUP_3;
pub const DYNAMIC_GROUP: Group = Group::GROUP_4;

/// Collision bits in use, derived from the settings.
///
/// Environment bodies are `environment` and only collide with dynamic bodies. A host body trades
/// its `environment` membership for the exempt bit of the portal mounted on it, which lets
/// bodies standing in that portal stop colliding with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Resource)]
pub struct CollisionBits {
    pub environment: Group,
    pub dynamic: Group,
    pub portal_host_exempt: [Group; 2],
}

impl Default for CollisionBits {
    fn default() -> Self {
        CollisionBits {
            environment: ENVIRONMENT_GROUP,
            dynamic: DYNAMIC_GROUP,
            portal_host_exempt: [PORTAL_A_HOST_GROUP, PORTAL_B_HOST_GROUP],
        }
    }
}

impl From<&CollisionGroupBits> for CollisionBits {
    fn from(bits: &CollisionGroupBits) -> Self {
        CollisionBits {
            environment: Group::from_bits_truncate(bits.environment),
            dynamic: Group::from_bits_truncate(bits.dynamic),
            portal_host_exempt: bits.portal_host_exempt.map(Group::from_bits_truncate),
        }
    }
}

impl CollisionBits {
    pub fn all_exempt(&self) -> Group {
        self.portal_host_exempt[0] | self.portal_host_exempt[1]
    }

    /// What a dynamic body outside every trigger volume collides with: static geometry,
    /// portal hosts included, and other dynamic bodies.
    pub fn dynamic_filter(&self) -> Group {
        self.environment | self.dynamic | self.all_exempt()
    }

    pub fn environment_groups(&self) -> CollisionGroups {
        CollisionGroups::new(self.environment, self.dynamic)
    }

    pub fn dynamic_groups(&self) -> CollisionGroups {
        CollisionGroups::new(self.dynamic, self.dynamic_filter())
    }
}

pub struct PhysicsPlugin {
    pub bits: CollisionBits,
}

impl Plugin for PhysicsPlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(self.bits)
            .add_startup_system(configure_rapier)
            .add_system(update_collision_masks.label(PhysicsLabels::UpdateCollisionMasks));
    }
}

#[derive(Debug, SystemLabel)]
pub enum PhysicsLabels {
    /// Runs in `CoreStage::Update`, ahead of the rapier stages.
    UpdateCollisionMasks,
}

fn configure_rapier(mut config: ResMut<RapierConfiguration>) {
    // Extra CCD substeps because them portals can go fast
    config.timestep_mode = TimestepMode::Variable {
        max_dt: 1. / 20.,
        time_scale: 1.,
        substeps: 4,
    }
}
