use bevy::{prelude::*, reflect::FromReflect};

use super::geometry::{portal_to_portal, surface_plane, TriggerVolume};

/// Handle of one of the two portals. The counterpart relation is fixed by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Reflect, FromReflect)]
pub enum PortalId {
    #[default]
    A,
    B,
}

impl PortalId {
    pub const ALL: [PortalId; 2] = [PortalId::A, PortalId::B];

    pub const fn index(self) -> usize {
        match self {
            PortalId::A => 0,
            PortalId::B => 1,
        }
    }

    pub const fn counterpart(self) -> PortalId {
        match self {
            PortalId::A => PortalId::B,
            PortalId::B => PortalId::A,
        }
    }
}

/// Where a portal sits and how large it is.
#[derive(Debug, Clone, Copy, PartialEq, Reflect, FromReflect)]
pub struct PortalPlacement {
    pub transform: Transform,
    pub width: f32,
    pub height: f32,
    pub trigger: TriggerVolume,
}

impl PortalPlacement {
    pub fn new(transform: Transform, width: f32, height: f32, trigger_depth: f32) -> Self {
        PortalPlacement {
            transform,
            width,
            height,
            trigger: TriggerVolume::around(&transform, width, height, trigger_depth),
        }
    }

    pub fn surface_plane(&self) -> Option<Vec4> {
        surface_plane(&self.transform)
    }

    /// Transform of the unit quad mesh so that it covers the portal surface.
    pub fn quad_transform(&self) -> Transform {
        self.transform
            .with_scale(Vec3::new(self.width, self.height, 1.))
    }
}

/// Both portals of an open pair, indexed by `PortalId`.
///
/// The transfer transforms are computed once per pair so the renderer and the teleporter agree
/// on them.
#[derive(Debug, Clone, PartialEq)]
pub struct PortalPair {
    placements: [PortalPlacement; 2],
    transfers: [Transform; 2],
}

impl PortalPair {
    pub fn new(placements: [PortalPlacement; 2]) -> PortalPair {
        let transfers = PortalId::ALL.map(|id| {
            portal_to_portal(
                &placements[id.index()].transform,
                &placements[id.counterpart().index()].transform,
            )
        });
        PortalPair {
            placements,
            transfers,
        }
    }

    pub fn get(&self, id: PortalId) -> &PortalPlacement {
        &self.placements[id.index()]
    }

    pub fn counterpart(&self, id: PortalId) -> &PortalPlacement {
        self.get(id.counterpart())
    }

    /// Transform applied to anything going into portal `id`.
    pub fn transfer(&self, id: PortalId) -> &Transform {
        &self.transfers[id.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (PortalId, &PortalPlacement)> {
        PortalId::ALL.into_iter().map(|id| (id, self.get(id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counterpart_is_an_involution() {
        for id in PortalId::ALL {
            assert_ne!(id.counterpart(), id);
            assert_eq!(id.counterpart().counterpart(), id);
        }
        assert_eq!(PortalId::A.index(), 0);
        assert_eq!(PortalId::B.index(), 1);
    }

    #[test]
    fn pair_resolves_counterparts_symmetrically() {
        let a = PortalPlacement::new(Transform::from_xyz(0., 1., 0.), 1., 2., 1.);
        let b = PortalPlacement::new(Transform::from_xyz(5., 1., 0.), 1., 2., 1.);
        let pair = PortalPair::new([a, b]);
        assert_eq!(pair.counterpart(PortalId::A), &b);
        assert_eq!(pair.counterpart(PortalId::B), &a);
        assert_eq!(
            pair.counterpart(pair_id_of(&pair, pair.counterpart(PortalId::A))),
            &a
        );
    }

    fn pair_id_of(pair: &PortalPair, placement: &PortalPlacement) -> PortalId {
        pair.iter()
            .find(|(_, p)| *p == placement)
            .map(|(id, _)| id)
            .unwrap()
    }

    #[test]
    fn quad_covers_the_portal_size() {
        let placement = PortalPlacement::new(Transform::from_xyz(1., 2., 3.), 1.5, 2., 2.);
        let quad = placement.quad_transform();
        assert_eq!(quad.scale, Vec3::new(1.5, 2., 1.));
        assert_eq!(quad.translation, Vec3::new(1., 2., 3.));
        assert_eq!(placement.trigger.half_extents, Vec3::new(0.75, 1., 1.));
    }
}
