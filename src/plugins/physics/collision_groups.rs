//! Collision filtering around portals.
//!
//! A body going through a portal overlaps the wall the portal is mounted on. While the body is
//! inside a portal's trigger volume, its filter drops that portal's host exempt bit, so the
//! host wall stops colliding with it. Filters are recomputed from scratch every step from the
//! current position only, so no exemption survives a teleport or a despawn.

use bevy::prelude::*;
use bevy_rapier3d::prelude::{CollisionGroups, Group, RigidBody};

use super::CollisionBits;
use crate::plugins::portal::{OpenPortals, PortalId, PortalTraveler, TriggerVolume};

/// Filter of a dynamic body at `position`, given the trigger volumes of the open portals.
pub fn traveler_filter<'a>(
    bits: &CollisionBits,
    position: Vec3,
    volumes: impl IntoIterator<Item = (PortalId, &'a TriggerVolume)>,
) -> Group {
    let mut filter = bits.dynamic_filter();
    for (id, volume) in volumes {
        if volume.contains(position) {
            filter &= !bits.portal_host_exempt[id.index()];
        }
    }
    filter
}

/// Recompute the filter of every dynamic body, tagged traveler or not. Fixed and kinematic
/// bodies keep their filter. Memberships are left alone.
pub fn update_collision_masks(
    bits: Res<CollisionBits>,
    portals: Res<OpenPortals>,
    mut bodies: Query<
        (&Transform, &mut CollisionGroups, Option<&RigidBody>),
        Or<(With<PortalTraveler>, With<RigidBody>)>,
    >,
) {
    for (transform, mut groups, body) in &mut bodies {
        // Travelers without a rigid body are moved by hand.
        if !matches!(body, None | Some(RigidBody::Dynamic)) {
            continue;
        }
        let filter = traveler_filter(
            &bits,
            transform.translation,
            portals.iter().map(|(id, portal)| (id, &portal.placement.trigger)),
        );
        if groups.filters != filter {
            groups.filters = filter;
        }
    }
}

/// Portal `id` was mounted on the body owning `groups`.
pub fn claim_host(bits: &CollisionBits, groups: &mut CollisionGroups, id: PortalId) {
    groups.memberships = bits.portal_host_exempt[id.index()];
}

/// A portal was removed from the body owning `groups`. `still_claimed_by` is the other open
/// portal when it is mounted on the same body.
pub fn release_host(
    bits: &CollisionBits,
    groups: &mut CollisionGroups,
    still_claimed_by: Option<PortalId>,
) {
    groups.memberships = match still_claimed_by {
        Some(other) => bits.portal_host_exempt[other.index()],
        None => bits.environment,
    };
}

/// Bodies still carrying a host exempt bit without an open portal mounted on them.
pub fn stale_host_exemptions<'a>(
    bits: &CollisionBits,
    portals: &OpenPortals,
    bodies: impl IntoIterator<Item = (Entity, &'a CollisionGroups)>,
) -> Vec<Entity> {
    bodies
        .into_iter()
        .filter(|(entity, groups)| {
            PortalId::ALL.into_iter().any(|id| {
                groups
                    .memberships
                    .intersects(bits.portal_host_exempt[id.index()])
                    && portals.get(id).map(|p| p.host) != Some(*entity)
            })
        })
        .map(|(entity, _)| entity)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::portal::{OpenPortal, PortalPlacement};

    fn volume_at(x: f32) -> TriggerVolume {
        TriggerVolume::around(&Transform::from_xyz(x, 1., 0.), 1.5, 2., 2.)
    }

    #[test]
    fn outside_every_volume_keeps_default_filter() {
        let bits = CollisionBits::default();
        let (a, b) = (volume_at(0.), volume_at(10.));
        let filter = traveler_filter(
            &bits,
            Vec3::new(5., 1., 0.),
            [(PortalId::A, &a), (PortalId::B, &b)],
        );
        assert_eq!(filter, bits.dynamic_filter());
        assert!(filter.contains(bits.environment | bits.dynamic));
    }

    #[test]
    fn inside_one_volume_clears_only_its_bit() {
        let bits = CollisionBits::default();
        let (a, b) = (volume_at(0.), volume_at(10.));
        let filter = traveler_filter(
            &bits,
            Vec3::new(10.2, 1.5, 0.3),
            [(PortalId::A, &a), (PortalId::B, &b)],
        );
        assert!(!filter.intersects(bits.portal_host_exempt[1]));
        assert!(filter.contains(bits.portal_host_exempt[0]));
        assert!(filter.contains(bits.environment | bits.dynamic));
    }

    #[test]
    fn overlapping_volumes_clear_both_bits() {
        let bits = CollisionBits::default();
        let (a, b) = (volume_at(0.), volume_at(0.5));
        let filter = traveler_filter(
            &bits,
            Vec3::new(0.25, 1., 0.),
            [(PortalId::A, &a), (PortalId::B, &b)],
        );
        assert_eq!(filter, bits.environment | bits.dynamic);
    }

    #[test]
    fn degenerate_volume_never_exempts() {
        let bits = CollisionBits::default();
        let flat = TriggerVolume::around(&Transform::IDENTITY, 1.5, 2., 0.);
        let filter = traveler_filter(&bits, Vec3::ZERO, [(PortalId::A, &flat)]);
        assert_eq!(filter, bits.dynamic_filter());
    }

    #[test]
    fn host_claim_and_release() {
        let bits = CollisionBits::default();
        let mut groups = bits.environment_groups();
        claim_host(&bits, &mut groups, PortalId::B);
        assert_eq!(groups.memberships, bits.portal_host_exempt[1]);
        assert_eq!(groups.filters, bits.dynamic);

        release_host(&bits, &mut groups, Some(PortalId::A));
        assert_eq!(groups.memberships, bits.portal_host_exempt[0]);

        release_host(&bits, &mut groups, None);
        assert_eq!(groups, bits.environment_groups());
    }

    fn app_with_portals(portals: OpenPortals) -> App {
        let mut app = App::new();
        app.insert_resource(CollisionBits::default())
            .insert_resource(portals)
            .add_system(update_collision_masks);
        app
    }

    fn open_portals(app_hosts: [Entity; 2]) -> OpenPortals {
        let mut portals = OpenPortals::default();
        for (id, (x, host)) in PortalId::ALL.into_iter().zip([0., 10.].into_iter().zip(app_hosts)) {
            portals.insert(
                id,
                OpenPortal {
                    entity: Entity::from_raw(100 + id.index() as u32),
                    host,
                    placement: PortalPlacement::new(Transform::from_xyz(x, 1., 0.), 1.5, 2., 2.),
                },
            );
        }
        portals
    }

    #[test]
    fn system_recomputes_masks_every_step() {
        let bits = CollisionBits::default();
        let hosts = [Entity::from_raw(200), Entity::from_raw(201)];
        let mut app = app_with_portals(open_portals(hosts));
        let traveler = app
            .world
            .spawn((Transform::from_xyz(0., 1., 0.5), bits.dynamic_groups(), PortalTraveler))
            .id();
        let bystander = app
            .world
            .spawn((Transform::from_xyz(5., 1., 0.), bits.dynamic_groups()))
            .id();

        app.update();
        let first = *app.world.get::<CollisionGroups>(traveler).unwrap();
        assert_eq!(first.filters, bits.dynamic_filter() & !bits.portal_host_exempt[0]);
        assert_eq!(first.memberships, bits.dynamic);

        app.update();
        assert_eq!(*app.world.get::<CollisionGroups>(traveler).unwrap(), first);

        // Moved straight out, no exit event needed.
        app.world.get_mut::<Transform>(traveler).unwrap().translation = Vec3::new(5., 1., 5.);
        app.update();
        assert_eq!(
            app.world.get::<CollisionGroups>(traveler).unwrap().filters,
            bits.dynamic_filter()
        );

        // Teleported straight into the other portal.
        app.world.get_mut::<Transform>(traveler).unwrap().translation = Vec3::new(10., 1., -0.5);
        app.update();
        assert_eq!(
            app.world.get::<CollisionGroups>(traveler).unwrap().filters,
            bits.dynamic_filter() & !bits.portal_host_exempt[1]
        );

        assert_eq!(
            *app.world.get::<CollisionGroups>(bystander).unwrap(),
            bits.dynamic_groups()
        );
    }

    #[test]
    fn untagged_dynamic_bodies_are_exempted_too() {
        let bits = CollisionBits::default();
        let hosts = [Entity::from_raw(200), Entity::from_raw(201)];
        let mut app = app_with_portals(open_portals(hosts));
        let ball = app
            .world
            .spawn((
                Transform::from_xyz(0., 1., -0.2),
                RigidBody::Dynamic,
                bits.dynamic_groups(),
            ))
            .id();
        let mut host_groups = bits.environment_groups();
        claim_host(&bits, &mut host_groups, PortalId::A);
        let wall = app
            .world
            .spawn((Transform::from_xyz(0., 1., -0.2), RigidBody::Fixed, host_groups))
            .id();

        app.update();
        let groups = *app.world.get::<CollisionGroups>(ball).unwrap();
        assert_eq!(groups.filters, bits.dynamic_filter() & !bits.portal_host_exempt[0]);
        assert_eq!(groups.memberships, bits.dynamic);
        assert_eq!(*app.world.get::<CollisionGroups>(wall).unwrap(), host_groups);
    }

    #[test]
    fn closed_portals_exempt_nothing() {
        let bits = CollisionBits::default();
        let mut app = app_with_portals(OpenPortals::default());
        let traveler = app
            .world
            .spawn((Transform::from_xyz(0., 1., 0.), bits.dynamic_groups(), PortalTraveler))
            .id();
        app.update();
        assert_eq!(
            app.world.get::<CollisionGroups>(traveler).unwrap().filters,
            bits.dynamic_filter()
        );
    }

    #[test]
    fn stale_hosts_are_reported() {
        let bits = CollisionBits::default();
        let hosts = [Entity::from_raw(200), Entity::from_raw(201)];
        let portals = open_portals(hosts);
        let mut claimed = bits.environment_groups();
        claim_host(&bits, &mut claimed, PortalId::A);
        let mut orphan = bits.environment_groups();
        claim_host(&bits, &mut orphan, PortalId::B);
        let plain = bits.environment_groups();

        let stale = stale_host_exemptions(
            &bits,
            &portals,
            [
                (hosts[0], &claimed),
                (Entity::from_raw(300), &orphan),
                (Entity::from_raw(301), &plain),
            ],
        );
        assert_eq!(stale, vec![Entity::from_raw(300)]);
    }
}
