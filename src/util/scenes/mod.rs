use std::f32::consts::FRAC_PI_2;

use bevy::prelude::*;
use bevy_rapier3d::prelude::*;

use crate::plugins::{physics::CollisionBits, portal::PortalTraveler};

pub const WALL_THICKNESS: f32 = 1.;

/// Setup a closed square arena of the given inner size: floor, four walls and a ceiling, all
/// fixed bodies in the environment collision group. Wall inner faces sit at `±length / 2`.
pub fn make_test_arena(
    commands: &mut Commands,
    meshes: &mut Assets<Mesh>,
    materials: &mut Assets<StandardMaterial>,
    bits: &CollisionBits,
    length: f32,
    height: f32,
) {
    let walls_materials = [
        materials.add(StandardMaterial::from(Color::RED)),
        materials.add(StandardMaterial::from(Color::GREEN)),
        materials.add(StandardMaterial::from(Color::BLUE)),
        materials.add(StandardMaterial::from(Color::ANTIQUE_WHITE)),
    ];
    let slab_material = materials.add(StandardMaterial::from(Color::DARK_GRAY));

    let half_len = length / 2.;
    let slab_half_len = half_len + WALL_THICKNESS;
    let wall_half_extents = Vec3::new(slab_half_len, height / 2., WALL_THICKNESS / 2.);
    let slab_half_extents = Vec3::new(slab_half_len, WALL_THICKNESS / 2., slab_half_len);
    let wall_mesh = meshes.add(shape::Box::new(2. * wall_half_extents.x, height, WALL_THICKNESS).into());
    let slab_mesh = meshes.add(
        shape::Box::new(
            2. * slab_half_extents.x,
            WALL_THICKNESS,
            2. * slab_half_extents.z,
        )
        .into(),
    );

    let mut spawn_fixed = |name: String, mesh: Handle<Mesh>, material, transform, half: Vec3| {
        commands.spawn((
            PbrBundle {
                mesh,
                material,
                transform,
                ..default()
            },
            Name::from(name),
            RigidBody::Fixed,
            Collider::cuboid(half.x, half.y, half.z),
            bits.environment_groups(),
        ));
    };

    spawn_fixed(
        "Floor".to_string(),
        slab_mesh.clone(),
        slab_material.clone(),
        Transform::from_xyz(0., -WALL_THICKNESS / 2., 0.),
        slab_half_extents,
    );
    spawn_fixed(
        "Ceiling".to_string(),
        slab_mesh,
        slab_material,
        Transform::from_xyz(0., height + WALL_THICKNESS / 2., 0.),
        slab_half_extents,
    );
    for (i, material) in walls_materials.into_iter().enumerate() {
        let rotation = Quat::from_axis_angle(Vec3::Y, i as f32 * FRAC_PI_2);
        let offset = rotation.mul_vec3(Vec3::new(0., 0., -(half_len + WALL_THICKNESS / 2.)));
        spawn_fixed(
            format!("Wall_{}", i),
            wall_mesh.clone(),
            material,
            Transform::from_translation(offset + Vec3::Y * height / 2.).with_rotation(rotation),
            wall_half_extents,
        );
    }
}

/// Spawn balls rolling towards `target`, tagged to go through portals.
pub fn spawn_props(
    commands: &mut Commands,
    meshes: &mut Assets<Mesh>,
    materials: &mut Assets<StandardMaterial>,
    bits: &CollisionBits,
    starts: &[Vec3],
    target: Vec3,
    speed: f32,
) {
    const RADIUS: f32 = 0.3;

    let mesh = meshes.add(
        shape::UVSphere {
            radius: RADIUS,
            sectors: 16,
            stacks: 16,
        }
        .into(),
    );
    let material = materials.add(StandardMaterial::from(Color::PURPLE));

    for (i, start) in starts.iter().enumerate() {
        let direction = (target - *start).normalize_or_zero();
        commands.spawn((
            PbrBundle {
                mesh: mesh.clone(),
                material: material.clone(),
                transform: Transform::from_translation(*start),
                ..default()
            },
            Name::from(format!("Prop_{}", i)),
            RigidBody::Dynamic,
            Collider::ball(RADIUS),
            Velocity::linear(direction * speed),
            // Prevent tunneling through thin walls when going fast
            Ccd::enabled(),
            bits.dynamic_groups(),
            PortalTraveler,
        ));
    }
}
