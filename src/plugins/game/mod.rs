use std::f32::consts::*;

use bevy::{prelude::*, render::view::RenderLayers};
use bevy_rapier3d::prelude::*;

use crate::{
    config::PortalSettings,
    plugins::{
        physics::{CollisionBits, PhysicsPlugin},
        portal::{MainCamera, PortalPlugin, SCENE_LAYER, PORTAL_LAYER},
    },
    util::scenes::{make_test_arena, spawn_props},
};

const ARENA_SIZE: f32 = 20.;
const ARENA_HEIGHT: f32 = 3.;
const PROP_SPEED: f32 = 4.;

#[derive(Debug)]
/// Main game plugin, responsible for loading the other game plugins and bootstrapping the game.
pub struct GamePlugin {
    pub settings: PortalSettings,
}

impl Plugin for GamePlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(self.settings.clone())
            .add_plugins(DefaultPlugins.set(WindowPlugin {
                window: WindowDescriptor {
                    title: "Recursive portals".to_string(),
                    width: 1280.,
                    height: 720.,
                    ..default()
                },
                ..default()
            }));

        #[cfg(feature = "devel")]
        {
            app.add_plugins(super::debug::DeveloperPlugins);
        }

        app.add_plugin(RapierPhysicsPlugin::<NoUserData>::default())
            .add_plugin(PhysicsPlugin {
                bits: CollisionBits::from(&self.settings.collision_group_bits),
            })
            .add_plugin(PortalPlugin)
            .add_startup_system(setup);
    }
}

/// Perform game initialization
fn setup(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
    bits: Res<CollisionBits>,
    settings: Res<PortalSettings>,
) {
    make_test_arena(
        &mut commands,
        &mut meshes,
        &mut materials,
        &bits,
        ARENA_SIZE,
        ARENA_HEIGHT,
    );

    // Light
    commands.spawn(DirectionalLightBundle {
        directional_light: DirectionalLight {
            color: Color::ANTIQUE_WHITE,
            illuminance: 20_000.,
            shadows_enabled: true,
            ..default()
        },
        transform: Transform {
            translation: Vec3::Y * 5.,
            rotation: Quat::from_euler(EulerRot::YXZ, FRAC_PI_4, -FRAC_PI_4, 0.),
            scale: Vec3::ONE,
        },
        ..default()
    });

    // Roll a few props into the first portal.
    if let Some(first) = settings.portal_pair.first() {
        let target = Vec3::from(first.position);
        let starts = [
            Vec3::new(target.x - 1., 0.3, target.z + 6.),
            Vec3::new(target.x, 0.3, target.z + 8.),
            Vec3::new(target.x + 1., 0.3, target.z + 10.),
        ];
        spawn_props(
            &mut commands,
            &mut meshes,
            &mut materials,
            &bits,
            &starts,
            Vec3::new(target.x, 0.3, target.z),
            PROP_SPEED,
        );
    }

    commands.spawn((
        Camera3dBundle {
            projection: Projection::Perspective(PerspectiveProjection {
                fov: settings.fov,
                ..default()
            }),
            transform: Transform::from_xyz(-5., 1.6, 3.).looking_at(Vec3::new(2., 1.25, -6.), Vec3::Y),
            ..default()
        },
        RenderLayers::from_layers(&[SCENE_LAYER, PORTAL_LAYER]),
        MainCamera,
        Name::from("Main camera"),
    ));
}
