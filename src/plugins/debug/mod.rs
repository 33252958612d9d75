//! Developer tooling, only built with the `devel` feature.

pub mod draw;

use bevy::{app::PluginGroupBuilder, prelude::*};
use bevy_inspector_egui_rapier::InspectableRapierPlugin;
use bevy_prototype_debug_lines::DebugLinesPlugin;

#[derive(Debug)]
/// Development plugins intended for debug builds use.
pub struct DeveloperPlugins;

impl PluginGroup for DeveloperPlugins {
    fn build(self) -> PluginGroupBuilder {
        PluginGroupBuilder::start::<Self>()
            .add(bevy_editor_pls::prelude::EditorPlugin)
            .add(InspectableRapierPlugin)
            .add(DebugLinesPlugin::with_depth_test(true))
            .add(draw::PortalDebugDrawPlugin)
    }
}
