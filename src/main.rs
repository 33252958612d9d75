#![allow(clippy::type_complexity)]

use bevy::prelude::*;

mod config;
mod plugins;
mod util;

use config::{ConfigError, PortalSettings};

fn main() -> Result<(), ConfigError> {
    let settings = PortalSettings::load()?;
    App::new()
        .add_plugin(plugins::game::GamePlugin { settings })
        .run();
    Ok(())
}
