//! Portal settings, loaded from a JSON file before the app starts.

use std::{
    f32::consts::FRAC_PI_4,
    path::{Path, PathBuf},
};

use bevy::prelude::*;
use serde::Deserialize;
use thiserror::Error;

/// Environment variable overriding the settings file location.
pub const CONFIG_PATH_VAR: &str = "PORTALS_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "assets/portals.json";

/// Pass cameras each need a render layer of their own, on top of the scene layer and the
/// on-screen portal layer. Bevy has 32 layers.
pub const MAX_RECURSION_LEVELS: usize = 16;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read portal settings {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse portal settings: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Recursion levels must be at least 1, got {0}")]
    InvalidRecursionLevels(usize),
    #[error("Recursion levels must be at most {max}, got {levels}")]
    RecursionTooDeep { levels: usize, max: usize },
    #[error("Portals come in pairs, got {0} portal(s)")]
    UnpairedPortals(usize),
    #[error("Collision group bits must be non-zero and disjoint: {0}")]
    CollisionBits(String),
    #[error("Portal {index} orientation does not span a plane (normal {normal:?}, up {up:?})")]
    DegenerateOrientation { index: usize, normal: Vec3, up: Vec3 },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PortalOrientation {
    /// Outward surface normal.
    pub normal: [f32; 3],
    pub up: [f32; 3],
}

impl Default for PortalOrientation {
    fn default() -> Self {
        PortalOrientation {
            normal: [0., 0., 1.],
            up: [0., 1., 0.],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PortalSpec {
    pub position: [f32; 3],
    #[serde(default)]
    pub orientation: PortalOrientation,
    #[serde(default = "default_portal_width")]
    pub width: f32,
    #[serde(default = "default_portal_height")]
    pub height: f32,
}

fn default_portal_width() -> f32 {
    1.5
}

fn default_portal_height() -> f32 {
    2.
}

impl PortalSpec {
    /// Portal pose: local -Z points into the host wall, +Z along the surface normal.
    pub fn transform(&self) -> Transform {
        let position = Vec3::from(self.position);
        let normal = Vec3::from(self.orientation.normal);
        Transform::from_translation(position)
            .looking_at(position - normal, Vec3::from(self.orientation.up))
    }

    fn check_orientation(&self, index: usize) -> Result<(), ConfigError> {
        let normal = Vec3::from(self.orientation.normal);
        let up = Vec3::from(self.orientation.up);
        if normal.cross(up).length_squared() < 1e-6 {
            return Err(ConfigError::DegenerateOrientation { index, normal, up });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CollisionGroupBits {
    pub environment: u32,
    pub dynamic: u32,
    pub portal_host_exempt: [u32; 2],
}

impl Default for CollisionGroupBits {
    fn default() -> Self {
        CollisionGroupBits {
            environment: 1 << 0,
            portal_host_exempt: [1 << 1, 1 << 2],
            dynamic: 1 << 3,
        }
    }
}

impl CollisionGroupBits {
    fn validate(&self) -> Result<(), ConfigError> {
        let named = [
            ("environment", self.environment),
            ("dynamic", self.dynamic),
            ("portal_host_exempt[0]", self.portal_host_exempt[0]),
            ("portal_host_exempt[1]", self.portal_host_exempt[1]),
        ];
        for (i, (name, bits)) in named.iter().enumerate() {
            if *bits == 0 {
                return Err(ConfigError::CollisionBits(format!("{name} is empty")));
            }
            for (other_name, other_bits) in &named[i + 1..] {
                if bits & other_bits != 0 {
                    return Err(ConfigError::CollisionBits(format!(
                        "{name} overlaps {other_name}"
                    )));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Resource)]
#[serde(default)]
pub struct PortalSettings {
    pub recursion_levels: usize,
    pub portal_pair: Vec<PortalSpec>,
    pub collision_group_bits: CollisionGroupBits,
    /// Full depth of the trigger box, centered on the portal surface.
    pub trigger_depth: f32,
    /// Vertical field of view shared by the main camera and the portal cameras.
    pub fov: f32,
    pub max_placement_attempts: u32,
}

impl Default for PortalSettings {
    fn default() -> Self {
        PortalSettings {
            recursion_levels: 7,
            portal_pair: vec![
                PortalSpec {
                    position: [0., 1.25, -9.99],
                    orientation: PortalOrientation {
                        normal: [0., 0., 1.],
                        up: [0., 1., 0.],
                    },
                    width: default_portal_width(),
                    height: default_portal_height(),
                },
                PortalSpec {
                    position: [9.99, 1.25, 0.],
                    orientation: PortalOrientation {
                        normal: [-1., 0., 0.],
                        up: [0., 1., 0.],
                    },
                    width: default_portal_width(),
                    height: default_portal_height(),
                },
            ],
            collision_group_bits: CollisionGroupBits::default(),
            trigger_depth: 2.,
            fov: FRAC_PI_4,
            max_placement_attempts: 120,
        }
    }
}

impl PortalSettings {
    /// Load from `$PORTALS_CONFIG`, or `assets/portals.json`, falling back to the defaults
    /// when no file exists.
    pub fn load() -> Result<PortalSettings, ConfigError> {
        let path = std::env::var_os(CONFIG_PATH_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
        if !path.exists() {
            return Ok(PortalSettings::default());
        }
        PortalSettings::from_file(path)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<PortalSettings, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        PortalSettings::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<PortalSettings, ConfigError> {
        let settings: PortalSettings = serde_json::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.recursion_levels < 1 {
            return Err(ConfigError::InvalidRecursionLevels(self.recursion_levels));
        }
        if self.recursion_levels > MAX_RECURSION_LEVELS {
            return Err(ConfigError::RecursionTooDeep {
                levels: self.recursion_levels,
                max: MAX_RECURSION_LEVELS,
            });
        }
        if self.portal_pair.len() != 2 {
            return Err(ConfigError::UnpairedPortals(self.portal_pair.len()));
        }
        for (index, spec) in self.portal_pair.iter().enumerate() {
            spec.check_orientation(index)?;
        }
        self.collision_group_bits.validate()
    }
}
