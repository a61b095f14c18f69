use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::geometry::TorusParams;
use crate::input::{default_bindings, Action, KeyBind};
use crate::orientation::{OrbitLimits, OrientationRates};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Settings {
    pub key_bindings: HashMap<Action, KeyBind>,
    pub geometry: TorusParams,
    pub camera: CameraSettings,
    pub rates: RateSettings,
    pub graphics: GraphicsSettings,
    #[serde(default)]
    pub board: BoardSettings,
    #[serde(default)]
    pub debug: DebugSettings,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CameraSettings {
    pub fov_y_degrees: f32,
    #[serde(flatten)]
    pub orbit: OrbitLimits,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RateSettings {
    #[serde(flatten)]
    pub orientation: OrientationRates,
    pub k_twist: f32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GraphicsSettings {
    /// 0 means uncapped (paced by vsync only).
    pub frame_rate_cap: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BoardSettings {
    pub stone_size: f32,
}

impl Default for BoardSettings {
    fn default() -> Self {
        Self { stone_size: 0.1 }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DebugSettings {
    pub log_picks: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            key_bindings: default_bindings(),
            geometry: TorusParams::default(),
            camera: CameraSettings {
                fov_y_degrees: 75.0,
                orbit: OrbitLimits::default(),
            },
            rates: RateSettings {
                orientation: OrientationRates::default(),
                k_twist: 0.1,
            },
            graphics: GraphicsSettings { frame_rate_cap: 60 },
            board: BoardSettings::default(),
            debug: DebugSettings::default(),
        }
    }
}

fn config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "torusgo")
        .map(|dirs| dirs.config_dir().join("settings.toml"))
}

impl Settings {
    pub fn load() -> Self {
        match config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Read settings from `path`. A missing file is created with defaults;
    /// an unreadable one is reported and replaced by defaults in memory only.
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<Self>(&contents) {
                Ok(settings) => settings.sanitized(),
                Err(e) => {
                    log::warn!("Failed to parse settings: {e}. Using defaults.");
                    Self::default()
                }
            },
            Err(_) => {
                let settings = Self::default();
                settings.save_to(path);
                settings
            }
        }
    }

    pub fn save(&self) {
        let Some(path) = config_path() else {
            log::warn!("Could not determine config directory");
            return;
        };
        self.save_to(&path);
    }

    pub fn save_to(&self, path: &Path) {
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                log::warn!("Failed to create config directory: {e}");
                return;
            }
        }

        match toml::to_string_pretty(self) {
            Ok(contents) => {
                if let Err(e) = std::fs::write(path, contents) {
                    log::warn!("Failed to write settings: {e}");
                }
            }
            Err(e) => {
                log::warn!("Failed to serialize settings: {e}");
            }
        }
    }

    /// Clamp values a hand-edited file could make unusable.
    fn sanitized(mut self) -> Self {
        let geometry = &mut self.geometry;
        if geometry.x_segments < 3 || geometry.y_segments < 3 {
            log::warn!(
                "{}x{} segments is too coarse, using at least 3x3",
                geometry.x_segments,
                geometry.y_segments
            );
            geometry.x_segments = geometry.x_segments.max(3);
            geometry.y_segments = geometry.y_segments.max(3);
        }

        let orbit = &mut self.camera.orbit;
        if orbit.min_distance > orbit.max_distance {
            log::warn!("camera min_distance exceeds max_distance, swapping");
            std::mem::swap(&mut orbit.min_distance, &mut orbit.max_distance);
        }
        orbit.distance = orbit.distance.clamp(orbit.min_distance, orbit.max_distance);
        self.camera.fov_y_degrees = self.camera.fov_y_degrees.clamp(10.0, 170.0);
        self
    }
}
