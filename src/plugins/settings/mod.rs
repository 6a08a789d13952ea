//! Tunable game settings.
//!
//! Defaults are embedded from `assets/settings.json`. Native builds additionally look for a
//! `settings.json` in the working directory; any field it omits keeps its default.

use std::time::Duration;

use bevy::prelude::*;
use serde::Deserialize;
use thiserror::Error;

const EMBEDDED_SETTINGS: &str = include_str!("../../../assets/settings.json");
#[cfg(not(target_arch = "wasm32"))]
const OVERRIDE_PATH: &str = "settings.json";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed settings: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, Deserialize, Resource)]
#[serde(default)]
pub struct GameSettings {
    pub window: WindowSettings,
    pub transition: TransitionSettings,
    pub portal: PortalSettings,
    pub mirror: MirrorSettings,
    pub beam: BeamSettings,
    pub player: PlayerSettings,
    pub audio: AudioSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WindowSettings {
    pub title: String,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransitionSettings {
    pub fade_out_ms: u64,
    pub fade_in_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PortalSettings {
    pub default_capture_radius: f32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MirrorSettings {
    pub rotation_step_degrees: f32,
    pub rotate_cooldown_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BeamSettings {
    pub capture_radius: f32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlayerSettings {
    pub speed: f32,
    pub fly_speed: f32,
    pub sprint_multiplier: f32,
    pub jump_velocity: f32,
    pub mouse_sensitivity: f32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    pub ambient_volume: f32,
}

impl Default for WindowSettings {
    fn default() -> Self {
        WindowSettings {
            title: "Portal Isles".to_owned(),
            width: 1280.,
            height: 720.,
        }
    }
}

impl Default for TransitionSettings {
    fn default() -> Self {
        TransitionSettings {
            fade_out_ms: 1000,
            fade_in_ms: 1000,
        }
    }
}

impl Default for PortalSettings {
    fn default() -> Self {
        PortalSettings {
            default_capture_radius: 2.,
        }
    }
}

impl Default for MirrorSettings {
    fn default() -> Self {
        MirrorSettings {
            rotation_step_degrees: 15.,
            rotate_cooldown_ms: 250,
        }
    }
}

impl Default for BeamSettings {
    fn default() -> Self {
        BeamSettings {
            capture_radius: 0.45,
        }
    }
}

impl Default for PlayerSettings {
    fn default() -> Self {
        PlayerSettings {
            speed: 5.,
            fly_speed: 8.,
            sprint_multiplier: 2.,
            jump_velocity: 5.,
            mouse_sensitivity: 0.004,
        }
    }
}

impl Default for AudioSettings {
    fn default() -> Self {
        AudioSettings {
            ambient_volume: 0.5,
        }
    }
}

impl TransitionSettings {
    pub fn fade_out(&self) -> Duration {
        Duration::from_millis(self.fade_out_ms)
    }

    pub fn fade_in(&self) -> Duration {
        Duration::from_millis(self.fade_in_ms)
    }
}

impl MirrorSettings {
    pub fn rotate_cooldown(&self) -> Duration {
        Duration::from_millis(self.rotate_cooldown_ms)
    }
}

impl GameSettings {
    pub fn from_json(json: &str) -> Result<GameSettings, SettingsError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load the settings, falling back to the defaults on any error.
    pub fn load() -> GameSettings {
        let mut settings = match Self::from_json(EMBEDDED_SETTINGS) {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Embedded settings are invalid, using defaults: {}", e);
                GameSettings::default()
            }
        };

        #[cfg(not(target_arch = "wasm32"))]
        match Self::read_override(OVERRIDE_PATH) {
            Ok(Some(overridden)) => {
                info!("Using settings from {}", OVERRIDE_PATH);
                settings = overridden;
            }
            Ok(None) => {}
            Err(e) => warn!("Ignoring {}: {}", OVERRIDE_PATH, e),
        }

        settings
    }

    #[cfg(not(target_arch = "wasm32"))]
    fn read_override(path: &str) -> Result<Option<GameSettings>, SettingsError> {
        let path = std::path::Path::new(path);
        if !path.exists() {
            return Ok(None);
        }
        let json = std::fs::read_to_string(path)?;
        Ok(Some(Self::from_json(&json)?))
    }
}
