//! Authored level definitions.
//!
//! Levels are described in `assets/levels.json`, embedded in the binary and validated once at
//! startup. Any inconsistency in there is an authoring error and is reported as a
//! [`RegistryError`].

use std::{collections::BTreeMap, fmt};

use bevy::prelude::*;
use serde::Deserialize;
use thiserror::Error;

pub const EMBEDDED_LEVELS: &str = include_str!("../../../assets/levels.json");
pub const DEFAULT_PAD_OFFSET: [f32; 3] = [0., 0., -1.6];

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(transparent)]
pub struct LevelId(pub u32);

impl fmt::Display for LevelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("malformed level registry: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("the level registry is empty")]
    Empty,
    #[error("level ids must be positive")]
    ZeroLevelId,
    #[error("level {0} is defined more than once")]
    DuplicateLevel(LevelId),
    #[error("start level {0} does not exist")]
    UnknownStartLevel(LevelId),
    #[error("portal \"{portal}\" in level {level} targets missing level {target}")]
    UnknownTarget {
        level: LevelId,
        portal: String,
        target: LevelId,
    },
    #[error("level {level} uses a non positive radius {radius}")]
    InvalidRadius { level: LevelId, radius: f32 },
    #[error("gate in level {level} requires {required} captures but only {available} emitters exist")]
    UnreachableGate {
        level: LevelId,
        required: u32,
        available: u32,
    },
    #[error("emitter {index} in level {level} has no direction")]
    ZeroEmitterDirection { level: LevelId, index: usize },
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ArenaBounds {
    pub half_extent: f32,
    pub wall_height: f32,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct GateDef {
    pub required_captures: u32,
    /// Keep the portal open once unlocked, even if the beams are later misaligned.
    #[serde(default)]
    pub latch: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PortalDef {
    pub position: [f32; 3],
    #[serde(default)]
    pub capture_radius: Option<f32>,
    pub target_level: LevelId,
    pub target_spawn: [f32; 3],
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub gate: Option<GateDef>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct EmitterDef {
    pub origin: [f32; 3],
    pub direction: [f32; 3],
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct MirrorDef {
    pub position: [f32; 3],
    #[serde(default)]
    pub initial_degrees: f32,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct MirrorStationDef {
    pub emitter: EmitterDef,
    pub mirror: MirrorDef,
    /// Offset of the rotation pad from the mirror base.
    #[serde(default = "default_pad_offset")]
    pub pad_offset: [f32; 3],
}

fn default_pad_offset() -> [f32; 3] {
    DEFAULT_PAD_OFFSET
}

#[derive(Debug, Clone, Deserialize)]
pub struct PuzzleDef {
    pub capture_center: [f32; 3],
    #[serde(default)]
    pub capture_radius: Option<f32>,
    pub stations: Vec<MirrorStationDef>,
}

/// Background text shown in the lore scroll of a level.
#[derive(Debug, Clone, Deserialize)]
pub struct LoreDef {
    pub title: String,
    /// Paragraphs are separated by blank lines.
    pub body: String,
    #[serde(default)]
    pub attribution: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LevelDef {
    pub id: LevelId,
    pub name: String,
    pub spawn: [f32; 3],
    pub bounds: ArenaBounds,
    #[serde(default)]
    pub ambient: Option<String>,
    #[serde(default = "default_sky_color")]
    pub sky_color: [f32; 3],
    #[serde(default = "default_ground_color")]
    pub ground_color: [f32; 3],
    #[serde(default)]
    pub portals: Vec<PortalDef>,
    #[serde(default)]
    pub puzzle: Option<PuzzleDef>,
    #[serde(default)]
    pub lore: Option<LoreDef>,
}

fn default_sky_color() -> [f32; 3] {
    [0.4, 0.6, 0.8]
}

fn default_ground_color() -> [f32; 3] {
    [0.3, 0.3, 0.3]
}

impl LevelDef {
    pub fn spawn_position(&self) -> Vec3 {
        Vec3::from_array(self.spawn)
    }

    pub fn sky_color(&self) -> Color {
        let [r, g, b] = self.sky_color;
        Color::rgb(r, g, b)
    }

    pub fn ground_color(&self) -> Color {
        let [r, g, b] = self.ground_color;
        Color::rgb(r, g, b)
    }

    fn validate(&self, known: &BTreeMap<LevelId, LevelDef>) -> Result<(), RegistryError> {
        let emitters = self
            .puzzle
            .as_ref()
            .map_or(0, |puzzle| puzzle.stations.len() as u32);

        for portal in &self.portals {
            if !known.contains_key(&portal.target_level) {
                return Err(RegistryError::UnknownTarget {
                    level: self.id,
                    portal: portal
                        .label
                        .clone()
                        .unwrap_or_else(|| format!("To Level {}", portal.target_level)),
                    target: portal.target_level,
                });
            }
            if let Some(radius) = portal.capture_radius {
                check_radius(self.id, radius)?;
            }
            if let Some(gate) = portal.gate {
                if gate.required_captures > emitters {
                    return Err(RegistryError::UnreachableGate {
                        level: self.id,
                        required: gate.required_captures,
                        available: emitters,
                    });
                }
            }
        }

        if let Some(puzzle) = &self.puzzle {
            if let Some(radius) = puzzle.capture_radius {
                check_radius(self.id, radius)?;
            }
            for (index, station) in puzzle.stations.iter().enumerate() {
                if Vec3::from_array(station.emitter.direction).length_squared() == 0. {
                    return Err(RegistryError::ZeroEmitterDirection {
                        level: self.id,
                        index,
                    });
                }
            }
        }
        Ok(())
    }
}

fn check_radius(level: LevelId, radius: f32) -> Result<(), RegistryError> {
    // Written so that NaN is rejected too.
    if !(radius > 0.) {
        return Err(RegistryError::InvalidRadius { level, radius });
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct RegistryFile {
    start_level: LevelId,
    levels: Vec<LevelDef>,
}

/// Every level of the game, keyed by id.
#[derive(Debug, Clone, Resource)]
pub struct LevelRegistry {
    start_level: LevelId,
    levels: BTreeMap<LevelId, LevelDef>,
}

impl LevelRegistry {
    pub fn from_json(json: &str) -> Result<LevelRegistry, RegistryError> {
        let file: RegistryFile = serde_json::from_str(json)?;
        Self::from_levels(file.start_level, file.levels)
    }

    pub fn from_levels(
        start_level: LevelId,
        levels: Vec<LevelDef>,
    ) -> Result<LevelRegistry, RegistryError> {
        if levels.is_empty() {
            return Err(RegistryError::Empty);
        }
        let mut map = BTreeMap::new();
        for level in levels {
            if level.id.0 == 0 {
                return Err(RegistryError::ZeroLevelId);
            }
            let id = level.id;
            if map.insert(id, level).is_some() {
                return Err(RegistryError::DuplicateLevel(id));
            }
        }
        if !map.contains_key(&start_level) {
            return Err(RegistryError::UnknownStartLevel(start_level));
        }
        for level in map.values() {
            level.validate(&map)?;
        }
        Ok(LevelRegistry {
            start_level,
            levels: map,
        })
    }

    /// Load the registry shipped with the game.
    pub fn embedded() -> Result<LevelRegistry, RegistryError> {
        Self::from_json(EMBEDDED_LEVELS)
    }

    pub fn start_level(&self) -> &LevelDef {
        &self.levels[&self.start_level]
    }

    pub fn get(&self, id: LevelId) -> Option<&LevelDef> {
        self.levels.get(&id)
    }

    #[cfg(test)]
    pub fn iter(&self) -> impl Iterator<Item = &LevelDef> {
        self.levels.values()
    }
}
