use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::components::{Flag, GameConfig, Platform, PlatformKind, PlayerSlot, Point};

/// Level JSON baked in at build time via `POSEJUMP_EMBED_LEVEL_PATH`; empty when unset.
const EMBEDDED_LEVEL: &str = include_str!(concat!(env!("OUT_DIR"), "/posejump_embedded_level.json"));

#[derive(Debug, Error)]
pub enum LevelError {
    #[error("level json is malformed: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read level file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("platform {index} has a non-finite coordinate")]
    NonFinitePlatform { index: usize },
    #[error("platform {index} has thickness {thickness}, expected > 0")]
    BadThickness { index: usize, thickness: f32 },
    #[error("platform {index} is temporary; saved levels only hold authored platforms")]
    TemporaryPlatform { index: usize },
    #[error("flag {index} has a non-finite position")]
    NonFiniteFlag { index: usize },
    #[error("{field} is not a finite point")]
    NonFiniteSpawn { field: &'static str },
    #[error("timeLimit must be positive, got {0}")]
    BadTimeLimit(f32),
}

/// Persisted / interchange level. Coordinates are pixels on the 800x600
/// authoring canvas; loaders scale them to the stage exactly once.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedLevel {
    pub platforms: Vec<Platform>,
    pub flags: Vec<Flag>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player1_spawn: Option<Point>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player2_spawn: Option<Point>,
    /// Per-level override of the game countdown, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_limit: Option<f32>,
}

impl SavedLevel {
    /// Parse and validate; nothing is returned unless the whole file is sound.
    pub fn from_json(json: &str) -> Result<Self, LevelError> {
        let level: SavedLevel = serde_json::from_str(json)?;
        level.validate()?;
        Ok(level)
    }

    pub fn from_file(path: &str) -> Result<Self, LevelError> {
        let json = std::fs::read_to_string(path).map_err(|source| LevelError::Io {
            path: path.to_string(),
            source,
        })?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> Result<String, LevelError> {
        Ok(serde_json::to_string_pretty(&self.persistent())?)
    }

    /// Copy with temporary platforms stripped.
    pub fn persistent(&self) -> SavedLevel {
        SavedLevel {
            platforms: self
                .platforms
                .iter()
                .copied()
                .filter(|p| p.kind.is_persistent())
                .collect(),
            ..self.clone()
        }
    }

    pub fn validate(&self) -> Result<(), LevelError> {
        for (index, p) in self.platforms.iter().enumerate() {
            if !p.start.is_finite() || !p.end.is_finite() {
                return Err(LevelError::NonFinitePlatform { index });
            }
            if !(p.thickness > 0.0 && p.thickness.is_finite()) {
                return Err(LevelError::BadThickness {
                    index,
                    thickness: p.thickness,
                });
            }
            if p.kind == PlatformKind::Temporary {
                return Err(LevelError::TemporaryPlatform { index });
            }
        }
        for (index, f) in self.flags.iter().enumerate() {
            if !f.position.is_finite() {
                return Err(LevelError::NonFiniteFlag { index });
            }
        }
        for (field, spawn) in [
            ("player1Spawn", self.player1_spawn),
            ("player2Spawn", self.player2_spawn),
        ] {
            if spawn.is_some_and(|p| !p.is_finite()) {
                return Err(LevelError::NonFiniteSpawn { field });
            }
        }
        if let Some(limit) = self.time_limit {
            if !(limit > 0.0 && limit.is_finite()) {
                return Err(LevelError::BadTimeLimit(limit));
            }
        }
        Ok(())
    }

    /// Spawn for a player, falling back to a point above each side of the stage.
    pub fn spawn(&self, slot: PlayerSlot, stage: Vec2) -> Vec2 {
        let explicit = match slot {
            PlayerSlot::One => self.player1_spawn,
            PlayerSlot::Two => self.player2_spawn,
        };
        explicit.map(Vec2::from).unwrap_or_else(|| match slot {
            PlayerSlot::One => Vec2::new(stage.x * 0.125, stage.y * 0.5),
            PlayerSlot::Two => Vec2::new(stage.x * 0.875, stage.y * 0.5),
        })
    }

    /// Built-in stage: a ground strip and one flag per player on raised ledges.
    pub fn default_stage(stage: Vec2) -> Self {
        let ground_y = stage.y - 20.0;
        let ledge_y = stage.y * 0.45;
        let platform = |x0: f32, y0: f32, x1: f32, y1: f32, kind| Platform {
            start: Point::new(x0, y0),
            end: Point::new(x1, y1),
            thickness: 20.0,
            kind,
        };
        SavedLevel {
            platforms: vec![
                platform(0.0, ground_y, stage.x, ground_y, PlatformKind::Ground),
                platform(0.0, ledge_y, stage.x * 0.2, ledge_y, PlatformKind::Permanent),
                platform(stage.x * 0.8, ledge_y, stage.x, ledge_y, PlatformKind::Permanent),
            ],
            flags: vec![
                Flag {
                    owner: PlayerSlot::One,
                    position: Point::new(stage.x * 0.9, ledge_y - 70.0),
                    raised: false,
                },
                Flag {
                    owner: PlayerSlot::Two,
                    position: Point::new(stage.x * 0.1, ledge_y - 70.0),
                    raised: false,
                },
            ],
            player1_spawn: Some(Point::new(stage.x * 0.125, ground_y - 60.0)),
            player2_spawn: Some(Point::new(stage.x * 0.875, ground_y - 60.0)),
            time_limit: None,
        }
    }

    pub fn embedded() -> Option<Result<Self, LevelError>> {
        if EMBEDDED_LEVEL.trim().is_empty() {
            return None;
        }
        Some(Self::from_json(EMBEDDED_LEVEL))
    }
}

/// Affine map from the canvas a level was authored on to the live stage.
/// Applied once, at load time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StageTransform {
    pub reference: Vec2,
    pub target: Vec2,
}

impl StageTransform {
    pub const REFERENCE_CANVAS: Vec2 = Vec2::new(800.0, 600.0);

    pub fn new(reference: Vec2, target: Vec2) -> Self {
        Self { reference, target }
    }

    /// Authoring canvas to the live stage.
    pub fn for_stage(stage: Vec2) -> Self {
        Self::new(Self::REFERENCE_CANVAS, stage)
    }

    pub fn inverse(&self) -> Self {
        Self::new(self.target, self.reference)
    }

    pub fn scale(&self) -> Vec2 {
        self.target / self.reference.max(Vec2::splat(f32::EPSILON))
    }

    pub fn point(&self, p: Point) -> Point {
        (Vec2::from(p) * self.scale()).into()
    }

    pub fn apply(&self, level: &SavedLevel) -> SavedLevel {
        let s = self.scale();
        // Thickness follows the vertical axis.
        SavedLevel {
            platforms: level
                .platforms
                .iter()
                .map(|p| Platform {
                    start: self.point(p.start),
                    end: self.point(p.end),
                    thickness: p.thickness * s.y,
                    kind: p.kind,
                })
                .collect(),
            flags: level
                .flags
                .iter()
                .map(|f| Flag {
                    position: self.point(f.position),
                    ..*f
                })
                .collect(),
            player1_spawn: level.player1_spawn.map(|p| self.point(p)),
            player2_spawn: level.player2_spawn.map(|p| self.point(p)),
            time_limit: level.time_limit,
        }
    }
}

/// The authored level every attempt is built from, already scaled to the
/// stage.
#[derive(Resource, Clone, Debug, Default)]
pub struct LevelStore {
    pub level: SavedLevel,
}

impl LevelStore {
    /// All-or-nothing replace: on error the current level is untouched.
    pub fn load_file(&mut self, path: &str, transform: StageTransform) -> Result<(), LevelError> {
        let level = SavedLevel::from_file(path)?;
        self.level = transform.apply(&level);
        Ok(())
    }
}

/// Level edits waiting for the next reset; attempts in progress and retries
/// keep the level they started with.
#[derive(Resource, Default)]
pub struct PendingLevelReload(pub Option<SavedLevel>);

pub struct LevelPlugin;

impl Plugin for LevelPlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(LevelStore::default())
            .insert_resource(PendingLevelReload::default())
            .add_systems(PreStartup, load_initial_level);
    }
}

fn load_initial_level(config: Res<GameConfig>, mut store: ResMut<LevelStore>) {
    let stage = config.stage_size();
    let transform = StageTransform::for_stage(stage);
    if let Some(path) = config.level_path.as_deref() {
        match store.load_file(path, transform) {
            Ok(()) => {
                info!(
                    "[Posejump level] Loaded {} ({} platforms, {} flags)",
                    path,
                    store.level.platforms.len(),
                    store.level.flags.len()
                );
                return;
            }
            Err(e) => error!("[Posejump level] {e}; falling back to the built-in stage"),
        }
    } else if let Some(embedded) = SavedLevel::embedded() {
        match embedded {
            Ok(level) => {
                store.level = transform.apply(&level);
                info!("[Posejump level] Using embedded level");
                return;
            }
            Err(e) => error!("[Posejump level] Embedded level invalid: {e}"),
        }
    }
    store.level = SavedLevel::default_stage(stage);
}
