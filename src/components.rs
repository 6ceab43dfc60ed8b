use bevy::prelude::*;
use serde::{Deserialize, Serialize};

/// Set when the app runs without a window (tests, `--headless`, `--simulate`).
#[derive(Resource, Clone, Copy, Default)]
pub struct HeadlessMode(pub bool);

/// Which of the two local players an entity, flag or key binding belongs to.
/// Serialized as the numeric `playerType` (1 or 2) used by level files.
#[derive(
    Component, Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize, PartialOrd, Ord,
)]
#[serde(try_from = "u8", into = "u8")]
pub enum PlayerSlot {
    One,
    Two,
}

impl PlayerSlot {
    pub const ALL: [PlayerSlot; 2] = [PlayerSlot::One, PlayerSlot::Two];

    pub fn index(self) -> usize {
        match self {
            PlayerSlot::One => 0,
            PlayerSlot::Two => 1,
        }
    }

    pub fn number(self) -> u8 {
        self.index() as u8 + 1
    }
}

impl TryFrom<u8> for PlayerSlot {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(PlayerSlot::One),
            2 => Ok(PlayerSlot::Two),
            other => Err(format!("playerType must be 1 or 2, got {other}")),
        }
    }
}

impl From<PlayerSlot> for u8 {
    fn from(slot: PlayerSlot) -> Self {
        slot.number()
    }
}

/// Stage-space point in pixels, y pointing down. Serialized as `{x, y}`.
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl From<Vec2> for Point {
    fn from(v: Vec2) -> Self {
        Self { x: v.x, y: v.y }
    }
}

impl From<Point> for Vec2 {
    fn from(p: Point) -> Self {
        Vec2::new(p.x, p.y)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LineSegment {
    pub start: Point,
    pub end: Point,
}

impl LineSegment {
    pub fn new(start: impl Into<Point>, end: impl Into<Point>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }

    pub fn delta(&self) -> Vec2 {
        Vec2::from(self.end) - Vec2::from(self.start)
    }

    pub fn length(&self) -> f32 {
        self.delta().length()
    }

    pub fn midpoint(&self) -> Vec2 {
        (Vec2::from(self.start) + Vec2::from(self.end)) * 0.5
    }

    /// Orientation in radians, `atan2(dy, dx)`.
    pub fn angle(&self) -> f32 {
        let d = self.delta();
        d.y.atan2(d.x)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformKind {
    /// Derived from a captured pose; lives for one attempt and is never saved.
    Temporary,
    Permanent,
    Ground,
}

impl PlatformKind {
    pub fn is_persistent(self) -> bool {
        self != PlatformKind::Temporary
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Platform {
    pub start: Point,
    pub end: Point,
    pub thickness: f32,
    #[serde(rename = "type")]
    pub kind: PlatformKind,
}

impl Platform {
    pub fn from_segment(segment: LineSegment, thickness: f32, kind: PlatformKind) -> Self {
        Self {
            start: segment.start,
            end: segment.end,
            thickness,
            kind,
        }
    }

    pub fn segment(&self) -> LineSegment {
        LineSegment {
            start: self.start,
            end: self.end,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Flag {
    #[serde(rename = "playerType")]
    pub owner: PlayerSlot,
    /// Centre of the flag sensor; the pole hangs below it.
    #[serde(rename = "flag")]
    pub position: Point,
    #[serde(default)]
    pub raised: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Facing {
    Left,
    #[default]
    Right,
}

/// Tunables for capture, extraction, timers and locomotion.
#[derive(Resource, Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub window_title: String,
    pub window_width: f32,
    pub window_height: f32,
    pub stage_width: f32,
    pub stage_height: f32,
    pub level_path: Option<String>,
    pub snapshot_path: Option<String>,

    // Pose extraction
    pub max_people: usize,
    pub detector_score_threshold: f32,
    pub min_keypoint_score: f32,
    pub min_segment_length: f32,
    pub quantize_step: f32,
    pub platform_thickness: f32,

    // Phase timers (seconds)
    pub pose_seconds: f32,
    pub game_seconds: f32,

    // Locomotion, velocities in pixels per tick
    pub move_speed: f32,
    pub max_fall_speed: f32,
    pub air_damping: f32,
    pub jump_force: f32,
    pub idle_slope_cancel: f32,
    pub moving_slope_cancel: f32,
    pub ground_normal_y: f32,

    // Bodies
    pub player_width: f32,
    pub player_height: f32,
    pub player_friction: f32,
    pub platform_friction: f32,
    pub flag_size: f32,
    pub pole_height: f32,
    pub gravity: f32,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            window_title: "Posejump".to_string(),
            window_width: 800.0,
            window_height: 600.0,
            stage_width: 800.0,
            stage_height: 600.0,
            level_path: None,
            snapshot_path: None,
            max_people: 3,
            detector_score_threshold: 0.3,
            min_keypoint_score: 0.35,
            min_segment_length: 18.0,
            quantize_step: 6.0,
            platform_thickness: 8.0,
            pose_seconds: 10.0,
            game_seconds: 60.0,
            move_speed: 5.0,
            max_fall_speed: 15.0,
            air_damping: 0.9,
            jump_force: 0.04,
            idle_slope_cancel: 1.0,
            moving_slope_cancel: 0.65,
            ground_normal_y: -0.5,
            player_width: 30.0,
            player_height: 50.0,
            player_friction: 0.1,
            platform_friction: 0.8,
            flag_size: 30.0,
            pole_height: 60.0,
            gravity: 1.0,
        }
    }
}

impl GameConfig {
    pub fn stage_size(&self) -> Vec2 {
        Vec2::new(self.stage_width, self.stage_height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn player_slot_round_trips_through_player_type_number() {
        assert_eq!(PlayerSlot::try_from(1u8), Ok(PlayerSlot::One));
        assert_eq!(PlayerSlot::try_from(2u8), Ok(PlayerSlot::Two));
        assert!(PlayerSlot::try_from(3u8).is_err());
        assert_eq!(u8::from(PlayerSlot::Two), 2);
    }

    #[test]
    fn segment_geometry() {
        let seg = LineSegment::new(Vec2::new(0.0, 0.0), Vec2::new(10.0, 10.0));
        assert!((seg.length() - 200f32.sqrt()).abs() < 1e-5);
        assert_eq!(seg.midpoint(), Vec2::new(5.0, 5.0));
        assert!((seg.angle() - std::f32::consts::FRAC_PI_4).abs() < 1e-6);
    }

    #[test]
    fn config_fills_missing_fields_with_defaults() {
        let cfg: GameConfig = serde_json::from_str(r#"{"move_speed": 7.5}"#).unwrap();
        assert_eq!(cfg.move_speed, 7.5);
        assert_eq!(cfg.max_people, 3);
        assert_eq!(cfg.min_keypoint_score, 0.35);
    }
}
