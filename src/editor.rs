//! Point-and-click level authoring. Produces and consumes the same
//! `SavedLevel` JSON the game loads. Clicks arrive in stage pixels and are
//! stored on the authoring canvas, so a saved level loads at the size it
//! was drawn whatever the stage size.

use bevy::gizmos::config::GizmoConfigStore;
use bevy::prelude::*;
use bevy::window::PrimaryWindow;

use crate::components::{Flag, GameConfig, LineSegment, Platform, PlatformKind, PlayerSlot, Point};
use crate::level::{LevelError, SavedLevel, StageTransform};
use crate::pose::PlatformBody;
use crate::render::{draw_flag, draw_platform, slot_color, stage_to_world};

const PLATFORM_THICKNESS: f32 = 10.0;
const GROUND_THICKNESS: f32 = 20.0;
const POLE_WIDTH: f32 = 6.0;
const MIN_PLATFORM_LENGTH: f32 = 1.0;
const DEFAULT_SAVE_PATH: &str = "level.json";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EditorTool {
    Platform,
    Ground,
    Flag(PlayerSlot),
    Spawn(PlayerSlot),
    Delete,
}

impl EditorTool {
    /// Number-key shortcuts 1 through 7.
    pub fn from_digit(digit: u8) -> Option<Self> {
        Some(match digit {
            1 => EditorTool::Platform,
            2 => EditorTool::Ground,
            3 => EditorTool::Flag(PlayerSlot::One),
            4 => EditorTool::Flag(PlayerSlot::Two),
            5 => EditorTool::Spawn(PlayerSlot::One),
            6 => EditorTool::Spawn(PlayerSlot::Two),
            7 => EditorTool::Delete,
            _ => return None,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Removed {
    Platform(usize),
    Flag(usize),
    Spawn(PlayerSlot),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum EditAction {
    PendingStart(Point),
    PlatformAdded(usize),
    FlagPlaced(usize),
    SpawnPlaced(PlayerSlot),
    Removed(Removed),
    Nothing,
}

#[derive(Resource, Clone, Debug)]
pub struct LevelEditor {
    level: SavedLevel,
    tool: EditorTool,
    pending_start: Option<Point>,
    canvas: StageTransform,
    flag_size: f32,
    pole_height: f32,
    player_size: Vec2,
}

impl LevelEditor {
    pub fn new(config: &GameConfig) -> Self {
        Self {
            level: SavedLevel::default(),
            tool: EditorTool::Platform,
            pending_start: None,
            canvas: StageTransform::for_stage(config.stage_size()),
            flag_size: config.flag_size,
            pole_height: config.pole_height,
            player_size: Vec2::new(config.player_width, config.player_height),
        }
    }

    /// The level on the authoring canvas, as it is saved.
    pub fn level(&self) -> &SavedLevel {
        &self.level
    }

    /// The level as the game will lay it out on this stage.
    pub fn stage_level(&self) -> SavedLevel {
        self.canvas.apply(&self.level)
    }

    pub fn pending_start(&self) -> Option<Point> {
        self.pending_start
    }

    /// Switching tools drops a half-placed platform.
    pub fn set_tool(&mut self, tool: EditorTool) {
        self.tool = tool;
        self.pending_start = None;
    }

    /// Replace the whole level; flags come back lowered.
    pub fn import(&mut self, level: SavedLevel) {
        self.level = SavedLevel {
            flags: level
                .flags
                .iter()
                .map(|f| Flag { raised: false, ..*f })
                .collect(),
            ..level
        };
        self.pending_start = None;
    }

    pub fn import_json(&mut self, json: &str) -> Result<(), LevelError> {
        let level = SavedLevel::from_json(json)?;
        self.import(level);
        Ok(())
    }

    pub fn export(&self) -> SavedLevel {
        self.level.persistent()
    }

    pub fn export_json(&self) -> Result<String, LevelError> {
        self.export().to_json()
    }

    /// `at` is in stage pixels.
    pub fn click(&mut self, at: Point) -> EditAction {
        if self.tool == EditorTool::Delete {
            return match self.hit_test(at) {
                Some(hit) => {
                    self.remove(hit);
                    EditAction::Removed(hit)
                }
                None => EditAction::Nothing,
            };
        }
        let at = self.canvas.inverse().point(at);
        match self.tool {
            EditorTool::Platform => self.place_platform(at, PlatformKind::Permanent, PLATFORM_THICKNESS),
            EditorTool::Ground => self.place_platform(at, PlatformKind::Ground, GROUND_THICKNESS),
            EditorTool::Flag(owner) => {
                self.level.flags.push(Flag {
                    owner,
                    position: at,
                    raised: false,
                });
                EditAction::FlagPlaced(self.level.flags.len() - 1)
            }
            EditorTool::Spawn(slot) => {
                match slot {
                    PlayerSlot::One => self.level.player1_spawn = Some(at),
                    PlayerSlot::Two => self.level.player2_spawn = Some(at),
                }
                EditAction::SpawnPlaced(slot)
            }
            EditorTool::Delete => EditAction::Nothing,
        }
    }

    fn place_platform(&mut self, at: Point, kind: PlatformKind, thickness: f32) -> EditAction {
        let Some(start) = self.pending_start.take() else {
            self.pending_start = Some(at);
            return EditAction::PendingStart(at);
        };
        let segment = LineSegment::new(start, at);
        if segment.length() < MIN_PLATFORM_LENGTH {
            return EditAction::Nothing;
        }
        self.level
            .platforms
            .push(Platform::from_segment(segment, thickness, kind));
        EditAction::PlatformAdded(self.level.platforms.len() - 1)
    }

    /// First entity under a stage point: platforms, then flags with their
    /// poles, then spawn markers.
    pub fn hit_test(&self, at: Point) -> Option<Removed> {
        let p = Vec2::from(at);
        let level = self.stage_level();
        if let Some(index) = level
            .platforms
            .iter()
            .position(|pl| PlatformBody::from_segment(&pl.segment(), pl.thickness).contains(p))
        {
            return Some(Removed::Platform(index));
        }
        if let Some(index) = level.flags.iter().position(|f| self.flag_contains(f, p)) {
            return Some(Removed::Flag(index));
        }
        PlayerSlot::ALL.into_iter().find_map(|slot| {
            let spawn = match slot {
                PlayerSlot::One => level.player1_spawn,
                PlayerSlot::Two => level.player2_spawn,
            }?;
            let d = (p - Vec2::from(spawn)).abs();
            (d.x <= self.player_size.x * 0.5 && d.y <= self.player_size.y * 0.5).then_some(Removed::Spawn(slot))
        })
    }

    fn flag_contains(&self, flag: &Flag, p: Vec2) -> bool {
        let center = Vec2::from(flag.position);
        let half = self.flag_size * 0.5;
        let d = p - center;
        let on_flag = d.x.abs() <= half && d.y.abs() <= half;
        let on_pole = d.x.abs() <= POLE_WIDTH * 0.5 && d.y >= half && d.y <= half + self.pole_height;
        on_flag || on_pole
    }

    fn remove(&mut self, hit: Removed) {
        match hit {
            Removed::Platform(index) => {
                self.level.platforms.remove(index);
            }
            Removed::Flag(index) => {
                self.level.flags.remove(index);
            }
            Removed::Spawn(PlayerSlot::One) => self.level.player1_spawn = None,
            Removed::Spawn(PlayerSlot::Two) => self.level.player2_spawn = None,
        }
    }
}

pub struct EditorPlugin;

impl Plugin for EditorPlugin {
    fn build(&self, app: &mut App) {
        let config = app
            .world()
            .get_resource::<GameConfig>()
            .cloned()
            .unwrap_or_default();
        let mut editor = LevelEditor::new(&config);
        if let Some(path) = config.level_path.as_deref() {
            match SavedLevel::from_file(path) {
                Ok(level) => {
                    info!("[Posejump editor] Editing {path}");
                    editor.import(level);
                }
                Err(e) => warn!("[Posejump editor] Starting empty: {e}"),
            }
        }
        app.insert_resource(editor).add_systems(
            Update,
            (
                editor_keys.run_if(resource_exists::<ButtonInput<KeyCode>>),
                editor_clicks.run_if(resource_exists::<ButtonInput<MouseButton>>),
                draw_editor.run_if(resource_exists::<GizmoConfigStore>),
            ),
        );
    }
}

const DIGIT_KEYS: [(KeyCode, u8); 7] = [
    (KeyCode::Digit1, 1),
    (KeyCode::Digit2, 2),
    (KeyCode::Digit3, 3),
    (KeyCode::Digit4, 4),
    (KeyCode::Digit5, 5),
    (KeyCode::Digit6, 6),
    (KeyCode::Digit7, 7),
];

fn editor_keys(keyboard: Res<ButtonInput<KeyCode>>, config: Res<GameConfig>, mut editor: ResMut<LevelEditor>) {
    for (key, digit) in DIGIT_KEYS {
        if keyboard.just_pressed(key) {
            if let Some(tool) = EditorTool::from_digit(digit) {
                editor.set_tool(tool);
                info!("[Posejump editor] Tool: {tool:?}");
            }
        }
    }

    let ctrl = keyboard.any_pressed([KeyCode::ControlLeft, KeyCode::ControlRight]);
    if ctrl && keyboard.just_pressed(KeyCode::KeyS) {
        let path = config.level_path.as_deref().unwrap_or(DEFAULT_SAVE_PATH);
        match editor.export_json() {
            Ok(json) => match std::fs::write(path, json) {
                Ok(()) => info!("[Posejump editor] Saved {path}"),
                Err(e) => error!("[Posejump editor] Failed to write {path}: {e}"),
            },
            Err(e) => error!("[Posejump editor] Failed to export level: {e}"),
        }
    }
}

fn editor_clicks(
    mouse: Res<ButtonInput<MouseButton>>,
    config: Res<GameConfig>,
    windows: Query<&Window, With<PrimaryWindow>>,
    mut editor: ResMut<LevelEditor>,
) {
    if !mouse.just_pressed(MouseButton::Left) {
        return;
    }
    let Ok(window) = windows.get_single() else {
        return;
    };
    let Some(cursor) = window.cursor_position() else {
        return;
    };
    // Window pixels share the stage's top-left origin; only the size may differ.
    let scale = config.stage_size() / Vec2::new(window.width(), window.height()).max(Vec2::ONE);
    let at = Point::from(cursor * scale);
    let action = editor.click(at);
    debug!("[Posejump editor] {action:?}");
}

fn draw_editor(mut gizmos: Gizmos, config: Res<GameConfig>, editor: Res<LevelEditor>) {
    let stage = config.stage_size();
    let level = editor.stage_level();
    for platform in &level.platforms {
        draw_platform(&mut gizmos, platform, stage);
    }
    for flag in &level.flags {
        draw_flag(&mut gizmos, flag, true, &config);
    }
    for (slot, spawn) in [
        (PlayerSlot::One, level.player1_spawn),
        (PlayerSlot::Two, level.player2_spawn),
    ] {
        if let Some(spawn) = spawn {
            gizmos.rect_2d(
                stage_to_world(spawn.into(), stage),
                Vec2::new(config.player_width, config.player_height),
                slot_color(slot),
            );
        }
    }
    if let Some(start) = editor.pending_start() {
        let start = StageTransform::for_stage(stage).point(start);
        gizmos.circle_2d(stage_to_world(start.into(), stage), 4.0, Color::WHITE);
    }
}
