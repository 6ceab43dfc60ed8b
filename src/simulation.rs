use serde::{Deserialize, Serialize};

use crate::components::{GameConfig, LineSegment, Platform, PlatformKind, PlayerSlot};
use crate::events::{GameEventBus, GameEventKind};
use crate::input::{InputSnapshot, PlayerKeys};
use crate::level::{LevelError, SavedLevel};
use crate::physics::TICK_HZ;
use crate::pose::{Pose, PoseExtractor};
use crate::session::GameSession;

/// Scripted run of one attempt: a level, the temporary platforms that a
/// capture would have frozen, and per-player key presses by frame.
#[derive(Deserialize, Clone)]
pub struct SimulationRequest {
    pub level: Option<SavedLevel>,
    /// Temporary platform segments, used as-is.
    #[serde(default)]
    pub segments: Vec<LineSegment>,
    /// Detector output run through the extractor, as at the end of the pose phase.
    #[serde(default)]
    pub poses: Vec<Pose>,
    pub inputs: Vec<SimInput>,
    pub max_frames: u32,
    #[serde(default = "default_record_interval")]
    pub record_interval: u32,
    pub config: Option<GameConfig>,
}

fn default_record_interval() -> u32 {
    1
}

#[derive(Deserialize, Clone)]
pub struct SimInput {
    #[serde(default = "default_player")]
    pub player: u8,
    pub frame: u32,
    pub action: String,
    #[serde(default)]
    pub duration: u32,
}

fn default_player() -> u8 {
    1
}

#[derive(Serialize, Clone)]
pub struct SimulationResult {
    pub outcome: String,
    pub frames_elapsed: u32,
    pub raised: Vec<bool>,
    pub trace: Vec<TraceFrame>,
    pub events: Vec<SimEvent>,
}

#[derive(Serialize, Clone)]
pub struct TraceFrame {
    pub frame: u32,
    pub player: u8,
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub grounded: bool,
}

#[derive(Serialize, Clone)]
pub struct SimEvent {
    pub frame: u32,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flag: Option<usize>,
}

/// Which keys each player holds on each frame.
fn held_keys(request: &SimulationRequest) -> Vec<[PlayerKeys; 2]> {
    let mut held = vec![[PlayerKeys::default(); 2]; request.max_frames as usize + 1];
    for input in &request.inputs {
        let Ok(slot) = PlayerSlot::try_from(input.player) else {
            continue;
        };
        let duration = input.duration.max(1);
        for f in input.frame..input.frame.saturating_add(duration).min(request.max_frames) {
            let keys = &mut held[f as usize][slot.index()];
            match input.action.as_str() {
                "left" => keys.left = true,
                "right" => keys.right = true,
                "jump" | "up" => keys.jump_held = true,
                _ => {}
            }
        }
    }
    held
}

/// Drives the same per-tick session code the game uses, one frame per tick,
/// with key edges handled exactly like the keyboard path.
/// A request level goes through the same validation as a level file.
pub fn run_simulation(request: &SimulationRequest) -> Result<SimulationResult, LevelError> {
    let config = request.config.clone().unwrap_or_default();
    let level = match &request.level {
        Some(level) => {
            level.validate()?;
            level.clone()
        }
        None => SavedLevel::default_stage(config.stage_size()),
    };

    let mut temporary: Vec<Platform> = request
        .segments
        .iter()
        .map(|s| Platform::from_segment(*s, config.platform_thickness, PlatformKind::Temporary))
        .collect();
    if !request.poses.is_empty() {
        temporary.extend(PoseExtractor::from_config(&config).temporary_platforms(&request.poses));
    }

    let mut session = GameSession::build(1, &level, &temporary, &config);
    let time_limit = level.time_limit.unwrap_or(config.game_seconds);
    let tick_limit = (time_limit * TICK_HZ).round() as u32;

    let held = held_keys(request);
    let mut input = InputSnapshot::default();
    let mut prev_held = [false; 2];
    let mut bus = GameEventBus::default();
    let mut trace = Vec::new();
    let mut events = Vec::new();
    let mut outcome = "timeout".to_string();
    let mut frames_elapsed = 0;

    for frame in 0..request.max_frames {
        for slot in PlayerSlot::ALL {
            let want = held[frame as usize][slot.index()];
            let keys = input.keys_mut(slot);
            keys.left = want.left;
            keys.right = want.right;
            keys.press_jump(want.jump_held, want.jump_held && !prev_held[slot.index()]);
            prev_held[slot.index()] = want.jump_held;
        }

        bus.frame = u64::from(frame);
        let report = session.tick(&mut input);
        report.emit(&mut bus);
        frames_elapsed = frame + 1;

        if request.record_interval > 0 && frame % request.record_interval == 0 {
            for view in session.players() {
                trace.push(TraceFrame {
                    frame,
                    player: view.slot.number(),
                    x: view.position.x,
                    y: view.position.y,
                    vx: view.velocity.x,
                    vy: view.velocity.y,
                    grounded: view.grounded,
                });
            }
        }

        if report.won {
            bus.emit(GameEventKind::Win { attempt: session.attempt() });
            outcome = "won".to_string();
            break;
        }
        if frames_elapsed >= tick_limit {
            bus.emit(GameEventKind::Lose { attempt: session.attempt() });
            outcome = "lost".to_string();
            break;
        }
    }

    for event in bus.drain() {
        events.push(SimEvent {
            frame: event.frame as u32,
            event_type: event.kind.name().to_string(),
            player: event.kind.player(),
            flag: event.kind.flag(),
        });
    }

    Ok(SimulationResult {
        outcome,
        frames_elapsed,
        raised: session.flags().flags().iter().map(|f| f.raised).collect(),
        trace,
        events,
    })
}
