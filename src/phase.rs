use bevy::prelude::*;
use serde::Serialize;
use thiserror::Error;

use crate::capture::CaptureStatus;
use crate::components::{GameConfig, HeadlessMode};
use crate::events::{GameEventBus, GameEventKind};
use crate::level::{LevelStore, PendingLevelReload};

#[derive(States, Default, Clone, Copy, Eq, PartialEq, Debug, Hash, Serialize)]
pub enum GamePhase {
    #[default]
    Ready,
    Pose,
    Game,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PhaseError {
    #[error("camera or pose detector is not ready")]
    CaptureNotReady,
    #[error("cannot {action} while in {phase:?}")]
    WrongPhase { action: &'static str, phase: GamePhase },
    #[error("the current attempt has not been won or lost yet")]
    NoOutcome,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum PhaseChange {
    PoseStarted,
    GameStarted { attempt: u64 },
    Won,
    Lost,
    Retried { attempt: u64 },
    Reset,
}

impl PhaseChange {
    fn event(self, machine: &PhaseMachine) -> GameEventKind {
        let attempt = machine.attempt();
        match self {
            PhaseChange::Won => GameEventKind::Win { attempt },
            PhaseChange::Lost => GameEventKind::Lose { attempt },
            change => GameEventKind::PhaseEnter {
                phase: machine.phase(),
                change,
                attempt,
            },
        }
    }
}

/// Ready → pose (timed) → game (timed) → won | lost, with retry and reset.
/// Won and lost sit on top of `Game` and exclude each other per attempt.
#[derive(Resource, Clone, Debug)]
pub struct PhaseMachine {
    phase: GamePhase,
    won: bool,
    lost: bool,
    pose_seconds: f32,
    game_seconds: f32,
    pose_remaining: f32,
    game_remaining: f32,
    attempt: u64,
    resets: u64,
    camera_interrupted: bool,
}

impl PhaseMachine {
    pub fn new(pose_seconds: f32, game_seconds: f32) -> Self {
        Self {
            phase: GamePhase::Ready,
            won: false,
            lost: false,
            pose_seconds,
            game_seconds,
            pose_remaining: pose_seconds,
            game_remaining: game_seconds,
            attempt: 0,
            resets: 0,
            camera_interrupted: false,
        }
    }

    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    pub fn won(&self) -> bool {
        self.won
    }

    pub fn lost(&self) -> bool {
        self.lost
    }

    /// Bumped on every entry into `Game`, including retries.
    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    /// Bumped on every successful reset.
    pub fn resets(&self) -> u64 {
        self.resets
    }

    pub fn pose_remaining(&self) -> f32 {
        self.pose_remaining
    }

    pub fn game_remaining(&self) -> f32 {
        self.game_remaining
    }

    /// True while the simulation should advance.
    pub fn in_play(&self) -> bool {
        self.phase == GamePhase::Game && !self.won && !self.lost
    }

    /// Takes effect at the next attempt.
    pub fn set_game_seconds(&mut self, seconds: f32) {
        self.game_seconds = seconds;
    }

    pub fn start(&mut self, capture_ready: bool) -> Result<PhaseChange, PhaseError> {
        if self.phase != GamePhase::Ready {
            return Err(PhaseError::WrongPhase {
                action: "start",
                phase: self.phase,
            });
        }
        if !capture_ready {
            return Err(PhaseError::CaptureNotReady);
        }
        self.phase = GamePhase::Pose;
        self.pose_remaining = self.pose_seconds;
        self.camera_interrupted = false;
        Ok(PhaseChange::PoseStarted)
    }

    pub fn tick(&mut self, dt: f32, capture_ready: bool) -> Option<PhaseChange> {
        match self.phase {
            GamePhase::Ready => None,
            GamePhase::Pose => {
                if !capture_ready {
                    self.camera_interrupted = true;
                }
                if self.camera_interrupted {
                    return None;
                }
                self.pose_remaining = (self.pose_remaining - dt).max(0.0);
                if self.pose_remaining > 0.0 {
                    return None;
                }
                Some(self.begin_attempt(|attempt| PhaseChange::GameStarted { attempt }))
            }
            GamePhase::Game => {
                if !self.in_play() {
                    return None;
                }
                self.game_remaining = (self.game_remaining - dt).max(0.0);
                if self.game_remaining > 0.0 {
                    return None;
                }
                self.lost = true;
                Some(PhaseChange::Lost)
            }
        }
    }

    /// Edge-triggered: only the first call in an undecided attempt counts.
    pub fn record_win(&mut self) -> Option<PhaseChange> {
        if !self.in_play() {
            return None;
        }
        self.won = true;
        Some(PhaseChange::Won)
    }

    pub fn retry(&mut self) -> Result<PhaseChange, PhaseError> {
        if self.phase != GamePhase::Game {
            return Err(PhaseError::WrongPhase {
                action: "retry",
                phase: self.phase,
            });
        }
        if !self.won && !self.lost {
            return Err(PhaseError::NoOutcome);
        }
        Ok(self.begin_attempt(|attempt| PhaseChange::Retried { attempt }))
    }

    /// Back to `Ready` from a finished attempt, or from a capture phase that
    /// hit a camera/detector failure.
    pub fn reset(&mut self, capture_failed: bool) -> Result<PhaseChange, PhaseError> {
        let allowed = match self.phase {
            GamePhase::Game => self.won || self.lost,
            GamePhase::Ready | GamePhase::Pose => capture_failed,
        };
        if !allowed {
            return Err(if self.phase == GamePhase::Game {
                PhaseError::NoOutcome
            } else {
                PhaseError::WrongPhase {
                    action: "reset",
                    phase: self.phase,
                }
            });
        }
        self.phase = GamePhase::Ready;
        self.won = false;
        self.lost = false;
        self.pose_remaining = self.pose_seconds;
        self.game_remaining = self.game_seconds;
        self.camera_interrupted = false;
        self.resets += 1;
        Ok(PhaseChange::Reset)
    }

    fn begin_attempt(&mut self, change: impl FnOnce(u64) -> PhaseChange) -> PhaseChange {
        self.phase = GamePhase::Game;
        self.attempt += 1;
        self.won = false;
        self.lost = false;
        self.game_remaining = self.game_seconds;
        change(self.attempt)
    }
}

pub struct PhasePlugin;

impl Plugin for PhasePlugin {
    fn build(&self, app: &mut App) {
        let config = app
            .world()
            .get_resource::<GameConfig>()
            .cloned()
            .unwrap_or_default();
        app.insert_resource(PhaseMachine::new(config.pose_seconds, config.game_seconds))
            .init_state::<GamePhase>()
            .add_systems(
                Update,
                (
                    apply_level_time_limit.run_if(resource_changed::<LevelStore>),
                    phase_keys.run_if(resource_exists::<ButtonInput<KeyCode>>),
                    headless_autostart.run_if(is_headless),
                    tick_phase,
                    sync_bevy_state_from_phase,
                )
                    .chain(),
            );
    }
}

pub fn log_phase_change(change: PhaseChange, machine: &PhaseMachine, events: &mut GameEventBus) {
    info!(
        "[Posejump phase] {:?} (phase {:?}, attempt {})",
        change,
        machine.phase(),
        machine.attempt()
    );
    events.emit(change.event(machine));
}

fn apply_level_time_limit(config: Res<GameConfig>, store: Res<LevelStore>, mut machine: ResMut<PhaseMachine>) {
    machine.set_game_seconds(store.level.time_limit.unwrap_or(config.game_seconds));
}

fn phase_keys(
    keyboard: Res<ButtonInput<KeyCode>>,
    capture: Res<CaptureStatus>,
    mut machine: ResMut<PhaseMachine>,
    mut events: ResMut<GameEventBus>,
    mut pending: ResMut<PendingLevelReload>,
    mut store: ResMut<LevelStore>,
) {
    let result = if keyboard.any_just_pressed([KeyCode::Enter, KeyCode::Space]) {
        Some(machine.start(capture.is_ready()))
    } else if keyboard.just_pressed(KeyCode::KeyR) {
        Some(machine.retry())
    } else if keyboard.just_pressed(KeyCode::Escape) {
        let reset = machine.reset(capture.is_failed());
        if reset.is_ok() {
            if let Some(level) = pending.0.take() {
                info!("[Posejump phase] Applying reloaded level on reset");
                store.level = level;
            }
        }
        Some(reset)
    } else {
        None
    };

    match result {
        Some(Ok(change)) => log_phase_change(change, &machine, &mut events),
        Some(Err(e)) => warn!("[Posejump phase] {e}"),
        None => {}
    }
}

fn is_headless(headless: Option<Res<HeadlessMode>>) -> bool {
    headless.is_some_and(|h| h.0)
}

/// Without a keyboard the start signal is the capture becoming ready.
fn headless_autostart(
    capture: Res<CaptureStatus>,
    mut machine: ResMut<PhaseMachine>,
    mut events: ResMut<GameEventBus>,
) {
    if machine.phase() == GamePhase::Ready && capture.is_ready() {
        if let Ok(change) = machine.start(true) {
            log_phase_change(change, &machine, &mut events);
        }
    }
}

fn tick_phase(
    time: Res<Time>,
    capture: Res<CaptureStatus>,
    mut machine: ResMut<PhaseMachine>,
    mut events: ResMut<GameEventBus>,
) {
    if let Some(change) = machine.tick(time.delta_secs(), capture.is_ready()) {
        log_phase_change(change, &machine, &mut events);
    }
}

fn sync_bevy_state_from_phase(
    machine: Res<PhaseMachine>,
    state: Res<State<GamePhase>>,
    mut next_state: ResMut<NextState<GamePhase>>,
) {
    if state.get() != &machine.phase() {
        next_state.set(machine.phase());
    }
}
