use std::collections::VecDeque;

use bevy::prelude::*;
use serde::Serialize;

use crate::phase::{GamePhase, PhaseChange};

const MAX_EVENTS: usize = 500;

/// Everything the game reports. Serialized with a `name` tag, e.g.
/// `{"name": "flag_raised", "player": 1, "flag": 0}`.
#[derive(Serialize, Clone, Copy, Debug, PartialEq)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum GameEventKind {
    PhaseEnter {
        phase: GamePhase,
        change: PhaseChange,
        attempt: u64,
    },
    Win {
        attempt: u64,
    },
    Lose {
        attempt: u64,
    },
    FlagRaised {
        player: u8,
        flag: usize,
    },
    Jump {
        player: u8,
    },
    Land {
        player: u8,
    },
    PlatformsFrozen {
        count: usize,
    },
}

impl GameEventKind {
    pub fn name(&self) -> &'static str {
        match self {
            GameEventKind::PhaseEnter { .. } => "phase_enter",
            GameEventKind::Win { .. } => "win",
            GameEventKind::Lose { .. } => "lose",
            GameEventKind::FlagRaised { .. } => "flag_raised",
            GameEventKind::Jump { .. } => "jump",
            GameEventKind::Land { .. } => "land",
            GameEventKind::PlatformsFrozen { .. } => "platforms_frozen",
        }
    }

    pub fn player(&self) -> Option<u8> {
        match *self {
            GameEventKind::FlagRaised { player, .. }
            | GameEventKind::Jump { player }
            | GameEventKind::Land { player } => Some(player),
            _ => None,
        }
    }

    pub fn flag(&self) -> Option<usize> {
        match *self {
            GameEventKind::FlagRaised { flag, .. } => Some(flag),
            _ => None,
        }
    }
}

/// One reported event, stamped with the fixed tick it happened on.
#[derive(Serialize, Clone, Copy, Debug, PartialEq)]
pub struct GameEvent {
    #[serde(flatten)]
    pub kind: GameEventKind,
    pub frame: u64,
}

/// Bounded ring of recent events; the oldest fall off first.
#[derive(Resource, Default)]
pub struct GameEventBus {
    pub recent: VecDeque<GameEvent>,
    pub frame: u64,
    pub dropped_events: u64,
    last_overflow_log_frame: u64,
}

impl GameEventBus {
    pub fn emit(&mut self, kind: GameEventKind) {
        debug!("[Posejump events] @{} {:?}", self.frame, kind);
        self.recent.push_back(GameEvent {
            kind,
            frame: self.frame,
        });
        if self.recent.len() <= MAX_EVENTS {
            return;
        }
        let excess = self.recent.len() - MAX_EVENTS;
        self.recent.drain(..excess);
        self.dropped_events = self.dropped_events.saturating_add(excess as u64);
        if self.frame.saturating_sub(self.last_overflow_log_frame) >= 60 {
            self.last_overflow_log_frame = self.frame;
            warn!(
                "[Posejump events] Dropped {} buffered events (total dropped: {})",
                excess, self.dropped_events
            );
        }
    }

    pub fn count(&self, name: &str) -> usize {
        self.recent.iter().filter(|e| e.kind.name() == name).count()
    }

    pub fn drain(&mut self) -> Vec<GameEvent> {
        self.recent.drain(..).collect()
    }
}

pub struct GameEventsPlugin;

impl Plugin for GameEventsPlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(GameEventBus::default())
            .add_systems(FixedUpdate, tick_event_frame);
    }
}

fn tick_event_frame(mut bus: ResMut<GameEventBus>) {
    bus.frame = bus.frame.saturating_add(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oldest_events_fall_off_a_full_bus() {
        let mut bus = GameEventBus::default();
        for i in 0..(MAX_EVENTS + 25) {
            bus.emit(GameEventKind::PlatformsFrozen { count: i });
        }
        assert_eq!(bus.recent.len(), MAX_EVENTS);
        assert_eq!(bus.dropped_events, 25);
        assert_eq!(bus.recent[0].kind, GameEventKind::PlatformsFrozen { count: 25 });
    }

    #[test]
    fn events_carry_the_current_frame() {
        let mut bus = GameEventBus::default();
        bus.frame = 42;
        bus.emit(GameEventKind::FlagRaised { player: 1, flag: 0 });
        assert_eq!(bus.count("flag_raised"), 1);
        let drained = bus.drain();
        assert_eq!(drained[0].frame, 42);
        assert_eq!(drained[0].kind.player(), Some(1));
        assert!(bus.recent.is_empty());
    }

    #[test]
    fn events_serialize_flat_with_their_name() {
        let event = GameEvent {
            kind: GameEventKind::FlagRaised { player: 2, flag: 3 },
            frame: 7,
        };
        let json = serde_json::to_value(event).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"name": "flag_raised", "player": 2, "flag": 3, "frame": 7})
        );
    }
}
