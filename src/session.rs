//! One attempt of the game phase: the physics world, both player rigs and
//! the flag board. Built on entry to `Game` and on every retry, dropped on
//! reset, so nothing carries over between attempts.

use bevy::prelude::*;
use rapier2d::prelude::{ColliderHandle, RigidBodyHandle};

use crate::capture::FrozenPlatforms;
use crate::components::{Facing, GameConfig, Platform, PlayerSlot};
use crate::events::{GameEventBus, GameEventKind};
use crate::flags::FlagBoard;
use crate::input::InputSnapshot;
use crate::level::{LevelStore, SavedLevel};
use crate::phase::{log_phase_change, GamePhase, PhaseMachine};
use crate::physics::{BodyTag, PhysicsWorld};
use crate::physics_core::{apply_ground_contacts, drive_player, BodyState, ControllerState, LocomotionParams};
use crate::pose::PlatformBody;

pub struct PlayerRig {
    pub slot: PlayerSlot,
    pub body: RigidBodyHandle,
    pub collider: ColliderHandle,
    pub controller: ControllerState,
}

/// Read-only view of a player for rendering and traces.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlayerView {
    pub slot: PlayerSlot,
    pub position: Vec2,
    pub velocity: Vec2,
    pub grounded: bool,
    pub facing: Facing,
}

/// What one tick changed.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TickReport {
    pub raised: Vec<(usize, PlayerSlot)>,
    pub won: bool,
    pub jumped: Vec<PlayerSlot>,
    pub landed: Vec<PlayerSlot>,
}

impl TickReport {
    pub fn emit(&self, events: &mut GameEventBus) {
        for slot in &self.landed {
            events.emit(GameEventKind::Land { player: slot.number() });
        }
        for slot in &self.jumped {
            events.emit(GameEventKind::Jump { player: slot.number() });
        }
        for &(flag, slot) in &self.raised {
            info!("[Posejump flags] Player {} raised flag {}", slot.number(), flag);
            events.emit(GameEventKind::FlagRaised {
                player: slot.number(),
                flag,
            });
        }
    }
}

pub struct GameSession {
    attempt: u64,
    world: PhysicsWorld,
    players: Vec<PlayerRig>,
    flags: FlagBoard,
    platforms: Vec<Platform>,
    params: LocomotionParams,
}

impl GameSession {
    /// Fresh world from the authored level plus the frozen temporary set.
    pub fn build(attempt: u64, level: &SavedLevel, temporary: &[Platform], config: &GameConfig) -> Self {
        let mut world = PhysicsWorld::new(config.gravity);
        let platforms: Vec<Platform> = level
            .platforms
            .iter()
            .chain(temporary.iter())
            .copied()
            .collect();
        for (index, platform) in platforms.iter().enumerate() {
            let body = PlatformBody::from_segment(&platform.segment(), platform.thickness);
            world.add_platform(&body, config.platform_friction, index, platform.kind);
        }
        for (index, flag) in level.flags.iter().enumerate() {
            world.add_flag_sensor(index, flag.position.into(), config.flag_size);
        }

        let stage = config.stage_size();
        let player_size = Vec2::new(config.player_width, config.player_height);
        let players = PlayerSlot::ALL
            .into_iter()
            .map(|slot| {
                let (body, collider) =
                    world.add_player(slot, level.spawn(slot, stage), player_size, config.player_friction);
                PlayerRig {
                    slot,
                    body,
                    collider,
                    controller: ControllerState::default(),
                }
            })
            .collect();

        Self {
            attempt,
            world,
            players,
            flags: FlagBoard::new(&level.flags),
            platforms,
            params: LocomotionParams::from(config),
        }
    }

    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    pub fn flags(&self) -> &FlagBoard {
        &self.flags
    }

    pub fn platforms(&self) -> &[Platform] {
        &self.platforms
    }

    pub fn player(&self, slot: PlayerSlot) -> Option<PlayerView> {
        let rig = self.players.iter().find(|r| r.slot == slot)?;
        Some(PlayerView {
            slot,
            position: self.world.position(rig.body)?,
            velocity: self.world.velocity(rig.body)?,
            grounded: rig.controller.grounded,
            facing: rig.controller.facing,
        })
    }

    pub fn players(&self) -> impl Iterator<Item = PlayerView> + '_ {
        PlayerSlot::ALL.into_iter().filter_map(|slot| self.player(slot))
    }

    /// Step, resolve ground contacts, apply flag sensor begins, then run
    /// both controllers and hand their outputs back to the world.
    pub fn tick(&mut self, input: &mut InputSnapshot) -> TickReport {
        let mut report = TickReport::default();
        let begins = self.world.step();

        for rig in &mut self.players {
            let was_grounded = rig.controller.grounded;
            let contacts = self.world.contacts_for(rig.collider);
            apply_ground_contacts(&mut rig.controller, &contacts, self.params.ground_normal_y);
            if rig.controller.grounded && !was_grounded {
                report.landed.push(rig.slot);
            }
        }

        for begin in begins {
            let (BodyTag::Flag { index }, BodyTag::Player(slot)) = (begin.sensor, begin.other) else {
                continue;
            };
            let update = self.flags.on_flag_touched(index, slot);
            if let Some(raised) = update.raised {
                report.raised.push((raised, slot));
            }
            report.won |= update.win;
        }

        for rig in &mut self.players {
            let (Some(position), Some(velocity)) =
                (self.world.position(rig.body), self.world.velocity(rig.body))
            else {
                continue;
            };
            let keys = input.keys_mut(rig.slot);
            let out = drive_player(
                &mut rig.controller,
                keys,
                BodyState { position, velocity },
                &self.params,
            );
            self.world.set_velocity(rig.body, out.velocity);
            if let Some(locked) = out.position {
                self.world.set_position(rig.body, locked);
            }
            if out.zero_angular_velocity {
                self.world.set_angular_velocity(rig.body, 0.0);
            }
            if let Some(force) = out.jump_force {
                self.world.apply_force(rig.body, force);
                report.jumped.push(rig.slot);
            }
        }
        input.settle_jumps();

        report
    }
}

/// The running attempt, if any.
#[derive(Resource, Default)]
pub struct ActiveSession(pub Option<GameSession>);

pub struct SessionPlugin;

impl Plugin for SessionPlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(ActiveSession::default()).add_systems(
            FixedUpdate,
            (sync_session, tick_session.run_if(attempt_in_play)).chain(),
        );
    }
}

fn attempt_in_play(machine: Res<PhaseMachine>, session: Res<ActiveSession>) -> bool {
    machine.in_play() && session.0.is_some()
}

fn sync_session(
    machine: Res<PhaseMachine>,
    config: Res<GameConfig>,
    store: Res<LevelStore>,
    frozen: Res<FrozenPlatforms>,
    mut session: ResMut<ActiveSession>,
    mut input: ResMut<InputSnapshot>,
) {
    if machine.phase() != GamePhase::Game {
        if session.0.take().is_some() {
            info!("[Posejump session] Physics world disposed");
        }
        return;
    }
    if session.0.as_ref().is_some_and(|s| s.attempt() == machine.attempt()) {
        return;
    }
    let built = GameSession::build(machine.attempt(), &store.level, &frozen.0, &config);
    info!(
        "[Posejump session] Attempt {} built with {} platforms ({} temporary), {} flags",
        machine.attempt(),
        built.platforms().len(),
        frozen.0.len(),
        built.flags().flags().len()
    );
    session.0 = Some(built);
    *input = InputSnapshot::default();
}

fn tick_session(
    mut session: ResMut<ActiveSession>,
    mut input: ResMut<InputSnapshot>,
    mut machine: ResMut<PhaseMachine>,
    mut events: ResMut<GameEventBus>,
) {
    let Some(session) = session.0.as_mut() else {
        return;
    };
    let report = session.tick(&mut input);
    report.emit(&mut events);
    if report.won {
        if let Some(change) = machine.record_win() {
            log_phase_change(change, &machine, &mut events);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Flag, PlatformKind, Point};

    fn floor_level(flags: Vec<Flag>) -> SavedLevel {
        SavedLevel {
            platforms: vec![Platform {
                start: Point::new(0.0, 580.0),
                end: Point::new(800.0, 580.0),
                thickness: 20.0,
                kind: PlatformKind::Ground,
            }],
            flags,
            player1_spawn: Some(Point::new(100.0, 500.0)),
            player2_spawn: Some(Point::new(700.0, 500.0)),
            time_limit: None,
        }
    }

    fn flag(owner: PlayerSlot, x: f32, y: f32) -> Flag {
        Flag {
            owner,
            position: Point::new(x, y),
            raised: false,
        }
    }

    #[test]
    fn temporary_platforms_join_the_authored_ones() {
        let temp = Platform {
            start: Point::new(300.0, 400.0),
            end: Point::new(400.0, 380.0),
            thickness: 8.0,
            kind: PlatformKind::Temporary,
        };
        let session = GameSession::build(1, &floor_level(vec![]), &[temp], &GameConfig::default());
        assert_eq!(session.platforms().len(), 2);
        assert_eq!(session.platforms()[1].kind, PlatformKind::Temporary);
    }

    #[test]
    fn idle_player_is_pinned_bit_for_bit() {
        let mut session = GameSession::build(1, &floor_level(vec![]), &[], &GameConfig::default());
        let mut input = InputSnapshot::default();
        for _ in 0..120 {
            session.tick(&mut input);
        }
        let view = session.player(PlayerSlot::One).unwrap();
        assert!(view.grounded);

        session.tick(&mut input);
        let locked = session.player(PlayerSlot::One).unwrap().position;
        for _ in 0..30 {
            session.tick(&mut input);
            let now = session.player(PlayerSlot::One).unwrap().position;
            assert_eq!(now.x.to_bits(), locked.x.to_bits());
            assert_eq!(now.y.to_bits(), locked.y.to_bits());
        }
    }

    #[test]
    fn walking_moves_only_the_pressed_player() {
        let mut session = GameSession::build(1, &floor_level(vec![]), &[], &GameConfig::default());
        let mut input = InputSnapshot::default();
        for _ in 0..60 {
            session.tick(&mut input);
        }
        let start_one = session.player(PlayerSlot::One).unwrap().position;
        let start_two = session.player(PlayerSlot::Two).unwrap().position;
        input.keys_mut(PlayerSlot::One).right = true;
        for _ in 0..30 {
            session.tick(&mut input);
        }
        let one = session.player(PlayerSlot::One).unwrap();
        assert!(one.position.x > start_one.x + 100.0);
        assert_eq!(one.facing, Facing::Right);
        let two = session.player(PlayerSlot::Two).unwrap().position;
        assert!((two.x - start_two.x).abs() < 0.5);
    }

    #[test]
    fn a_jump_fires_once_per_press() {
        let mut session = GameSession::build(1, &floor_level(vec![]), &[], &GameConfig::default());
        let mut input = InputSnapshot::default();
        for _ in 0..60 {
            session.tick(&mut input);
        }
        input.keys_mut(PlayerSlot::Two).jump = true;
        let mut jumps = 0;
        let mut highest = f32::MAX;
        for _ in 0..120 {
            let report = session.tick(&mut input);
            jumps += report.jumped.len();
            highest = highest.min(session.player(PlayerSlot::Two).unwrap().position.y);
        }
        assert_eq!(jumps, 1);
        assert!(!input.keys(PlayerSlot::Two).jump);
        assert!(highest < 500.0, "peak {highest}");
    }

    #[test]
    fn flags_raise_for_their_owner_and_win_once() {
        // Each player spawns on top of its own flag.
        let level = floor_level(vec![
            flag(PlayerSlot::One, 100.0, 550.0),
            flag(PlayerSlot::Two, 700.0, 550.0),
        ]);
        let mut session = GameSession::build(1, &level, &[], &GameConfig::default());
        let mut input = InputSnapshot::default();
        let mut wins = 0;
        let mut raised = Vec::new();
        for _ in 0..120 {
            let report = session.tick(&mut input);
            wins += usize::from(report.won);
            raised.extend(report.raised);
        }
        raised.sort_by_key(|(i, _)| *i);
        assert_eq!(raised, vec![(0, PlayerSlot::One), (1, PlayerSlot::Two)]);
        assert_eq!(wins, 1);
        assert!(session.flags().all_raised());
    }

    #[test]
    fn the_wrong_player_leaves_a_flag_lowered() {
        let level = floor_level(vec![flag(PlayerSlot::Two, 100.0, 550.0)]);
        let mut session = GameSession::build(1, &level, &[], &GameConfig::default());
        let mut input = InputSnapshot::default();
        for _ in 0..60 {
            assert!(!session.tick(&mut input).won);
        }
        assert!(!session.flags().is_raised(0));
    }

    fn session_app() -> App {
        let mut app = App::new();
        app.add_plugins(MinimalPlugins)
            .add_plugins(bevy::state::app::StatesPlugin)
            .insert_resource(GameConfig::default())
            .insert_resource(InputSnapshot::default())
            .add_plugins((
                crate::events::GameEventsPlugin,
                crate::level::LevelPlugin,
                crate::phase::PhasePlugin,
                crate::capture::CapturePlugin,
                SessionPlugin,
            ));
        app
    }

    fn fixed_tick(app: &mut App) {
        app.world_mut().run_schedule(FixedUpdate);
    }

    fn session(app: &App) -> Option<&GameSession> {
        app.world().resource::<ActiveSession>().0.as_ref()
    }

    #[test]
    fn attempts_are_rebuilt_on_retry_and_disposed_on_reset() {
        let mut app = session_app();
        app.update();

        let temp = Platform {
            start: Point::new(300.0, 400.0),
            end: Point::new(400.0, 380.0),
            thickness: 8.0,
            kind: PlatformKind::Temporary,
        };
        app.world_mut().resource_mut::<LevelStore>().level = floor_level(vec![
            flag(PlayerSlot::One, 100.0, 550.0),
            flag(PlayerSlot::Two, 700.0, 550.0),
        ]);
        app.world_mut().resource_mut::<FrozenPlatforms>().0 = vec![temp];
        {
            let mut machine = app.world_mut().resource_mut::<PhaseMachine>();
            machine.start(true).unwrap();
            machine.tick(10.0, true);
            assert_eq!(machine.phase(), GamePhase::Game);
        }
        app.update();
        app.update();
        assert_eq!(app.world().resource::<State<GamePhase>>().get(), &GamePhase::Game);

        // The tick that raises the last flag also records the win.
        let mut won_on_tick = None;
        for tick in 0..180 {
            fixed_tick(&mut app);
            if session(&app).is_some_and(|s| s.flags().all_raised()) {
                assert!(app.world().resource::<PhaseMachine>().won());
                won_on_tick = Some(tick);
                break;
            }
        }
        assert!(won_on_tick.is_some());
        assert_eq!(session(&app).map(|s| s.attempt()), Some(1));
        assert_eq!(session(&app).map(|s| s.platforms().len()), Some(2));

        app.world_mut().resource_mut::<PhaseMachine>().retry().unwrap();
        fixed_tick(&mut app);
        let retried = session(&app).unwrap();
        assert_eq!(retried.attempt(), 2);
        assert!(!retried.flags().all_raised());
        assert!(retried.flags().flags().iter().all(|f| !f.raised));
        assert_eq!(retried.platforms().len(), 2);
        assert_eq!(retried.platforms()[1], temp);
        let p1 = retried.player(PlayerSlot::One).unwrap();
        assert!((p1.position.x - 100.0).abs() < 1.0);
        assert!((p1.position.y - 500.0).abs() < 2.0);
        assert!(!app.world().resource::<PhaseMachine>().won());

        app.world_mut().resource_mut::<PhaseMachine>().record_win();
        app.world_mut().resource_mut::<PhaseMachine>().reset(false).unwrap();
        app.update();
        app.update();
        fixed_tick(&mut app);
        assert!(session(&app).is_none());
        assert!(app.world().resource::<FrozenPlatforms>().0.is_empty());
        assert_eq!(app.world().resource::<State<GamePhase>>().get(), &GamePhase::Ready);
    }
}
