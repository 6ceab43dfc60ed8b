use bevy::prelude::*;

use crate::components::{Facing, GameConfig};
use crate::input::PlayerKeys;

/// One contact between a player and another collider in the current sub-step.
#[derive(Clone, Copy, Debug)]
pub struct ContactSample {
    /// Unit normal pointing from the other body toward the player (y down).
    pub normal: Vec2,
    pub other_is_sensor: bool,
}

/// Per-player state carried between ticks. Nothing here is shared between
/// the two players.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ControllerState {
    pub grounded: bool,
    pub ground_normal: Option<Vec2>,
    pub locked_position: Option<Vec2>,
    pub facing: Facing,
}

#[derive(Clone, Copy, Debug)]
pub struct LocomotionParams {
    pub move_speed: f32,
    pub max_fall_speed: f32,
    pub air_damping: f32,
    pub jump_force: f32,
    pub idle_slope_cancel: f32,
    pub moving_slope_cancel: f32,
    pub ground_normal_y: f32,
}

impl From<&GameConfig> for LocomotionParams {
    fn from(config: &GameConfig) -> Self {
        Self {
            move_speed: config.move_speed,
            max_fall_speed: config.max_fall_speed,
            air_damping: config.air_damping,
            jump_force: config.jump_force,
            idle_slope_cancel: config.idle_slope_cancel,
            moving_slope_cancel: config.moving_slope_cancel,
            ground_normal_y: config.ground_normal_y,
        }
    }
}

impl Default for LocomotionParams {
    fn default() -> Self {
        Self::from(&GameConfig::default())
    }
}

/// Body state read at the start of the control pass. Velocity in pixels per tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BodyState {
    pub position: Vec2,
    pub velocity: Vec2,
}

/// What the physics world must apply to the body after the control pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ControlOutput {
    pub velocity: Vec2,
    /// Hard position override (idle lock).
    pub position: Option<Vec2>,
    pub zero_angular_velocity: bool,
    /// Upward force applied at the body's own position.
    pub jump_force: Option<Vec2>,
}

/// Most upward-facing non-sensor contact, or None when airborne.
pub fn pick_ground_normal(contacts: &[ContactSample], threshold_y: f32) -> Option<Vec2> {
    contacts
        .iter()
        .filter(|c| !c.other_is_sensor && c.normal.y < threshold_y)
        .map(|c| c.normal)
        .fold(None, |best: Option<Vec2>, n| match best {
            Some(b) if b.y <= n.y => Some(b),
            _ => Some(n),
        })
}

/// Fold one sub-step of contacts into the controller. Runs every sub-step,
/// since sliding along an angled surface changes the normal without any
/// begin/end event.
pub fn apply_ground_contacts(state: &mut ControllerState, contacts: &[ContactSample], threshold_y: f32) {
    match pick_ground_normal(contacts, threshold_y) {
        Some(normal) => {
            state.grounded = true;
            state.ground_normal = Some(normal);
        }
        None => {
            state.grounded = false;
            state.ground_normal = None;
            state.locked_position = None;
        }
    }
}

/// Along-slope direction for a ground normal.
pub fn slope_tangent(normal: Vec2) -> Vec2 {
    Vec2::new(-normal.y, normal.x)
}

/// Remove `fraction` of the velocity component running along the slope.
pub fn stick_to_slope(velocity: Vec2, normal: Vec2, fraction: f32) -> Vec2 {
    let tangent = slope_tangent(normal);
    let along = velocity.dot(tangent);
    velocity - tangent * (along * fraction)
}

pub fn cap_fall_speed(velocity: Vec2, max_fall_speed: f32) -> Vec2 {
    Vec2::new(velocity.x, velocity.y.min(max_fall_speed))
}

/// One control pass for one player. Order: slope stick, horizontal drive or
/// idle lock or air damping, fall cap, jump. Consumes `keys.jump` when a jump
/// fires so holding the key cannot jump again.
pub fn drive_player(
    state: &mut ControllerState,
    keys: &mut PlayerKeys,
    body: BodyState,
    params: &LocomotionParams,
) -> ControlOutput {
    let moving = keys.left || keys.right;
    let mut velocity = body.velocity;

    if moving || keys.jump {
        state.locked_position = None;
    }

    if state.grounded {
        if let Some(normal) = state.ground_normal {
            let fraction = if moving {
                params.moving_slope_cancel
            } else {
                params.idle_slope_cancel
            };
            velocity = stick_to_slope(velocity, normal, fraction);
        }
    }

    let mut position = None;
    let mut zero_angular_velocity = false;
    if keys.left {
        velocity.x = -params.move_speed;
        state.facing = Facing::Left;
    } else if keys.right {
        velocity.x = params.move_speed;
        state.facing = Facing::Right;
    } else if state.grounded && !keys.jump {
        let locked = *state.locked_position.get_or_insert(body.position);
        position = Some(locked);
        velocity = Vec2::ZERO;
        zero_angular_velocity = true;
    } else {
        velocity.x *= params.air_damping;
    }

    velocity = cap_fall_speed(velocity, params.max_fall_speed);

    let mut jump_force = None;
    if keys.jump && state.grounded {
        jump_force = Some(Vec2::new(0.0, -params.jump_force));
        keys.jump = false;
    }

    ControlOutput {
        velocity,
        position,
        zero_angular_velocity,
        jump_force,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grounded_on(normal: Vec2) -> ControllerState {
        ControllerState {
            grounded: true,
            ground_normal: Some(normal),
            ..Default::default()
        }
    }

    fn slope_normal(degrees: f32) -> Vec2 {
        // Surface rising to the right at `degrees`, normal pointing up-left (y down).
        let a = degrees.to_radians();
        Vec2::new(-a.sin(), -a.cos())
    }

    #[test]
    fn upward_contact_grounds_the_player() {
        let mut state = ControllerState::default();
        let contacts = [ContactSample {
            normal: Vec2::new(0.0, -1.0),
            other_is_sensor: false,
        }];
        apply_ground_contacts(&mut state, &contacts, -0.5);
        assert!(state.grounded);
        assert_eq!(state.ground_normal, Some(Vec2::new(0.0, -1.0)));
    }

    #[test]
    fn walls_ceilings_and_sensors_do_not_ground() {
        let mut state = ControllerState {
            grounded: true,
            ground_normal: Some(Vec2::NEG_Y),
            locked_position: Some(Vec2::new(5.0, 5.0)),
            facing: Facing::Left,
        };
        let contacts = [
            ContactSample { normal: Vec2::new(1.0, 0.0), other_is_sensor: false },
            ContactSample { normal: Vec2::new(0.0, 1.0), other_is_sensor: false },
            ContactSample { normal: Vec2::new(0.0, -1.0), other_is_sensor: true },
            ContactSample { normal: Vec2::new(0.0, -0.5), other_is_sensor: false },
        ];
        apply_ground_contacts(&mut state, &contacts, -0.5);
        assert!(!state.grounded);
        assert_eq!(state.ground_normal, None);
        assert_eq!(state.locked_position, None);
    }

    #[test]
    fn the_flattest_ground_contact_wins() {
        let contacts = [
            ContactSample { normal: slope_normal(40.0), other_is_sensor: false },
            ContactSample { normal: Vec2::new(0.0, -1.0), other_is_sensor: false },
            ContactSample { normal: slope_normal(20.0), other_is_sensor: false },
        ];
        assert_eq!(pick_ground_normal(&contacts, -0.5), Some(Vec2::new(0.0, -1.0)));
    }

    #[test]
    fn idle_slope_stick_cancels_all_tangential_velocity() {
        let normal = Vec2::new(0.0, -1.0);
        let before = Vec2::new(4.0, 2.0);
        let after = stick_to_slope(before, normal, 1.0);
        let t = slope_tangent(normal);
        assert!(after.dot(t).abs() <= before.dot(t).abs() * 0.01);
    }

    #[test]
    fn moving_slope_stick_keeps_at_most_35_percent() {
        let normal = Vec2::new(0.0, -1.0);
        let before = Vec2::new(4.0, 2.0);
        let after = stick_to_slope(before, normal, 0.65);
        let t = slope_tangent(normal);
        assert!(after.dot(t).abs() <= before.dot(t).abs() * 0.35 + 1e-6);
    }

    #[test]
    fn thirty_degree_slope_idle_stops_sliding() {
        let normal = slope_normal(30.0);
        let mut state = grounded_on(normal);
        let mut keys = PlayerKeys::default();
        let before = Vec2::new(3.0, 0.0);
        let after = stick_to_slope(before, normal, LocomotionParams::default().idle_slope_cancel);
        assert!(after.dot(slope_tangent(normal)).abs() < 1e-5);

        let out = drive_player(
            &mut state,
            &mut keys,
            BodyState { position: Vec2::new(100.0, 200.0), velocity: before },
            &LocomotionParams::default(),
        );
        assert_eq!(out.velocity, Vec2::ZERO);
        assert_eq!(out.position, Some(Vec2::new(100.0, 200.0)));
    }

    #[test]
    fn idle_lock_pins_the_first_snapshot() {
        let params = LocomotionParams::default();
        let mut state = grounded_on(Vec2::NEG_Y);
        let mut keys = PlayerKeys::default();
        let first = Vec2::new(120.25, 301.5);
        let out = drive_player(
            &mut state,
            &mut keys,
            BodyState { position: first, velocity: Vec2::new(0.3, 0.1) },
            &params,
        );
        assert_eq!(out.position, Some(first));
        for tick in 0..20 {
            let drifted = first + Vec2::new(0.0, 0.01 * tick as f32 + 0.01);
            let out = drive_player(
                &mut state,
                &mut keys,
                BodyState { position: drifted, velocity: Vec2::new(0.0, 0.2) },
                &params,
            );
            let pinned = out.position.unwrap();
            assert_eq!(pinned.x.to_bits(), first.x.to_bits());
            assert_eq!(pinned.y.to_bits(), first.y.to_bits());
            assert!(out.zero_angular_velocity);
        }
    }

    #[test]
    fn pressing_a_key_releases_the_lock() {
        let params = LocomotionParams::default();
        let mut state = grounded_on(Vec2::NEG_Y);
        state.locked_position = Some(Vec2::new(1.0, 1.0));
        let mut keys = PlayerKeys { right: true, ..Default::default() };
        let out = drive_player(
            &mut state,
            &mut keys,
            BodyState { position: Vec2::new(2.0, 1.0), velocity: Vec2::ZERO },
            &params,
        );
        assert_eq!(state.locked_position, None);
        assert_eq!(out.position, None);
        assert_eq!(out.velocity.x, params.move_speed);
        assert_eq!(state.facing, Facing::Right);
    }

    #[test]
    fn horizontal_drive_keeps_vertical_velocity() {
        let params = LocomotionParams::default();
        let mut state = ControllerState::default();
        let mut keys = PlayerKeys { left: true, ..Default::default() };
        let out = drive_player(
            &mut state,
            &mut keys,
            BodyState { position: Vec2::ZERO, velocity: Vec2::new(2.0, 3.5) },
            &params,
        );
        assert_eq!(out.velocity, Vec2::new(-params.move_speed, 3.5));
        assert_eq!(state.facing, Facing::Left);
    }

    #[test]
    fn airborne_idle_damps_horizontal_only() {
        let params = LocomotionParams::default();
        let mut state = ControllerState::default();
        let mut keys = PlayerKeys::default();
        let out = drive_player(
            &mut state,
            &mut keys,
            BodyState { position: Vec2::ZERO, velocity: Vec2::new(4.0, 2.0) },
            &params,
        );
        assert!((out.velocity.x - 3.6).abs() < 1e-6);
        assert_eq!(out.velocity.y, 2.0);
    }

    #[test]
    fn fall_speed_is_capped() {
        let params = LocomotionParams::default();
        let mut state = ControllerState::default();
        let mut keys = PlayerKeys::default();
        let out = drive_player(
            &mut state,
            &mut keys,
            BodyState { position: Vec2::ZERO, velocity: Vec2::new(0.0, 40.0) },
            &params,
        );
        assert_eq!(out.velocity.y, params.max_fall_speed);
    }

    #[test]
    fn jump_fires_once_per_press() {
        let params = LocomotionParams::default();
        let mut state = grounded_on(Vec2::NEG_Y);
        let mut keys = PlayerKeys { jump: true, ..Default::default() };
        let body = BodyState { position: Vec2::ZERO, velocity: Vec2::ZERO };
        let first = drive_player(&mut state, &mut keys, body, &params);
        assert_eq!(first.jump_force, Some(Vec2::new(0.0, -params.jump_force)));
        assert!(!keys.jump);
        let second = drive_player(&mut state, &mut keys, body, &params);
        assert_eq!(second.jump_force, None);
    }

    #[test]
    fn no_jump_while_airborne() {
        let params = LocomotionParams::default();
        let mut state = ControllerState::default();
        let mut keys = PlayerKeys { jump: true, ..Default::default() };
        let out = drive_player(
            &mut state,
            &mut keys,
            BodyState { position: Vec2::ZERO, velocity: Vec2::ZERO },
            &params,
        );
        assert_eq!(out.jump_force, None);
        assert!(keys.jump);
    }
}
