use bevy::prelude::*;

use crate::components::PlayerSlot;

/// Directional state of one player for the current tick.
/// `jump` is a latch: set on a fresh press and cleared when a jump fires.
/// A released key clears it only after a fixed tick has seen it, so a tap
/// shorter than one tick still counts and a held key never repeats.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PlayerKeys {
    pub left: bool,
    pub right: bool,
    pub jump: bool,
    pub jump_held: bool,
}

impl PlayerKeys {
    /// Record the jump key's state for this frame.
    pub fn press_jump(&mut self, pressed: bool, fresh: bool) {
        if fresh {
            self.jump = true;
        }
        self.jump_held = pressed;
    }
}

/// Both players' keys. Keyboard (windowed) and scripted input (headless
/// simulation) both write here; the fixed tick reads it.
#[derive(Resource, Clone, Copy, Debug, Default)]
pub struct InputSnapshot {
    pub players: [PlayerKeys; 2],
}

impl InputSnapshot {
    pub fn keys(&self, slot: PlayerSlot) -> PlayerKeys {
        self.players[slot.index()]
    }

    pub fn keys_mut(&mut self, slot: PlayerSlot) -> &mut PlayerKeys {
        &mut self.players[slot.index()]
    }

    /// End of a fixed tick: latches whose key is already up are dropped.
    pub fn settle_jumps(&mut self) {
        for keys in &mut self.players {
            if !keys.jump_held {
                keys.jump = false;
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeyBinding {
    pub left: KeyCode,
    pub right: KeyCode,
    pub jump: KeyCode,
}

impl KeyBinding {
    pub fn for_slot(slot: PlayerSlot) -> Self {
        match slot {
            PlayerSlot::One => Self {
                left: KeyCode::KeyA,
                right: KeyCode::KeyD,
                jump: KeyCode::KeyW,
            },
            PlayerSlot::Two => Self {
                left: KeyCode::ArrowLeft,
                right: KeyCode::ArrowRight,
                jump: KeyCode::ArrowUp,
            },
        }
    }
}

pub struct InputPlugin;

impl Plugin for InputPlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(InputSnapshot::default()).add_systems(
            PreUpdate,
            keyboard_to_snapshot
                .after(bevy::input::InputSystem)
                .run_if(resource_exists::<ButtonInput<KeyCode>>),
        );
    }
}

fn keyboard_to_snapshot(keyboard: Res<ButtonInput<KeyCode>>, mut snapshot: ResMut<InputSnapshot>) {
    for slot in PlayerSlot::ALL {
        let binding = KeyBinding::for_slot(slot);
        let keys = snapshot.keys_mut(slot);
        keys.left = keyboard.pressed(binding.left);
        keys.right = keyboard.pressed(binding.right);
        keys.press_jump(keyboard.pressed(binding.jump), keyboard.just_pressed(binding.jump));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keyboard_app() -> App {
        let mut app = App::new();
        app.insert_resource(ButtonInput::<KeyCode>::default())
            .add_plugins(InputPlugin);
        app
    }

    #[test]
    fn bindings_are_partitioned_per_player() {
        let mut app = keyboard_app();
        app.world_mut()
            .resource_mut::<ButtonInput<KeyCode>>()
            .press(KeyCode::KeyA);
        app.world_mut()
            .resource_mut::<ButtonInput<KeyCode>>()
            .press(KeyCode::ArrowRight);
        app.update();
        let snapshot = app.world().resource::<InputSnapshot>();
        assert!(snapshot.keys(PlayerSlot::One).left);
        assert!(!snapshot.keys(PlayerSlot::One).right);
        assert!(snapshot.keys(PlayerSlot::Two).right);
        assert!(!snapshot.keys(PlayerSlot::Two).left);
    }

    #[test]
    fn consumed_jump_stays_clear_while_held() {
        let mut app = keyboard_app();
        app.world_mut()
            .resource_mut::<ButtonInput<KeyCode>>()
            .press(KeyCode::KeyW);
        app.update();
        assert!(app.world().resource::<InputSnapshot>().keys(PlayerSlot::One).jump);

        // The controller consumes the jump, the key stays down.
        app.world_mut()
            .resource_mut::<InputSnapshot>()
            .keys_mut(PlayerSlot::One)
            .jump = false;
        app.world_mut()
            .resource_mut::<ButtonInput<KeyCode>>()
            .clear();
        app.update();
        assert!(!app.world().resource::<InputSnapshot>().keys(PlayerSlot::One).jump);
    }

    #[test]
    fn releasing_jump_clears_the_latch_after_a_tick() {
        let mut app = keyboard_app();
        app.world_mut()
            .resource_mut::<ButtonInput<KeyCode>>()
            .press(KeyCode::ArrowUp);
        app.update();
        app.world_mut()
            .resource_mut::<ButtonInput<KeyCode>>()
            .release(KeyCode::ArrowUp);
        app.update();
        // No fixed tick ran yet, so the press is still owed.
        assert!(app.world().resource::<InputSnapshot>().keys(PlayerSlot::Two).jump);

        app.world_mut().resource_mut::<InputSnapshot>().settle_jumps();
        assert!(!app.world().resource::<InputSnapshot>().keys(PlayerSlot::Two).jump);
    }

    #[test]
    fn a_tap_within_one_frame_still_jumps() {
        let mut app = keyboard_app();
        {
            let mut keyboard = app.world_mut().resource_mut::<ButtonInput<KeyCode>>();
            keyboard.press(KeyCode::KeyW);
            keyboard.release(KeyCode::KeyW);
        }
        app.update();
        let keys = app.world().resource::<InputSnapshot>().keys(PlayerSlot::One);
        assert!(keys.jump);
        assert!(!keys.jump_held);
    }

    #[test]
    fn settling_keeps_a_held_jump_latched() {
        let mut snapshot = InputSnapshot::default();
        snapshot.keys_mut(PlayerSlot::One).press_jump(true, true);
        snapshot.settle_jumps();
        assert!(snapshot.keys(PlayerSlot::One).jump);
    }
}
