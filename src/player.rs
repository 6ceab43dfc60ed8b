use bevy::prelude::*;
use bevy::transform::TransformSystem;

use crate::components::{Facing, GameConfig, HeadlessMode, PlayerSlot};
use crate::render::{slot_color, stage_to_world};
use crate::session::ActiveSession;

/// Sprite standing in for one player's physics body.
#[derive(Component)]
pub struct PlayerAvatar(pub PlayerSlot);

pub struct PlayerPlugin;

impl Plugin for PlayerPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(Startup, spawn_avatars)
            .add_systems(PostUpdate, sync_avatars.before(TransformSystem::TransformPropagate));
    }
}

fn spawn_avatars(mut commands: Commands, config: Res<GameConfig>, headless: Res<HeadlessMode>) {
    for slot in PlayerSlot::ALL {
        let mut entity = commands.spawn((
            PlayerAvatar(slot),
            Transform::from_xyz(0.0, 0.0, 10.0),
            Visibility::Hidden,
        ));
        if !headless.0 {
            entity.insert(Sprite::from_color(
                slot_color(slot),
                Vec2::new(config.player_width, config.player_height),
            ));
        }
    }
}

fn sync_avatars(
    config: Res<GameConfig>,
    session: Res<ActiveSession>,
    mut query: Query<(&PlayerAvatar, &mut Transform, &mut Visibility, Option<&mut Sprite>)>,
) {
    let stage = config.stage_size();
    for (avatar, mut transform, mut visibility, sprite) in &mut query {
        let Some(view) = session.0.as_ref().and_then(|s| s.player(avatar.0)) else {
            *visibility = Visibility::Hidden;
            continue;
        };
        *visibility = Visibility::Visible;
        let world = stage_to_world(view.position, stage);
        transform.translation.x = world.x;
        transform.translation.y = world.y;
        if let Some(mut sprite) = sprite {
            sprite.flip_x = view.facing == Facing::Left;
        }
    }
}
