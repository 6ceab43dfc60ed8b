use bevy::gizmos::config::GizmoConfigStore;
use bevy::prelude::*;
use bevy::render::render_asset::RenderAssetUsages;
use bevy::render::render_resource::{Extent3d, TextureDimension, TextureFormat};
use image::RgbaImage;

use crate::capture::{CaptureStatus, LatestCapture, PoseSnapshot};
use crate::components::{Flag, GameConfig, HeadlessMode, Platform, PlatformKind, PlayerSlot};
use crate::level::LevelStore;
use crate::phase::{GamePhase, PhaseMachine};
use crate::pose::keypoint::limb_edge_indices;
use crate::pose::PlatformBody;
use crate::session::ActiveSession;

pub struct RenderPlugin;

impl Plugin for RenderPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(Startup, (setup_camera, setup_hud))
            .add_systems(Update, (update_hud, show_pose_snapshot))
            .add_systems(Update, draw_stage.run_if(resource_exists::<GizmoConfigStore>));
    }
}

#[derive(Component)]
struct HudText;

/// Corner thumbnail of the frozen pose, shown for the rest of the run.
#[derive(Component)]
struct SnapshotThumbnail;

const THUMBNAIL_WIDTH: f32 = 200.0;

/// Stage pixels (origin top-left, y down) to world units (origin centre, y up).
pub fn stage_to_world(p: Vec2, stage: Vec2) -> Vec2 {
    Vec2::new(p.x - stage.x * 0.5, stage.y * 0.5 - p.y)
}

pub fn slot_color(slot: PlayerSlot) -> Color {
    match slot {
        PlayerSlot::One => Color::srgb(0.95, 0.35, 0.3),
        PlayerSlot::Two => Color::srgb(0.3, 0.55, 0.95),
    }
}

fn platform_color(kind: PlatformKind) -> Color {
    match kind {
        PlatformKind::Temporary => Color::srgb(0.3, 0.85, 1.0),
        PlatformKind::Permanent => Color::srgb(0.75, 0.7, 0.6),
        PlatformKind::Ground => Color::srgb(0.45, 0.35, 0.25),
    }
}

pub fn draw_platform(gizmos: &mut Gizmos, platform: &Platform, stage: Vec2) {
    let body = PlatformBody::from_segment(&platform.segment(), platform.thickness);
    let half = body.half_extents();
    let rot = Vec2::from_angle(body.angle);
    let corners = [
        Vec2::new(-half.x, -half.y),
        Vec2::new(half.x, -half.y),
        Vec2::new(half.x, half.y),
        Vec2::new(-half.x, half.y),
        Vec2::new(-half.x, -half.y),
    ]
    .map(|c| stage_to_world(body.center + rot.rotate(c), stage));
    gizmos.linestrip_2d(corners, platform_color(platform.kind));
}

/// Flag square at the stored point with its pole hanging below.
pub fn draw_flag(gizmos: &mut Gizmos, flag: &Flag, raised: bool, config: &GameConfig) {
    let stage = config.stage_size();
    let center = Vec2::from(flag.position);
    let pole_top = stage_to_world(center + Vec2::new(0.0, config.flag_size * 0.5), stage);
    let pole_bottom = stage_to_world(
        center + Vec2::new(0.0, config.flag_size * 0.5 + config.pole_height),
        stage,
    );
    gizmos.line_2d(pole_top, pole_bottom, Color::srgb(0.8, 0.8, 0.8));
    let color = if raised {
        slot_color(flag.owner)
    } else {
        slot_color(flag.owner).with_alpha(0.3)
    };
    gizmos.rect_2d(
        stage_to_world(center, stage),
        Vec2::splat(config.flag_size),
        color,
    );
}

fn setup_camera(mut commands: Commands) {
    commands.spawn((Camera2d, Transform::from_xyz(0.0, 0.0, 100.0)));
}

fn setup_hud(mut commands: Commands, headless: Res<HeadlessMode>) {
    if headless.0 {
        return;
    }
    commands.spawn((
        Text::new(""),
        TextFont {
            font_size: 18.0,
            ..default()
        },
        TextColor(Color::srgba(0.95, 1.0, 0.98, 0.95)),
        Node {
            position_type: PositionType::Absolute,
            left: Val::Px(10.0),
            top: Val::Px(8.0),
            ..default()
        },
        HudText,
    ));
}

fn hud_line(machine: &PhaseMachine, capture: &CaptureStatus, flags: Option<(usize, usize)>) -> String {
    if let CaptureStatus::Failed(e) = capture {
        return format!("Camera error: {e}\nPress Escape to reset");
    }
    match machine.phase() {
        GamePhase::Ready => match capture {
            CaptureStatus::Ready => "Press Enter to start".to_string(),
            _ => "Waiting for camera...".to_string(),
        },
        GamePhase::Pose => format!("Hold your pose! {:.0}s", machine.pose_remaining().ceil()),
        GamePhase::Game => {
            let (raised, total) = flags.unwrap_or((0, 0));
            if machine.won() {
                format!("You win! Flags {raised}/{total}\nR to retry, Escape to reset")
            } else if machine.lost() {
                format!("Time's up. Flags {raised}/{total}\nR to retry, Escape to reset")
            } else {
                format!(
                    "Time {:.0}s  Flags {raised}/{total}",
                    machine.game_remaining().ceil()
                )
            }
        }
    }
}

fn update_hud(
    machine: Res<PhaseMachine>,
    capture: Res<CaptureStatus>,
    session: Res<ActiveSession>,
    mut query: Query<&mut Text, With<HudText>>,
) {
    let Ok(mut text) = query.get_single_mut() else {
        return;
    };
    let flags = session.0.as_ref().map(|s| {
        let board = s.flags();
        let raised = board.flags().iter().filter(|f| f.raised).count();
        (raised, board.flags().len())
    });
    let line = hud_line(&machine, &capture, flags);
    if text.0 != line {
        text.0 = line;
    }
}

/// GPU texture for a composed pose snapshot.
pub fn snapshot_texture(snapshot: &RgbaImage) -> Image {
    Image::new(
        Extent3d {
            width: snapshot.width(),
            height: snapshot.height(),
            depth_or_array_layers: 1,
        },
        TextureDimension::D2,
        snapshot.as_raw().clone(),
        TextureFormat::Rgba8UnormSrgb,
        RenderAssetUsages::RENDER_WORLD,
    )
}

fn show_pose_snapshot(
    mut commands: Commands,
    snapshot: Res<PoseSnapshot>,
    mut images: ResMut<Assets<Image>>,
    thumbnails: Query<Entity, With<SnapshotThumbnail>>,
) {
    if !snapshot.is_changed() {
        return;
    }
    for entity in &thumbnails {
        commands.entity(entity).despawn_recursive();
    }
    let Some(frame) = snapshot.0.as_ref() else {
        return;
    };
    let handle = images.add(snapshot_texture(frame));
    commands.spawn((
        ImageNode::new(handle),
        Node {
            position_type: PositionType::Absolute,
            right: Val::Px(10.0),
            top: Val::Px(8.0),
            width: Val::Px(THUMBNAIL_WIDTH),
            ..default()
        },
        SnapshotThumbnail,
    ));
}

fn draw_stage(
    mut gizmos: Gizmos,
    config: Res<GameConfig>,
    machine: Res<PhaseMachine>,
    store: Res<LevelStore>,
    latest: Res<LatestCapture>,
    session: Res<ActiveSession>,
) {
    let stage = config.stage_size();
    if let (GamePhase::Game, Some(session)) = (machine.phase(), session.0.as_ref()) {
        for platform in session.platforms() {
            draw_platform(&mut gizmos, platform, stage);
        }
        for flag in session.flags().flags() {
            draw_flag(&mut gizmos, flag, flag.raised, &config);
        }
        return;
    }

    for platform in &store.level.platforms {
        draw_platform(&mut gizmos, platform, stage);
    }
    for flag in &store.level.flags {
        draw_flag(&mut gizmos, flag, false, &config);
    }

    let skeleton = Color::srgba(1.0, 1.0, 1.0, 0.25);
    let edges = limb_edge_indices();
    for pose in &latest.poses {
        for &(a, b) in &edges {
            if let (Some(ka), Some(kb)) = (pose.get(a), pose.get(b)) {
                gizmos.line_2d(
                    stage_to_world(ka.position(), stage),
                    stage_to_world(kb.position(), stage),
                    skeleton,
                );
            }
        }
    }
    for segment in &latest.preview {
        let preview = Platform::from_segment(*segment, config.platform_thickness, PlatformKind::Temporary);
        draw_platform(&mut gizmos, &preview, stage);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::detector::CaptureError;

    #[test]
    fn stage_origin_maps_to_the_top_left_of_the_world() {
        let stage = Vec2::new(800.0, 600.0);
        assert_eq!(stage_to_world(Vec2::new(0.0, 0.0), stage), Vec2::new(-400.0, 300.0));
        assert_eq!(stage_to_world(Vec2::new(400.0, 300.0), stage), Vec2::ZERO);
        assert_eq!(stage_to_world(Vec2::new(800.0, 600.0), stage), Vec2::new(400.0, -300.0));
    }

    #[test]
    fn snapshot_texture_keeps_size_and_pixels() {
        let mut frame = RgbaImage::from_pixel(4, 3, image::Rgba([1, 2, 3, 255]));
        frame.put_pixel(3, 2, image::Rgba([9, 8, 7, 255]));
        let texture = snapshot_texture(&frame);
        assert_eq!(texture.width(), 4);
        assert_eq!(texture.height(), 3);
        assert_eq!(texture.data.len(), 4 * 3 * 4);
        assert_eq!(&texture.data[texture.data.len() - 4..], &[9, 8, 7, 255]);
    }

    #[test]
    fn hud_reports_outcomes_and_capture_errors() {
        let mut machine = PhaseMachine::new(10.0, 60.0);
        assert_eq!(hud_line(&machine, &CaptureStatus::Ready, None), "Press Enter to start");
        let failed = CaptureStatus::Failed(CaptureError::CameraUnavailable("gone".into()));
        assert!(hud_line(&machine, &failed, None).starts_with("Camera error"));

        machine.start(true).unwrap();
        machine.tick(10.0, true);
        machine.record_win();
        assert!(hud_line(&machine, &CaptureStatus::Idle, Some((2, 2))).starts_with("You win! Flags 2/2"));
    }
}
