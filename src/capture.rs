//! Camera + pose detector lifecycle for the `Ready` and `Pose` phases.
//!
//! Detection runs on a worker thread and hands frames and poses to the app
//! over a bounded channel. The worker lives exactly as long as its
//! `CaptureWorker` handle: dropping it stops and joins the thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use bevy::prelude::*;
use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError};
use image::{Rgba, RgbaImage};

use crate::components::{GameConfig, LineSegment, Platform};
use crate::events::{GameEventBus, GameEventKind};
use crate::phase::{GamePhase, PhaseMachine};
use crate::pose::detector::CaptureError;
use crate::pose::{BlankFrameSource, FrameSource, Pose, PoseDetector, PoseExtractor, PoseQuery, SyntheticDetector};

const FRAME_INTERVAL: Duration = Duration::from_millis(16);
const CHANNEL_CAPACITY: usize = 2;

pub type CaptureParts = (Box<dyn FrameSource>, Box<dyn PoseDetector>);
pub type CaptureFactory = Arc<dyn Fn(&GameConfig) -> Result<CaptureParts, CaptureError> + Send + Sync>;

/// Builds the frame source and detector; called on the worker thread since
/// acquiring a camera or loading a model may block.
#[derive(Resource, Clone)]
pub struct CaptureBackend(pub CaptureFactory);

impl Default for CaptureBackend {
    fn default() -> Self {
        Self(Arc::new(|config: &GameConfig| {
            let source = BlankFrameSource::new(config.stage_width as u32, config.stage_height as u32);
            let detector = SyntheticDetector::new(0x5eed);
            Ok((Box::new(source) as Box<dyn FrameSource>, Box::new(detector) as Box<dyn PoseDetector>))
        }))
    }
}

pub enum WorkerMessage {
    Ready,
    Frame { frame: RgbaImage, poses: Vec<Pose> },
    Failed(CaptureError),
}

pub struct CaptureWorker {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    receiver: Receiver<WorkerMessage>,
}

impl CaptureWorker {
    pub fn spawn(backend: &CaptureBackend, config: &GameConfig) -> Self {
        let (tx, receiver) = crossbeam_channel::bounded(CHANNEL_CAPACITY);
        let stop = Arc::new(AtomicBool::new(false));
        let factory = backend.0.clone();
        let config = config.clone();
        let thread_stop = stop.clone();
        let handle = std::thread::spawn(move || run_worker(factory, config, thread_stop, tx));
        Self {
            stop,
            handle: Some(handle),
            receiver,
        }
    }

    pub fn try_recv(&self) -> Result<WorkerMessage, TryRecvError> {
        self.receiver.try_recv()
    }
}

impl Drop for CaptureWorker {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("[Posejump capture] Worker thread panicked");
            }
        }
    }
}

fn run_worker(factory: CaptureFactory, config: GameConfig, stop: Arc<AtomicBool>, tx: Sender<WorkerMessage>) {
    let (mut source, mut detector) = match factory(&config) {
        Ok(parts) => parts,
        Err(e) => {
            let _ = tx.send(WorkerMessage::Failed(e));
            return;
        }
    };
    if tx.send(WorkerMessage::Ready).is_err() {
        return;
    }
    let query = PoseQuery {
        score_threshold: config.detector_score_threshold,
        max_poses: config.max_people,
    };
    while !stop.load(Ordering::Acquire) {
        let result = source
            .next_frame()
            .and_then(|frame| detector.estimate_poses(&frame, query).map(|poses| (frame, poses)));
        let message = match result {
            Ok((frame, poses)) => WorkerMessage::Frame { frame, poses },
            Err(e) => {
                let _ = tx.try_send(WorkerMessage::Failed(e));
                return;
            }
        };
        match tx.try_send(message) {
            // The app only wants the latest frame; a full channel just skips one.
            Ok(()) | Err(TrySendError::Full(_)) => {}
            Err(TrySendError::Disconnected(_)) => return,
        }
        std::thread::sleep(FRAME_INTERVAL);
    }
}

#[derive(Resource, Clone, Debug, Default, PartialEq)]
pub enum CaptureStatus {
    #[default]
    Idle,
    Starting,
    Ready,
    Failed(CaptureError),
}

impl CaptureStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, CaptureStatus::Ready)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, CaptureStatus::Failed(_))
    }
}

#[derive(Resource, Default)]
pub struct CaptureSession(pub Option<CaptureWorker>);

/// Most recent detector output and the segments it would freeze into.
#[derive(Resource, Default)]
pub struct LatestCapture {
    pub frame: Option<RgbaImage>,
    pub poses: Vec<Pose>,
    pub preview: Vec<LineSegment>,
}

/// Temporary platforms frozen at `Pose → Game`; reused by every retry and
/// discarded on reset.
#[derive(Resource, Default)]
pub struct FrozenPlatforms(pub Vec<Platform>);

/// Camera frame with the frozen overlay, captured at `Pose → Game`.
#[derive(Resource, Default)]
pub struct PoseSnapshot(pub Option<RgbaImage>);

pub struct CapturePlugin;

impl Plugin for CapturePlugin {
    fn build(&self, app: &mut App) {
        if !app.world().contains_resource::<CaptureBackend>() {
            app.insert_resource(CaptureBackend::default());
        }
        app.insert_resource(CaptureStatus::default())
            .insert_resource(CaptureSession::default())
            .insert_resource(LatestCapture::default())
            .insert_resource(FrozenPlatforms::default())
            .insert_resource(PoseSnapshot::default())
            .add_systems(OnEnter(GamePhase::Ready), start_capture)
            .add_systems(OnExit(GamePhase::Pose), stop_capture)
            .add_systems(
                OnTransition {
                    exited: GamePhase::Pose,
                    entered: GamePhase::Game,
                },
                freeze_platforms,
            )
            .add_systems(Update, (restart_after_reset, drain_capture).chain());
    }
}

fn start_capture(
    backend: Res<CaptureBackend>,
    config: Res<GameConfig>,
    mut session: ResMut<CaptureSession>,
    mut status: ResMut<CaptureStatus>,
    mut latest: ResMut<LatestCapture>,
    mut frozen: ResMut<FrozenPlatforms>,
    mut snapshot: ResMut<PoseSnapshot>,
) {
    frozen.0.clear();
    snapshot.0 = None;
    *latest = LatestCapture::default();
    // Replacing the handle joins any previous worker first.
    session.0 = None;
    session.0 = Some(CaptureWorker::spawn(&backend, &config));
    *status = CaptureStatus::Starting;
    info!("[Posejump capture] Starting camera and pose detector");
}

/// A reset issued while already in `Ready` (after a capture failure) does not
/// re-enter the state, so the worker is restarted here instead.
fn restart_after_reset(
    machine: Res<PhaseMachine>,
    mut seen_resets: Local<u64>,
    backend: Res<CaptureBackend>,
    config: Res<GameConfig>,
    mut session: ResMut<CaptureSession>,
    mut status: ResMut<CaptureStatus>,
) {
    if machine.resets() == *seen_resets {
        return;
    }
    *seen_resets = machine.resets();
    if machine.phase() != GamePhase::Ready || session.0.is_some() {
        return;
    }
    session.0 = Some(CaptureWorker::spawn(&backend, &config));
    *status = CaptureStatus::Starting;
    info!("[Posejump capture] Restarting camera and pose detector after reset");
}

fn stop_capture(mut session: ResMut<CaptureSession>, mut status: ResMut<CaptureStatus>) {
    if session.0.take().is_some() {
        info!("[Posejump capture] Camera and pose detector released");
    }
    if !status.is_failed() {
        *status = CaptureStatus::Idle;
    }
}

fn drain_capture(
    machine: Res<PhaseMachine>,
    config: Res<GameConfig>,
    mut session: ResMut<CaptureSession>,
    mut status: ResMut<CaptureStatus>,
    mut latest: ResMut<LatestCapture>,
) {
    if !matches!(machine.phase(), GamePhase::Ready | GamePhase::Pose) {
        return;
    }
    let Some(worker) = session.0.as_ref() else {
        return;
    };
    let mut newest = None;
    let failure = loop {
        match worker.try_recv() {
            Ok(WorkerMessage::Ready) => {
                info!("[Posejump capture] Camera and detector ready");
                *status = CaptureStatus::Ready;
            }
            Ok(WorkerMessage::Frame { frame, poses }) => newest = Some((frame, poses)),
            Ok(WorkerMessage::Failed(e)) => break Some(e),
            Err(TryRecvError::Empty) => break None,
            Err(TryRecvError::Disconnected) => break Some(CaptureError::WorkerDisconnected),
        }
    };

    if let Some((frame, poses)) = newest {
        latest.preview = PoseExtractor::from_config(&config).segments(&poses);
        latest.frame = Some(frame);
        latest.poses = poses;
    }

    if let Some(e) = failure {
        error!("[Posejump capture] {e}; press Escape to reset");
        *status = CaptureStatus::Failed(e);
        session.0 = None;
    }
}

fn freeze_platforms(
    config: Res<GameConfig>,
    latest: Res<LatestCapture>,
    mut frozen: ResMut<FrozenPlatforms>,
    mut snapshot: ResMut<PoseSnapshot>,
    mut events: ResMut<GameEventBus>,
) {
    frozen.0 = PoseExtractor::from_config(&config).temporary_platforms(&latest.poses);
    info!(
        "[Posejump capture] Froze {} temporary platforms from {} poses",
        frozen.0.len(),
        latest.poses.len()
    );
    events.emit(GameEventKind::PlatformsFrozen {
        count: frozen.0.len(),
    });

    let image = compose_snapshot(latest.frame.as_ref(), &frozen.0, config.stage_size());
    if let Some(path) = config.snapshot_path.as_deref() {
        match image.save(path) {
            Ok(()) => info!("[Posejump capture] Snapshot written to {path}"),
            Err(e) => warn!("[Posejump capture] Failed to write snapshot {path}: {e}"),
        }
    }
    snapshot.0 = Some(image);
}

const OVERLAY: Rgba<u8> = Rgba([80, 220, 255, 255]);

/// Copy of `frame` (or a blank stage) with each platform stamped on top.
pub fn compose_snapshot(frame: Option<&RgbaImage>, platforms: &[Platform], stage: Vec2) -> RgbaImage {
    let mut image = frame
        .cloned()
        .unwrap_or_else(|| RgbaImage::from_pixel(stage.x as u32, stage.y as u32, Rgba([0, 0, 0, 255])));
    let scale = Vec2::new(image.width() as f32, image.height() as f32) / stage.max(Vec2::ONE);
    for platform in platforms {
        let seg = platform.segment();
        let a = Vec2::from(seg.start) * scale;
        let b = Vec2::from(seg.end) * scale;
        let radius = (platform.thickness * 0.5 * scale.y).max(1.0);
        draw_thick_line(&mut image, a, b, radius, OVERLAY);
    }
    image
}

fn draw_thick_line(image: &mut RgbaImage, a: Vec2, b: Vec2, radius: f32, color: Rgba<u8>) {
    let steps = a.distance(b).ceil().max(1.0) as u32;
    let r = radius.ceil() as i32;
    let (w, h) = (image.width() as i32, image.height() as i32);
    for i in 0..=steps {
        let p = a.lerp(b, i as f32 / steps as f32);
        let (cx, cy) = (p.x.round() as i32, p.y.round() as i32);
        for dy in -r..=r {
            for dx in -r..=r {
                let (x, y) = (cx + dx, cy + dy);
                if x >= 0 && y >= 0 && x < w && y < h {
                    image.put_pixel(x as u32, y as u32, color);
                }
            }
        }
    }
}
