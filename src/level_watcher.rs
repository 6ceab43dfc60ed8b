use std::path::{Path, PathBuf};

use bevy::prelude::*;
use crossbeam_channel::{Receiver, Sender};
use notify::{Event as NotifyEvent, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::components::GameConfig;
use crate::level::{PendingLevelReload, SavedLevel, StageTransform};

/// Watches the active level file and queues a validated copy for the next
/// reset. Attempts in progress are never touched.
pub struct LevelWatcherPlugin;

#[derive(Resource)]
pub struct LevelWatchReceiver(pub Receiver<String>);

impl Plugin for LevelWatcherPlugin {
    fn build(&self, app: &mut App) {
        let Some(path) = app
            .world()
            .get_resource::<GameConfig>()
            .and_then(|c| c.level_path.clone())
        else {
            return;
        };
        let (tx, rx) = crossbeam_channel::unbounded::<String>();
        app.insert_resource(LevelWatchReceiver(rx));

        std::thread::spawn(move || {
            run_watcher(PathBuf::from(path), tx);
        });

        app.add_systems(Update, process_level_changes);
    }
}

fn run_watcher(level_path: PathBuf, tx: Sender<String>) {
    let watched = level_path.clone();
    let mut watcher: RecommendedWatcher =
        match notify::recommended_watcher(move |res: Result<NotifyEvent, notify::Error>| {
            if let Ok(event) = res {
                handle_fs_event(event, &tx, &watched);
            }
        }) {
            Ok(w) => w,
            Err(e) => {
                error!("[Posejump watcher] Failed to create watcher: {e}");
                return;
            }
        };

    // notify needs a directory for single files
    let parent = match level_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    if let Err(e) = watcher.watch(&parent, RecursiveMode::NonRecursive) {
        error!("[Posejump watcher] Failed to watch {}: {e}", parent.display());
        return;
    }
    info!("[Posejump watcher] Watching level: {}", level_path.display());

    // The watcher lives as long as this thread.
    loop {
        std::thread::sleep(std::time::Duration::from_secs(60));
    }
}

fn handle_fs_event(event: NotifyEvent, tx: &Sender<String>, level_path: &Path) {
    if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
        return;
    }
    for path in &event.paths {
        if path_matches(path, level_path) {
            if let Ok(content) = std::fs::read_to_string(path) {
                let _ = tx.send(content);
            }
        }
    }
}

fn path_matches(a: &Path, b: &Path) -> bool {
    let ca = std::fs::canonicalize(a).unwrap_or_else(|_| a.to_path_buf());
    let cb = std::fs::canonicalize(b).unwrap_or_else(|_| b.to_path_buf());
    ca == cb
}

/// Parse and scale a changed level file; a bad edit leaves any earlier
/// pending level in place.
pub fn queue_level_reload(content: &str, stage: Vec2, pending: &mut PendingLevelReload) -> bool {
    match SavedLevel::from_json(content) {
        Ok(level) => {
            pending.0 = Some(StageTransform::for_stage(stage).apply(&level));
            info!("[Posejump watcher] Level changed; applies on next reset");
            true
        }
        Err(e) => {
            warn!("[Posejump watcher] Ignoring level edit: {e}");
            false
        }
    }
}

fn process_level_changes(
    watcher: Res<LevelWatchReceiver>,
    config: Res<GameConfig>,
    mut pending: ResMut<PendingLevelReload>,
) {
    // Editors often write several times per save; only the last one matters.
    if let Some(content) = watcher.0.try_iter().take(16).last() {
        queue_level_reload(&content, config.stage_size(), &mut pending);
    }
}
