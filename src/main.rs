mod capture;
mod components;
mod editor;
mod events;
mod flags;
mod input;
mod level;
#[cfg(not(target_arch = "wasm32"))]
mod level_watcher;
mod phase;
mod physics;
mod physics_core;
mod player;
mod pose;
mod render;
mod session;
mod simulation;

use bevy::prelude::*;
use components::{GameConfig, HeadlessMode};

fn load_game_config() -> GameConfig {
    let path = std::env::var("POSEJUMP_CONFIG")
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "posejump.json".to_string());
    let mut config = match std::fs::read_to_string(&path) {
        Ok(contents) => match serde_json::from_str::<GameConfig>(&contents) {
            Ok(cfg) => {
                println!("[Posejump] Loaded config from {}", path);
                cfg
            }
            Err(e) => {
                eprintln!("[Posejump] Failed to parse {}: {}", path, e);
                GameConfig::default()
            }
        },
        Err(_) => GameConfig::default(),
    };
    if let Some(level) = std::env::var("POSEJUMP_LEVEL").ok().filter(|s| !s.is_empty()) {
        config.level_path = Some(level);
    }
    config
}

fn run_simulation_file(path: &str) -> Result<String, String> {
    let contents = std::fs::read_to_string(path).map_err(|e| format!("failed to read {path}: {e}"))?;
    let request: simulation::SimulationRequest =
        serde_json::from_str(&contents).map_err(|e| format!("invalid simulation request: {e}"))?;
    let result = simulation::run_simulation(&request).map_err(|e| format!("invalid simulation level: {e}"))?;
    serde_json::to_string_pretty(&result).map_err(|e| e.to_string())
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let headless = args.iter().any(|a| a == "--headless");
    let editor_mode = args.iter().any(|a| a == "--editor");

    if let Some(pos) = args.iter().position(|a| a == "--simulate") {
        let Some(path) = args.get(pos + 1) else {
            eprintln!("[Posejump] --simulate needs a request file");
            std::process::exit(2);
        };
        match run_simulation_file(path) {
            Ok(json) => {
                println!("{json}");
                return;
            }
            Err(e) => {
                eprintln!("[Posejump] {e}");
                std::process::exit(2);
            }
        }
    }

    let config = load_game_config();
    let mut app = App::new();

    app.insert_resource(HeadlessMode(headless));

    if headless {
        // No window, no rendering: phases, capture and physics only
        app.add_plugins(MinimalPlugins);
        app.add_plugins(bevy::state::app::StatesPlugin);
        println!("[Posejump] Starting in HEADLESS mode");
    } else {
        app.add_plugins(DefaultPlugins.set(WindowPlugin {
            primary_window: Some(Window {
                title: config.window_title.clone(),
                resolution: (config.window_width, config.window_height).into(),
                present_mode: bevy::window::PresentMode::AutoVsync,
                ..default()
            }),
            ..default()
        }));
        app.insert_resource(ClearColor(Color::srgb(0.08, 0.09, 0.12)));
        println!("[Posejump] Starting in WINDOWED mode");
    }

    app.insert_resource(config)
        .insert_resource(Time::<Fixed>::from_hz(physics::TICK_HZ as f64));

    if editor_mode {
        if headless {
            eprintln!("[Posejump] --editor needs a window");
            std::process::exit(2);
        }
        app.add_plugins(editor::EditorPlugin)
            .add_systems(Startup, |mut commands: Commands| {
                commands.spawn(Camera2d);
            });
        println!("[Posejump] Level editor: 1-7 pick tools, Ctrl+S saves");
        app.run();
        return;
    }

    app.add_plugins(events::GameEventsPlugin)
        .add_plugins(input::InputPlugin)
        .add_plugins(level::LevelPlugin)
        .add_plugins(phase::PhasePlugin)
        .add_plugins(capture::CapturePlugin)
        .add_plugins(session::SessionPlugin)
        .add_plugins(player::PlayerPlugin);

    if !headless {
        app.add_plugins(render::RenderPlugin);
    }

    #[cfg(not(target_arch = "wasm32"))]
    app.add_plugins(level_watcher::LevelWatcherPlugin);

    app.run();
}
