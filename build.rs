//! Bakes an optional level into the binary. `POSEJUMP_EMBED_LEVEL_PATH`
//! names a SavedLevel JSON file; without it the embedded level is empty and
//! the game falls back to its built-in stage.

use std::path::PathBuf;

const EMBED_VAR: &str = "POSEJUMP_EMBED_LEVEL_PATH";

fn embedded_level() -> String {
    let Some(path) = std::env::var_os(EMBED_VAR).map(PathBuf::from) else {
        return String::new();
    };
    println!("cargo:rerun-if-changed={}", path.display());
    match std::fs::read_to_string(&path) {
        Ok(json) => json,
        Err(e) => {
            println!("cargo:warning=not embedding level {}: {e}", path.display());
            String::new()
        }
    }
}

fn main() {
    println!("cargo:rerun-if-env-changed={EMBED_VAR}");
    let out = PathBuf::from(std::env::var_os("OUT_DIR").expect("cargo sets OUT_DIR"));
    std::fs::write(out.join("posejump_embedded_level.json"), embedded_level())
        .expect("OUT_DIR is writable");
}
