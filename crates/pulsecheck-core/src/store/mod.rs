pub mod config;
pub mod database;
pub mod migrations;

pub use config::Config;
pub use database::{AlertCounts, Database};

use std::path::PathBuf;

/// Returns `~/.config/pulsecheck[-dev]/` based on PULSECHECK_ENV.
///
/// Set PULSECHECK_ENV=dev to use the development data directory, or
/// PULSECHECK_DATA_DIR to point at an explicit directory (test isolation).
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> std::io::Result<PathBuf> {
    let dir = if let Ok(explicit) = std::env::var("PULSECHECK_DATA_DIR") {
        PathBuf::from(explicit)
    } else {
        let base_dir = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config");
        let env = std::env::var("PULSECHECK_ENV").unwrap_or_else(|_| "production".to_string());
        if env == "dev" {
            base_dir.join("pulsecheck-dev")
        } else {
            base_dir.join("pulsecheck")
        }
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
