//! Shared helpers for CLI commands.

use pulsecheck_core::{CheckinEngine, Config, Database};

/// Open the engine over the default database and config.
pub fn open_engine() -> Result<CheckinEngine, Box<dyn std::error::Error>> {
    let config = Config::load_or_default();
    let db = Database::open()?;
    Ok(CheckinEngine::new(db, config))
}

/// Render an optional timestamp for plain-text output.
pub fn fmt_time(ts: Option<chrono::DateTime<chrono::Utc>>) -> String {
    match ts {
        Some(t) => t.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        None => "-".to_string(),
    }
}
