use std::{fs, io::ErrorKind, path::Path};

use anyhow::Context;
use board_core::EngineConfig;
use serde::Deserialize;

pub const DEFAULT_CONFIG_FILE: &str = "boardctl.toml";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub database_url: String,
    pub engine: EngineConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: "sqlite://./data/board.db".into(),
            engine: EngineConfig::default(),
        }
    }
}

/// Reads `path` when it exists, then applies environment overrides.
pub fn load_settings(path: &Path) -> anyhow::Result<Settings> {
    let settings = match fs::read_to_string(path) {
        Ok(raw) => toml::from_str::<Settings>(&raw)
            .with_context(|| format!("invalid settings file '{}'", path.display()))?,
        Err(err) if err.kind() == ErrorKind::NotFound => Settings::default(),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read '{}'", path.display()));
        }
    };
    Ok(apply_env_overrides(settings, |key| std::env::var(key).ok()))
}

fn apply_env_overrides(
    mut settings: Settings,
    lookup: impl Fn(&str) -> Option<String>,
) -> Settings {
    if let Some(v) = lookup("DATABASE_URL") {
        settings.database_url = v;
    }
    if let Some(v) = lookup("APP__DATABASE_URL") {
        settings.database_url = v;
    }
    if let Some(parsed) = lookup("APP__RETRY_ATTEMPTS").and_then(|v| v.parse().ok()) {
        settings.engine.retry_attempts = parsed;
    }
    if let Some(parsed) = lookup("APP__RETRY_DELAY_MS").and_then(|v| v.parse().ok()) {
        settings.engine.retry_delay_ms = parsed;
    }
    settings
}

pub fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return Settings::default().database_url;
    }

    if raw_database_url.starts_with("sqlite::memory:") || raw_database_url.contains("://") {
        return raw_database_url.to_string();
    }

    if let Some(path) = raw_database_url.strip_prefix("sqlite:") {
        return format!("sqlite://{}", path.replace('\\', "/"));
    }

    format!("sqlite://{}", raw_database_url.replace('\\', "/"))
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
