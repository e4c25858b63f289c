use std::{collections::HashMap, fs, time::Duration};

use crate::{
    draft::{DraftOptions, DEFAULT_DEBOUNCE, DEFAULT_DRAFT_VERSION, DEFAULT_MAX_AGE},
    gesture::{
        GestureConfig, DEFAULT_MAX_VERTICAL_PX, DEFAULT_MIN_SPEED_PX_PER_MS,
        DEFAULT_SWIPE_THRESHOLD_PX,
    },
};

pub const SETTINGS_FILE: &str = "portal.toml";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub server_url: Option<String>,
    pub database_url: String,
    pub draft_version: u32,
    pub draft_max_age_secs: u64,
    pub debounce_ms: u64,
    pub gesture_threshold_px: f64,
    pub gesture_max_vertical_px: f64,
    pub gesture_min_speed: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_url: None,
            database_url: "sqlite://./data/drafts.db".into(),
            draft_version: DEFAULT_DRAFT_VERSION,
            draft_max_age_secs: DEFAULT_MAX_AGE.as_secs(),
            debounce_ms: DEFAULT_DEBOUNCE.as_millis() as u64,
            gesture_threshold_px: DEFAULT_SWIPE_THRESHOLD_PX,
            gesture_max_vertical_px: DEFAULT_MAX_VERTICAL_PX,
            gesture_min_speed: DEFAULT_MIN_SPEED_PX_PER_MS,
        }
    }
}

impl Settings {
    pub fn draft_options(&self) -> DraftOptions {
        DraftOptions {
            version: self.draft_version,
            max_age: Duration::from_secs(self.draft_max_age_secs),
            debounce: Duration::from_millis(self.debounce_ms),
        }
    }

    pub fn gesture_config(&self) -> GestureConfig {
        GestureConfig {
            threshold: self.gesture_threshold_px,
            max_vertical: self.gesture_max_vertical_px,
            min_speed: self.gesture_min_speed,
        }
    }
}

pub fn load_settings() -> Settings {
    let file = fs::read_to_string(SETTINGS_FILE).ok();
    load_settings_from(file.as_deref(), |name| std::env::var(name).ok())
}

pub fn load_settings_from(
    file: Option<&str>,
    env: impl Fn(&str) -> Option<String>,
) -> Settings {
    let mut settings = Settings::default();

    if let Some(raw) = file {
        if let Ok(file_cfg) = toml::from_str::<HashMap<String, toml::Value>>(raw) {
            let lookup = |key: &str| file_cfg.get(key).map(value_to_string);
            apply(&mut settings, lookup);
        }
    }

    // Plain names first, APP__ names win.
    apply(&mut settings, |key| env(&format!("PORTAL_{}", key.to_ascii_uppercase())));
    apply(&mut settings, |key| env(&format!("APP__{}", key.to_ascii_uppercase())));

    settings
}

fn value_to_string(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn apply(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("server_url") {
        settings.server_url = Some(v).filter(|url| !url.trim().is_empty());
    }
    if let Some(v) = lookup("database_url") {
        settings.database_url = v;
    }
    if let Some(v) = lookup("draft_version").and_then(|v| v.parse().ok()) {
        settings.draft_version = v;
    }
    if let Some(v) = lookup("draft_max_age_secs").and_then(|v| v.parse().ok()) {
        settings.draft_max_age_secs = v;
    }
    if let Some(v) = lookup("debounce_ms").and_then(|v| v.parse().ok()) {
        settings.debounce_ms = v;
    }
    if let Some(v) = lookup("gesture_threshold_px").and_then(|v| v.parse().ok()) {
        settings.gesture_threshold_px = v;
    }
    if let Some(v) = lookup("gesture_max_vertical_px").and_then(|v| v.parse().ok()) {
        settings.gesture_max_vertical_px = v;
    }
    if let Some(v) = lookup("gesture_min_speed").and_then(|v| v.parse().ok()) {
        settings.gesture_min_speed = v;
    }
}

// Parent directories are created by `storage::Storage::new`.
pub fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return Settings::default().database_url;
    }

    if raw_database_url.starts_with("sqlite::memory:")
        || raw_database_url.starts_with("sqlite://")
        || raw_database_url.contains("://")
    {
        return raw_database_url.to_string();
    }

    if let Some(path) = raw_database_url.strip_prefix("sqlite:") {
        return format!("sqlite://{}", path.replace('\\', "/"));
    }

    format!("sqlite://{}", raw_database_url.replace('\\', "/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn defaults_match_documented_values() {
        let settings = load_settings_from(None, no_env);
        assert_eq!(settings, Settings::default());
        let options = settings.draft_options();
        assert_eq!(options.debounce, Duration::from_millis(1000));
        assert_eq!(options.version, 1);
        assert_eq!(settings.gesture_config(), GestureConfig::default());
    }

    #[test]
    fn file_values_are_applied() {
        let file = r#"
            server_url = "https://portal.example"
            debounce_ms = 250
            draft_version = 3
            gesture_min_speed = 0.5
        "#;
        let settings = load_settings_from(Some(file), no_env);
        assert_eq!(settings.server_url.as_deref(), Some("https://portal.example"));
        assert_eq!(settings.debounce_ms, 250);
        assert_eq!(settings.draft_version, 3);
        assert_eq!(settings.gesture_min_speed, 0.5);
    }

    #[test]
    fn app_env_overrides_plain_env_and_file() {
        let file = "debounce_ms = 250";
        let settings = load_settings_from(Some(file), |name| match name {
            "PORTAL_DEBOUNCE_MS" => Some("400".to_string()),
            "APP__DEBOUNCE_MS" => Some("600".to_string()),
            "PORTAL_DATABASE_URL" => Some("sqlite::memory:".to_string()),
            _ => None,
        });
        assert_eq!(settings.debounce_ms, 600);
        assert_eq!(settings.database_url, "sqlite::memory:");
    }

    #[test]
    fn unparseable_numbers_keep_previous_value() {
        let settings = load_settings_from(None, |name| {
            (name == "APP__DRAFT_MAX_AGE_SECS").then(|| "forever".to_string())
        });
        assert_eq!(settings.draft_max_age_secs, DEFAULT_MAX_AGE.as_secs());
    }

    #[test]
    fn blank_server_url_means_unset() {
        let settings = load_settings_from(Some("server_url = \"  \""), no_env);
        assert_eq!(settings.server_url, None);
    }

    #[test]
    fn normalizes_plain_file_path_to_sqlite_url() {
        assert_eq!(
            normalize_database_url("./data/test.db"),
            "sqlite://./data/test.db"
        );
        assert_eq!(normalize_database_url("sqlite:drafts.db"), "sqlite://drafts.db");
        assert_eq!(normalize_database_url("sqlite::memory:"), "sqlite::memory:");
        assert_eq!(normalize_database_url("  "), Settings::default().database_url);
    }
}
