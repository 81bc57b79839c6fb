//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`RoomcastSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply `ROOMCAST_*` environment variable overrides (highest priority)
//! 4. Validate the result
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::RoomcastSettings;

/// Bind address override.
pub const ENV_HOST: &str = "ROOMCAST_HOST";
/// Bind port override.
pub const ENV_PORT: &str = "ROOMCAST_PORT";
/// Endpoint path override.
pub const ENV_PATH: &str = "ROOMCAST_PATH";
/// Session cookie name override.
pub const ENV_SESSION_COOKIE: &str = "ROOMCAST_SESSION_COOKIE";
/// Per-recipient send timeout override, in milliseconds.
pub const ENV_SEND_TIMEOUT_MS: &str = "ROOMCAST_SEND_TIMEOUT_MS";
/// Outbound queue depth override.
pub const ENV_SEND_QUEUE_CAPACITY: &str = "ROOMCAST_SEND_QUEUE_CAPACITY";
/// Log filter override.
pub const ENV_LOG_LEVEL: &str = "ROOMCAST_LOG_LEVEL";
/// JSON log output override.
pub const ENV_LOG_JSON: &str = "ROOMCAST_LOG_JSON";

/// Resolve the path to the settings file (`~/.roomcast/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".roomcast").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<RoomcastSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults (plus overrides). Invalid
/// JSON or a value that fails validation is an error.
pub fn load_settings_from_path(path: &Path) -> Result<RoomcastSettings> {
    load_with(path, |name| std::env::var(name).ok())
}

fn load_with(path: &Path, lookup: impl Fn(&str) -> Option<String>) -> Result<RoomcastSettings> {
    let defaults = serde_json::to_value(RoomcastSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: RoomcastSettings = serde_json::from_value(merged)?;
    apply_overrides(&mut settings, lookup);
    settings.validate()?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `ROOMCAST_*` overrides read through `lookup`.
///
/// Integers must parse and fall within range; booleans accept
/// `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`. Invalid values are
/// ignored with a warning.
pub fn apply_overrides(settings: &mut RoomcastSettings, lookup: impl Fn(&str) -> Option<String>) {
    let env = EnvReader { lookup };

    if let Some(v) = env.string(ENV_HOST) {
        settings.server.host = v;
    }
    if let Some(v) = env.parsed(ENV_PORT, |v| parse_u16_range(v, 1, 65535)) {
        settings.server.port = v;
    }
    if let Some(v) = env.string(ENV_PATH) {
        settings.server.path = v;
    }
    if let Some(v) = env.string(ENV_SESSION_COOKIE) {
        settings.server.session_cookie = Some(v);
    }
    if let Some(v) = env.parsed(ENV_SEND_TIMEOUT_MS, |v| parse_u64_range(v, 1, 600_000)) {
        settings.server.send_timeout_ms = v;
    }
    if let Some(v) = env.parsed(ENV_SEND_QUEUE_CAPACITY, |v| {
        parse_usize_range(v, 1, 1_000_000)
    }) {
        settings.server.send_queue_capacity = v;
    }

    if let Some(v) = env.string(ENV_LOG_LEVEL) {
        settings.logging.level = v;
    }
    if let Some(v) = env.parsed(ENV_LOG_JSON, parse_bool) {
        settings.logging.json = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (min..=max).contains(&n).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (min..=max).contains(&n).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (min..=max).contains(&n).then_some(n)
}

struct EnvReader<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn parsed<T>(&self, name: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
        let val = (self.lookup)(name)?;
        let result = parse(&val);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid env var, ignoring");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde_json::json;

    use super::*;
    use crate::errors::SettingsError;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    fn no_env() -> impl Fn(&str) -> Option<String> {
        |_: &str| None
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = json!({"server": {"port": 3000, "host": "127.0.0.1"}});
        let source = json!({"server": {"port": 9090}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["server"]["port"], 9090);
        assert_eq!(merged["server"]["host"], "127.0.0.1");
    }

    #[test]
    fn merge_null_preserves_target() {
        let merged = deep_merge(json!({"a": 1}), json!({"a": null}));
        assert_eq!(merged["a"], 1);
    }

    #[test]
    fn merge_array_replaces() {
        let merged = deep_merge(json!({"a": [1, 2, 3]}), json!({"a": [9]}));
        assert_eq!(merged["a"], json!([9]));
    }

    #[test]
    fn merge_adds_new_keys() {
        let merged = deep_merge(json!({"a": 1}), json!({"b": 2}));
        assert_eq!(merged, json!({"a": 1, "b": 2}));
    }

    // ── load ────────────────────────────────────────────────────────

    #[test]
    fn load_missing_file_returns_defaults() {
        let path = Path::new("/nonexistent/settings.json");
        let settings = load_with(path, no_env()).unwrap();
        assert_eq!(settings, RoomcastSettings::default());
    }

    #[test]
    fn load_partial_json_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"server": {"port": 4000, "sessionCookie": "sid"}, "logging": {"json": true}}"#,
        )
        .unwrap();

        let settings = load_with(&path, no_env()).unwrap();
        assert_eq!(settings.server.port, 4000);
        assert_eq!(settings.server.session_cookie.as_deref(), Some("sid"));
        assert_eq!(settings.server.path, "/ws");
        assert!(settings.logging.json);
        assert_eq!(settings.logging.level, "info");
    }

    #[test]
    fn load_invalid_json_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not valid json").unwrap();

        let result = load_with(&path, no_env());
        assert!(matches!(result.unwrap_err(), SettingsError::Json(_)));
    }

    #[test]
    fn load_rejects_invalid_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"server": {"path": "chat"}}"#).unwrap();

        let result = load_with(&path, no_env());
        assert!(matches!(result.unwrap_err(), SettingsError::InvalidValue(_)));
    }

    #[test]
    fn env_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"server": {"port": 4000}}"#).unwrap();

        let settings = load_with(&path, env(&[(ENV_PORT, "5000")])).unwrap();
        assert_eq!(settings.server.port, 5000);
    }

    // ── apply_overrides ─────────────────────────────────────────────

    #[test]
    fn overrides_apply_every_key() {
        let mut settings = RoomcastSettings::default();
        apply_overrides(
            &mut settings,
            env(&[
                (ENV_HOST, "0.0.0.0"),
                (ENV_PORT, "8080"),
                (ENV_PATH, "/chat"),
                (ENV_SESSION_COOKIE, "sid"),
                (ENV_SEND_TIMEOUT_MS, "250"),
                (ENV_SEND_QUEUE_CAPACITY, "32"),
                (ENV_LOG_LEVEL, "debug"),
                (ENV_LOG_JSON, "yes"),
            ]),
        );
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.server.path, "/chat");
        assert_eq!(settings.server.session_cookie.as_deref(), Some("sid"));
        assert_eq!(settings.server.send_timeout_ms, 250);
        assert_eq!(settings.server.send_queue_capacity, 32);
        assert_eq!(settings.logging.level, "debug");
        assert!(settings.logging.json);
    }

    #[test]
    fn invalid_overrides_are_ignored() {
        let mut settings = RoomcastSettings::default();
        apply_overrides(
            &mut settings,
            env(&[
                (ENV_PORT, "0"),
                (ENV_SEND_TIMEOUT_MS, "soon"),
                (ENV_LOG_JSON, "maybe"),
                (ENV_HOST, ""),
            ]),
        );
        assert_eq!(settings, RoomcastSettings::default());
    }

    // ── parsers ─────────────────────────────────────────────────────

    #[test]
    fn parse_bool_variants() {
        for val in ["true", "1", "yes", "on", "TRUE", "On"] {
            assert_eq!(parse_bool(val), Some(true), "failed for {val}");
        }
        for val in ["false", "0", "no", "off", "FALSE", "Off"] {
            assert_eq!(parse_bool(val), Some(false), "failed for {val}");
        }
        assert_eq!(parse_bool("maybe"), None);
        assert_eq!(parse_bool(""), None);
    }

    #[test]
    fn parse_u16_bounds() {
        assert_eq!(parse_u16_range("9090", 1, 65535), Some(9090));
        assert_eq!(parse_u16_range("0", 1, 65535), None);
        assert_eq!(parse_u16_range("99999", 1, 65535), None);
        assert_eq!(parse_u16_range("port", 1, 65535), None);
    }

    #[test]
    fn parse_u64_bounds() {
        assert_eq!(parse_u64_range("1000", 1000, 600_000), Some(1000));
        assert_eq!(parse_u64_range("500", 1000, 600_000), None);
        assert_eq!(parse_u64_range("700000", 1000, 600_000), None);
    }

    #[test]
    fn parse_usize_bounds() {
        assert_eq!(parse_usize_range("50", 1, 10_000), Some(50));
        assert_eq!(parse_usize_range("0", 1, 10_000), None);
    }

    #[test]
    fn settings_path_ends_with_roomcast_dir() {
        let path = settings_path();
        assert!(path.ends_with(".roomcast/settings.json"));
    }
}
