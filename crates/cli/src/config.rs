use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use whatsignal_bridge::BridgeConfig;
use whatsignal_common::{BridgeError, Channel};
use whatsignal_signal::SignalConfig;
use whatsignal_waha::WahaConfig;
use whatsignal_webhook::WebhookConfig;

/// The one piece of configuration that has no sensible environment-only
/// form: the channel list. Everything else ambient lives in each
/// component's own `from_env` (§6).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct FileConfig {
    #[serde(default)]
    channels: Vec<Channel>,
    /// Allows raw (unhashed) identifiers in logs. Mirrors the flag
    /// `--verbose` sets at runtime, but can also be pinned in the file.
    #[serde(default)]
    log_raw_identifiers: bool,
}

/// Fully resolved application configuration: the file-backed channel
/// list plus every component's env-loaded settings, gathered in one
/// place the way the orchestrator wires its workers (§3, §6).
#[derive(Debug)]
pub struct AppConfig {
    pub channels: Vec<Channel>,
    pub log_raw_identifiers: bool,
    pub encryption_secret: String,
    pub waha: WahaConfig,
    pub signal: SignalConfig,
    pub bridge: BridgeConfig,
    pub webhook: WebhookConfig,
}

impl AppConfig {
    /// Loads `path` as JSON over `FileConfig::default()`, then applies
    /// `WHATSIGNAL__`-prefixed environment overrides before validating.
    /// Mirrors the serde_json merge-over-defaults shape the config loader
    /// in the wider pack uses in place of literal `config`-crate
    /// builder calls.
    pub fn load(path: &Path) -> Result<Self, BridgeError> {
        if !path.exists() {
            return Err(BridgeError::Config(format!("config file not found: {}", path.display())));
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| BridgeError::Config(format!("failed to read {}: {e}", path.display())))?;
        let file_value: Value = serde_json::from_str(&content)
            .map_err(|e| BridgeError::Config(format!("invalid config JSON in {}: {e}", path.display())))?;

        let mut merged = serde_json::to_value(FileConfig::default())
            .map_err(|e| BridgeError::Config(format!("internal config defaults error: {e}")))?;
        merge_values(&mut merged, file_value);
        apply_env_overrides(&mut merged);

        let file_config: FileConfig = serde_json::from_value(merged)
            .map_err(|e| BridgeError::Config(format!("invalid config: {e}")))?;

        if file_config.channels.is_empty() {
            return Err(BridgeError::Config("at least one channel must be configured".to_string()));
        }

        let encryption_secret = std::env::var("WHATSIGNAL_ENCRYPTION_SECRET")
            .map_err(|_| BridgeError::Config("WHATSIGNAL_ENCRYPTION_SECRET environment variable must be set".to_string()))?;

        Ok(Self {
            channels: file_config.channels,
            log_raw_identifiers: file_config.log_raw_identifiers,
            encryption_secret,
            waha: WahaConfig::from_env(),
            signal: SignalConfig::from_env(),
            bridge: BridgeConfig::from_env(),
            webhook: WebhookConfig::from_env()?,
        })
    }
}

fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                if let Some(existing) = base_map.get_mut(&key) {
                    merge_values(existing, value);
                } else {
                    base_map.insert(key, value);
                }
            }
        }
        (base_value, overlay_value) => {
            *base_value = overlay_value;
        }
    }
}

fn parse_env_value(raw: &str) -> Value {
    if let Ok(v) = serde_json::from_str::<Value>(raw) {
        return v;
    }
    Value::String(raw.to_string())
}

fn set_path_value(root: &mut Value, path: &[String], value: Value) {
    if path.is_empty() {
        *root = value;
        return;
    }

    let mut current = root;
    for segment in &path[..path.len() - 1] {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        let map = current.as_object_mut().expect("object ensured above");
        current = map.entry(segment.clone()).or_insert_with(|| Value::Object(Map::new()));
    }

    if !current.is_object() {
        *current = Value::Object(Map::new());
    }
    if let Some(map) = current.as_object_mut() {
        map.insert(path[path.len() - 1].clone(), value);
    }
}

/// `WHATSIGNAL__LOG_RAW_IDENTIFIERS=true` -> `log_raw_identifiers`;
/// `WHATSIGNAL__CHANNELS` is deliberately not supported here since a flat
/// env var can't express an array of objects cleanly — the channel list
/// stays file-only.
fn apply_env_overrides(config: &mut Value) {
    const PREFIX: &str = "WHATSIGNAL__";
    for (key, value) in std::env::vars() {
        let Some(suffix) = key.strip_prefix(PREFIX) else { continue };
        if suffix.is_empty() {
            continue;
        }
        let segments: Vec<String> = suffix.split("__").filter(|s| !s.is_empty()).map(str::to_ascii_lowercase).collect();
        if segments.is_empty() {
            continue;
        }
        set_path_value(config, &segments, parse_env_value(&value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let err = AppConfig::load(Path::new("/nonexistent/whatsignal.json")).unwrap_err();
        assert!(matches!(err, BridgeError::Config(_)));
    }

    #[test]
    fn empty_channel_list_is_rejected() {
        let file = write_config(r#"{"channels": []}"#);
        let err = AppConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, BridgeError::Config(_)));
    }

    #[test]
    fn env_override_sets_nested_flag() {
        // SAFETY: test-local mutation of a process-wide env var; no other
        // test in this module reads WHATSIGNAL__LOG_RAW_IDENTIFIERS.
        unsafe { std::env::set_var("WHATSIGNAL__LOG_RAW_IDENTIFIERS", "true") };
        let mut merged = serde_json::to_value(FileConfig::default()).unwrap();
        apply_env_overrides(&mut merged);
        unsafe { std::env::remove_var("WHATSIGNAL__LOG_RAW_IDENTIFIERS") };

        let config: FileConfig = serde_json::from_value(merged).unwrap();
        assert!(config.log_raw_identifiers);
    }
}
