use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub(crate) const CONFIG_FILE_NAME: &str = "citadel_config.json";

const DEFAULT_CACHE_ROOM_CAPACITY: usize = 10;
const DEFAULT_CACHE_WINDOW_SIZE: usize = 20;
const DEFAULT_HISTORY_PAGE_SIZE: u32 = 30;
const DEFAULT_SEARCH_PAGE_SIZE: u32 = 100;
const DEFAULT_SEARCH_DEBOUNCE_MS: u64 = 300;
const DEFAULT_TYPING_IDLE_MS: u64 = 1_000;
const DEFAULT_DELETE_FOR_EVERYONE_WINDOW_SECS: i64 = 30 * 60;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct AppConfig {
    pub(crate) disable_network: Option<bool>,
    pub(crate) cache_room_capacity: Option<usize>,
    pub(crate) cache_window_size: Option<usize>,
    pub(crate) history_page_size: Option<u32>,
    pub(crate) search_page_size: Option<u32>,
    pub(crate) search_debounce_ms: Option<u64>,
    pub(crate) typing_idle_ms: Option<u64>,
    pub(crate) delete_for_everyone_window_secs: Option<i64>,
}

pub(crate) fn load_app_config(data_dir: &str) -> AppConfig {
    let path = Path::new(data_dir).join(CONFIG_FILE_NAME);
    let Ok(bytes) = std::fs::read(&path) else {
        return AppConfig::default();
    };
    match serde_json::from_slice::<AppConfig>(&bytes) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::warn!(path = %path.display(), %e, "invalid config, using defaults");
            AppConfig::default()
        }
    }
}

pub(crate) fn default_app_config_json() -> String {
    let defaults = AppConfig {
        disable_network: Some(false),
        cache_room_capacity: Some(DEFAULT_CACHE_ROOM_CAPACITY),
        cache_window_size: Some(DEFAULT_CACHE_WINDOW_SIZE),
        history_page_size: Some(DEFAULT_HISTORY_PAGE_SIZE),
        search_page_size: Some(DEFAULT_SEARCH_PAGE_SIZE),
        search_debounce_ms: Some(DEFAULT_SEARCH_DEBOUNCE_MS),
        typing_idle_ms: Some(DEFAULT_TYPING_IDLE_MS),
        delete_for_everyone_window_secs: Some(DEFAULT_DELETE_FOR_EVERYONE_WINDOW_SECS),
    };
    serde_json::to_string_pretty(&defaults).unwrap_or_else(|_| "{}".into())
}

/// Resolved engine limits. Zero or negative values in the file fall back to defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineLimits {
    pub cache_room_capacity: usize,
    pub cache_window_size: usize,
    pub history_page_size: u32,
    pub search_page_size: u32,
    pub search_debounce: Duration,
    pub typing_idle: Duration,
    pub delete_for_everyone_window_secs: i64,
}

impl Default for EngineLimits {
    fn default() -> Self {
        AppConfig::default().limits()
    }
}

impl AppConfig {
    pub(crate) fn network_enabled(&self) -> bool {
        // Used to keep Rust tests deterministic and offline.
        if let Some(disable) = self.disable_network {
            return !disable;
        }
        std::env::var("CITADEL_DISABLE_NETWORK").ok().as_deref() != Some("1")
    }

    pub(crate) fn limits(&self) -> EngineLimits {
        EngineLimits {
            cache_room_capacity: self
                .cache_room_capacity
                .filter(|v| *v > 0)
                .unwrap_or(DEFAULT_CACHE_ROOM_CAPACITY),
            cache_window_size: self
                .cache_window_size
                .filter(|v| *v > 0)
                .unwrap_or(DEFAULT_CACHE_WINDOW_SIZE),
            history_page_size: self
                .history_page_size
                .filter(|v| *v > 0)
                .unwrap_or(DEFAULT_HISTORY_PAGE_SIZE),
            search_page_size: self
                .search_page_size
                .filter(|v| *v > 0)
                .unwrap_or(DEFAULT_SEARCH_PAGE_SIZE),
            search_debounce: Duration::from_millis(
                self.search_debounce_ms.unwrap_or(DEFAULT_SEARCH_DEBOUNCE_MS),
            ),
            typing_idle: Duration::from_millis(
                self.typing_idle_ms
                    .filter(|v| *v > 0)
                    .unwrap_or(DEFAULT_TYPING_IDLE_MS),
            ),
            delete_for_everyone_window_secs: self
                .delete_for_everyone_window_secs
                .filter(|v| *v > 0)
                .unwrap_or(DEFAULT_DELETE_FOR_EVERYONE_WINDOW_SECS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_app_config(&dir.path().to_string_lossy());
        let limits = cfg.limits();
        assert_eq!(limits.cache_room_capacity, 10);
        assert_eq!(limits.cache_window_size, 20);
        assert_eq!(limits.search_page_size, 100);
        assert_eq!(limits.search_debounce, Duration::from_millis(300));
        assert_eq!(limits.typing_idle, Duration::from_secs(1));
        assert_eq!(limits.delete_for_everyone_window_secs, 1800);
    }

    #[test]
    fn partial_file_overrides_only_named_keys() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            r#"{"disable_network": true, "cache_window_size": 5, "cache_room_capacity": 0}"#,
        )
        .unwrap();
        let cfg = load_app_config(&dir.path().to_string_lossy());
        assert!(!cfg.network_enabled());
        let limits = cfg.limits();
        assert_eq!(limits.cache_window_size, 5);
        assert_eq!(limits.cache_room_capacity, 10);
    }

    #[test]
    fn garbage_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), b"not json").unwrap();
        let cfg = load_app_config(&dir.path().to_string_lossy());
        assert_eq!(cfg.limits(), EngineLimits::default());
    }

    #[test]
    fn default_json_round_trips_to_default_limits() {
        let cfg: AppConfig = serde_json::from_str(&default_app_config_json()).unwrap();
        assert_eq!(cfg.limits(), EngineLimits::default());
        assert_eq!(cfg.disable_network, Some(false));
    }
}
