use std::time::Duration;

/// Ambient tuning knobs for every background controller and the media
/// policy, gathered in one place the way the orchestrator constructs its
/// workers (§4.F, §4.K, §4.L, §4.M).
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub db_path: std::path::PathBuf,
    pub media_cache_root: std::path::PathBuf,
    pub max_image_bytes: u64,
    pub max_video_bytes: u64,
    pub max_gif_bytes: u64,
    pub max_document_bytes: u64,
    pub max_voice_bytes: u64,

    pub retention_days: i64,
    pub cleanup_interval_hours: i64,
    pub contact_cache_hours: i64,

    pub delivery_monitor_interval_min: i64,
    pub stale_threshold_min: i64,

    pub health_check_sec: u64,
    pub startup_timeout_sec: i64,

    pub session_ready_timeout_sec: u64,
    pub graceful_shutdown_sec: u64,
    pub max_concurrent_syncs: usize,

    /// Disables the typing-simulation sleep entirely (`WHATSIGNAL_TEST_MODE`).
    pub test_mode: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            db_path: std::path::PathBuf::from("./whatsignal.db"),
            media_cache_root: std::path::PathBuf::from("./media-cache"),
            max_image_bytes: 5 * 1024 * 1024,
            max_video_bytes: 16 * 1024 * 1024,
            max_gif_bytes: 8 * 1024 * 1024,
            max_document_bytes: 100 * 1024 * 1024,
            max_voice_bytes: 16 * 1024 * 1024,

            retention_days: 7,
            cleanup_interval_hours: 24,
            contact_cache_hours: 24,

            delivery_monitor_interval_min: 5,
            stale_threshold_min: 30,

            health_check_sec: 30,
            startup_timeout_sec: 120,

            session_ready_timeout_sec: 60,
            graceful_shutdown_sec: 30,
            max_concurrent_syncs: 4,

            test_mode: false,
        }
    }
}

impl BridgeConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            db_path: std::env::var("WHATSIGNAL_DB_PATH")
                .map(std::path::PathBuf::from)
                .unwrap_or(defaults.db_path),
            media_cache_root: std::env::var("WHATSIGNAL_MEDIA_CACHE_DIR")
                .map(std::path::PathBuf::from)
                .unwrap_or(defaults.media_cache_root),
            retention_days: std::env::var("WHATSIGNAL_RETENTION_DAYS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.retention_days),
            contact_cache_hours: std::env::var("WHATSIGNAL_CONTACT_CACHE_HOURS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.contact_cache_hours),
            test_mode: std::env::var("WHATSIGNAL_TEST_MODE")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            ..defaults
        }
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_sec)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs((self.cleanup_interval_hours.max(0) as u64) * 3600)
    }

    pub fn delivery_monitor_interval(&self) -> Duration {
        Duration::from_secs((self.delivery_monitor_interval_min.max(0) as u64) * 60)
    }
}
