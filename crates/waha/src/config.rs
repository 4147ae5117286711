use serde::Deserialize;

/// Configuration for the WAHA HTTP client.
#[derive(Deserialize, Debug, Clone)]
pub struct WahaConfig {
    /// Base URL of the WAHA instance, e.g. `http://localhost:3000`.
    pub base_url: String,
    /// API key sent as `X-Api-Key` on every request, if the instance requires one.
    pub api_key: Option<String>,

    pub rate_limit_per_minute: u32,
    pub rate_limit_burst: u32,

    pub request_timeout_seconds: u64,
    pub max_concurrent_requests: usize,

    pub max_retry_attempts: u32,
    pub initial_retry_delay_ms: u64,
    pub max_retry_delay_ms: u64,
}

impl WahaConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        Self {
            base_url: std::env::var("WAHA_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            api_key: std::env::var("WHATSAPP_API_KEY").ok(),

            rate_limit_per_minute: std::env::var("WAHA_RATE_LIMIT_PER_MINUTE")
                .unwrap_or_else(|_| "120".to_string())
                .parse()
                .expect("WAHA_RATE_LIMIT_PER_MINUTE must be a valid number"),
            rate_limit_burst: std::env::var("WAHA_RATE_LIMIT_BURST")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .expect("WAHA_RATE_LIMIT_BURST must be a valid number"),

            request_timeout_seconds: std::env::var("WAHA_REQUEST_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .expect("WAHA_REQUEST_TIMEOUT_SECONDS must be a valid number"),
            max_concurrent_requests: std::env::var("WAHA_MAX_CONCURRENT_REQUESTS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .expect("WAHA_MAX_CONCURRENT_REQUESTS must be a valid number"),

            max_retry_attempts: std::env::var("WAHA_MAX_RETRY_ATTEMPTS")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .expect("WAHA_MAX_RETRY_ATTEMPTS must be a valid number"),
            initial_retry_delay_ms: std::env::var("WAHA_INITIAL_RETRY_DELAY_MS")
                .unwrap_or_else(|_| "500".to_string())
                .parse()
                .expect("WAHA_INITIAL_RETRY_DELAY_MS must be a valid number"),
            max_retry_delay_ms: std::env::var("WAHA_MAX_RETRY_DELAY_MS")
                .unwrap_or_else(|_| "30000".to_string())
                .parse()
                .expect("WAHA_MAX_RETRY_DELAY_MS must be a valid number"),
        }
    }

    pub fn session_url(&self, session: &str) -> String {
        format!("{}/api/sessions/{}", self.base_url, session)
    }
}
