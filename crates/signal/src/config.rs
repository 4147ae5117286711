use serde::Deserialize;

/// Configuration for the Signal RPC gateway client.
#[derive(Deserialize, Debug, Clone)]
pub struct SignalConfig {
    /// Base URL of the Signal gateway, e.g. `http://localhost:8080`.
    pub base_url: String,
    /// Our own Signal account number, used as the sender on every send
    /// and as the receiver in the long-poll loop.
    pub account_number: String,

    pub receive_timeout_seconds: u64,
    pub request_timeout_seconds: u64,

    pub max_retry_attempts: u32,
    pub initial_retry_delay_ms: u64,
    pub max_retry_delay_ms: u64,

    /// Fail startup if the gateway cannot be reached, rather than warning
    /// and continuing (§4.M: "Signal-device init failures warn unless
    /// strictInit is configured").
    pub strict_init: bool,
}

impl SignalConfig {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        Self {
            base_url: std::env::var("SIGNAL_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            account_number: std::env::var("SIGNAL_ACCOUNT_NUMBER")
                .expect("SIGNAL_ACCOUNT_NUMBER environment variable must be set"),

            receive_timeout_seconds: std::env::var("SIGNAL_RECEIVE_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .expect("SIGNAL_RECEIVE_TIMEOUT_SECONDS must be a valid number"),
            request_timeout_seconds: std::env::var("SIGNAL_REQUEST_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .expect("SIGNAL_REQUEST_TIMEOUT_SECONDS must be a valid number"),

            max_retry_attempts: std::env::var("SIGNAL_MAX_RETRY_ATTEMPTS")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .expect("SIGNAL_MAX_RETRY_ATTEMPTS must be a valid number"),
            initial_retry_delay_ms: std::env::var("SIGNAL_INITIAL_RETRY_DELAY_MS")
                .unwrap_or_else(|_| "500".to_string())
                .parse()
                .expect("SIGNAL_INITIAL_RETRY_DELAY_MS must be a valid number"),
            max_retry_delay_ms: std::env::var("SIGNAL_MAX_RETRY_DELAY_MS")
                .unwrap_or_else(|_| "30000".to_string())
                .parse()
                .expect("SIGNAL_MAX_RETRY_DELAY_MS must be a valid number"),

            strict_init: std::env::var("SIGNAL_STRICT_INIT")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        }
    }

    pub fn receive_url(&self) -> String {
        format!("{}/v1/receive/{}", self.base_url, self.account_number)
    }

    pub fn send_url(&self) -> String {
        format!("{}/v2/send", self.base_url)
    }
}
