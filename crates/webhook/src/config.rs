use whatsignal_common::BridgeError;

/// Whether webhook secrets are mandatory (§6's `WHATSIGNAL_ENV=production`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    fn from_env() -> Self {
        match std::env::var("WHATSIGNAL_ENV").as_deref() {
            Ok("production") => Environment::Production,
            _ => Environment::Development,
        }
    }
}

/// Webhook server configuration (§4.J). `webhook_secret` gates both HMAC
/// schemes; its absence is fatal in production and permitted in
/// development, per §4.J item 2.
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub host: String,
    pub port: u16,
    pub webhook_secret: Option<String>,
    pub environment: Environment,
    pub hmac_skew_sec: i64,
    pub rate_limit_per_minute: usize,
}

impl WebhookConfig {
    pub fn from_env() -> Result<Self, BridgeError> {
        dotenv::dotenv().ok();

        let environment = Environment::from_env();
        let webhook_secret = std::env::var("WHATSIGNAL_WEBHOOK_SECRET").ok().filter(|s| !s.is_empty());

        if environment == Environment::Production && webhook_secret.is_none() {
            return Err(BridgeError::Config(
                "WHATSIGNAL_WEBHOOK_SECRET must be set when WHATSIGNAL_ENV=production".to_string(),
            ));
        }

        Ok(Self {
            host: std::env::var("WEBHOOK_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8080),
            webhook_secret,
            environment,
            hmac_skew_sec: std::env::var("WHATSIGNAL_WEBHOOK_SKEW_SEC")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(300),
            rate_limit_per_minute: std::env::var("WHATSIGNAL_WEBHOOK_RATE_LIMIT_PER_MIN")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(120),
        })
    }

    pub fn listen_address(&self) -> std::net::SocketAddr {
        format!("{}:{}", self.host, self.port).parse().expect("invalid WEBHOOK_HOST/PORT")
    }
}
