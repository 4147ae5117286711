use std::sync::Arc;

use whatsignal_bridge::{AppInfo, MessageService};
use whatsignal_common::{ChannelManager, RateLimiter, WhatsAppGateway};

use crate::config::WebhookConfig;

/// Shared state handed to every axum handler. Built once at startup by
/// the `cli` crate and cloned per request (everything inside is an `Arc`).
#[derive(Clone)]
pub struct AppState {
    pub info: Arc<AppInfo>,
    pub config: Arc<WebhookConfig>,
    pub messages: Arc<MessageService>,
    pub channels: Arc<ChannelManager>,
    pub whatsapp: Arc<dyn WhatsAppGateway>,
    pub rate_limiter: Arc<RateLimiter>,
}
