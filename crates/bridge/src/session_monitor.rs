use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use whatsignal_common::{SessionState, WhatsAppGateway};

use crate::config::BridgeConfig;

struct MonitorState {
    current: SessionState,
    unhealthy_since: Option<Instant>,
}

/// Watches one WhatsApp session's health and restarts it when it sits
/// outside `WORKING` for longer than the configured startup timeout
/// (§4.K). One instance per session.
pub struct SessionMonitor {
    whatsapp: Arc<dyn WhatsAppGateway>,
    session: String,
    health_check_interval: Duration,
    startup_timeout: Duration,
    cancel: CancellationToken,
    state: Mutex<MonitorState>,
}

impl SessionMonitor {
    pub fn new(whatsapp: Arc<dyn WhatsAppGateway>, session: String, config: &BridgeConfig, cancel: CancellationToken) -> Self {
        Self {
            whatsapp,
            session,
            health_check_interval: config.health_check_interval(),
            startup_timeout: Duration::from_secs(config.startup_timeout_sec.max(0) as u64),
            cancel,
            state: Mutex::new(MonitorState { current: SessionState::Unknown, unhealthy_since: None }),
        }
    }

    pub async fn run(&self) {
        let mut ticker = tokio::time::interval(self.health_check_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.check_once().await,
                _ = self.cancel.cancelled() => return,
            }
        }
    }

    async fn check_once(&self) {
        let observed = match self.whatsapp.session_status(&self.session).await {
            Ok(status) => SessionState::from_gateway_status(&status),
            Err(e) => {
                tracing::warn!(session = %self.session, error = %e, "session status check failed");
                return;
            }
        };

        let mut state = self.state.lock().await;
        if observed != state.current {
            tracing::info!(session = %self.session, from = ?state.current, to = ?observed, "session state transition");
            state.current = observed;
            state.unhealthy_since = if observed.is_healthy() { None } else { Some(Instant::now()) };
            return;
        }

        if observed.is_healthy() {
            state.unhealthy_since = None;
            return;
        }

        let unhealthy_since = *state.unhealthy_since.get_or_insert_with(Instant::now);
        if unhealthy_since.elapsed() < self.startup_timeout {
            return;
        }

        tracing::warn!(session = %self.session, state = ?observed, "session unhealthy past startup timeout, restarting");
        // Restart window resets regardless of outcome so a failing restart
        // doesn't get retried on every subsequent tick.
        state.current = SessionState::Starting;
        state.unhealthy_since = Some(Instant::now());
        drop(state);

        if let Err(e) = self.whatsapp.restart_session(&self.session).await {
            tracing::error!(session = %self.session, error = %e, "session restart failed");
        }
    }
}
