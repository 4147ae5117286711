use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use whatsignal_common::{ChannelManager, ContactCache, SessionState, WhatsAppGateway};

use crate::config::BridgeConfig;

/// Static identity the orchestrator logs and exposes over `/health` and
/// `--version`, built once at startup from compile-time constants and
/// passed in explicitly rather than read back out of a package-level
/// mutable global (REDESIGN FLAG, §9).
#[derive(Debug, Clone)]
pub struct AppInfo {
    pub name: String,
    pub version: String,
    pub build_time: String,
    pub commit: String,
}

/// Startup- and shutdown-tuning knobs the orchestrator itself needs,
/// distinct from `BridgeConfig`'s per-component settings.
#[derive(Debug, Clone, Copy)]
pub struct OrchestratorOptions {
    pub session_ready_timeout: Duration,
    pub graceful_shutdown_timeout: Duration,
    pub max_concurrent_syncs: usize,
}

impl From<&BridgeConfig> for OrchestratorOptions {
    fn from(config: &BridgeConfig) -> Self {
        Self {
            session_ready_timeout: Duration::from_secs(config.session_ready_timeout_sec),
            graceful_shutdown_timeout: Duration::from_secs(config.graceful_shutdown_sec),
            max_concurrent_syncs: config.max_concurrent_syncs,
        }
    }
}

/// Bounds startup contact/group sync fan-out and sequences graceful
/// shutdown across every background loop (§4.M).
pub struct Orchestrator {
    info: AppInfo,
    channels: Arc<ChannelManager>,
    whatsapp: Arc<dyn WhatsAppGateway>,
    contacts: Arc<dyn ContactCache>,
    options: OrchestratorOptions,
}

impl Orchestrator {
    pub fn new(
        info: AppInfo,
        channels: Arc<ChannelManager>,
        whatsapp: Arc<dyn WhatsAppGateway>,
        contacts: Arc<dyn ContactCache>,
        options: OrchestratorOptions,
    ) -> Self {
        Self { info, channels, whatsapp, contacts, options }
    }

    pub fn info(&self) -> &AppInfo {
        &self.info
    }

    /// Fans out an initial contact/group sync across every configured
    /// session, bounded by `max_concurrent_syncs` concurrent in-flight
    /// syncs regardless of how many sessions are configured.
    pub async fn sync_all_sessions(&self) {
        let semaphore = Arc::new(Semaphore::new(self.options.max_concurrent_syncs.max(1)));
        let mut handles = Vec::new();

        for session in self.channels.sessions() {
            let session = session.to_string();
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => continue,
            };
            let contacts = self.contacts.clone();
            let whatsapp = self.whatsapp.clone();
            let ready_timeout = self.options.session_ready_timeout;

            handles.push(tokio::spawn(async move {
                let _permit = permit;
                if !Self::wait_until_ready(&whatsapp, &session, ready_timeout).await {
                    tracing::warn!(session = %session, "skipping sync, session never reached WORKING");
                    return;
                }
                match contacts.sync_all_contacts(&session).await {
                    Ok(count) => tracing::info!(session = %session, count, "synced contacts"),
                    Err(e) => tracing::error!(session = %session, error = %e, "contact sync failed"),
                }
                match contacts.sync_all_groups(&session).await {
                    Ok(count) => tracing::info!(session = %session, count, "synced groups"),
                    Err(e) => tracing::error!(session = %session, error = %e, "group sync failed"),
                }
            }));
        }

        for handle in handles {
            let _ = handle.await;
        }
    }

    /// Polls `session_status` every 500ms until `session` reaches
    /// `WORKING` or `timeout` elapses. Returns `false` (not an error) on
    /// timeout so the caller can skip that session's sync.
    async fn wait_until_ready(whatsapp: &Arc<dyn WhatsAppGateway>, session: &str, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            match whatsapp.session_status(session).await {
                Ok(status) if SessionState::from_gateway_status(&status).is_healthy() => return true,
                _ => {}
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    }

    /// Signals every background loop via `cancel`, waits up to
    /// `graceful_shutdown_timeout` for `background` to finish on its own,
    /// then returns whether it finished in time. The caller is expected
    /// to have already stopped accepting new HTTP connections before
    /// calling this, and to close the store/flush tracing after.
    pub async fn shutdown(&self, cancel: CancellationToken, background: tokio::task::JoinHandle<()>) -> bool {
        tracing::info!("shutdown requested, signaling background loops");
        cancel.cancel();

        match tokio::time::timeout(self.options.graceful_shutdown_timeout, background).await {
            Ok(Ok(())) => {
                tracing::info!("background loops stopped cleanly");
                true
            }
            Ok(Err(e)) => {
                tracing::error!(error = %e, "background task panicked during shutdown");
                false
            }
            Err(_) => {
                tracing::warn!("graceful shutdown timeout elapsed, forcing close");
                false
            }
        }
    }
}
