use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use whatsignal_common::MappingStore;

use crate::config::BridgeConfig;
use crate::media_stager::MediaStager;

/// Periodic retention sweep (§4.L, scenario 6): purges mapping rows and
/// staged media files older than `retention_days`.
pub struct Scheduler {
    store: Arc<dyn MappingStore>,
    stager: Arc<MediaStager>,
    interval: std::time::Duration,
    retention_days: i64,
    cancel: CancellationToken,
}

impl Scheduler {
    pub fn new(store: Arc<dyn MappingStore>, stager: Arc<MediaStager>, config: &BridgeConfig, cancel: CancellationToken) -> Self {
        Self {
            store,
            stager,
            interval: config.cleanup_interval(),
            retention_days: config.retention_days,
            cancel,
        }
    }

    pub async fn run(&self) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.sweep_once().await,
                _ = self.cancel.cancelled() => return,
            }
        }
    }

    async fn sweep_once(&self) {
        let cutoff = Utc::now() - chrono::Duration::days(self.retention_days.max(0));

        match self.store.purge_older_than(cutoff).await {
            Ok(count) => tracing::info!(count, "purged stale mapping rows"),
            Err(e) => tracing::error!(error = %e, "mapping retention purge failed"),
        }

        match self.stager.purge_older_than(cutoff).await {
            Ok(count) => tracing::info!(count, "purged stale media files"),
            Err(e) => tracing::error!(error = %e, "media retention purge failed"),
        }
    }
}

/// Periodic scan for mappings stuck `Pending`/`Sent` past a staleness
/// threshold, surfaced as a warning log rather than an automatic retry —
/// there is no safe way to re-send without risking a duplicate (§4.L).
pub struct DeliveryMonitor {
    store: Arc<dyn MappingStore>,
    interval: std::time::Duration,
    stale_threshold_min: i64,
    cancel: CancellationToken,
}

impl DeliveryMonitor {
    pub fn new(store: Arc<dyn MappingStore>, config: &BridgeConfig, cancel: CancellationToken) -> Self {
        Self {
            store,
            interval: config.delivery_monitor_interval(),
            stale_threshold_min: config.stale_threshold_min,
            cancel,
        }
    }

    pub async fn run(&self) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.check_once().await,
                _ = self.cancel.cancelled() => return,
            }
        }
    }

    async fn check_once(&self) {
        let threshold = chrono::Duration::minutes(self.stale_threshold_min.max(0));
        match self.store.list_stale_pending(threshold).await {
            Ok(stale) if stale.is_empty() => {}
            Ok(stale) => {
                for mapping in &stale {
                    tracing::warn!(
                        session = %mapping.session_name,
                        whatsapp_msg_id = %mapping.whatsapp_msg_id,
                        status = ?mapping.delivery_status,
                        "delivery stuck past staleness threshold"
                    );
                }
            }
            Err(e) => tracing::error!(error = %e, "stale delivery scan failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use whatsignal_common::{DeliveryStatus, MessageMapping};

    async fn store_with_old_mapping() -> Arc<dyn MappingStore> {
        let store: Arc<dyn MappingStore> = Arc::new(whatsignal_store::SqliteMappingStore::open_in_memory().await);
        let old = Utc::now() - chrono::Duration::days(30);
        store
            .save(MessageMapping {
                session_name: "personal".to_string(),
                chat_id_hash: "chat-hash".to_string(),
                whatsapp_msg_id_hash: "wa-hash".to_string(),
                signal_msg_id_hash: "sig-hash".to_string(),
                whatsapp_chat_id: "15550200@c.us".to_string(),
                whatsapp_msg_id: "wamid.1".to_string(),
                signal_msg_id: "1000".to_string(),
                signal_timestamp: 1000,
                forwarded_at: old,
                delivery_status: DeliveryStatus::Pending,
                media: None,
                created_at: old,
                updated_at: old,
            })
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn scheduler_sweep_purges_aged_mapping() {
        let store = store_with_old_mapping().await;
        let hasher = Arc::new(whatsignal_common::IdentifierHasher::new("test-secret"));
        let stager = Arc::new(MediaStager::new(reqwest::Client::new(), BridgeConfig::default(), hasher));
        let config = BridgeConfig { retention_days: 7, ..BridgeConfig::default() };
        let scheduler = Scheduler::new(store.clone(), stager, &config, CancellationToken::new());

        scheduler.sweep_once().await;

        assert!(store.get_by_whatsapp_id("personal", "wamid.1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delivery_monitor_finds_stale_pending_without_erroring() {
        let store = store_with_old_mapping().await;
        let config = BridgeConfig { stale_threshold_min: 5, ..BridgeConfig::default() };
        let monitor = DeliveryMonitor::new(store.clone(), &config, CancellationToken::new());

        monitor.check_once().await;

        let stale = store.list_stale_pending(chrono::Duration::minutes(5)).await.unwrap();
        assert_eq!(stale.len(), 1);
    }
}
