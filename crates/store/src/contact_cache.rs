use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use whatsignal_common::{BridgeError, ContactCache, MappingStore, WhatsAppGateway};

/// Contact/Group Cache (§4.E) built on top of a `MappingStore` and a
/// `WhatsAppGateway`. Bulk syncs upsert one row per profile and continue
/// past individual failures so one bad contact does not abort the batch.
pub struct SqliteContactCache {
    store: Arc<dyn MappingStore>,
    gateway: Arc<dyn WhatsAppGateway>,
    cache_hours: i64,
}

impl SqliteContactCache {
    pub fn new(store: Arc<dyn MappingStore>, gateway: Arc<dyn WhatsAppGateway>, cache_hours: i64) -> Self {
        Self { store, gateway, cache_hours }
    }
}

#[async_trait]
impl ContactCache for SqliteContactCache {
    async fn resolve_display_name(&self, session: &str, id: &str, is_group: bool) -> String {
        match self.store.get_contact(session, id, is_group).await {
            Ok(Some(profile)) => profile.display_name(self.cache_hours, Utc::now()),
            _ => id.to_string(),
        }
    }

    async fn sync_all_contacts(&self, session: &str) -> Result<usize, BridgeError> {
        let contacts = self.gateway.list_contacts(session).await?;
        let mut synced = 0;
        for contact in contacts {
            match self.store.save_contact(contact.clone(), false).await {
                Ok(()) => synced += 1,
                Err(e) => tracing::warn!(gateway_id = %contact.gateway_id, error = %e, "failed to sync contact"),
            }
        }
        Ok(synced)
    }

    async fn sync_all_groups(&self, session: &str) -> Result<usize, BridgeError> {
        let groups = self.gateway.list_groups(session).await?;
        let mut synced = 0;
        for group in groups {
            match self.store.save_contact(group.clone(), true).await {
                Ok(()) => synced += 1,
                Err(e) => tracing::warn!(gateway_id = %group.gateway_id, error = %e, "failed to sync group"),
            }
        }
        Ok(synced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite_store::SqliteMappingStore;
    use async_trait::async_trait;
    use whatsignal_common::{ContactProfile, SignalGateway, StagedMedia};

    struct FakeGateway {
        contacts: Vec<ContactProfile>,
    }

    #[async_trait]
    impl WhatsAppGateway for FakeGateway {
        async fn send_text(&self, _: &str, _: &str, _: &str, _: Option<&str>) -> Result<String, BridgeError> {
            unimplemented!()
        }
        async fn send_media(&self, _: &str, _: &str, _: &StagedMedia, _: Option<&str>, _: Option<&str>) -> Result<String, BridgeError> {
            unimplemented!()
        }
        async fn send_seen(&self, _: &str, _: &str, _: &str) {}
        async fn start_typing(&self, _: &str, _: &str) {}
        async fn stop_typing(&self, _: &str, _: &str) {}
        async fn send_reaction(&self, _: &str, _: &str, _: &str) -> Result<(), BridgeError> {
            unimplemented!()
        }
        async fn delete_message(&self, _: &str, _: &str, _: &str) -> Result<(), BridgeError> {
            unimplemented!()
        }
        async fn list_contacts(&self, _: &str) -> Result<Vec<ContactProfile>, BridgeError> {
            Ok(self.contacts.clone())
        }
        async fn list_groups(&self, _: &str) -> Result<Vec<ContactProfile>, BridgeError> {
            Ok(vec![])
        }
        async fn session_status(&self, _: &str) -> Result<String, BridgeError> {
            unimplemented!()
        }
        async fn restart_session(&self, _: &str) -> Result<(), BridgeError> {
            unimplemented!()
        }
    }

    #[allow(dead_code)]
    fn assert_signal_gateway_unused<T: SignalGateway>() {}

    #[tokio::test]
    async fn sync_all_contacts_upserts_each_profile() {
        let store: Arc<dyn MappingStore> = Arc::new(SqliteMappingStore::open_in_memory().await);
        let now = Utc::now();
        let gateway = Arc::new(FakeGateway {
            contacts: vec![ContactProfile {
                session_name: "personal".into(),
                gateway_id: "15550200".into(),
                name: Some("Alice".into()),
                push_name: None,
                short_name: None,
                is_group: false,
                is_my_contact: true,
                cached_at: now,
                updated_at: now,
            }],
        });

        let cache = SqliteContactCache::new(store.clone(), gateway, 24);
        let synced = cache.sync_all_contacts("personal").await.unwrap();
        assert_eq!(synced, 1);

        let name = cache.resolve_display_name("personal", "15550200", false).await;
        assert_eq!(name, "Alice");
    }

    #[tokio::test]
    async fn resolve_display_name_falls_back_to_id_when_uncached() {
        let store: Arc<dyn MappingStore> = Arc::new(SqliteMappingStore::open_in_memory().await);
        let gateway = Arc::new(FakeGateway { contacts: vec![] });
        let cache = SqliteContactCache::new(store, gateway, 24);

        let name = cache.resolve_display_name("personal", "unknown-id", false).await;
        assert_eq!(name, "unknown-id");
    }
}
