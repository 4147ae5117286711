use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tokio_util::sync::CancellationToken;
use whatsignal_common::{
    BridgeError, ContactProfile, DeliveryStatus, MappingStore, MessageMapping, Retry, RetryPolicy,
};

use crate::errors::StoreError;

const MIGRATION_SQL: &str = include_str!("../migrations/001_initial_schema.sql");

fn status_to_str(status: DeliveryStatus) -> &'static str {
    match status {
        DeliveryStatus::Pending => "pending",
        DeliveryStatus::Sent => "sent",
        DeliveryStatus::Delivered => "delivered",
        DeliveryStatus::Read => "read",
        DeliveryStatus::Failed => "failed",
    }
}

fn status_from_str(raw: &str) -> DeliveryStatus {
    match raw {
        "sent" => DeliveryStatus::Sent,
        "delivered" => DeliveryStatus::Delivered,
        "read" => DeliveryStatus::Read,
        "failed" => DeliveryStatus::Failed,
        _ => DeliveryStatus::Pending,
    }
}

/// SQLite-backed Mapping Store (§4.D), with schema migrations applied via
/// `include_str!` the way the reference state database does.
pub struct SqliteMappingStore {
    pool: SqlitePool,
}

impl SqliteMappingStore {
    /// Open (or create) the database at `path` and apply migrations.
    /// Wrapped in a bounded retry loop because the store's backing volume
    /// may not be mounted yet when the process starts (§4.D).
    pub async fn open(path: &Path, cancel: &CancellationToken) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Database(sqlx::Error::Io(e))
                })?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .pragma("foreign_keys", "ON");

        let policy = RetryPolicy {
            max_attempts: 5,
            ..RetryPolicy::default()
        };

        let pool: SqlitePool = Retry::run(&policy, cancel, || {
            let options = options.clone();
            async move {
                SqlitePoolOptions::new()
                    .max_connections(8)
                    .connect_with(options)
                    .await
                    .map_err(StoreError::Database)
                    .map_err(BridgeError::from)
            }
        })
        .await
        .map_err(|e| match e {
            BridgeError::Storage(msg) => StoreError::Database(sqlx::Error::Configuration(msg.into())),
            other => StoreError::Database(sqlx::Error::Configuration(other.to_string().into())),
        })?;

        sqlx::raw_sql(MIGRATION_SQL).execute(&pool).await?;

        Ok(Self { pool })
    }

    /// Opens an in-memory database for tests. Not gated behind
    /// `#[cfg(test)]` since other crates' own test code needs to call it
    /// too, and that cfg only applies to a crate's own test build.
    pub async fn open_in_memory() -> Self {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("failed to open in-memory sqlite db");
        sqlx::raw_sql(MIGRATION_SQL).execute(&pool).await.expect("failed to migrate");
        Self { pool }
    }
}

impl From<BridgeError> for StoreError {
    fn from(err: BridgeError) -> Self {
        StoreError::Database(sqlx::Error::Configuration(err.to_string().into()))
    }
}

#[async_trait]
impl MappingStore for SqliteMappingStore {
    async fn save(&self, mapping: MessageMapping) -> Result<(), BridgeError> {
        let media_path = mapping.media.as_ref().map(|m| m.path.clone());
        let media_type = mapping.media.as_ref().map(|m| m.media_type.clone());

        let result = sqlx::query(
            r#"INSERT INTO message_mappings (
                session_name, whatsapp_chat_id, whatsapp_msg_id, signal_msg_id,
                signal_timestamp, forwarded_at, delivery_status, media_path, media_type,
                chat_id_hash, whatsapp_msg_id_hash, signal_msg_id_hash, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"#,
        )
        .bind(&mapping.session_name)
        .bind(&mapping.whatsapp_chat_id)
        .bind(&mapping.whatsapp_msg_id)
        .bind(&mapping.signal_msg_id)
        .bind(mapping.signal_timestamp)
        .bind(mapping.forwarded_at.to_rfc3339())
        .bind(status_to_str(mapping.delivery_status))
        .bind(media_path)
        .bind(media_type)
        .bind(&mapping.chat_id_hash)
        .bind(&mapping.whatsapp_msg_id_hash)
        .bind(&mapping.signal_msg_id_hash)
        .bind(mapping.created_at.to_rfc3339())
        .bind(mapping.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(StoreError::Conflict {
                    session: mapping.session_name,
                    whatsapp_msg_id: mapping.whatsapp_msg_id,
                }
                .into())
            }
            Err(e) => Err(StoreError::Database(e).into()),
        }
    }

    async fn get_by_whatsapp_id(
        &self,
        session: &str,
        whatsapp_msg_id: &str,
    ) -> Result<Option<MessageMapping>, BridgeError> {
        let row = sqlx::query(
            "SELECT * FROM message_mappings WHERE session_name = ?1 AND whatsapp_msg_id = ?2",
        )
        .bind(session)
        .bind(whatsapp_msg_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::Database)?;

        Ok(row.map(row_to_mapping))
    }

    async fn get_by_signal_id(
        &self,
        session: &str,
        signal_msg_id: &str,
    ) -> Result<Option<MessageMapping>, BridgeError> {
        let row = sqlx::query(
            "SELECT * FROM message_mappings WHERE session_name = ?1 AND signal_msg_id = ?2",
        )
        .bind(session)
        .bind(signal_msg_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::Database)?;

        Ok(row.map(row_to_mapping))
    }

    async fn update_delivery_status(
        &self,
        session: &str,
        whatsapp_msg_id: &str,
        status: DeliveryStatus,
    ) -> Result<(), BridgeError> {
        let current = self.get_by_whatsapp_id(session, whatsapp_msg_id).await?;
        let current = current.ok_or_else(|| {
            StoreError::NotFound { session: session.to_string(), id: whatsapp_msg_id.to_string() }
        })?;

        if !current.delivery_status.can_transition_to(status) {
            if current.delivery_status == status {
                return Ok(());
            }
            return Err(StoreError::IllegalTransition {
                from: format!("{:?}", current.delivery_status),
                to: format!("{status:?}"),
            }
            .into());
        }

        sqlx::query(
            "UPDATE message_mappings SET delivery_status = ?1, updated_at = ?2
             WHERE session_name = ?3 AND whatsapp_msg_id = ?4",
        )
        .bind(status_to_str(status))
        .bind(Utc::now().to_rfc3339())
        .bind(session)
        .bind(whatsapp_msg_id)
        .execute(&self.pool)
        .await
        .map_err(StoreError::Database)?;

        Ok(())
    }

    async fn list_stale_pending(&self, older_than: chrono::Duration) -> Result<Vec<MessageMapping>, BridgeError> {
        let cutoff = (Utc::now() - older_than).to_rfc3339();
        let rows = sqlx::query(
            "SELECT * FROM message_mappings WHERE delivery_status = 'pending' AND forwarded_at < ?1",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::Database)?;

        Ok(rows.into_iter().map(row_to_mapping).collect())
    }

    async fn latest_chat_id_for_session(&self, session: &str) -> Result<Option<String>, BridgeError> {
        let row = sqlx::query(
            "SELECT whatsapp_chat_id FROM message_mappings WHERE session_name = ?1
             ORDER BY forwarded_at DESC LIMIT 1",
        )
        .bind(session)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::Database)?;

        Ok(row.map(|r| r.get("whatsapp_chat_id")))
    }

    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, BridgeError> {
        let result = sqlx::query("DELETE FROM message_mappings WHERE forwarded_at < ?1")
            .bind(cutoff.to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(StoreError::Database)?;

        Ok(result.rows_affected())
    }

    async fn save_contact(&self, profile: ContactProfile, is_group: bool) -> Result<(), BridgeError> {
        sqlx::query(
            r#"INSERT INTO contacts (
                session_name, gateway_id, is_group, name, push_name, short_name,
                is_my_contact, cached_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(session_name, gateway_id, is_group) DO UPDATE SET
                name = excluded.name,
                push_name = excluded.push_name,
                short_name = excluded.short_name,
                is_my_contact = excluded.is_my_contact,
                cached_at = excluded.cached_at,
                updated_at = excluded.updated_at"#,
        )
        .bind(&profile.session_name)
        .bind(&profile.gateway_id)
        .bind(is_group)
        .bind(&profile.name)
        .bind(&profile.push_name)
        .bind(&profile.short_name)
        .bind(profile.is_my_contact)
        .bind(profile.cached_at.to_rfc3339())
        .bind(profile.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(StoreError::Database)?;

        Ok(())
    }

    async fn get_contact(
        &self,
        session: &str,
        gateway_id: &str,
        is_group: bool,
    ) -> Result<Option<ContactProfile>, BridgeError> {
        let row = sqlx::query(
            "SELECT * FROM contacts WHERE session_name = ?1 AND gateway_id = ?2 AND is_group = ?3",
        )
        .bind(session)
        .bind(gateway_id)
        .bind(is_group)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::Database)?;

        Ok(row.map(row_to_contact))
    }

    async fn list_stale_contacts(
        &self,
        session: &str,
        ttl: chrono::Duration,
        is_group: bool,
    ) -> Result<Vec<ContactProfile>, BridgeError> {
        let cutoff = (Utc::now() - ttl).to_rfc3339();
        let rows = sqlx::query(
            "SELECT * FROM contacts WHERE session_name = ?1 AND is_group = ?2 AND cached_at < ?3",
        )
        .bind(session)
        .bind(is_group)
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::Database)?;

        Ok(rows.into_iter().map(row_to_contact).collect())
    }
}

fn row_to_mapping(row: sqlx::sqlite::SqliteRow) -> MessageMapping {
    let media_path: Option<String> = row.get("media_path");
    let media_type: Option<String> = row.get("media_type");
    let media = media_path.map(|path| whatsignal_common::MediaRef {
        path,
        media_type: media_type.unwrap_or_default(),
    });

    let forwarded_at: String = row.get("forwarded_at");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");
    let status: String = row.get("delivery_status");

    MessageMapping {
        session_name: row.get("session_name"),
        whatsapp_chat_id: row.get("whatsapp_chat_id"),
        whatsapp_msg_id: row.get("whatsapp_msg_id"),
        signal_msg_id: row.get("signal_msg_id"),
        signal_timestamp: row.get("signal_timestamp"),
        forwarded_at: DateTime::parse_from_rfc3339(&forwarded_at).unwrap().with_timezone(&Utc),
        delivery_status: status_from_str(&status),
        media,
        chat_id_hash: row.get("chat_id_hash"),
        whatsapp_msg_id_hash: row.get("whatsapp_msg_id_hash"),
        signal_msg_id_hash: row.get("signal_msg_id_hash"),
        created_at: DateTime::parse_from_rfc3339(&created_at).unwrap().with_timezone(&Utc),
        updated_at: DateTime::parse_from_rfc3339(&updated_at).unwrap().with_timezone(&Utc),
    }
}

fn row_to_contact(row: sqlx::sqlite::SqliteRow) -> ContactProfile {
    let cached_at: String = row.get("cached_at");
    let updated_at: String = row.get("updated_at");

    ContactProfile {
        session_name: row.get("session_name"),
        gateway_id: row.get("gateway_id"),
        name: row.get("name"),
        push_name: row.get("push_name"),
        short_name: row.get("short_name"),
        is_group: row.get("is_group"),
        is_my_contact: row.get("is_my_contact"),
        cached_at: DateTime::parse_from_rfc3339(&cached_at).unwrap().with_timezone(&Utc),
        updated_at: DateTime::parse_from_rfc3339(&updated_at).unwrap().with_timezone(&Utc),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use whatsignal_common::IdentifierHasher;

    fn sample_mapping(session: &str, wa_id: &str) -> MessageMapping {
        let hasher = IdentifierHasher::new("test-secret");
        let now = Utc::now();
        MessageMapping {
            session_name: session.to_string(),
            whatsapp_chat_id: "15550200@c.us".to_string(),
            whatsapp_msg_id: wa_id.to_string(),
            signal_msg_id: "1700000000000".to_string(),
            signal_timestamp: 1_700_000_000_000,
            forwarded_at: now,
            delivery_status: DeliveryStatus::Pending,
            media: None,
            chat_id_hash: hasher.hash_hex("15550200@c.us"),
            whatsapp_msg_id_hash: hasher.hash_hex(wa_id),
            signal_msg_id_hash: hasher.hash_hex("1700000000000"),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn save_and_lookup_round_trips() {
        let store = SqliteMappingStore::open_in_memory().await;
        store.save(sample_mapping("personal", "wa-1")).await.unwrap();

        let by_wa = store.get_by_whatsapp_id("personal", "wa-1").await.unwrap();
        assert!(by_wa.is_some());

        let by_signal = store.get_by_signal_id("personal", "1700000000000").await.unwrap();
        assert!(by_signal.is_some());
    }

    #[tokio::test]
    async fn duplicate_save_is_a_conflict() {
        let store = SqliteMappingStore::open_in_memory().await;
        store.save(sample_mapping("personal", "wa-1")).await.unwrap();
        let result = store.save(sample_mapping("personal", "wa-1")).await;
        assert!(matches!(result, Err(BridgeError::StorageConflict(_))));
    }

    #[tokio::test]
    async fn delivery_status_progresses_monotonically() {
        let store = SqliteMappingStore::open_in_memory().await;
        store.save(sample_mapping("personal", "wa-1")).await.unwrap();

        store.update_delivery_status("personal", "wa-1", DeliveryStatus::Sent).await.unwrap();
        store.update_delivery_status("personal", "wa-1", DeliveryStatus::Delivered).await.unwrap();
        store.update_delivery_status("personal", "wa-1", DeliveryStatus::Read).await.unwrap();

        let mapping = store.get_by_whatsapp_id("personal", "wa-1").await.unwrap().unwrap();
        assert_eq!(mapping.delivery_status, DeliveryStatus::Read);
    }

    #[tokio::test]
    async fn illegal_transition_is_rejected() {
        let store = SqliteMappingStore::open_in_memory().await;
        store.save(sample_mapping("personal", "wa-1")).await.unwrap();
        store.update_delivery_status("personal", "wa-1", DeliveryStatus::Delivered).await.unwrap();

        let result = store.update_delivery_status("personal", "wa-1", DeliveryStatus::Sent).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn purge_older_than_is_idempotent() {
        let store = SqliteMappingStore::open_in_memory().await;
        store.save(sample_mapping("personal", "wa-1")).await.unwrap();

        let cutoff = Utc::now() + chrono::Duration::seconds(1);
        let purged_first = store.purge_older_than(cutoff).await.unwrap();
        assert_eq!(purged_first, 1);

        let purged_second = store.purge_older_than(cutoff).await.unwrap();
        assert_eq!(purged_second, 0);
    }

    #[tokio::test]
    async fn stale_pending_lists_only_old_pending_mappings() {
        let store = SqliteMappingStore::open_in_memory().await;
        store.save(sample_mapping("personal", "wa-1")).await.unwrap();
        store.update_delivery_status("personal", "wa-1", DeliveryStatus::Sent).await.unwrap();

        let stale = store.list_stale_pending(chrono::Duration::seconds(-5)).await.unwrap();
        assert!(stale.is_empty());
    }

    #[tokio::test]
    async fn latest_chat_id_for_session_returns_most_recent() {
        let store = SqliteMappingStore::open_in_memory().await;
        store.save(sample_mapping("personal", "wa-1")).await.unwrap();

        let latest = store.latest_chat_id_for_session("personal").await.unwrap();
        assert_eq!(latest.as_deref(), Some("15550200@c.us"));

        let none = store.latest_chat_id_for_session("other").await.unwrap();
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn contact_upsert_and_lookup() {
        let store = SqliteMappingStore::open_in_memory().await;
        let now = Utc::now();
        let contact = ContactProfile {
            session_name: "personal".into(),
            gateway_id: "15550200".into(),
            name: Some("Alice".into()),
            push_name: None,
            short_name: None,
            is_group: false,
            is_my_contact: true,
            cached_at: now,
            updated_at: now,
        };
        store.save_contact(contact.clone(), false).await.unwrap();

        let fetched = store.get_contact("personal", "15550200", false).await.unwrap().unwrap();
        assert_eq!(fetched.name.as_deref(), Some("Alice"));
    }
}
