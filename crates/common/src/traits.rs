use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::BridgeError;
use crate::model::{ContactProfile, DeliveryStatus, MessageMapping};

/// A message received from the Signal gateway's `receive(timeout)` call.
#[derive(Debug, Clone)]
pub struct SignalInboundMessage {
    pub sender: String,
    pub message: String,
    pub timestamp: i64,
    pub attachments: Vec<String>,
    pub quoted_timestamp: Option<i64>,
}

/// A piece of media staged for upload to the opposite gateway (§4.F).
#[derive(Debug, Clone)]
pub struct StagedMedia {
    pub local_path: String,
    pub mime_type: String,
    pub filename: String,
}

/// Everything the bridge needs from a WAHA-style WhatsApp gateway (§6).
/// Declared as an explicit capability set rather than a duck-typed mock so
/// tests can substitute a fake implementation (§9).
#[async_trait]
pub trait WhatsAppGateway: Send + Sync {
    async fn send_text(
        &self,
        session: &str,
        chat_id: &str,
        text: &str,
        reply_to: Option<&str>,
    ) -> Result<String, BridgeError>;

    async fn send_media(
        &self,
        session: &str,
        chat_id: &str,
        media: &StagedMedia,
        caption: Option<&str>,
        reply_to: Option<&str>,
    ) -> Result<String, BridgeError>;

    async fn send_seen(&self, session: &str, chat_id: &str, msg_id: &str);
    async fn start_typing(&self, session: &str, chat_id: &str);
    async fn stop_typing(&self, session: &str, chat_id: &str);

    async fn send_reaction(&self, session: &str, msg_id: &str, reaction: &str) -> Result<(), BridgeError>;
    async fn delete_message(&self, session: &str, chat_id: &str, msg_id: &str) -> Result<(), BridgeError>;

    async fn list_contacts(&self, session: &str) -> Result<Vec<ContactProfile>, BridgeError>;
    async fn list_groups(&self, session: &str) -> Result<Vec<ContactProfile>, BridgeError>;

    async fn session_status(&self, session: &str) -> Result<String, BridgeError>;
    async fn restart_session(&self, session: &str) -> Result<(), BridgeError>;
}

/// Everything the bridge needs from the Signal RPC gateway (§6).
#[async_trait]
pub trait SignalGateway: Send + Sync {
    async fn send_text(
        &self,
        destination: &str,
        text: &str,
        reply_to_timestamp: Option<i64>,
    ) -> Result<i64, BridgeError>;

    async fn send_attachment(
        &self,
        destination: &str,
        media: &StagedMedia,
        caption: Option<&str>,
        reply_to_timestamp: Option<i64>,
    ) -> Result<i64, BridgeError>;

    async fn receive(&self, timeout_secs: u64) -> Result<Vec<SignalInboundMessage>, BridgeError>;
}

/// The durable Mapping Store contract (§4.D). `is_group` distinguishes the
/// `contacts` and `groups` tables, which share a row shape.
#[async_trait]
pub trait MappingStore: Send + Sync {
    async fn save(&self, mapping: MessageMapping) -> Result<(), BridgeError>;

    async fn get_by_whatsapp_id(
        &self,
        session: &str,
        whatsapp_msg_id: &str,
    ) -> Result<Option<MessageMapping>, BridgeError>;

    async fn get_by_signal_id(
        &self,
        session: &str,
        signal_msg_id: &str,
    ) -> Result<Option<MessageMapping>, BridgeError>;

    async fn update_delivery_status(
        &self,
        session: &str,
        whatsapp_msg_id: &str,
        status: DeliveryStatus,
    ) -> Result<(), BridgeError>;

    async fn list_stale_pending(&self, older_than: chrono::Duration) -> Result<Vec<MessageMapping>, BridgeError>;

    /// The `whatsapp_chat_id` of the most recently forwarded mapping for
    /// `session`, used to route a Signal-side message that carries no
    /// reply link back to a WhatsApp chat (§9 open question on default
    /// routing).
    async fn latest_chat_id_for_session(&self, session: &str) -> Result<Option<String>, BridgeError>;

    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, BridgeError>;

    async fn save_contact(&self, profile: ContactProfile, is_group: bool) -> Result<(), BridgeError>;

    async fn get_contact(
        &self,
        session: &str,
        gateway_id: &str,
        is_group: bool,
    ) -> Result<Option<ContactProfile>, BridgeError>;

    async fn list_stale_contacts(
        &self,
        session: &str,
        ttl: chrono::Duration,
        is_group: bool,
    ) -> Result<Vec<ContactProfile>, BridgeError>;
}

/// Display-name resolution and bulk sync over the Mapping Store's
/// contact/group tables (§4.E).
#[async_trait]
pub trait ContactCache: Send + Sync {
    async fn resolve_display_name(&self, session: &str, id: &str, is_group: bool) -> String;
    async fn sync_all_contacts(&self, session: &str) -> Result<usize, BridgeError>;
    async fn sync_all_groups(&self, session: &str) -> Result<usize, BridgeError>;
}
