use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A pairing of one WhatsApp session and one Signal destination number,
/// configured at startup and immutable for the lifetime of the process.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChannelConfig {
    pub whatsapp_session_name: String,
    pub signal_destination_number: String,
}

/// Delivery status of a forwarded message, mirrored from the opposite
/// gateway's acknowledgement codes.
///
/// Transitions only move forward along pending -> sent -> delivered -> read;
/// `failed` absorbs from any state and is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Sent,
    Delivered,
    Read,
    Failed,
}

impl DeliveryStatus {
    fn rank(self) -> u8 {
        match self {
            DeliveryStatus::Pending => 0,
            DeliveryStatus::Sent => 1,
            DeliveryStatus::Delivered => 2,
            DeliveryStatus::Read => 3,
            DeliveryStatus::Failed => 4,
        }
    }

    /// True if moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(self, next: DeliveryStatus) -> bool {
        if self == DeliveryStatus::Failed {
            return false;
        }
        if next == DeliveryStatus::Failed {
            return true;
        }
        next.rank() > self.rank()
    }
}

/// Optional media attached to a forwarded message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaRef {
    pub path: String,
    pub media_type: String,
}

/// The durable correspondence between a WhatsApp-side message and its
/// Signal-side counterpart, keyed by `(session_name, whatsapp_msg_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageMapping {
    pub session_name: String,
    pub whatsapp_chat_id: String,
    pub whatsapp_msg_id: String,
    pub signal_msg_id: String,
    pub signal_timestamp: i64,
    pub forwarded_at: DateTime<Utc>,
    pub delivery_status: DeliveryStatus,
    pub media: Option<MediaRef>,
    pub chat_id_hash: String,
    pub whatsapp_msg_id_hash: String,
    pub signal_msg_id_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A cached contact or group profile, keyed by gateway id within a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactProfile {
    pub session_name: String,
    pub gateway_id: String,
    pub name: Option<String>,
    pub push_name: Option<String>,
    pub short_name: Option<String>,
    pub is_group: bool,
    pub is_my_contact: bool,
    pub cached_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ContactProfile {
    pub fn is_fresh(&self, cache_hours: i64, now: DateTime<Utc>) -> bool {
        self.cached_at + chrono::Duration::hours(cache_hours) > now
    }

    /// Resolve a display name in the order: `name`, `push_name`,
    /// `short_name`, falling back to the raw gateway id.
    pub fn display_name(&self, cache_hours: i64, now: DateTime<Utc>) -> String {
        if !self.is_fresh(cache_hours, now) {
            return self.gateway_id.clone();
        }
        self.name
            .clone()
            .or_else(|| self.push_name.clone())
            .or_else(|| self.short_name.clone())
            .unwrap_or_else(|| self.gateway_id.clone())
    }
}

/// Health state of a WhatsApp session as observed by the Session Monitor.
/// Held only in memory, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Unknown,
    Starting,
    Working,
    Failed,
}

impl SessionState {
    pub fn from_gateway_status(status: &str) -> Self {
        match status {
            "WORKING" => SessionState::Working,
            "STARTING" | "SCAN_QR_CODE" => SessionState::Starting,
            "FAILED" | "STOPPED" => SessionState::Failed,
            _ => SessionState::Unknown,
        }
    }

    pub fn is_healthy(self) -> bool {
        matches!(self, SessionState::Working)
    }
}

/// The direction a message is travelling across the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    WhatsAppToSignal,
    SignalToWhatsApp,
}
