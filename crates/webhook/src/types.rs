use serde::Deserialize;

/// WAHA-style webhook envelope (§4.H, §6). `event` names the kind of
/// update; `payload` is interpreted differently depending on it. This
/// models only the fields the bridge relies on, not the full gateway
/// schema.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub event: String,
    pub session: String,
    pub payload: EventPayload,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventPayload {
    pub id: Option<String>,
    pub from: Option<String>,
    #[serde(default, rename = "fromMe")]
    pub from_me: bool,
    #[serde(default)]
    pub body: String,
    #[serde(default, rename = "hasMedia")]
    pub has_media: bool,
    pub media: Option<MediaRef>,
    pub reaction: Option<ReactionRef>,
    #[serde(rename = "editedMessageId")]
    pub edited_message_id: Option<String>,
    pub ack: Option<String>,
    #[serde(rename = "replyTo")]
    pub reply_to: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MediaRef {
    pub url: String,
    #[serde(rename = "mimetype")]
    pub mime_type: Option<String>,
    pub filename: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReactionRef {
    pub text: Option<String>,
    #[serde(rename = "messageId")]
    pub message_id: Option<String>,
}
