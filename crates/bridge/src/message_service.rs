use std::sync::Arc;

use whatsignal_common::{BridgeError, Direction, SignalInboundMessage};

use crate::forwarder::{ForwardInput, Forwarder, SourceMedia};

/// A plain-text or media message observed on the WhatsApp side, already
/// flattened out of whatever webhook event shape carried it (§4.J/§4.H).
#[derive(Debug, Clone)]
pub struct IncomingWhatsAppMessage {
    pub session: String,
    pub chat_id: String,
    pub msg_id: String,
    pub sender: String,
    pub body: String,
    pub media: Option<SourceMedia>,
    pub reply_to: Option<String>,
    pub from_me: bool,
}

#[derive(Debug, Clone)]
pub struct IncomingWhatsAppReaction {
    pub session: String,
    pub msg_id: String,
    pub reactor: String,
    pub text: Option<String>,
}

#[derive(Debug, Clone)]
pub struct IncomingWhatsAppEdit {
    pub session: String,
    pub msg_id: String,
    pub new_body: String,
}

#[derive(Debug, Clone)]
pub struct IncomingWhatsAppAck {
    pub session: String,
    pub msg_id: String,
    pub ack: String,
}

#[derive(Debug, Clone)]
pub struct IncomingWhatsAppDelete {
    pub session: String,
    pub msg_id: String,
}

/// Entry point for both the WhatsApp webhook and the Signal poller
/// (§4.H). Validates at the trust boundary — dropping self-originated,
/// broadcast, and unaddressable messages before they ever reach the
/// forwarder — then dispatches by event kind.
pub struct MessageService {
    forwarder: Arc<Forwarder>,
}

impl MessageService {
    pub fn new(forwarder: Arc<Forwarder>) -> Self {
        Self { forwarder }
    }

    /// `None` means forwardable; `Some(reason)` carries why not, for the
    /// caller's debug log.
    fn undeliverable_chat_id_reason(chat_id: &str) -> Option<&'static str> {
        if chat_id.ends_with("@broadcast") || chat_id == "status@broadcast" {
            return Some("status/broadcast updates are not forwarded");
        }
        if !chat_id.contains('@') {
            return Some("chat id is missing a gateway suffix");
        }
        None
    }

    /// Handles one WhatsApp message event. Self-originated messages,
    /// broadcast/status chats, unconfigured sessions, and empty bodies are
    /// all dropped silently (not an error) rather than rejected, since
    /// they are expected noise from the gateway rather than malformed
    /// requests.
    pub async fn handle_whatsapp_message(&self, msg: IncomingWhatsAppMessage) -> Result<(), BridgeError> {
        if msg.from_me {
            tracing::debug!(session = %msg.session, "dropped self-originated message");
            return Ok(());
        }
        if !self.forwarder.channel_exists(Direction::WhatsAppToSignal, &msg.session) {
            tracing::debug!(session = %msg.session, "dropped message from an unconfigured session");
            return Ok(());
        }
        if let Some(reason) = Self::undeliverable_chat_id_reason(&msg.chat_id) {
            tracing::debug!(session = %msg.session, chat_id = %msg.chat_id, reason, "dropped undeliverable message");
            return Ok(());
        }
        if msg.body.is_empty() && msg.media.is_none() {
            tracing::debug!(session = %msg.session, "dropped message with neither text nor media");
            return Ok(());
        }

        let input = ForwardInput {
            session_name: msg.session,
            source_chat_id: msg.chat_id,
            source_msg_id: msg.msg_id,
            sender: msg.sender,
            body: msg.body,
            media: msg.media,
            reply_to_source_msg_id: msg.reply_to,
        };
        self.forwarder.forward_message(Direction::WhatsAppToSignal, input).await
    }

    pub async fn handle_whatsapp_reaction(&self, reaction: IncomingWhatsAppReaction) -> Result<(), BridgeError> {
        self.forwarder
            .forward_reaction(
                Direction::WhatsAppToSignal,
                &reaction.session,
                &reaction.msg_id,
                &reaction.reactor,
                reaction.text.as_deref(),
            )
            .await
    }

    pub async fn handle_whatsapp_edit(&self, edit: IncomingWhatsAppEdit) -> Result<(), BridgeError> {
        self.forwarder.forward_edit(Direction::WhatsAppToSignal, &edit.session, &edit.msg_id, &edit.new_body).await
    }

    pub async fn handle_whatsapp_ack(&self, ack: IncomingWhatsAppAck) -> Result<(), BridgeError> {
        self.forwarder.apply_whatsapp_ack(&ack.session, &ack.msg_id, &ack.ack).await
    }

    pub async fn handle_whatsapp_delete(&self, delete: IncomingWhatsAppDelete) -> Result<(), BridgeError> {
        self.forwarder.forward_delete(Direction::WhatsAppToSignal, &delete.session, &delete.msg_id).await
    }

    /// Handles one message surfaced by the Signal poller for `destination`.
    /// A Signal message's own `timestamp` doubles as its id (§6); a
    /// `quoted_timestamp` becomes the reply link the forwarder resolves
    /// back to a WhatsApp message.
    pub async fn process_signal_message(&self, destination: &str, msg: SignalInboundMessage) -> Result<(), BridgeError> {
        if msg.message.is_empty() && msg.attachments.is_empty() {
            tracing::debug!(destination = %destination, "dropped signal message with no text or attachments");
            return Ok(());
        }
        if !self.forwarder.channel_exists(Direction::SignalToWhatsApp, destination) {
            tracing::debug!(destination = %destination, "dropped message from an unconfigured destination");
            return Ok(());
        }

        let media = msg.attachments.first().map(|url| SourceMedia { url: url.clone(), mime_type: None, filename: None });

        let input = ForwardInput {
            session_name: destination.to_string(),
            source_chat_id: msg.sender.clone(),
            source_msg_id: msg.timestamp.to_string(),
            sender: msg.sender,
            body: msg.message,
            media,
            reply_to_source_msg_id: msg.quoted_timestamp.map(|t| t.to_string()),
        };

        self.forwarder.forward_message(Direction::SignalToWhatsApp, input).await
    }
}
