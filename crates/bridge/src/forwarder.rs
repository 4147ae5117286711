use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use whatsignal_common::{
    BridgeError, Channel, ChannelManager, ContactCache, Direction, IdentifierHasher, MappingStore,
    MediaRef, MessageMapping, DeliveryStatus, Retry, RetryPolicy, SignalGateway, StagedMedia,
    WhatsAppGateway,
};

use crate::config::BridgeConfig;
use crate::media_stager::MediaStager;

/// Everything the forwarder needs to relay one inbound message, reaction,
/// edit, or delete, regardless of which side it originated on.
#[derive(Debug, Clone)]
pub struct ForwardInput {
    pub session_name: String,
    pub source_chat_id: String,
    pub source_msg_id: String,
    pub sender: String,
    pub body: String,
    pub media: Option<SourceMedia>,
    pub reply_to_source_msg_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SourceMedia {
    pub url: String,
    pub mime_type: Option<String>,
    pub filename: Option<String>,
}

const TYPING_MS_PER_CHAR: u64 = 50;
const TYPING_MAX_MS: u64 = 3_000;

/// Per-direction forward: resolve route, stage media, resolve reply-link,
/// send with retry, record the new mapping (§4.G).
pub struct Forwarder {
    channels: Arc<ChannelManager>,
    store: Arc<dyn MappingStore>,
    whatsapp: Arc<dyn WhatsAppGateway>,
    signal: Arc<dyn SignalGateway>,
    contacts: Arc<dyn ContactCache>,
    stager: Arc<MediaStager>,
    hasher: Arc<IdentifierHasher>,
    retry_policy: RetryPolicy,
    cancel: CancellationToken,
    test_mode: bool,
}

impl Forwarder {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        channels: Arc<ChannelManager>,
        store: Arc<dyn MappingStore>,
        whatsapp: Arc<dyn WhatsAppGateway>,
        signal: Arc<dyn SignalGateway>,
        contacts: Arc<dyn ContactCache>,
        stager: Arc<MediaStager>,
        hasher: Arc<IdentifierHasher>,
        config: &BridgeConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            channels,
            store,
            whatsapp,
            signal,
            contacts,
            stager,
            hasher,
            retry_policy: RetryPolicy::default(),
            cancel,
            test_mode: config.test_mode,
        }
    }

    /// `input.session_name` holds a WhatsApp session name when forwarding
    /// that direction, or a Signal destination number when forwarding the
    /// other way; resolve it to the full pairing either way.
    fn channel_for(&self, direction: Direction, input: &ForwardInput) -> Result<Channel, BridgeError> {
        self.channel_for_name(direction, &input.session_name)
    }

    /// Whether `name` (a WhatsApp session name or Signal destination
    /// number, per `direction`) is in the configured channel set.
    pub fn channel_exists(&self, direction: Direction, name: &str) -> bool {
        self.channel_for_name(direction, name).is_ok()
    }

    fn channel_for_name(&self, direction: Direction, name: &str) -> Result<Channel, BridgeError> {
        match direction {
            Direction::WhatsAppToSignal => self
                .channels
                .destination_for_session(name)
                .map(|dest| Channel {
                    whatsapp_session_name: name.to_string(),
                    signal_destination_number: dest.to_string(),
                })
                .ok_or_else(|| BridgeError::UnknownChannel(name.to_string())),
            Direction::SignalToWhatsApp => self
                .channels
                .session_for_destination(name)
                .map(|session| Channel {
                    whatsapp_session_name: session.to_string(),
                    signal_destination_number: name.to_string(),
                })
                .ok_or_else(|| BridgeError::UnknownChannel(name.to_string())),
        }
    }

    /// Resolves `name` against either routing direction, trying whichever
    /// interpretation (WhatsApp session vs Signal destination) matches —
    /// used by reaction/edit/delete forwarding where the caller only
    /// knows the originating side's own identifier.
    fn channel_for_either(&self, name: &str) -> Result<Channel, BridgeError> {
        self.channel_for_name(Direction::WhatsAppToSignal, name)
            .or_else(|_| self.channel_for_name(Direction::SignalToWhatsApp, name))
    }

    /// The WhatsApp chat id this forward should land in. For a reply,
    /// resolved from the referenced mapping; otherwise falls back to the
    /// most recently forwarded chat for the channel's WhatsApp session.
    async fn resolve_whatsapp_chat_id(
        &self,
        whatsapp_session: &str,
        reply_mapping: &Option<MessageMapping>,
    ) -> Result<String, BridgeError> {
        if let Some(mapping) = reply_mapping {
            return Ok(mapping.whatsapp_chat_id.clone());
        }
        self.store
            .latest_chat_id_for_session(whatsapp_session)
            .await?
            .ok_or_else(|| BridgeError::validation("no_known_chat", "no prior WhatsApp chat known for this session"))
    }

    async fn resolve_reply(
        &self,
        whatsapp_session: &str,
        reply_to: &Option<String>,
    ) -> Option<MessageMapping> {
        let reply_to = reply_to.as_ref()?;
        match self.store.get_by_whatsapp_id(whatsapp_session, reply_to).await {
            Ok(Some(mapping)) => Some(mapping),
            Ok(None) => match self.store.get_by_signal_id(whatsapp_session, reply_to).await {
                Ok(found) => found,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to resolve reply-to mapping");
                    None
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "failed to resolve reply-to mapping");
                None
            }
        }
    }

    /// Relays one inbound message (text and/or media) across the bridge.
    pub async fn forward_message(&self, direction: Direction, input: ForwardInput) -> Result<(), BridgeError> {
        if let Some(existing) = self.already_forwarded(direction, &input).await? {
            tracing::debug!(msg_id = %input.source_msg_id, status = ?existing.delivery_status, "duplicate forward short-circuited");
            return Ok(());
        }

        let channel = self.channel_for(direction, &input)?;
        let whatsapp_session = channel.whatsapp_session_name.clone();

        let reply_mapping = self.resolve_reply(&whatsapp_session, &input.reply_to_source_msg_id).await;
        if input.reply_to_source_msg_id.is_some() && reply_mapping.is_none() {
            tracing::warn!(msg_id = %input.source_msg_id, "reply-to source not found, forwarding without reply link");
        }

        let span = tracing::info_span!(
            "forward",
            session_hash = %self.hasher.hash_hex(&input.session_name),
            msg_hash = %self.hasher.hash_hex(&input.source_msg_id),
        );

        let staged = self.stage_media(&whatsapp_session, &input.media).instrument(span.clone()).await;

        let result = match direction {
            Direction::WhatsAppToSignal => {
                self.send_to_signal(&channel, &input, &reply_mapping, staged.as_ref()).instrument(span.clone()).await
            }
            Direction::SignalToWhatsApp => {
                self.send_to_whatsapp(&channel, &input, &reply_mapping, staged.as_ref()).instrument(span.clone()).await
            }
        };

        match result {
            Ok((signal_msg_id, signal_timestamp, whatsapp_chat_id, whatsapp_msg_id)) => {
                self.record_mapping(
                    &whatsapp_session,
                    whatsapp_chat_id,
                    whatsapp_msg_id,
                    signal_msg_id,
                    signal_timestamp,
                    staged,
                    DeliveryStatus::Sent,
                )
                .await
            }
            Err(err) => {
                tracing::error!(error = %err, "forward failed after retries");
                Err(err)
            }
        }
    }

    async fn already_forwarded(
        &self,
        direction: Direction,
        input: &ForwardInput,
    ) -> Result<Option<MessageMapping>, BridgeError> {
        let channel = match self.channel_for(direction, input) {
            Ok(c) => c,
            Err(_) => return Ok(None),
        };
        match direction {
            Direction::WhatsAppToSignal => {
                self.store.get_by_whatsapp_id(&channel.whatsapp_session_name, &input.source_msg_id).await
            }
            Direction::SignalToWhatsApp => {
                self.store.get_by_signal_id(&channel.whatsapp_session_name, &input.source_msg_id).await
            }
        }
    }

    async fn stage_media(&self, session: &str, media: &Option<SourceMedia>) -> Option<Result<StagedMedia, BridgeError>> {
        let media = media.as_ref()?;
        Some(
            self.stager
                .stage(session, &media.url, media.mime_type.as_deref(), media.filename.as_deref())
                .await,
        )
    }

    async fn send_to_signal(
        &self,
        channel: &Channel,
        input: &ForwardInput,
        reply_mapping: &Option<MessageMapping>,
        staged: Option<&Result<StagedMedia, BridgeError>>,
    ) -> Result<(String, i64, String, String), BridgeError> {
        let reply_to_timestamp = reply_mapping.as_ref().map(|m| m.signal_timestamp);
        let destination = &channel.signal_destination_number;

        let timestamp = match staged {
            Some(Ok(media)) => {
                let signal = self.signal.clone();
                let dest = destination.clone();
                let caption = if input.body.is_empty() { None } else { Some(input.body.clone()) };
                let media = media.clone();
                Retry::run(&self.retry_policy, &self.cancel, move || {
                    let signal = signal.clone();
                    let dest = dest.clone();
                    let caption = caption.clone();
                    let media = media.clone();
                    async move { signal.send_attachment(&dest, &media, caption.as_deref(), reply_to_timestamp).await }
                })
                .await?
            }
            Some(Err(BridgeError::MediaPolicy(reason))) => {
                let notice = format!("media too large to forward: {reason}");
                self.send_text_to_signal(destination, &notice, reply_to_timestamp).await?
            }
            Some(Err(other)) => return Err(other.clone()),
            None => {
                if input.body.is_empty() {
                    return Err(BridgeError::validation("empty_body", "nothing to forward"));
                }
                self.send_text_to_signal(destination, &input.body, reply_to_timestamp).await?
            }
        };

        Ok((
            timestamp.to_string(),
            timestamp,
            input.source_chat_id.clone(),
            input.source_msg_id.clone(),
        ))
    }

    async fn send_text_to_signal(
        &self,
        destination: &str,
        text: &str,
        reply_to_timestamp: Option<i64>,
    ) -> Result<i64, BridgeError> {
        let signal = self.signal.clone();
        let dest = destination.to_string();
        let text = text.to_string();
        Retry::run(&self.retry_policy, &self.cancel, move || {
            let signal = signal.clone();
            let dest = dest.clone();
            let text = text.clone();
            async move { signal.send_text(&dest, &text, reply_to_timestamp).await }
        })
        .await
    }

    async fn send_to_whatsapp(
        &self,
        channel: &Channel,
        input: &ForwardInput,
        reply_mapping: &Option<MessageMapping>,
        staged: Option<&Result<StagedMedia, BridgeError>>,
    ) -> Result<(String, i64, String, String), BridgeError> {
        let session = &channel.whatsapp_session_name;
        let chat_id = self.resolve_whatsapp_chat_id(session, reply_mapping).await?;
        let reply_to = reply_mapping.as_ref().map(|m| m.whatsapp_msg_id.clone());

        if !self.test_mode {
            self.simulate_typing(session, &chat_id, input.body.len()).await;
        }

        let whatsapp_msg_id = match staged {
            Some(Ok(media)) => {
                let whatsapp = self.whatsapp.clone();
                let session = session.clone();
                let chat_id = chat_id.clone();
                let caption = if input.body.is_empty() { None } else { Some(input.body.clone()) };
                let media = media.clone();
                let reply_to = reply_to.clone();
                Retry::run(&self.retry_policy, &self.cancel, move || {
                    let whatsapp = whatsapp.clone();
                    let session = session.clone();
                    let chat_id = chat_id.clone();
                    let caption = caption.clone();
                    let media = media.clone();
                    let reply_to = reply_to.clone();
                    async move {
                        whatsapp.send_media(&session, &chat_id, &media, caption.as_deref(), reply_to.as_deref()).await
                    }
                })
                .await?
            }
            Some(Err(BridgeError::MediaPolicy(reason))) => {
                let notice = format!("media too large to forward: {reason}");
                self.send_text_to_whatsapp(session, &chat_id, &notice, reply_to.as_deref()).await?
            }
            Some(Err(other)) => return Err(other.clone()),
            None => {
                if input.body.is_empty() {
                    return Err(BridgeError::validation("empty_body", "nothing to forward"));
                }
                self.send_text_to_whatsapp(session, &chat_id, &input.body, reply_to.as_deref()).await?
            }
        };

        self.whatsapp.send_seen(session, &chat_id, &input.source_msg_id).await;

        // Signal identifiers double as their own send timestamp (§6); a
        // Signal-origin id that somehow isn't numeric still gets a usable
        // ordering key rather than failing the whole forward.
        let signal_timestamp = input.source_msg_id.parse().unwrap_or_else(|_| Utc::now().timestamp_millis());

        Ok((input.source_msg_id.clone(), signal_timestamp, chat_id, whatsapp_msg_id))
    }

    async fn send_text_to_whatsapp(
        &self,
        session: &str,
        chat_id: &str,
        text: &str,
        reply_to: Option<&str>,
    ) -> Result<String, BridgeError> {
        let whatsapp = self.whatsapp.clone();
        let session = session.to_string();
        let chat_id = chat_id.to_string();
        let text = text.to_string();
        let reply_to = reply_to.map(str::to_string);
        Retry::run(&self.retry_policy, &self.cancel, move || {
            let whatsapp = whatsapp.clone();
            let session = session.clone();
            let chat_id = chat_id.clone();
            let text = text.clone();
            let reply_to = reply_to.clone();
            async move { whatsapp.send_text(&session, &chat_id, &text, reply_to.as_deref()).await }
        })
        .await
    }

    /// Typing-start, a cancellation-aware sleep proportional to text
    /// length, then typing-stop — all best-effort (§4.G).
    async fn simulate_typing(&self, session: &str, chat_id: &str, text_len: usize) {
        self.whatsapp.start_typing(session, chat_id).await;
        let delay_ms = (text_len as u64 * TYPING_MS_PER_CHAR).min(TYPING_MAX_MS);
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => {}
            _ = self.cancel.cancelled() => {}
        }
        self.whatsapp.stop_typing(session, chat_id).await;
    }

    #[allow(clippy::too_many_arguments)]
    async fn record_mapping(
        &self,
        whatsapp_session: &str,
        whatsapp_chat_id: String,
        whatsapp_msg_id: String,
        signal_msg_id: String,
        signal_timestamp: i64,
        staged: Option<Result<StagedMedia, BridgeError>>,
        status: DeliveryStatus,
    ) -> Result<(), BridgeError> {
        let media = staged.and_then(|r| r.ok()).map(|m| MediaRef { path: m.local_path, media_type: m.mime_type });
        let now = Utc::now();

        let mapping = MessageMapping {
            session_name: whatsapp_session.to_string(),
            chat_id_hash: self.hasher.hash_hex(&whatsapp_chat_id),
            whatsapp_msg_id_hash: self.hasher.hash_hex(&whatsapp_msg_id),
            signal_msg_id_hash: self.hasher.hash_hex(&signal_msg_id),
            whatsapp_chat_id,
            whatsapp_msg_id,
            signal_msg_id,
            signal_timestamp,
            forwarded_at: now,
            delivery_status: status,
            media,
            created_at: now,
            updated_at: now,
        };

        match self.store.save(mapping).await {
            Ok(()) => Ok(()),
            Err(BridgeError::StorageConflict(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Reaction forwarding: resolve the referenced mapping, send a
    /// reaction if supported or a textual fallback notice (§4.G).
    pub async fn forward_reaction(
        &self,
        direction: Direction,
        session_name: &str,
        source_msg_id: &str,
        reactor: &str,
        reaction_text: Option<&str>,
    ) -> Result<(), BridgeError> {
        let channel = self.channel_for_either(session_name)?;

        let mapping = match direction {
            Direction::WhatsAppToSignal => {
                self.store.get_by_whatsapp_id(&channel.whatsapp_session_name, source_msg_id).await?
            }
            Direction::SignalToWhatsApp => {
                self.store.get_by_signal_id(&channel.whatsapp_session_name, source_msg_id).await?
            }
        };

        let Some(mapping) = mapping else {
            tracing::warn!(msg_id = %source_msg_id, "reaction against unknown original, swallowed");
            return Ok(());
        };

        // Accept both empty string and absent field as "removed" (§9 open question).
        let removed = reaction_text.map(str::is_empty).unwrap_or(true);

        match direction {
            Direction::WhatsAppToSignal => {
                let text = if removed {
                    "Removed reaction from message".to_string()
                } else {
                    format!("{reactor} Reacted with {}", reaction_text.unwrap_or(""))
                };
                self.send_text_to_signal(&channel.signal_destination_number, &text, Some(mapping.signal_timestamp))
                    .await?;
            }
            Direction::SignalToWhatsApp => {
                if let Some(text) = reaction_text.filter(|t| !t.is_empty()) {
                    if let Err(e) = self
                        .whatsapp
                        .send_reaction(&channel.whatsapp_session_name, &mapping.whatsapp_msg_id, text)
                        .await
                    {
                        tracing::warn!(error = %e, "reaction RPC failed, continuing");
                    }
                } else if let Err(e) = self
                    .whatsapp
                    .send_reaction(&channel.whatsapp_session_name, &mapping.whatsapp_msg_id, "")
                    .await
                {
                    tracing::warn!(error = %e, "reaction-removal RPC failed, continuing");
                }
            }
        }

        Ok(())
    }

    /// Edit forwarding: textual "✏️ edited: …" notice against the paired
    /// mapping (§4.G — no edit RPC modeled in the gateway contracts).
    pub async fn forward_edit(
        &self,
        direction: Direction,
        session_name: &str,
        source_msg_id: &str,
        new_body: &str,
    ) -> Result<(), BridgeError> {
        let channel = self.channel_for_either(session_name)?;

        let mapping = match direction {
            Direction::WhatsAppToSignal => {
                self.store.get_by_whatsapp_id(&channel.whatsapp_session_name, source_msg_id).await?
            }
            Direction::SignalToWhatsApp => {
                self.store.get_by_signal_id(&channel.whatsapp_session_name, source_msg_id).await?
            }
        };

        let Some(mapping) = mapping else {
            tracing::warn!(msg_id = %source_msg_id, "edit against unknown original, swallowed");
            return Ok(());
        };

        let notice = format!("\u{270f}\u{fe0f} edited: {new_body}");
        match direction {
            Direction::WhatsAppToSignal => {
                self.send_text_to_signal(&channel.signal_destination_number, &notice, Some(mapping.signal_timestamp)).await?;
            }
            Direction::SignalToWhatsApp => {
                self.send_text_to_whatsapp(
                    &channel.whatsapp_session_name,
                    &mapping.whatsapp_chat_id,
                    &notice,
                    Some(&mapping.whatsapp_msg_id),
                )
                .await?;
            }
        }

        Ok(())
    }

    /// Delete forwarding: delete RPC against the paired mapping, then
    /// tombstone it as `failed` (§4.G).
    pub async fn forward_delete(
        &self,
        direction: Direction,
        session_name: &str,
        source_msg_id: &str,
    ) -> Result<(), BridgeError> {
        let channel = self.channel_for_either(session_name)?;

        let mapping = match direction {
            Direction::WhatsAppToSignal => {
                self.store.get_by_whatsapp_id(&channel.whatsapp_session_name, source_msg_id).await?
            }
            Direction::SignalToWhatsApp => {
                self.store.get_by_signal_id(&channel.whatsapp_session_name, source_msg_id).await?
            }
        };

        let Some(mapping) = mapping else {
            tracing::warn!(msg_id = %source_msg_id, "delete against unknown original, swallowed");
            return Ok(());
        };

        if direction == Direction::SignalToWhatsApp {
            if let Err(e) = self
                .whatsapp
                .delete_message(&channel.whatsapp_session_name, &mapping.whatsapp_chat_id, &mapping.whatsapp_msg_id)
                .await
            {
                tracing::warn!(error = %e, "delete RPC failed, tombstoning mapping anyway");
            }
        }

        self.store
            .update_delivery_status(&channel.whatsapp_session_name, &mapping.whatsapp_msg_id, DeliveryStatus::Failed)
            .await
    }

    /// Translates a gateway-specific WhatsApp ACK code to the internal
    /// delivery-status taxonomy and applies it (§4.G).
    pub async fn apply_whatsapp_ack(&self, session: &str, whatsapp_msg_id: &str, ack: &str) -> Result<(), BridgeError> {
        let status = match ack {
            "error" => DeliveryStatus::Failed,
            "pending" | "server" => DeliveryStatus::Sent,
            "device" => DeliveryStatus::Delivered,
            "read" | "played" => DeliveryStatus::Read,
            other => {
                tracing::debug!(ack = other, "unrecognized ack code, ignored");
                return Ok(());
            }
        };
        self.store.update_delivery_status(session, whatsapp_msg_id, status).await
    }

    pub fn contacts(&self) -> &Arc<dyn ContactCache> {
        &self.contacts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use whatsignal_common::ContactProfile;
    use whatsignal_store::SqliteMappingStore;

    struct FakeWhatsApp {
        sent_texts: Mutex<Vec<(String, String, String, Option<String>)>>,
        sent_reactions: Mutex<Vec<(String, String)>>,
        next_id: AtomicI64,
    }

    impl FakeWhatsApp {
        fn new() -> Self {
            Self { sent_texts: Mutex::new(Vec::new()), sent_reactions: Mutex::new(Vec::new()), next_id: AtomicI64::new(1) }
        }
    }

    #[async_trait]
    impl WhatsAppGateway for FakeWhatsApp {
        async fn send_text(&self, session: &str, chat_id: &str, text: &str, reply_to: Option<&str>) -> Result<String, BridgeError> {
            self.sent_texts.lock().unwrap().push((session.to_string(), chat_id.to_string(), text.to_string(), reply_to.map(str::to_string)));
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            Ok(format!("wamid.{id}"))
        }
        async fn send_media(&self, _: &str, _: &str, _: &StagedMedia, _: Option<&str>, _: Option<&str>) -> Result<String, BridgeError> {
            unimplemented!("not exercised without network-backed media staging")
        }
        async fn send_seen(&self, _: &str, _: &str, _: &str) {}
        async fn start_typing(&self, _: &str, _: &str) {}
        async fn stop_typing(&self, _: &str, _: &str) {}
        async fn send_reaction(&self, session: &str, msg_id: &str, reaction: &str) -> Result<(), BridgeError> {
            self.sent_reactions.lock().unwrap().push((session.to_string(), format!("{msg_id}:{reaction}")));
            Ok(())
        }
        async fn delete_message(&self, _: &str, _: &str, _: &str) -> Result<(), BridgeError> {
            Ok(())
        }
        async fn list_contacts(&self, _: &str) -> Result<Vec<ContactProfile>, BridgeError> {
            Ok(vec![])
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

    struct FakeSignal {
        sent_texts: Mutex<Vec<(String, String, Option<i64>)>>,
        next_timestamp: AtomicI64,
    }

    impl FakeSignal {
        fn new() -> Self {
            Self { sent_texts: Mutex::new(Vec::new()), next_timestamp: AtomicI64::new(1000) }
        }
    }

    #[async_trait]
    impl SignalGateway for FakeSignal {
        async fn send_text(&self, destination: &str, text: &str, reply_to_timestamp: Option<i64>) -> Result<i64, BridgeError> {
            let ts = self.next_timestamp.fetch_add(1, Ordering::SeqCst);
            self.sent_texts.lock().unwrap().push((destination.to_string(), text.to_string(), reply_to_timestamp));
            Ok(ts)
        }
        async fn send_attachment(&self, _: &str, _: &StagedMedia, _: Option<&str>, _: Option<i64>) -> Result<i64, BridgeError> {
            unimplemented!("not exercised without network-backed media staging")
        }
        async fn receive(&self, _: u64) -> Result<Vec<whatsignal_common::SignalInboundMessage>, BridgeError> {
            unimplemented!()
        }
    }

    struct FakeContacts;

    #[async_trait]
    impl ContactCache for FakeContacts {
        async fn resolve_display_name(&self, _: &str, id: &str, _: bool) -> String {
            id.to_string()
        }
        async fn sync_all_contacts(&self, _: &str) -> Result<usize, BridgeError> {
            Ok(0)
        }
        async fn sync_all_groups(&self, _: &str) -> Result<usize, BridgeError> {
            Ok(0)
        }
    }

    async fn test_forwarder() -> (Forwarder, Arc<FakeWhatsApp>, Arc<FakeSignal>, Arc<dyn MappingStore>) {
        let channels = Arc::new(
            ChannelManager::new(vec![Channel {
                whatsapp_session_name: "personal".to_string(),
                signal_destination_number: "+15550100".to_string(),
            }])
            .unwrap(),
        );
        let store: Arc<dyn MappingStore> = Arc::new(SqliteMappingStore::open_in_memory().await);
        let whatsapp = Arc::new(FakeWhatsApp::new());
        let signal = Arc::new(FakeSignal::new());
        let contacts: Arc<dyn ContactCache> = Arc::new(FakeContacts);
        let hasher = Arc::new(IdentifierHasher::new("test-secret"));
        let stager = Arc::new(MediaStager::new(reqwest::Client::new(), BridgeConfig::default(), hasher.clone()));
        let config = BridgeConfig { test_mode: true, ..BridgeConfig::default() };

        let forwarder = Forwarder::new(
            channels,
            store.clone(),
            whatsapp.clone(),
            signal.clone(),
            contacts,
            stager,
            hasher,
            &config,
            CancellationToken::new(),
        );

        (forwarder, whatsapp, signal, store)
    }

    fn text_input(session: &str, chat_id: &str, msg_id: &str, body: &str) -> ForwardInput {
        ForwardInput {
            session_name: session.to_string(),
            source_chat_id: chat_id.to_string(),
            source_msg_id: msg_id.to_string(),
            sender: "15550200".to_string(),
            body: body.to_string(),
            media: None,
            reply_to_source_msg_id: None,
        }
    }

    #[tokio::test]
    async fn forwards_whatsapp_text_to_signal_and_records_mapping() {
        let (forwarder, _whatsapp, signal, store) = test_forwarder().await;

        let input = text_input("personal", "15550200@c.us", "wamid.1", "hello");
        forwarder.forward_message(Direction::WhatsAppToSignal, input).await.unwrap();

        let sent = signal.sent_texts.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "+15550100");
        assert_eq!(sent[0].1, "hello");

        let mapping = store.get_by_whatsapp_id("personal", "wamid.1").await.unwrap().unwrap();
        assert_eq!(mapping.whatsapp_chat_id, "15550200@c.us");
        assert_eq!(mapping.signal_msg_id, "1000");
        assert_eq!(mapping.signal_timestamp, 1000);
    }

    #[tokio::test]
    async fn signal_reply_resolves_whatsapp_chat_from_mapping() {
        let (forwarder, whatsapp, _signal, _store) = test_forwarder().await;

        let original = text_input("personal", "15550200@c.us", "wamid.1", "hello");
        forwarder.forward_message(Direction::WhatsAppToSignal, original).await.unwrap();

        let reply = ForwardInput {
            session_name: "+15550100".to_string(),
            source_chat_id: "+15550200".to_string(),
            source_msg_id: "1000".to_string(),
            sender: "+15550200".to_string(),
            body: "reply".to_string(),
            media: None,
            reply_to_source_msg_id: Some("wamid.1".to_string()),
        };
        forwarder.forward_message(Direction::SignalToWhatsApp, reply).await.unwrap();

        let sent = whatsapp.sent_texts.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "personal");
        assert_eq!(sent[0].1, "15550200@c.us");
        assert_eq!(sent[0].3.as_deref(), Some("wamid.1"));
    }

    #[tokio::test]
    async fn signal_message_with_no_reply_link_falls_back_to_latest_chat() {
        let (forwarder, whatsapp, _signal, _store) = test_forwarder().await;

        let original = text_input("personal", "15550200@c.us", "wamid.1", "hello");
        forwarder.forward_message(Direction::WhatsAppToSignal, original).await.unwrap();

        let followup = ForwardInput {
            session_name: "+15550100".to_string(),
            source_chat_id: "+15550200".to_string(),
            source_msg_id: "1001".to_string(),
            sender: "+15550200".to_string(),
            body: "no reply link here".to_string(),
            media: None,
            reply_to_source_msg_id: None,
        };
        forwarder.forward_message(Direction::SignalToWhatsApp, followup).await.unwrap();

        let sent = whatsapp.sent_texts.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, "15550200@c.us");
    }

    #[tokio::test]
    async fn signal_message_with_no_prior_chat_is_rejected() {
        let (forwarder, _whatsapp, _signal, _store) = test_forwarder().await;

        let input = ForwardInput {
            session_name: "+15550100".to_string(),
            source_chat_id: "+15550200".to_string(),
            source_msg_id: "1001".to_string(),
            sender: "+15550200".to_string(),
            body: "hi".to_string(),
            media: None,
            reply_to_source_msg_id: None,
        };

        let result = forwarder.forward_message(Direction::SignalToWhatsApp, input).await;
        assert!(matches!(result, Err(BridgeError::Validation { reason: "no_known_chat", .. })));
    }

    #[tokio::test]
    async fn duplicate_forward_is_short_circuited() {
        let (forwarder, _whatsapp, signal, _store) = test_forwarder().await;

        let input = text_input("personal", "15550200@c.us", "wamid.1", "hello");
        forwarder.forward_message(Direction::WhatsAppToSignal, input.clone()).await.unwrap();
        forwarder.forward_message(Direction::WhatsAppToSignal, input).await.unwrap();

        assert_eq!(signal.sent_texts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn empty_body_without_media_is_rejected() {
        let (forwarder, _whatsapp, _signal, _store) = test_forwarder().await;

        let input = text_input("personal", "15550200@c.us", "wamid.1", "");
        let result = forwarder.forward_message(Direction::WhatsAppToSignal, input).await;
        assert!(matches!(result, Err(BridgeError::Validation { reason: "empty_body", .. })));
    }

    #[tokio::test]
    async fn reaction_forwards_as_textual_notice_on_signal_side() {
        let (forwarder, _whatsapp, signal, _store) = test_forwarder().await;

        let original = text_input("personal", "15550200@c.us", "wamid.1", "hello");
        forwarder.forward_message(Direction::WhatsAppToSignal, original).await.unwrap();

        forwarder
            .forward_reaction(Direction::WhatsAppToSignal, "personal", "wamid.1", "Alice", Some("\u{1f44d}"))
            .await
            .unwrap();

        let sent = signal.sent_texts.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert!(sent[1].1.contains("Alice Reacted with"));
    }

    #[tokio::test]
    async fn reaction_removal_is_swallowed_when_original_is_unknown() {
        let (forwarder, _whatsapp, signal, _store) = test_forwarder().await;

        forwarder
            .forward_reaction(Direction::WhatsAppToSignal, "personal", "wamid.missing", "Alice", None)
            .await
            .unwrap();

        assert!(signal.sent_texts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn edit_forwards_as_textual_notice() {
        let (forwarder, _whatsapp, signal, _store) = test_forwarder().await;

        let original = text_input("personal", "15550200@c.us", "wamid.1", "hello");
        forwarder.forward_message(Direction::WhatsAppToSignal, original).await.unwrap();

        forwarder.forward_edit(Direction::WhatsAppToSignal, "personal", "wamid.1", "hello there").await.unwrap();

        let sent = signal.sent_texts.lock().unwrap();
        assert!(sent[1].1.contains("edited: hello there"));
    }

    #[tokio::test]
    async fn delete_tombstones_mapping_and_invokes_gateway() {
        let (forwarder, _whatsapp, _signal, store) = test_forwarder().await;

        let original = text_input("personal", "15550200@c.us", "wamid.1", "hello");
        forwarder.forward_message(Direction::WhatsAppToSignal, original).await.unwrap();

        forwarder.forward_delete(Direction::SignalToWhatsApp, "+15550100", "1000").await.unwrap();

        let mapping = store.get_by_whatsapp_id("personal", "wamid.1").await.unwrap().unwrap();
        assert_eq!(mapping.delivery_status, DeliveryStatus::Failed);
    }

    #[tokio::test]
    async fn ack_translation_maps_gateway_codes_to_delivery_status() {
        let (forwarder, _whatsapp, _signal, store) = test_forwarder().await;

        let original = text_input("personal", "15550200@c.us", "wamid.1", "hello");
        forwarder.forward_message(Direction::WhatsAppToSignal, original).await.unwrap();

        forwarder.apply_whatsapp_ack("personal", "wamid.1", "device").await.unwrap();
        let mapping = store.get_by_whatsapp_id("personal", "wamid.1").await.unwrap().unwrap();
        assert_eq!(mapping.delivery_status, DeliveryStatus::Delivered);

        forwarder.apply_whatsapp_ack("personal", "wamid.1", "unrecognized-code").await.unwrap();
        let mapping = store.get_by_whatsapp_id("personal", "wamid.1").await.unwrap().unwrap();
        assert_eq!(mapping.delivery_status, DeliveryStatus::Delivered);
    }
}
