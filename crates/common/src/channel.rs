use std::collections::HashMap;

use crate::errors::BridgeError;
use crate::model::ChannelConfig;

/// One configured pairing between a WhatsApp session and a Signal
/// destination number.
pub type Channel = ChannelConfig;

/// Bidirectional, immutable-after-construction routing table between
/// WhatsApp session names and Signal destination numbers.
///
/// Mirrors the structure the reference client builds around its config,
/// but here construction itself enforces the uniqueness invariants instead
/// of trusting the caller.
#[derive(Debug, Clone)]
pub struct ChannelManager {
    session_to_destination: HashMap<String, String>,
    destination_to_session: HashMap<String, String>,
    default_session: String,
}

impl ChannelManager {
    /// Build the routing table from the configured channel list.
    ///
    /// Rejects an empty list and any duplicate session or destination
    /// across channels.
    pub fn new(channels: Vec<Channel>) -> Result<Self, BridgeError> {
        if channels.is_empty() {
            return Err(BridgeError::Config(
                "at least one channel must be configured".to_string(),
            ));
        }

        let mut session_to_destination = HashMap::with_capacity(channels.len());
        let mut destination_to_session = HashMap::with_capacity(channels.len());
        let default_session = channels[0].whatsapp_session_name.clone();

        for channel in channels {
            let session = channel.whatsapp_session_name;
            let destination = channel.signal_destination_number;

            if session_to_destination.contains_key(&session) {
                return Err(BridgeError::Config(format!(
                    "duplicate whatsapp session in channel list: {session}"
                )));
            }
            if destination_to_session.contains_key(&destination) {
                return Err(BridgeError::Config(format!(
                    "duplicate signal destination in channel list: {destination}"
                )));
            }

            session_to_destination.insert(session.clone(), destination.clone());
            destination_to_session.insert(destination, session);
        }

        Ok(Self {
            session_to_destination,
            destination_to_session,
            default_session,
        })
    }

    pub fn is_valid_session(&self, name: &str) -> bool {
        self.session_to_destination.contains_key(name)
    }

    pub fn is_valid_destination(&self, number: &str) -> bool {
        self.destination_to_session.contains_key(number)
    }

    pub fn session_for_destination(&self, number: &str) -> Option<&str> {
        self.destination_to_session.get(number).map(String::as_str)
    }

    pub fn destination_for_session(&self, name: &str) -> Option<&str> {
        self.session_to_destination.get(name).map(String::as_str)
    }

    pub fn default_session_name(&self) -> &str {
        &self.default_session
    }

    pub fn sessions(&self) -> impl Iterator<Item = &str> {
        self.session_to_destination.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(session: &str, destination: &str) -> Channel {
        Channel {
            whatsapp_session_name: session.to_string(),
            signal_destination_number: destination.to_string(),
        }
    }

    #[test]
    fn rejects_empty_channel_list() {
        assert!(ChannelManager::new(vec![]).is_err());
    }

    #[test]
    fn rejects_duplicate_session() {
        let result = ChannelManager::new(vec![
            channel("personal", "+15550100"),
            channel("personal", "+15550101"),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn rejects_duplicate_destination() {
        let result = ChannelManager::new(vec![
            channel("personal", "+15550100"),
            channel("work", "+15550100"),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn resolves_both_directions() {
        let manager = ChannelManager::new(vec![
            channel("personal", "+15550100"),
            channel("work", "+15550101"),
        ])
        .unwrap();

        assert_eq!(manager.destination_for_session("personal"), Some("+15550100"));
        assert_eq!(manager.session_for_destination("+15550101"), Some("work"));
        assert!(manager.is_valid_session("personal"));
        assert!(!manager.is_valid_session("unknown"));
        assert_eq!(manager.default_session_name(), "personal");
    }
}
