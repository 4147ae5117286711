use crate::errors::WahaError;

pub const MAX_TEXT_MESSAGE_LENGTH: usize = 4096;
pub const MAX_CAPTION_LENGTH: usize = 1024;

/// Validate a WAHA chat id, e.g. `15550200@c.us` or `12345-67890@g.us`.
pub fn validate_chat_id(chat_id: &str) -> Result<(), WahaError> {
    if chat_id.is_empty() || !chat_id.contains('@') {
        return Err(WahaError::InvalidSession(format!("invalid chat id: {chat_id}")));
    }
    Ok(())
}

pub fn validate_text_message(message: &str) -> Result<(), WahaError> {
    if message.is_empty() {
        return Err(WahaError::ConfigurationError("message cannot be empty".into()));
    }
    if message.len() > MAX_TEXT_MESSAGE_LENGTH {
        return Err(WahaError::ConfigurationError(format!(
            "message too long: {} characters (max {MAX_TEXT_MESSAGE_LENGTH})",
            message.len()
        )));
    }
    Ok(())
}

pub fn validate_caption(caption: &str) -> Result<(), WahaError> {
    if caption.len() > MAX_CAPTION_LENGTH {
        return Err(WahaError::ConfigurationError(format!(
            "caption too long: {} characters (max {MAX_CAPTION_LENGTH})",
            caption.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_id_requires_at_sign() {
        assert!(validate_chat_id("15550200@c.us").is_ok());
        assert!(validate_chat_id("15550200").is_err());
        assert!(validate_chat_id("").is_err());
    }

    #[test]
    fn text_message_rejects_empty_and_oversized() {
        assert!(validate_text_message("hi").is_ok());
        assert!(validate_text_message("").is_err());
        assert!(validate_text_message(&"a".repeat(MAX_TEXT_MESSAGE_LENGTH + 1)).is_err());
    }

    #[test]
    fn caption_rejects_oversized() {
        assert!(validate_caption("ok").is_ok());
        assert!(validate_caption(&"a".repeat(MAX_CAPTION_LENGTH + 1)).is_err());
    }
}
