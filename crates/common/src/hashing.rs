use std::sync::OnceLock;

/// Process-wide keyed hash used to derive redacted secondary-index
/// columns (`chat_id_hash`, `whatsapp_msg_id_hash`, `signal_msg_id_hash`)
/// from raw identifiers, per §4.D / §9.
///
/// The key is loaded once from `WHATSIGNAL_ENCRYPTION_SECRET` at startup
/// and treated as immutable for the life of the process; raw identifiers
/// are never logged when a hashed column exists.
#[derive(Clone)]
pub struct IdentifierHasher {
    key: [u8; 32],
}

static HASHER: OnceLock<IdentifierHasher> = OnceLock::new();

impl IdentifierHasher {
    pub fn new(secret: &str) -> Self {
        let key = blake3::hash(secret.as_bytes());
        Self { key: *key.as_bytes() }
    }

    /// Install the process-wide hasher. Subsequent calls are no-ops;
    /// the first call wins, matching a once-at-startup secret load.
    pub fn install(secret: &str) -> &'static IdentifierHasher {
        HASHER.get_or_init(|| IdentifierHasher::new(secret))
    }

    /// Fetch the process-wide hasher, panicking if `install` was never
    /// called. Every entry point that touches identifiers is expected to
    /// install the hasher during startup before this is reachable.
    pub fn global() -> &'static IdentifierHasher {
        HASHER.get().expect("IdentifierHasher::install must run at startup")
    }

    pub fn hash_hex(&self, identifier: &str) -> String {
        blake3::keyed_hash(&self.key, identifier.as_bytes())
            .to_hex()
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_input_same_key_is_deterministic() {
        let hasher = IdentifierHasher::new("secret");
        assert_eq!(hasher.hash_hex("wamid.123"), hasher.hash_hex("wamid.123"));
    }

    #[test]
    fn different_keys_produce_different_hashes() {
        let a = IdentifierHasher::new("secret-a");
        let b = IdentifierHasher::new("secret-b");
        assert_ne!(a.hash_hex("wamid.123"), b.hash_hex("wamid.123"));
    }

    #[test]
    fn different_inputs_produce_different_hashes() {
        let hasher = IdentifierHasher::new("secret");
        assert_ne!(hasher.hash_hex("wamid.123"), hasher.hash_hex("wamid.124"));
    }
}
