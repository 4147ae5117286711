pub mod channel;
pub mod errors;
pub mod hashing;
pub mod model;
pub mod rate_limit;
pub mod retry;
pub mod traits;

pub use channel::{Channel, ChannelManager};
pub use errors::{BridgeError, BridgeResult};
pub use hashing::IdentifierHasher;
pub use model::*;
pub use rate_limit::RateLimiter;
pub use retry::{Retry, RetryPolicy};
pub use traits::{ContactCache, MappingStore, SignalGateway, SignalInboundMessage, StagedMedia, WhatsAppGateway};
