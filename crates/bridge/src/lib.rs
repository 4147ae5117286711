pub mod config;
pub mod forwarder;
pub mod media_stager;
pub mod message_service;
pub mod orchestrator;
pub mod poller;
pub mod scheduler;
pub mod session_monitor;

pub use config::BridgeConfig;
pub use forwarder::{ForwardInput, Forwarder, SourceMedia};
pub use media_stager::{MediaKind, MediaStager};
pub use message_service::{
    IncomingWhatsAppAck, IncomingWhatsAppDelete, IncomingWhatsAppEdit, IncomingWhatsAppMessage,
    IncomingWhatsAppReaction, MessageService,
};
pub use orchestrator::{AppInfo, Orchestrator, OrchestratorOptions};
pub use poller::{Poller, PollerOptions};
pub use scheduler::{DeliveryMonitor, Scheduler};
pub use session_monitor::SessionMonitor;
