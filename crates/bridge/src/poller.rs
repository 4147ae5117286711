use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use whatsignal_common::{BridgeError, Retry, RetryPolicy, SignalGateway};

use crate::message_service::MessageService;

/// Runtime knobs passed explicitly into each poller run rather than read
/// from ambient process state, so multiple pollers (one per channel) can
/// run with independent verbosity.
#[derive(Debug, Clone, Copy, Default)]
pub struct PollerOptions {
    pub verbose: bool,
}

const COOLDOWN_AFTER_EXHAUSTED_RETRIES: Duration = Duration::from_secs(5);

/// Long-polls one Signal destination's inbox and hands every message to
/// the Message Service (§4.I).
pub struct Poller {
    signal: Arc<dyn SignalGateway>,
    message_service: Arc<MessageService>,
    destination: String,
    timeout_secs: u64,
    retry_policy: RetryPolicy,
    cancel: CancellationToken,
}

impl Poller {
    pub fn new(
        signal: Arc<dyn SignalGateway>,
        message_service: Arc<MessageService>,
        destination: String,
        timeout_secs: u64,
        cancel: CancellationToken,
    ) -> Self {
        Self { signal, message_service, destination, timeout_secs, retry_policy: RetryPolicy::default(), cancel }
    }

    /// Runs until `cancel` fires. Each receive call is retried per
    /// `RetryPolicy`; once retries are exhausted the loop backs off
    /// briefly and tries again rather than giving up on the channel.
    pub async fn run(&self, options: PollerOptions) {
        loop {
            if self.cancel.is_cancelled() {
                return;
            }

            let result: Result<_, BridgeError> =
                Retry::run(&self.retry_policy, &self.cancel, || self.signal.receive(self.timeout_secs)).await;

            match result {
                Ok(messages) => {
                    if options.verbose && !messages.is_empty() {
                        tracing::info!(count = messages.len(), destination = %self.destination, "polled signal messages");
                    }
                    for message in messages {
                        if let Err(e) = self.message_service.process_signal_message(&self.destination, message).await {
                            tracing::warn!(error = %e, destination = %self.destination, "failed to process signal message");
                        }
                    }
                }
                Err(BridgeError::Cancelled) => return,
                Err(e) => {
                    tracing::error!(error = %e, destination = %self.destination, "signal poll failed after retries");
                    tokio::select! {
                        _ = tokio::time::sleep(COOLDOWN_AFTER_EXHAUSTED_RETRIES) => {}
                        _ = self.cancel.cancelled() => return,
                    }
                }
            }
        }
    }
}
