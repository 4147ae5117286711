pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod security;
pub mod state;
pub mod types;

pub use config::WebhookConfig;
pub use error::WebhookError;
pub use routes::create_route;
pub use state::AppState;

use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;

/// Serves the webhook app until `cancel` fires, matching the cancellation-
/// aware shutdown used by the bridge's background loops.
pub async fn serve(state: AppState, cancel: CancellationToken) -> std::io::Result<()> {
    let addr = state.config.listen_address();
    let app = routes::create_route(state);
    tracing::info!(%addr, "webhook server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
}
