use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::{handlers, middleware as mw, state::AppState};

pub fn create_route(state: AppState) -> Router {
    let webhook_route = Router::new()
        .route("/webhook/whatsapp", post(handlers::handle_webhook))
        .route_layer(axum::middleware::from_fn(mw::require_json_content_type))
        .route_layer(axum::middleware::from_fn_with_state(state.clone(), mw::rate_limit));

    Router::new()
        .merge(webhook_route)
        .route("/health", get(handlers::health))
        .route("/session/status", get(handlers::session_status))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::new().allow_origin(tower_http::cors::Any).allow_methods([axum::http::Method::GET, axum::http::Method::POST]))
                .layer(SetResponseHeaderLayer::if_not_present(axum::http::header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff")))
                .layer(SetResponseHeaderLayer::if_not_present(axum::http::HeaderName::from_static("x-frame-options"), HeaderValue::from_static("DENY")))
                .layer(SetResponseHeaderLayer::if_not_present(axum::http::header::REFERRER_POLICY, HeaderValue::from_static("no-referrer")))
                .layer(SetResponseHeaderLayer::if_not_present(
                    axum::http::HeaderName::from_static("x-xss-protection"),
                    HeaderValue::from_static("1; mode=block"),
                )),
        )
}
