use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode};
use hmac::{Hmac, Mac};
use sha2::Sha512;
use tower::ServiceExt;

use whatsignal_bridge::{AppInfo, BridgeConfig, Forwarder, MediaStager, MessageService};
use whatsignal_common::{
    BridgeError, Channel, ChannelManager, ContactCache, ContactProfile, IdentifierHasher, RateLimiter, SignalGateway, SignalInboundMessage, StagedMedia,
    WhatsAppGateway,
};
use whatsignal_webhook::{AppState, WebhookConfig};

struct NoopGateway;

#[async_trait::async_trait]
impl WhatsAppGateway for NoopGateway {
    async fn send_text(&self, _: &str, _: &str, _: &str, _: Option<&str>) -> Result<String, BridgeError> {
        Ok("wamid.1".to_string())
    }
    async fn send_media(&self, _: &str, _: &str, _: &StagedMedia, _: Option<&str>, _: Option<&str>) -> Result<String, BridgeError> {
        unimplemented!()
    }
    async fn send_seen(&self, _: &str, _: &str, _: &str) {}
    async fn start_typing(&self, _: &str, _: &str) {}
    async fn stop_typing(&self, _: &str, _: &str) {}
    async fn send_reaction(&self, _: &str, _: &str, _: &str) -> Result<(), BridgeError> {
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
        Ok("WORKING".to_string())
    }
    async fn restart_session(&self, _: &str) -> Result<(), BridgeError> {
        Ok(())
    }
}

struct NoopSignal;

#[async_trait::async_trait]
impl SignalGateway for NoopSignal {
    async fn send_text(&self, _: &str, _: &str, _: Option<i64>) -> Result<i64, BridgeError> {
        Ok(1000)
    }
    async fn send_attachment(&self, _: &str, _: &StagedMedia, _: Option<&str>, _: Option<i64>) -> Result<i64, BridgeError> {
        unimplemented!()
    }
    async fn receive(&self, _: u64) -> Result<Vec<SignalInboundMessage>, BridgeError> {
        Ok(vec![])
    }
}

struct NoopContacts;

#[async_trait::async_trait]
impl ContactCache for NoopContacts {
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

async fn test_state(secret: Option<&str>) -> AppState {
    let channels = Arc::new(
        ChannelManager::new(vec![Channel { whatsapp_session_name: "personal".to_string(), signal_destination_number: "+15550100".to_string() }]).unwrap(),
    );
    let store: Arc<dyn whatsignal_common::MappingStore> = Arc::new(whatsignal_store::SqliteMappingStore::open_in_memory().await);
    let whatsapp: Arc<dyn WhatsAppGateway> = Arc::new(NoopGateway);
    let signal: Arc<dyn SignalGateway> = Arc::new(NoopSignal);
    let contacts: Arc<dyn ContactCache> = Arc::new(NoopContacts);
    let hasher = Arc::new(IdentifierHasher::new("test-secret"));
    let stager = Arc::new(MediaStager::new(reqwest::Client::new(), BridgeConfig::default(), hasher.clone()));
    let forwarder = Arc::new(Forwarder::new(
        channels.clone(),
        store,
        whatsapp.clone(),
        signal,
        contacts,
        stager,
        hasher,
        &BridgeConfig { test_mode: true, ..BridgeConfig::default() },
        tokio_util::sync::CancellationToken::new(),
    ));

    AppState {
        info: Arc::new(AppInfo { name: "whatsignal".to_string(), version: "0.1.0".to_string(), build_time: "test".to_string(), commit: "test".to_string() }),
        config: Arc::new(WebhookConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            webhook_secret: secret.map(str::to_string),
            environment: whatsignal_webhook::config::Environment::Development,
            hmac_skew_sec: 300,
            rate_limit_per_minute: 5,
        }),
        messages: Arc::new(MessageService::new(forwarder)),
        channels,
        whatsapp,
        rate_limiter: Arc::new(RateLimiter::new(5, Duration::from_secs(60))),
    }
}

fn sign(body: &[u8], secret: &str) -> String {
    let mut mac = Hmac::<Sha512>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// `oneshot` skips the TCP accept loop that normally populates
/// `ConnectInfo`, so tests exercising the rate-limit layer insert it by hand.
fn fake_peer() -> ConnectInfo<SocketAddr> {
    ConnectInfo("127.0.0.1:0".parse().unwrap())
}

#[tokio::test]
async fn health_reports_ok() {
    let app = whatsignal_webhook::create_route(test_state(None).await);
    let response = app.oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn session_status_lists_configured_sessions() {
    let app = whatsignal_webhook::create_route(test_state(None).await);
    let response = app.oneshot(Request::builder().uri("/session/status").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body[0]["session"], "personal");
    assert_eq!(body[0]["healthy"], true);
}

#[tokio::test]
async fn webhook_rejects_non_json_content_type() {
    let app = whatsignal_webhook::create_route(test_state(None).await);
    let request = Request::builder()
        .method("POST")
        .uri("/webhook/whatsapp")
        .extension(fake_peer())
        .header("content-type", "text/plain")
        .body(Body::from("not json"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn webhook_without_secret_skips_signature_check() {
    let app = whatsignal_webhook::create_route(test_state(None).await);
    let body = r#"{"event":"message","session":"personal","payload":{"id":"wamid.1","from":"15550200@c.us","body":"hi","hasMedia":false}}"#;
    let request = Request::builder()
        .method("POST")
        .uri("/webhook/whatsapp")
        .extension(fake_peer())
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn webhook_drops_broadcast_chat_without_error() {
    let app = whatsignal_webhook::create_route(test_state(None).await);
    let body = r#"{"event":"message","session":"personal","payload":{"id":"wamid.1","from":"status@broadcast","body":"hi","hasMedia":false}}"#;
    let request = Request::builder()
        .method("POST")
        .uri("/webhook/whatsapp")
        .extension(fake_peer())
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn webhook_drops_empty_body_without_media_without_error() {
    let app = whatsignal_webhook::create_route(test_state(None).await);
    let body = r#"{"event":"message","session":"personal","payload":{"id":"wamid.1","from":"15550200@c.us","body":"","hasMedia":false}}"#;
    let request = Request::builder()
        .method("POST")
        .uri("/webhook/whatsapp")
        .extension(fake_peer())
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn webhook_rejects_bad_signature_when_secret_configured() {
    let app = whatsignal_webhook::create_route(test_state(Some("topsecret")).await);
    let body = r#"{"event":"message","session":"personal","payload":{"id":"wamid.1","from":"15550200@c.us","body":"hi","hasMedia":false}}"#;
    let request = Request::builder()
        .method("POST")
        .uri("/webhook/whatsapp")
        .extension(fake_peer())
        .header("content-type", "application/json")
        .header("x-webhook-hmac", "deadbeef")
        .header("x-webhook-timestamp", chrono::Utc::now().timestamp().to_string())
        .body(Body::from(body))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn webhook_accepts_a_correctly_signed_request() {
    let secret = "topsecret";
    let app = whatsignal_webhook::create_route(test_state(Some(secret)).await);
    let body = r#"{"event":"message","session":"personal","payload":{"id":"wamid.1","from":"15550200@c.us","body":"hi","hasMedia":false}}"#;
    let signature = sign(body.as_bytes(), secret);
    let request = Request::builder()
        .method("POST")
        .uri("/webhook/whatsapp")
        .extension(fake_peer())
        .header("content-type", "application/json")
        .header("x-webhook-hmac", signature)
        .header("x-webhook-timestamp", chrono::Utc::now().timestamp().to_string())
        .body(Body::from(body))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn webhook_enforces_rate_limit_per_source() {
    let state = test_state(None).await;
    let app = whatsignal_webhook::create_route(state);
    let body = r#"{"event":"waiting","session":"personal","payload":{}}"#;

    for _ in 0..5 {
        let request = Request::builder()
            .method("POST")
            .uri("/webhook/whatsapp")
            .extension(fake_peer())
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let request = Request::builder()
        .method("POST")
        .uri("/webhook/whatsapp")
        .extension(fake_peer())
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}
