//! API routes

use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

use crate::auth::{auth_middleware, AppState};
use crate::handlers::{campaigns, channels, conversations, health, metrics, webhooks};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let state = Arc::new(state);

    // Health check routes (no auth required)
    let health_routes = Router::new()
        .route("/", get(health::health))
        .route("/live", get(health::liveness))
        .route("/ready", get(health::readiness))
        .with_state(state.clone());

    // Provider webhooks, authenticated by signature
    let webhook_routes = Router::new()
        .route(
            "/meta",
            get(webhooks::verify_subscription).post(webhooks::receive_event),
        )
        .with_state(state.clone());

    // Campaign routes
    let campaign_routes = Router::new()
        .route("/", post(campaigns::create_campaign))
        .route("/:campaign_id", get(campaigns::get_campaign))
        .route("/:campaign_id/schedule", post(campaigns::schedule_campaign))
        .route("/:campaign_id/execute", post(campaigns::execute_campaign))
        .route("/:campaign_id/stats", get(campaigns::get_campaign_stats));

    // Channel routes
    let channel_routes =
        Router::new().route("/:channel_id/templates/sync", post(channels::sync_templates));

    // Conversation routes
    let conversation_routes =
        Router::new().route("/:conversation_id/read", post(conversations::mark_read));

    // API v1 routes with authentication
    let api_v1 = Router::new()
        .nest("/campaigns", campaign_routes)
        .nest("/channels", channel_routes)
        .nest("/conversations", conversation_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .with_state(state.clone());

    // Combine all routes
    Router::new()
        .nest("/health", health_routes)
        .nest("/webhooks", webhook_routes)
        .nest("/api/v1", api_v1)
        .route("/metrics", get(metrics::prometheus_metrics))
        .with_state(state)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
}

/// CORS policy for the configured origins. No origins means no cross-origin access.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::hash_api_key;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use parley_common::config::WebhookConfig;
    use parley_common::types::Platform;
    use parley_common::Config;
    use parley_core::platform::{MediaKind, ProviderTemplate};
    use parley_core::webhook::signature::sign;
    use parley_core::{
        AdapterError, CampaignManager, ChannelClients, EventRouter, Metrics, NoopExternalSync,
        PlatformSendAdapter, SendReceipt, TokenBucket, WebhookGateway,
    };
    use parley_storage::models::{Channel, CreateChannel};
    use parley_storage::{ChannelRepository, MemoryStore, Stores};
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    const API_KEY: &str = "pk_test_key";
    const SECRET: &str = "app-secret";

    #[derive(Default)]
    struct CountingAdapter {
        sends: AtomicUsize,
    }

    impl CountingAdapter {
        fn receipt(&self) -> SendReceipt {
            let n = self.sends.fetch_add(1, Ordering::SeqCst) + 1;
            SendReceipt {
                message_id: format!("wamid.api{}", n),
            }
        }
    }

    #[async_trait]
    impl PlatformSendAdapter for CountingAdapter {
        async fn send_text(&self, _recipient: &str, _text: &str) -> Result<SendReceipt, AdapterError> {
            Ok(self.receipt())
        }

        async fn send_template(
            &self,
            _recipient: &str,
            _name: &str,
            _language: &str,
            _components: Value,
        ) -> Result<SendReceipt, AdapterError> {
            Ok(self.receipt())
        }

        async fn send_media(
            &self,
            _recipient: &str,
            _kind: MediaKind,
            _url: &str,
            _caption: Option<&str>,
        ) -> Result<SendReceipt, AdapterError> {
            Ok(self.receipt())
        }

        async fn list_templates(&self) -> Result<Vec<ProviderTemplate>, AdapterError> {
            Ok(Vec::new())
        }
    }

    struct Clients(Arc<CountingAdapter>);

    #[async_trait]
    impl ChannelClients for Clients {
        async fn client_for(
            &self,
            _channel: &Channel,
        ) -> Result<Arc<dyn PlatformSendAdapter>, AdapterError> {
            Ok(self.0.clone())
        }
    }

    async fn app() -> (Router, Channel) {
        let store = Arc::new(MemoryStore::new());
        let stores = Stores::from_memory(store.clone());
        let metrics = Metrics::new().unwrap();
        let clients: Arc<dyn ChannelClients> =
            Arc::new(Clients(Arc::new(CountingAdapter::default())));

        let router = Arc::new(EventRouter::build(
            stores.clone(),
            clients.clone(),
            &Config::default(),
            Arc::new(NoopExternalSync),
            metrics.clone(),
        ));
        let gateway = WebhookGateway::new(
            WebhookConfig {
                app_secret: Some(SECRET.to_string()),
                verify_token: Some("verify-me".to_string()),
            },
            stores.webhook_events.clone(),
            router.clone(),
            metrics.clone(),
        );
        let campaigns = CampaignManager::new(
            &stores,
            clients,
            TokenBucket::new(1000.0, 1000),
            metrics.clone(),
        );

        let channel = ChannelRepository::create(
            store.as_ref(),
            CreateChannel {
                platform: Platform::Whatsapp,
                platform_id: "10001".to_string(),
                name: "Support".to_string(),
            },
        )
        .await
        .unwrap();

        let state = AppState {
            db_pool: None,
            stores,
            gateway: Arc::new(gateway),
            campaigns: Arc::new(campaigns),
            tracker: router.tracker(),
            metrics,
            api_key_hashes: Arc::new(vec![hash_api_key(API_KEY)]),
        };

        (create_router(state), channel)
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn signed_webhook(body: &[u8]) -> Request<Body> {
        Request::post("/webhooks/meta")
            .header("content-type", "application/json")
            .header("x-hub-signature-256", sign(body, SECRET))
            .body(Body::from(body.to_vec()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = app().await;
        for path in ["/health", "/health/live", "/health/ready"] {
            let response = app
                .clone()
                .oneshot(Request::get(path).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK, "{}", path);
        }
    }

    #[tokio::test]
    async fn test_subscription_handshake() {
        let (app, _) = app().await;

        let response = app
            .clone()
            .oneshot(
                Request::get(
                    "/webhooks/meta?hub.mode=subscribe&hub.verify_token=verify-me&hub.challenge=4242",
                )
                .body(Body::empty())
                .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"4242");

        let response = app
            .clone()
            .oneshot(
                Request::get("/webhooks/meta?mode=subscribe&token=verify-me&challenge=7")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(
                Request::get("/webhooks/meta?hub.mode=subscribe&hub.verify_token=nope&hub.challenge=1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_webhook_ingest_and_dedup() {
        let (app, _) = app().await;
        let body = serde_json::to_vec(&json!({
            "object": "whatsapp_business_account",
            "entry": [{
                "id": "waba-1",
                "changes": [{
                    "field": "messages",
                    "value": {
                        "messaging_product": "whatsapp",
                        "metadata": { "phone_number_id": "10001" },
                        "messages": [{
                            "from": "15551234567",
                            "id": "wamid.API1",
                            "timestamp": "1700000000",
                            "type": "text",
                            "text": { "body": "hi" }
                        }]
                    }
                }]
            }]
        }))
        .unwrap();

        let response = app.clone().oneshot(signed_webhook(&body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!({ "success": true }));

        let response = app.oneshot(signed_webhook(&body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await,
            json!({ "success": true, "deduped": true })
        );
    }

    #[tokio::test]
    async fn test_unsigned_webhook_is_rejected() {
        let (app, _) = app().await;
        let response = app
            .oneshot(
                Request::post("/webhooks/meta")
                    .header("x-hub-signature-256", "sha256=deadbeef")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_api_requires_key() {
        let (app, _) = app().await;
        let response = app
            .clone()
            .oneshot(
                Request::post(format!("/api/v1/conversations/{}/read", uuid::Uuid::now_v7()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .oneshot(
                Request::post(format!("/api/v1/conversations/{}/read", uuid::Uuid::now_v7()))
                    .header("x-api-key", API_KEY)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_campaign_lifecycle() {
        let (app, channel) = app().await;

        let response = app
            .clone()
            .oneshot(
                Request::post("/api/v1/campaigns")
                    .header("authorization", format!("Bearer {}", API_KEY))
                    .header("content-type", "application/json")
                    .body(Body::from(
                        json!({
                            "channel_id": channel.id,
                            "name": "Launch",
                            "message": "We just launched!",
                            "recipients": ["111", "222"]
                        })
                        .to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let created = json_body(response).await;
        assert_eq!(created["status"], "draft");
        assert_eq!(created["total_recipients"], 2);
        let id = created["id"].as_str().unwrap().to_string();

        let response = app
            .clone()
            .oneshot(
                Request::post(format!("/api/v1/campaigns/{}/execute", id))
                    .header("authorization", format!("Bearer {}", API_KEY))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let result = json_body(response).await;
        assert_eq!(result["sent"], 2);
        assert_eq!(result["failed"], 0);
        assert_eq!(result["status"], "completed");

        let response = app
            .clone()
            .oneshot(
                Request::post(format!("/api/v1/campaigns/{}/execute", id))
                    .header("authorization", format!("Bearer {}", API_KEY))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = app
            .oneshot(
                Request::get(format!("/api/v1/campaigns/{}/stats", id))
                    .header("x-api-key", API_KEY)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let stats = json_body(response).await;
        assert_eq!(stats["sent"], 2);
        assert_eq!(stats["delivered"], 0);
    }

    #[tokio::test]
    async fn test_cors_allows_configured_origin() {
        let (app, _) = app().await;
        let app = app.layer(cors_layer(&["https://console.example.com".to_string()]));

        let preflight = |origin: &str| {
            Request::builder()
                .method(Method::OPTIONS)
                .uri("/api/v1/campaigns")
                .header("origin", origin)
                .header("access-control-request-method", "POST")
                .body(Body::empty())
                .unwrap()
        };

        let response = app
            .clone()
            .oneshot(preflight("https://console.example.com"))
            .await
            .unwrap();
        assert_eq!(
            response.headers()["access-control-allow-origin"],
            "https://console.example.com"
        );

        let response = app.oneshot(preflight("https://evil.example")).await.unwrap();
        assert!(response
            .headers()
            .get("access-control-allow-origin")
            .is_none());
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let (app, _) = app().await;
        let response = app
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers()["content-type"].to_str().unwrap().to_string();
        assert!(content_type.starts_with("text/plain; version=0.0.4"));
    }
}
