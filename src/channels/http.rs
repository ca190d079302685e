//! HTTP ingress: intents and toggles over REST.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Map, Value, json};

use crate::messages::{InboundMessage, NluIntent};
use crate::router::IntentRouter;

/// POST /api/intent
///
/// Body is a Hermes intent. Returns the speech event, or 204 when the
/// intent produced nothing.
async fn post_intent(
    State(router): State<Arc<IntentRouter>>,
    Json(intent): Json<NluIntent>,
) -> Response {
    tracing::debug!(intent = %intent.name(), site_id = %intent.site_id, "HTTP intent");
    match router.on_message(InboundMessage::Intent(intent)).await {
        Some(speech) => Json(speech).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

/// POST /api/handle/toggle-on
async fn toggle_on(State(router): State<Arc<IntentRouter>>) -> StatusCode {
    router
        .on_message(InboundMessage::HandleToggleOn {
            site_id: "default".to_string(),
        })
        .await;
    StatusCode::NO_CONTENT
}

/// POST /api/handle/toggle-off
async fn toggle_off(State(router): State<Arc<IntentRouter>>) -> StatusCode {
    router
        .on_message(InboundMessage::HandleToggleOff {
            site_id: "default".to_string(),
        })
        .await;
    StatusCode::NO_CONTENT
}

/// GET /api/intents
async fn list_intents(State(router): State<Arc<IntentRouter>>) -> impl IntoResponse {
    let intents: Map<String, Value> = router
        .summary()
        .into_iter()
        .map(|b| {
            let entry = json!({
                "action": b.action,
                "handler": b.handler,
                "ready": b.ready,
            });
            (b.intent, entry)
        })
        .collect();
    Json(json!({
        "enabled": router.is_enabled(),
        "intents": intents,
    }))
}

/// Build the ingress routes.
pub fn http_routes(router: Arc<IntentRouter>) -> Router {
    Router::new()
        .route("/api/intent", post(post_intent))
        .route("/api/handle/toggle-on", post(toggle_on))
        .route("/api/handle/toggle-off", post(toggle_off))
        .route("/api/intents", get(list_intents))
        .with_state(router)
}
