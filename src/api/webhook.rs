//! Webhook handler for Nexus repository events

use axum::{
    Json,
    body::Bytes,
    extract::State as AxumState,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::{error, info, warn};

use crate::SharedState;
use crate::utils::verify_nexus_signature;
use crate::webhook::NexusWebhookEvent;

const SIGNATURE_HEADER: &str = "x-nexus-webhook-signature";

fn ignored(reason: &str) -> Response {
    (
        StatusCode::OK,
        Json(json!({ "status": "ignored", "reason": reason })),
    )
        .into_response()
}

/// Handles the Nexus webhook POST request.
pub async fn handle_nexus_webhook(
    AxumState(state): AxumState<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    // Signature validation, only when a secret is configured for the stand.
    if let Some(secret) = &state.config.webhook_secret {
        let signature_opt = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok());

        let Some(signature) = signature_opt else {
            error!("Webhook secret configured, but no signature header supplied");
            return StatusCode::UNAUTHORIZED.into_response();
        };

        if !verify_nexus_signature(secret, &body, signature) {
            error!("Webhook signature verification failed");
            return StatusCode::UNAUTHORIZED.into_response();
        }
    }

    let event: NexusWebhookEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            error!("Could not parse webhook body: {}", e);
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": format!("Invalid webhook payload: {}", e) })),
            )
                .into_response();
        }
    };

    if event.action != "CREATED" {
        info!("Ignoring '{}' event from Nexus", event.action);
        return ignored("Not a CREATE event");
    }

    if !event.asset.name.ends_with(".whl") {
        info!("Ignoring non-wheel asset '{}'", event.asset.name);
        return ignored("Not a wheel file");
    }

    let Some(release) = event.package_release() else {
        warn!(
            "Wheel filename '{}' does not parse as <name>-<version>",
            event.asset.name
        );
        return ignored("Unrecognised wheel filename");
    };

    info!(
        "New wheel published: {} {} from '{}'",
        release.package_name, release.version, release.repository
    );

    let package_name = release.package_name.clone();
    if !state.queue.enqueue(release) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "release worker is not running" })),
        )
            .into_response();
    }

    (
        StatusCode::OK,
        Json(json!({
            "status": "queued",
            "package": package_name,
            "queue_size": state.queue.depth(),
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::queue::{LogOnlyHandler, ReleaseQueue};
    use crate::{AppState, SharedState};
    use axum::body::to_bytes;
    use chrono::Utc;
    use hmac::{Hmac, Mac};
    use std::sync::Arc;
    use std::time::Instant;

    fn test_state(webhook_secret: Option<&str>) -> SharedState {
        Arc::new(AppState {
            config: ServerConfig {
                bind_address: "127.0.0.1:0".to_string(),
                webhook_secret: webhook_secret.map(String::from),
                nexus_username: None,
                nexus_password: None,
            },
            queue: ReleaseQueue::start(Arc::new(LogOnlyHandler)),
            start_time: Instant::now(),
            started_at: Utc::now(),
        })
    }

    fn wheel_event_body() -> Bytes {
        Bytes::from(
            r#"{
                "timestamp": "2024-01-01T00:00:00.000+00:00",
                "nodeId": "ABC123",
                "initiator": "admin/127.0.0.1",
                "repositoryName": "pypi-internal",
                "action": "CREATED",
                "asset": {
                    "id": "cHlwaS1pbnRlcm5hbDox",
                    "assetId": "cHlwaS1pbnRlcm5hbDox",
                    "format": "pypi",
                    "name": "demo_core-1.2.3-py3-none-any.whl"
                }
            }"#,
        )
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn created_wheel_is_queued() {
        let state = test_state(None);
        let response =
            handle_nexus_webhook(AxumState(state), HeaderMap::new(), wheel_event_body()).await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "queued");
        assert_eq!(body["package"], "demo-core");
    }

    #[tokio::test]
    async fn unparsable_body_is_rejected_with_400() {
        let state = test_state(None);
        let response = handle_nexus_webhook(
            AxumState(state),
            HeaderMap::new(),
            Bytes::from_static(b"not-json"),
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn non_created_event_is_ignored() {
        let state = test_state(None);
        let body = wheel_event_body();
        let body = Bytes::from(
            String::from_utf8(body.to_vec())
                .unwrap()
                .replace("CREATED", "DELETED"),
        );
        let response = handle_nexus_webhook(AxumState(state), HeaderMap::new(), body).await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ignored");
        assert_eq!(body["reason"], "Not a CREATE event");
    }

    #[tokio::test]
    async fn non_wheel_asset_is_ignored() {
        let state = test_state(None);
        let body = wheel_event_body();
        let body = Bytes::from(
            String::from_utf8(body.to_vec())
                .unwrap()
                .replace(".whl", ".tar.gz"),
        );
        let response = handle_nexus_webhook(AxumState(state), HeaderMap::new(), body).await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["reason"], "Not a wheel file");
    }

    #[tokio::test]
    async fn missing_signature_is_unauthorized_when_secret_configured() {
        let state = test_state(Some("maxwell"));
        let response =
            handle_nexus_webhook(AxumState(state), HeaderMap::new(), wheel_event_body()).await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn valid_signature_is_accepted() {
        let state = test_state(Some("maxwell"));
        let body = wheel_event_body();

        let mut mac = Hmac::<sha1::Sha1>::new_from_slice(b"maxwell").unwrap();
        mac.update(&body);
        let signature = hex::encode(mac.finalize().into_bytes());

        let mut headers = HeaderMap::new();
        headers.insert(SIGNATURE_HEADER, signature.parse().unwrap());

        let response = handle_nexus_webhook(AxumState(state), headers, body).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn wrong_signature_is_unauthorized() {
        let state = test_state(Some("maxwell"));
        let mut headers = HeaderMap::new();
        headers.insert(SIGNATURE_HEADER, "deadbeef".parse().unwrap());

        let response = handle_nexus_webhook(AxumState(state), headers, wheel_event_body()).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
