//! Inbound provider push endpoint.
//!
//! Zettle treats any non-200 response as a delivery failure and retries
//! noisily, so this endpoint always acknowledges with `200 OK`; rejected
//! pushes are only logged. The resync and viewer fan-out triggered by a
//! verified `PurchaseCreated` event run in a background task so the
//! acknowledgment never waits on upstream.
//!
//! ## Endpoints
//!
//! - POST /webhook - Receive a signed provider push

use axum::{Router, debug_handler, extract::State, http::HeaderMap, routing::post};
use garde::Validate;
use shared::api::{Purchase, WebhookEnvelope};

use crate::{services::verify_signature, state::AppState};

/// Header carrying the hex HMAC-SHA256 push signature.
pub const SIGNATURE_HEADER: &str = "x-izettle-signature";

const PURCHASE_CREATED: &str = "PurchaseCreated";

pub fn router() -> Router<AppState> {
    Router::new().route("/webhook", post(receive_push))
}

/// Receive a provider push. The body is taken raw so malformed input can be
/// rejected without failing the acknowledgment.
#[debug_handler]
async fn receive_push(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> &'static str {
    let envelope = match serde_json::from_str::<WebhookEnvelope>(&body) {
        Ok(envelope) => envelope,
        Err(error) => {
            tracing::warn!(%error, "rejected push with undecodable body");
            return "OK";
        }
    };
    if let Err(report) = envelope.validate() {
        tracing::warn!(%report, "rejected push with invalid envelope");
        return "OK";
    }

    if let Some(key) = state.config.enforced_signing_key() {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        if !verify_signature(key, &envelope.timestamp, &envelope.payload, signature) {
            tracing::warn!(event = %envelope.event_name, "rejected push with bad signature");
            return "OK";
        }
    }

    if envelope.event_name != PURCHASE_CREATED {
        tracing::debug!(event = %envelope.event_name, "ignoring push event");
        return "OK";
    }

    let purchase = match serde_json::from_str::<Purchase>(&envelope.payload) {
        Ok(purchase) => purchase,
        Err(error) => {
            tracing::warn!(%error, "rejected push with undecodable purchase payload");
            return "OK";
        }
    };

    tracing::info!(
        purchase = purchase.purchase_uuid1.as_deref().unwrap_or("-"),
        "accepted purchase push"
    );

    // Acknowledge immediately; the resync and fan-out must not delay or fail
    // the response to the provider.
    let webhook = state.webhook.clone();
    tokio::spawn(async move {
        if let Err(error) = webhook.purchase_created(purchase).await {
            tracing::error!(%error, "failed to process pushed purchase");
        }
    });

    "OK"
}
