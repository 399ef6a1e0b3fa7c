//! Provider push verification and processing.
//!
//! Pushes carry a hex HMAC-SHA256 signature over `"{timestamp}.{payload}"`.
//! A verified `PurchaseCreated` event refreshes the current month's cache
//! window from upstream and fans the new purchase out to live viewers.

use std::sync::Arc;

use anyhow::Result;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use shared::api::{Purchase, WsEvent};

use super::sync::PurchaseSyncService;
use crate::connections::ConnectionRegistry;

type HmacSha256 = Hmac<Sha256>;

/// Verify a push signature: hex HMAC-SHA256 of `"{timestamp}.{payload}"`
/// under the shared signing key. The comparison is constant-time.
pub fn verify_signature(key: &str, timestamp: &str, payload: &str, signature: &str) -> bool {
    let Ok(mut mac) = HmacSha256::new_from_slice(key.as_bytes()) else {
        return false;
    };
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload.as_bytes());

    let Ok(provided) = hex::decode(signature) else {
        return false;
    };
    mac.verify_slice(&provided).is_ok()
}

/// Runs the side effects of a verified purchase push.
pub struct WebhookProcessor {
    sync: Arc<PurchaseSyncService>,
    connections: ConnectionRegistry,
}

impl WebhookProcessor {
    pub fn new(sync: Arc<PurchaseSyncService>, connections: ConnectionRegistry) -> Self {
        Self { sync, connections }
    }

    /// Handle a verified `PurchaseCreated` push: evict and refetch the
    /// current month's window, then notify every live viewer. Runs in the
    /// background relative to the push acknowledgment.
    pub async fn purchase_created(&self, purchase: Purchase) -> Result<()> {
        self.sync.resync_today().await?;

        self.connections
            .broadcast(&WsEvent::NewPurchase { purchase });

        Ok(())
    }
}
