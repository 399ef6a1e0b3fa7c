use std::sync::Arc;

use crate::{
    cache::Cache,
    config::Config,
    connections::ConnectionRegistry,
    services::{PurchaseSyncService, WebhookProcessor},
};

#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// TTL cache (Redis, or in-process fallback).
    pub cache: Cache,
    /// Month-window purchase synchronization.
    pub sync: Arc<PurchaseSyncService>,
    /// Live viewer connections.
    pub connections: ConnectionRegistry,
    /// Inbound push processing.
    pub webhook: Arc<WebhookProcessor>,
}
