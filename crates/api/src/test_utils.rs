//! Shared test utilities for API handler tests.
//!
//! Provides mock factories and a `TestStateBuilder` for constructing
//! `AppState` instances with only the pieces each test cares about. The
//! cache defaults to a real in-memory backend so tests can pre-populate and
//! inspect windows; the upstream provider defaults to an expectation-free
//! mock that fails the test if it is ever called.
//!
//! ## Usage
//!
//! ```ignore
//! use crate::test_utils::{TestStateBuilder, mock_purchase};
//!
//! let mut provider = MockPurchaseProvider::new();
//! provider.expect_fetch_page().returning(|_, _, _, _| ...);
//!
//! let state = TestStateBuilder::new()
//!     .with_provider(provider)
//!     .build();
//! ```

use std::sync::Arc;

use shared::api::Purchase;

use crate::cache::{Cache, InMemoryCache};
use crate::config::Config;
use crate::connections::ConnectionRegistry;
use crate::services::{MockPurchaseProvider, PurchaseSyncService, WebhookProcessor};
use crate::state::AppState;

/// Signing key used by `test_config`.
pub const TEST_SIGNING_KEY: &str = "test-signing-key";

/// Creates a test configuration with dummy values.
pub fn test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 3000,
        redis_url: None,
        zettle_client_id: "test-client".to_string(),
        zettle_api_key: "test-key".to_string(),
        zettle_webhook_signing_key: Some(TEST_SIGNING_KEY.to_string()),
        env: "test".to_string(),
        sentry_dsn: None,
    }
}

/// Creates a purchase with the given identifier.
pub fn mock_purchase(uuid: &str) -> Purchase {
    Purchase {
        purchase_uuid1: Some(uuid.to_string()),
        timestamp: Some("2024-03-01T12:00:00.000Z".to_string()),
        amount: Some(4200),
        currency: Some("SEK".to_string()),
        ..Purchase::default()
    }
}

/// Builder for constructing test `AppState`.
///
/// Defaults: in-memory cache, expectation-free provider mock, fresh
/// connection registry, `test_config()`.
pub struct TestStateBuilder {
    config: Config,
    cache: Cache,
    provider: Option<MockPurchaseProvider>,
}

impl TestStateBuilder {
    pub fn new() -> Self {
        Self {
            config: test_config(),
            cache: Cache::new(Arc::new(InMemoryCache::new())),
            provider: None,
        }
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn with_cache(mut self, cache: Cache) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_provider(mut self, provider: MockPurchaseProvider) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Builds the `AppState` using configured pieces or defaults.
    pub fn build(self) -> AppState {
        let provider = Arc::new(self.provider.unwrap_or_else(MockPurchaseProvider::new));
        let sync = Arc::new(PurchaseSyncService::new(self.cache.clone(), provider));
        let connections = ConnectionRegistry::new();
        let webhook = Arc::new(WebhookProcessor::new(sync.clone(), connections.clone()));

        AppState {
            config: self.config,
            cache: self.cache,
            sync,
            connections,
            webhook,
        }
    }
}

impl Default for TestStateBuilder {
    fn default() -> Self {
        Self::new()
    }
}
