use serde::{Deserialize, Serialize};

/// The signing key value shipped in the integration examples. Webhook
/// verification is skipped when this (or no key at all) is configured, so
/// development pushes pass without real credentials.
pub const INSECURE_SIGNING_KEY: &str = "super-secret-do-not-use-in-production";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Redis URL for the shared cache. Unset or unreachable falls back to the
    /// in-process cache.
    #[serde(default)]
    pub redis_url: Option<String>,
    pub zettle_client_id: String,
    pub zettle_api_key: String,
    /// Shared secret for webhook signature verification.
    #[serde(default)]
    pub zettle_webhook_signing_key: Option<String>,
    /// Set to "production" for JSON logging, anything else for human-readable.
    #[serde(default)]
    pub env: String,
    /// Sentry DSN for error tracking
    #[serde(default)]
    pub sentry_dsn: Option<String>,
}

impl Config {
    pub fn is_production(&self) -> bool {
        self.env == "production"
    }

    pub fn uses_insecure_signing_key(&self) -> bool {
        self.zettle_webhook_signing_key.as_deref() == Some(INSECURE_SIGNING_KEY)
    }

    /// The signing key pushes must be verified against, or `None` when
    /// verification is disabled (no key configured, or the insecure default).
    pub fn enforced_signing_key(&self) -> Option<&str> {
        self.zettle_webhook_signing_key
            .as_deref()
            .filter(|key| *key != INSECURE_SIGNING_KEY)
    }
}
