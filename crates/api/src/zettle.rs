//! Zettle API client for token acquisition and purchase listing.
//!
//! Uses the purchase API v2: https://developer.zettle.com/docs/api/purchase

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use shared::api::Purchase;
use tokio::sync::Mutex;

const AUTH_BASE_URL: &str = "https://oauth.zettle.com";
const PURCHASES_BASE_URL: &str = "https://purchase.izettle.com";

/// Tokens are refreshed this long before their reported expiry so in-flight
/// requests never race the cutoff.
const TOKEN_EXPIRY_MARGIN_SECS: i64 = 30;

/// Per-request timeout. Also bounds webhook-triggered background resyncs,
/// which carry no cancellation of their own.
const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

struct TokenState {
    access_token: String,
    expires_at: DateTime<Utc>,
}

pub struct Client {
    http: reqwest::Client,
    client_id: String,
    api_key: String,
    token: Mutex<Option<TokenState>>,
}

impl Client {
    pub fn new(client_id: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .expect("failed to construct HTTP client"),
            client_id: client_id.into(),
            api_key: api_key.into(),
            token: Mutex::new(None),
        }
    }

    /// Get a bearer token, reusing the cached one until shortly before it
    /// expires. Holding the lock across the refresh keeps concurrent callers
    /// from stampeding the token endpoint.
    async fn token(&self) -> Result<String, Error> {
        let mut token = self.token.lock().await;
        if let Some(state) = token.as_ref() {
            if Utc::now() < state.expires_at {
                return Ok(state.access_token.clone());
            }
        }

        let response = self
            .http
            .post(format!("{AUTH_BASE_URL}/token"))
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("client_id", self.client_id.as_str()),
                ("assertion", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| Error::Request(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let grant: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::Parse(e.to_string()))?;

        let expires_at =
            Utc::now() + chrono::Duration::seconds(grant.expires_in - TOKEN_EXPIRY_MARGIN_SECS);
        let access_token = grant.access_token.clone();
        *token = Some(TokenState {
            access_token: grant.access_token,
            expires_at,
        });

        Ok(access_token)
    }

    /// Fetch one page of purchases in `[start_date, end_date]`, resuming from
    /// `purchase_hash` when supplied.
    pub async fn purchases(
        &self,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
        limit: usize,
        purchase_hash: Option<&str>,
    ) -> Result<PurchasesResponse, Error> {
        let token = self.token().await?;

        let mut request = self
            .http
            .get(format!("{PURCHASES_BASE_URL}/purchases/v2"))
            .bearer_auth(token)
            .query(&[
                (
                    "startDate",
                    start_date.to_rfc3339_opts(SecondsFormat::Millis, true),
                ),
                (
                    "endDate",
                    end_date.to_rfc3339_opts(SecondsFormat::Millis, true),
                ),
                ("limit", limit.to_string()),
            ]);
        if let Some(hash) = purchase_hash {
            request = request.query(&[("purchaseHash", hash)]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Request(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        response.json().await.map_err(|e| Error::Parse(e.to_string()))
    }
}

#[derive(Debug)]
pub enum Error {
    Request(String),
    Api { status: u16, message: String },
    Parse(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Request(e) => write!(f, "request failed: {}", e),
            Error::Api { status, message } => write!(f, "API error {}: {}", status, message),
            Error::Parse(e) => write!(f, "parse error: {}", e),
        }
    }
}

impl std::error::Error for Error {}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

/// One page of the purchase listing. `lastPurchaseHash` is the resume cursor;
/// its absence means the range is exhausted.
#[derive(Debug, Deserialize)]
pub struct PurchasesResponse {
    pub purchases: Vec<Purchase>,
    #[serde(rename = "lastPurchaseHash", default)]
    pub last_purchase_hash: Option<String>,
}
