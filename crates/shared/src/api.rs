//! Wire types shared by the API server and its clients.
//!
//! Purchases arrive from the Zettle purchase API and are passed through to
//! clients unchanged; every field is optional because the upstream schema
//! only guarantees shape, not presence. Unknown upstream fields are ignored.

use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};

/// A line item on a purchase.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[garde(allow_unvalidated)]
pub struct Product {
    pub quantity: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub product_uuid: Option<String>,
    pub name: Option<String>,
    pub variant_uuid: Option<String>,
    pub variant_name: Option<String>,
    pub unit_price: Option<i64>,
    pub unit_name: Option<String>,
}

/// A payment applied to a purchase.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[garde(allow_unvalidated)]
pub struct Payment {
    pub uuid: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// Amount in minor currency units.
    pub amount: Option<i64>,
    pub gratuity_amount: Option<i64>,
}

/// A transaction record from the payment provider.
///
/// The server treats this as opaque: it validates shape at the cache and
/// upstream trust boundaries and otherwise passes it through.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[garde(allow_unvalidated)]
pub struct Purchase {
    pub source: Option<String>,
    #[serde(rename = "purchaseUUID1")]
    pub purchase_uuid1: Option<String>,
    pub timestamp: Option<String>,
    pub purchase_number: Option<i64>,
    pub global_purchase_number: Option<i64>,
    /// Total amount in minor currency units.
    pub amount: Option<i64>,
    pub country: Option<String>,
    pub currency: Option<String>,
    pub created: Option<String>,
    pub custom_amount_sale: Option<bool>,
    pub exchange_type: Option<String>,
    pub products: Option<Vec<Product>>,
    pub payments: Option<Vec<Payment>>,
}

/// Query parameters for the purchase listing endpoint.
///
/// Both bounds are optional; the server defaults to the last week.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseQuery {
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

/// Envelope of a provider push notification.
///
/// `payload` is itself a JSON-encoded string; the signature sent alongside
/// covers `"{timestamp}.{payload}"`.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEnvelope {
    #[garde(length(min = 1))]
    pub timestamp: String,
    #[garde(length(min = 1))]
    pub payload: String,
    #[garde(length(min = 1))]
    pub event_name: String,
}

/// Events sent to connected viewers, serialized as
/// `{ "event": <name>, "data": <payload> }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum WsEvent {
    /// Sent once to a freshly registered connection.
    ConnectionOpen { id: String },
    /// Broadcast to all connections when the provider pushes a new purchase.
    NewPurchase { purchase: Purchase },
}
