//! Core domain services.
//!
//! This module contains the purchase synchronization engine and the webhook
//! processing path. The upstream purchase source is abstracted behind a
//! trait to enable mocking in tests.
//!
//! ## Services
//!
//! - **sync** - month-window purchase synchronization against the Zettle
//!   purchase API, with per-window TTL caching and cursor pagination
//! - **webhook** - push signature verification and the evict/resync/
//!   broadcast pipeline behind `PurchaseCreated` events
//!
//! ## Usage in Handlers
//!
//! Services are accessed via `AppState`:
//!
//! ```ignore
//! async fn handler(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
//!     let purchases = state.sync.purchases_in_range(start, end).await?;
//! }
//! ```

mod sync;
mod webhook;

pub use sync::{
    DateWindow, PurchasePage, PurchaseProvider, PurchaseSyncService, ZettleProvider, end_of_day,
    month_windows, start_of_day,
};
pub use webhook::{WebhookProcessor, verify_signature};

#[cfg(test)]
pub use sync::MockPurchaseProvider;
