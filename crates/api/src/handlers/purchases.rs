//! Purchase listing endpoint.
//!
//! Serves purchases over an arbitrary date range through the month-window
//! cache; see `services::sync` for the chunking and TTL policy.
//!
//! ## Endpoints
//!
//! - GET /purchases?startDate=&endDate= - List purchases (defaults to the
//!   last week)

use axum::{
    Json, Router, debug_handler,
    extract::{Query, State},
    response::IntoResponse,
    routing::get,
};
use chrono::{Duration, Utc};
use shared::api::PurchaseQuery;

use crate::{
    error::AppError,
    services::{end_of_day, start_of_day},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/purchases", get(get_purchases))
}

/// List purchases between `startDate` and `endDate`. Missing bounds default
/// to one week ago and now, widened to whole days.
#[debug_handler]
async fn get_purchases(
    State(state): State<AppState>,
    Query(query): Query<PurchaseQuery>,
) -> Result<impl IntoResponse, AppError> {
    let now = Utc::now();
    let start = start_of_day(query.start_date.unwrap_or(now - Duration::weeks(1)));
    let end = end_of_day(query.end_date.unwrap_or(now));

    let purchases = state.sync.purchases_in_range(start, end).await?;

    Ok(Json(purchases))
}
