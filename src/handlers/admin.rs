use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Booking, BookingStatus};
use crate::state::AppState;

fn check_auth(headers: &HeaderMap, expected_token: &str) -> Result<(), AppError> {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let token = auth.strip_prefix("Bearer ").unwrap_or("");
    if token != expected_token {
        return Err(AppError::Unauthorized);
    }
    Ok(())
}

// GET /api/admin/bookings?tenant_id=&status=&limit=
#[derive(Deserialize)]
pub struct BookingsQuery {
    pub tenant_id: i64,
    pub status: Option<String>,
    pub limit: Option<i64>,
}

pub async fn get_bookings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<BookingsQuery>,
) -> Result<Json<Vec<Booking>>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let bookings = {
        let db = state.db.lock().unwrap();
        queries::list_bookings_by_tenant(
            &db,
            query.tenant_id,
            query.status.as_deref(),
            query.limit.unwrap_or(100),
        )?
    };

    Ok(Json(bookings))
}

// POST /api/admin/bookings/:id/cancel
pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let updated = {
        let db = state.db.lock().unwrap();
        queries::update_booking_status(&db, &id, &BookingStatus::Cancelled)?
    };

    if !updated {
        return Err(AppError::NotFound(format!("booking {id}")));
    }

    tracing::info!(booking_id = %id, "booking cancelled by admin");
    Ok(Json(serde_json::json!({ "cancelled": id })))
}

// POST /api/admin/bookings/:id/delete
pub async fn delete_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let deleted = {
        let db = state.db.lock().unwrap();
        queries::delete_booking(&db, &id)?
    };

    if !deleted {
        return Err(AppError::NotFound(format!("booking {id}")));
    }

    tracing::info!(booking_id = %id, "booking deleted by admin");
    Ok(Json(serde_json::json!({ "deleted": id })))
}
