// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! HTTP request layer.
//!
//! ## Endpoints
//!
//! - `GET /point/{id}` - Current balance of a user
//! - `GET /point/{id}/histories` - Charge/use history of a user
//! - `PATCH /point/{id}/charge` - Charge points, body is a bare JSON integer
//! - `PATCH /point/{id}/use` - Use points, body is a bare JSON integer
//!
//! ## Example Usage
//!
//! ```bash
//! curl -X PATCH http://localhost:3000/point/1/charge \
//!   -H "Content-Type: application/json" -d '100'
//!
//! curl http://localhost:3000/point/1
//! curl http://localhost:3000/point/1/histories
//! ```

use crate::base::UserId;
use crate::history::{TransactionRecord, TransactionType};
use crate::point::UserBalance;
use crate::{PointError, PointService};
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Response body for errors.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Shared application state containing the point service.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<PointService>,
}

/// Failure of a request handler.
pub enum AppError {
    Point(PointError),
    /// The blocking worker running the request died.
    Internal(String),
}

impl From<PointError> for AppError {
    fn from(err: PointError) -> Self {
        AppError::Point(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, code) = match self {
            AppError::Point(err) => (StatusCode::BAD_REQUEST, err.to_string(), err.code()),
            AppError::Internal(message) => {
                error!(%message, "point request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, message, "INTERNAL_ERROR")
            }
        };

        (
            status,
            Json(ErrorResponse {
                error,
                code: code.to_string(),
            }),
        )
            .into_response()
    }
}

// === Handlers ===

/// GET /point/{id}
async fn point(State(state): State<AppState>, Path(id): Path<i64>) -> Json<UserBalance> {
    Json(state.service.balance(UserId(id)))
}

/// GET /point/{id}/histories
async fn histories(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Json<Vec<TransactionRecord>> {
    Json(state.service.history(UserId(id)))
}

/// PATCH /point/{id}/charge
async fn charge(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(amount): Json<i64>,
) -> Result<Json<UserBalance>, AppError> {
    apply(state, UserId(id), TransactionType::Charge, amount).await
}

/// PATCH /point/{id}/use
async fn use_points(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(amount): Json<i64>,
) -> Result<Json<UserBalance>, AppError> {
    apply(state, UserId(id), TransactionType::Use, amount).await
}

/// Runs a mutation off the async workers, since it may wait on the user's section.
async fn apply(
    state: AppState,
    user_id: UserId,
    kind: TransactionType,
    amount: i64,
) -> Result<Json<UserBalance>, AppError> {
    let service = Arc::clone(&state.service);
    let balance = tokio::task::spawn_blocking(move || service.apply(user_id, kind, amount))
        .await
        .map_err(|err| AppError::Internal(err.to_string()))??;
    Ok(Json(balance))
}

// === Router ===

pub fn create_router(service: Arc<PointService>) -> Router {
    Router::new()
        .route("/point/{id}", get(point))
        .route("/point/{id}/histories", get(histories))
        .route("/point/{id}/charge", patch(charge))
        .route("/point/{id}/use", patch(use_points))
        .with_state(AppState { service })
}

/// Serves the wallet API on `listener` until the server fails.
pub async fn serve(listener: TcpListener, service: Arc<PointService>) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "point wallet listening");
    }
    axum::serve(listener, create_router(service)).await
}
