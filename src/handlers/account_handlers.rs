//! HTTP handlers for account creation and deletion.
//! Validation and orchestration live in `AccountService`; these only translate
//! requests and map errors to status codes.

use crate::{
    errors::AppError,
    models::account::ProvisionedAccount,
    services::account_service::{AccountError, AccountService},
};
use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
};
use serde::Deserialize;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tokio_util::sync::CancellationToken;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub accounts: AccountService,
    pub admin_token: Arc<str>,
    /// Cancelled on process shutdown; each request runs under a child.
    pub shutdown: CancellationToken,
}

/// Body of `POST /account/new`.
#[derive(Debug, Deserialize)]
pub struct NewAccountReq {
    pub email: Option<String>,
}

/// Create an account: `POST /account/new`.
pub async fn create_account(
    State(state): State<AppState>,
    payload: Result<Json<NewAccountReq>, JsonRejection>,
) -> Result<(StatusCode, Json<ProvisionedAccount>), AppError> {
    let Json(req) = payload.map_err(|rejection| AppError::bad_request(rejection.body_text()))?;
    let email = req
        .email
        .ok_or_else(|| AppError::bad_request("email is required"))?;
    tracing::debug!(email = %email, "account creation requested");

    let account = state
        .accounts
        .provision(&email, &state.shutdown.child_token())
        .await?;

    Ok((StatusCode::CREATED, Json(account)))
}

/// Delete an account: `DELETE /account/{email}`, bearer token required.
pub async fn delete_account(
    State(state): State<AppState>,
    Path(email): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    authorize(&headers, &state.admin_token)?;
    tracing::debug!(email = %email, "account deletion requested");

    state
        .accounts
        .deprovision(&email, &state.shutdown.child_token())
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /account/` with no email segment.
pub async fn delete_account_without_email(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    authorize(&headers, &state.admin_token)?;
    Err(AppError::bad_request("email is required"))
}

/// Constant-time bearer token check.
fn authorize(headers: &HeaderMap, expected: &str) -> Result<(), AccountError> {
    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match presented {
        Some(token) if bool::from(token.as_bytes().ct_eq(expected.as_bytes())) => Ok(()),
        _ => {
            tracing::warn!("rejected account deletion with missing or wrong bearer token");
            Err(AccountError::Unauthorized)
        }
    }
}
