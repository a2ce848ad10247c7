//! Defines routes for account provisioning and health checks.
//!
//! ## Structure
//! - **Account endpoints**
//!   - `POST   /account/new`:     provision bucket, user and policy for an email
//!   - `DELETE /account/{email}`: remove everything belonging to an email (bearer token)
//!
//! - **Health endpoints**
//!   - `GET    /healthz`: liveness
//!   - `GET    /readyz`:  storage service reachability

use crate::handlers::{
    account_handlers::{AppState, create_account, delete_account, delete_account_without_email},
    health_handlers::{healthz, readyz},
};
use axum::{
    Router,
    routing::{delete, get, post},
};

/// Build and return the router for all provisioner routes.
///
/// The router carries shared state (`AppState`) to all handlers.
pub fn routes() -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // account endpoints
        .route("/account/new", post(create_account))
        .route("/account/", delete(delete_account_without_email))
        .route("/account/{email}", delete(delete_account))
}
