//! Health & readiness handlers.
//!
//! - GET /healthz  -> simple liveness ("ok")
//! - GET /readyz   -> readiness that checks the storage service is reachable

use crate::handlers::account_handlers::AppState;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::collections::HashMap;

/// `GET /healthz`
///
/// Very small liveness check. Always returns 200 OK with a plain JSON body and
/// never performs I/O.
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".into(),
        }),
    )
}

/// `GET /readyz`
///
/// Checks the storage service liveness endpoint. HTTP 200 when it answers,
/// HTTP 503 otherwise, with a JSON body describing the check.
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let storage_check = match state.accounts.gateway().data.ping().await {
        Ok(()) => CheckStatus {
            ok: true,
            error: None,
        },
        Err(e) => {
            tracing::warn!(error = %e, "storage service not ready");
            CheckStatus {
                ok: false,
                error: Some(e.to_string()),
            }
        }
    };

    let overall_ok = storage_check.ok;
    let mut checks = HashMap::new();
    checks.insert("storage", storage_check);

    let body = ReadyResponse {
        status: if overall_ok {
            "ok".into()
        } else {
            "error".into()
        },
        checks,
    };

    let status = if overall_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: String,
    checks: HashMap<&'static str, CheckStatus>,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        routes::routes::routes,
        services::{
            account_service::{AccountService, AccountSettings},
            testing::{FakeNotifier, FakeStorage},
        },
    };
    use axum::{
        body::{Body, to_bytes},
        http::Request,
    };
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    async fn get(storage: &Arc<FakeStorage>, uri: &str) -> (StatusCode, serde_json::Value) {
        let state = AppState {
            accounts: AccountService::new(
                storage.gateway(),
                FakeNotifier::new(),
                AccountSettings::default(),
            ),
            admin_token: Arc::from("t"),
            shutdown: CancellationToken::new(),
        };
        let resp = routes()
            .with_state(state)
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn healthz_does_no_io() {
        let storage = FakeStorage::new();
        let (status, body) = get(&storage, "/healthz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert!(storage.calls().is_empty());
    }

    #[tokio::test]
    async fn readyz_reports_storage_state() {
        let storage = FakeStorage::new();
        let (status, body) = get(&storage, "/readyz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["checks"]["storage"]["ok"], true);

        storage.fail_on("ping");
        let (status, body) = get(&storage, "/readyz").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "error");
        assert!(body["checks"]["storage"]["error"].is_string());
    }
}
