#![forbid(unsafe_code)]

use std::sync::Arc;

use addrcheck_engines::client::ExternalValidationClient;
use addrcheck_os::cancellation::CancellationSignal;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tracing::{error, info, warn};

use crate::{AdapterError, AdapterRuntime, ApiErrorResponse, ValidateAddressesRequest};

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

pub fn router<C>(runtime: Arc<AdapterRuntime<C>>) -> Router
where
    C: ExternalValidationClient + Send + Sync + 'static,
{
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api_requests", post(validate_addresses::<C>))
        .route("/api_requests/:reference_uuid", get(request_status::<C>))
        .with_state(runtime)
}

async fn healthz() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

async fn validate_addresses<C>(
    State(runtime): State<Arc<AdapterRuntime<C>>>,
    Json(body): Json<ValidateAddressesRequest>,
) -> Response
where
    C: ExternalValidationClient + Send + Sync + 'static,
{
    let cancel = CancellationSignal::new();
    let reference_uuid = body.reference_uuid.clone();
    let mut guard = CancelOnDrop::new(cancel.clone(), reference_uuid.clone());
    info!(
        reference_uuid = %reference_uuid,
        addresses = body.addresses.len(),
        "address validation requested"
    );

    let worker = runtime.clone();
    let joined =
        tokio::task::spawn_blocking(move || worker.run_validation(body, &cancel)).await;
    guard.disarm();

    match joined {
        Ok(Ok(results)) => (StatusCode::OK, Json(results)).into_response(),
        Ok(Err(err)) => error_response(err),
        Err(join_err) => {
            error!(
                reference_uuid = %reference_uuid,
                error = %join_err,
                "validation worker aborted"
            );
            if let Err(err) = runtime.fail_abandoned(&reference_uuid) {
                error!(
                    reference_uuid = %reference_uuid,
                    error = %err,
                    "could not fail abandoned request"
                );
            }
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiErrorResponse::new("validation worker aborted")),
            )
                .into_response()
        }
    }
}

async fn request_status<C>(
    State(runtime): State<Arc<AdapterRuntime<C>>>,
    Path(reference_uuid): Path<String>,
) -> Response
where
    C: ExternalValidationClient + Send + Sync + 'static,
{
    match runtime.request_status(&reference_uuid) {
        Ok(status) => (StatusCode::OK, Json(status)).into_response(),
        Err(err) => error_response(err),
    }
}

fn error_response(err: AdapterError) -> Response {
    let status = err.status_code();
    if status.is_server_error() {
        error!(status = status.as_u16(), error = %err, "request rejected");
    } else {
        warn!(status = status.as_u16(), error = %err, "request rejected");
    }
    (status, Json(ApiErrorResponse::new(err.to_string()))).into_response()
}

/// Raises the signal if the handler future is dropped before the worker returns.
struct CancelOnDrop {
    signal: CancellationSignal,
    reference_uuid: String,
    armed: bool,
}

impl CancelOnDrop {
    fn new(signal: CancellationSignal, reference_uuid: String) -> Self {
        Self {
            signal,
            reference_uuid,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if self.armed {
            warn!(reference_uuid = %self.reference_uuid, "client went away; cancelling validation");
            self.signal.cancel();
        }
    }
}
