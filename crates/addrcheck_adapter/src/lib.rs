#![forbid(unsafe_code)]

pub mod http;
pub mod store;

use std::sync::Arc;

use addrcheck_contracts::address::{AddressRecord, AnnotatedAddress};
use addrcheck_contracts::batch::ProviderExchange;
use addrcheck_contracts::request::{
    ReferenceId, StateTransitionError, ValidationRequest, ValidationRequestState,
};
use addrcheck_contracts::ContractViolation;
use addrcheck_engines::client::{ExternalServiceError, ExternalValidationClient};
use addrcheck_engines::config::{ConfigurationError, ProviderCredentialsConfig};
use addrcheck_engines::smarty::{SmartyStreetsClient, SmartyStreetsClientConfig};
use addrcheck_os::cancellation::CancellationSignal;
use addrcheck_os::orchestrator::{AddressValidationOrchestrator, RequestObserver, ValidationError};
use axum::http::StatusCode;
use tracing::{error, warn};

use crate::store::{InMemoryValidationRequestStore, StoreError, ValidationRequestStore};

pub const ENV_HTTP_BIND: &str = "ADDRCHECK_HTTP_BIND";
pub const DEFAULT_HTTP_BIND: &str = "127.0.0.1:8080";

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ValidateAddressesRequest {
    pub reference_uuid: String,
    pub addresses: Vec<AddressRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RequestStatusResponse {
    pub reference_uuid: String,
    pub state: ValidationRequestState,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ApiErrorResponse {
    pub status: String,
    pub reason: String,
}

impl ApiErrorResponse {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("invalid request: {0}")]
    InvalidRequest(#[from] ContractViolation),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    StateTransition(#[from] StateTransitionError),
}

impl AdapterError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Store(StoreError::DuplicateKey { .. }) => StatusCode::CONFLICT,
            Self::Store(StoreError::NotFound { .. }) => StatusCode::NOT_FOUND,
            Self::Store(StoreError::LockPoisoned) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Validation(ValidationError::ExternalService(err)) => match err {
                ExternalServiceError::Timeout => StatusCode::GATEWAY_TIMEOUT,
                ExternalServiceError::BatchTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
                _ => StatusCode::BAD_GATEWAY,
            },
            Self::Validation(_) | Self::StateTransition(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Writes each transition and provider exchange to the store as the run reaches it.
struct StoreObserver<'a> {
    store: &'a dyn ValidationRequestStore,
}

impl RequestObserver for StoreObserver<'_> {
    fn state_changed(&self, request: &ValidationRequest) {
        if let Err(err) = self.store.record(request) {
            error!(
                reference_id = %request.reference_id,
                error = %err,
                "failed to record request state"
            );
        }
    }

    fn exchange_recorded(&self, request: &ValidationRequest, exchange: &ProviderExchange) {
        if let Err(err) = self
            .store
            .record_content(&request.reference_id, exchange.clone())
        {
            error!(
                reference_id = %request.reference_id,
                error = %err,
                "failed to record request content"
            );
        }
    }
}

/// Transport-side wiring around the orchestrator: creates the request record, runs the batch with
/// every transition persisted as it happens.
pub struct AdapterRuntime<C>
where
    C: ExternalValidationClient,
{
    orchestrator: AddressValidationOrchestrator<C>,
    store: Arc<dyn ValidationRequestStore>,
}

impl AdapterRuntime<SmartyStreetsClient> {
    pub fn default_from_env() -> Result<Self, ConfigurationError> {
        let client = SmartyStreetsClient::new(SmartyStreetsClientConfig::from_env()?)?;
        Ok(Self::new(
            AddressValidationOrchestrator::new(ProviderCredentialsConfig::from_env(), client),
            Arc::new(InMemoryValidationRequestStore::new()),
        ))
    }
}

impl<C> AdapterRuntime<C>
where
    C: ExternalValidationClient,
{
    pub fn new(
        orchestrator: AddressValidationOrchestrator<C>,
        store: Arc<dyn ValidationRequestStore>,
    ) -> Self {
        Self {
            orchestrator,
            store,
        }
    }

    pub fn run_validation(
        &self,
        input: ValidateAddressesRequest,
        cancel: &CancellationSignal,
    ) -> Result<Vec<AnnotatedAddress>, AdapterError> {
        let reference_id = ReferenceId::new(input.reference_uuid)?;
        let mut request = self.store.create(reference_id)?;

        let observer = StoreObserver {
            store: self.store.as_ref(),
        };
        let outcome = self
            .orchestrator
            .run_observed(input.addresses, &mut request, cancel, &observer);

        // The orchestrator leaves the request untouched on configuration errors; close it here
        // so no finished call stays in `created`.
        if let Err(ValidationError::Configuration(err)) = &outcome {
            if request.state() == ValidationRequestState::Created {
                warn!(
                    reference_id = %request.reference_id,
                    error = %err,
                    "failing request on configuration error"
                );
                request.fail()?;
            }
        }
        self.store.record(&request)?;

        Ok(outcome?)
    }

    /// Closes a request whose worker never returned. Terminal rows are left alone.
    pub fn fail_abandoned(&self, reference_uuid: &str) -> Result<(), AdapterError> {
        let reference_id = ReferenceId::new(reference_uuid)?;
        let Some(mut request) = self.store.get(&reference_id)? else {
            return Ok(());
        };
        if !request.state().is_terminal() {
            warn!(
                reference_id = %reference_id,
                state = %request.state(),
                "failing abandoned request"
            );
            request.fail()?;
            self.store.record(&request)?;
        }
        Ok(())
    }

    pub fn request_contents(
        &self,
        reference_uuid: &str,
    ) -> Result<Vec<ProviderExchange>, AdapterError> {
        let reference_id = ReferenceId::new(reference_uuid)?;
        Ok(self.store.contents(&reference_id)?)
    }

    pub fn request_status(
        &self,
        reference_uuid: &str,
    ) -> Result<RequestStatusResponse, AdapterError> {
        let reference_id = ReferenceId::new(reference_uuid)?;
        let request = self
            .store
            .get(&reference_id)?
            .ok_or_else(|| StoreError::NotFound {
                table: "validation_requests",
                key: reference_id.to_string(),
            })?;
        Ok(RequestStatusResponse {
            reference_uuid: request.reference_id.to_string(),
            state: request.state(),
        })
    }
}
