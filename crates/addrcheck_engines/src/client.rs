#![forbid(unsafe_code)]

use addrcheck_contracts::batch::{BatchRequest, BatchResponse};

use crate::config::ProviderCredentials;

/// Whole-batch failure of the provider call. There is no per-item failure: a batch either
/// completes (with some items possibly unmatched) or fails as a unit.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExternalServiceError {
    #[error("provider transport failure: {kind}")]
    Transport { kind: &'static str },
    #[error("provider call timed out")]
    Timeout,
    #[error("provider returned http status {status}")]
    HttpStatus { status: u16 },
    #[error("provider response could not be decoded: {reason}")]
    Decode { reason: String },
    #[error("provider response does not mirror the batch: {reason}")]
    ResponseShape { reason: String },
    #[error("batch of {items} lookups exceeds the provider limit of {max}")]
    BatchTooLarge { items: usize, max: usize },
    #[error("provider call was cancelled")]
    Cancelled,
}

/// Seam to the external address-verification provider.
///
/// Implementations return exactly one response entry per request item, in request order, or a
/// single error for the whole batch.
pub trait ExternalValidationClient {
    fn send_batch(
        &self,
        credentials: &ProviderCredentials,
        request: &BatchRequest,
    ) -> Result<BatchResponse, ExternalServiceError>;
}

impl<T> ExternalValidationClient for &T
where
    T: ExternalValidationClient + ?Sized,
{
    fn send_batch(
        &self,
        credentials: &ProviderCredentials,
        request: &BatchRequest,
    ) -> Result<BatchResponse, ExternalServiceError> {
        (**self).send_batch(credentials, request)
    }
}

impl<T> ExternalValidationClient for std::sync::Arc<T>
where
    T: ExternalValidationClient + ?Sized,
{
    fn send_batch(
        &self,
        credentials: &ProviderCredentials,
        request: &BatchRequest,
    ) -> Result<BatchResponse, ExternalServiceError> {
        (**self).send_batch(credentials, request)
    }
}
