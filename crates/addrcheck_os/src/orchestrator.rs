#![forbid(unsafe_code)]

use addrcheck_contracts::address::{AddressRecord, AnnotatedAddress};
use addrcheck_contracts::batch::{BatchItem, ProviderExchange};
use addrcheck_contracts::request::{
    StateTransitionError, ValidationRequest, ValidationRequestEvent, ValidationRequestState,
};
use addrcheck_contracts::ContractViolation;
use addrcheck_engines::batch_builder::build_batch;
use addrcheck_engines::cache_key::{cache_key_digest_hex, derive_cache_key};
use addrcheck_engines::client::{ExternalServiceError, ExternalValidationClient};
use addrcheck_engines::config::{ConfigurationError, ProviderCredentialsConfig};
use addrcheck_engines::partition::{partition, PartitionedAddresses};
use addrcheck_engines::transform::transform;
use tracing::{debug, error, info};

use crate::cancellation::CancellationSignal;

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    ExternalService(#[from] ExternalServiceError),
    /// Sequencing bug; never retried.
    #[error(transparent)]
    StateTransition(#[from] StateTransitionError),
    #[error(transparent)]
    Contract(#[from] ContractViolation),
}

/// Sees the request at every transition, and the raw provider exchange, while the run is still
/// in progress.
pub trait RequestObserver {
    fn state_changed(&self, request: &ValidationRequest);

    fn exchange_recorded(&self, _request: &ValidationRequest, _exchange: &ProviderExchange) {}
}

impl RequestObserver for () {
    fn state_changed(&self, _request: &ValidationRequest) {}
}

/// Runs one inbound batch end to end: partition, build, call the provider once, annotate.
#[derive(Debug)]
pub struct AddressValidationOrchestrator<C>
where
    C: ExternalValidationClient,
{
    credentials: ProviderCredentialsConfig,
    client: C,
}

impl<C> AddressValidationOrchestrator<C>
where
    C: ExternalValidationClient,
{
    pub fn new(credentials: ProviderCredentialsConfig, client: C) -> Self {
        Self {
            credentials,
            client,
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn run(
        &self,
        addresses: Vec<AddressRecord>,
        request: &mut ValidationRequest,
    ) -> Result<Vec<AnnotatedAddress>, ValidationError> {
        self.run_observed(addresses, request, &CancellationSignal::new(), &())
    }

    pub fn run_with_cancellation(
        &self,
        addresses: Vec<AddressRecord>,
        request: &mut ValidationRequest,
        cancel: &CancellationSignal,
    ) -> Result<Vec<AnnotatedAddress>, ValidationError> {
        self.run_observed(addresses, request, cancel, &())
    }

    /// Credentials are resolved before `request` is touched, so a configuration failure leaves it
    /// in `created`. Every other failure after that point drives it to `failed`.
    pub fn run_observed(
        &self,
        addresses: Vec<AddressRecord>,
        request: &mut ValidationRequest,
        cancel: &CancellationSignal,
        observer: &dyn RequestObserver,
    ) -> Result<Vec<AnnotatedAddress>, ValidationError> {
        let credentials = self.credentials.resolve()?;

        let PartitionedAddresses { valid, invalid } = partition(addresses);
        let batch = match build_batch(&valid) {
            Ok(batch) => batch,
            Err(violation) => {
                advance(request, ValidationRequestEvent::Fail, observer)?;
                return Err(violation.into());
            }
        };
        debug!(
            reference_id = %request.reference_id,
            valid = valid.len(),
            invalid = invalid.len(),
            batch_key = %cache_key_digest_hex(&derive_cache_key(&valid)),
            "batch built"
        );

        if cancel.is_cancelled() {
            return fail_request(request, observer, ExternalServiceError::Cancelled);
        }

        advance(request, ValidationRequestEvent::Start, observer)?;
        info!(
            reference_id = %request.reference_id,
            lookups = batch.len(),
            "dispatching address batch"
        );

        let response = self
            .client
            .send_batch(&credentials, &batch)
            .and_then(|response| {
                if let Some(exchange) = &response.exchange {
                    observer.exchange_recorded(request, exchange);
                }
                if cancel.is_cancelled() {
                    return Err(ExternalServiceError::Cancelled);
                }
                if response.len() != batch.len() {
                    return Err(ExternalServiceError::ResponseShape {
                        reason: format!(
                            "expected {} entries, got {}",
                            batch.len(),
                            response.len()
                        ),
                    });
                }
                Ok(response)
            });
        let response = match response {
            Ok(response) => response,
            Err(err) => {
                error!(reference_id = %request.reference_id, error = %err, "address batch failed");
                return fail_request(request, observer, err);
            }
        };

        advance(request, ValidationRequestEvent::Complete, observer)?;

        let matched = response.matched_count();
        let response_items = batch
            .items
            .iter()
            .map(BatchItem::to_address_record)
            .zip(response.items)
            .collect();
        let results = transform(invalid, response_items);
        info!(
            reference_id = %request.reference_id,
            results = results.len(),
            matched,
            "address batch validated"
        );
        Ok(results)
    }
}

fn advance(
    request: &mut ValidationRequest,
    event: ValidationRequestEvent,
    observer: &dyn RequestObserver,
) -> Result<ValidationRequestState, StateTransitionError> {
    let state = request.transition(event)?;
    debug!(reference_id = %request.reference_id, %event, %state, "request transitioned");
    observer.state_changed(request);
    Ok(state)
}

fn fail_request(
    request: &mut ValidationRequest,
    observer: &dyn RequestObserver,
    err: ExternalServiceError,
) -> Result<Vec<AnnotatedAddress>, ValidationError> {
    advance(request, ValidationRequestEvent::Fail, observer)?;
    Err(err.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use addrcheck_contracts::batch::{
        BatchRequest, BatchResponse, DpvMatchCode, MatchResult, MatchStrategy,
    };
    use addrcheck_contracts::request::ReferenceId;
    use addrcheck_engines::config::ProviderCredentials;
    use addrcheck_engines::transform::{MISSING_FIELD_INFO, NO_RESULT_INFO};
    use std::cell::RefCell;

    struct StubClient {
        out: Result<BatchResponse, ExternalServiceError>,
        sent: RefCell<Vec<BatchRequest>>,
        cancel_during_call: Option<CancellationSignal>,
    }

    impl StubClient {
        fn returning(out: Result<BatchResponse, ExternalServiceError>) -> Self {
            Self {
                out,
                sent: RefCell::new(Vec::new()),
                cancel_during_call: None,
            }
        }

        fn calls(&self) -> usize {
            self.sent.borrow().len()
        }
    }

    impl ExternalValidationClient for StubClient {
        fn send_batch(
            &self,
            _credentials: &ProviderCredentials,
            request: &BatchRequest,
        ) -> Result<BatchResponse, ExternalServiceError> {
            self.sent.borrow_mut().push(request.clone());
            if let Some(signal) = &self.cancel_during_call {
                signal.cancel();
            }
            self.out.clone()
        }
    }

    fn credentials() -> ProviderCredentialsConfig {
        ProviderCredentialsConfig::from_values(
            Some("foo".to_string()),
            Some("bar".to_string()),
            None,
        )
    }

    fn response(items: Vec<Option<MatchResult>>) -> Result<BatchResponse, ExternalServiceError> {
        Ok(BatchResponse::v1(items).unwrap())
    }

    fn request() -> ValidationRequest {
        ValidationRequest::new(ReferenceId::new("8675309").unwrap())
    }

    fn valid(line: &str) -> AddressRecord {
        AddressRecord::new(line, "foo", "BA", "91210")
    }

    fn confirmed() -> MatchResult {
        MatchResult {
            latitude: Some(30.0),
            longitude: Some(30.0),
            dpv_match_code: Some(DpvMatchCode::Confirmed),
            ..MatchResult::default()
        }
    }

    #[test]
    fn at_orch_01_missing_credentials_fail_fast_without_touching_request() {
        let client = StubClient::returning(Ok(BatchResponse::empty_v1()));
        let orch = AddressValidationOrchestrator::new(ProviderCredentialsConfig::default(), &client);
        let mut r = request();
        let out = orch.run(vec![valid("foo")], &mut r);
        assert!(matches!(
            out,
            Err(ValidationError::Configuration(ConfigurationError::MissingCredentials))
        ));
        assert_eq!(r.state(), ValidationRequestState::Created);
        assert_eq!(client.calls(), 0);
    }

    #[test]
    fn at_orch_02_success_merges_invalid_then_results() {
        let client = StubClient::returning(response(vec![Some(confirmed()), None]));
        let orch = AddressValidationOrchestrator::new(credentials(), &client);
        let mut r = request();
        let out = orch
            .run(
                vec![AddressRecord::default(), valid("foo1"), valid("foo2")],
                &mut r,
            )
            .unwrap();
        assert_eq!(r.state(), ValidationRequestState::Success);
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].additional_info, MISSING_FIELD_INFO);
        assert!(out[1].valid);
        assert_eq!(out[1].address.address_line_one.as_deref(), Some("foo1"));
        assert_eq!(out[1].address.latitude, Some(30.0));
        assert_eq!(out[2].additional_info, NO_RESULT_INFO);

        let sent = client.sent.borrow();
        assert_eq!(sent.len(), 1);
        let streets: Vec<&str> = sent[0].items.iter().map(|i| i.street.as_str()).collect();
        assert_eq!(streets, vec!["foo1", "foo2"]);
        assert!(sent[0]
            .items
            .iter()
            .all(|i| i.match_strategy == MatchStrategy::Strict));
    }

    #[test]
    fn at_orch_03_provider_failure_fails_request_and_returns_no_results() {
        let client = StubClient::returning(Err(ExternalServiceError::Transport {
            kind: "connection",
        }));
        let orch = AddressValidationOrchestrator::new(credentials(), &client);
        let mut r = request();
        let out = orch.run(vec![valid("foo")], &mut r);
        assert!(matches!(
            out,
            Err(ValidationError::ExternalService(ExternalServiceError::Transport {
                kind: "connection"
            }))
        ));
        assert_eq!(r.state(), ValidationRequestState::Failed);
    }

    #[test]
    fn at_orch_04_response_length_drift_fails_closed() {
        let client = StubClient::returning(response(vec![None]));
        let orch = AddressValidationOrchestrator::new(credentials(), &client);
        let mut r = request();
        let out = orch.run(vec![valid("a"), valid("b")], &mut r);
        assert!(matches!(
            out,
            Err(ValidationError::ExternalService(
                ExternalServiceError::ResponseShape { .. }
            ))
        ));
        assert_eq!(r.state(), ValidationRequestState::Failed);
    }

    #[test]
    fn at_orch_05_cancel_before_start_skips_provider() {
        let client = StubClient::returning(response(vec![None]));
        let orch = AddressValidationOrchestrator::new(credentials(), &client);
        let cancel = CancellationSignal::new();
        cancel.cancel();
        let mut r = request();
        let out = orch.run_with_cancellation(vec![valid("a")], &mut r, &cancel);
        assert!(matches!(
            out,
            Err(ValidationError::ExternalService(ExternalServiceError::Cancelled))
        ));
        assert_eq!(r.state(), ValidationRequestState::Failed);
        assert_eq!(client.calls(), 0);
    }

    #[test]
    fn at_orch_06_cancel_during_call_discards_response() {
        let cancel = CancellationSignal::new();
        let client = StubClient {
            cancel_during_call: Some(cancel.clone()),
            ..StubClient::returning(response(vec![Some(confirmed())]))
        };
        let orch = AddressValidationOrchestrator::new(credentials(), &client);
        let mut r = request();
        let out = orch.run_with_cancellation(vec![valid("a")], &mut r, &cancel);
        assert!(matches!(
            out,
            Err(ValidationError::ExternalService(ExternalServiceError::Cancelled))
        ));
        assert_eq!(r.state(), ValidationRequestState::Failed);
        assert_eq!(client.calls(), 1);
    }

    #[test]
    fn at_orch_07_reused_request_is_state_transition_error() {
        let client = StubClient::returning(response(vec![None]));
        let orch = AddressValidationOrchestrator::new(credentials(), &client);
        let mut r = request();
        orch.run(vec![valid("a")], &mut r).unwrap();
        let again = orch.run(vec![valid("a")], &mut r);
        assert!(matches!(again, Err(ValidationError::StateTransition(_))));
        assert_eq!(r.state(), ValidationRequestState::Success);
        assert_eq!(client.calls(), 1);
    }

    #[test]
    fn at_orch_08_all_invalid_still_completes_with_empty_batch() {
        let client = StubClient::returning(Ok(BatchResponse::empty_v1()));
        let orch = AddressValidationOrchestrator::new(credentials(), &client);
        let mut r = request();
        let out = orch
            .run(vec![AddressRecord::default(), AddressRecord::default()], &mut r)
            .unwrap();
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|a| !a.valid));
        assert_eq!(r.state(), ValidationRequestState::Success);
        assert!(client.sent.borrow()[0].is_empty());
    }

    #[derive(Default)]
    struct RecordingObserver {
        states: RefCell<Vec<ValidationRequestState>>,
        exchanges: RefCell<Vec<ProviderExchange>>,
    }

    impl RequestObserver for RecordingObserver {
        fn state_changed(&self, request: &ValidationRequest) {
            self.states.borrow_mut().push(request.state());
        }

        fn exchange_recorded(&self, _request: &ValidationRequest, exchange: &ProviderExchange) {
            self.exchanges.borrow_mut().push(exchange.clone());
        }
    }

    fn exchange() -> ProviderExchange {
        ProviderExchange {
            host: "us-street.api.smartystreets.com".to_string(),
            pathname: "/street-address".to_string(),
            request_body: "[]".to_string(),
            response: "[]".to_string(),
        }
    }

    #[test]
    fn at_orch_09_observer_sees_each_transition_and_the_exchange() {
        let client = StubClient::returning(
            response(vec![Some(confirmed())]).map(|r| r.with_exchange(exchange())),
        );
        let orch = AddressValidationOrchestrator::new(credentials(), &client);
        let observer = RecordingObserver::default();
        let mut r = request();
        let cancel = CancellationSignal::new();
        orch.run_observed(vec![valid("a")], &mut r, &cancel, &observer)
            .unwrap();
        assert_eq!(
            *observer.states.borrow(),
            vec![ValidationRequestState::Requesting, ValidationRequestState::Success]
        );
        assert_eq!(*observer.exchanges.borrow(), vec![exchange()]);
    }

    #[test]
    fn at_orch_10_cancel_during_failing_call_still_fails_request() {
        let cancel = CancellationSignal::new();
        let client = StubClient {
            cancel_during_call: Some(cancel.clone()),
            ..StubClient::returning(Err(ExternalServiceError::Timeout))
        };
        let orch = AddressValidationOrchestrator::new(credentials(), &client);
        let observer = RecordingObserver::default();
        let mut r = request();
        let out = orch.run_observed(vec![valid("a")], &mut r, &cancel, &observer);
        assert!(matches!(
            out,
            Err(ValidationError::ExternalService(ExternalServiceError::Timeout))
        ));
        assert_eq!(r.state(), ValidationRequestState::Failed);
        assert_eq!(
            *observer.states.borrow(),
            vec![ValidationRequestState::Requesting, ValidationRequestState::Failed]
        );
        assert!(observer.exchanges.borrow().is_empty());
    }

    #[test]
    fn at_orch_11_cancel_before_start_reports_only_failed() {
        let client = StubClient::returning(response(vec![None]));
        let orch = AddressValidationOrchestrator::new(credentials(), &client);
        let cancel = CancellationSignal::new();
        cancel.cancel();
        let observer = RecordingObserver::default();
        let mut r = request();
        let _ = orch.run_observed(vec![valid("a")], &mut r, &cancel, &observer);
        assert_eq!(*observer.states.borrow(), vec![ValidationRequestState::Failed]);
    }
}
