#![forbid(unsafe_code)]

use addrcheck_contracts::address::AddressRecord;
use addrcheck_contracts::batch::{BatchRequest, BatchResponse};
use addrcheck_contracts::request::{ReferenceId, ValidationRequest, ValidationRequestState};
use addrcheck_engines::client::{ExternalServiceError, ExternalValidationClient};
use addrcheck_engines::config::{ProviderCredentials, ProviderCredentialsConfig};
use addrcheck_engines::smarty::{SmartyStreetsClient, SmartyStreetsClientConfig};
use addrcheck_os::orchestrator::{AddressValidationOrchestrator, ValidationError};
use serde_json::json;

fn credentials() -> ProviderCredentialsConfig {
    ProviderCredentialsConfig::from_values(
        Some("foo".to_string()),
        Some("bar".to_string()),
        Some("us-core-cloud".to_string()),
    )
}

fn request() -> ValidationRequest {
    ValidationRequest::new(ReferenceId::new("e2e-ref").unwrap())
}

fn fixture_client(fixture: &str) -> SmartyStreetsClient {
    SmartyStreetsClient::new(SmartyStreetsClientConfig {
        response_fixture_json: Some(fixture.to_string()),
        ..SmartyStreetsClientConfig::mvp_v1()
    })
    .unwrap()
}

struct UnreachableProvider;

impl ExternalValidationClient for UnreachableProvider {
    fn send_batch(
        &self,
        _credentials: &ProviderCredentials,
        _request: &BatchRequest,
    ) -> Result<BatchResponse, ExternalServiceError> {
        Err(ExternalServiceError::Transport { kind: "connection" })
    }
}

#[test]
fn at_e2e_01_missing_and_confirmed_address() {
    let orch = AddressValidationOrchestrator::new(
        credentials(),
        fixture_client(
            r#"[{
                "input_index": 0,
                "candidate_index": 0,
                "delivery_line_1": "1 Main St",
                "components": {"city_name": "Metropolis", "state_abbreviation": "NY", "zipcode": "10001"},
                "metadata": {"latitude": 40.0, "longitude": -73.0},
                "analysis": {"dpv_match_code": "Y"}
            }]"#,
        ),
    );
    let addresses: Vec<AddressRecord> = serde_json::from_value(json!([
        {},
        {"address_line_one": "1 Main St", "city": "Metropolis", "state": "NY", "zip_code": "10001"}
    ]))
    .unwrap();

    let mut r = request();
    let out = orch.run(addresses, &mut r).unwrap();

    assert_eq!(r.state(), ValidationRequestState::Success);
    assert_eq!(
        serde_json::to_value(&out).unwrap(),
        json!([
            {"valid": false, "additional_info": "Address was missing a required field"},
            {
                "address_line_one": "1 Main St",
                "city": "Metropolis",
                "state": "NY",
                "zip_code": "10001",
                "latitude": 40.0,
                "longitude": -73.0,
                "valid": true,
                "additional_info": "Confirmed; entire address is present in the USPS data."
            }
        ])
    );
}

#[test]
fn at_e2e_02_connectivity_failure_fails_request_without_results() {
    let orch = AddressValidationOrchestrator::new(credentials(), UnreachableProvider);
    let mut r = request();
    let out = orch.run(
        vec![AddressRecord::new("1 Main St", "Metropolis", "NY", "10001")],
        &mut r,
    );
    assert_eq!(r.state(), ValidationRequestState::Failed);
    match out {
        Err(ValidationError::ExternalService(err)) => {
            assert_eq!(err, ExternalServiceError::Transport { kind: "connection" })
        }
        other => panic!("expected external service error, got {other:?}"),
    }
}

#[test]
fn at_e2e_03_mixed_batch_keeps_every_address() {
    let orch = AddressValidationOrchestrator::new(
        credentials(),
        fixture_client(
            r#"[
                {"input_index": 2, "metadata": {"latitude": 1.0, "longitude": 2.0}, "analysis": {"dpv_match_code": "S"}},
                {"input_index": 0, "metadata": {"latitude": 3.0, "longitude": 4.0}, "analysis": {"dpv_match_code": "N"}}
            ]"#,
        ),
    );
    let addresses = vec![
        AddressRecord::new("a", "foo", "BA", "91210"),
        AddressRecord::default(),
        AddressRecord::new("b", "foo", "BA", "91210"),
        AddressRecord::new("c", "foo", "BA", "91210"),
        AddressRecord {
            city: Some("foo".to_string()),
            ..AddressRecord::default()
        },
    ];
    let mut r = request();
    let out = orch.run(addresses, &mut r).unwrap();

    assert_eq!(out.len(), 5);
    let lines: Vec<Option<&str>> = out
        .iter()
        .map(|a| a.address.address_line_one.as_deref())
        .collect();
    assert_eq!(lines, vec![None, None, Some("a"), Some("b"), Some("c")]);
    assert!(out.iter().all(|a| !a.valid));
    assert!(out[2].additional_info.starts_with("Not confirmed"));
    assert_eq!(
        out[3].additional_info,
        "API returned no result for this address"
    );
    assert!(out[4]
        .additional_info
        .starts_with("Confirmed by ignoring secondary info"));
}
