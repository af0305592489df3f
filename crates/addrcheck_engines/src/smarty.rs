#![forbid(unsafe_code)]

use std::env;
use std::time::Duration;

use addrcheck_contracts::batch::{
    BatchRequest, BatchResponse, DpvMatchCode, MatchResult, ProviderExchange,
};
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::client::{ExternalServiceError, ExternalValidationClient};
use crate::config::{trim_non_empty, ConfigurationError, ProviderCredentials};

pub const ENV_ENDPOINT_URL: &str = "SMARTY_STREETS_URL";
pub const ENV_TIMEOUT_MS: &str = "ADDRCHECK_PROVIDER_TIMEOUT_MS";
pub const ENV_USER_AGENT: &str = "ADDRCHECK_HTTP_USER_AGENT";

pub const DEFAULT_ENDPOINT_URL: &str = "https://us-street.api.smartystreets.com/street-address";
pub const DEFAULT_TIMEOUT_MS: u32 = 10_000;
pub const DEFAULT_USER_AGENT: &str = "addrcheck/0.1";

/// Provider-side cap on lookups per batch POST.
pub const MAX_BATCH_LOOKUPS: usize = 100;
const LOOKUP_CANDIDATES: u8 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmartyStreetsClientConfig {
    pub endpoint_url: String,
    pub timeout_ms: u32,
    pub user_agent: String,
    /// Raw provider response body used instead of a live call.
    pub response_fixture_json: Option<String>,
}

impl SmartyStreetsClientConfig {
    pub fn mvp_v1() -> Self {
        Self {
            endpoint_url: DEFAULT_ENDPOINT_URL.to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            response_fixture_json: None,
        }
    }

    pub fn from_env() -> Result<Self, ConfigurationError> {
        let timeout_ms = match env::var(ENV_TIMEOUT_MS).ok().and_then(trim_non_empty) {
            Some(raw) => raw
                .parse::<u32>()
                .map_err(|_| ConfigurationError::InvalidSetting {
                    key: ENV_TIMEOUT_MS,
                    reason: format!("expected milliseconds, got {raw:?}"),
                })?,
            None => DEFAULT_TIMEOUT_MS,
        };
        Ok(Self {
            endpoint_url: env::var(ENV_ENDPOINT_URL)
                .ok()
                .and_then(trim_non_empty)
                .unwrap_or_else(|| DEFAULT_ENDPOINT_URL.to_string()),
            timeout_ms,
            user_agent: env::var(ENV_USER_AGENT)
                .ok()
                .and_then(trim_non_empty)
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            response_fixture_json: None,
        })
    }
}

/// Blocking HTTP client for the SmartyStreets US Street batch endpoint.
#[derive(Debug)]
pub struct SmartyStreetsClient {
    config: SmartyStreetsClientConfig,
    endpoint: Url,
    agent: ureq::Agent,
}

impl SmartyStreetsClient {
    pub fn new(config: SmartyStreetsClientConfig) -> Result<Self, ConfigurationError> {
        if config.timeout_ms == 0 {
            return Err(ConfigurationError::InvalidSetting {
                key: ENV_TIMEOUT_MS,
                reason: "must be > 0".to_string(),
            });
        }
        let endpoint =
            Url::parse(&config.endpoint_url).map_err(|e| ConfigurationError::InvalidSetting {
                key: ENV_ENDPOINT_URL,
                reason: e.to_string(),
            })?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(ConfigurationError::InvalidSetting {
                key: ENV_ENDPOINT_URL,
                reason: "scheme must be http or https".to_string(),
            });
        }
        let timeout = Duration::from_millis(u64::from(config.timeout_ms));
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout(timeout)
            .user_agent(&config.user_agent)
            .build();
        Ok(Self {
            config,
            endpoint,
            agent,
        })
    }

    fn request_url(&self, credentials: &ProviderCredentials) -> Url {
        let mut url = self.endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("auth-id", credentials.auth_id());
            query.append_pair("auth-token", credentials.auth_token());
            if !credentials.licenses().is_empty() {
                query.append_pair("license", &credentials.licenses().join(","));
            }
        }
        url
    }

    fn post_batch(
        &self,
        credentials: &ProviderCredentials,
        request_body: &str,
    ) -> Result<String, ExternalServiceError> {
        let url = self.request_url(credentials);
        let response = self
            .agent
            .post(url.as_str())
            .set("Content-Type", "application/json; charset=utf-8")
            .set("Accept", "application/json")
            .send_string(request_body)
            .map_err(provider_error_from_ureq)?;
        response
            .into_string()
            .map_err(|e| ExternalServiceError::Decode {
                reason: e.to_string(),
            })
    }

    fn exchange(&self, request_body: String, response: String) -> ProviderExchange {
        ProviderExchange {
            host: self.endpoint.host_str().unwrap_or_default().to_string(),
            pathname: self.endpoint.path().to_string(),
            request_body,
            response,
        }
    }
}

impl ExternalValidationClient for SmartyStreetsClient {
    fn send_batch(
        &self,
        credentials: &ProviderCredentials,
        request: &BatchRequest,
    ) -> Result<BatchResponse, ExternalServiceError> {
        if request.is_empty() {
            debug!("empty batch, provider not called");
            return Ok(BatchResponse::empty_v1());
        }
        if request.len() > MAX_BATCH_LOOKUPS {
            return Err(ExternalServiceError::BatchTooLarge {
                items: request.len(),
                max: MAX_BATCH_LOOKUPS,
            });
        }

        let request_body = lookups_payload(request).to_string();
        let raw = match self.config.response_fixture_json.as_deref() {
            Some(fixture) => fixture.to_string(),
            None => {
                info!(
                    host = self.endpoint.host_str().unwrap_or_default(),
                    lookups = request.len(),
                    "sending batch to provider"
                );
                self.post_batch(credentials, &request_body).map_err(|err| {
                    error!(error = %err, "provider batch call failed");
                    err
                })?
            }
        };
        let body: Value = serde_json::from_str(&raw).map_err(|e| ExternalServiceError::Decode {
            reason: e.to_string(),
        })?;
        let response = normalize_candidates(&body, request.len())?;
        Ok(response.with_exchange(self.exchange(request_body, raw)))
    }
}

fn lookups_payload(request: &BatchRequest) -> Value {
    Value::Array(
        request
            .items
            .iter()
            .map(|item| {
                json!({
                    "input_id": item.index.to_string(),
                    "street": item.street,
                    "city": item.city,
                    "state": item.state,
                    "zipcode": item.zipcode,
                    "candidates": LOOKUP_CANDIDATES,
                    "match": item.match_strategy.as_str(),
                })
            })
            .collect(),
    )
}

/// The provider answers with a flat candidate list keyed by `input_index`, omitting lookups it
/// could not match. Fold that back into one slot per lookup; the first candidate wins.
fn normalize_candidates(body: &Value, lookups: usize) -> Result<BatchResponse, ExternalServiceError> {
    let candidates = body
        .as_array()
        .ok_or_else(|| ExternalServiceError::Decode {
            reason: "expected a JSON array of candidates".to_string(),
        })?;

    let mut items: Vec<Option<MatchResult>> = vec![None; lookups];
    for candidate in candidates {
        let index = candidate
            .get("input_index")
            .and_then(Value::as_u64)
            .and_then(|i| usize::try_from(i).ok())
            .ok_or_else(|| ExternalServiceError::ResponseShape {
                reason: "candidate is missing input_index".to_string(),
            })?;
        let slot = items
            .get_mut(index)
            .ok_or_else(|| ExternalServiceError::ResponseShape {
                reason: format!("input_index {index} outside batch of {lookups}"),
            })?;
        if slot.is_none() {
            *slot = Some(match_result_from_candidate(candidate));
        }
    }

    BatchResponse::v1(items).map_err(|violation| ExternalServiceError::Decode {
        reason: violation.to_string(),
    })
}

fn match_result_from_candidate(candidate: &Value) -> MatchResult {
    let text = |pointer: &str| {
        candidate
            .pointer(pointer)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };
    MatchResult {
        delivery_line_1: text("/delivery_line_1"),
        city: text("/components/city_name"),
        state: text("/components/state_abbreviation"),
        zipcode: text("/components/zipcode"),
        plus4_code: text("/components/plus4_code"),
        latitude: coordinate(candidate, "/metadata/latitude", 90.0),
        longitude: coordinate(candidate, "/metadata/longitude", 180.0),
        dpv_match_code: text("/analysis/dpv_match_code").map(|code| DpvMatchCode::parse(&code)),
    }
}

/// Out-of-range coordinates only cost that candidate its location, never the batch.
fn coordinate(candidate: &Value, pointer: &str, bound: f64) -> Option<f64> {
    let value = candidate.pointer(pointer)?.as_f64()?;
    if value.is_finite() && (-bound..=bound).contains(&value) {
        Some(value)
    } else {
        warn!(
            input_index = candidate.get("input_index").and_then(serde_json::Value::as_u64),
            field = pointer,
            value,
            "dropping out-of-range coordinate"
        );
        None
    }
}

fn provider_error_from_ureq(err: ureq::Error) -> ExternalServiceError {
    let transport = match err {
        ureq::Error::Status(status, _) => return ExternalServiceError::HttpStatus { status },
        ureq::Error::Transport(transport) => transport,
    };
    if is_timeout(&transport) {
        return ExternalServiceError::Timeout;
    }
    let kind = match transport.kind() {
        ureq::ErrorKind::Dns => "dns",
        ureq::ErrorKind::ConnectionFailed
        | ureq::ErrorKind::ProxyConnect
        | ureq::ErrorKind::ProxyUnauthorized => "connection",
        ureq::ErrorKind::InvalidUrl | ureq::ErrorKind::UnknownScheme => "endpoint",
        ureq::ErrorKind::Io => "io",
        _ => "transport",
    };
    ExternalServiceError::Transport { kind }
}

// ureq reports connect and read timeouts as io errors wrapped in the transport error.
fn is_timeout(transport: &ureq::Transport) -> bool {
    let io_timeout = std::error::Error::source(transport)
        .and_then(|source| source.downcast_ref::<std::io::Error>())
        .is_some_and(|io| {
            matches!(
                io.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
            )
        });
    io_timeout || transport.to_string().contains("timed out")
}
