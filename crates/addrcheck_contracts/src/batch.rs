#![forbid(unsafe_code)]

use crate::address::AddressRecord;
use crate::{ContractViolation, SchemaVersion, Validate};

pub const BATCH_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchStrategy {
    /// Provider only returns highly confident matches.
    Strict,
}

impl MatchStrategy {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Strict => "strict",
        }
    }
}

/// Every outbound lookup carries this policy; the response shape the transformer reads depends
/// on it.
pub const BATCH_MATCH_STRATEGY: MatchStrategy = MatchStrategy::Strict;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchItem {
    /// Position in the valid-address subset; correlates request item `i` with response item `i`.
    pub index: usize,
    pub street: String,
    pub city: String,
    pub state: String,
    pub zipcode: String,
    pub match_strategy: MatchStrategy,
}

impl BatchItem {
    pub fn v1(
        index: usize,
        street: String,
        city: String,
        state: String,
        zipcode: String,
    ) -> Result<Self, ContractViolation> {
        let item = Self {
            index,
            street,
            city,
            state,
            zipcode,
            match_strategy: BATCH_MATCH_STRATEGY,
        };
        item.validate()?;
        Ok(item)
    }

    /// The address exactly as it was sent, without coordinates.
    pub fn to_address_record(&self) -> AddressRecord {
        AddressRecord::new(
            self.street.clone(),
            self.city.clone(),
            self.state.clone(),
            self.zipcode.clone(),
        )
    }
}

impl Validate for BatchItem {
    fn validate(&self) -> Result<(), ContractViolation> {
        for (field, value) in [
            ("batch_item.street", &self.street),
            ("batch_item.city", &self.city),
            ("batch_item.state", &self.state),
            ("batch_item.zipcode", &self.zipcode),
        ] {
            if value.trim().is_empty() {
                return Err(ContractViolation::InvalidValue {
                    field,
                    reason: "must not be empty",
                });
            }
        }
        if self.match_strategy != BATCH_MATCH_STRATEGY {
            return Err(ContractViolation::InvalidValue {
                field: "batch_item.match_strategy",
                reason: "must match BATCH_MATCH_STRATEGY",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRequest {
    pub schema_version: SchemaVersion,
    pub items: Vec<BatchItem>,
}

impl BatchRequest {
    pub fn v1(items: Vec<BatchItem>) -> Result<Self, ContractViolation> {
        let r = Self {
            schema_version: BATCH_CONTRACT_VERSION,
            items,
        };
        r.validate()?;
        Ok(r)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl Validate for BatchRequest {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != BATCH_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "batch_request.schema_version",
                reason: "must match BATCH_CONTRACT_VERSION",
            });
        }
        for (position, item) in self.items.iter().enumerate() {
            if item.index != position {
                return Err(ContractViolation::InvalidValue {
                    field: "batch_request.items.index",
                    reason: "must equal the item position in the batch",
                });
            }
            item.validate()?;
        }
        Ok(())
    }
}

/// Provider DPV match-confidence code.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DpvMatchCode {
    /// `Y`
    Confirmed,
    /// `N`
    NotConfirmed,
    /// `S`
    SecondaryIgnored,
    /// `D`
    SecondaryMissing,
    Other(String),
}

impl DpvMatchCode {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "Y" => Self::Confirmed,
            "N" => Self::NotConfirmed,
            "S" => Self::SecondaryIgnored,
            "D" => Self::SecondaryMissing,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_code(&self) -> &str {
        match self {
            Self::Confirmed => "Y",
            Self::NotConfirmed => "N",
            Self::SecondaryIgnored => "S",
            Self::SecondaryMissing => "D",
            Self::Other(code) => code.as_str(),
        }
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed)
    }
}

/// One provider candidate, normalized from whatever shape the provider answered with.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MatchResult {
    pub delivery_line_1: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zipcode: Option<String>,
    pub plus4_code: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub dpv_match_code: Option<DpvMatchCode>,
}

impl Validate for MatchResult {
    fn validate(&self) -> Result<(), ContractViolation> {
        if let Some(lat) = self.latitude {
            if !lat.is_finite() {
                return Err(ContractViolation::NotFinite {
                    field: "match_result.latitude",
                });
            }
            if !(-90.0..=90.0).contains(&lat) {
                return Err(ContractViolation::InvalidValue {
                    field: "match_result.latitude",
                    reason: "must be within [-90, 90]",
                });
            }
        }
        if let Some(lon) = self.longitude {
            if !lon.is_finite() {
                return Err(ContractViolation::NotFinite {
                    field: "match_result.longitude",
                });
            }
            if !(-180.0..=180.0).contains(&lon) {
                return Err(ContractViolation::InvalidValue {
                    field: "match_result.longitude",
                    reason: "must be within [-180, 180]",
                });
            }
        }
        Ok(())
    }
}

/// Raw content of one provider round trip, kept alongside the request record. Credentials are
/// never part of it: only host and path are captured from the endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderExchange {
    pub host: String,
    pub pathname: String,
    pub request_body: String,
    pub response: String,
}

/// One entry per submitted [`BatchItem`], in batch order. `None` means the provider had no
/// candidate for that lookup, which is not an error.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchResponse {
    pub schema_version: SchemaVersion,
    pub items: Vec<Option<MatchResult>>,
    /// Set by clients that talk to a real endpoint (or replay a fixture of one).
    pub exchange: Option<ProviderExchange>,
}

impl BatchResponse {
    pub fn v1(items: Vec<Option<MatchResult>>) -> Result<Self, ContractViolation> {
        let r = Self {
            schema_version: BATCH_CONTRACT_VERSION,
            items,
            exchange: None,
        };
        r.validate()?;
        Ok(r)
    }

    pub fn empty_v1() -> Self {
        Self {
            schema_version: BATCH_CONTRACT_VERSION,
            items: Vec::new(),
            exchange: None,
        }
    }

    pub fn with_exchange(mut self, exchange: ProviderExchange) -> Self {
        self.exchange = Some(exchange);
        self
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn matched_count(&self) -> usize {
        self.items.iter().filter(|item| item.is_some()).count()
    }
}

impl Validate for BatchResponse {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != BATCH_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "batch_response.schema_version",
                reason: "must match BATCH_CONTRACT_VERSION",
            });
        }
        for result in self.items.iter().flatten() {
            result.validate()?;
        }
        Ok(())
    }
}
