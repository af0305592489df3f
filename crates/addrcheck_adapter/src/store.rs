#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use addrcheck_contracts::batch::ProviderExchange;
use addrcheck_contracts::request::{ReferenceId, ValidationRequest};

const VALIDATION_REQUESTS_TABLE: &str = "validation_requests";
const VALIDATION_REQUEST_CONTENTS_TABLE: &str = "validation_request_contents";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("duplicate key in {table}: {key}")]
    DuplicateKey { table: &'static str, key: String },
    #[error("no row in {table} for key {key}")]
    NotFound { table: &'static str, key: String },
    #[error("request store lock poisoned")]
    LockPoisoned,
}

/// Request-record boundary. Rows are created once, then rewritten at every state transition;
/// content rows hang off an existing request row.
pub trait ValidationRequestStore: Send + Sync {
    fn create(&self, reference_id: ReferenceId) -> Result<ValidationRequest, StoreError>;
    fn get(&self, reference_id: &ReferenceId) -> Result<Option<ValidationRequest>, StoreError>;
    fn record(&self, request: &ValidationRequest) -> Result<(), StoreError>;
    fn record_content(
        &self,
        reference_id: &ReferenceId,
        content: ProviderExchange,
    ) -> Result<(), StoreError>;
    fn contents(&self, reference_id: &ReferenceId) -> Result<Vec<ProviderExchange>, StoreError>;
}

#[derive(Debug, Default)]
struct Tables {
    requests: BTreeMap<ReferenceId, ValidationRequest>,
    contents: BTreeMap<ReferenceId, Vec<ProviderExchange>>,
}

/// Process-local registry keyed by reference id. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct InMemoryValidationRequestStore {
    tables: Mutex<Tables>,
}

impl InMemoryValidationRequestStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

fn missing_request(reference_id: &ReferenceId) -> StoreError {
    StoreError::NotFound {
        table: VALIDATION_REQUESTS_TABLE,
        key: reference_id.to_string(),
    }
}

impl ValidationRequestStore for InMemoryValidationRequestStore {
    fn create(&self, reference_id: ReferenceId) -> Result<ValidationRequest, StoreError> {
        let mut tables = self.lock()?;
        if tables.requests.contains_key(&reference_id) {
            return Err(StoreError::DuplicateKey {
                table: VALIDATION_REQUESTS_TABLE,
                key: reference_id.to_string(),
            });
        }
        let request = ValidationRequest::new(reference_id.clone());
        tables.requests.insert(reference_id, request.clone());
        Ok(request)
    }

    fn get(&self, reference_id: &ReferenceId) -> Result<Option<ValidationRequest>, StoreError> {
        Ok(self.lock()?.requests.get(reference_id).cloned())
    }

    fn record(&self, request: &ValidationRequest) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        let row = tables
            .requests
            .get_mut(&request.reference_id)
            .ok_or_else(|| missing_request(&request.reference_id))?;
        *row = request.clone();
        Ok(())
    }

    fn record_content(
        &self,
        reference_id: &ReferenceId,
        content: ProviderExchange,
    ) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        if !tables.requests.contains_key(reference_id) {
            return Err(missing_request(reference_id));
        }
        tables
            .contents
            .entry(reference_id.clone())
            .or_default()
            .push(content);
        Ok(())
    }

    fn contents(&self, reference_id: &ReferenceId) -> Result<Vec<ProviderExchange>, StoreError> {
        let tables = self.lock()?;
        if !tables.requests.contains_key(reference_id) {
            return Err(StoreError::NotFound {
                table: VALIDATION_REQUEST_CONTENTS_TABLE,
                key: reference_id.to_string(),
            });
        }
        Ok(tables
            .contents
            .get(reference_id)
            .cloned()
            .unwrap_or_default())
    }
}
