#![forbid(unsafe_code)]

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{ContractViolation, Validate};

pub const REFERENCE_ID_MAX_LEN: usize = 128;

/// Caller-supplied opaque token correlating an inbound validation call with its request record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReferenceId(String);

impl ReferenceId {
    pub fn new(raw: impl Into<String>) -> Result<Self, ContractViolation> {
        let id = Self(raw.into());
        id.validate()?;
        Ok(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Validate for ReferenceId {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.0.trim().is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "reference_id",
                reason: "must not be empty",
            });
        }
        if self.0.len() > REFERENCE_ID_MAX_LEN {
            return Err(ContractViolation::InvalidValue {
                field: "reference_id",
                reason: "must be <= 128 chars",
            });
        }
        if self.0.chars().any(|c| c.is_control()) {
            return Err(ContractViolation::InvalidValue {
                field: "reference_id",
                reason: "must not contain control characters",
            });
        }
        Ok(())
    }
}

impl fmt::Display for ReferenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationRequestState {
    Created,
    Requesting,
    Success,
    Failed,
}

impl ValidationRequestState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Requesting => "requesting",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

impl fmt::Display for ValidationRequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationRequestEvent {
    Start,
    Complete,
    Fail,
}

impl ValidationRequestEvent {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Complete => "complete",
            Self::Fail => "fail",
        }
    }
}

impl fmt::Display for ValidationRequestEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid state transition: cannot {event} a request in state {from}")]
pub struct StateTransitionError {
    pub from: ValidationRequestState,
    pub event: ValidationRequestEvent,
}

/// Transition table. `None` means the event is not allowed from `from`.
pub fn next_state(
    from: ValidationRequestState,
    event: ValidationRequestEvent,
) -> Option<ValidationRequestState> {
    use ValidationRequestEvent as E;
    use ValidationRequestState as S;
    match (from, event) {
        (S::Created, E::Start) => Some(S::Requesting),
        (S::Requesting, E::Complete) => Some(S::Success),
        (S::Created | S::Requesting, E::Fail) => Some(S::Failed),
        _ => None,
    }
}

/// Lifecycle of one external batch call. Only the explicit events move it forward; `success`
/// and `failed` are terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationRequest {
    pub reference_id: ReferenceId,
    state: ValidationRequestState,
}

impl ValidationRequest {
    pub fn new(reference_id: ReferenceId) -> Self {
        Self {
            reference_id,
            state: ValidationRequestState::Created,
        }
    }

    pub fn state(&self) -> ValidationRequestState {
        self.state
    }

    pub fn transition(
        &mut self,
        event: ValidationRequestEvent,
    ) -> Result<ValidationRequestState, StateTransitionError> {
        let to = next_state(self.state, event).ok_or(StateTransitionError {
            from: self.state,
            event,
        })?;
        self.state = to;
        Ok(to)
    }

    pub fn start(&mut self) -> Result<ValidationRequestState, StateTransitionError> {
        self.transition(ValidationRequestEvent::Start)
    }

    pub fn complete(&mut self) -> Result<ValidationRequestState, StateTransitionError> {
        self.transition(ValidationRequestEvent::Complete)
    }

    pub fn fail(&mut self) -> Result<ValidationRequestState, StateTransitionError> {
        self.transition(ValidationRequestEvent::Fail)
    }
}
