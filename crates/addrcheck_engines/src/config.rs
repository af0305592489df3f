#![forbid(unsafe_code)]

use std::env;
use std::fmt;

use tracing::{error, info};

pub const ENV_AUTH_ID: &str = "SMARTY_STREETS_AUTH_ID";
pub const ENV_AUTH_TOKEN: &str = "SMARTY_STREETS_AUTH_TOKEN";
pub const ENV_LICENCES: &str = "SMARTY_STREETS_LICENCES";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("Could not find auth ID or auth token")]
    MissingCredentials,
    #[error("invalid setting {key}: {reason}")]
    InvalidSetting { key: &'static str, reason: String },
}

/// Provider credentials as configured, before resolution. Built once per process and handed to
/// the orchestrator.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ProviderCredentialsConfig {
    pub auth_id: Option<String>,
    pub auth_token: Option<String>,
    pub licenses: Vec<String>,
}

impl ProviderCredentialsConfig {
    pub fn from_env() -> Self {
        Self::from_values(
            env::var(ENV_AUTH_ID).ok(),
            env::var(ENV_AUTH_TOKEN).ok(),
            env::var(ENV_LICENCES).ok(),
        )
    }

    /// `licenses_raw` is a comma-separated list; blank entries are dropped.
    pub fn from_values(
        auth_id: Option<String>,
        auth_token: Option<String>,
        licenses_raw: Option<String>,
    ) -> Self {
        Self {
            auth_id: auth_id.and_then(trim_non_empty),
            auth_token: auth_token.and_then(trim_non_empty),
            licenses: licenses_raw
                .as_deref()
                .map(split_licenses)
                .unwrap_or_default(),
        }
    }

    pub fn resolve(&self) -> Result<ProviderCredentials, ConfigurationError> {
        let auth_id = self.auth_id.clone().and_then(trim_non_empty);
        let auth_token = self.auth_token.clone().and_then(trim_non_empty);
        match (auth_id, auth_token) {
            (Some(auth_id), Some(auth_token)) => {
                info!(licenses = self.licenses.len(), "provider credentials resolved");
                Ok(ProviderCredentials {
                    auth_id,
                    auth_token,
                    licenses: self.licenses.clone(),
                })
            }
            (auth_id, auth_token) => {
                error!(
                    auth_id_present = auth_id.is_some(),
                    auth_token_present = auth_token.is_some(),
                    "Could not find auth ID or auth token"
                );
                Err(ConfigurationError::MissingCredentials)
            }
        }
    }
}

impl fmt::Debug for ProviderCredentialsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderCredentialsConfig")
            .field("auth_id", &self.auth_id)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .field("licenses", &self.licenses)
            .finish()
    }
}

/// Resolved id/token pair plus license list, ready to attach to a provider call.
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderCredentials {
    auth_id: String,
    auth_token: String,
    licenses: Vec<String>,
}

impl ProviderCredentials {
    pub fn auth_id(&self) -> &str {
        &self.auth_id
    }

    pub fn auth_token(&self) -> &str {
        &self.auth_token
    }

    pub fn licenses(&self) -> &[String] {
        &self.licenses
    }
}

impl fmt::Debug for ProviderCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderCredentials")
            .field("auth_id", &self.auth_id)
            .field("auth_token", &"<redacted>")
            .field("licenses", &self.licenses)
            .finish()
    }
}

pub(crate) fn trim_non_empty(raw: String) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn split_licenses(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}
