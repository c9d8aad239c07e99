//! Process-wide identity supplied at agent startup.
//!
//! The account id, primary application id and trusted account key identify
//! this process to its peers and draw its trust boundary: inbound context
//! whose key matches ours is authoritative, anything else is merely
//! informative. Built once at startup and read-only thereafter.

use std::sync::Arc;

use crate::traces::propagation::trace_context::VENDOR_KEY_SUFFIX;

/// Identity of the instrumented process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentIdentity {
    pub account_id: String,
    pub primary_application_id: String,
    /// Shared across every account in the same organizational boundary.
    /// Defaults to the account id when the backend has not issued one.
    pub trusted_account_key: String,
}

impl AgentIdentity {
    #[must_use]
    pub fn new(
        account_id: impl Into<String>,
        primary_application_id: impl Into<String>,
        trusted_account_key: Option<String>,
    ) -> Self {
        let account_id = account_id.into();
        let trusted_account_key = trusted_account_key.unwrap_or_else(|| account_id.clone());
        Self {
            account_id,
            primary_application_id: primary_application_id.into(),
            trusted_account_key,
        }
    }

    /// Builds the identity from `APM_*` environment variables, as handed to
    /// the process by agent startup.
    #[must_use]
    pub fn from_env() -> Arc<Self> {
        Arc::new(Self::new(
            std::env::var("APM_ACCOUNT_ID").unwrap_or_default(),
            std::env::var("APM_PRIMARY_APPLICATION_ID").unwrap_or_default(),
            std::env::var("APM_TRUSTED_ACCOUNT_KEY").ok(),
        ))
    }

    /// This process's tracestate key: `{trusted_account_key}@apm`.
    #[must_use]
    pub(crate) fn vendor_key(&self) -> String {
        format!("{}{VENDOR_KEY_SUFFIX}", self.trusted_account_key)
    }
}
