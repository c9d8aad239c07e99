//! Error types for context creation and acceptance.
//!
//! Two layers. [`Error`] covers a single wire format failing to parse or
//! encode; it is the currency of the codec modules. [`DistributedTraceError`]
//! is the facade-level taxonomy: everything that can make
//! `create_outbound_context` / `accept_inbound_context` refuse, including the
//! codec errors via `Malformed`.
//!
//! Nothing in this crate propagates an error past the facade boundary. The
//! facade logs and converts to an empty result; the host application never
//! sees a failure, since absent or foreign headers are an expected condition
//! on the first hop of a trace.

use thiserror::Error;

/// Error while parsing or encoding one specific wire format.
#[derive(Error, Debug, Copy, Clone)]
#[error("cannot {} {} context: {}", operation, format_name, message)]
pub struct Error {
    message: &'static str,
    /// Wire format that failed (`"traceparent"`, `"payload"`, ...).
    format_name: &'static str,
    /// `"extract"` or `"inject"`.
    operation: &'static str,
}

impl Error {
    /// Extraction failure for the named wire format.
    #[must_use]
    pub fn extract(message: &'static str, format_name: &'static str) -> Self {
        Self {
            message,
            format_name,
            operation: "extract",
        }
    }

    /// Injection failure for the named wire format.
    #[must_use]
    pub fn inject(message: &'static str, format_name: &'static str) -> Self {
        Self {
            message,
            format_name,
            operation: "inject",
        }
    }
}

/// Why the facade refused an operation.
///
/// Internal code paths return this so they stay testable without relying on
/// logged side effects; only the facade converts it to "nothing".
#[derive(Error, Debug)]
pub enum DistributedTraceError {
    /// `distributed_tracing_enabled` is off. Always a silent no-op for the
    /// caller.
    #[error("distributed tracing is disabled in configuration")]
    Disabled,

    /// No in-flight transaction to attach context to.
    #[error("no active transaction")]
    NoActiveTransaction,

    /// Empty or whitespace-only inbound payload.
    #[error("inbound payload is empty")]
    EmptyPayload,

    /// The one-shot ordering invariant was violated: a transaction may
    /// accept at most once, and only before it has emitted outbound context.
    #[error("lifecycle violation: {0}")]
    Lifecycle(&'static str),

    /// The caller's account is outside this process's trust boundary.
    #[error("payload from untrusted account {0}")]
    UntrustedAccount(String),

    /// The inbound data did not parse as the expected wire format.
    #[error(transparent)]
    Malformed(#[from] Error),
}
