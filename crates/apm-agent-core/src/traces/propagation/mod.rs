//! Wire formats for distributed trace context.
//!
//! Three coexisting formats, all semantically anchored on
//! [`TraceIdentity`](crate::traces::context::TraceIdentity):
//!
//! - [`payload`]: the primary versioned vendor envelope (JSON, optionally
//!   base64-armored for headers).
//! - [`trace_context`]: the multi-vendor `traceparent`/`tracestate` header
//!   pair; interchangeable with the vendor envelope, plus byte-for-byte
//!   passthrough of other vendors' state.
//! - [`cross_app`]: the legacy single-vendor envelope kept for older peers;
//!   identifiers and timing only.
//!
//! Headers are read and written through the [`carrier`] traits so the codecs
//! never bind to a particular transport. All parse failures surface as
//! [`error::Error`] values; nothing in this tree panics on wire data.
//!
//! # Outbound handles
//!
//! [`OutboundContext`] is the one-per-request-leg value object handed to
//! instrumentation. It is immutable once built and each serialization is
//! side-effect free, so one handle may be rendered into several headers
//! (e.g. once for the legacy format, once for the standard headers).

use crate::traces::context::TraceIdentity;

pub mod carrier;
pub mod cross_app;
pub mod error;
pub mod payload;
pub mod trace_context;

/// An outbound context, ready to serialize into any configured wire format.
///
/// Built from the owning transaction's tracer state plus the process
/// identity. Never mutated after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundContext {
    identity: TraceIdentity,
    trusted_account_key: String,
    /// Foreign tracestate entries accepted earlier on this transaction,
    /// re-emitted unchanged when this process is an intermediate hop.
    foreign_tracestate: Vec<String>,
}

impl OutboundContext {
    pub(crate) fn new(
        identity: TraceIdentity,
        trusted_account_key: String,
        foreign_tracestate: Vec<String>,
    ) -> Self {
        Self {
            identity,
            trusted_account_key,
            foreign_tracestate,
        }
    }

    /// The identity this context propagates.
    #[must_use]
    pub fn identity(&self) -> &TraceIdentity {
        &self.identity
    }

    pub(crate) fn trusted_account_key(&self) -> &str {
        &self.trusted_account_key
    }

    pub(crate) fn foreign_tracestate(&self) -> &[String] {
        &self.foreign_tracestate
    }

    /// Compact (plain JSON) form of the vendor envelope.
    #[must_use]
    pub fn to_compact_bytes(&self) -> Vec<u8> {
        payload::serialize_compact(self)
    }

    /// Header-safe (base64-armored) form of the vendor envelope.
    #[must_use]
    pub fn to_header_string(&self) -> String {
        payload::serialize_header_safe(self)
    }

    /// The `traceparent` header value.
    #[must_use]
    pub fn to_traceparent(&self) -> String {
        trace_context::inject_traceparent(self)
    }

    /// The `tracestate` header value: our refreshed entry first, foreign
    /// entries after it in their original relative order.
    #[must_use]
    pub fn to_tracestate(&self) -> String {
        trace_context::inject_tracestate(self)
    }

    /// The legacy cross-application header value.
    #[must_use]
    pub fn to_cross_app_header(&self) -> String {
        cross_app::encode(self)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::traces::context::{ParentType, Sampling};

    #[test]
    fn serializations_are_repeatable() {
        let outbound = OutboundContext::new(
            TraceIdentity {
                trace_id: "4bf92f3577b34da6a3ce929d0e0e4736".to_string(),
                span_id: Some("00f067aa0ba902b7".to_string()),
                transaction_id: Some("7d3efb1b173fecfa".to_string()),
                parent_type: ParentType::App,
                account_id: Some("33".to_string()),
                app_id: Some("2827902".to_string()),
                sampling: Sampling {
                    sampled: Some(true),
                    priority: Some(1.5),
                },
                timestamp_ms: Some(1_518_469_636_035),
            },
            "33".to_string(),
            Vec::new(),
        );

        assert_eq!(outbound.to_header_string(), outbound.to_header_string());
        assert_eq!(outbound.to_traceparent(), outbound.to_traceparent());
        assert_eq!(outbound.to_tracestate(), outbound.to_tracestate());
        assert_eq!(outbound.to_compact_bytes(), outbound.to_compact_bytes());
    }
}
