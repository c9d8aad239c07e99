//! Trace identity structures shared by every wire format.
//!
//! A distributed trace is stitched together from spans recorded by
//! independent services. The pieces of identity that have to survive a
//! process boundary are collected in [`TraceIdentity`]; an inbound header
//! that parsed successfully becomes an [`InboundContext`], which additionally
//! records trust and transport metadata about the caller.
//!
//! # Identity fields
//!
//! - **`trace_id`**: generated once at the root of the trace and propagated
//!   unchanged by every hop. Hex string, at most 32 characters, lowercase
//!   once normalized.
//! - **`span_id`**: guid of the unit of work that emitted (or received) the
//!   context.
//! - **`account_id` / `app_id` / `parent_type`**: identify the emitting
//!   application and its owning account; required for cross-account trust
//!   checks.
//! - **`sampling`**: the sampled flag plus the floating-point priority used
//!   to break sampling ties consistently across services.
//! - **`timestamp_ms`**: creation time of the payload, used by the receiver
//!   to estimate transport latency.

use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::traces::transport::TransportType;

/// Number of decimal places a priority survives on the wire.
///
/// Priorities are rounded before serialization so that a receiver parses
/// back exactly the value the sender encoded.
pub const PRIORITY_PRECISION: u32 = 6;

/// Priorities outside this bound are syntactically valid but semantically
/// nonsensical; they mark a context as degraded instead of rejecting it.
pub const PRIORITY_CEILING: f64 = 1_000_000.0;

/// Kind of application that emitted a context.
///
/// Encoded as a string in the vendor envelope and as a numeric code in the
/// tracestate entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParentType {
    #[default]
    App,
    Browser,
    Mobile,
}

impl ParentType {
    /// Numeric code used in the tracestate vendor entry.
    #[must_use]
    pub fn as_code(self) -> u8 {
        match self {
            ParentType::App => 0,
            ParentType::Browser => 1,
            ParentType::Mobile => 2,
        }
    }

    /// Inverse of [`ParentType::as_code`].
    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(ParentType::App),
            1 => Some(ParentType::Browser),
            2 => Some(ParentType::Mobile),
            _ => None,
        }
    }
}

impl FromStr for ParentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "App" => Ok(ParentType::App),
            "Browser" => Ok(ParentType::Browser),
            "Mobile" => Ok(ParentType::Mobile),
            _ => Err(format!("unknown parent type {s}")),
        }
    }
}

impl std::fmt::Display for ParentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ty = match self {
            ParentType::App => "App",
            ParentType::Browser => "Browser",
            ParentType::Mobile => "Mobile",
        };
        write!(f, "{ty}")
    }
}

/// Sampling decision carried by a context.
///
/// `sampled` is authoritative for the whole trace once decided at the root.
/// `priority` breaks ties between independently sampling services; it must
/// cross the wire losslessly, which is why it is rounded to
/// [`PRIORITY_PRECISION`] decimals before encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Sampling {
    pub sampled: Option<bool>,
    pub priority: Option<f64>,
}

/// The identity a context carries across a process boundary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TraceIdentity {
    /// Trace-wide identifier, immutable once set. Hex, at most 32 chars.
    pub trace_id: String,
    /// Guid of the emitting unit of work. Hex, at most 16 chars.
    pub span_id: Option<String>,
    /// Identifier of the originating request, distinct from the span guid.
    pub transaction_id: Option<String>,
    pub parent_type: ParentType,
    pub account_id: Option<String>,
    pub app_id: Option<String>,
    pub sampling: Sampling,
    /// Payload creation time, milliseconds since epoch.
    pub timestamp_ms: Option<u64>,
}

/// A successfully parsed inbound context, ready for adoption onto a
/// transaction's tracer state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InboundContext {
    pub identity: TraceIdentity,
    /// How the context reached this process. Metadata only.
    pub transport: TransportType,
    /// Whether the caller sits inside this process's trust boundary. Only a
    /// trusted caller's sampling fields are authoritative.
    pub trusted: bool,
    /// Set when the context joined in degraded mode: the primary identity is
    /// usable but sampling/priority metadata was missing, malformed, or out
    /// of range. A degraded context never contributes a priority.
    pub degraded: bool,
    /// Foreign tracestate entries (`vendor=value`), byte-for-byte, in their
    /// original relative order. Re-emitted unchanged on the next outbound
    /// hop.
    pub foreign_tracestate: Vec<String>,
}

/// Rounds a priority to the precision that survives serialization.
#[must_use]
pub fn round_priority(priority: f64) -> f64 {
    let scale = 10_f64.powi(PRIORITY_PRECISION as i32);
    (priority * scale).round() / scale
}

/// Milliseconds since the Unix epoch. Clock-before-epoch collapses to zero.
#[must_use]
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
