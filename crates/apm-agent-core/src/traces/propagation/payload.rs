//! The primary vendor envelope for distributed trace context.
//!
//! A versioned JSON object, optionally base64-armored so it fits in a
//! single-line transport header:
//!
//! ```text
//! {"v":[0,1],"d":{"ty":"App","ac":"33","ap":"2827902",
//!   "id":"00f067aa0ba902b7","tx":"7d3efb1b173fecfa",
//!   "tr":"4bf92f3577b34da6a3ce929d0e0e4736","pr":1.5,"sa":true,
//!   "ti":1518469636035}}
//! ```
//!
//! The version pair is the first field so that an older parser can detect a
//! future incompatible envelope and skip it instead of mis-parsing it: a
//! higher major version is rejected outright, a higher minor version parses
//! with unknown fields ignored.
//!
//! Semantically nonsensical but well-formed values (negative timestamp,
//! priority outside the allowed range) do not reject the payload; the
//! offending field is dropped and the context is flagged degraded. Strict
//! rejection there would silently break interoperability with agents that
//! encode those fields differently.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::traces::context::{
    round_priority, ParentType, Sampling, TraceIdentity, PRIORITY_CEILING,
};
use crate::traces::propagation::error::Error;
use crate::traces::propagation::trace_context::{
    GUID_REGEX, INVALID_SEGMENT_REGEX, TRACE_ID_REGEX,
};
use crate::traces::propagation::OutboundContext;

/// Header key carrying the vendor envelope.
pub const PAYLOAD_HEADER: &str = "x-apm-context";

const FORMAT: &str = "payload";

/// Current envelope version. A receiver rejects a higher major and
/// tolerates a higher minor.
const MAJOR_VERSION: u32 = 0;
const MINOR_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    v: Vec<u32>,
    d: PayloadData,
}

/// Body of the envelope. Field order is the serialization order.
#[derive(Debug, Serialize, Deserialize)]
struct PayloadData {
    ty: String,
    ac: String,
    ap: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tk: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tx: Option<String>,
    tr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pr: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sa: Option<bool>,
    ti: i64,
}

/// Version probe deserialized before the full envelope, so a future format
/// is recognized as "not ours" rather than "corrupt".
#[derive(Debug, Deserialize)]
struct VersionProbe {
    v: Vec<u32>,
}

/// A parsed inbound envelope.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct InboundPayload {
    pub(crate) identity: TraceIdentity,
    /// Set when a semantically out-of-range field was dropped.
    pub(crate) degraded: bool,
    /// The caller's trusted account key (`tk`), when it differs from the
    /// caller's own account id.
    trusted_key: Option<String>,
}

impl InboundPayload {
    /// Whether the sending account sits inside this process's trust
    /// boundary: its `tk` (or, absent that, its account id) matches ours.
    pub(crate) fn is_trusted(&self, trusted_account_key: &str) -> bool {
        self.caller_account() == trusted_account_key
    }

    /// The account identity the caller claims, for trust decisions and log
    /// lines.
    pub(crate) fn caller_account(&self) -> &str {
        self.trusted_key
            .as_deref()
            .or(self.identity.account_id.as_deref())
            .unwrap_or_default()
    }
}

fn envelope_for(outbound: &OutboundContext) -> Envelope {
    let identity = outbound.identity();
    let account_id = identity.account_id.clone().unwrap_or_default();
    // tk is only worth its bytes when it differs from the account id.
    let tk = (outbound.trusted_account_key() != account_id)
        .then(|| outbound.trusted_account_key().to_string());

    Envelope {
        v: vec![MAJOR_VERSION, MINOR_VERSION],
        d: PayloadData {
            ty: identity.parent_type.to_string(),
            ac: account_id,
            ap: identity.app_id.clone().unwrap_or_default(),
            tk,
            id: identity.span_id.clone(),
            tx: identity.transaction_id.clone(),
            tr: identity.trace_id.clone(),
            pr: identity.sampling.priority.map(round_priority),
            sa: identity.sampling.sampled,
            ti: i64::try_from(identity.timestamp_ms.unwrap_or_default()).unwrap_or(i64::MAX),
        },
    }
}

/// Serializes an outbound context to the compact (plain JSON) form.
///
/// Building the envelope cannot fail for a well-formed context; an encoder
/// error is contained here and surfaces as an empty result, logged.
pub(crate) fn serialize_compact(outbound: &OutboundContext) -> Vec<u8> {
    serde_json::to_vec(&envelope_for(outbound)).unwrap_or_else(|e| {
        tracing::error!("failed to encode outbound context: {e}");
        Vec::new()
    })
}

/// Serializes an outbound context to the header-safe (base64) form.
pub(crate) fn serialize_header_safe(outbound: &OutboundContext) -> String {
    STANDARD.encode(serialize_compact(outbound))
}

/// Parses an inbound envelope, raw JSON or base64-armored.
pub(crate) fn parse(raw: &str) -> Result<InboundPayload, Error> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(Error::extract("empty input", FORMAT));
    }

    // Header-safe and compact forms are both accepted; the armor never
    // starts with `{`.
    let bytes = if raw.starts_with('{') {
        raw.as_bytes().to_vec()
    } else {
        STANDARD
            .decode(raw)
            .map_err(|_| Error::extract("invalid base64 armor", FORMAT))?
    };

    let probe: VersionProbe = serde_json::from_slice(&bytes)
        .map_err(|_| Error::extract("malformed envelope", FORMAT))?;
    match probe.v.first() {
        None => return Err(Error::extract("missing version", FORMAT)),
        Some(&major) if major > MAJOR_VERSION => {
            return Err(Error::extract("unrecognized major version", FORMAT));
        }
        Some(_) => {}
    }

    let envelope: Envelope = serde_json::from_slice(&bytes)
        .map_err(|_| Error::extract("missing required field", FORMAT))?;
    let data = envelope.d;

    if data.ac.is_empty() || data.ap.is_empty() {
        return Err(Error::extract("missing caller identity", FORMAT));
    }
    if !TRACE_ID_REGEX.is_match(&data.tr) || INVALID_SEGMENT_REGEX.is_match(&data.tr) {
        return Err(Error::extract("invalid trace id", FORMAT));
    }
    let span_id = validated_guid(data.id.as_deref())?;
    let transaction_id = validated_guid(data.tx.as_deref())?;
    if span_id.is_none() && transaction_id.is_none() {
        return Err(Error::extract("neither span nor transaction id present", FORMAT));
    }

    let parent_type = data.ty.parse::<ParentType>().unwrap_or_else(|_| {
        debug!("unknown parent type {}, assuming App", data.ty);
        ParentType::App
    });

    let mut degraded = false;
    let priority = match data.pr {
        Some(p) if p.is_finite() && (0.0..PRIORITY_CEILING).contains(&p) => Some(p),
        Some(p) => {
            debug!("dropping out-of-range payload priority {p}");
            degraded = true;
            None
        }
        None => None,
    };
    let timestamp_ms = match u64::try_from(data.ti) {
        Ok(t) => Some(t),
        Err(_) => {
            debug!("dropping negative payload timestamp {}", data.ti);
            degraded = true;
            None
        }
    };

    Ok(InboundPayload {
        identity: TraceIdentity {
            trace_id: data.tr.to_lowercase(),
            span_id,
            transaction_id,
            parent_type,
            account_id: Some(data.ac),
            app_id: Some(data.ap),
            sampling: Sampling {
                sampled: data.sa,
                priority,
            },
            timestamp_ms,
        },
        degraded,
        trusted_key: data.tk,
    })
}

fn validated_guid(field: Option<&str>) -> Result<Option<String>, Error> {
    match field {
        None => Ok(None),
        Some(s) if s.is_empty() => Ok(None),
        Some(s) if GUID_REGEX.is_match(s) => Ok(Some(s.to_lowercase())),
        Some(_) => Err(Error::extract("invalid guid", FORMAT)),
    }
}
