//! Multi-vendor trace context codec (`traceparent` / `tracestate` headers).
//!
//! This is the standards-based wire format, designed so that tracers from
//! different vendors can participate in the same trace. It has two logical
//! fields:
//!
//! - **`traceparent`**: fixed layout `version-traceid-parentid-flags`
//!   (2/32/16/2 hex characters). Versioning is strict: only version `00` is
//!   recognized and anything else is rejected outright — without a valid
//!   trace id there is nothing to join.
//! - **`tracestate`**: ordered `vendor=value` list. Entries belonging to
//!   other vendors are opaque: they are preserved byte-for-byte and
//!   re-emitted unchanged, in their original relative order, when this
//!   process becomes an intermediate hop. This process's own entry carries
//!   the same sampling/priority/identity metadata as the vendor envelope, so
//!   the two formats are semantically interchangeable.
//!
//! # Own vendor entry
//!
//! Key: `{trusted_account_key}@apm`. Value: nine dash-delimited sub-fields —
//!
//! ```text
//! version-parentType-accountId-appId-spanId-transactionId-sampled-priority-timestamp
//! 0-0-33-2827902-00f067aa0ba902b7-7d3efb1b173fecfa-1-1.500000-1518469636035
//! ```
//!
//! Sub-fields appearing after the nine known ones are ignored, so newer
//! agents can append without breaking older ones. This is the opposite of
//! traceparent's strict versioning, and deliberate: the entry is ours, we
//! control its evolution.
//!
//! # Degraded acceptance
//!
//! A valid traceparent with a missing or malformed own-vendor entry still
//! joins the trace — trace id, parent id and sampled flag are taken from
//! traceparent and the priority falls back to the local transaction's value.
//! A malformed vendor entry must never break the traceparent-only guarantee.

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, warn};

use crate::traces::context::{ParentType, Sampling, TraceIdentity, PRIORITY_CEILING};
use crate::traces::propagation::{carrier::Extractor, error::Error, OutboundContext};

/// Header key for the fixed-layout parent field.
pub const TRACEPARENT_KEY: &str = "traceparent";

/// Header key for the ordered vendor list.
pub const TRACESTATE_KEY: &str = "tracestate";

/// Suffix of this process's tracestate key; the full key is
/// `{trusted_account_key}@apm`.
pub(crate) const VENDOR_KEY_SUFFIX: &str = "@apm";

const FORMAT_TRACEPARENT: &str = "traceparent";
const FORMAT_TRACESTATE: &str = "tracestate";

/// The only traceparent version this codec recognizes.
const SUPPORTED_VERSION: &str = "00";

/// Version sub-field emitted in our own tracestate entry.
const VENDOR_ENTRY_VERSION: &str = "0";

/// Known sub-fields in our own tracestate entry; anything beyond is a newer
/// agent's extension and is ignored.
const VENDOR_ENTRY_FIELDS: usize = 9;

lazy_static! {
    /// `version-traceid-parentid-flags`, with an optional tail that only a
    /// future version may carry.
    static ref TRACEPARENT_REGEX: Regex =
        Regex::new(r"(?i)^([a-f0-9]{2})-([a-f0-9]{32})-([a-f0-9]{16})-([a-f0-9]{2})(-.*)?$")
            .expect("failed creating regex");

    /// All-zero identifiers are invalid on the wire.
    pub(crate) static ref INVALID_SEGMENT_REGEX: Regex =
        Regex::new(r"^0+$").expect("failed creating regex");

    /// Trace ids as they appear in the vendor envelope: hex, up to 128 bits.
    pub(crate) static ref TRACE_ID_REGEX: Regex =
        Regex::new(r"^[0-9a-fA-F]{1,32}$").expect("failed creating regex");

    /// Span/transaction guids: hex, up to 64 bits.
    pub(crate) static ref GUID_REGEX: Regex =
        Regex::new(r"^[0-9a-fA-F]{1,16}$").expect("failed creating regex");

    static ref INVALID_ASCII_CHARACTERS_REGEX: Regex =
        Regex::new(r"[^\x20-\x7E]+").expect("failed creating regex");
}

/// Parsed traceparent header.
struct Traceparent {
    trace_id: String,
    parent_id: String,
    sampled: bool,
}

/// Parsed own-vendor tracestate entry.
struct VendorEntry {
    parent_type: ParentType,
    account_id: Option<String>,
    app_id: Option<String>,
    span_id: Option<String>,
    transaction_id: Option<String>,
    sampled: bool,
    priority: Option<f64>,
    timestamp_ms: Option<u64>,
    /// A sub-field was parseable but semantically out of range; the field
    /// was dropped rather than the entry rejected.
    degraded: bool,
}

/// Result of scanning a carrier for trace context headers.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ExtractedTraceContext {
    pub(crate) identity: TraceIdentity,
    /// Own vendor entry was present and structurally valid.
    pub(crate) trusted: bool,
    /// Joined without usable vendor metadata; priority must fall back to
    /// the local transaction.
    pub(crate) degraded: bool,
    /// Foreign `vendor=value` entries, original relative order.
    pub(crate) foreign_entries: Vec<String>,
}

/// Extracts trace context from a carrier.
///
/// A traceparent failure is a hard error: acceptance aborts entirely.
/// Everything that can go wrong in tracestate degrades instead.
pub(crate) fn extract(
    carrier: &dyn Extractor,
    vendor_key: &str,
) -> Result<ExtractedTraceContext, Error> {
    let tp_raw = carrier
        .get(TRACEPARENT_KEY)
        .ok_or_else(|| Error::extract("header not present", FORMAT_TRACEPARENT))?;
    let traceparent = extract_traceparent(tp_raw.trim())?;

    let mut identity = TraceIdentity {
        trace_id: traceparent.trace_id,
        span_id: Some(traceparent.parent_id),
        sampling: Sampling {
            sampled: Some(traceparent.sampled),
            priority: None,
        },
        ..TraceIdentity::default()
    };
    let mut trusted = false;
    let mut degraded = true;
    let mut foreign_entries = Vec::new();

    if let Some(ts_raw) = carrier.get(TRACESTATE_KEY) {
        if INVALID_ASCII_CHARACTERS_REGEX.is_match(ts_raw) {
            debug!("received tracestate with non-ascii characters, ignoring it");
        } else {
            let mut own_value: Option<&str> = None;
            for entry in ts_raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
                if let Some(value) = entry
                    .strip_prefix(vendor_key)
                    .and_then(|rest| rest.strip_prefix('='))
                {
                    // Later duplicates of our own key are stale; drop them.
                    if own_value.is_none() {
                        own_value = Some(value);
                    }
                } else {
                    foreign_entries.push(entry.to_string());
                }
            }

            if let Some(value) = own_value {
                match parse_vendor_entry(value) {
                    Ok(entry) => {
                        if let Some(vendor_span) = &entry.span_id {
                            if identity.span_id.as_deref() != Some(vendor_span.as_str()) {
                                debug!(
                                    "tracestate span guid {vendor_span} superseded by traceparent parent id"
                                );
                            }
                        }
                        identity.parent_type = entry.parent_type;
                        identity.account_id = entry.account_id;
                        identity.app_id = entry.app_id;
                        identity.transaction_id = entry.transaction_id;
                        identity.sampling = Sampling {
                            sampled: Some(entry.sampled),
                            priority: entry.priority,
                        };
                        identity.timestamp_ms = entry.timestamp_ms;
                        trusted = true;
                        degraded = entry.degraded;
                    }
                    Err(e) => {
                        warn!("malformed {vendor_key} tracestate entry, joining on traceparent only: {e}");
                    }
                }
            } else {
                debug!("no {vendor_key} entry found in tracestate");
            }
        }
    } else {
        debug!("no tracestate header present");
    }

    Ok(ExtractedTraceContext {
        identity,
        trusted,
        degraded,
        foreign_entries,
    })
}

fn extract_traceparent(traceparent: &str) -> Result<Traceparent, Error> {
    let captures = TRACEPARENT_REGEX
        .captures(traceparent)
        .ok_or_else(|| Error::extract("malformed traceparent", FORMAT_TRACEPARENT))?;

    let version = captures[1].to_lowercase();
    let trace_id = captures[2].to_lowercase();
    let parent_id = captures[3].to_lowercase();
    let flags = &captures[4];
    let tail = captures.get(5).map_or("", |m| m.as_str());

    match version.as_str() {
        SUPPORTED_VERSION => {
            if !tail.is_empty() {
                return Err(Error::extract(
                    "version 00 traceparent must contain exactly 4 values",
                    FORMAT_TRACEPARENT,
                ));
            }
        }
        "ff" => {
            return Err(Error::extract(
                "`ff` is a forbidden traceparent version",
                FORMAT_TRACEPARENT,
            ));
        }
        _ => {
            return Err(Error::extract(
                "unrecognized traceparent version",
                FORMAT_TRACEPARENT,
            ));
        }
    }

    if INVALID_SEGMENT_REGEX.is_match(&trace_id) {
        return Err(Error::extract("zero trace id is invalid", FORMAT_TRACEPARENT));
    }
    if INVALID_SEGMENT_REGEX.is_match(&parent_id) {
        return Err(Error::extract("zero parent id is invalid", FORMAT_TRACEPARENT));
    }

    let flags = u8::from_str_radix(flags, 16)
        .map_err(|_| Error::extract("failed to decode trace flags", FORMAT_TRACEPARENT))?;

    Ok(Traceparent {
        trace_id,
        parent_id,
        sampled: flags & 0x1 != 0,
    })
}

fn parse_vendor_entry(value: &str) -> Result<VendorEntry, Error> {
    let fields: Vec<&str> = value.split('-').collect();
    if fields.len() < VENDOR_ENTRY_FIELDS {
        return Err(Error::extract("truncated vendor entry", FORMAT_TRACESTATE));
    }
    if fields[0] != VENDOR_ENTRY_VERSION {
        return Err(Error::extract(
            "unrecognized vendor entry version",
            FORMAT_TRACESTATE,
        ));
    }

    let parent_type = fields[1]
        .parse::<u8>()
        .ok()
        .and_then(ParentType::from_code)
        .ok_or_else(|| Error::extract("invalid parent type", FORMAT_TRACESTATE))?;
    let account_id = non_empty(fields[2]);
    let app_id = non_empty(fields[3]);
    let span_id = optional_guid(fields[4])?;
    let transaction_id = optional_guid(fields[5])?;
    let sampled = match fields[6] {
        "1" => true,
        "0" => false,
        _ => {
            return Err(Error::extract("invalid sampled flag", FORMAT_TRACESTATE));
        }
    };

    let mut degraded = false;
    let priority = if fields[7].is_empty() {
        degraded = true;
        None
    } else {
        let p = fields[7]
            .parse::<f64>()
            .map_err(|_| Error::extract("invalid priority", FORMAT_TRACESTATE))?;
        if p.is_finite() && (0.0..PRIORITY_CEILING).contains(&p) {
            Some(p)
        } else {
            debug!("dropping out-of-range tracestate priority {p}");
            degraded = true;
            None
        }
    };

    let timestamp = fields[8]
        .parse::<i64>()
        .map_err(|_| Error::extract("invalid timestamp", FORMAT_TRACESTATE))?;
    let timestamp_ms = match u64::try_from(timestamp) {
        Ok(t) => Some(t),
        Err(_) => {
            debug!("dropping negative tracestate timestamp {timestamp}");
            degraded = true;
            None
        }
    };

    // fields[9..] belong to a newer agent; ignored.

    Ok(VendorEntry {
        parent_type,
        account_id,
        app_id,
        span_id,
        transaction_id,
        sampled,
        priority,
        timestamp_ms,
        degraded,
    })
}

fn non_empty(field: &str) -> Option<String> {
    if field.is_empty() {
        None
    } else {
        Some(field.to_string())
    }
}

fn optional_guid(field: &str) -> Result<Option<String>, Error> {
    if field.is_empty() {
        Ok(None)
    } else if GUID_REGEX.is_match(field) {
        Ok(Some(field.to_lowercase()))
    } else {
        Err(Error::extract("invalid guid sub-field", FORMAT_TRACESTATE))
    }
}

/// Renders the traceparent header for an outbound context.
///
/// Identifiers shorter than their fixed wire width are left-padded with
/// zeros.
pub(crate) fn inject_traceparent(outbound: &OutboundContext) -> String {
    let identity = outbound.identity();
    let trace_id = identity.trace_id.to_lowercase();
    let span = identity
        .span_id
        .as_deref()
        .or(identity.transaction_id.as_deref())
        .unwrap_or_default()
        .to_lowercase();
    let flags = u8::from(identity.sampling.sampled.unwrap_or(false));

    format!("{SUPPORTED_VERSION}-{trace_id:0>32}-{span:0>16}-{flags:02x}")
}

/// Renders the tracestate header: our refreshed entry first, then every
/// foreign entry unchanged and in its original relative order.
pub(crate) fn inject_tracestate(outbound: &OutboundContext) -> String {
    let own = format!(
        "{}{}={}",
        outbound.trusted_account_key(),
        VENDOR_KEY_SUFFIX,
        encode_vendor_entry(outbound.identity())
    );

    let mut entries = Vec::with_capacity(1 + outbound.foreign_tracestate().len());
    entries.push(own);
    entries.extend(outbound.foreign_tracestate().iter().cloned());
    entries.join(",")
}

fn encode_vendor_entry(identity: &TraceIdentity) -> String {
    let priority = identity
        .sampling
        .priority
        .map(|p| format!("{p:.6}"))
        .unwrap_or_default();

    format!(
        "{VENDOR_ENTRY_VERSION}-{}-{}-{}-{}-{}-{}-{}-{}",
        identity.parent_type.as_code(),
        identity.account_id.as_deref().unwrap_or_default(),
        identity.app_id.as_deref().unwrap_or_default(),
        identity.span_id.as_deref().unwrap_or_default(),
        identity.transaction_id.as_deref().unwrap_or_default(),
        u8::from(identity.sampling.sampled.unwrap_or(false)),
        priority,
        identity.timestamp_ms.unwrap_or_default(),
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use std::collections::HashMap;

    use super::*;
    use crate::traces::propagation::carrier::Injector;

    const VENDOR_KEY: &str = "33@apm";

    fn carrier_with(traceparent: &str, tracestate: Option<&str>) -> HashMap<String, String> {
        let mut carrier = HashMap::new();
        carrier.set(TRACEPARENT_KEY, traceparent.to_string());
        if let Some(ts) = tracestate {
            carrier.set(TRACESTATE_KEY, ts.to_string());
        }
        carrier
    }

    fn example_outbound() -> OutboundContext {
        OutboundContext::new(
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
        )
    }

    #[test]
    fn extract_full_context() {
        let carrier = carrier_with(
            "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01",
            Some("33@apm=0-0-33-2827902-00f067aa0ba902b7-7d3efb1b173fecfa-1-1.500000-1518469636035"),
        );

        let extracted = extract(&carrier, VENDOR_KEY).unwrap();

        assert!(extracted.trusted);
        assert!(!extracted.degraded);
        assert_eq!(
            extracted.identity.trace_id,
            "4bf92f3577b34da6a3ce929d0e0e4736"
        );
        assert_eq!(
            extracted.identity.span_id.as_deref(),
            Some("00f067aa0ba902b7")
        );
        assert_eq!(
            extracted.identity.transaction_id.as_deref(),
            Some("7d3efb1b173fecfa")
        );
        assert_eq!(extracted.identity.account_id.as_deref(), Some("33"));
        assert_eq!(extracted.identity.app_id.as_deref(), Some("2827902"));
        assert_eq!(extracted.identity.sampling.sampled, Some(true));
        assert_eq!(extracted.identity.sampling.priority, Some(1.5));
        assert_eq!(extracted.identity.timestamp_ms, Some(1_518_469_636_035));
    }

    #[test]
    fn unrecognized_version_is_rejected() {
        for tp in [
            "01-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01",
            "ff-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01",
            "cc-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01",
        ] {
            let carrier = carrier_with(tp, None);
            assert!(extract(&carrier, VENDOR_KEY).is_err(), "accepted {tp}");
        }
    }

    #[test]
    fn version_00_with_tail_is_rejected() {
        let carrier = carrier_with(
            "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01-extra",
            None,
        );
        assert!(extract(&carrier, VENDOR_KEY).is_err());
    }

    #[test]
    fn zero_identifiers_are_rejected() {
        let zero_trace = carrier_with(
            "00-00000000000000000000000000000000-00f067aa0ba902b7-01",
            None,
        );
        assert!(extract(&zero_trace, VENDOR_KEY).is_err());

        let zero_parent = carrier_with(
            "00-4bf92f3577b34da6a3ce929d0e0e4736-0000000000000000-01",
            None,
        );
        assert!(extract(&zero_parent, VENDOR_KEY).is_err());
    }

    #[test]
    fn missing_tracestate_joins_degraded() {
        let carrier = carrier_with("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-00", None);

        let extracted = extract(&carrier, VENDOR_KEY).unwrap();

        assert!(!extracted.trusted);
        assert!(extracted.degraded);
        assert_eq!(extracted.identity.sampling.sampled, Some(false));
        assert_eq!(extracted.identity.sampling.priority, None);
        assert_eq!(extracted.identity.account_id, None);
    }

    #[test]
    fn malformed_vendor_entry_joins_degraded() {
        let carrier = carrier_with(
            "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01",
            Some("other=1,33@apm=0-0-33,another=2"),
        );

        let extracted = extract(&carrier, VENDOR_KEY).unwrap();

        assert!(!extracted.trusted);
        assert!(extracted.degraded);
        assert_eq!(extracted.identity.sampling.sampled, Some(true));
        assert_eq!(extracted.identity.sampling.priority, None);
        assert_eq!(
            extracted.foreign_entries,
            vec!["other=1".to_string(), "another=2".to_string()]
        );
    }

    #[test]
    fn vendor_entry_with_extra_subfields_is_accepted() {
        let carrier = carrier_with(
            "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01",
            Some("33@apm=0-0-33-2827902-00f067aa0ba902b7-7d3efb1b173fecfa-1-1.500000-1518469636035-future-fields"),
        );

        let extracted = extract(&carrier, VENDOR_KEY).unwrap();

        assert!(extracted.trusted);
        assert!(!extracted.degraded);
        assert_eq!(extracted.identity.sampling.priority, Some(1.5));
        assert_eq!(extracted.identity.account_id.as_deref(), Some("33"));
    }

    #[test]
    fn foreign_entries_preserve_relative_order() {
        let carrier = carrier_with(
            "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01",
            Some("other=1,33@apm=0-0-33-2827902---1-1.500000-1518469636035,another=2"),
        );

        let extracted = extract(&carrier, VENDOR_KEY).unwrap();

        assert_eq!(
            extracted.foreign_entries,
            vec!["other=1".to_string(), "another=2".to_string()]
        );
    }

    #[test]
    fn out_of_range_priority_degrades_but_keeps_entry() {
        let carrier = carrier_with(
            "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01",
            Some("33@apm=0-0-33-2827902---1-9999999.0-1518469636035"),
        );

        let extracted = extract(&carrier, VENDOR_KEY).unwrap();

        assert!(extracted.trusted);
        assert!(extracted.degraded);
        assert_eq!(extracted.identity.sampling.priority, None);
        assert_eq!(extracted.identity.sampling.sampled, Some(true));
        assert_eq!(extracted.identity.account_id.as_deref(), Some("33"));
    }

    #[test]
    fn inject_traceparent_pads_and_sets_flags() {
        let header = inject_traceparent(&example_outbound());
        assert_eq!(
            header,
            "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01"
        );
    }

    #[test]
    fn inject_tracestate_places_own_entry_first() {
        let outbound = OutboundContext::new(
            example_outbound().identity().clone(),
            "33".to_string(),
            vec!["other=1".to_string(), "another=2".to_string()],
        );

        let header = inject_tracestate(&outbound);

        assert_eq!(
            header,
            "33@apm=0-0-33-2827902-00f067aa0ba902b7-7d3efb1b173fecfa-1-1.500000-1518469636035,other=1,another=2"
        );
    }

    #[test]
    fn inject_then_extract_round_trips() {
        let outbound = example_outbound();
        let mut carrier: HashMap<String, String> = HashMap::new();
        carrier.set(TRACEPARENT_KEY, inject_traceparent(&outbound));
        carrier.set(TRACESTATE_KEY, inject_tracestate(&outbound));

        let extracted = extract(&carrier, VENDOR_KEY).unwrap();

        assert_eq!(extracted.identity, *outbound.identity());
        assert!(extracted.trusted);
        assert!(!extracted.degraded);
    }
}
