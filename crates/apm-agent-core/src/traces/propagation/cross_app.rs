//! Legacy cross-application envelope.
//!
//! The predecessor of the versioned payload: a base64-armored JSON array
//! `[cross_process_id, transaction_guid, timestamp_ms]`, where
//! `cross_process_id` is `account_id#app_id`. It carries no sampling or
//! priority semantics and, crucially, no version discriminator — so parse
//! failures here are always silent. Treating every undecodable value as "no
//! legacy context available" is the only safe reading: strict parsing would
//! false-positive on unrelated traffic that happens to use the same header
//! name.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::debug;

use crate::traces::propagation::OutboundContext;

/// Header key for the legacy envelope.
pub const CROSS_APP_HEADER: &str = "x-apm-cross-app";

/// Application identity and timing carried by the legacy format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrossAppPayload {
    /// `account_id#app_id` of the caller.
    pub cross_process_id: String,
    pub transaction_guid: String,
    pub timestamp_ms: u64,
}

/// Encodes the legacy header for an outbound context.
pub(crate) fn encode(outbound: &OutboundContext) -> String {
    let identity = outbound.identity();
    let cross_process_id = format!(
        "{}#{}",
        identity.account_id.as_deref().unwrap_or_default(),
        identity.app_id.as_deref().unwrap_or_default(),
    );
    let guid = identity
        .transaction_id
        .as_deref()
        .or(identity.span_id.as_deref())
        .unwrap_or_default();
    let timestamp = identity.timestamp_ms.unwrap_or_default();

    match serde_json::to_vec(&(cross_process_id, guid, timestamp)) {
        Ok(bytes) => STANDARD.encode(bytes),
        Err(e) => {
            tracing::error!("failed to encode legacy context: {e}");
            String::new()
        }
    }
}

/// Decodes a legacy header. Every failure is "no legacy context".
pub(crate) fn parse(raw: &str) -> Option<CrossAppPayload> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let bytes = if raw.starts_with('[') {
        raw.as_bytes().to_vec()
    } else {
        match STANDARD.decode(raw) {
            Ok(bytes) => bytes,
            Err(_) => {
                debug!("undecodable legacy context header, ignoring");
                return None;
            }
        }
    };

    let (cross_process_id, transaction_guid, timestamp_ms): (String, String, u64) =
        match serde_json::from_slice(&bytes) {
            Ok(fields) => fields,
            Err(_) => {
                debug!("unparseable legacy context header, ignoring");
                return None;
            }
        };

    if !cross_process_id.contains('#') {
        debug!("legacy context without a cross process id, ignoring");
        return None;
    }

    Some(CrossAppPayload {
        cross_process_id,
        transaction_guid,
        timestamp_ms,
    })
}
