//! Wire format selection for context injection and extraction.
//!
//! Which formats this process emits and scans for is configuration, not
//! code: a service fronting only same-vendor peers can run payload-only,
//! while one behind a multi-vendor mesh leads with the standard headers.
//! Styles are configured as a comma-separated list and order matters on the
//! extraction side — the first style whose headers are present wins.

use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Deserializer};
use tracing::error;

/// A wire format the agent can emit or scan for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropagationStyle {
    /// The primary versioned vendor envelope (`x-apm-context`).
    Payload,
    /// The multi-vendor standard headers (`traceparent`, `tracestate`).
    TraceContext,
    /// The legacy cross-application envelope (`x-apm-cross-app`).
    CrossApp,
    /// Disable propagation for this slot.
    None,
}

/// Case-insensitive. Invalid input is logged and maps to `None` so a typo
/// in configuration cannot keep the agent from starting.
impl FromStr for PropagationStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "payload" => Ok(PropagationStyle::Payload),
            "tracecontext" => Ok(PropagationStyle::TraceContext),
            "crossapp" => Ok(PropagationStyle::CrossApp),
            "none" => Ok(PropagationStyle::None),
            _ => {
                error!("propagation style is invalid: {s:?}, using None");
                Ok(PropagationStyle::None)
            }
        }
    }
}

impl Display for PropagationStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let style = match self {
            PropagationStyle::Payload => "payload",
            PropagationStyle::TraceContext => "tracecontext",
            PropagationStyle::CrossApp => "crossapp",
            PropagationStyle::None => "none",
        };
        write!(f, "{style}")
    }
}

/// Deserializes a comma-separated style list, trimming whitespace around
/// entries. `"tracecontext, payload"` → `[TraceContext, Payload]`.
pub fn deserialize_propagation_styles<'de, D>(
    deserializer: D,
) -> Result<Vec<PropagationStyle>, D::Error>
where
    D: Deserializer<'de>,
{
    let s: String = String::deserialize(deserializer)?;
    Ok(parse_style_list(&s))
}

/// Shared by the deserializer and the environment reader.
pub(crate) fn parse_style_list(value: &str) -> Vec<PropagationStyle> {
    value
        .split(',')
        .filter_map(|style| {
            let style = style.trim();
            if style.is_empty() {
                return None;
            }
            style.parse::<PropagationStyle>().ok()
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_list_trims_and_orders() {
        assert_eq!(
            parse_style_list("tracecontext, payload ,crossapp"),
            vec![
                PropagationStyle::TraceContext,
                PropagationStyle::Payload,
                PropagationStyle::CrossApp,
            ]
        );
    }

    #[test]
    fn invalid_styles_become_none() {
        assert_eq!(
            parse_style_list("payload,b3"),
            vec![PropagationStyle::Payload, PropagationStyle::None]
        );
    }

    #[test]
    fn display_round_trips() {
        for style in [
            PropagationStyle::Payload,
            PropagationStyle::TraceContext,
            PropagationStyle::CrossApp,
            PropagationStyle::None,
        ] {
            assert_eq!(style.to_string().parse::<PropagationStyle>(), Ok(style));
        }
    }
}
