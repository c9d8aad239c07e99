//! Agent configuration.
//!
//! Defaults are hard-coded here and may be overridden by `APM_*` environment
//! variables at startup. The facade reads flag fields at call time, so
//! swapping in an updated `Config` handle takes effect on the next
//! operation.
//!
//! Invalid values never prevent startup: a bad boolean or style list is
//! logged and the default kept.

pub mod propagation_style;

use serde::Deserialize;
use tracing::error;

use crate::config::propagation_style::{
    deserialize_propagation_styles, parse_style_list, PropagationStyle,
};

/// Process-wide distributed tracing configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Master switch for distributed tracing. Off means both create and
    /// accept are silent no-ops.
    pub distributed_tracing_enabled: bool,
    /// Emit the legacy cross-application envelope for older peers.
    pub cross_application_tracing_enabled: bool,
    /// Formats written to outbound carriers.
    #[serde(deserialize_with = "deserialize_propagation_styles")]
    pub trace_propagation_style_inject: Vec<PropagationStyle>,
    /// Formats scanned for on inbound carriers; order decides which wins
    /// when several are present.
    #[serde(deserialize_with = "deserialize_propagation_styles")]
    pub trace_propagation_style_extract: Vec<PropagationStyle>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            distributed_tracing_enabled: true,
            cross_application_tracing_enabled: false,
            trace_propagation_style_inject: vec![
                PropagationStyle::TraceContext,
                PropagationStyle::Payload,
                PropagationStyle::CrossApp,
            ],
            trace_propagation_style_extract: vec![
                PropagationStyle::TraceContext,
                PropagationStyle::Payload,
                PropagationStyle::CrossApp,
            ],
        }
    }
}

impl Config {
    /// Builds a configuration from defaults plus `APM_*` environment
    /// overrides.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(enabled) = env_bool("APM_DISTRIBUTED_TRACING_ENABLED") {
            config.distributed_tracing_enabled = enabled;
        }
        if let Some(enabled) = env_bool("APM_CROSS_APPLICATION_TRACING_ENABLED") {
            config.cross_application_tracing_enabled = enabled;
        }
        if let Ok(styles) = std::env::var("APM_TRACE_PROPAGATION_STYLE_INJECT") {
            config.trace_propagation_style_inject = parse_style_list(&styles);
        }
        if let Ok(styles) = std::env::var("APM_TRACE_PROPAGATION_STYLE_EXTRACT") {
            config.trace_propagation_style_extract = parse_style_list(&styles);
        }

        config
    }
}

fn env_bool(key: &str) -> Option<bool> {
    let value = std::env::var(key).ok()?;
    parse_bool(&value).or_else(|| {
        error!("{key} is not a boolean: {value:?}, keeping default");
        None
    })
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::*;

    #[test]
    fn defaults_enable_tracing_but_not_legacy() {
        let config = Config::default();
        assert!(config.distributed_tracing_enabled);
        assert!(!config.cross_application_tracing_enabled);
        assert_eq!(
            config.trace_propagation_style_extract[0],
            PropagationStyle::TraceContext
        );
    }

    #[test]
    fn deserializes_styles_from_comma_list() {
        let config: Config = serde_json::from_str(
            r#"{
                "distributed_tracing_enabled": false,
                "trace_propagation_style_inject": "payload",
                "trace_propagation_style_extract": "payload, tracecontext"
            }"#,
        )
        .unwrap();

        assert!(!config.distributed_tracing_enabled);
        assert_eq!(
            config.trace_propagation_style_inject,
            vec![PropagationStyle::Payload]
        );
        assert_eq!(
            config.trace_propagation_style_extract,
            vec![PropagationStyle::Payload, PropagationStyle::TraceContext]
        );
    }

    #[test]
    fn bool_parsing_accepts_common_spellings() {
        assert_eq!(parse_bool(" TRUE "), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
