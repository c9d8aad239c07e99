//! Transport types for inbound distributed trace context.
//!
//! The transport type records how a remote context reached this process
//! (HTTP call, message queue, etc.). It is metadata only: no propagation
//! logic branches on it.

use std::{fmt::Display, str::FromStr};

/// Transport over which an inbound trace context arrived.
///
/// Tagged onto an accepted context so the backend can distinguish, say, an
/// HTTP hop from a Kafka hop when computing cross-service latency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportType {
    Http,
    Https,
    Kafka,
    Amqp,
    Queue,
    /// A transport the caller knows about but this set does not name.
    Other,
    /// Transport not reported by the instrumentation point.
    #[default]
    Unknown,
}

impl FromStr for TransportType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "http" => Ok(TransportType::Http),
            "https" => Ok(TransportType::Https),
            "kafka" => Ok(TransportType::Kafka),
            "amqp" => Ok(TransportType::Amqp),
            "queue" => Ok(TransportType::Queue),
            "other" => Ok(TransportType::Other),
            _ => Ok(TransportType::Unknown),
        }
    }
}

impl Display for TransportType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let transport = match self {
            TransportType::Http => "HTTP",
            TransportType::Https => "HTTPS",
            TransportType::Kafka => "Kafka",
            TransportType::Amqp => "AMQP",
            TransportType::Queue => "Queue",
            TransportType::Other => "Other",
            TransportType::Unknown => "Unknown",
        };
        write!(f, "{transport}")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(
            "KAFKA".parse::<TransportType>(),
            Ok(TransportType::Kafka)
        );
        assert_eq!("https".parse::<TransportType>(), Ok(TransportType::Https));
    }

    #[test]
    fn unrecognized_maps_to_unknown() {
        assert_eq!(
            "carrier-pigeon".parse::<TransportType>(),
            Ok(TransportType::Unknown)
        );
    }
}
