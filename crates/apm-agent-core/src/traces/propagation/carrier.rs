//! Carrier traits for reading and writing context headers.
//!
//! A carrier is whatever holds the headers on a given transport: an HTTP
//! header map, message-queue metadata, a JSON message envelope. The facade
//! only ever talks to these traits, so instrumentation for a new transport
//! is a matter of implementing them.
//!
//! Keys are matched case-insensitively; HTTP intermediaries are free to
//! re-case header names.

use std::collections::HashMap;

use serde_json::Value;

/// Write half of a carrier. Keys are stored lowercase.
pub trait Injector {
    fn set(&mut self, key: &str, value: String);
}

/// Read half of a carrier. Lookups are case-insensitive.
pub trait Extractor {
    fn get(&self, key: &str) -> Option<&str>;

    /// All keys present in the carrier, in stored (lowercase) form.
    fn keys(&self) -> Vec<&str>;
}

impl<S: std::hash::BuildHasher> Injector for HashMap<String, String, S> {
    fn set(&mut self, key: &str, value: String) {
        self.insert(key.to_lowercase(), value);
    }
}

impl<S: std::hash::BuildHasher> Extractor for HashMap<String, String, S> {
    fn get(&self, key: &str) -> Option<&str> {
        self.get(&key.to_lowercase()).map(String::as_str)
    }

    fn keys(&self) -> Vec<&str> {
        self.keys().map(String::as_str).collect::<Vec<_>>()
    }
}

/// Message payloads that carry their headers as a JSON object. Non-object
/// values read as empty and silently ignore writes.
impl Injector for Value {
    fn set(&mut self, key: &str, value: String) {
        if let Value::Object(map) = self {
            map.insert(key.to_lowercase(), Value::String(value));
        }
    }
}

impl Extractor for Value {
    fn get(&self, key: &str) -> Option<&str> {
        if let Value::Object(map) = self {
            map.get(&key.to_lowercase()).and_then(|v| v.as_str())
        } else {
            None
        }
    }

    fn keys(&self) -> Vec<&str> {
        if let Value::Object(map) = self {
            map.keys().map(String::as_str).collect::<Vec<_>>()
        } else {
            Vec::new()
        }
    }
}
