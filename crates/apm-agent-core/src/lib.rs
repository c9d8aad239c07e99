//! # APM Agent Core
//!
//! In-process distributed tracing support for the APM agent: creating and
//! accepting the cross-service context token that lets spans recorded by
//! independent services be stitched into one end-to-end trace.
//!
//! ## Overview
//!
//! Given an active unit of work (a [`traces::transaction::Transaction`]),
//! the [`traces::distributed_tracing::DistributedTracing`] facade can
//!
//! - produce an outbound, versioned context object suitable for embedding
//!   in a network header or message, in any of the supported wire formats;
//! - parse and validate an inbound context received from an upstream
//!   caller, reconciling it with the local transaction's sampling and
//!   priority state.
//!
//! Two wire format families coexist: the primary vendor envelope (plus its
//! legacy predecessor) and the multi-vendor `traceparent`/`tracestate`
//! header pair. They are semantically interchangeable and both defensive
//! against malformed, partial or foreign input — this library instruments a
//! host application and must never crash it.
//!
//! ## Modules
//!
//! - [`config`]: flags and propagation style selection
//! - [`identity`]: process-wide account/application identity
//! - [`logger`]: log formatting for agent output
//! - [`traces`]: context structures, codecs, transactions, and the facade

#![deny(clippy::all)]
#![deny(clippy::unwrap_used)]
#![deny(unused_extern_crates)]
#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]
#![deny(unreachable_pub)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]

/// Configuration flags and propagation styles
pub mod config;

/// Process identity supplied by agent startup
pub mod identity;

/// Logging format for agent output
pub mod logger;

/// Distributed trace context creation and acceptance
pub mod traces;
