//! Distributed tracing: context structures, per-transaction tracer state,
//! wire format codecs, and the public facade.
//!
//! Control flow runs facade-down: [`distributed_tracing`] gates on
//! configuration and the active [`transaction`](transaction::Transaction),
//! then dispatches to one of the [`propagation`] codecs, and either returns
//! an outbound handle or adopts an inbound identity onto the transaction's
//! tracer state. Nothing below the facade performs I/O or suspends; every
//! operation is a bounded, synchronous computation over its input.

/// Trace identity shared by every wire format.
pub mod context;

/// Public facade: create and accept distributed trace context.
pub mod distributed_tracing;

/// Wire format codecs and carrier abstractions.
pub mod propagation;

/// Transaction handle and per-request tracer state.
pub mod transaction;

/// Transport tagging for inbound context.
pub mod transport;
