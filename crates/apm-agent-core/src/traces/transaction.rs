//! Transaction handle and its per-request tracer state.
//!
//! Each in-flight unit of work is represented by a [`Transaction`], which
//! owns exactly one [`DistributedTracer`] for its lifetime. The tracer holds
//! everything distributed tracing needs to remember about the request: the
//! accepted inbound context (if any), whether an outbound context has been
//! emitted, and the transport latency estimate.
//!
//! # Ordering invariant
//!
//! A transaction may create outbound context any number of times — each call
//! reflects current state — but may accept inbound context **at most once**,
//! and only **before** it has emitted any outbound context. Once either has
//! happened, a later accept is refused with state unchanged. This is the
//! central state-machine property of the propagation core and is enforced
//! here, where the flags live.
//!
//! # Ownership
//!
//! A transaction executes on a single logical thread of control and its
//! tracer is exclusively owned; there is no interior locking. An enclosing
//! application that moves transactions across threads is responsible for its
//! own synchronization.

use crate::traces::context::{round_priority, unix_millis, InboundContext};
use crate::traces::propagation::cross_app::CrossAppPayload;
use crate::traces::propagation::error::DistributedTraceError;

/// Per-transaction distributed tracing state.
#[derive(Debug, Default)]
pub struct DistributedTracer {
    accepted: Option<InboundContext>,
    outbound_created: bool,
    transport_duration_ms: Option<u64>,
    cross_app_inbound: Option<CrossAppPayload>,
}

impl DistributedTracer {
    /// The inbound context adopted by this transaction, if any.
    #[must_use]
    pub fn accepted(&self) -> Option<&InboundContext> {
        self.accepted.as_ref()
    }

    #[must_use]
    pub fn has_accepted(&self) -> bool {
        self.accepted.is_some()
    }

    #[must_use]
    pub fn has_created_outbound(&self) -> bool {
        self.outbound_created
    }

    /// Estimated network/queue latency between the caller emitting its
    /// context and this transaction accepting it.
    #[must_use]
    pub fn transport_duration_ms(&self) -> Option<u64> {
        self.transport_duration_ms
    }

    /// Legacy cross-application context received by this transaction, if
    /// any. Tracked separately from the distributed trace lifecycle.
    #[must_use]
    pub fn cross_app_inbound(&self) -> Option<&CrossAppPayload> {
        self.cross_app_inbound.as_ref()
    }

    pub(crate) fn record_outbound(&mut self) {
        self.outbound_created = true;
    }

    pub(crate) fn record_cross_app(&mut self, payload: CrossAppPayload) {
        self.transport_duration_ms =
            Some(unix_millis().saturating_sub(payload.timestamp_ms));
        self.cross_app_inbound = Some(payload);
    }

    /// Enforces the one-shot ordering invariant.
    pub(crate) fn check_accept_allowed(&self) -> Result<(), DistributedTraceError> {
        if self.outbound_created {
            return Err(DistributedTraceError::Lifecycle(
                "accept must precede outbound context creation",
            ));
        }
        if self.accepted.is_some() {
            return Err(DistributedTraceError::Lifecycle(
                "an inbound context was already accepted",
            ));
        }
        Ok(())
    }
}

/// An in-flight unit of work.
///
/// Starts with a freshly generated trace id, guid and priority; accepting an
/// inbound context replaces the generated trace identity with the caller's.
#[derive(Debug)]
pub struct Transaction {
    guid: String,
    trace_id: String,
    priority: f64,
    sampled: bool,
    current_span_guid: Option<String>,
    distributed_tracer: DistributedTracer,
}

impl Transaction {
    /// Starts a transaction with generated trace identity.
    ///
    /// A sampled transaction gets its priority boosted by a full unit so it
    /// wins sampling ties downstream.
    #[must_use]
    pub fn start(sampled: bool) -> Self {
        Self {
            guid: generate_guid(),
            trace_id: generate_trace_id(),
            priority: round_priority(fastrand::f64()) + f64::from(u8::from(sampled)),
            sampled,
            current_span_guid: None,
            distributed_tracer: DistributedTracer::default(),
        }
    }

    #[must_use]
    pub fn guid(&self) -> &str {
        &self.guid
    }

    /// Trace-wide identifier. Immutable except through adoption of an
    /// inbound context.
    #[must_use]
    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    #[must_use]
    pub fn priority(&self) -> f64 {
        self.priority
    }

    #[must_use]
    pub fn sampled(&self) -> bool {
        self.sampled
    }

    /// Marks the span currently doing work; outbound context emitted while
    /// it is set names it as the emitting unit.
    pub fn set_current_span(&mut self, guid: impl Into<String>) {
        self.current_span_guid = Some(guid.into());
    }

    pub fn clear_current_span(&mut self) {
        self.current_span_guid = None;
    }

    /// Guid of the emitting unit of work: the current span when one is
    /// marked, the transaction itself otherwise.
    #[must_use]
    pub fn span_guid(&self) -> &str {
        self.current_span_guid.as_deref().unwrap_or(&self.guid)
    }

    #[must_use]
    pub fn distributed_tracer(&self) -> &DistributedTracer {
        &self.distributed_tracer
    }

    pub(crate) fn distributed_tracer_mut(&mut self) -> &mut DistributedTracer {
        &mut self.distributed_tracer
    }

    /// Adopts an inbound context: the upstream decision is authoritative
    /// once accepted, so fields overwrite rather than merge. Fields the
    /// inbound context could not supply (a degraded join's priority) keep
    /// their locally generated values.
    pub(crate) fn adopt_inbound(
        &mut self,
        inbound: InboundContext,
    ) -> Result<(), DistributedTraceError> {
        self.distributed_tracer.check_accept_allowed()?;

        self.trace_id = inbound.identity.trace_id.clone();
        if let Some(sampled) = inbound.identity.sampling.sampled {
            self.sampled = sampled;
        }
        if let Some(priority) = inbound.identity.sampling.priority {
            self.priority = priority;
        }
        self.distributed_tracer.transport_duration_ms = inbound
            .identity
            .timestamp_ms
            .map(|ts| unix_millis().saturating_sub(ts));
        self.distributed_tracer.accepted = Some(inbound);
        Ok(())
    }
}

fn generate_guid() -> String {
    format!("{:016x}", fastrand::u64(1..))
}

fn generate_trace_id() -> String {
    format!("{:016x}{:016x}", fastrand::u64(..), fastrand::u64(1..))
}
