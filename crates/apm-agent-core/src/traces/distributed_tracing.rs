//! Public entry point for distributed trace context operations.
//!
//! [`DistributedTracing`] is the only surface instrumentation code talks to.
//! It gates every operation on configuration and on there being an active
//! transaction, dispatches to the wire format codecs, and enforces the
//! one-shot accept lifecycle.
//!
//! # Containment
//!
//! This library instruments a host application and must never crash it.
//! Internals return `Result` so the refusal reasons stay testable; this
//! facade is the single boundary where they are logged and converted into
//! "nothing". Callers only ever observe "got a usable context" or "got
//! nothing" — a deliberate API shape, since context headers are legitimately
//! absent on the very first hop of a trace.
//!
//! # Explicit context passing
//!
//! The active transaction is an explicit argument rather than an ambient
//! thread-local: the instrumentation point that owns the request hands its
//! transaction in, and `None` models "no transaction in flight".

use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::config::propagation_style::PropagationStyle;
use crate::config::Config;
use crate::identity::AgentIdentity;
use crate::traces::context::{
    round_priority, unix_millis, InboundContext, ParentType, Sampling, TraceIdentity,
};
use crate::traces::propagation::carrier::{Extractor, Injector};
use crate::traces::propagation::cross_app::{self, CROSS_APP_HEADER};
use crate::traces::propagation::error::DistributedTraceError;
use crate::traces::propagation::payload::{self, PAYLOAD_HEADER};
use crate::traces::propagation::trace_context::{self, TRACEPARENT_KEY, TRACESTATE_KEY};
use crate::traces::propagation::OutboundContext;
use crate::traces::transaction::Transaction;
use crate::traces::transport::TransportType;

/// Facade over payload creation and acceptance.
///
/// Cheap to clone; holds shared handles to the process-wide configuration
/// and identity. Configuration fields are read at call time, so swapping in
/// an updated `Config` takes effect on the next call.
#[derive(Clone)]
pub struct DistributedTracing {
    config: Arc<Config>,
    identity: Arc<AgentIdentity>,
}

impl DistributedTracing {
    #[must_use]
    pub fn new(config: Arc<Config>, identity: Arc<AgentIdentity>) -> Self {
        Self { config, identity }
    }

    /// Creates an outbound context from the active transaction's tracer
    /// state.
    ///
    /// Returns `None` — with the reason logged — when tracing is disabled or
    /// no transaction is active. Each successful call produces a fresh
    /// handle reflecting current state and marks the transaction as having
    /// emitted outbound context.
    pub fn create_outbound_context(
        &self,
        transaction: Option<&mut Transaction>,
    ) -> Option<OutboundContext> {
        match self.try_create(transaction) {
            Ok(outbound) => Some(outbound),
            Err(e) => {
                log_refusal("create_outbound_context", &e);
                None
            }
        }
    }

    /// Accepts an inbound context in the primary envelope format.
    ///
    /// Purely side-effecting: on success the transaction's tracer state
    /// adopts the inbound trace identity. Failures are logged and otherwise
    /// swallowed.
    pub fn accept_inbound_context(
        &self,
        transaction: Option<&mut Transaction>,
        raw: &str,
        transport: TransportType,
    ) {
        if let Err(e) = self.try_accept_payload(transaction, raw, transport) {
            log_refusal("accept_inbound_context", &e);
        }
    }

    /// Accepts an inbound context from a header carrier, scanning the
    /// configured extraction styles in order. The first style whose headers
    /// are present wins; absent headers are not an error.
    pub fn accept_inbound_headers(
        &self,
        transaction: Option<&mut Transaction>,
        carrier: &dyn Extractor,
        transport: TransportType,
    ) {
        if let Err(e) = self.try_accept_headers(transaction, carrier, transport) {
            log_refusal("accept_inbound_headers", &e);
        }
    }

    /// Writes every configured outbound style into the carrier.
    pub fn insert_outbound_headers(
        &self,
        outbound: &OutboundContext,
        carrier: &mut dyn Injector,
    ) {
        for style in &self.config.trace_propagation_style_inject {
            match style {
                PropagationStyle::Payload => {
                    carrier.set(PAYLOAD_HEADER, outbound.to_header_string());
                }
                PropagationStyle::TraceContext => {
                    carrier.set(TRACEPARENT_KEY, outbound.to_traceparent());
                    carrier.set(TRACESTATE_KEY, outbound.to_tracestate());
                }
                PropagationStyle::CrossApp => {
                    if self.config.cross_application_tracing_enabled {
                        carrier.set(CROSS_APP_HEADER, outbound.to_cross_app_header());
                    }
                }
                PropagationStyle::None => {}
            }
        }
    }

    fn try_create(
        &self,
        transaction: Option<&mut Transaction>,
    ) -> Result<OutboundContext, DistributedTraceError> {
        self.check_enabled()?;
        let transaction = transaction.ok_or(DistributedTraceError::NoActiveTransaction)?;

        let identity = self.outbound_identity(transaction);
        let foreign = transaction
            .distributed_tracer()
            .accepted()
            .map(|accepted| accepted.foreign_tracestate.clone())
            .unwrap_or_default();

        let outbound = OutboundContext::new(
            identity,
            self.identity.trusted_account_key.clone(),
            foreign,
        );
        transaction.distributed_tracer_mut().record_outbound();
        Ok(outbound)
    }

    fn try_accept_payload(
        &self,
        transaction: Option<&mut Transaction>,
        raw: &str,
        transport: TransportType,
    ) -> Result<(), DistributedTraceError> {
        self.check_enabled()?;
        let transaction = transaction.ok_or(DistributedTraceError::NoActiveTransaction)?;
        if raw.trim().is_empty() {
            return Err(DistributedTraceError::EmptyPayload);
        }
        transaction.distributed_tracer().check_accept_allowed()?;

        let parsed = payload::parse(raw)?;
        if !parsed.is_trusted(&self.identity.trusted_account_key) {
            return Err(DistributedTraceError::UntrustedAccount(
                parsed.caller_account().to_string(),
            ));
        }
        if parsed.degraded {
            warn!("inbound context carried out-of-range fields, adopting degraded");
        }

        transaction.adopt_inbound(InboundContext {
            identity: parsed.identity,
            transport,
            trusted: true,
            degraded: parsed.degraded,
            foreign_tracestate: Vec::new(),
        })
    }

    fn try_accept_headers(
        &self,
        transaction: Option<&mut Transaction>,
        carrier: &dyn Extractor,
        transport: TransportType,
    ) -> Result<(), DistributedTraceError> {
        self.check_enabled()?;
        let transaction = transaction.ok_or(DistributedTraceError::NoActiveTransaction)?;

        for style in &self.config.trace_propagation_style_extract {
            match style {
                PropagationStyle::TraceContext => {
                    if carrier.get(TRACEPARENT_KEY).is_some() {
                        return self.accept_trace_context_on(transaction, carrier, transport);
                    }
                }
                PropagationStyle::Payload => {
                    if let Some(raw) = carrier.get(PAYLOAD_HEADER) {
                        return self.accept_payload_on(transaction, raw, transport);
                    }
                }
                PropagationStyle::CrossApp => {
                    if let Some(raw) = carrier.get(CROSS_APP_HEADER) {
                        accept_cross_app_on(transaction, raw);
                        return Ok(());
                    }
                }
                PropagationStyle::None => {}
            }
        }

        debug!("no distributed trace headers present");
        Ok(())
    }

    fn accept_trace_context_on(
        &self,
        transaction: &mut Transaction,
        carrier: &dyn Extractor,
        transport: TransportType,
    ) -> Result<(), DistributedTraceError> {
        transaction.distributed_tracer().check_accept_allowed()?;

        let extracted = trace_context::extract(carrier, &self.identity.vendor_key())?;
        if extracted.degraded {
            warn!("joining trace on traceparent only, priority falls back to local value");
        }

        transaction.adopt_inbound(InboundContext {
            identity: extracted.identity,
            transport,
            trusted: extracted.trusted,
            degraded: extracted.degraded,
            foreign_tracestate: extracted.foreign_entries,
        })
    }

    fn accept_payload_on(
        &self,
        transaction: &mut Transaction,
        raw: &str,
        transport: TransportType,
    ) -> Result<(), DistributedTraceError> {
        transaction.distributed_tracer().check_accept_allowed()?;

        let parsed = payload::parse(raw)?;
        if !parsed.is_trusted(&self.identity.trusted_account_key) {
            return Err(DistributedTraceError::UntrustedAccount(
                parsed.caller_account().to_string(),
            ));
        }
        if parsed.degraded {
            warn!("inbound context carried out-of-range fields, adopting degraded");
        }

        transaction.adopt_inbound(InboundContext {
            identity: parsed.identity,
            transport,
            trusted: true,
            degraded: parsed.degraded,
            foreign_tracestate: Vec::new(),
        })
    }

    fn check_enabled(&self) -> Result<(), DistributedTraceError> {
        if self.config.distributed_tracing_enabled {
            Ok(())
        } else {
            Err(DistributedTraceError::Disabled)
        }
    }

    fn outbound_identity(&self, transaction: &Transaction) -> TraceIdentity {
        TraceIdentity {
            trace_id: transaction.trace_id().to_string(),
            span_id: Some(transaction.span_guid().to_string()),
            transaction_id: Some(transaction.guid().to_string()),
            parent_type: ParentType::App,
            account_id: Some(self.identity.account_id.clone()),
            app_id: Some(self.identity.primary_application_id.clone()),
            sampling: Sampling {
                sampled: Some(transaction.sampled()),
                priority: Some(round_priority(transaction.priority())),
            },
            timestamp_ms: Some(unix_millis()),
        }
    }
}

/// Legacy context has no trace identity to adopt; it is recorded on the
/// tracer without touching the distributed trace lifecycle.
fn accept_cross_app_on(transaction: &mut Transaction, raw: &str) {
    if let Some(parsed) = cross_app::parse(raw) {
        transaction.distributed_tracer_mut().record_cross_app(parsed);
    }
}

fn log_refusal(operation: &str, e: &DistributedTraceError) {
    match e {
        DistributedTraceError::Disabled
        | DistributedTraceError::Lifecycle(_)
        | DistributedTraceError::UntrustedAccount(_) => warn!("{operation} refused: {e}"),
        DistributedTraceError::Malformed(_) => error!("{operation} failed: {e}"),
        DistributedTraceError::NoActiveTransaction | DistributedTraceError::EmptyPayload => {
            debug!("{operation} skipped: {e}");
        }
    }
}
