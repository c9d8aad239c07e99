//! End-to-end propagation across simulated service boundaries: one service
//! creates outbound headers into a carrier, the next accepts them, and the
//! trace identity survives the hop.

use std::collections::HashMap;
use std::sync::Arc;

use apm_agent_core::config::Config;
use apm_agent_core::identity::AgentIdentity;
use apm_agent_core::traces::distributed_tracing::DistributedTracing;
use apm_agent_core::traces::propagation::carrier::{Extractor, Injector};
use apm_agent_core::traces::transaction::Transaction;
use apm_agent_core::traces::transport::TransportType;

fn facade() -> DistributedTracing {
    DistributedTracing::new(
        Arc::new(Config::default()),
        Arc::new(AgentIdentity::new("33", "2827902", None)),
    )
}

#[test]
fn trace_identity_survives_a_service_hop() {
    let sender = facade();
    let receiver = facade();

    let mut upstream = Transaction::start(true);
    let outbound = sender
        .create_outbound_context(Some(&mut upstream))
        .expect("outbound context");

    let mut carrier: HashMap<String, String> = HashMap::new();
    sender.insert_outbound_headers(&outbound, &mut carrier);

    let mut downstream = Transaction::start(false);
    receiver.accept_inbound_headers(Some(&mut downstream), &carrier, TransportType::Https);

    assert_eq!(downstream.trace_id(), upstream.trace_id());
    assert!(downstream.sampled(), "root sampling decision is adopted");
    assert_eq!(downstream.priority(), outbound.identity().sampling.priority.expect("priority"));

    let accepted = downstream
        .distributed_tracer()
        .accepted()
        .expect("accepted context");
    assert!(accepted.trusted);
    assert!(!accepted.degraded);
    assert_eq!(accepted.transport, TransportType::Https);

    // The next hop keeps propagating the same trace id.
    let next = receiver
        .create_outbound_context(Some(&mut downstream))
        .expect("second hop outbound");
    assert_eq!(next.identity().trace_id, upstream.trace_id());
    assert!(next
        .to_traceparent()
        .contains(upstream.trace_id()));
}

#[test]
fn foreign_tracestate_entries_pass_through_unchanged() {
    let receiver = facade();

    let mut carrier: HashMap<String, String> = HashMap::new();
    carrier.set(
        "traceparent",
        "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01".to_string(),
    );
    carrier.set(
        "tracestate",
        "other=1,33@apm=0-0-33-2827902-00f067aa0ba902b7-7d3efb1b173fecfa-1-1.500000-1518469636035,another=2"
            .to_string(),
    );

    let mut txn = Transaction::start(false);
    receiver.accept_inbound_headers(Some(&mut txn), &carrier, TransportType::Kafka);

    let outbound = receiver
        .create_outbound_context(Some(&mut txn))
        .expect("outbound context");
    let tracestate = outbound.to_tracestate();

    assert!(
        tracestate.starts_with("33@apm="),
        "refreshed own entry leads: {tracestate}"
    );
    let own_end = tracestate.find(',').expect("foreign entries present");
    assert_eq!(&tracestate[own_end..], ",other=1,another=2");
}

#[test]
fn degraded_inbound_keeps_local_priority_but_joins_the_trace() {
    let receiver = facade();

    let mut carrier: HashMap<String, String> = HashMap::new();
    carrier.set(
        "traceparent",
        "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01".to_string(),
    );
    carrier.set("tracestate", "33@apm=corrupted".to_string());

    let mut txn = Transaction::start(false);
    let local_priority = txn.priority();
    receiver.accept_inbound_headers(Some(&mut txn), &carrier, TransportType::Http);

    assert_eq!(txn.trace_id(), "4bf92f3577b34da6a3ce929d0e0e4736");
    assert!(txn.sampled(), "sampled flag comes from traceparent");
    assert_eq!(txn.priority(), local_priority);
    assert!(txn.distributed_tracer().accepted().expect("accepted").degraded);
}

#[test]
fn unrecognized_traceparent_version_leaves_the_transaction_alone() {
    let receiver = facade();

    let mut carrier: HashMap<String, String> = HashMap::new();
    carrier.set(
        "traceparent",
        "42-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01".to_string(),
    );

    let mut txn = Transaction::start(false);
    let generated = txn.trace_id().to_string();
    receiver.accept_inbound_headers(Some(&mut txn), &carrier, TransportType::Http);

    assert_eq!(txn.trace_id(), generated);
    assert!(!txn.distributed_tracer().has_accepted());
}

#[test]
fn payload_header_round_trips_the_concrete_example() {
    let sender = facade();
    let receiver = facade();

    let mut upstream = Transaction::start(true);
    upstream.set_current_span("00f067aa0ba902b7");
    let outbound = sender
        .create_outbound_context(Some(&mut upstream))
        .expect("outbound context");

    let header = outbound.to_header_string();
    let mut downstream = Transaction::start(false);
    receiver.accept_inbound_context(Some(&mut downstream), &header, TransportType::Http);

    let accepted = downstream
        .distributed_tracer()
        .accepted()
        .expect("accepted context");
    assert_eq!(accepted.identity.trace_id, upstream.trace_id());
    assert_eq!(accepted.identity.span_id.as_deref(), Some("00f067aa0ba902b7"));
    assert_eq!(accepted.identity.account_id.as_deref(), Some("33"));
    assert_eq!(accepted.identity.app_id.as_deref(), Some("2827902"));
    assert_eq!(accepted.identity.sampling.sampled, Some(true));
    assert_eq!(
        accepted.identity.sampling.priority,
        outbound.identity().sampling.priority
    );
}

#[test]
fn disabled_configuration_is_a_complete_no_op() {
    let disabled = DistributedTracing::new(
        Arc::new(Config {
            distributed_tracing_enabled: false,
            ..Config::default()
        }),
        Arc::new(AgentIdentity::new("33", "2827902", None)),
    );

    let mut txn = Transaction::start(false);
    let generated = txn.trace_id().to_string();

    assert!(disabled.create_outbound_context(Some(&mut txn)).is_none());

    let mut carrier: HashMap<String, String> = HashMap::new();
    carrier.set(
        "traceparent",
        "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01".to_string(),
    );
    disabled.accept_inbound_headers(Some(&mut txn), &carrier, TransportType::Http);

    assert_eq!(txn.trace_id(), generated);
    assert!(!txn.distributed_tracer().has_accepted());
    assert!(!txn.distributed_tracer().has_created_outbound());
}

#[test]
fn message_envelope_carriers_work_like_header_maps() {
    let sender = facade();
    let receiver = facade();

    let mut upstream = Transaction::start(true);
    let outbound = sender
        .create_outbound_context(Some(&mut upstream))
        .expect("outbound context");

    let mut envelope = serde_json::Value::Object(serde_json::Map::new());
    sender.insert_outbound_headers(&outbound, &mut envelope);
    assert!(Extractor::get(&envelope, "traceparent").is_some());

    let mut downstream = Transaction::start(false);
    receiver.accept_inbound_headers(Some(&mut downstream), &envelope, TransportType::Amqp);

    assert_eq!(downstream.trace_id(), upstream.trace_id());
}
