//! Log formatting for the agent.
//!
//! Everything this library logs is prefixed with `APM_AGENT` so agent lines
//! are easy to filter out of the host application's output:
//!
//! ```text
//! APM_AGENT | WARN | accept_inbound_context refused: payload from untrusted account 99
//! ```
//!
//! The host application decides whether and how to install a subscriber;
//! [`init`] is a convenience for hosts without their own `tracing` setup.

use std::fmt;

use tracing_core::{Event, Subscriber};
use tracing_subscriber::fmt::{
    format::{self, FormatEvent, FormatFields},
    FmtContext, FormattedFields,
};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

/// Event formatter prefixing every line with `APM_AGENT | LEVEL |`.
///
/// Active spans are included root-first, with their fields in braces, so a
/// nested operation keeps its context on one line.
#[derive(Debug, Clone, Copy)]
pub struct Formatter;

impl<S, N> FormatEvent<S, N> for Formatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();
        write!(&mut writer, "APM_AGENT | {} | ", metadata.level())?;

        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                write!(writer, "{}", span.name())?;

                let ext = span.extensions();
                let fields = &ext
                    .get::<FormattedFields<N>>()
                    .expect("span fields are formatted at creation");
                if !fields.is_empty() {
                    write!(writer, "{{{fields}}}")?;
                }
                write!(writer, ": ")?;
            }
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

/// Installs a global subscriber using [`Formatter`], filtered by `RUST_LOG`.
///
/// A no-op when the host already installed a subscriber.
pub fn init() {
    let subscriber = tracing_subscriber::fmt()
        .event_format(Formatter)
        .with_env_filter(EnvFilter::from_default_env())
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}
