use std::fmt;
use std::time::Instant;

use tracing::{Event, Subscriber};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

use crate::errors::bail;

/// Maps the log-level vocabulary of spec §6 (`trace | debug | info | warn |
/// fatal | panic`) onto the levels `tracing` understands.
fn env_filter_for(log_level: &str) -> anyhow::Result<EnvFilter> {
    let level = match log_level {
        "trace" => "trace",
        "debug" => "debug",
        "info" => "info",
        "warn" => "warn",
        "fatal" | "panic" => "error",
        other => bail!("unrecognized log-level: {other}"),
    };
    Ok(EnvFilter::new(level))
}

/// Installs the process-wide `tracing` subscriber for one of the three
/// `log-format` values (spec §6). `text` and `json` are the teacher's
/// existing compact/json fmt subscribers; `simple` (the default) installs
/// [`SimpleFormatter`], the configuration surface for the external "log
/// formatter" collaborator (spec §1).
pub fn setup(log_level: &str, log_format: &str) -> anyhow::Result<()> {
    let env_filter = env_filter_for(log_level)?;

    match log_format {
        "json" => {
            tracing_subscriber::fmt()
                .with_target(false)
                .with_env_filter(env_filter)
                .json()
                .init();
        },
        "text" => {
            tracing_subscriber::fmt()
                .with_file(true)
                .with_line_number(true)
                .with_target(false)
                .with_env_filter(env_filter)
                .compact()
                .init();
        },
        "simple" => {
            tracing_subscriber::fmt()
                .with_target(false)
                .with_env_filter(env_filter)
                .event_format(SimpleFormatter::new())
                .init();
        },
        other => bail!("unrecognized log-format: {other}"),
    }
    Ok(())
}

/// A compact one-line-per-event formatter: `LEVEL[elapsed-secs] scope field=val... -> message`.
///
/// Grounded on `pkg/utils/logger/simple_formatter.go`; the terminal-color
/// escape-sequence branch in the original is not reproduced here, since it's
/// a presentation detail of the external log formatter, not the ambient
/// configuration surface this crate owns.
pub struct SimpleFormatter {
    start: Instant,
}

impl SimpleFormatter {
    pub fn new() -> Self {
        Self { start: Instant::now() }
    }
}

impl Default for SimpleFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, N> FormatEvent<S, N> for SimpleFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(&self, ctx: &FmtContext<'_, S, N>, mut writer: Writer<'_>, event: &Event<'_>) -> fmt::Result {
        let meta = event.metadata();
        let level = meta.level().as_str().to_uppercase();
        let level4 = &level[..level.len().min(4)];
        let elapsed = self.start.elapsed().as_secs();
        write!(writer, "{level4:<4}[{elapsed:04}] ")?;

        let scope = ctx
            .event_scope()
            .and_then(|scope| scope.into_iter().last())
            .map(|span| span.name())
            .unwrap_or("main");
        write!(writer, "{scope:<15.15} ")?;

        ctx.format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}
