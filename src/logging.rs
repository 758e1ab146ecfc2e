use anyhow::{Context, Result};
use colored::*;
use std::fmt;
use std::path::Path;
use tracing::{Event, Level, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, Writer};
use tracing_subscriber::fmt::{FmtContext, FormattedFields};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Name of the span every candidate run executes in.
pub const CANDIDATE_SPAN: &str = "candidate";

/// A custom tracing event formatter for colorizing log output based on level.
///
/// The whole line is coloured by severity, with no timestamps or level
/// labels. Events emitted inside a candidate span are prefixed with the
/// candidate's name, e.g. `[node] Launched 'node server.js' (pid 4242)`.
pub struct ColorizedFormatter {
    ansi: bool,
}

impl ColorizedFormatter {
    pub fn colored() -> Self {
        Self { ansi: true }
    }

    /// Same layout without colour, for log files.
    pub fn plain() -> Self {
        Self { ansi: false }
    }
}

impl<S, N> FormatEvent<S, N> for ColorizedFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let mut buffer = String::new();
        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root().filter(|s| s.name() == CANDIDATE_SPAN) {
                let extensions = span.extensions();
                if let Some(fields) = extensions.get::<FormattedFields<N>>() {
                    let label = fields.fields.strip_prefix("name=").unwrap_or(&fields.fields);
                    buffer.push_str(&format!("[{}] ", label));
                }
            }
        }

        // format_fields writes directly, so buffer to colour the whole line.
        let mut buf_writer = Writer::new(&mut buffer);
        ctx.format_fields(buf_writer.by_ref(), event)?;

        if !self.ansi {
            return writeln!(writer, "{}", buffer);
        }

        let colored_output = match *event.metadata().level() {
            Level::INFO => buffer.white(),
            Level::WARN => buffer.yellow(),
            Level::ERROR => buffer.red(),
            Level::DEBUG => buffer.blue(),
            Level::TRACE => buffer.purple(),
        };
        writeln!(writer, "{}", colored_output)
    }
}

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over `default_level`. With `log_file`, an
/// uncoloured copy of every line is written through a non-blocking writer;
/// the returned guard must be held until exit so buffered lines get flushed.
pub fn init(default_level: &str, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let console = tracing_subscriber::fmt::layer()
        .event_format(ColorizedFormatter::colored())
        .with_writer(std::io::stderr);

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let file_name = path
                .file_name()
                .with_context(|| format!("Log file path {:?} has no file name", path))?;
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {:?}", dir))?;

            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .event_format(ColorizedFormatter::plain())
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}
