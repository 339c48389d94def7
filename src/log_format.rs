//! Custom log format with a microsecond wall-clock prefix.
//!
//! Every line starts with `[HH:MM:SS.uuuuuu]` so interleavings between
//! aircraft can be read off the console directly, followed by
//! `LEVEL target: message`.

use std::fmt;
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::fmt::format::{self, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

pub struct TowerLogFormat;

impl<S, N> FormatEvent<S, N> for TowerLogFormat
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

        // Timestamp: HH:MM:SS.microseconds, local time
        write!(writer, "[{}] ", chrono::Local::now().format("%H:%M:%S%.6f"))?;

        // Level with color
        let level = metadata.level();
        let level_style = match *level {
            tracing::Level::ERROR => "\x1b[31m", // Red
            tracing::Level::WARN => "\x1b[33m",  // Yellow
            tracing::Level::INFO => "\x1b[32m",  // Green
            tracing::Level::DEBUG => "\x1b[34m", // Blue
            tracing::Level::TRACE => "\x1b[35m", // Magenta
        };
        write!(writer, "{}{:>5}\x1b[0m ", level_style, level)?;

        // Target (module path)
        write!(writer, "{}: ", metadata.target())?;

        // The event message and fields
        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}
