//! Tracing initialization and event formatting.
//!
//! [`init`] wires up the global `tracing` subscriber (env-filter + fmt) used
//! by the assistant service; [`PlainFormatter`] renders event-bus events and
//! error ledgers for the stdout sink.

use crate::channels::errors::ErrorEvent;
use crate::event_bus::Event;
use std::io::IsTerminal;
use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

pub const CONTEXT_COLOR: &str = "\x1b[32m"; // green
pub const LINE_COLOR: &str = "\x1b[35m"; // magenta
pub const RESET_COLOR: &str = "\x1b[0m";

/// Install the global tracing subscriber.
///
/// Filter defaults to `info` and is overridden by `RUST_LOG`. Idempotent:
/// a second call is a no-op rather than a panic, so tests can all call it.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_ansi(std::io::stderr().is_terminal()))
        .with(ErrorLayer::default())
        .try_init();
}

/// Formatter color mode for telemetry output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FormatterMode {
    /// Auto-detect TTY capability (checks `stderr.is_terminal()`)
    #[default]
    Auto,
    /// Always include ANSI color codes
    Colored,
    /// Never include ANSI color codes
    Plain,
}

impl FormatterMode {
    /// Returns true if this mode should use colored output.
    pub fn is_colored(&self) -> bool {
        match self {
            FormatterMode::Auto => std::io::stderr().is_terminal(),
            FormatterMode::Colored => true,
            FormatterMode::Plain => false,
        }
    }
}

/// Rendered output for a telemetry item that can be consumed by sinks.
#[derive(Clone, Debug, Default)]
pub struct EventRender {
    pub context: Option<String>,
    pub lines: Vec<String>,
}

impl EventRender {
    pub fn join_lines(&self) -> String {
        self.lines.join("")
    }
}

pub trait TelemetryFormatter: Send + Sync {
    fn render_event(&self, event: &Event) -> EventRender;
    fn render_errors(&self, errors: &[ErrorEvent]) -> Vec<EventRender>;
}

/// Plain text formatter with optional ANSI color codes, controlled by
/// [`FormatterMode`].
pub struct PlainFormatter {
    mode: FormatterMode,
}

impl PlainFormatter {
    /// Create a formatter with auto-detected color mode.
    pub fn new() -> Self {
        Self {
            mode: FormatterMode::Auto,
        }
    }

    /// Create a formatter with explicit color mode.
    pub fn with_mode(mode: FormatterMode) -> Self {
        Self { mode }
    }

    /// Wraps one output line in the given color when color is on, and
    /// terminates it.
    fn paint(&self, color: &str, text: impl AsRef<str>) -> String {
        if self.mode.is_colored() {
            format!("{color}{}{RESET_COLOR}\n", text.as_ref())
        } else {
            format!("{}\n", text.as_ref())
        }
    }
}

impl Default for PlainFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryFormatter for PlainFormatter {
    fn render_event(&self, event: &Event) -> EventRender {
        EventRender {
            context: event.scope_label().map(|s| s.to_string()),
            lines: vec![self.paint(LINE_COLOR, event.to_string())],
        }
    }

    fn render_errors(&self, errors: &[ErrorEvent]) -> Vec<EventRender> {
        errors
            .iter()
            .enumerate()
            .map(|(i, e)| {
                let mut lines = vec![format!(
                    "[{i}] {} | {}",
                    e.when,
                    self.paint(CONTEXT_COLOR, format!("{:?}", e.scope))
                )];
                lines.push(self.paint(LINE_COLOR, format!("  error: {}", e.error.message)));

                let mut cause = e.error.cause.as_deref();
                let mut depth = 1;
                while let Some(detail) = cause {
                    let indent = "  ".repeat(depth);
                    lines.push(self.paint(LINE_COLOR, format!("{indent}cause: {}", detail.message)));
                    cause = detail.cause.as_deref();
                    depth += 1;
                }

                if !e.tags.is_empty() {
                    lines.push(self.paint(LINE_COLOR, format!("  tags: {:?}", e.tags)));
                }
                if !e.context.is_null() {
                    lines.push(self.paint(LINE_COLOR, format!("  context: {}", e.context)));
                }

                EventRender {
                    context: Some(format!("{:?}", e.scope)),
                    lines,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::errors::ErrorDetail;

    #[test]
    fn plain_mode_has_no_ansi_codes() {
        let formatter = PlainFormatter::with_mode(FormatterMode::Plain);
        let event = Event::node_message_with_meta("planner", 1, "plan", "ok");
        let rendered = formatter.render_event(&event).join_lines();
        assert!(!rendered.contains("\x1b["));
        assert!(rendered.contains("[planner@1] ok"));
    }

    #[test]
    fn error_render_includes_cause_chain() {
        let formatter = PlainFormatter::with_mode(FormatterMode::Plain);
        let event = ErrorEvent::app(
            ErrorDetail::msg("save failed").with_cause(ErrorDetail::msg("pool timeout")),
        );
        let renders = formatter.render_errors(&[event]);
        let text = renders[0].join_lines();
        assert!(text.contains("error: save failed"));
        assert!(text.contains("cause: pool timeout"));
    }
}
