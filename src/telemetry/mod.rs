//! Tracing bootstrap and `EventBus` sink formatting.
//!
//! `init_tracing` is the one-shot `tracing-subscriber` installer every
//! binary embedding this crate is expected to call once at startup, mirrored
//! on the teacher's own telemetry bootstrap. `TelemetryFormatter` is the
//! narrower per-event rendering trait `event_bus::sink::StdOutSink` uses —
//! unrelated to the `tracing` layer, it only concerns itself with turning an
//! [`crate::event_bus::Event`] into printable lines.

use crate::event_bus::Event;
use tracing_subscriber::EnvFilter;

pub const CONTEXT_COLOR: &str = "\x1b[32m"; // green
pub const LINE_COLOR: &str = "\x1b[35m"; // magenta / dark pink
pub const RESET_COLOR: &str = "\x1b[0m";

/// Installs a global `tracing` subscriber with the given filter (e.g.
/// `EnvFilter::from_default_env()` or `"graphautoma=debug"`). Idempotent:
/// a second call is a no-op rather than a panic, so tests and examples can
/// call it freely. Loads a `.env` file first (if present) so `RUST_LOG` can
/// be set there instead of the process environment, the same convenience
/// the teacher's runtime config reads at startup.
pub fn init_tracing(filter: impl Into<EnvFilter>) {
    dotenvy::dotenv().ok();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter.into())
        .with_ansi(true)
        .with_target(false)
        .try_init();
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
}

pub struct PlainFormatter;

impl PlainFormatter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PlainFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryFormatter for PlainFormatter {
    fn render_event(&self, event: &Event) -> EventRender {
        let line = format!("{LINE_COLOR}{}{RESET_COLOR}\n", event);
        EventRender {
            context: Some(event.scope_label().to_string()),
            lines: vec![line],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_formatter_renders_a_single_line() {
        let formatter = PlainFormatter::new();
        let event = Event::diagnostic("startup", "ready");
        let render = formatter.render_event(&event);
        assert_eq!(render.context.as_deref(), Some("startup"));
        assert_eq!(render.lines.len(), 1);
    }
}
