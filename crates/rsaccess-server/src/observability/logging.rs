//! Structured logging for the CLI.
//!
//! Everything is written to stderr, which leaves stdout free for command
//! output. When `RUST_LOG` is set it takes precedence over `logging.level`.

use std::str::FromStr;

use tracing::{Level, Subscriber};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan, MakeWriter},
    prelude::*,
    registry::LookupSpan,
    EnvFilter, Layer,
};

use crate::config::LoggingSettings;

/// Resolved logging options.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggingConfig {
    /// JSON lines instead of human readable text
    pub json: bool,
    /// Used when `RUST_LOG` is unset
    pub level: Level,
    /// Log span enter/exit for `#[instrument]`ed store calls
    pub spans: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::from_settings(&LoggingSettings::default())
    }
}

impl LoggingConfig {
    /// Builds the logging setup from the `logging` config section.
    ///
    /// `ServerConfig::validate` has already checked the level; anything
    /// unparseable falls back to INFO.
    pub fn from_settings(settings: &LoggingSettings) -> Self {
        Self {
            json: settings.json,
            level: Level::from_str(&settings.level).unwrap_or(Level::INFO),
            spans: settings.spans,
        }
    }

    fn span_events(&self) -> FmtSpan {
        if self.spans {
            FmtSpan::ENTER | FmtSpan::EXIT
        } else {
            FmtSpan::NONE
        }
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.level.as_str()))
    }

    fn layer<S, W>(&self, writer: W) -> Box<dyn Layer<S> + Send + Sync>
    where
        S: Subscriber + for<'span> LookupSpan<'span>,
        W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
    {
        let layer = fmt::layer()
            .with_writer(writer)
            .with_span_events(self.span_events())
            .with_target(true);
        if self.json {
            layer.json().with_current_span(true).boxed()
        } else {
            layer.pretty().boxed()
        }
    }
}

/// Install the global subscriber.
///
/// Only the first call has any effect.
pub fn init_logging(config: LoggingConfig) {
    let _ = tracing_subscriber::registry()
        .with(config.layer(std::io::stderr))
        .with(config.filter())
        .try_init();
}
