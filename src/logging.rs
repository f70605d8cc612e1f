//! Log output for the QA tool
//!
//! One global `tracing` subscriber, installed once per process from the
//! `[application]` section of the config. `RUST_LOG`, when set, replaces the
//! configured level so a single module can be turned up during bring-up:
//!
//! ```text
//! RUST_LOG=imu_qa::session=trace imu-qa run --simulate
//! ```
//!
//! Pretty output is meant for an operator at the bench, JSON for capture by
//! the line's log collector.

use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

use crate::config::{AppConfig, LogFormat};

/// How the subscriber renders events
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    /// Level used when `RUST_LOG` is unset
    pub level: Level,
    pub format: LogFormat,
    /// Emit span open/close events, which shows how long each session
    /// start and QA pass took
    pub span_timing: bool,
    /// Prefix events with their source file and line
    pub source_location: bool,
}

impl LogSettings {
    /// Settings for `config`. Span timing and source locations come on
    /// together with debug or trace output.
    pub fn from_app_config(config: &AppConfig) -> Result<Self, String> {
        let level: Level = config
            .application
            .log_level
            .parse()
            .map_err(|_| format!("unknown log level '{}'", config.application.log_level))?;
        let verbose = level >= Level::DEBUG;

        Ok(Self {
            level,
            format: config.application.log_format,
            span_timing: verbose,
            source_location: verbose,
        })
    }
}

/// Install the subscriber described by `config`.
pub fn init_from_config(config: &AppConfig) -> Result<(), String> {
    init(&LogSettings::from_app_config(config)?)
}

/// Install the global subscriber.
///
/// Does nothing when one is already installed (a second pass in the same
/// process, or a test harness that set its own).
pub fn init(settings: &LogSettings) -> Result<(), String> {
    if tracing::dispatcher::has_been_set() {
        return Ok(());
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.level.as_str().to_lowercase()));
    let spans = if settings.span_timing {
        FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };
    let base = fmt::layer()
        .with_span_events(spans)
        .with_file(settings.source_location)
        .with_line_number(settings.source_location)
        .with_target(settings.source_location);

    let layer = match settings.format {
        LogFormat::Pretty => base.pretty().with_filter(filter).boxed(),
        LogFormat::Compact => base.compact().with_ansi(false).with_filter(filter).boxed(),
        LogFormat::Json => base.json().with_ansi(false).with_filter(filter).boxed(),
    };

    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .map_err(|e| format!("cannot install log subscriber: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app(level: &str, format: LogFormat) -> AppConfig {
        let mut config = AppConfig::default();
        config.application.log_level = level.to_string();
        config.application.log_format = format;
        config
    }

    #[test]
    fn test_levels_parse_case_insensitively() {
        let settings = LogSettings::from_app_config(&app("WARN", LogFormat::Pretty)).unwrap();
        assert_eq!(settings.level, Level::WARN);
        assert!(!settings.span_timing);

        let err = LogSettings::from_app_config(&app("loud", LogFormat::Pretty)).unwrap_err();
        assert!(err.contains("loud"));
    }

    #[test]
    fn test_debug_turns_on_span_timing() {
        let settings = LogSettings::from_app_config(&app("debug", LogFormat::Json)).unwrap();
        assert_eq!(settings.level, Level::DEBUG);
        assert_eq!(settings.format, LogFormat::Json);
        assert!(settings.span_timing);
        assert!(settings.source_location);
    }

    #[test]
    fn test_second_init_is_a_no_op() {
        let config = app("error", LogFormat::Compact);
        assert!(init_from_config(&config).is_ok());
        assert!(init_from_config(&config).is_ok());
    }
}
