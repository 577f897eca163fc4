//! Logging setup for the `nutpipe` binary.
//!
//! The library crates only emit `tracing` events; the subscriber is
//! installed here so embedding applications keep control of their own
//! logging. Events go to stderr to leave stdout free for command output.

use clap::ValueEnum;
use tracing::level_filters::LevelFilter;

/// Environment fallback for `--log-level`.
pub const LOG_LEVEL_ENV: &str = "NUTPIPE_LOG";

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn as_filter(self) -> LevelFilter {
        match self {
            LogLevel::Off => LevelFilter::OFF,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

/// Install the stderr subscriber. A no-op if one is already set, so tests
/// that call through `main` paths repeatedly stay quiet.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    if matches!(level, LogLevel::Off) {
        return;
    }
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level.as_filter())
        .with_ansi(false)
        .with_target(false);

    match format {
        LogFormat::Text => {
            let _ = builder.try_init();
        }
        LogFormat::Json => {
            let _ = builder.json().try_init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_map_to_filters() {
        assert_eq!(LogLevel::Off.as_filter(), LevelFilter::OFF);
        assert_eq!(LogLevel::Warn.as_filter(), LevelFilter::WARN);
        assert_eq!(LogLevel::Trace.as_filter(), LevelFilter::TRACE);
    }

    #[test]
    fn levels_parse_from_cli_names() {
        assert_eq!(
            LogLevel::from_str("debug", true).unwrap(),
            LogLevel::Debug
        );
        assert!(LogLevel::from_str("loud", true).is_err());
    }
}
