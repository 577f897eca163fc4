mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "nutpipe", version, about = "Frame container inspection and exchange CLI")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(
        long,
        value_name = "LEVEL",
        default_value = "info",
        env = logging::LOG_LEVEL_ENV,
        global = true
    )]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_info_subcommand() {
        let cli = Cli::try_parse_from(["nutpipe", "info", "capture.nut"])
            .expect("info args should parse");
        assert!(matches!(cli.command, Command::Info(_)));
    }

    #[test]
    fn parses_frames_with_filters() {
        let cli = Cli::try_parse_from([
            "nutpipe", "frames", "-", "--count", "10", "--stream", "1",
        ])
        .expect("frames args should parse");
        match cli.command {
            Command::Frames(args) => {
                assert_eq!(args.count, Some(10));
                assert_eq!(args.stream, Some(1));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn parses_global_format_flag() {
        let cli = Cli::try_parse_from(["nutpipe", "listen", "--format", "json"])
            .expect("listen args should parse");
        assert!(matches!(cli.format, Some(OutputFormat::Json)));
        assert!(matches!(cli.command, Command::Listen(_)));
    }

    #[test]
    fn log_level_reads_environment_fallback() {
        std::env::set_var(logging::LOG_LEVEL_ENV, "debug");
        let cli = Cli::try_parse_from(["nutpipe", "version"])
            .expect("version args should parse");
        std::env::remove_var(logging::LOG_LEVEL_ENV);
        assert!(matches!(cli.log_level, LogLevel::Debug));
    }

    #[test]
    fn rejects_unknown_subcommand() {
        assert!(Cli::try_parse_from(["nutpipe", "transmogrify"]).is_err());
    }
}
