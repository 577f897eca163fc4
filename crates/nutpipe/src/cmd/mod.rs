use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use clap::{Args, Subcommand};

use crate::exit::{io_error, CliResult};
use crate::output::OutputFormat;

pub mod frames;
pub mod info;
pub mod listen;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show container and stream headers.
    Info(InfoArgs),
    /// List the frames of a container.
    Frames(FramesArgs),
    /// Negotiate a port, print it, and dump whatever a peer sends.
    Listen(ListenArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Info(args) => info::run(args, format),
        Command::Frames(args) => frames::run(args, format),
        Command::Listen(args) => listen::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct InfoArgs {
    /// Container file to inspect, or `-` for stdin.
    pub input: PathBuf,
}

#[derive(Args, Debug)]
pub struct FramesArgs {
    /// Container file to inspect, or `-` for stdin.
    pub input: PathBuf,
    /// Stop after N frames.
    #[arg(long)]
    pub count: Option<u64>,
    /// Only show frames of this stream.
    #[arg(long)]
    pub stream: Option<usize>,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Exit after receiving N frames.
    #[arg(long)]
    pub count: Option<u64>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Open `path` for reading, treating `-` as stdin.
pub fn open_input(path: &Path) -> CliResult<Box<dyn Read>> {
    if path.as_os_str() == "-" {
        return Ok(Box::new(std::io::stdin()));
    }
    let file = File::open(path)
        .map_err(|e| io_error(&format!("cannot open {}", path.display()), e))?;
    Ok(Box::new(BufReader::new(file)))
}
