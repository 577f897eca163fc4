use std::fmt;
use std::io;

use nutpipe_codec::CodecError;
use nutpipe_transport::TransportError;

// Exit code constants; 0/1/64/124/125 follow sysexits conventions.
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;
pub const INTERRUPTED: i32 = 130;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn codec_error(context: &str, err: CodecError) -> CliError {
    match err {
        CodecError::Io(source) => io_error(context, source),
        CodecError::InvalidStreamDeclaration(_) => CliError::new(USAGE, format!("{context}: {err}")),
        CodecError::BadMagic
        | CodecError::MalformedContainer(_)
        | CodecError::ChecksumMismatch { .. }
        | CodecError::VarintOverflow
        | CodecError::PayloadTooLarge { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Io(source) => io_error(context, source),
        TransportError::Cancelled => CliError::new(INTERRUPTED, format!("{context}: {err}")),
        TransportError::Bind { .. } | TransportError::Accept(_) => {
            CliError::new(TRANSPORT_ERROR, format!("{context}: {err}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negotiation_failures_map_to_transport_code() {
        let err = TransportError::Bind {
            addr: "127.0.0.1:0".to_string(),
            source: io::Error::new(io::ErrorKind::AddrInUse, "in use"),
        };
        assert_eq!(transport_error("bind", err).code, TRANSPORT_ERROR);
    }

    #[test]
    fn cancellation_maps_to_interrupted() {
        let mapped = transport_error("negotiate", TransportError::Cancelled);
        assert_eq!(mapped.code, INTERRUPTED);
    }

    #[test]
    fn container_damage_maps_to_data_invalid() {
        let mapped = codec_error("read", CodecError::BadMagic);
        assert_eq!(mapped.code, DATA_INVALID);
        let mapped = codec_error(
            "read",
            CodecError::InvalidStreamDeclaration("ids not contiguous".to_string()),
        );
        assert_eq!(mapped.code, USAGE);
    }
}
