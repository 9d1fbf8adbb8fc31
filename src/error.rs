use std::io;
use std::result;

use arrow::error::ArrowError;
use thiserror::Error;

/// Result type for operations that could result in a [ProbeError]
pub type Result<T> = result::Result<T, ProbeError>;

/// Probe error
#[derive(Debug, Error)]
pub enum ProbeError {
    /// Error returned by arrow while decoding results.
    #[error("Arrow error: {0}")]
    ArrowError(#[from] ArrowError),
    /// Status returned by the remote Flight service.
    #[error("Flight error: {:?}: {}", .0.code(), .0.message())]
    FlightError(#[from] tonic::Status),
    /// Error raised by the gRPC transport (dial, handshake, h2 setup).
    #[error("Transport error: {0}")]
    TransportError(#[from] tonic::transport::Error),
    /// Error associated to I/O operations and associated traits.
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
    /// The location could not be built from the given parts or uri.
    #[error("Invalid location: {0}")]
    InvalidLocation(String),
    /// Missing or inconsistent configuration.
    #[error("Configuration error: {0}")]
    Config(String),
    /// TLS setup failed before any byte was sent.
    #[error("TLS error: {0}")]
    Tls(String),
    /// An operation did not complete in the allotted time.
    #[error("Timed out: {0}")]
    Timeout(String),
    /// Error returned as a consequence of an error in the probe itself.
    /// This error should not happen in normal usage.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Creates an Internal error from a formatted string
#[macro_export]
macro_rules! internal_err {
    ($($arg:tt)*) => {{
        let reason = format!($($arg)*);
        $crate::error::ProbeError::Internal(reason)
    }}
}

/// Creates a Config error from a formatted string
#[macro_export]
macro_rules! config_err {
    ($($arg:tt)*) => {{
        let reason = format!($($arg)*);
        $crate::error::ProbeError::Config(reason)
    }}
}

/// Checks the predicate, if false return the formatted string as a Config error
#[macro_export]
macro_rules! ensure {
    ($predicate:expr, $($arg:tt)*) => {
        if !$predicate {
            return Err($crate::config_err!($($arg)*));
        }
    };
}

impl ProbeError {
    /// The message without the variant prefix, as shown in the report.
    pub fn reason(&self) -> String {
        match self {
            ProbeError::ArrowError(desc) => format!("{}", desc),
            ProbeError::FlightError(status) => {
                format!("{:?}: {}", status.code(), status.message())
            }
            ProbeError::TransportError(desc) => transport_chain(desc),
            ProbeError::IoError(desc) => format!("{}", desc),
            ProbeError::InvalidLocation(desc)
            | ProbeError::Config(desc)
            | ProbeError::Tls(desc)
            | ProbeError::Timeout(desc)
            | ProbeError::Internal(desc) => desc.clone(),
        }
    }
}

/// tonic hides the useful part of transport errors in the source chain
fn transport_chain(err: &tonic::transport::Error) -> String {
    let mut reason = format!("{}", err);
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        reason.push_str(": ");
        reason.push_str(&cause.to_string());
        source = cause.source();
    }
    reason
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_reason_has_code_and_message() {
        let err: ProbeError = tonic::Status::unauthenticated("bad token").into();
        assert_eq!(err.reason(), "Unauthenticated: bad token");
        assert!(format!("{}", err).starts_with("Flight error: "));
    }

    #[test]
    fn ensure_returns_config_error() {
        fn check(port: u16) -> Result<()> {
            ensure!(port != 0, "port must be positive, got {}", port);
            Ok(())
        }
        assert!(check(1).is_ok());
        match check(0) {
            Err(ProbeError::Config(reason)) => {
                assert_eq!(reason, "port must be positive, got 0")
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
