//! Transport-level errors shared by every layer of the engine.

use thiserror::Error;

/// Failure of the underlying duplex transport.
///
/// Kept string-carrying and cloneable so it can be stored in attempt
/// outcomes and in the failure history fed to retry policies.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("failed to connect: {0}")]
    Connect(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("channel error: {0}")]
    Channel(String),

    #[error("connection closed")]
    Closed,
}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::InvalidData => TransportError::Codec(e.to_string()),
            _ => TransportError::Io(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_conversion() {
        let err = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer");
        assert_eq!(
            TransportError::from(err),
            TransportError::Io("reset by peer".to_string())
        );

        let err = std::io::Error::new(std::io::ErrorKind::InvalidData, "bad frame");
        assert!(matches!(TransportError::from(err), TransportError::Codec(_)));
    }
}
