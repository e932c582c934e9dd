//! Error types for connection attempts and registrations.

use revcall_core::{Failure, TransportError, Version};
use std::time::Duration;
use thiserror::Error;

/// Why a single reverse-call connection ended in failure.
///
/// Every variant is terminal for the current connection attempt and
/// recoverable by opening a new one.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReverseCallError {
    #[error("did not receive a connect response")]
    DidNotReceiveConnectResponse,

    #[error("connect refused by remote: {0}")]
    ConnectFailed(Failure),

    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),

    #[error("no message received within {0:?}, remote assumed dead")]
    PingTimedOut(Duration),

    #[error("outbound writer stopped")]
    WriterStopped,

    #[error("request handler panicked")]
    HandlerPanicked,
}

/// Why a handshake did not produce a usable result.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HandshakeError {
    #[error("handshake timed out after {0:?}")]
    Timeout(Duration),

    #[error("handshake transport failure: {0}")]
    Transport(#[from] TransportError),

    #[error("handshake refused by runtime: {0}")]
    Failed(Failure),

    #[error("contracts version {client} is not compatible with runtime contracts version {runtime}")]
    IncompatibleVersions { client: Version, runtime: Version },
}

/// One failed connection attempt, as seen by the registration loop and
/// fed to its retry policy.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AttemptError {
    #[error("could not open connection: {0}")]
    Connect(TransportError),

    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    #[error(transparent)]
    ReverseCall(#[from] ReverseCallError),
}

/// Terminal failure of a registration.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistrationError {
    #[error("retry policy gave up after {attempts} attempts, last failure: {last_failure}")]
    GaveUp {
        attempts: u32,
        last_failure: AttemptError,
    },
}
