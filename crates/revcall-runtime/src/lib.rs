//! # Revcall Runtime
//!
//! Client engine for reverse-call streams: the runtime pushes requests to
//! the client over a client-opened duplex stream, and the client answers
//! them while keeping the stream alive.
//!
//! - [`connection`]: the duplex connection abstraction and its TCP and
//!   in-memory transports
//! - [`reverse_call`]: one connection's lifecycle, from connect arguments to
//!   Completed, Failed or Cancelled
//! - [`handshake`]: the version negotiation performed before each connection
//! - [`retry`]: retry policies as pure functions of the failure history
//! - [`registration`]: the loop that keeps a processor registered across
//!   reconnects
//! - [`config`]: `revcall.toml` configuration

pub mod config;
pub mod connection;
pub mod error;
pub mod handshake;
pub mod prelude;
pub mod registration;
pub mod retry;
pub mod reverse_call;

pub use config::{ConfigError, EngineConfig, HandshakeConfig, RetryConfig, ReverseCallConfig};
pub use error::{AttemptError, HandshakeError, RegistrationError, ReverseCallError};
pub use registration::{Registration, RegistrationOutcome};
pub use reverse_call::{ReverseCallClient, ReverseCallHandler, ReverseCallOutcome};
