//! Revcall Runtime Prelude: convenient imports for processors.
//!
//! ```rust
//! use revcall_runtime::prelude::*;
//! ```

// Re-export connections
pub use crate::connection::{
    memory_transport, ConnectionFactory, Duplex, MemoryConnector, MemoryListener, TcpConnector,
};

// Re-export the reverse-call client
pub use crate::reverse_call::{
    handler_fn, ConnectOutcome, ConnectedCall, ReverseCallClient, ReverseCallHandler,
    ReverseCallOutcome,
};

// Re-export handshake
pub use crate::handshake::{
    HandshakeClient, HandshakeResult, Handshaker, SdkIdentity, StaticHandshake, TcpHandshake,
};

// Re-export retry policies and registration
pub use crate::registration::{Registration, RegistrationOutcome};
pub use crate::retry::{ExponentialBackoff, FailureHistory, FixedDelay, NoRetry, RetryPolicy};

// Re-export configuration and errors
pub use crate::config::{EngineConfig, ReverseCallConfig};
pub use crate::error::{AttemptError, HandshakeError, RegistrationError, ReverseCallError};

// Re-export from core
pub use revcall_core::prelude::*;
