//! # Revcall
//!
//! Client engine for long-lived reverse-call RPC streams.
//!
//! In a reverse call the client opens the stream, but the server is the one
//! issuing requests: once the client has sent its connect arguments and the
//! server has accepted them, the server pushes requests and pings, and the
//! client answers each request with a correlated response. The engine keeps
//! the stream alive, bounds and orders request handling, and reconnects
//! under a retry policy until the processor is told to stop.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use revcall::prelude::*;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! type Echo = EnvelopeProtocol<ProcessorId, String, String, String>;
//!
//! let config = EngineConfig::discover()?;
//! let handler = Arc::new(handler_fn::<Echo, _, _>(|request, _context, _stop| async move {
//!     Response::new(request.payload)
//! }));
//!
//! let registration = Registration::new(
//!     ProcessorId::new(),
//!     Arc::new(Echo::new()),
//!     TcpConnector::new(config.address.clone()),
//!     handler,
//! )
//! .with_config(config.reverse_call.clone());
//!
//! let stop = CancellationToken::new();
//! let outcome = registration
//!     .register_forever(ConnectArguments::new, &config.retry.policy(), stop)
//!     .await?;
//! ```
//!
//! ## Architecture
//!
//! - [`revcall_core`] - Identities, contexts, failures and the
//!   [`ReverseCallProtocol`](revcall_core::ReverseCallProtocol) description
//! - [`revcall_runtime`] - Connections, the reverse-call client, handshake,
//!   retry policies and registration
//!
//! ## Connection Lifecycle
//!
//! | Phase | Client | Server |
//! |-------|--------|--------|
//! | Connecting | sends connect arguments | answers with a connect response |
//! | Connected | answers pings and requests | pings and pushes requests |
//! | Finished | Completed, Failed or Cancelled | closes or goes silent |
//!
//! A connection that stays silent for longer than the ping timeout is
//! treated as dead. Every reconnect opens a brand-new stream.

// Re-export all subcrates
pub use revcall_core as core;
pub use revcall_runtime as runtime;

/// Prelude module for convenient imports.
///
/// ```rust
/// use revcall::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use revcall_core::envelope::{
        ClientMessage, ConnectArguments, ConnectResponse, EnvelopeProtocol, Request, Response,
        ServerMessage,
    };
    pub use revcall_core::{
        CallId, ExecutionContext, Failure, FailureId, PartitionKey, ProcessorId, RequestContext,
        ReverseCallProtocol, TenantId, TransportError, Version,
    };

    // Connections
    pub use revcall_runtime::connection::{
        memory_transport, ConnectionFactory, Duplex, MemoryConnector, MemoryListener,
        TcpConnector,
    };

    // Reverse-call client and handlers
    pub use revcall_runtime::reverse_call::{
        handler_fn, ConnectOutcome, ReverseCallClient, ReverseCallHandler, ReverseCallOutcome,
    };

    // Handshake
    pub use revcall_runtime::handshake::{
        HandshakeClient, HandshakeResult, Handshaker, SdkIdentity, TcpHandshake,
    };

    // Registration and retry
    pub use revcall_runtime::registration::{Registration, RegistrationOutcome};
    pub use revcall_runtime::retry::{
        ExponentialBackoff, FailureHistory, FixedDelay, NoRetry, RetryPolicy,
    };

    // Configuration and errors
    pub use revcall_runtime::config::{EngineConfig, ReverseCallConfig};
    pub use revcall_runtime::error::{
        AttemptError, HandshakeError, RegistrationError, ReverseCallError,
    };
}
