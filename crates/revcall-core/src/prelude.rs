//! Convenience re-exports for processors implementing a protocol description.

pub use crate::envelope::{
    ClientMessage, ConnectArguments, ConnectResponse, EnvelopeProtocol, Request, Response,
    ServerMessage,
};
pub use crate::error::TransportError;
pub use crate::protocol::{ReverseCallProtocol, ServerFrame};
pub use crate::types::{
    ArgumentsContext, CallId, ExecutionContext, Failure, FailureId, PartitionKey, Ping, Pong,
    ProcessorId, RequestContext, ResponseContext, TenantId, Version,
};
