//! Protocol description for one kind of reverse-call processor.
//!
//! A reverse-call stream carries three outbound message kinds (connect
//! arguments, pong, response) and three inbound kinds (connect response,
//! ping, request), all wrapped in a processor-specific envelope. The engine
//! never looks inside an envelope itself; it asks the processor's
//! [`ReverseCallProtocol`] to wrap and classify messages and to read and
//! write the call contexts.

use crate::types::{ArgumentsContext, Failure, Ping, Pong, RequestContext, ResponseContext};

/// One inbound message, classified by kind.
///
/// Exactly one variant applies to any given inbound envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerFrame<C, Q> {
    ConnectResponse(C),
    Ping(Ping),
    Request(Q),
}

impl<C, Q> ServerFrame<C, Q> {
    /// Short name of the frame kind, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerFrame::ConnectResponse(_) => "connect_response",
            ServerFrame::Ping(_) => "ping",
            ServerFrame::Request(_) => "request",
        }
    }
}

/// Capability set mapping a processor's payload types onto the wire envelope.
///
/// Implementations are pure: no I/O, no side effects, and no failure mode
/// other than "this message is not of a known kind", reported as `None`
/// from [`classify`](ReverseCallProtocol::classify).
pub trait ReverseCallProtocol: Send + Sync + 'static {
    /// Envelope written by the client.
    type ClientMessage: Send + 'static;
    /// Envelope read by the client.
    type ServerMessage: Send + 'static;
    type ConnectArguments: Send + 'static;
    type ConnectResponse: Send + 'static;
    type Request: Send + 'static;
    type Response: Send + 'static;

    fn wrap_arguments(&self, arguments: Self::ConnectArguments) -> Self::ClientMessage;

    fn wrap_pong(&self, pong: Pong) -> Self::ClientMessage;

    fn wrap_response(&self, response: Self::Response) -> Self::ClientMessage;

    /// Classify an inbound envelope. `None` means the envelope carried
    /// none of the three known kinds.
    fn classify(
        &self,
        message: Self::ServerMessage,
    ) -> Option<ServerFrame<Self::ConnectResponse, Self::Request>>;

    /// The failure carried by a connect response, if the remote refused
    /// the connection.
    fn connect_failure<'a>(&self, response: &'a Self::ConnectResponse) -> Option<&'a Failure>;

    fn context_of<'a>(&self, request: &'a Self::Request) -> &'a RequestContext;

    fn set_arguments_context(&self, arguments: &mut Self::ConnectArguments, context: ArgumentsContext);

    fn set_response_context(&self, response: &mut Self::Response, context: ResponseContext);

    fn unwrap_connect_response(&self, message: Self::ServerMessage) -> Option<Self::ConnectResponse> {
        match self.classify(message)? {
            ServerFrame::ConnectResponse(response) => Some(response),
            _ => None,
        }
    }

    fn unwrap_ping(&self, message: Self::ServerMessage) -> Option<Ping> {
        match self.classify(message)? {
            ServerFrame::Ping(ping) => Some(ping),
            _ => None,
        }
    }

    fn unwrap_request(&self, message: Self::ServerMessage) -> Option<Self::Request> {
        match self.classify(message)? {
            ServerFrame::Request(request) => Some(request),
            _ => None,
        }
    }
}
