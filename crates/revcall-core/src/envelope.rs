//! Generic wire envelope for reverse-call streams.
//!
//! Processors that have no envelope of their own pick four payload types
//! and use [`EnvelopeProtocol`] as their protocol description. The
//! envelopes are plain serde types; the byte encoding is left to the
//! transport codec.

use crate::protocol::{ReverseCallProtocol, ServerFrame};
use crate::types::{ArgumentsContext, Failure, Ping, Pong, RequestContext, ResponseContext};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;

/// Connect arguments: processor payload plus the engine-filled context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectArguments<A> {
    pub context: Option<ArgumentsContext>,
    pub payload: A,
}

impl<A> ConnectArguments<A> {
    pub fn new(payload: A) -> Self {
        Self {
            context: None,
            payload,
        }
    }
}

/// The remote's answer to the connect arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConnectResponse<C> {
    Accepted(C),
    Refused(Failure),
}

impl<C> ConnectResponse<C> {
    pub fn failure(&self) -> Option<&Failure> {
        match self {
            ConnectResponse::Accepted(_) => None,
            ConnectResponse::Refused(failure) => Some(failure),
        }
    }

    pub fn into_result(self) -> Result<C, Failure> {
        match self {
            ConnectResponse::Accepted(payload) => Ok(payload),
            ConnectResponse::Refused(failure) => Err(failure),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request<Q> {
    pub context: RequestContext,
    pub payload: Q,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response<R> {
    pub context: Option<ResponseContext>,
    pub payload: R,
}

impl<R> Response<R> {
    pub fn new(payload: R) -> Self {
        Self {
            context: None,
            payload,
        }
    }
}

/// Everything a client writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClientMessage<A, R> {
    Arguments(ConnectArguments<A>),
    Pong(Pong),
    Response(Response<R>),
}

/// Everything a client reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerMessage<C, Q> {
    ConnectResponse(ConnectResponse<C>),
    Ping(Ping),
    Request(Request<Q>),
}

/// Protocol description over [`ClientMessage`] / [`ServerMessage`].
pub struct EnvelopeProtocol<A, C, Q, R> {
    _payloads: PhantomData<fn() -> (A, C, Q, R)>,
}

impl<A, C, Q, R> EnvelopeProtocol<A, C, Q, R> {
    pub fn new() -> Self {
        Self {
            _payloads: PhantomData,
        }
    }
}

impl<A, C, Q, R> Default for EnvelopeProtocol<A, C, Q, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A, C, Q, R> Clone for EnvelopeProtocol<A, C, Q, R> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<A, C, Q, R> fmt::Debug for EnvelopeProtocol<A, C, Q, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EnvelopeProtocol")
    }
}

impl<A, C, Q, R> ReverseCallProtocol for EnvelopeProtocol<A, C, Q, R>
where
    A: Send + 'static,
    C: Send + 'static,
    Q: Send + 'static,
    R: Send + 'static,
{
    type ClientMessage = ClientMessage<A, R>;
    type ServerMessage = ServerMessage<C, Q>;
    type ConnectArguments = ConnectArguments<A>;
    type ConnectResponse = ConnectResponse<C>;
    type Request = Request<Q>;
    type Response = Response<R>;

    fn wrap_arguments(&self, arguments: ConnectArguments<A>) -> ClientMessage<A, R> {
        ClientMessage::Arguments(arguments)
    }

    fn wrap_pong(&self, pong: Pong) -> ClientMessage<A, R> {
        ClientMessage::Pong(pong)
    }

    fn wrap_response(&self, response: Response<R>) -> ClientMessage<A, R> {
        ClientMessage::Response(response)
    }

    fn classify(
        &self,
        message: ServerMessage<C, Q>,
    ) -> Option<ServerFrame<ConnectResponse<C>, Request<Q>>> {
        Some(match message {
            ServerMessage::ConnectResponse(response) => ServerFrame::ConnectResponse(response),
            ServerMessage::Ping(ping) => ServerFrame::Ping(ping),
            ServerMessage::Request(request) => ServerFrame::Request(request),
        })
    }

    fn connect_failure<'a>(&self, response: &'a ConnectResponse<C>) -> Option<&'a Failure> {
        response.failure()
    }

    fn context_of<'a>(&self, request: &'a Request<Q>) -> &'a RequestContext {
        &request.context
    }

    fn set_arguments_context(&self, arguments: &mut ConnectArguments<A>, context: ArgumentsContext) {
        arguments.context = Some(context);
    }

    fn set_response_context(&self, response: &mut Response<R>, context: ResponseContext) {
        response.context = Some(context);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CallId, ExecutionContext, HeadId};
    use std::time::Duration;

    type TextProtocol = EnvelopeProtocol<String, String, String, String>;

    fn request(payload: &str) -> Request<String> {
        Request {
            context: RequestContext {
                call_id: CallId::new(),
                execution_context: ExecutionContext::default(),
            },
            payload: payload.to_string(),
        }
    }

    #[test]
    fn test_classify_is_exhaustive_over_server_messages() {
        let protocol = TextProtocol::new();

        let frame = protocol.classify(ServerMessage::Ping(Ping)).unwrap();
        assert_eq!(frame.kind(), "ping");

        let frame = protocol
            .classify(ServerMessage::ConnectResponse(ConnectResponse::Accepted(
                "ok".to_string(),
            )))
            .unwrap();
        assert_eq!(frame.kind(), "connect_response");

        let frame = protocol.classify(ServerMessage::Request(request("r"))).unwrap();
        assert_eq!(frame.kind(), "request");
    }

    #[test]
    fn test_unwrap_helpers_only_match_their_kind() {
        let protocol = TextProtocol::new();
        assert!(protocol.unwrap_ping(ServerMessage::Ping(Ping)).is_some());
        assert!(protocol
            .unwrap_ping(ServerMessage::Request(request("r")))
            .is_none());
        assert!(protocol
            .unwrap_request(ServerMessage::Ping(Ping))
            .is_none());
        assert_eq!(
            protocol
                .unwrap_request(ServerMessage::Request(request("r1")))
                .map(|r| r.payload),
            Some("r1".to_string())
        );
        assert!(protocol
            .unwrap_connect_response(ServerMessage::Ping(Ping))
            .is_none());
    }

    #[test]
    fn test_connect_failure_surfaces_refusal() {
        let protocol = TextProtocol::new();
        let refused: ConnectResponse<String> =
            ConnectResponse::Refused(Failure::unknown("no such processor"));
        assert_eq!(
            protocol.connect_failure(&refused).map(|f| f.reason.as_str()),
            Some("no such processor")
        );
        let accepted = ConnectResponse::Accepted("welcome".to_string());
        assert!(protocol.connect_failure(&accepted).is_none());
        assert_eq!(accepted.into_result(), Ok("welcome".to_string()));
    }

    #[test]
    fn test_contexts_are_written_into_envelopes() {
        let protocol = TextProtocol::new();

        let mut arguments = ConnectArguments::new("A".to_string());
        let context = ArgumentsContext {
            head_id: HeadId::new(),
            ping_interval: Duration::from_secs(5),
            execution_context: ExecutionContext::default(),
        };
        protocol.set_arguments_context(&mut arguments, context.clone());
        assert_eq!(arguments.context, Some(context));

        let req = request("q");
        let mut response = Response::new("answer".to_string());
        protocol.set_response_context(&mut response, protocol.context_of(&req).clone().into());
        assert_eq!(
            response.context.map(|c| c.call_id),
            Some(req.context.call_id)
        );
    }

    #[test]
    fn test_envelopes_serialize() {
        let message: ClientMessage<String, String> =
            ClientMessage::Response(Response::new("r".to_string()));
        let json = serde_json::to_string(&message).unwrap();
        let back: ClientMessage<String, String> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, message);
    }
}
