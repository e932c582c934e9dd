//! The echo protocol spoken between `revcall serve` and `revcall register`.

use revcall::prelude::*;

/// Connect arguments carry the processor id, requests and responses are text.
pub type EchoProtocol = EnvelopeProtocol<ProcessorId, String, String, String>;

pub type EchoClientMessage = ClientMessage<ProcessorId, String>;
pub type EchoServerMessage = ServerMessage<String, String>;

/// The processor's answer to `request`.
pub fn echo(request: &str) -> String {
    format!("echo: {}", request)
}
