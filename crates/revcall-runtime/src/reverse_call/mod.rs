//! The reverse-call client.
//!
//! A server pushes requests to the client over a client-opened duplex
//! stream and the client answers each with a correlated response,
//! interleaved with keep-alive ping/pong traffic.
//!
//! - [`client`]: the connection state machine
//! - [`handler`]: the request handler trait
//! - `dispatch`: per-partition ordered, concurrency-bounded handler tasks
//! - `writer`: the single outbound writer with pong priority

pub mod client;
mod dispatch;
pub mod handler;
mod writer;

pub use client::{ConnectOutcome, ConnectedCall, ReverseCallClient, ReverseCallOutcome};
pub use handler::{handler_fn, HandlerFn, ReverseCallHandler};
