//! # Revcall Core
//!
//! Value types and the protocol description shared by the reverse-call
//! engine, its transports and the processors built on top of it.
//!
//! - [`types`]: identities, execution context, failures, ping/pong and the
//!   per-call contexts
//! - [`protocol`]: the [`ReverseCallProtocol`] capability set and the
//!   [`ServerFrame`] tagged union
//! - [`envelope`]: a ready-made serde envelope and its protocol description
//! - [`error`]: [`TransportError`]

pub mod envelope;
pub mod error;
pub mod prelude;
pub mod protocol;
pub mod types;

pub use error::TransportError;
pub use protocol::{ReverseCallProtocol, ServerFrame};
pub use types::*;
