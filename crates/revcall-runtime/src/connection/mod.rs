//! Duplex connection abstraction.
//!
//! The engine needs exactly two things from a transport: a way to send an
//! outbound message and an ordered sequence of inbound messages. [`Duplex`]
//! captures that over any `Sink + Stream` transport, and a
//! [`ConnectionFactory`] opens a fresh one for every connection attempt.
//!
//! Two transports are provided:
//!
//! - [`tcp::TcpConnector`]: length-delimited bincode frames over TCP using
//!   tarpc's serde transport
//! - [`memory::memory_transport`]: in-process channel pairs, for tests and
//!   for hosting a processor next to its server

pub mod memory;
pub mod tcp;

use async_trait::async_trait;
use futures::sink::{Sink, SinkExt};
use futures::stream::{BoxStream, Stream, StreamExt};
use revcall_core::TransportError;
use std::pin::Pin;

pub use memory::{memory_transport, MemoryConnector, MemoryListener};
pub use tcp::TcpConnector;

type BoxSink<Out> = Pin<Box<dyn Sink<Out, Error = TransportError> + Send>>;

/// A single bidirectional stream: outbound `Out`, inbound `In`.
///
/// Single-use. Once either half reports an error or the end of the stream,
/// the connection is finished and a new one must be opened.
pub struct Duplex<Out, In> {
    sender: DuplexSender<Out>,
    receiver: DuplexReceiver<In>,
}

impl<Out: Send + 'static, In: Send + 'static> Duplex<Out, In> {
    /// Wrap a combined `Sink + Stream` transport, mapping its error type.
    pub fn from_transport<T, E, F>(transport: T, map_err: F) -> Self
    where
        T: Stream<Item = Result<In, E>> + Sink<Out, Error = E> + Send + 'static,
        E: Send + 'static,
        F: Fn(E) -> TransportError + Clone + Send + Sync + 'static,
    {
        let (sink, stream) = transport.split();
        let sink = sink.sink_map_err(map_err.clone());
        let stream = stream.map(move |item| item.map_err(&map_err));
        Self::from_parts(sink, stream)
    }

    /// Build a connection from an already separated sink and stream.
    pub fn from_parts<S, R>(sink: S, stream: R) -> Self
    where
        S: Sink<Out, Error = TransportError> + Send + 'static,
        R: Stream<Item = Result<In, TransportError>> + Send + 'static,
    {
        Self {
            sender: DuplexSender {
                sink: Box::pin(sink),
            },
            receiver: DuplexReceiver {
                stream: stream.boxed(),
            },
        }
    }
}

impl<Out, In> Duplex<Out, In> {
    /// Split into independently owned halves.
    pub fn split(self) -> (DuplexSender<Out>, DuplexReceiver<In>) {
        (self.sender, self.receiver)
    }
}

/// Outbound half. The underlying transport does not support concurrent
/// writers, so this is owned by exactly one task at a time.
pub struct DuplexSender<Out> {
    sink: BoxSink<Out>,
}

impl<Out> DuplexSender<Out> {
    pub async fn send(&mut self, message: Out) -> Result<(), TransportError> {
        self.sink.send(message).await
    }

    /// Flush pending writes and close the outbound direction.
    pub async fn close(&mut self) -> Result<(), TransportError> {
        self.sink.close().await
    }
}

/// Inbound half: messages in arrival order.
pub struct DuplexReceiver<In> {
    stream: BoxStream<'static, Result<In, TransportError>>,
}

impl<In> DuplexReceiver<In> {
    /// The next inbound message, or `None` once the remote closed the stream.
    pub async fn recv(&mut self) -> Option<Result<In, TransportError>> {
        self.stream.next().await
    }
}

/// Opens a brand-new [`Duplex`] for each connection attempt.
#[async_trait]
pub trait ConnectionFactory<Out: Send + 'static, In: Send + 'static>: Send + Sync {
    async fn connect(&self) -> Result<Duplex<Out, In>, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::mpsc;

    #[tokio::test]
    async fn test_from_parts_preserves_order() {
        let (out_tx, mut out_rx) = mpsc::unbounded::<u32>();
        let (in_tx, in_rx) = mpsc::unbounded::<Result<u32, TransportError>>();

        let sink = out_tx.sink_map_err(|e| TransportError::Channel(e.to_string()));
        let (mut sender, mut receiver) = Duplex::from_parts(sink, in_rx).split();

        for i in 0..3 {
            sender.send(i).await.unwrap();
            in_tx.unbounded_send(Ok(i * 10)).unwrap();
        }
        drop(in_tx);

        assert_eq!(out_rx.next().await, Some(0));
        assert_eq!(out_rx.next().await, Some(1));
        assert_eq!(out_rx.next().await, Some(2));

        assert_eq!(receiver.recv().await, Some(Ok(0)));
        assert_eq!(receiver.recv().await, Some(Ok(10)));
        assert_eq!(receiver.recv().await, Some(Ok(20)));
        assert_eq!(receiver.recv().await, None);
    }

    #[tokio::test]
    async fn test_send_after_peer_dropped_fails() {
        let (out_tx, out_rx) = mpsc::unbounded::<u32>();
        let (_in_tx, in_rx) = mpsc::unbounded::<Result<u32, TransportError>>();
        let sink = out_tx.sink_map_err(|e| TransportError::Channel(e.to_string()));
        let (mut sender, _receiver) = Duplex::from_parts(sink, in_rx).split();

        drop(out_rx);
        assert!(matches!(
            sender.send(1).await,
            Err(TransportError::Channel(_))
        ));
    }
}
