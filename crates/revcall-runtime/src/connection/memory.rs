//! In-process duplex transport.
//!
//! Every [`MemoryConnector::connect`] creates a fresh pair of tarpc
//! in-process channels; the server half is delivered to the matching
//! [`MemoryListener`].

use super::{ConnectionFactory, Duplex};
use async_trait::async_trait;
use revcall_core::TransportError;
use tarpc::transport::channel::{self, ChannelError};
use tokio::sync::mpsc;
use tracing::debug;

/// Client side: opens connections. `Out` is what the client writes.
pub struct MemoryConnector<Out, In> {
    incoming: mpsc::UnboundedSender<Duplex<In, Out>>,
}

impl<Out, In> Clone for MemoryConnector<Out, In> {
    fn clone(&self) -> Self {
        Self {
            incoming: self.incoming.clone(),
        }
    }
}

/// Server side: yields the server half of each opened connection.
pub struct MemoryListener<Out, In> {
    incoming: mpsc::UnboundedReceiver<Duplex<In, Out>>,
}

impl<Out, In> MemoryListener<Out, In> {
    /// Wait for the next client connection. `None` once every connector
    /// has been dropped.
    pub async fn accept(&mut self) -> Option<Duplex<In, Out>> {
        self.incoming.recv().await
    }
}

/// Create a connected connector/listener pair.
pub fn memory_transport<Out, In>() -> (MemoryConnector<Out, In>, MemoryListener<Out, In>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        MemoryConnector { incoming: tx },
        MemoryListener { incoming: rx },
    )
}

#[async_trait]
impl<Out, In> ConnectionFactory<Out, In> for MemoryConnector<Out, In>
where
    Out: Send + 'static,
    In: Send + 'static,
{
    async fn connect(&self) -> Result<Duplex<Out, In>, TransportError> {
        let (client, server) = channel::unbounded::<In, Out>();
        let client = Duplex::from_transport(client, channel_error);
        let server = Duplex::from_transport(server, channel_error);

        self.incoming
            .send(server)
            .map_err(|_| TransportError::Connect("memory listener closed".to_string()))?;
        debug!("Opened in-memory connection");
        Ok(client)
    }
}

fn channel_error(e: ChannelError) -> TransportError {
    TransportError::Channel(e.to_string())
}
