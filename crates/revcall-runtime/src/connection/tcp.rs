//! TCP transport using tarpc's serde transport with bincode framing.

use super::{ConnectionFactory, Duplex};
use async_trait::async_trait;
use revcall_core::TransportError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::time::Duration;
use tarpc::serde_transport::Transport;
use tokio::net::TcpStream;
use tokio_serde::formats::Bincode;
use tracing::{debug, info};

/// Default connection timeout in milliseconds.
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5000;

/// Opens a new TCP connection to the runtime for every attempt.
pub struct TcpConnector<Out, In> {
    address: String,
    connect_timeout: Duration,
    _messages: PhantomData<fn() -> (Out, In)>,
}

impl<Out, In> TcpConnector<Out, In> {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            _messages: PhantomData,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

impl<Out, In> Clone for TcpConnector<Out, In> {
    fn clone(&self) -> Self {
        Self {
            address: self.address.clone(),
            connect_timeout: self.connect_timeout,
            _messages: PhantomData,
        }
    }
}

#[async_trait]
impl<Out, In> ConnectionFactory<Out, In> for TcpConnector<Out, In>
where
    Out: Serialize + Send + 'static,
    In: DeserializeOwned + Send + 'static,
{
    async fn connect(&self) -> Result<Duplex<Out, In>, TransportError> {
        debug!("Connecting to {}", self.address);

        let transport: Transport<TcpStream, In, Out, Bincode<In, Out>> = tokio::time::timeout(
            self.connect_timeout,
            tarpc::serde_transport::tcp::connect(self.address.as_str(), Bincode::default),
        )
        .await
        .map_err(|_| TransportError::Connect(format!("timed out connecting to {}", self.address)))?
        .map_err(|e| TransportError::Connect(e.to_string()))?;

        info!("Connected to {}", self.address);
        Ok(Duplex::from_transport(transport, TransportError::from))
    }
}
