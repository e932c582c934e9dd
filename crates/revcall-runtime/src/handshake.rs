//! Handshake client.
//!
//! Before any reverse-call traffic the client presents its SDK identity and
//! contracts version to the runtime in a single unary exchange. The runtime
//! answers with its own identity or a [`Failure`]. The exchange is a tarpc
//! service so the same definition serves both sides.

use crate::error::HandshakeError;
use async_trait::async_trait;
use futures::{future, StreamExt};
use revcall_core::{Failure, MicroserviceId, TransportError, Version};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;
use tarpc::client::Config;
use tarpc::context::Context;
use tarpc::server::{BaseChannel, Channel};
use tokio::task::JoinHandle;
use tokio_serde::formats::Bincode;
use tracing::{debug, info, instrument, warn};

/// Default handshake connection timeout in milliseconds.
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5000;

/// What the client presents to the runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandshakeRequest {
    pub sdk_identifier: String,
    pub sdk_version: Version,
    pub contracts_version: Version,
    /// 1-based attempt number within the current registration.
    pub attempt: u32,
    /// Time spent registering so far.
    pub time_spent: Duration,
}

/// The runtime's identity, as negotiated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandshakeResult {
    pub runtime_version: Version,
    pub contracts_version: Version,
    pub microservice_id: MicroserviceId,
    pub environment: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HandshakeResponse {
    Accepted(HandshakeResult),
    Refused(Failure),
}

/// The handshake as an RPC service.
#[tarpc::service]
pub trait HandshakeService {
    /// Negotiate identities and versions. Called once per connection attempt.
    async fn handshake(request: HandshakeRequest) -> HandshakeResponse;
}

/// Carries one handshake request to the runtime and returns its answer.
#[async_trait]
pub trait HandshakeTransport: Send + Sync {
    async fn exchange(&self, request: HandshakeRequest) -> Result<HandshakeResponse, TransportError>;
}

#[async_trait]
impl HandshakeTransport for HandshakeServiceClient {
    async fn exchange(&self, request: HandshakeRequest) -> Result<HandshakeResponse, TransportError> {
        self.handshake(tarpc::context::current(), request)
            .await
            .map_err(|e| TransportError::Channel(e.to_string()))
    }
}

/// Opens a fresh tarpc TCP connection for each handshake.
#[derive(Debug, Clone)]
pub struct TcpHandshake {
    address: String,
    connect_timeout: Duration,
}

impl TcpHandshake {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

#[async_trait]
impl HandshakeTransport for TcpHandshake {
    async fn exchange(&self, request: HandshakeRequest) -> Result<HandshakeResponse, TransportError> {
        debug!("Connecting to handshake service at {}", self.address);
        let transport = tokio::time::timeout(
            self.connect_timeout,
            tarpc::serde_transport::tcp::connect(self.address.as_str(), Bincode::default),
        )
        .await
        .map_err(|_| TransportError::Connect(format!("timed out connecting to {}", self.address)))?
        .map_err(|e| TransportError::Connect(e.to_string()))?;

        let client = HandshakeServiceClient::new(Config::default(), transport).spawn();
        client.exchange(request).await
    }
}

/// Identity this SDK presents during the handshake.
#[derive(Debug, Clone, PartialEq)]
pub struct SdkIdentity {
    pub sdk_identifier: String,
    pub sdk_version: Version,
    pub contracts_version: Version,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compatibility {
    Compatible,
    ClientTooOld,
    RuntimeTooOld,
}

/// Compatible iff the major versions match and the runtime implements at
/// least the client's minor version. Prerelease markers are ignored.
pub fn check_contracts_compatibility(client: &Version, runtime: &Version) -> Compatibility {
    if client.major < runtime.major {
        Compatibility::ClientTooOld
    } else if client.major > runtime.major || client.minor > runtime.minor {
        Compatibility::RuntimeTooOld
    } else {
        Compatibility::Compatible
    }
}

/// Performs handshakes through a [`HandshakeTransport`], bounded by a timeout.
pub struct HandshakeClient<T> {
    transport: T,
    identity: SdkIdentity,
    timeout: Duration,
}

impl<T: HandshakeTransport> HandshakeClient<T> {
    pub fn new(transport: T, identity: SdkIdentity, timeout: Duration) -> Self {
        Self {
            transport,
            identity,
            timeout,
        }
    }

    pub fn identity(&self) -> &SdkIdentity {
        &self.identity
    }

    #[instrument(skip(self), fields(sdk = %self.identity.sdk_identifier))]
    pub async fn perform(
        &self,
        attempt: u32,
        time_spent: Duration,
    ) -> Result<HandshakeResult, HandshakeError> {
        let request = HandshakeRequest {
            sdk_identifier: self.identity.sdk_identifier.clone(),
            sdk_version: self.identity.sdk_version.clone(),
            contracts_version: self.identity.contracts_version.clone(),
            attempt,
            time_spent,
        };

        let response = tokio::time::timeout(self.timeout, self.transport.exchange(request))
            .await
            .map_err(|_| HandshakeError::Timeout(self.timeout))??;

        let result = match response {
            HandshakeResponse::Accepted(result) => result,
            HandshakeResponse::Refused(failure) => {
                warn!("Handshake refused: {}", failure);
                return Err(HandshakeError::Failed(failure));
            }
        };

        match check_contracts_compatibility(&self.identity.contracts_version, &result.contracts_version) {
            Compatibility::Compatible => {
                info!(
                    runtime_version = %result.runtime_version,
                    environment = %result.environment,
                    "Handshake completed"
                );
                Ok(result)
            }
            compatibility => {
                warn!(?compatibility, "Contracts versions are not compatible");
                Err(HandshakeError::IncompatibleVersions {
                    client: self.identity.contracts_version.clone(),
                    runtime: result.contracts_version,
                })
            }
        }
    }
}

/// A handshake step as seen by the registration loop.
#[async_trait]
pub trait Handshaker: Send + Sync {
    async fn handshake(
        &self,
        attempt: u32,
        time_spent: Duration,
    ) -> Result<HandshakeResult, HandshakeError>;
}

#[async_trait]
impl<T: HandshakeTransport> Handshaker for HandshakeClient<T> {
    async fn handshake(
        &self,
        attempt: u32,
        time_spent: Duration,
    ) -> Result<HandshakeResult, HandshakeError> {
        self.perform(attempt, time_spent).await
    }
}

/// Runtime side of the handshake: accepts every client with a fixed result.
#[derive(Debug, Clone)]
pub struct StaticHandshake {
    result: HandshakeResult,
}

impl StaticHandshake {
    pub fn new(result: HandshakeResult) -> Self {
        Self { result }
    }
}

impl HandshakeService for StaticHandshake {
    async fn handshake(self, _ctx: Context, request: HandshakeRequest) -> HandshakeResponse {
        debug!(
            sdk = %request.sdk_identifier,
            sdk_version = %request.sdk_version,
            attempt = request.attempt,
            "Handshake request"
        );
        HandshakeResponse::Accepted(self.result)
    }
}

/// Bind `addr` and serve [`StaticHandshake`] on it in the background.
///
/// Returns the bound address and the accept loop's task.
pub async fn serve_handshake(
    addr: &str,
    responder: StaticHandshake,
) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
    let listener = tarpc::serde_transport::tcp::listen(addr, Bincode::default).await?;
    let local_addr = listener.local_addr();
    info!("Handshake server listening on {}", local_addr);

    let task = tokio::spawn(async move {
        listener
            .filter_map(|r| future::ready(r.ok()))
            .map(BaseChannel::with_defaults)
            .for_each(move |channel| {
                let server = responder.clone();
                async move {
                    tokio::spawn(channel.execute(server.serve()).for_each(|response| async move {
                        tokio::spawn(response);
                    }));
                }
            })
            .await;
    });
    Ok((local_addr, task))
}
