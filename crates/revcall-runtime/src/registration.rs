//! Retry-governed registration.
//!
//! Keeps a processor registered with the runtime for as long as the caller
//! wants: every attempt opens a brand-new connection, optionally performs
//! the handshake, connects and services the stream. When an attempt fails
//! the retry policy decides whether and when to try again. Nothing carries
//! over from one attempt to the next except the processor's identity, its
//! handler and the failure history.

use crate::config::ReverseCallConfig;
use crate::connection::ConnectionFactory;
use crate::error::{AttemptError, RegistrationError};
use crate::handshake::Handshaker;
use crate::retry::{FailureHistory, RetryPolicy};
use crate::reverse_call::{ConnectOutcome, ReverseCallClient, ReverseCallHandler, ReverseCallOutcome};
use revcall_core::{ExecutionContext, ProcessorId, ReverseCallProtocol};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Observer called with every accepted connect response and the attempt
/// number it was received on.
pub type ConnectedObserver<P> =
    Arc<dyn Fn(&<P as ReverseCallProtocol>::ConnectResponse, u32) + Send + Sync>;

/// How a registration ended without giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationOutcome {
    /// The stop signal fired.
    Stopped { attempts: u32 },
    /// The runtime closed the stream cleanly.
    Completed { attempts: u32 },
}

impl RegistrationOutcome {
    pub fn attempts(&self) -> u32 {
        match self {
            RegistrationOutcome::Stopped { attempts } | RegistrationOutcome::Completed { attempts } => {
                *attempts
            }
        }
    }
}

enum AttemptOutcome {
    Completed,
    Cancelled,
    Failed {
        failure: AttemptError,
        /// Whether the attempt got as far as an accepted connect response.
        connected: bool,
    },
}

/// A processor's registration with the runtime.
pub struct Registration<P: ReverseCallProtocol, F, H> {
    processor_id: ProcessorId,
    protocol: Arc<P>,
    connector: F,
    handler: Arc<H>,
    handshake: Option<Arc<dyn Handshaker>>,
    execution_context: ExecutionContext,
    config: ReverseCallConfig,
    on_connected: Option<ConnectedObserver<P>>,
}

impl<P, F, H> Registration<P, F, H>
where
    P: ReverseCallProtocol,
    F: ConnectionFactory<P::ClientMessage, P::ServerMessage>,
    H: ReverseCallHandler<P>,
{
    pub fn new(processor_id: ProcessorId, protocol: Arc<P>, connector: F, handler: Arc<H>) -> Self {
        Self {
            processor_id,
            protocol,
            connector,
            handler,
            handshake: None,
            execution_context: ExecutionContext::default(),
            config: ReverseCallConfig::default(),
            on_connected: None,
        }
    }

    /// Perform `handshake` before every connection attempt.
    pub fn with_handshake(mut self, handshake: impl Handshaker + 'static) -> Self {
        self.handshake = Some(Arc::new(handshake));
        self
    }

    pub fn with_config(mut self, config: ReverseCallConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_execution_context(mut self, execution_context: ExecutionContext) -> Self {
        self.execution_context = execution_context;
        self
    }

    pub fn on_connected(
        mut self,
        observer: impl Fn(&P::ConnectResponse, u32) + Send + Sync + 'static,
    ) -> Self {
        self.on_connected = Some(Arc::new(observer));
        self
    }

    pub fn processor_id(&self) -> ProcessorId {
        self.processor_id
    }

    /// Stay registered until `stop` fires, the runtime closes the stream, or
    /// `policy` gives up.
    ///
    /// `build_arguments` is called once per attempt. Cancellation never
    /// counts as a failure and never consults the policy.
    #[instrument(skip_all, fields(processor_id = %self.processor_id))]
    pub async fn register_forever<B, R>(
        &self,
        mut build_arguments: B,
        policy: &R,
        stop: CancellationToken,
    ) -> Result<RegistrationOutcome, RegistrationError>
    where
        B: FnMut(ProcessorId) -> P::ConnectArguments + Send,
        R: RetryPolicy + ?Sized,
    {
        let started = Instant::now();
        let mut history = FailureHistory::new();
        let mut attempts = 0u32;

        loop {
            if stop.is_cancelled() {
                info!(attempts, "Registration stopped");
                return Ok(RegistrationOutcome::Stopped { attempts });
            }
            attempts += 1;
            debug!(attempt = attempts, "Starting connection attempt");

            let arguments = build_arguments(self.processor_id);
            let (failure, connected) =
                match self.attempt(attempts, started.elapsed(), arguments, &stop).await {
                    AttemptOutcome::Completed => {
                        info!(attempts, "Runtime closed the stream, registration completed");
                        return Ok(RegistrationOutcome::Completed { attempts });
                    }
                    AttemptOutcome::Cancelled => {
                        info!(attempts, "Registration stopped");
                        return Ok(RegistrationOutcome::Stopped { attempts });
                    }
                    AttemptOutcome::Failed { failure, connected } => (failure, connected),
                };

            if connected {
                history.mark_connected();
            }
            history.record(failure.clone());

            let Some(delay) = policy.next_retry(&history) else {
                error!(attempts, "Retry policy gave up: {}", failure);
                return Err(RegistrationError::GaveUp {
                    attempts,
                    last_failure: failure,
                });
            };
            warn!(attempts, ?delay, "Connection attempt failed: {}", failure);

            tokio::select! {
                biased;
                _ = stop.cancelled() => {
                    info!(attempts, "Registration stopped while waiting to retry");
                    return Ok(RegistrationOutcome::Stopped { attempts });
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn attempt(
        &self,
        attempt: u32,
        time_spent: Duration,
        arguments: P::ConnectArguments,
        stop: &CancellationToken,
    ) -> AttemptOutcome {
        if let Some(handshake) = &self.handshake {
            let result = tokio::select! {
                biased;
                _ = stop.cancelled() => return AttemptOutcome::Cancelled,
                result = handshake.handshake(attempt, time_spent) => result,
            };
            if let Err(e) = result {
                return AttemptOutcome::Failed {
                    failure: e.into(),
                    connected: false,
                };
            }
        }

        let connection = tokio::select! {
            biased;
            _ = stop.cancelled() => return AttemptOutcome::Cancelled,
            connection = self.connector.connect() => connection,
        };
        let connection = match connection {
            Ok(connection) => connection,
            Err(e) => {
                return AttemptOutcome::Failed {
                    failure: AttemptError::Connect(e),
                    connected: false,
                }
            }
        };

        let client = ReverseCallClient::new(
            self.protocol.clone(),
            connection,
            self.execution_context.clone(),
            self.config.clone(),
        );
        // Stopping also aborts a pending connect.
        let cancel_connect = stop.child_token();
        let call = match client.connect(arguments, &cancel_connect).await {
            Ok(ConnectOutcome::Connected { call, response }) => {
                if let Some(observer) = &self.on_connected {
                    observer(&response, attempt);
                }
                call
            }
            Ok(ConnectOutcome::Cancelled) => return AttemptOutcome::Cancelled,
            Err(e) => {
                return AttemptOutcome::Failed {
                    failure: e.into(),
                    connected: false,
                }
            }
        };

        match call.serve(self.handler.clone(), stop.clone()).await {
            ReverseCallOutcome::Completed => AttemptOutcome::Completed,
            ReverseCallOutcome::Cancelled => AttemptOutcome::Cancelled,
            ReverseCallOutcome::Failed(e) => AttemptOutcome::Failed {
                failure: e.into(),
                connected: true,
            },
        }
    }
}
