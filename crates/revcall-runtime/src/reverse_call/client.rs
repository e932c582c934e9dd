//! One reverse-call connection, from connect arguments to its outcome.
//!
//! ```text
//! Created --connect--> Connecting --ConnectResponse--> Connected --serve--> Servicing
//!                           |                                                   |
//!                           +--> Failed / Cancelled        Completed / Failed / Cancelled
//! ```
//!
//! A client is single-use: [`ReverseCallClient::connect`] consumes it and a
//! [`ConnectedCall`] is consumed by [`ConnectedCall::serve`].

use super::dispatch::Dispatcher;
use super::handler::ReverseCallHandler;
use super::writer::OutboundWriter;
use crate::config::ReverseCallConfig;
use crate::connection::{Duplex, DuplexReceiver, DuplexSender};
use crate::error::ReverseCallError;
use revcall_core::{
    ArgumentsContext, CorrelationId, ExecutionContext, HeadId, Pong, ReverseCallProtocol,
    ServerFrame,
};
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};

/// How a connection attempt ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ReverseCallOutcome {
    /// The remote end closed the stream.
    Completed,
    /// Processing was stopped, or connecting was cancelled.
    Cancelled,
    Failed(ReverseCallError),
}

impl ReverseCallOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, ReverseCallOutcome::Failed(_))
    }
}

/// Result of the connect phase.
pub enum ConnectOutcome<P: ReverseCallProtocol> {
    Connected {
        call: ConnectedCall<P>,
        response: P::ConnectResponse,
    },
    Cancelled,
}

/// A reverse-call client that has not connected yet.
pub struct ReverseCallClient<P: ReverseCallProtocol> {
    protocol: Arc<P>,
    connection: Duplex<P::ClientMessage, P::ServerMessage>,
    execution_context: ExecutionContext,
    config: ReverseCallConfig,
}

impl<P: ReverseCallProtocol> ReverseCallClient<P> {
    pub fn new(
        protocol: Arc<P>,
        connection: Duplex<P::ClientMessage, P::ServerMessage>,
        execution_context: ExecutionContext,
        config: ReverseCallConfig,
    ) -> Self {
        Self {
            protocol,
            connection,
            execution_context,
            config,
        }
    }

    /// Send `arguments` and wait for the connect response.
    ///
    /// The arguments carry a fresh head id and correlation id on top of the
    /// client's execution context.
    ///
    /// The wait is bounded by the configured connect timeout and by
    /// `cancel_connect`. A refusal is returned as
    /// [`ReverseCallError::ConnectFailed`] carrying the remote's failure as
    /// received.
    #[instrument(skip_all, fields(head_id = tracing::field::Empty))]
    pub async fn connect(
        self,
        mut arguments: P::ConnectArguments,
        cancel_connect: &CancellationToken,
    ) -> Result<ConnectOutcome<P>, ReverseCallError> {
        let ReverseCallClient {
            protocol,
            connection,
            execution_context,
            config,
        } = self;
        let (mut sender, mut receiver) = connection.split();

        let head_id = HeadId::new();
        tracing::Span::current().record("head_id", tracing::field::display(head_id.0));
        // Every connection gets its own correlation id.
        protocol.set_arguments_context(
            &mut arguments,
            ArgumentsContext {
                head_id,
                ping_interval: config.ping_interval(),
                execution_context: execution_context.with_correlation(CorrelationId::new()),
            },
        );
        sender.send(protocol.wrap_arguments(arguments)).await?;
        debug!("Connect arguments sent");

        let connect_timeout = config.connect_timeout();
        let first = tokio::select! {
            biased;
            _ = cancel_connect.cancelled() => {
                info!("Connect cancelled");
                return Ok(ConnectOutcome::Cancelled);
            }
            first = tokio::time::timeout(connect_timeout, receiver.recv()) => first,
        };

        let message = match first {
            Ok(Some(Ok(message))) => message,
            Ok(Some(Err(e))) => return Err(e.into()),
            Ok(None) => {
                warn!("Stream ended before a connect response arrived");
                return Err(ReverseCallError::DidNotReceiveConnectResponse);
            }
            Err(_) => {
                warn!(?connect_timeout, "No connect response within timeout");
                return Err(ReverseCallError::DidNotReceiveConnectResponse);
            }
        };

        let response = match protocol.classify(message) {
            Some(ServerFrame::ConnectResponse(response)) => response,
            Some(frame) => {
                warn!(kind = frame.kind(), "First message was not a connect response");
                return Err(ReverseCallError::DidNotReceiveConnectResponse);
            }
            None => {
                warn!("First message was of no known kind");
                return Err(ReverseCallError::DidNotReceiveConnectResponse);
            }
        };

        if let Some(failure) = protocol.connect_failure(&response) {
            warn!(%failure, "Connect refused");
            return Err(ReverseCallError::ConnectFailed(failure.clone()));
        }

        info!("Connected");
        Ok(ConnectOutcome::Connected {
            call: ConnectedCall {
                protocol,
                sender,
                receiver,
                config,
            },
            response,
        })
    }

    /// Connect, then serve until the stream ends.
    ///
    /// `cancel_connect` only bounds the connect phase; `stop` ends
    /// servicing and is handed to every handler invocation.
    pub async fn run<H>(
        self,
        arguments: P::ConnectArguments,
        handler: Arc<H>,
        cancel_connect: &CancellationToken,
        stop: CancellationToken,
    ) -> ReverseCallOutcome
    where
        H: ReverseCallHandler<P>,
    {
        match self.connect(arguments, cancel_connect).await {
            Ok(ConnectOutcome::Connected { call, .. }) => call.serve(handler, stop).await,
            Ok(ConnectOutcome::Cancelled) => ReverseCallOutcome::Cancelled,
            Err(e) => ReverseCallOutcome::Failed(e),
        }
    }
}

/// A connection whose connect response has been accepted.
pub struct ConnectedCall<P: ReverseCallProtocol> {
    protocol: Arc<P>,
    sender: DuplexSender<P::ClientMessage>,
    receiver: DuplexReceiver<P::ServerMessage>,
    config: ReverseCallConfig,
}

/// Why the read loop stopped.
enum End {
    Stopped,
    Closed,
    WriterFailed,
    Failed(ReverseCallError),
}

impl<P: ReverseCallProtocol> ConnectedCall<P> {
    /// Service the stream: answer pings, dispatch requests to `handler` and
    /// write their responses, until the remote closes, `stop` fires or the
    /// connection fails.
    ///
    /// On stop or remote close, in-flight handlers get up to the drain
    /// timeout to finish and their responses are still written. On failure
    /// they are aborted.
    #[instrument(skip_all)]
    pub async fn serve<H>(self, handler: Arc<H>, stop: CancellationToken) -> ReverseCallOutcome
    where
        H: ReverseCallHandler<P>,
    {
        let ConnectedCall {
            protocol,
            sender,
            mut receiver,
            config,
        } = self;

        let writer = OutboundWriter::spawn(sender, config.outbound_buffer());
        let writer_failed = writer.failed();
        let mut dispatcher = Dispatcher::new(
            protocol.clone(),
            handler,
            writer.handle(),
            config.max_concurrency(),
            stop.clone(),
        );

        let ping_timeout = config.ping_timeout();
        let mut deadline = Instant::now() + ping_timeout;
        let (mut pings, mut requests) = (0u64, 0u64);

        let end = loop {
            tokio::select! {
                biased;
                _ = stop.cancelled() => break End::Stopped,
                _ = writer_failed.cancelled() => break End::WriterFailed,
                Some(joined) = dispatcher.join_next() => {
                    if let Err(e) = joined {
                        if e.is_panic() {
                            error!("Request handler panicked, tearing down connection");
                            break End::Failed(ReverseCallError::HandlerPanicked);
                        }
                    }
                }
                inbound = tokio::time::timeout_at(deadline, receiver.recv()) => {
                    let message = match inbound {
                        Ok(Some(Ok(message))) => message,
                        Ok(Some(Err(e))) => break End::Failed(e.into()),
                        Ok(None) => break End::Closed,
                        Err(_) => break End::Failed(ReverseCallError::PingTimedOut(ping_timeout)),
                    };
                    deadline = Instant::now() + ping_timeout;

                    match protocol.classify(message) {
                        Some(ServerFrame::Ping(_)) => {
                            pings += 1;
                            trace!("Ping received");
                            if !writer.pong(protocol.wrap_pong(Pong)) {
                                break End::WriterFailed;
                            }
                        }
                        Some(ServerFrame::Request(request)) => {
                            requests += 1;
                            dispatcher.dispatch(request);
                        }
                        Some(ServerFrame::ConnectResponse(_)) => {
                            warn!("Ignoring connect response received while servicing");
                        }
                        None => warn!("Ignoring inbound message of no known kind"),
                    }
                }
            }
        };

        match end {
            End::Stopped => {
                info!(pings, requests, "Processing stopped");
                dispatcher.drain(config.drain_timeout()).await;
                drop(dispatcher);
                if let Err(e) = writer.finish().await {
                    debug!("Outbound side did not close cleanly after stop: {}", e);
                }
                ReverseCallOutcome::Cancelled
            }
            End::Closed => {
                info!(pings, requests, "Stream closed by remote");
                dispatcher.drain(config.drain_timeout()).await;
                drop(dispatcher);
                if let Err(e) = writer.finish().await {
                    warn!("Outbound side did not close cleanly after remote close: {}", e);
                }
                ReverseCallOutcome::Completed
            }
            End::WriterFailed => {
                dispatcher.abort().await;
                let reason = match writer.finish().await {
                    Err(e) => ReverseCallError::Transport(e),
                    Ok(()) => ReverseCallError::WriterStopped,
                };
                warn!(pings, requests, "Connection failed: {}", reason);
                ReverseCallOutcome::Failed(reason)
            }
            End::Failed(reason) => {
                warn!(pings, requests, "Connection failed: {}", reason);
                dispatcher.abort().await;
                writer.abort().await;
                ReverseCallOutcome::Failed(reason)
            }
        }
    }
}
