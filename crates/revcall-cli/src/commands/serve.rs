//! A demo runtime.
//!
//! Accepts reverse-call streams over TCP and accepts every processor's
//! connect arguments. It then pings at the interval the processor asked
//! for and pushes a numbered request every request interval, printing the
//! responses it gets back.

use crate::protocol::{EchoClientMessage, EchoServerMessage};
use anyhow::Result;
use colored::Colorize;
use futures::StreamExt;
use revcall::core::{MicroserviceId, Ping};
use revcall::prelude::*;
use revcall::runtime::handshake::{serve_handshake, StaticHandshake};
use std::time::Duration;
use tokio_serde::formats::Bincode;
use tracing::{info, warn};

/// Used when a processor does not say how often it wants to be pinged.
const DEFAULT_PING_INTERVAL_MS: u64 = 5000;

pub fn run(addr: &str, handshake_addr: Option<&str>, request_interval_ms: u64) -> Result<()> {
    let request_interval = Duration::from_millis(request_interval_ms.max(1));
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        if let Some(handshake_addr) = handshake_addr {
            let (bound, _task) = serve_handshake(handshake_addr, runtime_handshake()).await?;
            println!("{} Handshake listening on {}", "ready".green().bold(), bound);
        }

        let mut listener =
            tarpc::serde_transport::tcp::listen(addr, Bincode::default).await?;
        println!(
            "{} Runtime listening on {}",
            "ready".green().bold(),
            listener.local_addr()
        );

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    println!("{} Shutting down", "runtime".green().bold());
                    return Ok(());
                }
                accepted = listener.next() => match accepted {
                    Some(Ok(transport)) => {
                        let connection: Duplex<EchoServerMessage, EchoClientMessage> =
                            Duplex::from_transport(transport, TransportError::from);
                        tokio::spawn(session(connection, request_interval));
                    }
                    Some(Err(e)) => warn!("Failed to accept connection: {}", e),
                    None => return Ok(()),
                },
            }
        }
    })
}

fn runtime_handshake() -> StaticHandshake {
    StaticHandshake::new(HandshakeResult {
        runtime_version: Version::new(0, 3, 0),
        contracts_version: Version::new(1, 0, 0),
        microservice_id: MicroserviceId::unknown(),
        environment: "development".to_string(),
    })
}

/// Serve one processor until it disconnects.
async fn session(
    connection: Duplex<EchoServerMessage, EchoClientMessage>,
    request_interval: Duration,
) {
    let (mut tx, mut rx) = connection.split();

    let (processor_id, ping_interval) = match rx.recv().await {
        Some(Ok(ClientMessage::Arguments(arguments))) => {
            let ping_interval = arguments
                .context
                .map(|context| context.ping_interval)
                .filter(|interval| !interval.is_zero())
                .unwrap_or(Duration::from_millis(DEFAULT_PING_INTERVAL_MS));
            (arguments.payload, ping_interval)
        }
        Some(Ok(_)) => {
            warn!("Processor did not start with connect arguments");
            return;
        }
        Some(Err(e)) => {
            warn!("Failed to read connect arguments: {}", e);
            return;
        }
        None => return,
    };
    println!("{} Processor {} connected", "runtime".green().bold(), processor_id);

    let accepted = ConnectResponse::Accepted(format!("welcome {}", processor_id));
    if tx.send(ServerMessage::ConnectResponse(accepted)).await.is_err() {
        return;
    }

    let mut pings = tokio::time::interval(ping_interval);
    let mut requests = tokio::time::interval(request_interval);
    let mut sequence = 0u64;
    loop {
        tokio::select! {
            _ = pings.tick() => {
                if tx.send(ServerMessage::Ping(Ping)).await.is_err() {
                    break;
                }
            }
            _ = requests.tick() => {
                sequence += 1;
                let request = Request {
                    context: RequestContext {
                        call_id: CallId::new(),
                        execution_context: ExecutionContext::default(),
                    },
                    payload: format!("request #{}", sequence),
                };
                if tx.send(ServerMessage::Request(request)).await.is_err() {
                    break;
                }
            }
            inbound = rx.recv() => match inbound {
                Some(Ok(ClientMessage::Response(response))) => {
                    println!(
                        "  {} {} {}",
                        "←".blue(),
                        processor_id.to_string().cyan(),
                        response.payload
                    );
                }
                Some(Ok(ClientMessage::Pong(_))) => {}
                Some(Ok(ClientMessage::Arguments(_))) => {
                    warn!(%processor_id, "Ignoring repeated connect arguments");
                }
                Some(Err(e)) => {
                    warn!(%processor_id, "Stream failed: {}", e);
                    break;
                }
                None => break,
            },
        }
    }
    info!(%processor_id, "Processor disconnected");
    println!("{} Processor {} disconnected", "runtime".green().bold(), processor_id);
}
