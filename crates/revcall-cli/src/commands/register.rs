//! Register an echo processor and keep it registered until ctrl-c.

use crate::protocol::{echo, EchoClientMessage, EchoProtocol, EchoServerMessage};
use anyhow::{Context, Result};
use colored::Colorize;
use revcall::prelude::*;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub fn run(
    config_path: Option<&str>,
    addr: Option<String>,
    handshake_addr: Option<String>,
) -> Result<()> {
    let mut config = match config_path {
        Some(path) => EngineConfig::load(Path::new(path))
            .with_context(|| format!("Failed to load {}", path))?,
        None => EngineConfig::discover().context("Failed to load revcall.toml")?,
    };
    if let Some(addr) = addr {
        config.address = addr;
    }
    if handshake_addr.is_some() {
        config.handshake_address = handshake_addr;
    }

    let processor_id = ProcessorId::new();
    println!(
        "{} Registering processor {} with {}...",
        "processor".green().bold(),
        processor_id,
        config.address
    );

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let connector = TcpConnector::<EchoClientMessage, EchoServerMessage>::new(
            config.address.clone(),
        )
        .with_connect_timeout(config.reverse_call.connect_timeout());

        let handler = Arc::new(handler_fn::<EchoProtocol, _, _>(
            |request: Request<String>, _context, _stop| async move {
                Response::new(echo(&request.payload))
            },
        ));

        let mut registration =
            Registration::new(processor_id, Arc::new(EchoProtocol::new()), connector, handler)
                .with_config(config.reverse_call.clone())
                .on_connected(|response, attempt| match response {
                    ConnectResponse::Accepted(greeting) => println!(
                        "{} Connected on attempt {}: {}",
                        "ready".green().bold(),
                        attempt,
                        greeting
                    ),
                    ConnectResponse::Refused(failure) => println!(
                        "{} Refused on attempt {}: {}",
                        "refused".red().bold(),
                        attempt,
                        failure
                    ),
                });
        if let Some(handshake_addr) = &config.handshake_address {
            let transport = TcpHandshake::new(handshake_addr.clone())
                .with_connect_timeout(config.handshake.timeout());
            let identity = config.handshake.identity()?;
            registration = registration.with_handshake(HandshakeClient::new(
                transport,
                identity,
                config.handshake.timeout(),
            ));
        }

        let stop = CancellationToken::new();
        tokio::spawn({
            let stop = stop.clone();
            async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    stop.cancel();
                }
            }
        });

        let outcome = registration
            .register_forever(ConnectArguments::new, &config.retry.policy(), stop)
            .await?;
        match outcome {
            RegistrationOutcome::Stopped { attempts } => println!(
                "{} Stopped after {} attempt(s)",
                "processor".green().bold(),
                attempts
            ),
            RegistrationOutcome::Completed { attempts } => println!(
                "{} Runtime closed the stream after {} attempt(s)",
                "processor".green().bold(),
                attempts
            ),
        }
        Ok(())
    })
}
