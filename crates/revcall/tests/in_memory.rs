//! End-to-end registration over the in-memory transport, using only the
//! facade prelude.

use revcall::prelude::*;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

type Upper = EnvelopeProtocol<ProcessorId, String, String, String>;

fn request(payload: &str) -> ServerMessage<String, String> {
    ServerMessage::Request(Request {
        context: RequestContext {
            call_id: CallId::new(),
            execution_context: ExecutionContext::default(),
        },
        payload: payload.to_string(),
    })
}

#[tokio::test]
async fn test_processor_reconnects_after_refusal_and_serves_requests() {
    let (connector, mut listener) = memory_transport::<
        ClientMessage<ProcessorId, String>,
        ServerMessage<String, String>,
    >();

    let server = tokio::spawn(async move {
        // First connection: refuse.
        let (mut tx, mut rx) = listener.accept().await.unwrap().split();
        assert!(matches!(
            rx.recv().await,
            Some(Ok(ClientMessage::Arguments(_)))
        ));
        tx.send(ServerMessage::ConnectResponse(ConnectResponse::Refused(
            Failure::unknown("not yet"),
        )))
        .await
        .unwrap();

        // Second connection: accept and push two requests.
        let (mut tx, mut rx) = listener.accept().await.unwrap().split();
        assert!(matches!(
            rx.recv().await,
            Some(Ok(ClientMessage::Arguments(_)))
        ));
        tx.send(ServerMessage::ConnectResponse(ConnectResponse::Accepted(
            "ok".to_string(),
        )))
        .await
        .unwrap();
        tx.send(request("hello")).await.unwrap();
        tx.send(request("world")).await.unwrap();

        let mut answers = Vec::new();
        while answers.len() < 2 {
            if let Some(Ok(ClientMessage::Response(response))) = rx.recv().await {
                answers.push(response.payload);
            }
        }
        answers
    });

    let connected_on = Arc::new(AtomicU32::new(0));
    let observed = connected_on.clone();
    let handler = Arc::new(handler_fn::<Upper, _, _>(
        |request: Request<String>, _, _| async move {
            Response::new(request.payload.to_uppercase())
        },
    ));
    let registration =
        Registration::new(ProcessorId::new(), Arc::new(Upper::new()), connector, handler)
            .on_connected(move |_, attempt| observed.store(attempt, Ordering::SeqCst));

    let policy = FixedDelay::new(Duration::from_millis(10)).with_max_retries(3);
    let stop = CancellationToken::new();
    let run = tokio::spawn({
        let stop = stop.clone();
        async move {
            registration
                .register_forever(ConnectArguments::new, &policy, stop)
                .await
        }
    });

    let answers = server.await.unwrap();
    assert_eq!(answers, vec!["HELLO".to_string(), "WORLD".to_string()]);
    assert_eq!(connected_on.load(Ordering::SeqCst), 2);

    stop.cancel();
    let outcome = run.await.unwrap().unwrap();
    assert!(matches!(
        outcome,
        RegistrationOutcome::Stopped { attempts: 2 }
            | RegistrationOutcome::Completed { attempts: 2 }
    ));
}
