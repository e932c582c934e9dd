//! The single outbound writer of a connection.
//!
//! The transport does not tolerate concurrent writers, so every outbound
//! message goes through one task. Pongs travel on their own unbounded lane
//! and always win over queued responses, so a backlog of responses never
//! delays a keep-alive answer.

use crate::connection::DuplexSender;
use revcall_core::TransportError;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

pub(crate) struct OutboundWriter<M> {
    pongs: mpsc::UnboundedSender<M>,
    messages: mpsc::Sender<M>,
    failed: CancellationToken,
    task: JoinHandle<Result<(), TransportError>>,
}

impl<M: Send + 'static> OutboundWriter<M> {
    /// Take ownership of `sender` and start writing. `buffer` bounds the
    /// queue of non-pong messages.
    pub fn spawn(sender: DuplexSender<M>, buffer: usize) -> Self {
        let (pongs, pong_rx) = mpsc::unbounded_channel();
        let (messages, message_rx) = mpsc::channel(buffer.max(1));
        let failed = CancellationToken::new();
        let task = tokio::spawn(write_loop(sender, pong_rx, message_rx, failed.clone()));
        Self {
            pongs,
            messages,
            failed,
            task,
        }
    }

    /// Queue a pong ahead of every queued message. `false` once the writer
    /// has stopped.
    pub fn pong(&self, message: M) -> bool {
        self.pongs.send(message).is_ok()
    }

    /// A handle for queueing ordinary messages. Handles held elsewhere keep
    /// the writer open until they are dropped.
    pub fn handle(&self) -> mpsc::Sender<M> {
        self.messages.clone()
    }

    /// Cancelled when a write fails.
    pub fn failed(&self) -> CancellationToken {
        self.failed.clone()
    }

    /// Stop accepting messages, write what is queued, close the outbound
    /// direction and report how writing ended.
    pub async fn finish(self) -> Result<(), TransportError> {
        let OutboundWriter {
            pongs,
            messages,
            task,
            ..
        } = self;
        drop(pongs);
        drop(messages);
        match task.await {
            Ok(result) => result,
            Err(e) => {
                warn!("Outbound writer task ended abnormally: {}", e);
                Err(TransportError::Closed)
            }
        }
    }

    /// Stop writing immediately, dropping whatever is queued. Returns once
    /// the writer task, and with it the outbound sink, is gone.
    pub async fn abort(self) {
        self.task.abort();
        let _ = self.task.await;
    }
}

async fn write_loop<M>(
    mut sender: DuplexSender<M>,
    mut pongs: mpsc::UnboundedReceiver<M>,
    mut messages: mpsc::Receiver<M>,
    failed: CancellationToken,
) -> Result<(), TransportError> {
    loop {
        let message = tokio::select! {
            biased;
            Some(pong) = pongs.recv() => pong,
            Some(message) = messages.recv() => message,
            else => break,
        };
        if let Err(e) = sender.send(message).await {
            warn!("Outbound write failed: {}", e);
            failed.cancel();
            return Err(e);
        }
        trace!("Outbound message written");
    }

    debug!("Outbound queue drained, closing stream");
    sender.close().await.map_err(|e| {
        failed.cancel();
        e
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Duplex;
    use futures::channel::mpsc as fmpsc;
    use futures::{SinkExt, StreamExt};

    fn sink_pair<M: Send + 'static>() -> (DuplexSender<M>, fmpsc::UnboundedReceiver<M>) {
        let (tx, rx) = fmpsc::unbounded::<M>();
        let sink = tx.sink_map_err(|e| TransportError::Channel(e.to_string()));
        let (sender, _receiver) =
            Duplex::<M, ()>::from_parts(sink, futures::stream::empty()).split();
        (sender, rx)
    }

    #[tokio::test]
    async fn test_pongs_jump_the_queue() {
        let (sender, rx) = sink_pair::<&'static str>();
        let (pong_tx, pong_rx) = mpsc::unbounded_channel();
        let (message_tx, message_rx) = mpsc::channel(8);

        // Everything is queued before the loop starts, so the pong is
        // picked first even though it was queued last.
        message_tx.send("response-1").await.unwrap();
        message_tx.send("response-2").await.unwrap();
        pong_tx.send("pong").unwrap();
        drop(message_tx);
        drop(pong_tx);

        write_loop(sender, pong_rx, message_rx, CancellationToken::new())
            .await
            .unwrap();
        let written: Vec<_> = rx.collect().await;
        assert_eq!(written, vec!["pong", "response-1", "response-2"]);
    }

    #[tokio::test]
    async fn test_finish_flushes_queued_messages() {
        let (sender, rx) = sink_pair::<u32>();
        let writer = OutboundWriter::spawn(sender, 4);
        let handle = writer.handle();
        for i in 0..3 {
            handle.send(i).await.unwrap();
        }
        assert!(writer.pong(99));
        drop(handle);

        writer.finish().await.unwrap();
        let mut written: Vec<_> = rx.collect().await;
        written.sort();
        assert_eq!(written, vec![0, 1, 2, 99]);
    }

    #[tokio::test]
    async fn test_write_failure_cancels_failed_token() {
        let (sender, rx) = sink_pair::<u32>();
        drop(rx);
        let writer = OutboundWriter::spawn(sender, 4);
        let failed = writer.failed();

        assert!(writer.pong(1));
        failed.cancelled().await;
        assert!(matches!(
            writer.finish().await,
            Err(TransportError::Channel(_))
        ));
    }

    #[tokio::test]
    async fn test_abort_releases_the_sink_before_returning() {
        let (sender, mut rx) = sink_pair::<u32>();
        let writer = OutboundWriter::spawn(sender, 4);
        // An outstanding handle would otherwise keep the writer running.
        let _handle = writer.handle();

        writer.abort().await;
        assert_eq!(rx.try_next().unwrap(), None);
    }
}
