//! Bridges between blocking code on tokio's blocking pool and async streams.
//!
//! A blocking producer hands items over a bounded channel, so a slow client
//! applies backpressure to the upstream read and blocking work never stalls
//! the async workers. Upstream bytes reach the producer through a
//! [`ChannelReader`] pumped by an async task, which keeps the network read
//! itself cancellable.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::fmt::Display;
use std::io::{self, Read};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};

/// Sending half handed to the blocking producer.
pub struct BlockingSink<T> {
    tx: mpsc::Sender<T>,
    cancel: CancellationToken,
}

impl<T> BlockingSink<T> {
    /// Hand one item to the consumer, waiting for channel capacity.
    ///
    /// Returns `false` once the consumer is gone; the producer should stop
    /// pulling from upstream and return.
    pub fn send(&self, item: T) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        self.tx.blocking_send(item).is_ok()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled() || self.tx.is_closed()
    }
}

/// Receiving half. Dropping it fires the cancellation token.
pub struct BridgedStream<T> {
    rx: mpsc::Receiver<T>,
    _cancel_on_drop: DropGuard,
}

impl<T> Stream for BridgedStream<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.rx.poll_recv(cx)
    }
}

/// Run `producer` on the blocking pool and expose its output as a stream.
///
/// `cancel` fires when the returned stream is dropped. Must be called from
/// within a tokio runtime.
pub fn spawn_blocking_stream<T, F>(
    capacity: usize,
    cancel: CancellationToken,
    producer: F,
) -> BridgedStream<T>
where
    T: Send + 'static,
    F: FnOnce(BlockingSink<T>) + Send + 'static,
{
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let sink = BlockingSink {
        tx,
        cancel: cancel.clone(),
    };

    tokio::task::spawn_blocking(move || producer(sink));

    BridgedStream {
        rx,
        _cancel_on_drop: cancel.drop_guard(),
    }
}

/// Blocking [`Read`] over chunks pushed by [`pump_to_reader`].
///
/// Reports end of input once the pump stops, whether the body finished or
/// the pump was cancelled. Only read it from a blocking context.
pub struct ChannelReader {
    rx: mpsc::Receiver<io::Result<Bytes>>,
    current: Bytes,
}

impl Read for ChannelReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.current.is_empty() {
            match self.rx.blocking_recv() {
                Some(Ok(chunk)) => self.current = chunk,
                Some(Err(e)) => return Err(e),
                None => return Ok(0),
            }
        }

        let n = buf.len().min(self.current.len());
        buf[..n].copy_from_slice(&self.current.split_to(n));
        Ok(n)
    }
}

/// Drive `body` from a tokio task into a [`ChannelReader`].
///
/// The task drops `body`, closing its connection, as soon as `cancel` fires
/// or the reader goes away.
pub fn pump_to_reader<S, E>(body: S, capacity: usize, cancel: CancellationToken) -> ChannelReader
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let (tx, rx) = mpsc::channel(capacity.max(1));

    tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = forward(body, tx) => {}
        }
    });

    ChannelReader {
        rx,
        current: Bytes::new(),
    }
}

async fn forward<S, E>(body: S, tx: mpsc::Sender<io::Result<Bytes>>)
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Display,
{
    let mut body = std::pin::pin!(body);
    while let Some(chunk) = body.next().await {
        let item = chunk.map_err(|e| io::Error::other(e.to_string()));
        let failed = item.is_err();
        if tx.send(item).await.is_err() || failed {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_items_arrive_in_order() {
        let stream = spawn_blocking_stream(2, CancellationToken::new(), |sink| {
            for i in 0..5 {
                if !sink.send(i) {
                    return;
                }
            }
        });

        let items: Vec<i32> = stream.collect().await;
        assert_eq!(items, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_drop_stops_producer() {
        let (done_tx, done_rx) = tokio::sync::oneshot::channel();

        let mut stream = spawn_blocking_stream(1, CancellationToken::new(), move |sink| {
            let mut sent = 0u64;
            while sink.send(sent) {
                sent += 1;
            }
            let _ = done_tx.send(sink.is_cancelled());
        });

        assert_eq!(stream.next().await, Some(0));
        assert_eq!(stream.next().await, Some(1));
        drop(stream);

        let cancelled = tokio::time::timeout(Duration::from_secs(5), done_rx)
            .await
            .expect("producer did not stop")
            .expect("producer dropped the signal");
        assert!(cancelled);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_reader_sees_lines_split_across_chunks() {
        let chunks = vec![
            Ok::<_, String>(Bytes::from_static(b"data: a\nda")),
            Ok(Bytes::from_static(b"ta: b\n")),
        ];
        let reader = pump_to_reader(futures::stream::iter(chunks), 1, CancellationToken::new());

        let lines = tokio::task::spawn_blocking(move || {
            BufReader::new(reader)
                .lines()
                .collect::<io::Result<Vec<_>>>()
        })
        .await
        .unwrap()
        .unwrap();

        assert_eq!(lines, vec!["data: a", "data: b"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancel_unblocks_parked_reader() {
        struct DropFlag(Arc<AtomicBool>);
        impl Drop for DropFlag {
            fn drop(&mut self) {
                self.0.store(true, Ordering::SeqCst);
            }
        }

        let body_dropped = Arc::new(AtomicBool::new(false));
        let flag = DropFlag(body_dropped.clone());
        // One chunk, then silence.
        let body = futures::stream::once(async { Ok::<_, String>(Bytes::from_static(b"first\n")) })
            .chain(futures::stream::pending())
            .map(move |chunk| {
                let _flag = &flag;
                chunk
            });

        let cancel = CancellationToken::new();
        let reader = pump_to_reader(body, 1, cancel.clone());
        let reading = tokio::task::spawn_blocking(move || {
            let mut lines = BufReader::new(reader).lines();
            let first = lines.next();
            let rest: Vec<_> = lines.collect();
            (first.map(|l| l.unwrap()), rest.len())
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        let (first, rest) = tokio::time::timeout(Duration::from_secs(5), reading)
            .await
            .expect("reader stayed parked after cancel")
            .unwrap();
        assert_eq!(first.as_deref(), Some("first"));
        assert_eq!(rest, 0);

        for _ in 0..100 {
            if body_dropped.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(body_dropped.load(Ordering::SeqCst));
    }
}
