//! Ordered, panic-isolated delivery
//!
//! A [`DeliveryQueue`] hands items to a sink on a dedicated consumer so
//! producers never wait for the sink. Items pushed to one queue reach
//! the sink in push order; a panicking sink is logged and the consumer
//! moves on to the next item.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{error, warn};

type Sink<T> = Arc<dyn Fn(T) + Send + Sync>;

/// Fire-and-forget queue in front of a sink
pub struct DeliveryQueue<T> {
    name: String,
    tx: mpsc::UnboundedSender<T>,
}

impl<T: Send + 'static> DeliveryQueue<T> {
    /// Start a consumer for `sink`. Inside a tokio runtime the consumer is
    /// a task and every item runs on the blocking pool; otherwise a named
    /// thread is used.
    pub fn spawn<F>(name: impl Into<String>, sink: F) -> Self
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        let name = name.into();
        let sink: Sink<T> = Arc::new(sink);
        let (tx, rx) = mpsc::unbounded_channel();

        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn(consume_async(name.clone(), rx, sink));
            }
            Err(_) => {
                let thread_name = name.clone();
                let spawned = std::thread::Builder::new()
                    .name(thread_name.clone())
                    .spawn(move || consume_blocking(thread_name, rx, sink));
                if let Err(e) = spawned {
                    error!(queue = %name, error = %e, "failed to start delivery thread");
                }
            }
        }

        Self { name, tx }
    }

    /// Queue an item. Returns false when the consumer has stopped.
    pub fn push(&self, item: T) -> bool {
        if self.tx.send(item).is_err() {
            warn!(queue = %self.name, "delivery consumer stopped, item dropped");
            return false;
        }
        true
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

async fn consume_async<T: Send + 'static>(
    name: String,
    mut rx: mpsc::UnboundedReceiver<T>,
    sink: Sink<T>,
) {
    while let Some(item) = rx.recv().await {
        let sink = Arc::clone(&sink);
        if let Err(e) = tokio::task::spawn_blocking(move || sink(item)).await {
            if e.is_panic() {
                error!(queue = %name, "handler panicked during delivery");
            } else {
                warn!(queue = %name, error = %e, "delivery task cancelled");
            }
        }
    }
}

fn consume_blocking<T>(name: String, mut rx: mpsc::UnboundedReceiver<T>, sink: Sink<T>) {
    while let Some(item) = rx.blocking_recv() {
        if catch_unwind(AssertUnwindSafe(|| sink(item))).is_err() {
            error!(queue = %name, "handler panicked during delivery");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_items_arrive_in_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let queue = DeliveryQueue::spawn("order", move |n: u32| {
            let _ = tx.send(n);
        });
        for n in 0..20 {
            assert!(queue.push(n));
        }
        let mut seen = Vec::new();
        while seen.len() < 20 {
            let n = tokio::time::timeout(Duration::from_secs(2), rx.recv())
                .await
                .expect("delivery timed out")
                .expect("channel open");
            seen.push(n);
        }
        assert_eq!(seen, (0..20).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_panicking_sink_keeps_consuming() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let queue = DeliveryQueue::spawn("panics", move |n: u32| {
            if n == 1 {
                panic!("boom");
            }
            let _ = tx.send(n);
        });
        queue.push(1);
        queue.push(2);
        let n = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("delivery timed out");
        assert_eq!(n, Some(2));
    }

    #[test]
    fn test_thread_consumer_outside_runtime() {
        let (tx, rx) = std::sync::mpsc::channel();
        let queue = DeliveryQueue::spawn("thread", move |s: String| {
            let _ = tx.send(s);
        });
        queue.push("hello".to_string());
        let got = rx.recv_timeout(Duration::from_secs(2)).expect("delivered");
        assert_eq!(got, "hello");
    }
}
