use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

use super::Item;

#[derive(Default)]
struct Signal {
    triggered: AtomicBool,
    notify: Notify,
}

/// Pipeline-wide stop signal.
///
/// Once triggered, every [`Inbox`] reports exhaustion and every [`Outbox`]
/// refuses items, so each operator returns at its next queue operation.
#[derive(Clone, Default)]
pub struct Shutdown {
    signal: Arc<Signal>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.signal.triggered.store(true, Ordering::SeqCst);
        self.signal.notify.notify_waiters();
    }

    pub fn is_triggered(&self) -> bool {
        self.signal.triggered.load(Ordering::SeqCst)
    }

    pub async fn wait(&self) {
        loop {
            let notified = self.signal.notify.notified();
            if self.is_triggered() {
                return;
            }
            notified.await;
        }
    }
}

impl std::fmt::Debug for Shutdown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shutdown")
            .field("triggered", &self.is_triggered())
            .finish()
    }
}

/// Receiving end of a queue. Clones share the queue: each item is taken by
/// exactly one of them.
#[derive(Clone, Debug)]
pub struct Inbox {
    rx: async_channel::Receiver<Item>,
    shutdown: Shutdown,
}

impl Inbox {
    /// Next item, or `None` once the queue is closed and drained or the
    /// pipeline is shutting down.
    pub async fn next(&self) -> Option<Item> {
        if self.shutdown.is_triggered() {
            return None;
        }
        tokio::select! {
            biased;
            _ = self.shutdown.wait() => None,
            item = self.rx.recv() => item.ok(),
        }
    }

    pub fn shutdown(&self) -> &Shutdown {
        &self.shutdown
    }

    /// Drain the queue into a vector.
    pub async fn collect(self) -> Vec<Item> {
        let mut items = Vec::new();
        while let Some(item) = self.next().await {
            items.push(item);
        }
        items
    }
}

/// Sending end of a queue. The queue closes when the last clone is dropped.
#[derive(Clone, Debug)]
pub struct Outbox {
    tx: async_channel::Sender<Item>,
    shutdown: Shutdown,
}

impl Outbox {
    /// Hand an item downstream. `false` means nobody will ever read it: the
    /// item has been dropped and the caller should stop producing.
    pub async fn send(&self, item: Item) -> bool {
        if self.shutdown.is_triggered() {
            return false;
        }
        self.tx.send(item).await.is_ok()
    }

    pub fn shutdown(&self) -> &Shutdown {
        &self.shutdown
    }
}

/// A fresh unbounded queue bound to `shutdown`.
pub fn channel(shutdown: &Shutdown) -> (Outbox, Inbox) {
    let (tx, rx) = async_channel::unbounded();
    (
        Outbox {
            tx,
            shutdown: shutdown.clone(),
        },
        Inbox {
            rx,
            shutdown: shutdown.clone(),
        },
    )
}

/// A closed queue pre-filled with `items`.
pub fn source<I>(items: I, shutdown: &Shutdown) -> Inbox
where
    I: IntoIterator,
    I::Item: Into<Item>,
{
    let (tx, rx) = async_channel::unbounded();
    for item in items {
        // Unbounded and the receiver is alive: cannot fail
        let _ = tx.try_send(item.into());
    }
    Inbox {
        rx,
        shutdown: shutdown.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn closes_when_senders_drop() {
        let shutdown = Shutdown::new();
        let (tx, rx) = channel(&shutdown);
        let tx2 = tx.clone();
        assert!(tx.send(Item::Count(1)).await);
        drop(tx);
        assert!(tx2.send(Item::Count(2)).await);
        drop(tx2);

        let counts: Vec<_> = rx.collect().await.iter().filter_map(Item::as_count).collect();
        assert_eq!(counts, [1, 2]);
    }

    #[tokio::test]
    async fn shutdown_stops_both_ends() {
        let shutdown = Shutdown::new();
        let (tx, rx) = channel(&shutdown);
        assert!(tx.send(Item::Count(1)).await);

        shutdown.trigger();
        assert!(rx.next().await.is_none());
        assert!(!tx.send(Item::Count(2)).await);
    }

    #[tokio::test]
    async fn shutdown_wakes_a_blocked_reader() {
        let shutdown = Shutdown::new();
        let (_tx, rx) = channel(&shutdown);
        let reader = tokio::spawn(async move { rx.next().await.is_none() });
        tokio::task::yield_now().await;

        shutdown.trigger();
        assert!(reader.await.unwrap());
    }

    #[tokio::test]
    async fn send_fails_without_receivers() {
        let shutdown = Shutdown::new();
        let (tx, rx) = channel(&shutdown);
        drop(rx);
        assert!(!tx.send(Item::Count(1)).await);
    }

    #[tokio::test]
    async fn source_is_closed_after_its_items() {
        let inbox = source(["a", "b"], &Shutdown::new());
        let paths: Vec<String> = inbox.collect().await.iter().map(|i| i.to_string()).collect();
        assert_eq!(paths, ["a", "b"]);
    }
}
