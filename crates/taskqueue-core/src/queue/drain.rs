//! Drain notifier: wakes `on_empty` waiters once nothing is pending or running.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

/// Outstanding `on_empty` waiters. Each waiter is settled exactly once.
#[derive(Default)]
pub(crate) struct DrainNotifier {
    waiters: Vec<oneshot::Sender<()>>,
}

impl DrainNotifier {
    pub(crate) fn register(&mut self) -> OnEmpty {
        // drop senders whose `OnEmpty` is already gone
        self.waiters.retain(|tx| !tx.is_closed());
        let (tx, rx) = oneshot::channel();
        self.waiters.push(tx);
        OnEmpty { rx }
    }

    /// Detach every current waiter. Call `settle` on the result after the
    /// scheduler lock is released.
    pub(crate) fn take(&mut self) -> DrainedWaiters {
        DrainedWaiters(std::mem::take(&mut self.waiters))
    }

    pub(crate) fn waiting(&self) -> usize {
        self.waiters.len()
    }
}

#[must_use]
pub(crate) struct DrainedWaiters(Vec<oneshot::Sender<()>>);

impl DrainedWaiters {
    pub(crate) fn none() -> Self {
        Self(Vec::new())
    }

    pub(crate) fn len(&self) -> usize {
        self.0.len()
    }

    pub(crate) fn settle(self) {
        for tx in self.0 {
            // waiter may have been dropped
            let _ = tx.send(());
        }
    }
}

/// Future returned by `TaskQueue::on_empty`.
///
/// Resolves once the queue has no pending and no running tasks.
#[must_use = "futures do nothing unless awaited"]
pub struct OnEmpty {
    rx: oneshot::Receiver<()>,
}

impl Future for OnEmpty {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        // A closed channel means the queue is gone, which only happens once
        // it can no longer hold any work.
        Pin::new(&mut self.rx).poll(cx).map(|_| ())
    }
}
