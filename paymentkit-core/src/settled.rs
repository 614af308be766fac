//! One-shot result container used to chain dependent asynchronous steps.
//!
//! A confirmation run is a sequence of steps whose completions arrive from
//! different tasks (transport responses, challenge callbacks, poll timers).
//! `Settled` is the meeting point: the first completion wins, every observer
//! sees the same value exactly once, and late completions are no-ops.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;

/// A one-shot, first-completion-wins result cell.
///
/// Cloning yields another handle onto the same cell. Observers may register
/// before or after completion; all of them observe the settled value.
/// Cancellation is expressed by the owner dropping its handles and ignoring
/// late completions, not by a dedicated primitive.
#[derive(Debug)]
pub(crate) struct Settled<T> {
    tx: Arc<watch::Sender<Option<T>>>,
}

impl<T> Clone for Settled<T> {
    fn clone(&self) -> Self {
        Self {
            tx: Arc::clone(&self.tx),
        }
    }
}

impl<T: Clone> Settled<T> {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Settles the cell with `value`. Returns `true` if this call won the
    /// race; a cell that is already settled is left untouched.
    pub(crate) fn settle(&self, value: T) -> bool {
        self.tx.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(value);
            true
        })
    }

    /// Returns the settled value without waiting, if any.
    pub(crate) fn peek(&self) -> Option<T> {
        self.tx.borrow().clone()
    }

    /// Waits for the cell to settle and returns the value.
    ///
    /// Completes immediately when the cell settled before the call.
    pub(crate) async fn wait(&self) -> T {
        let mut rx = self.tx.subscribe();
        loop {
            if let Some(value) = rx.borrow_and_update().as_ref() {
                return value.clone();
            }
            // The sender lives inside `self`, so the channel cannot close
            // while we hold it; a recv error only makes us re-check the slot.
            let _ = rx.changed().await;
        }
    }
}

impl<T: Clone, E: Clone> Settled<Result<T, E>> {
    /// Derives a dependent asynchronous operation from the success value.
    ///
    /// A settled failure is propagated without invoking `op`.
    pub(crate) async fn and_then<U, F, Fut>(&self, op: F) -> Result<U, E>
    where
        F: FnOnce(T) -> Fut,
        Fut: Future<Output = Result<U, E>>,
    {
        match self.wait().await {
            Ok(value) => op(value).await,
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn first_settle_wins() {
        let cell = Settled::new();
        assert!(cell.settle(1));
        assert!(!cell.settle(2));
        assert_eq!(cell.peek(), Some(1));
        assert_eq!(cell.wait().await, 1);
    }

    #[tokio::test]
    async fn observer_registered_before_completion() {
        let cell: Settled<&'static str> = Settled::new();
        let waiter = {
            let cell = cell.clone();
            tokio::spawn(async move { cell.wait().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(cell.settle("done"));
        assert_eq!(waiter.await.unwrap(), "done");
    }

    #[tokio::test]
    async fn observer_registered_after_completion() {
        let cell = Settled::new();
        assert!(cell.settle(42));
        assert_eq!(cell.wait().await, 42);
        // A second observer sees the same value again.
        assert_eq!(cell.wait().await, 42);
    }

    #[tokio::test]
    async fn many_observers_see_one_value() {
        let cell: Settled<u32> = Settled::new();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cell = cell.clone();
                tokio::spawn(async move { cell.wait().await })
            })
            .collect();
        assert!(cell.settle(7));
        for handle in handles {
            assert_eq!(handle.await.unwrap(), 7);
        }
    }

    #[tokio::test]
    async fn and_then_chains_success() {
        let cell: Settled<Result<u32, String>> = Settled::new();
        cell.settle(Ok(20));
        let doubled = cell.and_then(|n| async move { Ok(n * 2) }).await;
        assert_eq!(doubled, Ok(40));
    }

    #[tokio::test]
    async fn and_then_propagates_failure_without_invoking_op() {
        let cell: Settled<Result<u32, String>> = Settled::new();
        cell.settle(Err("boom".to_string()));
        let result: Result<u32, String> = cell
            .and_then(|_| async move { panic!("must not run") })
            .await;
        assert_eq!(result, Err("boom".to_string()));
    }
}
