//! Coalescing fast changing input, such as search text, into settled values.
//!
//! The sender side never waits. The receiver side only yields once no new
//! value has arrived for the quiet period.

use std::time::Duration;

use tokio::sync::watch;

use crate::BudgeteurClient;

/// Create a debounced channel starting at `initial`.
///
/// `initial` is not yielded by [Debounced::settled], only later values are.
pub fn channel<T: Clone>(initial: T, quiet_period: Duration) -> (DebounceSender<T>, Debounced<T>) {
    let (sender, receiver) = watch::channel(initial);

    (
        DebounceSender(sender),
        Debounced {
            receiver,
            quiet_period,
            closed: false,
        },
    )
}

/// The input side of a debounced channel.
#[derive(Debug)]
pub struct DebounceSender<T>(watch::Sender<T>);

impl<T> DebounceSender<T> {
    /// Replace the pending value.
    pub fn send(&self, value: T) {
        self.0.send_replace(value);
    }
}

/// The output side of a debounced channel.
#[derive(Debug)]
pub struct Debounced<T> {
    receiver: watch::Receiver<T>,
    quiet_period: Duration,
    closed: bool,
}

impl<T: Clone> Debounced<T> {
    /// Wait for the next value that is not followed by another within the
    /// quiet period.
    ///
    /// Returns `None` once the sender is gone and the last value has been
    /// yielded.
    pub async fn settled(&mut self) -> Option<T> {
        if self.closed || self.receiver.changed().await.is_err() {
            self.closed = true;
            return None;
        }

        loop {
            tokio::select! {
                changed = self.receiver.changed() => {
                    if changed.is_err() {
                        // Sender dropped with a value still pending.
                        self.closed = true;
                        break;
                    }
                }
                _ = tokio::time::sleep(self.quiet_period) => break,
            }
        }

        Some(self.receiver.borrow_and_update().clone())
    }

    /// The most recent value, settled or not.
    pub fn latest(&self) -> T {
        self.receiver.borrow().clone()
    }

    /// The quiet period.
    pub fn quiet_period(&self) -> Duration {
        self.quiet_period
    }
}

impl BudgeteurClient {
    /// A debounced channel for free-text search input, starting at `initial`.
    ///
    /// The quiet period is the configured `search_debounce`. Feed the settled
    /// values into [crate::TransactionFilters::set_search].
    pub fn search_input(&self, initial: &str) -> (DebounceSender<String>, Debounced<String>) {
        channel(initial.to_owned(), self.config().search_debounce)
    }
}
