//! One buffered request and the retry token handed back to its caller.

use std::fmt;
use std::sync::{Mutex, PoisonError};

use tokio::sync::oneshot;
use tokio::sync::OwnedSemaphorePermit;
use tokio::time::Instant;

use crate::error::BufferError;

/// Token returned to the caller of a buffered request.
///
/// The caller must invoke [`RetryDone::done`] exactly once, when its retry
/// attempt has completed, regardless of the retry's outcome. That returns
/// the request's admission slot to the buffer and, during a drain, lets the
/// next buffered request through.
///
/// Dropping the token without calling `done` has the same effect, so a slot
/// can never leak; an explicit `done` call simply marks the intent.
///
/// The token deliberately does not observe the caller's cancellation: even a
/// caller whose own deadline expired still owes the buffer a completion
/// signal for the retry it was released into.
pub struct RetryDone {
    permit: Option<OwnedSemaphorePermit>,
    signal: Option<oneshot::Sender<()>>,
}

impl RetryDone {
    pub(crate) fn new(permit: OwnedSemaphorePermit) -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                permit: Some(permit),
                signal: Some(tx),
            },
            rx,
        )
    }

    /// Reports that the caller's retry attempt has completed.
    pub fn done(mut self) {
        self.finish();
    }

    fn finish(&mut self) {
        // Return the slot before signalling, so a drain worker that wakes up
        // on the signal can never observe the slot still taken.
        self.permit.take();
        if let Some(tx) = self.signal.take() {
            let _ = tx.send(());
        }
    }

    fn take_permit(&mut self) -> Option<OwnedSemaphorePermit> {
        self.permit.take()
    }
}

impl Drop for RetryDone {
    fn drop(&mut self) {
        self.finish();
    }
}

impl fmt::Debug for RetryDone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryDone")
            .field("holds_permit", &self.permit.is_some())
            .finish()
    }
}

/// What a buffered caller receives when its entry is unblocked.
pub(crate) struct WaitOutcome {
    pub(crate) retry: RetryDone,
    pub(crate) err: Option<BufferError>,
}

/// One buffered request.
///
/// Entries are shared between the queue, the timeout watcher and the drain
/// worker; identity comparisons use `Arc::ptr_eq`. The outcome channel is
/// consumed at most once: whoever takes `done_tx` out of the state is the
/// one unblocking the caller, everybody else backs off.
pub(crate) struct Entry {
    deadline: Instant,
    state: Mutex<EntryState>,
}

struct EntryState {
    done_tx: Option<oneshot::Sender<WaitOutcome>>,
    retry: Option<RetryDone>,
    retry_rx: Option<oneshot::Receiver<()>>,
}

impl Entry {
    /// Creates an entry owning `permit` and returns the receiver the caller
    /// blocks on.
    pub(crate) fn new(
        deadline: Instant,
        permit: OwnedSemaphorePermit,
    ) -> (Self, oneshot::Receiver<WaitOutcome>) {
        let (done_tx, done_rx) = oneshot::channel();
        let (retry, retry_rx) = RetryDone::new(permit);
        (
            Self {
                deadline,
                state: Mutex::new(EntryState {
                    done_tx: Some(done_tx),
                    retry: Some(retry),
                    retry_rx: Some(retry_rx),
                }),
            },
            done_rx,
        )
    }

    pub(crate) fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Unblocks the waiting caller with `err` as the terminal outcome
    /// (`None` means "retry now").
    ///
    /// Returns the retry-completion receiver so a drain worker can wait for
    /// the caller to finish; eviction paths drop it and do not wait.
    /// Unblocking an already-unblocked entry is a no-op.
    pub(crate) fn unblock(&self, err: Option<BufferError>) -> Option<oneshot::Receiver<()>> {
        let mut state = self.lock_state();
        let retry_rx = state.retry_rx.take();
        if let (Some(done_tx), Some(retry)) = (state.done_tx.take(), state.retry.take()) {
            // If the caller's wait future is already gone the outcome is
            // dropped here, which releases the permit and fires the signal.
            let _ = done_tx.send(WaitOutcome { retry, err });
        }
        retry_rx
    }

    /// Takes the admission permit out of the entry, leaving the retry token
    /// in place. Used by buffer-full eviction, which hands the slot straight
    /// to the replacing request instead of releasing it.
    pub(crate) fn take_permit(&self) -> Option<OwnedSemaphorePermit> {
        let mut state = self.lock_state();
        state.retry.as_mut().and_then(RetryDone::take_permit)
    }

    /// Discards the entry without delivering an outcome. Used by the remove
    /// path, where the caller has already given up: dropping the retry token
    /// here releases the slot and fires the completion signal on the
    /// caller's behalf.
    pub(crate) fn abandon(&self) {
        let mut state = self.lock_state();
        state.done_tx.take();
        state.retry.take();
        state.retry_rx.take();
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, EntryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("deadline", &self.deadline)
            .finish()
    }
}
