//! The session state machine.
//!
//! States advance `Connecting → Connected → LoggingIn →
//! {AuthenticationFailed | Ready}`; `Disconnected` is terminal and reachable
//! from every state at any time on the error path. Transitions other than to
//! `Disconnected` are driven by the authentication flow.
//!
//! The load-bearing property is the *synchronous handoff*: `transition(S)`
//! does not return until every task that was blocked in `wait_for(S)` at the
//! moment of the broadcast has observed the new state and deregistered.
//! Collaborators rely on this — the challenge flow must be guaranteed to
//! observe `LoggingIn` before the login flow proceeds to completion.

use std::fmt;
use std::pin::pin;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{Notify, watch};

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Connecting,
    Connected,
    LoggingIn,
    AuthenticationFailed,
    Ready,
    Disconnected,
}

impl SessionState {
    pub(crate) const COUNT: usize = 6;

    pub(crate) fn index(self) -> usize {
        match self {
            Self::Connecting => 0,
            Self::Connected => 1,
            Self::LoggingIn => 2,
            Self::AuthenticationFailed => 3,
            Self::Ready => 4,
            Self::Disconnected => 5,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::LoggingIn => "logging-in",
            Self::AuthenticationFailed => "authentication-failed",
            Self::Ready => "ready",
            Self::Disconnected => "disconnected",
        };
        f.write_str(name)
    }
}

/// State cell with broadcast wakeups and per-state waiter counts.
pub(crate) struct StateTracker {
    tx: watch::Sender<SessionState>,
    /// How many `wait_for` calls are currently registered per target state.
    /// `transition` drains the count for its own target before returning.
    waiters: [AtomicUsize; SessionState::COUNT],
    drained: Notify,
}

impl StateTracker {
    pub(crate) fn new() -> Self {
        let (tx, _) = watch::channel(SessionState::Connecting);
        Self {
            tx,
            waiters: [const { AtomicUsize::new(0) }; SessionState::COUNT],
            drained: Notify::new(),
        }
    }

    pub(crate) fn current(&self) -> SessionState {
        *self.tx.borrow()
    }

    /// Number of registered waiters for a state. Exposed for tests.
    #[cfg(test)]
    pub(crate) fn waiter_count(&self, state: SessionState) -> usize {
        self.waiters[state.index()].load(Ordering::SeqCst)
    }

    /// Blocks until the session state equals `target`.
    ///
    /// Re-entrant: any number of concurrent waiters, for the same or
    /// different targets. The watch subscription is taken before the waiter
    /// registers, so a transition racing with registration is never missed.
    /// Cancel-safe: dropping the future deregisters the waiter, so racing
    /// two `wait_for` calls in a `select!` cannot wedge a later transition.
    pub(crate) async fn wait_for(&self, target: SessionState) {
        let mut rx = self.tx.subscribe();
        self.waiters[target.index()].fetch_add(1, Ordering::SeqCst);
        let _guard = WaiterGuard {
            tracker: self,
            index: target.index(),
        };
        // wait_for checks the current value first, so a transition that
        // happened between subscribe() and here is observed immediately.
        // The sender lives as long as `self`; the Err arm is unreachable
        // while a waiter borrows the tracker.
        let _ = rx.wait_for(|state| *state == target).await;
    }

    /// Sets the state and wakes all waiters, then waits until every waiter
    /// registered for `target` has observed the new state and deregistered.
    ///
    /// Concurrent `transition` calls race only on which state wins
    /// (last-writer-wins); callers serialize transitions in practice.
    pub(crate) async fn transition(&self, target: SessionState) {
        self.tx.send_replace(target);
        let count = &self.waiters[target.index()];
        let mut notified = pin!(self.drained.notified());
        loop {
            // Arm the permit before checking, so a waiter that decrements
            // between the check and the await still wakes us.
            notified.as_mut().enable();
            if count.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.as_mut().await;
            notified.set(self.drained.notified());
        }
    }
}

/// Deregisters a waiter when its `wait_for` future completes or is dropped.
struct WaiterGuard<'a> {
    tracker: &'a StateTracker,
    index: usize,
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        self.tracker.waiters[self.index].fetch_sub(1, Ordering::SeqCst);
        self.tracker.drained.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_current_starts_connecting() {
        let tracker = StateTracker::new();
        assert_eq!(tracker.current(), SessionState::Connecting);
    }

    #[tokio::test]
    async fn test_transition_with_no_waiters_returns_immediately() {
        let tracker = StateTracker::new();
        tracker.transition(SessionState::Connected).await;
        assert_eq!(tracker.current(), SessionState::Connected);
    }

    #[tokio::test]
    async fn test_wait_for_current_state_returns_immediately() {
        let tracker = StateTracker::new();
        tracker.wait_for(SessionState::Connecting).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_waiter_registered_before_transition_is_released() {
        let tracker = Arc::new(StateTracker::new());
        let released = Arc::new(AtomicUsize::new(0));

        let waiter = {
            let tracker = Arc::clone(&tracker);
            let released = Arc::clone(&released);
            tokio::spawn(async move {
                tracker.wait_for(SessionState::Ready).await;
                released.fetch_add(1, Ordering::SeqCst);
            })
        };
        // Let the waiter register.
        while tracker.waiter_count(SessionState::Ready) == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        tracker.transition(SessionState::Ready).await;

        // The handoff guarantee: by the time transition returns, the waiter
        // has observed the state.
        assert_eq!(released.load(Ordering::SeqCst), 1);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn test_dropped_waiter_deregisters() {
        let tracker = Arc::new(StateTracker::new());
        {
            let mut wait = Box::pin(tracker.wait_for(SessionState::Disconnected));
            // Poll the waiter once so it registers, then drop it.
            tokio::select! {
                biased;
                _ = &mut wait => panic!("state never becomes Disconnected here"),
                _ = tokio::task::yield_now() => {}
            }
        }
        assert_eq!(tracker.waiter_count(SessionState::Disconnected), 0);

        // A transition to the abandoned target must not hang.
        tokio::time::timeout(
            Duration::from_secs(1),
            tracker.transition(SessionState::Disconnected),
        )
        .await
        .expect("transition should not wait on a dropped waiter");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_thousand_waiters_all_released_by_transition() {
        let tracker = Arc::new(StateTracker::new());
        let released = Arc::new(AtomicUsize::new(0));

        const NUM_WAITS: usize = 1000;
        let mut handles = Vec::with_capacity(NUM_WAITS);
        for _ in 0..NUM_WAITS {
            let tracker = Arc::clone(&tracker);
            let released = Arc::clone(&released);
            handles.push(tokio::spawn(async move {
                tracker.wait_for(SessionState::Disconnected).await;
                released.fetch_add(1, Ordering::SeqCst);
            }));
        }
        while tracker.waiter_count(SessionState::Disconnected) < NUM_WAITS {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        tracker.transition(SessionState::Disconnected).await;

        // The handoff guarantee: every registered waiter has observed the
        // state and deregistered by the time transition returns.
        assert_eq!(tracker.waiter_count(SessionState::Disconnected), 0);

        tracker.transition(SessionState::Connecting).await;

        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(released.load(Ordering::SeqCst), NUM_WAITS);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_waiters_for_other_states_stay_blocked() {
        let tracker = Arc::new(StateTracker::new());

        let waiter = {
            let tracker = Arc::clone(&tracker);
            tokio::spawn(async move {
                tracker.wait_for(SessionState::Disconnected).await;
            })
        };
        while tracker.waiter_count(SessionState::Disconnected) == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        tracker.transition(SessionState::LoggingIn).await;

        // Still registered: LoggingIn is not its target.
        assert_eq!(tracker.waiter_count(SessionState::Disconnected), 1);

        tracker.transition(SessionState::Disconnected).await;
        assert_eq!(tracker.waiter_count(SessionState::Disconnected), 0);
        waiter.await.unwrap();
    }
}
