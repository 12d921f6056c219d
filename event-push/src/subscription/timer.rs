//! Cancellable one-shot timer.
//!
//! Used for UI reveal/hide delays (banner settle, auto-hide). A timer owns at
//! most one pending action; `reset` re-arms it with the same action and
//! `cancel` drops it without running.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

type Action = Box<dyn FnOnce() + Send + 'static>;

#[derive(Default)]
struct TimerState {
    action: Option<Action>,
    cancel: Option<CancellationToken>,
}

/// Handle to a one-shot delayed action. Cloning shares the same timer.
#[derive(Clone, Default)]
pub struct CancellableTimer {
    state: Arc<Mutex<TimerState>>,
}

impl CancellableTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the timer, replacing any pending action.
    pub fn start<F>(&self, delay: Duration, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.state.lock();
        if let Some(previous) = state.cancel.take() {
            previous.cancel();
        }
        state.action = Some(Box::new(action));
        state.cancel = Some(self.spawn(delay));
    }

    /// Restart the countdown for the pending action.
    ///
    /// Returns false when nothing is pending (already fired or cancelled).
    pub fn reset(&self, delay: Duration) -> bool {
        let mut state = self.state.lock();
        if state.action.is_none() {
            return false;
        }
        if let Some(previous) = state.cancel.take() {
            previous.cancel();
        }
        state.cancel = Some(self.spawn(delay));
        true
    }

    /// Drop the pending action without running it.
    pub fn cancel(&self) {
        let mut state = self.state.lock();
        if let Some(token) = state.cancel.take() {
            token.cancel();
        }
        state.action = None;
    }

    pub fn is_pending(&self) -> bool {
        self.state.lock().action.is_some()
    }

    fn spawn(&self, delay: Duration) -> CancellationToken {
        let token = CancellationToken::new();
        let child = token.clone();
        let state = Arc::clone(&self.state);

        tokio::spawn(async move {
            tokio::select! {
                _ = child.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let action = {
                        let mut state = state.lock();
                        // A reset that raced the sleep installs a new token; only the
                        // current token may fire.
                        if child.is_cancelled() {
                            None
                        } else {
                            state.cancel = None;
                            state.action.take()
                        }
                    };
                    if let Some(action) = action {
                        action();
                    }
                }
            }
        });

        token
    }
}

impl std::fmt::Debug for CancellableTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellableTimer")
            .field("pending", &self.is_pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn counter() -> (Arc<AtomicU32>, impl FnOnce() + Send + 'static) {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        (count, move || {
            c.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test]
    async fn test_fires_once() {
        let timer = CancellableTimer::new();
        let (count, action) = counter();
        timer.start(Duration::from_millis(10), action);
        assert!(timer.is_pending());

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!timer.is_pending());
        assert!(!timer.reset(Duration::from_millis(10)));
    }

    #[tokio::test]
    async fn test_cancel_prevents_firing() {
        let timer = CancellableTimer::new();
        let (count, action) = counter();
        timer.start(Duration::from_millis(20), action);
        timer.cancel();

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(!timer.is_pending());
    }

    #[tokio::test]
    async fn test_reset_postpones() {
        let timer = CancellableTimer::new();
        let (count, action) = counter();
        timer.start(Duration::from_millis(30), action);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(timer.reset(Duration::from_millis(200)));

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(timer.is_pending());

        timer.cancel();
    }

    #[tokio::test]
    async fn test_start_replaces_pending_action() {
        let timer = CancellableTimer::new();
        let (first, first_action) = counter();
        let (second, second_action) = counter();
        timer.start(Duration::from_millis(20), first_action);
        timer.start(Duration::from_millis(20), second_action);

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }
}
