use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Once;

use tokio::sync::Notify;

/// Runs an action at most once and lets any number of tasks await it.
///
/// `call` is safe from any thread; `wait` resolves as soon as the action has
/// completed, including when it completed before `wait` was called.
#[derive(Debug)]
pub struct OnceWithWait {
    once: Once,
    done: AtomicBool,
    notify: Notify,
}

impl Default for OnceWithWait {
    fn default() -> Self {
        Self::new()
    }
}

impl OnceWithWait {
    /// Create a new, not yet called, once
    pub fn new() -> Self {
        Self {
            once: Once::new(),
            done: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    /// Run `f` if no call has run yet. Returns true when this call ran it.
    pub fn call<F: FnOnce()>(&self, f: F) -> bool {
        let mut ran = false;
        self.once.call_once(|| {
            f();
            self.done.store(true, Ordering::Release);
            ran = true;
        });
        if ran {
            self.notify.notify_waiters();
        }
        ran
    }

    /// Whether the action has completed
    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    /// Wait until the action has completed.
    pub async fn wait(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        // Register before checking the flag so a concurrent `call` cannot
        // slip between the check and the await.
        notified.as_mut().enable();
        if self.is_done() {
            return;
        }
        notified.await;
    }
}
