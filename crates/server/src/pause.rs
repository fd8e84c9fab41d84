//! Pause/debugger coordination.
//!
//! Pausing takes effect at the next instrumented call boundary: an in-flight
//! operation is never aborted, but the next user-visible dispatch waits on
//! [`PauseController::admit`] until resume. `resume(step_only = true)`
//! admits exactly one call before re-entering the paused state. Queued calls
//! wait rather than fail.

use parking_lot::Mutex;
use tokio::sync::Notify;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PauseState {
    Running,
    Paused,
    /// One call may proceed, then back to Paused.
    SteppingOnce,
}

/// Running ⇄ Paused gate shared by one session.
pub struct PauseController {
    state: Mutex<PauseState>,
    notify: Notify,
}

impl Default for PauseController {
    fn default() -> Self {
        Self::new()
    }
}

impl PauseController {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PauseState::Running),
            notify: Notify::new(),
        }
    }

    /// Requests a pause; takes effect at the next call boundary.
    pub fn pause(&self) {
        let mut state = self.state.lock();
        if *state == PauseState::Running {
            *state = PauseState::Paused;
            tracing::debug!("pause requested");
        }
    }

    /// Resumes dispatch. With `step_only`, exactly one more call is admitted
    /// before the controller re-enters Paused.
    pub fn resume(&self, step_only: bool) {
        {
            let mut state = self.state.lock();
            *state = if step_only {
                PauseState::SteppingOnce
            } else {
                PauseState::Running
            };
        }
        self.notify.notify_waiters();
    }

    pub fn is_paused(&self) -> bool {
        *self.state.lock() != PauseState::Running
    }

    /// Waits until the controller admits one call.
    ///
    /// Registers for notification before checking state so a concurrent
    /// resume is never missed.
    pub async fn admit(&self) {
        loop {
            let notified = self.notify.notified();
            {
                let mut state = self.state.lock();
                match *state {
                    PauseState::Running => return,
                    PauseState::SteppingOnce => {
                        *state = PauseState::Paused;
                        return;
                    }
                    PauseState::Paused => {}
                }
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn running_admits_immediately() {
        let pause = PauseController::new();
        pause.admit().await;
        assert!(!pause.is_paused());
    }

    #[tokio::test(start_paused = true)]
    async fn paused_calls_queue_until_resume() {
        let pause = Arc::new(PauseController::new());
        pause.pause();

        let admitted = Arc::new(AtomicU32::new(0));
        let mut tasks = Vec::new();
        for _ in 0..3 {
            let pause = Arc::clone(&pause);
            let admitted = Arc::clone(&admitted);
            tasks.push(tokio::spawn(async move {
                pause.admit().await;
                admitted.fetch_add(1, Ordering::SeqCst);
            }));
        }

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(admitted.load(Ordering::SeqCst), 0);

        pause.resume(false);
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(admitted.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn step_admits_exactly_one() {
        let pause = Arc::new(PauseController::new());
        pause.pause();

        let admitted = Arc::new(AtomicU32::new(0));
        let mut tasks = Vec::new();
        for _ in 0..2 {
            let pause = Arc::clone(&pause);
            let admitted = Arc::clone(&admitted);
            tasks.push(tokio::spawn(async move {
                pause.admit().await;
                admitted.fetch_add(1, Ordering::SeqCst);
            }));
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        pause.resume(true);
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert_eq!(admitted.load(Ordering::SeqCst), 1);
        assert!(pause.is_paused());

        pause.resume(false);
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(admitted.load(Ordering::SeqCst), 2);
    }
}
