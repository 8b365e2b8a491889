//! Interpreter Session Manager.
//!
//! Owns the one interpreter instance of the process. The first `acquire()`
//! boots it; callers arriving while the boot is in flight await the same
//! attempt instead of starting their own.

use futures_util::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::errors::StudioError;
use crate::interpreter::{Interpreter, InterpreterLauncher};

type LaunchResult = Result<Arc<dyn Interpreter>, StudioError>;
type LaunchFuture = Shared<BoxFuture<'static, LaunchResult>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Unloaded,
    Loading,
    Ready,
    Failed,
}

enum Slot {
    Unloaded,
    Loading { attempt: u64, future: LaunchFuture },
    Ready(Arc<dyn Interpreter>),
    Failed(StudioError),
}

pub struct InterpreterSession {
    launcher: Arc<dyn InterpreterLauncher>,
    slot: Mutex<Slot>,
    launches: AtomicU64,
}

impl InterpreterSession {
    pub fn new(launcher: Arc<dyn InterpreterLauncher>) -> Self {
        Self {
            launcher,
            slot: Mutex::new(Slot::Unloaded),
            launches: AtomicU64::new(0),
        }
    }

    fn lock_slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns the ready interpreter, booting it if needed.
    ///
    /// Every waiter of one boot attempt gets that attempt's result. After a
    /// failed attempt the next call starts a new one, and a handle that is no
    /// longer alive is replaced.
    pub async fn acquire(&self) -> Result<Arc<dyn Interpreter>, StudioError> {
        let (attempt, future) = {
            let mut slot = self.lock_slot();
            let pending = match &*slot {
                Slot::Ready(handle) if handle.is_alive() => return Ok(handle.clone()),
                Slot::Ready(_) => {
                    log::warn!("Interpreter is no longer running; launching a replacement");
                    None
                }
                Slot::Loading { attempt, future } => Some((*attempt, future.clone())),
                Slot::Failed(_) | Slot::Unloaded => None,
            };
            match pending {
                Some(pending) => pending,
                None => self.start_launch(&mut slot),
            }
        };

        let result = future.await;

        let mut slot = self.lock_slot();
        if let Slot::Loading { attempt: current, .. } = &*slot {
            if *current == attempt {
                *slot = match &result {
                    Ok(handle) => Slot::Ready(handle.clone()),
                    Err(e) => {
                        log::error!("Interpreter failed to start: {}", e);
                        Slot::Failed(e.clone())
                    }
                };
            }
        }
        result
    }

    fn start_launch(&self, slot: &mut Slot) -> (u64, LaunchFuture) {
        let attempt = self.launches.fetch_add(1, Ordering::SeqCst) + 1;
        log::info!("Launching interpreter (attempt {})", attempt);
        let launcher = self.launcher.clone();
        let future = async move { launcher.launch().await }.boxed().shared();
        *slot = Slot::Loading {
            attempt,
            future: future.clone(),
        };
        (attempt, future)
    }

    /// Non-blocking readiness poll.
    pub fn is_ready(&self) -> bool {
        matches!(&*self.lock_slot(), Slot::Ready(handle) if handle.is_alive())
    }

    pub fn state(&self) -> SessionState {
        match &*self.lock_slot() {
            Slot::Unloaded => SessionState::Unloaded,
            Slot::Loading { .. } => SessionState::Loading,
            Slot::Ready(_) => SessionState::Ready,
            Slot::Failed(_) => SessionState::Failed,
        }
    }

    /// Error of the most recent attempt while the session is `Failed`.
    pub fn last_error(&self) -> Option<StudioError> {
        match &*self.lock_slot() {
            Slot::Failed(e) => Some(e.clone()),
            _ => None,
        }
    }

    /// Version of the ready interpreter, if any.
    pub fn version(&self) -> Option<String> {
        match &*self.lock_slot() {
            Slot::Ready(handle) => Some(handle.version().to_string()),
            _ => None,
        }
    }

    /// Number of boot attempts started so far.
    pub fn launch_count(&self) -> u64 {
        self.launches.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{CountingLauncher, FakeInterpreter};
    use std::time::Duration;

    #[tokio::test]
    async fn test_not_ready_before_first_acquire() {
        let launcher = Arc::new(CountingLauncher::new());
        let session = InterpreterSession::new(launcher.clone());
        assert!(!session.is_ready());
        assert_eq!(session.state(), SessionState::Unloaded);
        assert_eq!(launcher.launches(), 0);

        session.acquire().await.unwrap();
        assert!(session.is_ready());
        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(session.version().as_deref(), Some("3.12.0"));
    }

    #[tokio::test]
    async fn test_concurrent_acquire_shares_one_launch() {
        let launcher = Arc::new(CountingLauncher::new().with_delay(Duration::from_millis(50)));
        let session = InterpreterSession::new(launcher.clone());

        let (a, b, c) = tokio::join!(session.acquire(), session.acquire(), session.acquire());
        let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());

        assert_eq!(launcher.launches(), 1);
        assert_eq!(session.launch_count(), 1);
        assert!(Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&b, &c));
    }

    #[tokio::test]
    async fn test_failed_attempt_rejects_every_waiter_then_retries() {
        let launcher = Arc::new(
            CountingLauncher::new()
                .with_delay(Duration::from_millis(20))
                .failing_first(1),
        );
        let session = InterpreterSession::new(launcher.clone());

        let (a, b) = tokio::join!(session.acquire(), session.acquire());
        assert!(matches!(a, Err(StudioError::InterpreterUnavailable(_))));
        assert_eq!(a.err(), b.err());
        assert_eq!(session.state(), SessionState::Failed);
        assert!(session.last_error().is_some());
        assert_eq!(launcher.launches(), 1);

        session.acquire().await.unwrap();
        assert_eq!(launcher.launches(), 2);
        assert!(session.is_ready());
        assert!(session.last_error().is_none());
    }

    #[tokio::test]
    async fn test_dead_handle_is_replaced() {
        let launcher = Arc::new(CountingLauncher::new());
        let session = InterpreterSession::new(launcher.clone());

        let first = session.acquire().await.unwrap();
        let fake = launcher.last().unwrap();
        fake.kill();
        assert!(!session.is_ready());

        let second = session.acquire().await.unwrap();
        assert_eq!(launcher.launches(), 2);
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(second.is_alive());
    }

    #[tokio::test]
    async fn test_ready_handle_is_reused() {
        let fake = Arc::new(FakeInterpreter::new());
        let launcher = Arc::new(CountingLauncher::with_interpreter(fake));
        let session = InterpreterSession::new(launcher.clone());

        for _ in 0..3 {
            session.acquire().await.unwrap();
        }
        assert_eq!(launcher.launches(), 1);
    }
}
