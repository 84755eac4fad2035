//! Single-resolution termination primitive.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use tokio::sync::watch;

use crate::state::ExitState;

/// Write-once cell holding a run's terminal state.
///
/// Any number of threads can wait, blocking or async; the first
/// [`resolve`](Self::resolve) wins and every waiter observes the same `Arc`.
#[derive(Debug)]
pub(crate) struct TerminationCell {
    slot: Mutex<Option<Arc<ExitState>>>,
    ready: Condvar,
    notify: watch::Sender<bool>,
}

impl TerminationCell {
    pub(crate) fn new() -> Self {
        let (notify, _) = watch::channel(false);
        Self {
            slot: Mutex::new(None),
            ready: Condvar::new(),
            notify,
        }
    }

    /// Stores `state` if the cell is still unresolved. Returns whether this
    /// call performed the resolution.
    pub(crate) fn resolve(&self, state: Arc<ExitState>) -> bool {
        let mut slot = self.lock_slot();
        if slot.is_some() {
            return false;
        }
        *slot = Some(state);
        drop(slot);
        self.ready.notify_all();
        let _ = self.notify.send(true);
        true
    }

    /// The resolved state, if termination already happened.
    pub(crate) fn peek(&self) -> Option<Arc<ExitState>> {
        self.lock_slot().clone()
    }

    /// Blocks until the cell resolves.
    pub(crate) fn wait(&self) -> Arc<ExitState> {
        let mut slot = self.lock_slot();
        loop {
            if let Some(state) = slot.as_ref() {
                return Arc::clone(state);
            }
            slot = match self.ready.wait(slot) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
    }

    fn lock_slot(&self) -> MutexGuard<'_, Option<Arc<ExitState>>> {
        match self.slot.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.notify.subscribe()
    }
}

/// Awaitable handle to a run's termination, resolved exactly once.
///
/// Handles are cheap to clone; every one observes the same cached state.
#[derive(Debug, Clone)]
pub struct TerminationHandle {
    cell: Arc<TerminationCell>,
    rx: watch::Receiver<bool>,
}

impl TerminationHandle {
    pub(crate) fn new(cell: Arc<TerminationCell>) -> Self {
        let rx = cell.subscribe();
        Self { cell, rx }
    }

    /// The resolved state, if termination already happened.
    pub fn peek(&self) -> Option<Arc<ExitState>> {
        self.cell.peek()
    }

    /// Waits for termination without blocking the async runtime.
    pub async fn wait(&mut self) -> Arc<ExitState> {
        loop {
            if let Some(state) = self.cell.peek() {
                return state;
            }
            // The sender lives inside the cell we hold, so the channel
            // cannot close before resolution.
            let _ = self.rx.changed().await;
        }
    }

    /// Blocking wait, for synchronous callers holding a handle.
    pub fn wait_blocking(&self) -> Arc<ExitState> {
        self.cell.wait()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    fn terminal_state() -> Arc<ExitState> {
        Arc::new(ExitState::Succeeded { pid: 1, io: vec![] })
    }

    #[test]
    fn test_first_resolution_wins() {
        let cell = TerminationCell::new();
        let first = terminal_state();
        let second = Arc::new(ExitState::Failed {
            pid: 1,
            exit_code: 9,
            io: vec![],
            dump: String::new(),
        });

        assert!(cell.resolve(Arc::clone(&first)));
        assert!(!cell.resolve(second));
        assert!(cell.peek().unwrap().successful());
    }

    #[test]
    fn test_concurrent_waiters_see_identical_state() {
        let cell = Arc::new(TerminationCell::new());
        let mut handles = Vec::new();
        for _ in 0..4 {
            let cell = Arc::clone(&cell);
            handles.push(thread::spawn(move || cell.wait()));
        }

        thread::sleep(Duration::from_millis(50));
        let state = terminal_state();
        assert!(cell.resolve(Arc::clone(&state)));

        for handle in handles {
            let seen = handle.join().unwrap();
            assert!(Arc::ptr_eq(&seen, &state));
        }
    }

    #[test]
    fn test_late_waiter_gets_cached_state() {
        let cell = TerminationCell::new();
        let state = terminal_state();
        cell.resolve(Arc::clone(&state));
        assert!(Arc::ptr_eq(&cell.wait(), &state));
    }

    #[tokio::test]
    async fn test_async_wait_resolves() {
        let cell = Arc::new(TerminationCell::new());
        let mut handle = TerminationHandle::new(Arc::clone(&cell));
        assert!(handle.peek().is_none());

        let resolver = Arc::clone(&cell);
        let join = tokio::task::spawn_blocking(move || {
            thread::sleep(Duration::from_millis(50));
            resolver.resolve(terminal_state());
        });

        let state = handle.wait().await;
        assert!(state.successful());
        join.await.unwrap();
    }

    #[tokio::test]
    async fn test_async_wait_after_resolution() {
        let cell = Arc::new(TerminationCell::new());
        cell.resolve(terminal_state());
        let mut handle = TerminationHandle::new(cell);
        assert!(handle.wait().await.successful());
        assert!(handle.peek().is_some());
    }
}
