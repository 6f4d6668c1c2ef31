//! Process-wide coordination state
//!
//! `RuntimeContext` owns the three pieces of mutable state the orchestrator
//! coordinates through:
//!
//! - the running table: at most one live `RunHandle` per session
//! - the set of command ids already handled (idempotency keys)
//! - the one-shot flag guarding command-handler registration
//!
//! All locks are held only for short synchronous sections and never
//! across an await.

use sdk::types::{CommandId, SessionId};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::Notify;
use uuid::Uuid;

use crate::streaming::RunHandle;

#[derive(Default)]
struct RunTable {
    /// Live run per session; its presence is the single-flight slot
    running: HashMap<SessionId, RunHandle>,

    /// Runs per session whose terminal event has not been published yet
    unsettled: HashMap<SessionId, usize>,
}

/// Shared coordination state for one runtime
#[derive(Default)]
pub struct RuntimeContext {
    runs: Mutex<RunTable>,
    handled: Mutex<HashSet<CommandId>>,
    registered: AtomicBool,
    settled: Notify,
}

impl RuntimeContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `command_id` as handled
    ///
    /// Returns `false` if it was already recorded, i.e. the command is a
    /// duplicate and must not be processed again.
    pub fn mark_handled(&self, command_id: &CommandId) -> bool {
        lock(&self.handled).insert(command_id.clone())
    }

    pub fn was_handled(&self, command_id: &CommandId) -> bool {
        lock(&self.handled).contains(command_id)
    }

    /// Claim the session's run slot
    ///
    /// Returns the handle of the new run, already registered, or `None` if
    /// a run is active for the session.
    pub fn begin_run(&self, session_id: &SessionId) -> Option<RunHandle> {
        let mut table = lock(&self.runs);
        if table.running.contains_key(session_id) {
            return None;
        }

        let handle = RunHandle::new();
        table.running.insert(session_id.clone(), handle.clone());
        *table.unsettled.entry(session_id.clone()).or_insert(0) += 1;
        Some(handle)
    }

    /// Release the session's run slot if it still belongs to `run_id`
    pub fn finish_run(&self, session_id: &SessionId, run_id: Uuid) -> bool {
        let mut table = lock(&self.runs);
        match table.running.get(session_id) {
            Some(handle) if handle.run_id() == run_id => {
                table.running.remove(session_id);
                true
            }
            _ => false,
        }
    }

    /// Mark a run's terminal event as published and wake `wait_idle` callers
    pub fn settle_run(&self, session_id: &SessionId) {
        {
            let mut table = lock(&self.runs);
            if let Some(count) = table.unsettled.get_mut(session_id) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    table.unsettled.remove(session_id);
                }
            }
        }
        self.settled.notify_waiters();
    }

    /// Signal cancellation of the session's live run
    ///
    /// Returns `false` if no run is active.
    pub fn abort(&self, session_id: &SessionId) -> bool {
        match lock(&self.runs).running.get(session_id) {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self, session_id: &SessionId) -> bool {
        lock(&self.runs).running.contains_key(session_id)
    }

    /// Number of sessions with a live run
    pub fn running_count(&self) -> usize {
        lock(&self.runs).running.len()
    }

    fn is_settled(&self, session_id: &SessionId) -> bool {
        let table = lock(&self.runs);
        !table.running.contains_key(session_id) && !table.unsettled.contains_key(session_id)
    }

    /// Wait until the session has no live run and every finished run's
    /// terminal event has been published
    pub async fn wait_idle(&self, session_id: &SessionId) {
        loop {
            let notified = self.settled.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_settled(session_id) {
                return;
            }
            notified.await;
        }
    }

    /// Claim the right to register the command handler
    ///
    /// Succeeds exactly once per context.
    pub fn claim_registration(&self) -> bool {
        self.registered
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::SeqCst)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
