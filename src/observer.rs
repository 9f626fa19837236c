//! Re-execution observer (C10, spec.md §4.5).
//!
//! A naive live-query mode: re-runs the whole plan after any write that
//! touched a table the plan reads from. Coarse — it does not ask whether
//! the write actually changed the result, only whether it *could have*.
//! Multiple mutations inside one notification window collapse into a
//! single re-execution, since the observer only samples "has anything
//! changed" at notification time, not per-write.

use crate::executor::{self, ExecContext, Tuple};
use crate::plan::Plan;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub type ObserverCallback = Box<dyn FnMut(&[Tuple]) + Send>;

struct Subscriber {
    id: u64,
    callback: ObserverCallback,
}

/// A live handle over one logical plan. Holds the last computed result
/// and the set of tables whose writes should trigger a re-execution.
pub struct ObserverHandle {
    plan: Arc<Plan>,
    watched_tables: HashSet<String>,
    last_result: Vec<Tuple>,
    subscribers: Vec<Subscriber>,
    next_subscriber_id: AtomicU64,
    disposed: bool,
}

impl ObserverHandle {
    pub fn new(plan: Arc<Plan>, ctx: &ExecContext) -> Result<Self, crate::error::EngineError> {
        let watched_tables = plan.referenced_tables().into_iter().collect();
        let last_result = executor::run(&plan, ctx)?;
        Ok(ObserverHandle {
            plan,
            watched_tables,
            last_result,
            subscribers: Vec::new(),
            next_subscriber_id: AtomicU64::new(1),
            disposed: false,
        })
    }

    pub fn plan(&self) -> &Arc<Plan> {
        &self.plan
    }

    /// Synchronous snapshot of the last computed result.
    pub fn current_result(&self) -> &[Tuple] {
        &self.last_result
    }

    /// Register a callback; returns a subscription id usable with
    /// [`ObserverHandle::unsubscribe`].
    pub fn subscribe(&mut self, callback: ObserverCallback) -> u64 {
        let id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.push(Subscriber { id, callback });
        id
    }

    /// Idempotent: unsubscribing an id that is not present (or twice) is
    /// a no-op, matching spec.md §5's cancellation contract.
    pub fn unsubscribe(&mut self, id: u64) {
        self.subscribers.retain(|s| s.id != id);
    }

    pub fn is_watching(&self, table: &str) -> bool {
        self.watched_tables.contains(table)
    }

    /// Called once per notification window after a batch of writes that
    /// touched at least one watched table. Re-runs the plan and delivers
    /// the full result set to every subscriber. A subscriber's callback
    /// is caught so one throwing subscriber does not block delivery to
    /// the rest (spec.md §7).
    pub fn notify(&mut self, ctx: &ExecContext) -> Result<(), crate::error::EngineError> {
        self.last_result = executor::run(&self.plan, ctx)?;
        for sub in &mut self.subscribers {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                (sub.callback)(&self.last_result)
            }));
            if result.is_err() {
                tracing::warn!(subscriber_id = sub.id, "observer subscriber callback panicked");
            }
        }
        Ok(())
    }

    pub fn dispose(&mut self) {
        self.disposed = true;
        self.subscribers.clear();
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }
}
