//! Process-wide finalization registry.
//!
//! A [`Cleanable`] owns one cleanup action. The action runs at most once:
//! either when [`Cleanable::clean`] is called, or when the `Cleanable` is
//! dropped. On drop a deferred cleanable hands its action to the cleaner's
//! worker thread; an inline cleanable runs it on the dropping thread.
//!
//! ```text
//! ForeignObjectHolder ──owns──▶ Cleanable ──drop──▶ Cleaner queue ──▶ worker thread
//!         │                         ▲
//!         └──── close() ──clean()───┘   (runs now, slot emptied)
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, error, trace};
use once_cell::sync::{Lazy, OnceCell};
use parking_lot::{Condvar, Mutex};

use crate::constants::CLEANER_THREAD_NAME;

pub type CleanupAction = Box<dyn FnOnce() + Send + 'static>;

struct QueueState {
    actions: VecDeque<CleanupAction>,
    running: usize,
}

struct CleanerShared {
    name: String,
    state: Mutex<QueueState>,
    work_ready: Condvar,
    idle: Condvar,
    shutdown: AtomicBool,
}

impl CleanerShared {
    fn enqueue(&self, action: CleanupAction) {
        // shutdown is only set under the state lock, so a push made while
        // holding it is always seen by the worker before it exits
        let mut state = self.state.lock();
        if self.shutdown.load(Ordering::Acquire) {
            drop(state);
            debug!("[Cleaner:{}] Shut down, running action inline", self.name);
            run_action(&self.name, action);
            return;
        }
        state.actions.push_back(action);
        trace!(
            "[Cleaner:{}] Queued cleanup (pending: {})",
            self.name,
            state.actions.len()
        );
        self.work_ready.notify_one();
    }

    fn worker_loop(self: Arc<Self>) {
        loop {
            let action = {
                let mut state = self.state.lock();
                loop {
                    if let Some(action) = state.actions.pop_front() {
                        state.running += 1;
                        break action;
                    }
                    if self.shutdown.load(Ordering::Acquire) {
                        debug!("[Cleaner:{}] Worker exiting", self.name);
                        return;
                    }
                    self.work_ready.wait(&mut state);
                }
            };

            run_action(&self.name, action);

            let mut state = self.state.lock();
            state.running -= 1;
            if state.actions.is_empty() && state.running == 0 {
                self.idle.notify_all();
            }
        }
    }
}

fn run_action(name: &str, action: CleanupAction) {
    if catch_unwind(AssertUnwindSafe(action)).is_err() {
        error!("[Cleaner:{}] Cleanup action panicked", name);
    }
}

/// Runs deferred cleanup actions on a dedicated worker thread.
pub struct Cleaner {
    shared: Arc<CleanerShared>,
    worker: OnceCell<thread::JoinHandle<()>>,
}

static GLOBAL_CLEANER: Lazy<Cleaner> = Lazy::new(|| Cleaner::new(CLEANER_THREAD_NAME));

impl Cleaner {
    /// The cleaner shared by every holder in the process. Never torn down;
    /// actions still queued at exit may not run.
    pub fn global() -> &'static Cleaner {
        &GLOBAL_CLEANER
    }

    pub fn new(name: &str) -> Self {
        Self {
            shared: Arc::new(CleanerShared {
                name: name.to_string(),
                state: Mutex::new(QueueState {
                    actions: VecDeque::new(),
                    running: 0,
                }),
                work_ready: Condvar::new(),
                idle: Condvar::new(),
                shutdown: AtomicBool::new(false),
            }),
            worker: OnceCell::new(),
        }
    }

    fn ensure_worker(&self) -> bool {
        let spawned = self.worker.get_or_try_init(|| {
            let shared = self.shared.clone();
            thread::Builder::new()
                .name(self.shared.name.clone())
                .spawn(move || shared.worker_loop())
        });
        match spawned {
            Ok(_) => true,
            Err(e) => {
                error!(
                    "[Cleaner:{}] Failed to spawn worker thread: {}",
                    self.shared.name, e
                );
                false
            }
        }
    }

    /// Registers `action` to run on the worker thread once the returned
    /// [`Cleanable`] is dropped, unless it was cleaned first.
    pub fn register<F>(&self, action: F) -> Cleanable
    where
        F: FnOnce() + Send + 'static,
    {
        let queue = if self.ensure_worker() {
            Some(self.shared.clone())
        } else {
            None
        };
        Cleanable {
            slot: Mutex::new(Some(Box::new(action))),
            queue,
        }
    }

    /// Number of queued or running actions.
    pub fn pending(&self) -> usize {
        let state = self.shared.state.lock();
        state.actions.len() + state.running
    }

    /// Blocks until every queued action has run. Returns `false` on timeout.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        while !(state.actions.is_empty() && state.running == 0) {
            if self.shared.idle.wait_until(&mut state, deadline).timed_out() {
                return state.actions.is_empty() && state.running == 0;
            }
        }
        true
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }
}

impl Drop for Cleaner {
    fn drop(&mut self) {
        // the worker drains what is queued, later drops run inline
        let _state = self.shared.state.lock();
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.work_ready.notify_all();
    }
}

impl fmt::Debug for Cleaner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cleaner")
            .field("name", &self.shared.name)
            .field("pending", &self.pending())
            .finish()
    }
}

/// At-most-once slot for one cleanup action.
pub struct Cleanable {
    slot: Mutex<Option<CleanupAction>>,
    queue: Option<Arc<CleanerShared>>,
}

impl Cleanable {
    /// A cleanable whose action runs on the dropping thread.
    pub fn inline<F>(action: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            slot: Mutex::new(Some(Box::new(action))),
            queue: None,
        }
    }

    /// Runs the action now if it has not run yet and cancels the deferred
    /// path. Returns `true` if this call ran it.
    pub fn clean(&self) -> bool {
        // take under the lock, run outside it
        let action = self.slot.lock().take();
        match action {
            Some(action) => {
                let name = self.queue.as_ref().map_or("inline", |q| q.name.as_str());
                run_action(name, action);
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.slot.lock().is_some()
    }

    pub fn is_deferred(&self) -> bool {
        self.queue.is_some()
    }
}

impl Drop for Cleanable {
    fn drop(&mut self) {
        let Some(action) = self.slot.get_mut().take() else {
            return;
        };
        match &self.queue {
            Some(queue) => queue.enqueue(action),
            None => run_action("inline", action),
        }
    }
}

impl fmt::Debug for Cleanable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cleanable")
            .field("pending", &self.is_pending())
            .field("deferred", &self.is_deferred())
            .finish()
    }
}
