//! Run-scoped work list of directories plus the set of locations already
//! accepted.

use std::collections::{HashSet, VecDeque};
use std::pin::pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

use crate::models::{DirectoryTask, Location};

#[derive(Debug, Default)]
struct FrontierState {
    queue: VecDeque<DirectoryTask>,
    visited: HashSet<Location>,
    in_flight: usize,
    claimed: usize,
    closed: bool,
}

/// Concurrency-safe frontier shared by crawl workers.
///
/// Drains permanently once the queue is empty and no claimed task is still
/// being processed, or when [`Frontier::close`] is called.
#[derive(Debug)]
pub struct Frontier {
    max_depth: u32,
    state: Mutex<FrontierState>,
    changed: Notify,
}

impl Frontier {
    pub fn new(max_depth: u32) -> Arc<Self> {
        Arc::new(Self {
            max_depth,
            state: Mutex::new(FrontierState::default()),
            changed: Notify::new(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, FrontierState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue the run root at depth 0.
    pub fn seed(&self, root: Location) -> bool {
        self.offer(DirectoryTask::root(root))
    }

    /// Accept a directory unless it is too deep, already seen, or the
    /// frontier is closed. Check-and-insert happens under one lock.
    pub fn offer(&self, task: DirectoryTask) -> bool {
        if task.depth >= self.max_depth {
            return false;
        }
        {
            let mut state = self.lock();
            if state.closed || !state.visited.insert(task.location.clone()) {
                return false;
            }
            state.queue.push_back(task);
        }
        self.changed.notify_waiters();
        true
    }

    /// Wait for the next task. `None` means the frontier is drained.
    ///
    /// The returned guard must be held while the task's children are
    /// offered; dropping it marks the task finished.
    pub async fn claim_next(self: &Arc<Self>) -> Option<ClaimedTask> {
        loop {
            let mut notified = pin!(self.changed.notified());
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if state.closed {
                    return None;
                }
                if let Some(task) = state.queue.pop_front() {
                    state.in_flight += 1;
                    state.claimed += 1;
                    return Some(ClaimedTask {
                        task,
                        frontier: Arc::clone(self),
                    });
                }
                if state.in_flight == 0 {
                    state.closed = true;
                    drop(state);
                    self.changed.notify_waiters();
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Stop handing out work. Pending tasks are discarded and every waiting
    /// claimer wakes with `None`.
    pub fn close(&self) {
        {
            let mut state = self.lock();
            state.closed = true;
            state.queue.clear();
        }
        self.changed.notify_waiters();
    }

    pub fn visited_count(&self) -> usize {
        self.lock().visited.len()
    }

    pub fn claimed_count(&self) -> usize {
        self.lock().claimed
    }

    /// Tasks queued but not yet claimed.
    pub fn pending(&self) -> usize {
        self.lock().queue.len()
    }

    fn finish(&self) {
        {
            let mut state = self.lock();
            state.in_flight = state.in_flight.saturating_sub(1);
        }
        self.changed.notify_waiters();
    }
}

/// A directory a worker is currently processing.
#[derive(Debug)]
pub struct ClaimedTask {
    task: DirectoryTask,
    frontier: Arc<Frontier>,
}

impl ClaimedTask {
    pub fn task(&self) -> &DirectoryTask {
        &self.task
    }
}

impl Drop for ClaimedTask {
    fn drop(&mut self) {
        self.frontier.finish();
    }
}
