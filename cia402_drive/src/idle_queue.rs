//! FIFO of work waiting for the axis to become IDLE.
//!
//! The queue is owned by the axis executor; the fault-reset watchdog posts
//! back into the executor instead of touching the queue, so no lock is
//! needed.

use crate::command::MotionRequest;
use std::collections::VecDeque;
use std::fmt;

/// Completion continuation supplied by a caller.
pub type IdleCallback = Box<dyn FnOnce() + Send + 'static>;

pub enum IdleEntry {
    /// Run inline when drained.
    Callback(IdleCallback),
    /// A home/move issued while busy; restarted when drained.
    Deferred(MotionRequest),
}

impl fmt::Debug for IdleEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Callback(_) => f.write_str("Callback"),
            Self::Deferred(request) => write!(f, "Deferred({request})"),
        }
    }
}

/// What a drain produced.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Drained {
    pub callbacks_run: usize,
    /// Requests the executor must start.
    pub start: Vec<MotionRequest>,
}

#[derive(Debug, Default)]
pub struct IdleQueue {
    entries: VecDeque<IdleEntry>,
}

impl IdleQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_callback(&mut self, callback: IdleCallback) {
        self.entries.push_back(IdleEntry::Callback(callback));
    }

    pub fn push_deferred(&mut self, request: MotionRequest) {
        self.entries.push_back(IdleEntry::Deferred(request));
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every pending entry without running it. Returns how many were dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.entries.len();
        self.entries.clear();
        dropped
    }

    /// Pop one entry. A callback runs here; when it is directly followed by a
    /// deferred request, that request is popped too so it does not stall
    /// behind a callback that has already run.
    pub fn drain_one(&mut self) -> Drained {
        let mut drained = Drained::default();
        match self.entries.pop_front() {
            Some(IdleEntry::Callback(callback)) => {
                callback();
                drained.callbacks_run = 1;
                if let Some(IdleEntry::Deferred(_)) = self.entries.front() {
                    if let Some(IdleEntry::Deferred(request)) = self.entries.pop_front() {
                        drained.start.push(request);
                    }
                }
            }
            Some(IdleEntry::Deferred(request)) => drained.start.push(request),
            None => {}
        }
        drained
    }
}
