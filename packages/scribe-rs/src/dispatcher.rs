//! Bounded admission: a fixed number of engine slots plus a bounded FIFO.
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use serde::Serialize;
use thiserror::Error;

use crate::request::RequestId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Admission {
    /// Holds an engine slot now.
    Dispatched,
    /// Waiting in the queue for a slot.
    Queued,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatcherError {
    #[error("request rejected: {in_flight} in flight and {queued} queued (capacity exhausted)")]
    Rejected { in_flight: usize, queued: usize },
}

#[derive(Debug, Default)]
struct Slots {
    in_flight: usize,
    queue: VecDeque<RequestId>,
}

#[derive(Debug)]
pub struct Dispatcher {
    max_in_flight: usize,
    max_queued: usize,
    slots: Mutex<Slots>,
}

impl Dispatcher {
    pub fn new(max_in_flight: usize, max_queued: usize) -> Self {
        Self {
            max_in_flight: max_in_flight.max(1),
            max_queued,
            slots: Mutex::new(Slots::default()),
        }
    }

    fn slots(&self) -> MutexGuard<'_, Slots> {
        // The counters stay consistent even if a holder panicked.
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn admit(&self, id: RequestId) -> Result<Admission, DispatcherError> {
        let mut slots = self.slots();
        if slots.in_flight < self.max_in_flight && slots.queue.is_empty() {
            slots.in_flight += 1;
            Ok(Admission::Dispatched)
        } else if slots.queue.len() < self.max_queued {
            slots.queue.push_back(id);
            Ok(Admission::Queued)
        } else {
            Err(DispatcherError::Rejected {
                in_flight: slots.in_flight,
                queued: slots.queue.len(),
            })
        }
    }

    /// Gives back one engine slot. The oldest queued request, if any, takes
    /// it over and is returned.
    pub fn release(&self) -> Option<RequestId> {
        let mut slots = self.slots();
        match slots.queue.pop_front() {
            Some(next) => Some(next),
            None => {
                slots.in_flight = slots.in_flight.saturating_sub(1);
                None
            }
        }
    }

    /// Drops a request that is still waiting. Returns whether it was queued.
    pub fn withdraw(&self, id: RequestId) -> bool {
        let mut slots = self.slots();
        match slots.queue.iter().position(|&queued| queued == id) {
            Some(pos) => {
                slots.queue.remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn in_flight(&self) -> usize {
        self.slots().in_flight
    }

    pub fn queued(&self) -> usize {
        self.slots().queue.len()
    }
}
