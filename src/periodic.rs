//! Periodic event slots fired from the tick interrupt
//!
//! Callbacks run to completion inside the interrupt. They receive an
//! [`EventContext`] that only offers non-blocking operations, so an
//! event can signal a semaphore or post to the mailbox/FIFO but can
//! never wait or sleep.
//!
//! Author: Moroya Sakamoto

use crate::config::{FIFO_SIZE, MAX_PERIODIC};
use crate::error::KernelError;
use crate::fifo::{Fifo, FifoFull};
use crate::mailbox::Mailbox;
use crate::semaphore::{SemaphoreId, SemaphoreTable};
use crate::tcb::ThreadPool;

/// Periodic event callback
pub type EventFn = fn(&mut EventContext<'_>);

/// Kernel services available to a periodic event
pub struct EventContext<'a> {
    pub(crate) threads: &'a mut ThreadPool,
    pub(crate) sems: &'a mut SemaphoreTable,
    pub(crate) mailbox: &'a mut Mailbox,
    pub(crate) fifo: &'a mut Fifo<FIFO_SIZE>,
    pub(crate) now: u64,
}

impl EventContext<'_> {
    /// Signal a semaphore, waking one blocked thread if needed
    pub fn signal(&mut self, id: SemaphoreId) {
        self.sems.signal(self.threads, id);
    }

    /// Post to the mailbox (overwrite-with-loss)
    pub fn mailbox_send(&mut self, data: u32) {
        self.mailbox.send(self.sems, self.threads, data);
    }

    /// Queue a word on the FIFO, dropping it if full
    pub fn fifo_put(&mut self, data: u32) -> Result<(), FifoFull> {
        self.fifo.put(self.sems, self.threads, data)
    }

    /// Ticks since launch
    pub fn now(&self) -> u64 {
        self.now
    }
}

/// One periodic slot
#[derive(Clone, Copy)]
pub struct PeriodicEvent {
    /// Callback (None = free slot)
    pub callback: Option<EventFn>,
    /// Reload value, in ticks
    pub period: u32,
    /// Ticks until the next firing
    pub countdown: u32,
}

impl PeriodicEvent {
    pub const fn empty() -> Self {
        Self {
            callback: None,
            period: 0,
            countdown: 0,
        }
    }

    /// Count one tick; the callback when the countdown expires
    fn advance(&mut self) -> Option<EventFn> {
        let callback = self.callback?;
        self.countdown -= 1;
        if self.countdown == 0 {
            self.countdown = self.period;
            Some(callback)
        } else {
            None
        }
    }
}

/// Fixed table of periodic events
pub struct PeriodicTable {
    slots: [PeriodicEvent; MAX_PERIODIC],
    count: usize,
}

impl PeriodicTable {
    pub const fn new() -> Self {
        Self {
            slots: [PeriodicEvent::empty(); MAX_PERIODIC],
            count: 0,
        }
    }

    /// Register a callback fired every `period` ticks
    pub fn add(&mut self, callback: EventFn, period: u32) -> Result<usize, KernelError> {
        if period == 0 {
            return Err(KernelError::ZeroPeriod);
        }
        if self.count >= MAX_PERIODIC {
            return Err(KernelError::PeriodicSlotsExhausted { capacity: MAX_PERIODIC });
        }
        let idx = self.count;
        self.slots[idx] = PeriodicEvent {
            callback: Some(callback),
            period,
            countdown: period,
        };
        self.count += 1;
        log::debug!("periodic event {idx} every {period} ticks");
        Ok(idx)
    }

    /// Registered events
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn get(&self, idx: usize) -> Option<&PeriodicEvent> {
        self.slots[..self.count].get(idx)
    }

    /// One tick: count every slot down, firing the expired ones in
    /// registration order
    pub fn run(&mut self, ctx: &mut EventContext<'_>) {
        for slot in self.slots[..self.count].iter_mut() {
            if let Some(callback) = slot.advance() {
                callback(ctx);
            }
        }
    }
}

impl Default for PeriodicTable {
    fn default() -> Self {
        Self::new()
    }
}
