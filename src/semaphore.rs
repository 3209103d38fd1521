//! Counting semaphores built directly on the TCB pool
//!
//! There is no wait queue: a blocked thread names its semaphore in
//! `blocked_on`, and `signal` walks the TCB cycle to find one. Wake cost
//! is O(threads), storage per semaphore is one counter.
//!
//! Two wait policies share the same interface:
//! - [`WaitPolicy::Blocking`] marks the caller blocked and yields the core
//! - [`WaitPolicy::Spin`] never blocks; the caller releases the critical
//!   section and retries while the count is non-positive
//!
//! Author: Moroya Sakamoto

use crate::config::MAX_SEMAPHORES;
use crate::error::{fatal, Fault, KernelError};
use crate::tcb::ThreadPool;

/// Handle naming a slot in the semaphore table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SemaphoreId(u8);

impl SemaphoreId {
    /// Owned by the mailbox
    pub const MAILBOX: SemaphoreId = SemaphoreId(0);
    /// Owned by the FIFO
    pub const FIFO: SemaphoreId = SemaphoreId(1);
    /// First id available to applications
    pub const FIRST_USER: SemaphoreId = SemaphoreId(2);

    pub const fn new(raw: u8) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u8 {
        self.0
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Mailbox or FIFO slot
    pub const fn is_reserved(self) -> bool {
        self.0 < Self::FIRST_USER.0
    }
}

/// How `wait` behaves when no unit is available
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitPolicy {
    /// Block the caller and hand the core to the scheduler
    #[default]
    Blocking,
    /// Busy-wait: keep the core, retry with interrupts briefly unmasked
    Spin,
}

/// Result of one `wait` attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Unit taken, caller continues
    Acquired,
    /// Caller is now blocked and must suspend; it owns the unit once resumed
    Blocked,
    /// Spin policy, nothing available: release the critical section and retry
    Busy,
}

#[derive(Debug, Clone, Copy)]
struct Semaphore {
    value: i32,
    policy: WaitPolicy,
}

impl Semaphore {
    const fn new() -> Self {
        Self {
            value: 0,
            policy: WaitPolicy::Blocking,
        }
    }
}

/// Fixed semaphore table
pub struct SemaphoreTable {
    slots: [Semaphore; MAX_SEMAPHORES],
}

impl SemaphoreTable {
    /// All semaphores at 0, blocking
    pub const fn new() -> Self {
        Self {
            slots: [Semaphore::new(); MAX_SEMAPHORES],
        }
    }

    /// Set the count and policy. Never concurrent with wait/signal on `id`.
    pub fn init(
        &mut self,
        id: SemaphoreId,
        value: i32,
        policy: WaitPolicy,
    ) -> Result<(), KernelError> {
        if id.index() >= MAX_SEMAPHORES {
            return Err(KernelError::InvalidSemaphore(id.raw()));
        }
        self.reset(id, value, policy);
        Ok(())
    }

    pub(crate) fn reset(&mut self, id: SemaphoreId, value: i32, policy: WaitPolicy) {
        let slot = self.slot_mut(id);
        slot.value = value;
        slot.policy = policy;
    }

    /// Current count, if `id` is in range
    pub fn value(&self, id: SemaphoreId) -> Option<i32> {
        self.slots.get(id.index()).map(|s| s.value)
    }

    /// Policy of `id`, if in range
    pub fn policy(&self, id: SemaphoreId) -> Option<WaitPolicy> {
        self.slots.get(id.index()).map(|s| s.policy)
    }

    fn slot_mut(&mut self, id: SemaphoreId) -> &mut Semaphore {
        match self.slots.get_mut(id.index()) {
            Some(slot) => slot,
            None => fatal(Fault::UnknownSemaphore(id.raw())),
        }
    }

    /// Take one unit on behalf of the running thread
    pub fn wait(&mut self, threads: &mut ThreadPool, id: SemaphoreId) -> WaitOutcome {
        let sem = self.slot_mut(id);
        match sem.policy {
            WaitPolicy::Blocking => {
                sem.value -= 1;
                if sem.value < 0 {
                    let run = threads.current();
                    threads.tcb_mut(run).blocked_on = Some(id);
                    log::trace!("thread {run} blocked on semaphore {}", id.raw());
                    WaitOutcome::Blocked
                } else {
                    WaitOutcome::Acquired
                }
            }
            WaitPolicy::Spin => {
                if sem.value > 0 {
                    sem.value -= 1;
                    WaitOutcome::Acquired
                } else {
                    WaitOutcome::Busy
                }
            }
        }
    }

    /// Release one unit, waking the closest blocked successor of the
    /// running thread if the count shows a waiter
    pub fn signal(&mut self, threads: &mut ThreadPool, id: SemaphoreId) {
        let sem = self.slot_mut(id);
        sem.value += 1;
        if sem.policy == WaitPolicy::Spin || sem.value > 0 {
            return;
        }

        let waiter = threads.scan_from(threads.current(), |t| t.blocked_on == Some(id));
        match waiter {
            Some(i) => {
                threads.tcb_mut(i).blocked_on = None;
                log::trace!("semaphore {} woke thread {i}", id.raw());
            }
            None => fatal(Fault::MissingWaiter { semaphore: id.raw() }),
        }
    }
}

impl Default for SemaphoreTable {
    fn default() -> Self {
        Self::new()
    }
}
