//! Single-slot mailbox on a binary semaphore
//!
//! One producer (periodic event or ISR), one consumer thread. Send never
//! blocks: a message that was never read is overwritten and counted as
//! lost. `full` is set from a send until the consumer takes the message,
//! so a second send before that is always counted, even when the first
//! one woke a blocked consumer that has not run yet.
//!
//! Author: Moroya Sakamoto

use crate::semaphore::{SemaphoreId, SemaphoreTable, WaitOutcome, WaitPolicy};
use crate::tcb::ThreadPool;

/// Outcome of a receive attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recv {
    /// Message taken
    Ready(u32),
    /// Caller is blocked; read the slot once it is dispatched again
    Pending,
}

/// Mailbox slot plus loss counter
pub struct Mailbox {
    data: u32,
    /// Unread message in the slot
    full: bool,
    lost: u32,
}

impl Mailbox {
    const SEM: SemaphoreId = SemaphoreId::MAILBOX;

    /// Empty mailbox
    pub const fn new() -> Self {
        Self {
            data: 0,
            full: false,
            lost: 0,
        }
    }

    /// Clear the slot, the loss counter and the semaphore
    pub fn init(&mut self, sems: &mut SemaphoreTable) {
        self.data = 0;
        self.full = false;
        self.lost = 0;
        sems.reset(Self::SEM, 0, WaitPolicy::Blocking);
    }

    /// Overwrite the slot and signal, or count a loss if the previous
    /// message is still unread
    pub fn send(&mut self, sems: &mut SemaphoreTable, threads: &mut ThreadPool, data: u32) {
        self.data = data;
        if self.full {
            self.lost = self.lost.wrapping_add(1);
            log::warn!("mailbox overwrite, {} lost", self.lost);
        } else {
            self.full = true;
            sems.signal(threads, Self::SEM);
        }
    }

    /// Take the message, or block the running thread until one arrives
    pub fn recv(&mut self, sems: &mut SemaphoreTable, threads: &mut ThreadPool) -> Recv {
        match sems.wait(threads, Self::SEM) {
            WaitOutcome::Acquired => Recv::Ready(self.read()),
            WaitOutcome::Blocked | WaitOutcome::Busy => Recv::Pending,
        }
    }

    /// Take the slot contents; called by a consumer resumed after
    /// `Recv::Pending`
    pub fn read(&mut self) -> u32 {
        self.full = false;
        self.data
    }

    /// Is an unread message waiting?
    pub fn is_full(&self) -> bool {
        self.full
    }

    /// Messages overwritten before being read
    pub fn lost(&self) -> u32 {
        self.lost
    }
}

impl Default for Mailbox {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tcb::{Priority, StackArena, ThreadEntry};

    fn spin() -> ! {
        loop {
            core::hint::spin_loop();
        }
    }

    fn setup() -> (Mailbox, SemaphoreTable, ThreadPool) {
        let mut threads = ThreadPool::new();
        threads
            .add_threads(
                &[
                    ThreadEntry::new(spin, Priority::NORMAL),
                    ThreadEntry::new(spin, Priority::NORMAL),
                ],
                StackArena::leaked(),
            )
            .unwrap();
        let mut sems = SemaphoreTable::new();
        let mut mailbox = Mailbox::new();
        mailbox.init(&mut sems);
        (mailbox, sems, threads)
    }

    #[test]
    fn test_send_then_recv() {
        let (mut mb, mut sems, mut threads) = setup();
        mb.send(&mut sems, &mut threads, 42);
        assert_eq!(mb.recv(&mut sems, &mut threads), Recv::Ready(42));
        assert_eq!(mb.lost(), 0);
        assert_eq!(sems.value(SemaphoreId::MAILBOX), Some(0));
    }

    #[test]
    fn test_overwrite_counts_loss() {
        let (mut mb, mut sems, mut threads) = setup();
        mb.send(&mut sems, &mut threads, 7);
        mb.send(&mut sems, &mut threads, 9);
        assert_eq!(mb.recv(&mut sems, &mut threads), Recv::Ready(9));
        assert_eq!(mb.lost(), 1);
    }

    #[test]
    fn test_n_sends_deliver_latest_once() {
        let (mut mb, mut sems, mut threads) = setup();
        for v in 1..=5 {
            mb.send(&mut sems, &mut threads, v * 10);
            assert!(sems.value(SemaphoreId::MAILBOX).unwrap() <= 1);
        }
        assert_eq!(mb.recv(&mut sems, &mut threads), Recv::Ready(50));
        assert_eq!(mb.lost(), 4);
        // Nothing left: the consumer blocks
        assert_eq!(mb.recv(&mut sems, &mut threads), Recv::Pending);
    }

    #[test]
    fn test_recv_blocks_until_send() {
        let (mut mb, mut sems, mut threads) = setup();
        assert_eq!(mb.recv(&mut sems, &mut threads), Recv::Pending);
        assert_eq!(threads.get(0).unwrap().blocked_on, Some(SemaphoreId::MAILBOX));

        threads.set_current(1);
        mb.send(&mut sems, &mut threads, 5);
        assert!(threads.get(0).unwrap().is_eligible());
        assert_eq!(mb.read(), 5);
        assert_eq!(mb.lost(), 0);
        assert!(!mb.is_full());
    }

    #[test]
    fn test_second_send_before_woken_consumer_runs() {
        let (mut mb, mut sems, mut threads) = setup();
        assert_eq!(mb.recv(&mut sems, &mut threads), Recv::Pending);

        threads.set_current(1);
        mb.send(&mut sems, &mut threads, 7);
        mb.send(&mut sems, &mut threads, 9);
        assert_eq!(mb.lost(), 1);
        assert_eq!(sems.value(SemaphoreId::MAILBOX), Some(0));

        threads.set_current(0);
        assert_eq!(mb.read(), 9);
        // Nothing left to deliver
        assert_eq!(mb.recv(&mut sems, &mut threads), Recv::Pending);
    }

    #[test]
    fn test_init_clears() {
        let (mut mb, mut sems, mut threads) = setup();
        mb.send(&mut sems, &mut threads, 1);
        mb.send(&mut sems, &mut threads, 2);
        mb.init(&mut sems);
        assert!(!mb.is_full());
        assert_eq!(mb.lost(), 0);
        assert_eq!(mb.read(), 0);
        assert_eq!(sems.value(SemaphoreId::MAILBOX), Some(0));
    }
}
