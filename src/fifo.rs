//! Bounded FIFO between one producer and one consumer thread
//!
//! The producer (periodic event or ISR) never blocks: when the ring is
//! full the word is dropped and counted. The consumer blocks on the FIFO
//! semaphore, whose count tracks the number of queued words.
//!
//! Author: Moroya Sakamoto

use thiserror::Error;

use crate::error::{fatal, Fault};
use crate::mailbox::Recv;
use crate::semaphore::{SemaphoreId, SemaphoreTable, WaitOutcome, WaitPolicy};
use crate::tcb::ThreadPool;

/// Word dropped because the ring was full
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("fifo full, data lost")]
pub struct FifoFull;

/// Ring buffer of `N - 1` words plus a lost-data counter
///
/// Fixed-size, no-alloc. Always accessed inside the kernel's critical
/// section, so plain indices suffice.
pub struct Fifo<const N: usize> {
    /// Ring buffer storage
    buffer: [u32; N],
    /// Next slot to write
    put_idx: usize,
    /// Next slot to read
    get_idx: usize,
    /// Words dropped while full
    lost: u32,
}

impl<const N: usize> Fifo<N> {
    const SEM: SemaphoreId = SemaphoreId::FIFO;

    /// Create a new empty ring buffer
    pub const fn new() -> Self {
        Self {
            buffer: [0u32; N],
            put_idx: 0,
            get_idx: 0,
            lost: 0,
        }
    }

    /// Empty the ring, clear the loss counter and the semaphore
    pub fn init(&mut self, sems: &mut SemaphoreTable) {
        self.put_idx = 0;
        self.get_idx = 0;
        self.lost = 0;
        sems.reset(Self::SEM, 0, WaitPolicy::Blocking);
    }

    /// Enqueue a word and signal the consumer; never blocks
    pub fn put(
        &mut self,
        sems: &mut SemaphoreTable,
        threads: &mut ThreadPool,
        value: u32,
    ) -> Result<(), FifoFull> {
        if !self.push(value) {
            self.lost = self.lost.wrapping_add(1);
            log::warn!("fifo full, {} words lost", self.lost);
            return Err(FifoFull);
        }
        sems.signal(threads, Self::SEM);
        Ok(())
    }

    /// Dequeue a word, or block the running thread until one arrives
    pub fn get(&mut self, sems: &mut SemaphoreTable, threads: &mut ThreadPool) -> Recv {
        match sems.wait(threads, Self::SEM) {
            WaitOutcome::Acquired => Recv::Ready(self.take()),
            WaitOutcome::Blocked | WaitOutcome::Busy => Recv::Pending,
        }
    }

    /// Pop the word owed to a consumer that was granted the semaphore
    pub fn take(&mut self) -> u32 {
        match self.pop() {
            Some(v) => v,
            None => fatal(Fault::FifoUnderflow),
        }
    }

    fn push(&mut self, value: u32) -> bool {
        let next_put = (self.put_idx + 1) % N;
        if next_put == self.get_idx {
            return false; // Full
        }
        self.buffer[self.put_idx] = value;
        self.put_idx = next_put;
        true
    }

    fn pop(&mut self) -> Option<u32> {
        if self.get_idx == self.put_idx {
            return None; // Empty
        }
        let value = self.buffer[self.get_idx];
        self.get_idx = (self.get_idx + 1) % N;
        Some(value)
    }

    /// Number of queued words
    pub fn len(&self) -> usize {
        if self.put_idx >= self.get_idx {
            self.put_idx - self.get_idx
        } else {
            N - self.get_idx + self.put_idx
        }
    }

    pub fn is_empty(&self) -> bool {
        self.put_idx == self.get_idx
    }

    /// Is the ring full?
    pub fn is_full(&self) -> bool {
        (self.put_idx + 1) % N == self.get_idx
    }

    /// Usable capacity
    pub fn capacity(&self) -> usize {
        N - 1 // One slot reserved for full/empty distinction
    }

    /// Words dropped while full
    pub fn lost(&self) -> u32 {
        self.lost
    }
}

impl<const N: usize> Default for Fifo<N> {
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

    fn setup<const N: usize>() -> (Fifo<N>, SemaphoreTable, ThreadPool) {
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
        let mut fifo = Fifo::new();
        fifo.init(&mut sems);
        (fifo, sems, threads)
    }

    #[test]
    fn test_fifo_order() {
        let (mut fifo, mut sems, mut threads) = setup::<8>();
        for i in 0..5 {
            fifo.put(&mut sems, &mut threads, i).unwrap();
        }
        assert_eq!(fifo.len(), 5);
        assert_eq!(sems.value(SemaphoreId::FIFO), Some(5));
        for i in 0..5 {
            assert_eq!(fifo.get(&mut sems, &mut threads), Recv::Ready(i));
        }
        assert!(fifo.is_empty());
    }

    #[test]
    fn test_full_drops_and_counts() {
        let (mut fifo, mut sems, mut threads) = setup::<4>();
        assert_eq!(fifo.capacity(), 3);
        for i in 0..3 {
            fifo.put(&mut sems, &mut threads, i).unwrap();
        }
        assert!(fifo.is_full());
        assert_eq!(fifo.put(&mut sems, &mut threads, 99), Err(FifoFull));
        assert_eq!(fifo.lost(), 1);
        // Semaphore count still matches queued words
        assert_eq!(sems.value(SemaphoreId::FIFO), Some(3));
    }

    #[test]
    fn test_wraparound() {
        let (mut fifo, mut sems, mut threads) = setup::<4>();
        for round in 0..3 {
            for i in 0..3 {
                fifo.put(&mut sems, &mut threads, round * 10 + i).unwrap();
            }
            for i in 0..3 {
                assert_eq!(fifo.get(&mut sems, &mut threads), Recv::Ready(round * 10 + i));
            }
        }
    }

    #[test]
    fn test_get_blocks_until_put() {
        let (mut fifo, mut sems, mut threads) = setup::<8>();
        assert_eq!(fifo.get(&mut sems, &mut threads), Recv::Pending);
        assert_eq!(threads.get(0).unwrap().blocked_on, Some(SemaphoreId::FIFO));

        threads.set_current(1);
        fifo.put(&mut sems, &mut threads, 77).unwrap();
        assert!(threads.get(0).unwrap().is_eligible());
        assert_eq!(fifo.take(), 77);
    }

    #[test]
    #[should_panic(expected = "fifo semaphore")]
    fn test_take_empty_is_fatal() {
        let mut fifo = Fifo::<4>::new();
        fifo.take();
    }
}
