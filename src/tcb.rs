//! Thread control blocks: static pool, private stacks, no heap
//!
//! Every slot is primed once by [`ThreadPool::add_threads`] before launch
//! and lives for the lifetime of the kernel. The `next` indices form a
//! single cycle over the configured slots in creation order.
//!
//! Thread stacks live in a [`StackArena`] outside the kernel: the core
//! pushes frames into them while kernel state is borrowed, so the kernel
//! only ever touches them through raw pointers.
//!
//! Author: Moroya Sakamoto

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicBool, Ordering};

use crate::config::{AGING_INTERVAL, MAX_THREADS, STACK_WORDS};
use crate::error::KernelError;
use crate::semaphore::SemaphoreId;

/// Thread entry point, never returns
pub type ThreadFn = fn() -> !;

/// Thread priority (lower number = higher priority)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Priority(pub u8);

impl Priority {
    /// Highest priority
    pub const CRITICAL: Priority = Priority(0);
    /// High priority
    pub const HIGH: Priority = Priority(1);
    /// Normal priority
    pub const NORMAL: Priority = Priority(2);
    /// Low priority
    pub const LOW: Priority = Priority(3);
    /// Background (idle loop)
    pub const IDLE: Priority = Priority(255);

    /// One step more urgent, floored at [`Priority::CRITICAL`]
    pub const fn boosted(self) -> Priority {
        Priority(self.0.saturating_sub(1))
    }
}

/// Index of a TCB slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ThreadId(pub(crate) u8);

impl ThreadId {
    /// Slot index
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Scheduling state, derived from the TCB fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    /// Eligible, waiting for the core
    Ready,
    /// Owns the core
    Running,
    /// Counting down a sleep
    Sleeping,
    /// Waiting on a semaphore
    Blocked,
    /// Slot not configured
    Inactive,
}

/// One `add_threads` entry
#[derive(Clone, Copy)]
pub struct ThreadEntry {
    /// Where the first dispatch starts executing
    pub entry: ThreadFn,
    /// Fixed priority
    pub priority: Priority,
}

impl ThreadEntry {
    pub const fn new(entry: ThreadFn, priority: Priority) -> Self {
        Self { entry, priority }
    }
}

/// Thread control block
#[derive(Clone, Copy)]
pub struct Tcb {
    /// Saved stack pointer, as a word offset into this slot's stack.
    /// Stale while the thread is running.
    pub sp: usize,
    /// Successor in the circular list
    pub next: usize,
    /// Ticks left to sleep (0 = awake)
    pub sleep: u32,
    /// Semaphore this thread is blocked on
    pub blocked_on: Option<SemaphoreId>,
    /// Priority assigned at creation
    pub fixed_priority: Priority,
    /// Effective priority, raised by aging
    pub working_priority: Priority,
    /// Scheduler passes this thread has waited while eligible
    pub age: u32,
    /// Entry point (None = empty slot)
    pub entry: Option<ThreadFn>,
    /// Times this thread was chosen by the scheduler
    pub dispatches: u32,
    /// Ticks that elapsed while this thread owned the core
    pub run_ticks: u32,
}

impl Tcb {
    /// Empty TCB slot
    pub const fn empty() -> Self {
        Self {
            sp: 0,
            next: 0,
            sleep: 0,
            blocked_on: None,
            fixed_priority: Priority::IDLE,
            working_priority: Priority::IDLE,
            age: 0,
            entry: None,
            dispatches: 0,
            run_ticks: 0,
        }
    }

    /// Neither sleeping nor blocked
    pub fn is_eligible(&self) -> bool {
        self.entry.is_some() && self.sleep == 0 && self.blocked_on.is_none()
    }

    /// One aging step for an eligible thread that was passed over
    pub fn age_one(&mut self) {
        self.age = self.age.wrapping_add(1);
        if self.age % AGING_INTERVAL == 0 {
            self.working_priority = self.working_priority.boosted();
        }
    }

    /// Priority restored on dispatch
    pub fn restore_priority(&mut self) {
        self.working_priority = self.fixed_priority;
        self.age = 0;
    }
}

/// Initial register frame, laid out the way the exception return and
/// the software-saved context expect it (R4-R11 at the bottom).
mod frame {
    /// xPSR with only the Thumb bit set
    pub const XPSR_THUMB: u32 = 0x0100_0000;
    /// Recognisable fill for the remaining registers
    pub const FILL: [u32; 13] = [
        0x0000_0000, // R0
        0x0101_0101, // R1
        0x0202_0202, // R2
        0x0303_0303, // R3
        0x0404_0404, // R4
        0x0505_0505, // R5
        0x0606_0606, // R6
        0x0707_0707, // R7
        0x0808_0808, // R8
        0x0909_0909, // R9
        0x1010_1010, // R10
        0x1111_1111, // R11
        0x1212_1212, // R12
    ];
    /// Link register fill
    pub const LR: u32 = 0x1414_1414;
    /// Words in a primed frame
    pub const WORDS: usize = 16;
}

/// One private stack per thread slot
///
/// Place it in a `static` and hand it to `add_threads`; each arena can
/// back a single kernel.
pub struct StackArena {
    words: UnsafeCell<[[u32; STACK_WORDS]; MAX_THREADS]>,
    claimed: AtomicBool,
}

// SAFETY: the words are only reached through raw pointers, by the one
// kernel that claimed the arena or by the thread running on a slot
unsafe impl Sync for StackArena {}

impl StackArena {
    pub const fn new() -> Self {
        Self {
            words: UnsafeCell::new([[0u32; STACK_WORDS]; MAX_THREADS]),
            claimed: AtomicBool::new(false),
        }
    }

    /// Bind the arena to one kernel; false if it already backs another
    fn claim(&self) -> bool {
        !self.claimed.swap(true, Ordering::AcqRel)
    }

    /// Lowest word of slot `i`
    fn base(&self, i: usize) -> *mut u32 {
        debug_assert!(i < MAX_THREADS);
        // SAFETY: `i` is a configured slot, so the offset stays inside the array
        unsafe { (self.words.get() as *mut u32).add(i * STACK_WORDS) }
    }

    #[cfg(test)]
    pub(crate) fn leaked() -> &'static Self {
        std::boxed::Box::leak(std::boxed::Box::new(Self::new()))
    }
}

impl Default for StackArena {
    fn default() -> Self {
        Self::new()
    }
}

/// Static TCB table plus the stack arena backing it
pub struct ThreadPool {
    tcbs: [Tcb; MAX_THREADS],
    stacks: Option<&'static StackArena>,
    count: usize,
    /// Slot that owns the core
    run: usize,
}

impl ThreadPool {
    /// Empty pool
    pub const fn new() -> Self {
        Self {
            tcbs: [Tcb::empty(); MAX_THREADS],
            stacks: None,
            count: 0,
            run: 0,
        }
    }

    /// Prime every slot, link the cycle and make slot 0 current.
    ///
    /// Callable once, with interrupts masked and before any thread runs.
    pub fn add_threads(
        &mut self,
        entries: &[ThreadEntry],
        stacks: &'static StackArena,
    ) -> Result<(), KernelError> {
        if self.count != 0 {
            return Err(KernelError::ThreadsAlreadyAdded);
        }
        if entries.is_empty() {
            return Err(KernelError::NoThreads);
        }
        if entries.len() > MAX_THREADS {
            return Err(KernelError::TooManyThreads {
                requested: entries.len(),
                capacity: MAX_THREADS,
            });
        }

        if !stacks.claim() {
            return Err(KernelError::StacksInUse);
        }
        self.stacks = Some(stacks);

        let n = entries.len();
        for (i, e) in entries.iter().enumerate() {
            let tcb = &mut self.tcbs[i];
            *tcb = Tcb::empty();
            tcb.next = (i + 1) % n;
            tcb.entry = Some(e.entry);
            tcb.fixed_priority = e.priority;
            tcb.working_priority = e.priority;
            self.prime_stack(i, e.entry);
        }
        self.count = n;
        self.run = 0;
        log::debug!("added {n} threads");
        Ok(())
    }

    /// Write the initial frame so the first dispatch lands at `entry`
    fn prime_stack(&mut self, i: usize, entry: ThreadFn) {
        let Some(arena) = self.stacks else { return };
        let mut words = [0u32; frame::WORDS];
        words[15] = frame::XPSR_THUMB;
        // Exception return takes the PC without the Thumb bit
        words[14] = (entry as usize as u32) & !1;
        words[13] = frame::LR;
        words[12] = frame::FILL[12];
        words[8..12].copy_from_slice(&frame::FILL[0..4]);
        words[0..8].copy_from_slice(&frame::FILL[4..12]);

        let sp = STACK_WORDS - frame::WORDS;
        // SAFETY: no thread runs before launch, and the frame fits in the
        // slot's top `frame::WORDS` words
        unsafe {
            core::ptr::copy_nonoverlapping(words.as_ptr(), arena.base(i).add(sp), frame::WORDS);
        }
        self.tcbs[i].sp = sp;
    }

    /// Configured thread count
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Running slot
    pub fn current(&self) -> usize {
        self.run
    }

    pub(crate) fn set_current(&mut self, i: usize) {
        self.run = i;
    }

    /// TCB by slot index
    pub fn get(&self, i: usize) -> Option<&Tcb> {
        if i < self.count {
            Some(&self.tcbs[i])
        } else {
            None
        }
    }

    pub(crate) fn tcb_mut(&mut self, i: usize) -> &mut Tcb {
        &mut self.tcbs[i]
    }

    /// Successor of `i` in the cycle
    pub fn next_of(&self, i: usize) -> usize {
        self.tcbs[i].next
    }

    /// Derived state of slot `i`
    pub fn state(&self, i: usize) -> ThreadState {
        match self.get(i) {
            None => ThreadState::Inactive,
            Some(t) if t.blocked_on.is_some() => ThreadState::Blocked,
            Some(t) if t.sleep > 0 => ThreadState::Sleeping,
            Some(_) if i == self.run => ThreadState::Running,
            Some(_) => ThreadState::Ready,
        }
    }

    /// Count down every sleeping thread by one tick
    pub fn decrement_sleep(&mut self) {
        for tcb in self.tcbs[..self.count].iter_mut() {
            if tcb.sleep > 0 {
                tcb.sleep -= 1;
            }
        }
    }

    /// Slots reached by walking `next` from slot 0 until it closes
    pub fn cycle_len(&self) -> usize {
        if self.count == 0 {
            return 0;
        }
        let mut i = self.tcbs[0].next;
        let mut steps = 1;
        while i != 0 && steps <= MAX_THREADS {
            i = self.tcbs[i].next;
            steps += 1;
        }
        steps
    }

    /// First slot after `from` (one full cycle, `from` last) that
    /// satisfies `pred`
    pub fn scan_from(&self, from: usize, mut pred: impl FnMut(&Tcb) -> bool) -> Option<usize> {
        let mut i = from;
        for _ in 0..self.count {
            i = self.tcbs[i].next;
            if pred(&self.tcbs[i]) {
                return Some(i);
            }
        }
        None
    }

    /// Saved stack pointer of slot `i` as an address (null before
    /// `add_threads`)
    pub fn stack_pointer(&self, i: usize) -> *mut u32 {
        match self.stacks {
            // SAFETY: saved offsets are always below STACK_WORDS
            Some(arena) => unsafe { arena.base(i).add(self.tcbs[i].sp) },
            None => core::ptr::null_mut(),
        }
    }

    /// Record the stack pointer slot `i` was switched out with
    pub fn save_stack_pointer(&mut self, i: usize, sp: *mut u32) {
        let Some(arena) = self.stacks else { return };
        let base = arena.base(i) as usize;
        let offset = (sp as usize).wrapping_sub(base) / core::mem::size_of::<u32>();
        debug_assert!(offset < STACK_WORDS, "stack pointer outside thread {i}'s stack");
        self.tcbs[i].sp = offset;
    }
}

impl Default for ThreadPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spin() -> ! {
        loop {
            core::hint::spin_loop();
        }
    }

    fn pool_with(n: usize) -> ThreadPool {
        let mut pool = ThreadPool::new();
        let entries = [ThreadEntry::new(spin, Priority::NORMAL); MAX_THREADS];
        pool.add_threads(&entries[..n], StackArena::leaked()).unwrap();
        pool
    }

    fn frame_word(pool: &ThreadPool, i: usize, word: usize) -> u32 {
        unsafe { *pool.stack_pointer(i).add(word) }
    }

    #[test]
    fn test_add_threads_links_cycle() {
        let pool = pool_with(3);
        assert_eq!(pool.len(), 3);
        assert_eq!(pool.next_of(0), 1);
        assert_eq!(pool.next_of(1), 2);
        assert_eq!(pool.next_of(2), 0);
        assert_eq!(pool.cycle_len(), 3);
        assert_eq!(pool.current(), 0);
    }

    #[test]
    fn test_single_thread_cycle() {
        let pool = pool_with(1);
        assert_eq!(pool.next_of(0), 0);
        assert_eq!(pool.cycle_len(), 1);
    }

    #[test]
    fn test_too_many_threads() {
        let mut pool = ThreadPool::new();
        let entries = [ThreadEntry::new(spin, Priority::LOW); MAX_THREADS + 1];
        assert_eq!(
            pool.add_threads(&entries, StackArena::leaked()),
            Err(KernelError::TooManyThreads { requested: MAX_THREADS + 1, capacity: MAX_THREADS })
        );
        assert!(pool.is_empty());
    }

    #[test]
    fn test_add_threads_once() {
        let mut pool = pool_with(2);
        let entries = [ThreadEntry::new(spin, Priority::LOW)];
        let stacks = StackArena::leaked();
        assert_eq!(pool.add_threads(&entries, stacks), Err(KernelError::ThreadsAlreadyAdded));
        assert_eq!(pool.add_threads(&[], stacks), Err(KernelError::ThreadsAlreadyAdded));
    }

    #[test]
    fn test_empty_entries() {
        let mut pool = ThreadPool::new();
        assert_eq!(pool.add_threads(&[], StackArena::leaked()), Err(KernelError::NoThreads));
    }

    #[test]
    fn test_arena_backs_one_pool() {
        let stacks = StackArena::leaked();
        let entries = [ThreadEntry::new(spin, Priority::NORMAL)];
        let mut first = ThreadPool::new();
        first.add_threads(&entries, stacks).unwrap();
        let mut second = ThreadPool::new();
        assert_eq!(second.add_threads(&entries, stacks), Err(KernelError::StacksInUse));
        assert!(second.is_empty());
    }

    #[test]
    fn test_rejected_setup_leaves_arena_free() {
        let stacks = StackArena::leaked();
        let mut pool = ThreadPool::new();
        assert_eq!(pool.add_threads(&[], stacks), Err(KernelError::NoThreads));
        pool.add_threads(&[ThreadEntry::new(spin, Priority::LOW)], stacks).unwrap();
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_no_stack_before_add() {
        let pool = ThreadPool::new();
        assert!(pool.stack_pointer(0).is_null());
    }

    #[test]
    fn test_primed_frame() {
        let pool = pool_with(2);
        let tcb = pool.get(1).unwrap();
        assert_eq!(tcb.sp, STACK_WORDS - 16);
        assert_eq!(frame_word(&pool, 1, 15), 0x0100_0000); // xPSR
        assert_eq!(frame_word(&pool, 1, 14), (spin as ThreadFn as usize as u32) & !1); // PC
        assert_eq!(frame_word(&pool, 1, 13), 0x1414_1414); // LR
        assert_eq!(frame_word(&pool, 1, 8), 0x0000_0000); // R0
        assert_eq!(frame_word(&pool, 1, 11), 0x0303_0303); // R3
        assert_eq!(frame_word(&pool, 1, 7), 0x1111_1111); // R11
        assert_eq!(frame_word(&pool, 1, 0), 0x0404_0404); // R4
    }

    #[test]
    fn test_primed_pc_is_halfword_aligned() {
        let pool = pool_with(3);
        for i in 0..3 {
            assert_eq!(frame_word(&pool, i, 14) & 1, 0);
        }
    }

    #[test]
    fn test_primed_tcb_fields() {
        let mut pool = ThreadPool::new();
        pool.add_threads(
            &[
                ThreadEntry::new(spin, Priority::HIGH),
                ThreadEntry::new(spin, Priority::IDLE),
            ],
            StackArena::leaked(),
        )
        .unwrap();
        let t = pool.get(0).unwrap();
        assert_eq!(t.fixed_priority, Priority::HIGH);
        assert_eq!(t.working_priority, Priority::HIGH);
        assert_eq!(t.age, 0);
        assert_eq!(t.sleep, 0);
        assert!(t.blocked_on.is_none());
        assert!(t.is_eligible());
    }

    #[test]
    fn test_stack_pointer_round_trip() {
        let mut pool = pool_with(2);
        let sp = pool.stack_pointer(1);
        let lower = unsafe { sp.sub(4) };
        pool.save_stack_pointer(1, lower);
        assert_eq!(pool.get(1).unwrap().sp, STACK_WORDS - 20);
    }

    #[test]
    fn test_states() {
        let mut pool = pool_with(3);
        pool.tcb_mut(1).sleep = 2;
        pool.tcb_mut(2).blocked_on = Some(SemaphoreId::MAILBOX);
        assert_eq!(pool.state(0), ThreadState::Running);
        assert_eq!(pool.state(1), ThreadState::Sleeping);
        assert_eq!(pool.state(2), ThreadState::Blocked);
        assert_eq!(pool.state(5), ThreadState::Inactive);

        pool.decrement_sleep();
        pool.decrement_sleep();
        assert_eq!(pool.state(1), ThreadState::Ready);
    }

    #[test]
    fn test_aging_boost() {
        let mut tcb = Tcb::empty();
        tcb.fixed_priority = Priority(2);
        tcb.working_priority = Priority(2);
        for _ in 0..9 {
            tcb.age_one();
        }
        assert_eq!(tcb.working_priority, Priority(2));
        tcb.age_one();
        assert_eq!(tcb.working_priority, Priority(1));
        for _ in 0..30 {
            tcb.age_one();
        }
        assert_eq!(tcb.working_priority, Priority::CRITICAL);
        tcb.restore_priority();
        assert_eq!(tcb.working_priority, Priority(2));
        assert_eq!(tcb.age, 0);
    }

    #[test]
    fn test_scan_from_wraps() {
        let mut pool = pool_with(4);
        pool.tcb_mut(3).sleep = 1;
        pool.tcb_mut(0).sleep = 1;
        // From slot 2: 3 (sleeping), 0 (sleeping), 1
        assert_eq!(pool.scan_from(2, |t| t.is_eligible()), Some(1));
        assert_eq!(pool.scan_from(2, |_| false), None);
    }
}
