//! Kernel, the single explicit context holding all shared state
//!
//! Combines the TCB pool, scheduler, semaphores, mailbox, FIFO, periodic
//! events and timer into one value. Each method is the body of one
//! critical section; [`crate::os::Os`] wraps them with interrupt masking
//! and the port. On the host the kernel can be driven tick by tick with
//! the calling thread always being [`Kernel::current`].
//!
//! Author: Moroya Sakamoto

use crate::config::{KernelConfig, FIFO_SIZE, MAX_THREADS};
use crate::error::{fatal, KernelError};
use crate::fifo::{Fifo, FifoFull};
use crate::mailbox::{Mailbox, Recv};
use crate::periodic::{EventContext, EventFn, PeriodicTable};
use crate::scheduler::Scheduler;
use crate::semaphore::{SemaphoreId, SemaphoreTable, WaitOutcome, WaitPolicy};
use crate::tcb::{StackArena, Tcb, ThreadEntry, ThreadId, ThreadPool, ThreadState};
use crate::timer::SysTimer;

/// Kernel context
pub struct Kernel {
    /// Thread selector
    pub scheduler: Scheduler,
    /// Tick timer
    pub timer: SysTimer,
    threads: ThreadPool,
    semaphores: SemaphoreTable,
    mailbox: Mailbox,
    fifo: Fifo<FIFO_SIZE>,
    events: PeriodicTable,
    running: bool,
}

impl Kernel {
    /// Init: empty tables, interrupts expected to be masked by the caller
    pub const fn new(config: KernelConfig) -> Self {
        Self {
            scheduler: Scheduler::new(config.policy),
            timer: SysTimer::new(config.clock_hz),
            threads: ThreadPool::new(),
            semaphores: SemaphoreTable::new(),
            mailbox: Mailbox::new(),
            fifo: Fifo::new(),
            events: PeriodicTable::new(),
            running: false,
        }
    }

    /// Kernel on the 1 kHz software clock
    pub const fn testing() -> Self {
        Self::new(KernelConfig::testing())
    }

    /// Create every thread, once, before launch, on stacks taken from
    /// `stacks`
    pub fn add_threads(
        &mut self,
        entries: &[ThreadEntry],
        stacks: &'static StackArena,
    ) -> Result<(), KernelError> {
        if self.running {
            return Err(KernelError::AlreadyLaunched);
        }
        self.threads.add_threads(entries, stacks)
    }

    /// Register a periodic event, before launch
    pub fn add_periodic_event_thread(
        &mut self,
        callback: EventFn,
        period: u32,
    ) -> Result<usize, KernelError> {
        if self.running {
            return Err(KernelError::AlreadyLaunched);
        }
        self.events.add(callback, period)
    }

    /// Configure the tick and make slot 0 the running thread.
    ///
    /// Returns the tick reload value for the port.
    pub fn launch(&mut self, time_slice: u32) -> Result<u32, KernelError> {
        if self.running {
            return Err(KernelError::AlreadyLaunched);
        }
        if self.threads.is_empty() {
            return Err(KernelError::NoThreads);
        }
        let reload = self.timer.configure(time_slice)?;

        self.threads.set_current(0);
        let first = self.threads.tcb_mut(0);
        first.restore_priority();
        first.dispatches = first.dispatches.wrapping_add(1);
        self.running = true;
        log::debug!(
            "launch: {} threads, {} events, {} Hz tick",
            self.threads.len(),
            self.events.len(),
            self.timer.tick_hz()
        );
        Ok(reload)
    }

    /// Primed stack pointer of the thread `launch` selected
    pub fn first_stack_pointer(&self) -> *mut u32 {
        let run = self.threads.current();
        self.threads.stack_pointer(run)
    }

    /// Put the running thread to sleep; the caller must then suspend.
    /// `sleep(0)` only gives up the rest of the slice.
    pub fn sleep(&mut self, ms: u32) {
        let ticks = self.timer.ms_to_ticks(ms);
        let run = self.threads.current();
        self.threads.tcb_mut(run).sleep = ticks;
    }

    /// Voluntary suspend: run the scheduler now
    pub fn suspend(&mut self) -> ThreadId {
        ThreadId(self.schedule() as u8)
    }

    /// Set a semaphore's count and wait policy
    pub fn init_semaphore(
        &mut self,
        id: SemaphoreId,
        value: i32,
        policy: WaitPolicy,
    ) -> Result<(), KernelError> {
        if id.is_reserved() {
            return Err(KernelError::ReservedSemaphore(id.raw()));
        }
        self.semaphores.init(id, value, policy)
    }

    /// Wait on behalf of the running thread
    pub fn wait(&mut self, id: SemaphoreId) -> WaitOutcome {
        self.semaphores.wait(&mut self.threads, id)
    }

    /// Signal, waking one blocked thread if needed
    pub fn signal(&mut self, id: SemaphoreId) {
        self.semaphores.signal(&mut self.threads, id);
    }

    /// Current count of a semaphore
    pub fn semaphore_value(&self, id: SemaphoreId) -> Option<i32> {
        self.semaphores.value(id)
    }

    pub fn mailbox_init(&mut self) {
        self.mailbox.init(&mut self.semaphores);
    }

    pub fn mailbox_send(&mut self, data: u32) {
        self.mailbox.send(&mut self.semaphores, &mut self.threads, data);
    }

    /// Take the message or block; after `Recv::Pending` the thread
    /// suspends and calls [`Kernel::mailbox_read`] once resumed
    pub fn mailbox_recv(&mut self) -> Recv {
        self.mailbox.recv(&mut self.semaphores, &mut self.threads)
    }

    pub fn mailbox_read(&mut self) -> u32 {
        self.mailbox.read()
    }

    /// Messages overwritten before being received
    pub fn mailbox_lost(&self) -> u32 {
        self.mailbox.lost()
    }

    pub fn fifo_init(&mut self) {
        self.fifo.init(&mut self.semaphores);
    }

    pub fn fifo_put(&mut self, data: u32) -> Result<(), FifoFull> {
        self.fifo.put(&mut self.semaphores, &mut self.threads, data)
    }

    /// Dequeue or block; after `Recv::Pending` call [`Kernel::fifo_take`]
    /// once resumed
    pub fn fifo_get(&mut self) -> Recv {
        self.fifo.get(&mut self.semaphores, &mut self.threads)
    }

    pub fn fifo_take(&mut self) -> u32 {
        self.fifo.take()
    }

    /// Words dropped because the FIFO was full
    pub fn fifo_lost(&self) -> u32 {
        self.fifo.lost()
    }

    /// Tick interrupt body: charge the tick to the running thread, count
    /// down sleepers, then fire due periodic events
    pub fn dispatch(&mut self) {
        self.timer.advance();
        if self.running {
            let run = self.threads.current();
            let tcb = self.threads.tcb_mut(run);
            tcb.run_ticks = tcb.run_ticks.wrapping_add(1);
        }
        self.threads.decrement_sleep();

        let mut ctx = EventContext {
            threads: &mut self.threads,
            sems: &mut self.semaphores,
            mailbox: &mut self.mailbox,
            fifo: &mut self.fifo,
            now: self.timer.now_ticks(),
        };
        self.events.run(&mut ctx);
    }

    /// Pick the next thread; halts if none is eligible
    pub fn schedule(&mut self) -> usize {
        match self.scheduler.select(&mut self.threads) {
            Ok(next) => next,
            Err(fault) => fatal(fault),
        }
    }

    /// One full tick: dispatcher then scheduler
    pub fn tick(&mut self) -> ThreadId {
        self.dispatch();
        ThreadId(self.schedule() as u8)
    }

    /// Switch handler body: park the outgoing stack pointer, schedule,
    /// hand back the incoming one
    pub fn switch_context(&mut self, sp: *mut u32) -> *mut u32 {
        let out = self.threads.current();
        self.threads.save_stack_pointer(out, sp);
        let next = self.schedule();
        self.threads.stack_pointer(next)
    }

    /// Run the kernel for a number of ticks (simulation)
    pub fn run_for(&mut self, ticks: u32) -> Result<KernelStats, KernelError> {
        if !self.running {
            return Err(KernelError::NotLaunched);
        }
        for _ in 0..ticks {
            self.tick();
        }
        Ok(self.stats())
    }

    /// Snapshot of the counters
    pub fn stats(&self) -> KernelStats {
        let mut run_ticks = [0u32; MAX_THREADS];
        let mut dispatches = [0u32; MAX_THREADS];
        for i in 0..self.threads.len() {
            if let Some(t) = self.threads.get(i) {
                run_ticks[i] = t.run_ticks;
                dispatches[i] = t.dispatches;
            }
        }
        KernelStats {
            total_ticks: self.timer.now_ticks(),
            context_switches: self.scheduler.context_switches,
            decisions: self.scheduler.decisions,
            run_ticks,
            dispatches,
        }
    }

    /// Running thread
    pub fn current(&self) -> ThreadId {
        ThreadId(self.threads.current() as u8)
    }

    /// TCB of a thread
    pub fn thread(&self, id: ThreadId) -> Option<&Tcb> {
        self.threads.get(id.index())
    }

    pub fn thread_state(&self, id: ThreadId) -> ThreadState {
        self.threads.state(id.index())
    }

    pub fn threads(&self) -> &ThreadPool {
        &self.threads
    }

    pub fn events(&self) -> &PeriodicTable {
        &self.events
    }

    /// Is the kernel running?
    pub fn is_running(&self) -> bool {
        self.running
    }
}

/// Kernel execution statistics
#[derive(Debug, Clone)]
pub struct KernelStats {
    /// Ticks since launch
    pub total_ticks: u64,
    /// Selections that changed the running thread
    pub context_switches: u32,
    /// Scheduler invocations
    pub decisions: u32,
    /// Ticks charged to each thread
    pub run_ticks: [u32; MAX_THREADS],
    /// Times each thread was selected
    pub dispatches: [u32; MAX_THREADS],
}
