//! Thread and interrupt facing API
//!
//! [`Os`] owns the [`Kernel`] behind one global critical section
//! (`critical_section::Mutex<RefCell<_>>`) and a [`Port`]. Every call
//! runs its kernel body with interrupts masked and only asks the port for
//! a context switch after the critical section has been left, so no
//! thread is ever switched out while holding it.
//!
//! Typical wiring on a target:
//!
//! ```ignore
//! static STACKS: StackArena = StackArena::new();
//! static OS: Os<CortexM> = Os::new(KernelConfig::new(80_000_000), CortexM);
//! bind_cortex_m!(OS);
//!
//! OS.add_threads(&[ThreadEntry::new(worker, Priority::HIGH)], &STACKS)?;
//! ```
//!
//! Author: Moroya Sakamoto

use core::cell::RefCell;
use core::convert::Infallible;

use critical_section::Mutex;

use crate::config::KernelConfig;
use crate::error::KernelError;
use crate::fifo::FifoFull;
use crate::kernel::Kernel;
use crate::mailbox::Recv;
use crate::periodic::EventFn;
use crate::port::Port;
use crate::semaphore::{SemaphoreId, WaitOutcome, WaitPolicy};
use crate::tcb::{StackArena, ThreadEntry};

/// Kernel plus the port it runs on
pub struct Os<P: Port> {
    kernel: Mutex<RefCell<Kernel>>,
    port: P,
}

impl<P: Port> Os<P> {
    /// Init
    pub const fn new(config: KernelConfig, port: P) -> Self {
        Self {
            kernel: Mutex::new(RefCell::new(Kernel::new(config))),
            port,
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut Kernel) -> R) -> R {
        critical_section::with(|cs| f(&mut *self.kernel.borrow_ref_mut(cs)))
    }

    /// Inspect or drive the kernel inside the critical section
    pub fn with_kernel<R>(&self, f: impl FnOnce(&mut Kernel) -> R) -> R {
        self.with(f)
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn add_threads(
        &self,
        entries: &[ThreadEntry],
        stacks: &'static StackArena,
    ) -> Result<(), KernelError> {
        self.with(|k| k.add_threads(entries, stacks))
    }

    pub fn add_periodic_event_thread(
        &self,
        callback: EventFn,
        period: u32,
    ) -> Result<usize, KernelError> {
        self.with(|k| k.add_periodic_event_thread(callback, period))
    }

    /// Start the tick and enter thread slot 0. Only returns on a setup
    /// error.
    pub fn launch(&self, time_slice: u32) -> Result<Infallible, KernelError> {
        let (reload, sp) = self.with(|k| {
            let reload = k.launch(time_slice)?;
            Ok::<_, KernelError>((reload, k.first_stack_pointer()))
        })?;
        self.port.start_tick(reload);
        self.port.start_first(sp)
    }

    /// Sleep for at least `ms` milliseconds; `sleep(0)` yields
    pub fn sleep(&self, ms: u32) {
        self.with(|k| k.sleep(ms));
        self.port.request_switch();
    }

    /// Give up the rest of this slice
    pub fn suspend(&self) {
        self.port.request_switch();
    }

    pub fn init_semaphore(
        &self,
        id: SemaphoreId,
        value: i32,
        policy: WaitPolicy,
    ) -> Result<(), KernelError> {
        self.with(|k| k.init_semaphore(id, value, policy))
    }

    /// Take one unit; blocks or spins according to the semaphore's policy
    pub fn wait(&self, id: SemaphoreId) {
        loop {
            match self.with(|k| k.wait(id)) {
                WaitOutcome::Acquired => return,
                WaitOutcome::Blocked => {
                    self.port.request_switch();
                    return;
                }
                // Interrupts are unmasked between attempts
                WaitOutcome::Busy => core::hint::spin_loop(),
            }
        }
    }

    pub fn signal(&self, id: SemaphoreId) {
        self.with(|k| k.signal(id));
    }

    pub fn mailbox_init(&self) {
        self.with(|k| k.mailbox_init());
    }

    /// Post without blocking; an unread message is overwritten
    pub fn mailbox_send(&self, data: u32) {
        self.with(|k| k.mailbox_send(data));
    }

    /// Block until a message is available and return it
    pub fn mailbox_recv(&self) -> u32 {
        match self.with(|k| k.mailbox_recv()) {
            Recv::Ready(data) => data,
            Recv::Pending => {
                self.port.request_switch();
                self.with(|k| k.mailbox_read())
            }
        }
    }

    pub fn mailbox_lost(&self) -> u32 {
        self.with(|k| k.mailbox_lost())
    }

    pub fn fifo_init(&self) {
        self.with(|k| k.fifo_init());
    }

    pub fn fifo_put(&self, data: u32) -> Result<(), FifoFull> {
        self.with(|k| k.fifo_put(data))
    }

    /// Block until a word is queued and return it
    pub fn fifo_get(&self) -> u32 {
        match self.with(|k| k.fifo_get()) {
            Recv::Ready(data) => data,
            Recv::Pending => {
                self.port.request_switch();
                self.with(|k| k.fifo_take())
            }
        }
    }

    /// Tick interrupt: sleepers and periodic events, then pend the
    /// scheduler
    pub fn on_tick(&self) {
        self.with(|k| k.dispatch());
        self.port.request_switch();
    }

    /// Context switch interrupt: outgoing stack pointer in, incoming out
    pub fn switch_context(&self, sp: *mut u32) -> *mut u32 {
        self.with(|k| k.switch_context(sp))
    }
}
