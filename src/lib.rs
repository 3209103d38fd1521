//! Ember RTOS, a minimal single-core preemptive kernel
//!
//! Small fixed set of threads sharing one core:
//! - Static TCB table with a private stack per thread (no heap)
//! - Fixed-priority scheduling with aging, round robin among equals
//! - Counting semaphores that block or spin
//! - One-slot mailbox and a word FIFO for thread hand-off
//! - Periodic events fired from the tick interrupt
//! - Millisecond sleep
//!
//! All shared state lives in one [`Kernel`] value behind a single critical
//! section; [`Os`] pairs it with a [`Port`] for the core it runs on.
//!
//! Author: Moroya Sakamoto

#![no_std]

#[cfg(test)]
extern crate std;

pub mod config;
pub mod error;
pub mod tcb;
pub mod semaphore;
pub mod mailbox;
pub mod fifo;
pub mod periodic;
pub mod timer;
pub mod scheduler;
pub mod port;
pub mod kernel;
pub mod os;
#[cfg(all(feature = "cortex-m", target_arch = "arm"))]
pub mod arm;

pub use config::{KernelConfig, SchedulingPolicy};
pub use error::{Fault, KernelError};
pub use tcb::{Priority, StackArena, ThreadEntry, ThreadFn, ThreadId, ThreadState};
pub use semaphore::{SemaphoreId, WaitOutcome, WaitPolicy};
pub use mailbox::Recv;
pub use fifo::FifoFull;
pub use periodic::{EventContext, EventFn};
pub use timer::SysTimer;
pub use scheduler::Scheduler;
pub use port::{Port, SimPort};
pub use kernel::{Kernel, KernelStats};
pub use os::Os;
#[cfg(all(feature = "cortex-m", target_arch = "arm"))]
pub use arm::CortexM;
