//! Kernel error types
//!
//! Setup mistakes come back as [`KernelError`]. Runtime inconsistencies
//! are [`Fault`]s: there is nothing above the kernel to recover into, so
//! they halt.
//!
//! Author: Moroya Sakamoto

use thiserror::Error;

/// Errors reported by setup-time operations
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// `add_threads` was called with no entries
    #[error("no thread entries supplied")]
    NoThreads,

    /// Stack arena already backs another kernel
    #[error("stack arena is already in use")]
    StacksInUse,

    /// More thread entries than TCB slots
    #[error("{requested} threads requested but only {capacity} slots exist")]
    TooManyThreads { requested: usize, capacity: usize },

    /// `add_threads` may only be called once
    #[error("threads have already been added")]
    ThreadsAlreadyAdded,

    /// Every periodic event slot is taken
    #[error("all {capacity} periodic event slots are in use")]
    PeriodicSlotsExhausted { capacity: usize },

    /// Periodic events need a period of at least one tick
    #[error("periodic event period must be at least one tick")]
    ZeroPeriod,

    /// Semaphore id outside the table
    #[error("semaphore {0} is out of range")]
    InvalidSemaphore(u8),

    /// Semaphore id owned by the mailbox or FIFO
    #[error("semaphore {0} is reserved by the kernel")]
    ReservedSemaphore(u8),

    /// Time slice does not fit the 24-bit tick reload register
    #[error("time slice of {0} cycles does not fit the 24-bit tick reload")]
    TimeSliceOutOfRange(u32),

    /// Setup call after `launch`
    #[error("kernel is already running")]
    AlreadyLaunched,

    /// Runtime call before `launch`
    #[error("kernel has not been launched")]
    NotLaunched,
}

/// Unrecoverable kernel consistency violations
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Every thread is sleeping or blocked
    #[error("no eligible thread to dispatch")]
    NoEligibleThread,

    /// Signal found a negative count but no thread blocked on the semaphore
    #[error("semaphore {semaphore} reports a waiter but none is blocked on it")]
    MissingWaiter { semaphore: u8 },

    /// Wait or signal on an id outside the table
    #[error("unknown semaphore {0}")]
    UnknownSemaphore(u8),

    /// FIFO semaphore granted a unit but the ring was empty
    #[error("fifo semaphore and ring disagree")]
    FifoUnderflow,
}

/// Halt the kernel
#[cold]
pub(crate) fn fatal(fault: Fault) -> ! {
    log::error!("kernel fault: {fault}");
    panic!("kernel fault: {fault}")
}
