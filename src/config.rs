//! Build-time kernel configuration
//!
//! Capacities are fixed when the kernel is compiled; nothing here is
//! allocated at runtime.
//!
//! Author: Moroya Sakamoto

/// Maximum threads the kernel can manage
pub const MAX_THREADS: usize = 8;

/// Stack size per thread, in 32-bit words
///
/// Threads and handlers share one stack pointer, so each thread stack also
/// carries, on top of the thread's own frames:
/// - the 16-word saved context of a switched-out thread
/// - an 8-word exception frame for a SysTick nested under PendSV
/// - the tick and switch handler call paths (critical section, scheduler,
///   periodic callbacks, disabled `log` calls), about 40 words in a
///   release build
///
/// That leaves roughly 36 words for thread code at the default size.
/// Raise it for threads that call deeply or format log output.
pub const STACK_WORDS: usize = 100;

/// Maximum periodic event slots
pub const MAX_PERIODIC: usize = 4;

/// Semaphore table size (including the kernel-reserved slots)
pub const MAX_SEMAPHORES: usize = 16;

/// FIFO ring size (one slot reserved for full/empty distinction)
pub const FIFO_SIZE: usize = 16;

/// Aging increments needed to raise a waiting thread's priority by one step
pub const AGING_INTERVAL: u32 = 10;

/// Tick rate assumed before `launch` configures the real one
pub const DEFAULT_TICK_HZ: u32 = 1_000;

/// Thread selection policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulingPolicy {
    /// Static priority with aging, round robin among equals
    #[default]
    PriorityAging,
    /// Plain round robin: next eligible thread, priorities ignored
    RoundRobin,
}

/// Kernel configuration
#[derive(Debug, Clone, Copy)]
pub struct KernelConfig {
    /// Core clock feeding the tick timer (Hz)
    pub clock_hz: u32,
    /// Thread selection policy
    pub policy: SchedulingPolicy,
}

impl KernelConfig {
    /// Configuration for a hardware clock
    pub const fn new(clock_hz: u32) -> Self {
        Self {
            clock_hz,
            policy: SchedulingPolicy::PriorityAging,
        }
    }

    /// 1 kHz software clock: `launch(1)` yields one tick per millisecond
    pub const fn testing() -> Self {
        Self::new(DEFAULT_TICK_HZ)
    }

    /// Select the scheduling policy
    pub const fn with_policy(mut self, policy: SchedulingPolicy) -> Self {
        self.policy = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let config = KernelConfig::new(48_000_000);
        assert_eq!(config.policy, SchedulingPolicy::PriorityAging);
        assert_eq!(config.clock_hz, 48_000_000);
    }

    #[test]
    fn test_with_policy() {
        let config = KernelConfig::testing().with_policy(SchedulingPolicy::RoundRobin);
        assert_eq!(config.policy, SchedulingPolicy::RoundRobin);
        assert_eq!(config.clock_hz, DEFAULT_TICK_HZ);
    }
}
