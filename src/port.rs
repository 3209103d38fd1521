//! Hardware seam
//!
//! The kernel needs three things from the core it runs on: a way to pend
//! a context switch, a periodic tick source, and a way to enter the first
//! thread. Interrupt masking comes from the `critical-section` crate.
//!
//! Author: Moroya Sakamoto

use core::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

/// Core-specific services
pub trait Port {
    /// Pend a context switch. It is taken once interrupts are unmasked;
    /// a caller that is blocked or sleeping does not return from this
    /// until it has been dispatched again.
    fn request_switch(&self);

    /// Start the periodic tick interrupt with the given reload value
    fn start_tick(&self, reload: u32);

    /// Load `sp`, pop the primed frame and run the first thread
    fn start_first(&self, sp: *mut u32) -> !;
}

/// Deterministic port for host tests and simulation
///
/// Records what the kernel asked for instead of touching hardware.
pub struct SimPort {
    switch_requests: AtomicU32,
    reload: AtomicU32,
    started_sp: AtomicUsize,
}

impl SimPort {
    pub const fn new() -> Self {
        Self {
            switch_requests: AtomicU32::new(0),
            reload: AtomicU32::new(0),
            started_sp: AtomicUsize::new(0),
        }
    }

    /// Context switches requested so far
    pub fn switch_requests(&self) -> u32 {
        self.switch_requests.load(Ordering::Relaxed)
    }

    /// Reload value passed to `start_tick`
    pub fn reload(&self) -> u32 {
        self.reload.load(Ordering::Relaxed)
    }

    /// Stack pointer passed to `start_first` (0 = never started)
    pub fn started_sp(&self) -> usize {
        self.started_sp.load(Ordering::Relaxed)
    }
}

impl Default for SimPort {
    fn default() -> Self {
        Self::new()
    }
}

impl Port for SimPort {
    fn request_switch(&self) {
        self.switch_requests.fetch_add(1, Ordering::Relaxed);
    }

    fn start_tick(&self, reload: u32) {
        self.reload.store(reload, Ordering::Relaxed);
    }

    fn start_first(&self, sp: *mut u32) -> ! {
        self.started_sp.store(sp as usize, Ordering::Relaxed);
        panic!("simulated port cannot enter thread mode")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sim_port_records() {
        let port = SimPort::new();
        port.request_switch();
        port.request_switch();
        port.start_tick(79_999);
        assert_eq!(port.switch_requests(), 2);
        assert_eq!(port.reload(), 79_999);
        assert_eq!(port.started_sp(), 0);
    }
}
