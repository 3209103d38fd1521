//! System tick timer, hardware-abstract tick source
//!
//! Converts a time slice in core clock cycles into the tick rate that
//! drives the dispatcher and scheduler, and converts sleep requests from
//! milliseconds into ticks. On Cortex-M the slice is loaded into SysTick,
//! whose reload register is 24 bits wide.
//!
//! Author: Moroya Sakamoto

use crate::config::DEFAULT_TICK_HZ;
use crate::error::KernelError;

/// Largest time slice the 24-bit reload register can express
pub const MAX_TIME_SLICE: u32 = 1 << 24;

/// System timer
pub struct SysTimer {
    /// Core clock (Hz)
    clock_hz: u32,
    /// Tick interrupts per second
    tick_hz: u32,
    /// Ticks since launch
    ticks: u64,
}

impl SysTimer {
    /// Create a new system timer
    ///
    /// `clock_hz`: core clock frequency (e.g. 80_000_000 for a TM4C123)
    pub const fn new(clock_hz: u32) -> Self {
        Self {
            clock_hz,
            tick_hz: DEFAULT_TICK_HZ,
            ticks: 0,
        }
    }

    /// Software timer for testing: 1 kHz clock, 1 tick per ms at slice 1
    pub const fn software() -> Self {
        Self::new(DEFAULT_TICK_HZ)
    }

    /// Reload value for a time slice, checked against the 24-bit register
    pub fn reload_for(time_slice: u32) -> Result<u32, KernelError> {
        if time_slice == 0 || time_slice > MAX_TIME_SLICE {
            return Err(KernelError::TimeSliceOutOfRange(time_slice));
        }
        Ok(time_slice - 1)
    }

    /// Program the tick rate; returns the reload value
    pub fn configure(&mut self, time_slice: u32) -> Result<u32, KernelError> {
        let reload = Self::reload_for(time_slice)?;
        self.tick_hz = (self.clock_hz / time_slice).max(1);
        self.ticks = 0;
        Ok(reload)
    }

    /// One tick elapsed
    pub fn advance(&mut self) {
        self.ticks = self.ticks.wrapping_add(1);
    }

    /// Ticks since launch
    pub fn now_ticks(&self) -> u64 {
        self.ticks
    }

    /// Milliseconds since launch
    pub fn now_ms(&self) -> u64 {
        self.ticks * 1000 / self.tick_hz as u64
    }

    /// Tick interrupts per second
    pub fn tick_hz(&self) -> u32 {
        self.tick_hz
    }

    /// Core clock frequency
    pub fn clock_hz(&self) -> u32 {
        self.clock_hz
    }

    /// Ticks covering at least `ms` milliseconds (0 stays 0)
    pub fn ms_to_ticks(&self, ms: u32) -> u32 {
        let ticks = (ms as u64 * self.tick_hz as u64).div_ceil(1000);
        ticks.min(u32::MAX as u64) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_software_timer() {
        let mut timer = SysTimer::software();
        assert_eq!(timer.now_ticks(), 0);
        assert_eq!(timer.configure(1), Ok(0));
        assert_eq!(timer.tick_hz(), 1000);
        for _ in 0..1500 {
            timer.advance();
        }
        assert_eq!(timer.now_ticks(), 1500);
        assert_eq!(timer.now_ms(), 1500);
    }

    #[test]
    fn test_reload_range() {
        assert_eq!(SysTimer::reload_for(0), Err(KernelError::TimeSliceOutOfRange(0)));
        assert_eq!(SysTimer::reload_for(MAX_TIME_SLICE), Ok(0x00FF_FFFF));
        assert_eq!(
            SysTimer::reload_for(MAX_TIME_SLICE + 1),
            Err(KernelError::TimeSliceOutOfRange(MAX_TIME_SLICE + 1))
        );
    }

    #[test]
    fn test_hardware_tick_rate() {
        let mut timer = SysTimer::new(80_000_000);
        assert_eq!(timer.configure(80_000), Ok(79_999));
        assert_eq!(timer.tick_hz(), 1000);
        assert_eq!(timer.ms_to_ticks(25), 25);
    }

    #[test]
    fn test_ms_to_ticks_rounds_up() {
        let mut timer = SysTimer::new(80_000_000);
        // 100 Hz: 10 ms per tick
        timer.configure(800_000).unwrap();
        assert_eq!(timer.ms_to_ticks(0), 0);
        assert_eq!(timer.ms_to_ticks(1), 1);
        assert_eq!(timer.ms_to_ticks(10), 1);
        assert_eq!(timer.ms_to_ticks(11), 2);
    }

    #[test]
    fn test_now_ms_at_100hz() {
        let mut timer = SysTimer::new(80_000_000);
        timer.configure(800_000).unwrap();
        for _ in 0..7 {
            timer.advance();
        }
        assert_eq!(timer.now_ms(), 70);
    }
}
