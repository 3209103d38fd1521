//! ARM Cortex-M port (Cortex-M3/M4)
//!
//! SysTick drives the tick and PendSV performs every context switch, so
//! switches triggered from threads and from the tick share one path.
//! PendSV runs at the lowest exception priority and is therefore never
//! taken in the middle of another handler.
//!
//! Thread and handler code share the main stack pointer. A switched-out
//! thread leaves on its own stack the hardware exception frame
//! (R0-R3, R12, LR, PC, xPSR) with R4-R11 pushed below it, matching the
//! frame primed by [`crate::tcb::ThreadPool::add_threads`]. Handlers run
//! on the interrupted thread's stack, so every slot of the
//! [`crate::tcb::StackArena`] must hold the handler path on top of the
//! thread's own use (see [`crate::config::STACK_WORDS`]).
//!
//! The application binds its static [`crate::os::Os`] to the vectors with
//! [`bind_cortex_m!`](crate::bind_cortex_m).
//!
//! Author: Moroya Sakamoto

use core::arch::{asm, global_asm};

use cortex_m::peripheral::scb::SystemHandler;
use cortex_m::peripheral::syst::SystClkSource;
use cortex_m::peripheral::SCB;

use crate::port::Port;

const PENDSV_PRIORITY: u8 = 0xFF;
const SYSTICK_PRIORITY: u8 = 0xE0;

/// Cortex-M3/M4 port
pub struct CortexM;

impl Port for CortexM {
    fn request_switch(&self) {
        SCB::set_pendsv();
        cortex_m::asm::dsb();
        cortex_m::asm::isb();
    }

    fn start_tick(&self, reload: u32) {
        // SAFETY: the kernel is the only owner of SysTick and of the
        // PendSV/SysTick handler priorities
        let mut p = unsafe { cortex_m::Peripherals::steal() };
        unsafe {
            p.SCB.set_priority(SystemHandler::PendSV, PENDSV_PRIORITY);
            p.SCB.set_priority(SystemHandler::SysTick, SYSTICK_PRIORITY);
        }
        p.SYST.disable_counter();
        p.SYST.set_clock_source(SystClkSource::Core);
        p.SYST.set_reload(reload);
        p.SYST.clear_current();
        p.SYST.enable_interrupt();
        p.SYST.enable_counter();
    }

    fn start_first(&self, sp: *mut u32) -> ! {
        // SAFETY: `sp` points at a frame primed by the thread pool; the
        // saved LR slot is skipped and the entry PC is loaded into LR with
        // the Thumb bit restored for `bx`
        unsafe {
            asm!(
                "mov sp, {sp}",
                "pop {{r4-r11}}",
                "pop {{r0-r3}}",
                "pop {{r12}}",
                "add sp, sp, #4",
                "pop {{lr}}",
                "orr lr, lr, #1",
                "add sp, sp, #4",
                "cpsie i",
                "bx lr",
                sp = in(reg) sp,
                options(noreturn),
            )
        }
    }
}

// PendSV: save R4-R11 of the outgoing thread, let the kernel pick the
// next one, restore its R4-R11. R4 holds EXC_RETURN across the call.
global_asm!(
    ".section .text.PendSV,\"ax\",%progbits",
    ".global PendSV",
    ".type PendSV,%function",
    ".thumb_func",
    "PendSV:",
    "    cpsid i",
    "    push {{r4-r11}}",
    "    mov r4, lr",
    "    mov r0, sp",
    "    bl __ember_switch",
    "    mov sp, r0",
    "    mov lr, r4",
    "    pop {{r4-r11}}",
    "    cpsie i",
    "    bx lr",
    ".size PendSV, . - PendSV",
);

/// Bind a static `Os<CortexM>` to the SysTick and PendSV handlers
///
/// ```ignore
/// static OS: Os<CortexM> = Os::new(KernelConfig::new(80_000_000), CortexM);
/// ember_rtos::bind_cortex_m!(OS);
/// ```
#[macro_export]
macro_rules! bind_cortex_m {
    ($os:path) => {
        #[no_mangle]
        extern "C" fn __ember_switch(sp: *mut u32) -> *mut u32 {
            $os.switch_context(sp)
        }

        #[no_mangle]
        extern "C" fn SysTick() {
            $os.on_tick();
        }
    };
}
