//! Static-priority scheduler with aging
//!
//! Runs once per tick and once per voluntary suspend:
//! 1. Every eligible thread other than the running one ages; each
//!    `AGING_INTERVAL`-th step raises its working priority by one.
//! 2. One full cycle is scanned starting after the running thread; the
//!    lowest working priority wins, ties go to the first one met, which
//!    gives round robin among equals.
//! 3. The winner's working priority and age are reset before it runs.
//!
//! `SchedulingPolicy::RoundRobin` skips steps 1 and 3 and takes the next
//! eligible thread.
//!
//! Author: Moroya Sakamoto

use crate::config::SchedulingPolicy;
use crate::error::Fault;
use crate::tcb::{Priority, ThreadPool};

/// Thread selector
pub struct Scheduler {
    policy: SchedulingPolicy,
    /// Selections that changed the running thread
    pub context_switches: u32,
    /// Total selections made
    pub decisions: u32,
}

impl Scheduler {
    pub const fn new(policy: SchedulingPolicy) -> Self {
        Self {
            policy,
            context_switches: 0,
            decisions: 0,
        }
    }

    pub fn policy(&self) -> SchedulingPolicy {
        self.policy
    }

    /// Pick the next thread and make it current
    pub fn select(&mut self, threads: &mut ThreadPool) -> Result<usize, Fault> {
        let prev = threads.current();
        let chosen = match self.policy {
            SchedulingPolicy::PriorityAging => Self::highest_aged(threads),
            SchedulingPolicy::RoundRobin => threads.scan_from(prev, |t| t.is_eligible()),
        };
        let next = chosen.ok_or(Fault::NoEligibleThread)?;

        let tcb = threads.tcb_mut(next);
        if self.policy == SchedulingPolicy::PriorityAging {
            tcb.restore_priority();
        }
        tcb.dispatches = tcb.dispatches.wrapping_add(1);
        self.decisions = self.decisions.wrapping_add(1);
        if next != prev {
            self.context_switches = self.context_switches.wrapping_add(1);
            log::trace!("switch {prev} -> {next}");
        }
        threads.set_current(next);
        Ok(next)
    }

    /// Age the waiting threads, then find the lowest working priority
    fn highest_aged(threads: &mut ThreadPool) -> Option<usize> {
        let run = threads.current();
        for i in 0..threads.len() {
            let tcb = threads.tcb_mut(i);
            if i != run && tcb.is_eligible() {
                tcb.age_one();
            }
        }

        let mut best: Option<(usize, Priority)> = None;
        let mut i = run;
        for _ in 0..threads.len() {
            i = threads.next_of(i);
            let tcb = threads.get(i)?;
            if !tcb.is_eligible() {
                continue;
            }
            match best {
                Some((_, p)) if tcb.working_priority >= p => {}
                _ => best = Some((i, tcb.working_priority)),
            }
        }
        best.map(|(i, _)| i)
    }
}
