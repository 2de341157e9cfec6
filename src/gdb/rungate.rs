//! The run-gate: a binary, level-triggered event coordinating the CPU
//! thread with the debug-stub thread (spec §5, Glossary "Run-gate").
//!
//! Grounded on the REDESIGN FLAGS note to model this as an event rather
//! than busy-waiting: a `Condvar` pair, not a spin loop.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Condvar, Mutex};

pub struct RunGate {
    open: Mutex<bool>,
    cond: Condvar,
    pub stepping: AtomicBool,
    pub breakpoint_hit: AtomicBool,
    pub stopped: AtomicBool,
    breakpoints: Mutex<std::collections::HashSet<u32>>,
    /// Bumped every time the gate closes and `breakpoint_hit` is set, so
    /// the stub's timed poll can tell a fresh halt from a stale one.
    halt_generation: AtomicU32,
}

impl Default for RunGate {
    fn default() -> Self {
        Self::new()
    }
}

impl RunGate {
    pub fn new() -> Self {
        Self {
            open: Mutex::new(true),
            cond: Condvar::new(),
            stepping: AtomicBool::new(false),
            breakpoint_hit: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            breakpoints: Mutex::new(std::collections::HashSet::new()),
            halt_generation: AtomicU32::new(0),
        }
    }

    pub fn close(&self) {
        *self.open.lock().unwrap() = false;
    }

    pub fn open_gate(&self) {
        *self.open.lock().unwrap() = true;
        self.cond.notify_all();
    }

    /// Park the calling (CPU) thread until the gate opens.
    pub fn wait_until_open(&self) {
        let mut open = self.open.lock().unwrap();
        while !*open {
            open = self.cond.wait(open).unwrap();
        }
    }

    pub fn is_open(&self) -> bool {
        *self.open.lock().unwrap()
    }

    /// Called by the CPU just before parking: announce "I halted" and bump
    /// the generation so a polling stub sees a fresh event.
    pub fn signal_halt(&self) {
        self.breakpoint_hit.store(true, Ordering::SeqCst);
        self.halt_generation.fetch_add(1, Ordering::SeqCst);
    }

    pub fn clear_halt(&self) {
        self.breakpoint_hit.store(false, Ordering::SeqCst);
    }

    pub fn insert_breakpoint(&self, addr: u32) {
        self.breakpoints.lock().unwrap().insert(addr);
    }

    pub fn remove_breakpoint(&self, addr: u32) {
        self.breakpoints.lock().unwrap().remove(&addr);
    }

    pub fn clear_breakpoints(&self) {
        self.breakpoints.lock().unwrap().clear();
    }

    pub fn matches(&self, ip: u32) -> bool {
        self.breakpoints.lock().unwrap().contains(&ip)
    }
}
