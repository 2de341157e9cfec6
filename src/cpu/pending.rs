//! Cross-thread pending-exception publication (spec §5).
//!
//! Peripheral and interrupt-controller threads call `interrupt_triggered`
//! from outside the CPU thread; the CPU thread drains pending kinds only at
//! instruction boundaries. An atomic bitmask gives the
//! delivered-before-the-next-boundary guarantee spec §5 asks for without a
//! channel or a lock the CPU thread would contend on every step.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::interrupts::InterruptConsumer;

use super::types::ExceptionKind;

#[derive(Debug, Default)]
pub struct PendingExceptions(AtomicU32);

impl PendingExceptions {
    pub fn new() -> Self {
        Self(AtomicU32::new(0))
    }

    pub fn raise(&self, kind: ExceptionKind) {
        self.0.fetch_or(1 << (kind as u32), Ordering::SeqCst);
    }

    /// First-found-wins scan in the kind's declared order (spec §4.5.4);
    /// per SPEC_FULL's Open-Question-3 decision, clears the kind it
    /// returns rather than leaving the source's unclosed latch.
    pub fn take_first(&self) -> Option<ExceptionKind> {
        let bits = self.0.load(Ordering::SeqCst);
        for kind in ExceptionKind::ALL {
            let mask = 1 << (kind as u32);
            if bits & mask != 0 {
                self.0.fetch_and(!mask, Ordering::SeqCst);
                return Some(kind);
            }
        }
        None
    }
}

/// The `InterruptConsumer` face the CPU registers on the interrupt
/// fabric's IRQ/FIQ lines; wraps the same [`PendingExceptions`] the CPU
/// thread reads, via interior atomics so no lock is needed on the hot path.
pub struct ExceptionConsumer(pub Arc<PendingExceptions>);

impl InterruptConsumer for ExceptionConsumer {
    fn interrupt_triggered(&mut self, returned_irq: u32) {
        match ExceptionKind::from_u32(returned_irq) {
            Some(kind) => self.0.raise(kind),
            None => log::warn!("cpu: irq fabric delivered unrecognized exception kind {returned_irq}"),
        }
    }
}
