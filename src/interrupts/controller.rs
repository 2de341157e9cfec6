//! The optional mid-fabric interrupt controller (spec §4.3).
//!
//! Grounded on `src/controllers/ic.py`'s `SimpleInterruptController`, with
//! the 10-level priority cutoff and FIQ/IRQ re-classification kept exactly,
//! and the open question in spec §9.7 resolved: `mask_all` is split into
//! two distinct operations (`mask_all_enable`/`unmask_all`) instead of
//! being both a field and a method.

use std::collections::HashSet;

use super::{InterruptConsumer, Producer};

/// Downstream source-irq conventions: the IC is a producer on exactly two
/// lines, re-classified on egress from the set of masked/priority-admitted
/// upstream irqs.
pub const SOURCE_IRQ: u32 = 0;
pub const SOURCE_FIQ: u32 = 1;

pub struct InterruptController {
    name: String,
    all_masked: bool,
    masked: HashSet<u32>,
    current_priority: u8,
    fiq_set: HashSet<u32>,
    pub downstream: Producer,
}

impl InterruptController {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            downstream: Producer::new(format!("{name}:downstream")),
            name,
            all_masked: true,
            masked: HashSet::new(),
            current_priority: 9,
            fiq_set: HashSet::new(),
        }
    }

    pub fn mask_all_enable(&mut self) {
        self.all_masked = true;
    }

    pub fn unmask_all(&mut self) {
        self.all_masked = false;
    }

    pub fn mask_irq(&mut self, irq: u32) {
        if !self.masked.insert(irq) {
            log::info!("{}: interrupt {irq} was already masked", self.name);
        }
    }

    pub fn unmask_irq(&mut self, irq: u32) {
        if !self.masked.remove(&irq) {
            log::info!("{}: interrupt {irq} wasn't masked", self.name);
        }
    }

    /// 0..=9, reset value 9 (least restrictive).
    pub fn set_priority(&mut self, priority: u8) {
        self.current_priority = priority.min(9);
    }

    pub fn classify_as_fiq(&mut self, irq: u32) {
        self.fiq_set.insert(irq);
    }

    pub fn classify_as_irq(&mut self, irq: u32) {
        self.fiq_set.remove(&irq);
    }

    /// Register a downstream consumer on `source` (must be [`SOURCE_IRQ`]
    /// or [`SOURCE_FIQ`]); anything else is refused with a warning.
    pub fn register_consumer(
        &mut self,
        name: impl Into<String>,
        consumer: Box<dyn InterruptConsumer + Send>,
        source: u32,
        returned_irq: u32,
    ) {
        if source != SOURCE_IRQ && source != SOURCE_FIQ {
            log::warn!("{}: only source 0 (IRQ) or 1 (FIQ) are available", self.name);
            return;
        }
        self.downstream.register(name, consumer, source, returned_irq);
    }
}

impl InterruptConsumer for InterruptController {
    fn interrupt_triggered(&mut self, returned_irq: u32) {
        if returned_irq > 99 {
            log::warn!("{}: irq {returned_irq} is out of range (0..=99)", self.name);
            return;
        }
        if self.all_masked {
            log::info!("{}: all interrupts are masked", self.name);
            return;
        }
        if self.masked.contains(&returned_irq) {
            log::info!("{}: interrupt {returned_irq} is masked", self.name);
            return;
        }
        if (returned_irq / 10) as u8 > self.current_priority {
            log::info!(
                "{}: interrupt {returned_irq} is ignored at current priority level {}",
                self.name,
                self.current_priority
            );
            return;
        }

        if self.fiq_set.contains(&returned_irq) {
            self.downstream.trigger(SOURCE_FIQ);
        } else {
            self.downstream.trigger(SOURCE_IRQ);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct Recorder(Arc<Mutex<Vec<u32>>>);
    impl InterruptConsumer for Recorder {
        fn interrupt_triggered(&mut self, returned_irq: u32) {
            self.0.lock().unwrap().push(returned_irq);
        }
    }

    #[test]
    fn out_of_range_is_dropped() {
        let mut ic = InterruptController::new("ic");
        ic.unmask_all();
        let log = Arc::new(Mutex::new(Vec::new()));
        ic.register_consumer("c", Box::new(Recorder(log.clone())), SOURCE_IRQ, 1);
        ic.interrupt_triggered(100);
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn masked_all_drops_everything_until_unmasked() {
        let mut ic = InterruptController::new("ic");
        let log = Arc::new(Mutex::new(Vec::new()));
        ic.register_consumer("c", Box::new(Recorder(log.clone())), SOURCE_IRQ, 1);
        ic.interrupt_triggered(5);
        assert!(log.lock().unwrap().is_empty());
        ic.unmask_all();
        ic.interrupt_triggered(5);
        assert_eq!(*log.lock().unwrap(), vec![1]);
    }

    #[test]
    fn priority_cutoff_drops_lower_priority_sources() {
        let mut ic = InterruptController::new("ic");
        ic.unmask_all();
        ic.set_priority(2);
        let log = Arc::new(Mutex::new(Vec::new()));
        ic.register_consumer("c", Box::new(Recorder(log.clone())), SOURCE_IRQ, 1);
        ic.interrupt_triggered(35); // floor(35/10) = 3 > 2
        assert!(log.lock().unwrap().is_empty());
        ic.interrupt_triggered(25); // floor(25/10) = 2, admitted
        assert_eq!(*log.lock().unwrap(), vec![1]);
    }

    #[test]
    fn fiq_classified_sources_route_to_fiq_line() {
        let mut ic = InterruptController::new("ic");
        ic.unmask_all();
        ic.classify_as_fiq(7);
        let irq_log = Arc::new(Mutex::new(Vec::new()));
        let fiq_log = Arc::new(Mutex::new(Vec::new()));
        ic.register_consumer("irq", Box::new(Recorder(irq_log.clone())), SOURCE_IRQ, 1);
        ic.register_consumer("fiq", Box::new(Recorder(fiq_log.clone())), SOURCE_FIQ, 2);
        ic.interrupt_triggered(7);
        assert!(irq_log.lock().unwrap().is_empty());
        assert_eq!(*fiq_log.lock().unwrap(), vec![2]);
    }

    #[test]
    fn only_source_0_or_1_are_valid_registrations() {
        let mut ic = InterruptController::new("ic");
        let log = Arc::new(Mutex::new(Vec::new()));
        ic.register_consumer("c", Box::new(Recorder(log)), 2, 1);
        assert!(ic.downstream.routes.is_empty());
    }
}
