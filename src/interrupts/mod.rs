//! Interrupt fabric: producers raise IRQs, routed through optional
//! controllers, to consumers (including the CPU).
//!
//! Grounded on `src/controllers/interfaces.py`'s
//! `AbstractInterruptProducer`/`AbstractInterruptConsumer` (spec §4.3):
//! each producer owns its own routing table rather than inheriting storage
//! from a shared base, per the composable-capability refactor in spec §9.

pub mod controller;

pub use controller::InterruptController;

/// A sink for a routed IRQ. Concrete consumers (the CPU, a sub-bus, another
/// controller) override `interrupt_triggered`.
pub trait InterruptConsumer {
    fn interrupt_triggered(&mut self, returned_irq: u32);
}

/// One entry in a producer's per-source routing table.
struct Route {
    returned_irq: u32,
    consumer: Box<dyn InterruptConsumer + Send>,
    consumer_name: String,
}

/// Maintains `source_irq -> [(returned_irq, consumer)]` and dispatches
/// `trigger` calls to every registered consumer, in registration order.
pub struct Producer {
    name: String,
    routes: std::collections::HashMap<u32, Vec<Route>>,
}

impl Producer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            routes: std::collections::HashMap::new(),
        }
    }

    /// Register `consumer` to receive `returned_irq` whenever `source_irq`
    /// fires. Re-registering the same named consumer on the same
    /// `source_irq` updates `returned_irq` in place rather than duplicating
    /// the entry (spec §3 uniqueness invariant).
    pub fn register(
        &mut self,
        consumer_name: impl Into<String>,
        consumer: Box<dyn InterruptConsumer + Send>,
        source_irq: u32,
        returned_irq: u32,
    ) {
        let consumer_name = consumer_name.into();
        let entries = self.routes.entry(source_irq).or_default();
        if let Some(existing) = entries.iter_mut().find(|r| r.consumer_name == consumer_name) {
            log::warn!(
                "{}: consumer {consumer_name} is already registered for source {source_irq}; replacing returned irq with {returned_irq}",
                self.name
            );
            existing.returned_irq = returned_irq;
            existing.consumer = consumer;
            return;
        }
        entries.push(Route {
            returned_irq,
            consumer,
            consumer_name,
        });
    }

    /// Remove every route naming `consumer_name`, optionally scoped to one
    /// `source_irq`. Logs once if nothing was removed.
    pub fn unregister(&mut self, consumer_name: &str, source_irq: Option<u32>) {
        let keys: Vec<u32> = match source_irq {
            Some(irq) => vec![irq],
            None => self.routes.keys().copied().collect(),
        };

        let mut removed = false;
        for key in keys {
            if let Some(entries) = self.routes.get_mut(&key) {
                let before = entries.len();
                entries.retain(|r| r.consumer_name != consumer_name);
                if entries.len() != before {
                    removed = true;
                }
                if entries.is_empty() {
                    self.routes.remove(&key);
                }
            }
        }

        if !removed {
            log::warn!("{}: couldn't find any registered consumer called {consumer_name}", self.name);
        }
    }

    /// Fire `source_irq`: deliver each registered `returned_irq` to its
    /// consumer, in insertion order. Logs and returns if nothing is routed.
    pub fn trigger(&mut self, source_irq: u32) {
        let Some(entries) = self.routes.get_mut(&source_irq) else {
            log::warn!("{}: irq number {source_irq} has no consumers", self.name);
            return;
        };
        for route in entries.iter_mut() {
            route.consumer.interrupt_triggered(route.returned_irq);
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
    fn trigger_delivers_returned_irq_exactly_once() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut producer = Producer::new("p");
        producer.register("c", Box::new(Recorder(log.clone())), 5, 11);
        producer.trigger(5);
        assert_eq!(*log.lock().unwrap(), vec![11]);
    }

    #[test]
    fn reregistering_same_consumer_updates_in_place() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut producer = Producer::new("p");
        producer.register("c", Box::new(Recorder(log.clone())), 5, 11);
        producer.register("c", Box::new(Recorder(log.clone())), 5, 22);
        producer.trigger(5);
        assert_eq!(*log.lock().unwrap(), vec![22]);
        assert_eq!(producer.routes.get(&5).unwrap().len(), 1);
    }

    #[test]
    fn unregister_missing_consumer_is_a_noop_with_a_warning() {
        let mut producer = Producer::new("p");
        producer.unregister("nobody", None);
        assert!(producer.routes.is_empty());
    }
}
