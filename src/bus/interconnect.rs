//! The address-decoding bus/interconnect.
//!
//! Mirrors `src/buses/simple_bus.py` / `dummy_bus.py` from the original
//! implementation: a list of `(start, end, offset, slave)` regions, checked
//! in registration order, with an optional self-served region list checked
//! first. Three policies are supported (spec §4.1): a flat single region
//! list, a banked bus keyed by an explicit bank name with optional
//! `"default"` fallback, and an implicit-banked bus that reads the bank key
//! from [`super::engine_id`].
//!
//! A bus doubles as an [`crate::interrupts::InterruptConsumer`] — triggering
//! it just re-triggers its own downstream [`crate::interrupts::Producer`],
//! matching `SimpleBus.interrupt_triggered` in the original (composition
//! instead of the original's multiple inheritance, per spec §9).

use std::collections::HashMap;

use super::{AddressableNode, BusError};
use crate::interrupts::{InterruptConsumer, Producer};

struct Slave {
    start: u32,
    end: u32,
    offset: u32,
    node: Box<dyn AddressableNode + Send>,
}

enum Policy {
    Flat(Vec<Slave>),
    Banked {
        banks: HashMap<String, Vec<Slave>>,
        implicit_fallback: bool,
    },
    ImplicitBanked {
        banks: HashMap<String, Vec<Slave>>,
        implicit_fallback: bool,
    },
}

/// An address-decoding interconnect. See module docs for the three
/// supported policies.
pub struct Bus {
    name: String,
    policy: Policy,
    /// Registration-time multiplier applied to `(start, end)`. Default `1`;
    /// set to `1024` to reproduce the original's byte<->"unit" convention
    /// (spec §9 Open Question 1).
    pub address_scale: u32,
    self_region: Option<(u32, u32, Box<dyn AddressableNode + Send>)>,
    pub producer: Producer,
}

impl Bus {
    pub fn flat(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            policy: Policy::Flat(Vec::new()),
            address_scale: 1,
            self_region: None,
            producer: Producer::new("bus"),
        }
    }

    pub fn banked(name: impl Into<String>, implicit_fallback: bool) -> Self {
        Self {
            name: name.into(),
            policy: Policy::Banked {
                banks: HashMap::new(),
                implicit_fallback,
            },
            address_scale: 1,
            self_region: None,
            producer: Producer::new("bus"),
        }
    }

    pub fn implicit_banked(name: impl Into<String>, implicit_fallback: bool) -> Self {
        Self {
            name: name.into(),
            policy: Policy::ImplicitBanked {
                banks: HashMap::new(),
                implicit_fallback,
            },
            address_scale: 1,
            self_region: None,
            producer: Producer::new("bus"),
        }
    }

    pub fn with_address_scale(mut self, scale: u32) -> Self {
        self.address_scale = scale;
        self
    }

    /// Register a region this bus handles directly rather than delegating.
    /// Self-served regions win over any slave (spec §4.1 tie-break).
    pub fn serve_self(&mut self, start: u32, end: u32, node: Box<dyn AddressableNode + Send>) {
        self.self_region = Some((start * self.address_scale, end * self.address_scale, node));
    }

    /// Attach a slave at `[start, end)` (scaled by `address_scale`),
    /// translating accesses by `offset` before delegating. Registration is
    /// append-only; the first matching entry wins.
    pub fn attach(&mut self, start: u32, end: u32, offset: u32, node: Box<dyn AddressableNode + Send>) {
        self.attach_banked("default", start, end, offset, node)
    }

    /// As [`Self::attach`] but into a named bank's region list. Valid for
    /// [`Self::banked`] and [`Self::implicit_banked`] buses.
    pub fn attach_banked(
        &mut self,
        bank: &str,
        start: u32,
        end: u32,
        offset: u32,
        node: Box<dyn AddressableNode + Send>,
    ) {
        let scale = self.address_scale;
        let slave = Slave {
            start: start * scale,
            end: end * scale,
            offset,
            node,
        };
        match &mut self.policy {
            Policy::Flat(slaves) => slaves.push(slave),
            Policy::Banked { banks, .. } | Policy::ImplicitBanked { banks, .. } => {
                banks.entry(bank.to_string()).or_default().push(slave)
            }
        }
    }

    fn resolve_slaves(&mut self, requested_bank: Option<&str>) -> Result<&mut Vec<Slave>, BusError> {
        match &mut self.policy {
            Policy::Flat(slaves) => Ok(slaves),
            Policy::Banked {
                banks,
                implicit_fallback,
            } => resolve_banked(banks, *implicit_fallback, requested_bank.unwrap_or("default")),
            Policy::ImplicitBanked {
                banks,
                implicit_fallback,
            } => {
                let key = super::engine_id::get().unwrap_or_else(|| "default".to_string());
                resolve_banked(banks, *implicit_fallback, &key)
            }
        }
    }

    fn dispatch<R>(
        &mut self,
        addr: u32,
        bank: Option<&str>,
        op: impl FnOnce(&mut dyn AddressableNode, u32) -> Result<R, BusError>,
    ) -> Result<R, BusError> {
        if let Some((start, end, node)) = &mut self.self_region {
            if addr >= *start && addr < *end {
                return op(node.as_mut(), addr);
            }
        }

        let name = self.name.clone();
        let slaves = self.resolve_slaves(bank)?;
        for slave in slaves.iter_mut() {
            if addr >= slave.start && addr < slave.end {
                let translated = addr - slave.start + slave.offset;
                return op(slave.node.as_mut(), translated);
            }
        }

        log::warn!("{name}: address {addr:#010x} is out of range");
        Err(BusError::OutOfRange {
            addr,
            bank: bank.map(str::to_string),
        })
    }
}

fn resolve_banked<'a>(
    banks: &'a mut HashMap<String, Vec<Slave>>,
    implicit_fallback: bool,
    bank: &str,
) -> Result<&'a mut Vec<Slave>, BusError> {
    let has_entries = banks.get(bank).is_some_and(|v| !v.is_empty());
    if has_entries {
        return Ok(banks.get_mut(bank).unwrap());
    }
    if implicit_fallback {
        return Ok(banks.entry("default".to_string()).or_default());
    }
    Err(BusError::BankNotFound {
        bank: bank.to_string(),
    })
}

impl AddressableNode for Bus {
    fn read(&mut self, addr: u32, bank: Option<&str>) -> Result<u32, BusError> {
        self.dispatch(addr, bank, |node, a| node.read(a, None))
    }

    fn write(&mut self, addr: u32, value: u32, bank: Option<&str>) -> Result<(), BusError> {
        self.dispatch(addr, bank, |node, a| node.write(a, value, None))
    }
}

impl InterruptConsumer for Bus {
    fn interrupt_triggered(&mut self, returned_irq: u32) {
        self.producer.trigger(returned_irq);
    }
}

/// Convenience constructor matching the teacher's naming convention for a
/// simple flat bus builder pattern.
pub struct BusBuilder;

impl BusBuilder {
    pub fn flat(name: impl Into<String>) -> Bus {
        Bus::flat(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::Ram;

    #[test]
    fn decodes_to_first_matching_slave_with_offset() {
        let mut bus = Bus::flat("bus");
        bus.attach(0x1000, 0x2000, 0, Box::new(Ram::new("a", 4)));
        bus.attach(0x2000, 0x3000, 0x1000, Box::new(Ram::new("b", 4)));

        bus.write_default(0x1004, 0xAAAA_AAAA).unwrap();
        assert_eq!(bus.read_default(0x1004).unwrap(), 0xAAAA_AAAA);

        // Second slave translates by its offset before reaching RAM "b".
        bus.write_default(0x2004, 0xBBBB_BBBB).unwrap();
        assert_eq!(bus.read_default(0x2004).unwrap(), 0xBBBB_BBBB);
    }

    #[test]
    fn out_of_range_fails_without_mutating_anything() {
        let mut bus = Bus::flat("bus");
        bus.attach(0, 0x1000, 0, Box::new(Ram::new("a", 4)));
        assert!(matches!(
            bus.write_default(0x2000, 42),
            Err(BusError::OutOfRange { addr: 0x2000, .. })
        ));
    }

    #[test]
    fn banked_bus_falls_back_to_default_when_implicit() {
        let mut bus = Bus::banked("bus", true);
        bus.attach_banked("default", 0, 0x1000, 0, Box::new(Ram::new("a", 4)));
        assert!(bus.read(0x10, Some("secure")).is_ok());
    }

    #[test]
    fn banked_bus_rejects_missing_bank_when_not_implicit() {
        let mut bus = Bus::banked("bus", false);
        bus.attach_banked("default", 0, 0x1000, 0, Box::new(Ram::new("a", 4)));
        assert!(matches!(
            bus.read(0x10, Some("secure")),
            Err(BusError::BankNotFound { .. })
        ));
    }

    #[test]
    fn address_scale_multiplies_registered_bounds() {
        let mut bus = Bus::flat("bus").with_address_scale(1024);
        bus.attach(0, 4, 0, Box::new(Ram::new("a", 4)));
        assert!(bus.read_default(0).is_ok());
        assert!(bus.read_default(4095).is_ok());
        assert!(bus.read_default(4096).is_err());
    }
}
