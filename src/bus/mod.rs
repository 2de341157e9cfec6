//! Addressable Node abstraction and the bus/interconnect built on top of it.
//!
//! Every memory-mapped entity in the SoC — RAM, ROM, the MMU's physical-side
//! view, a banked sub-bus — satisfies [`AddressableNode`]. A [`Bus`] is
//! itself an `AddressableNode`, so buses compose: a slave of one bus can be
//! another bus.

pub mod interconnect;
pub mod memory;

pub use interconnect::{Bus, BusBuilder};
pub use memory::{Ram, Rom};

use thiserror::Error;

/// Errors surfaced by an [`AddressableNode`] access.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    /// No self-served region or registered slave claims this address.
    #[error("address {addr:#010x} is out of range (bank {bank:?})")]
    OutOfRange { addr: u32, bank: Option<String> },

    /// A banked lookup named a bank with no region/slave list and
    /// `implicit` fallback was disabled for this bus.
    #[error("bank {bank:?} not found")]
    BankNotFound { bank: String },

    /// A runtime write targeted read-only memory (ROM without
    /// [`Rom::init_write`]).
    #[error("address {addr:#010x} is read-only memory")]
    ReadOnlyMemory { addr: u32 },
}

/// The capability every memory-mapped entity in the SoC implements.
///
/// `bank` identifies a per-core or per-security-state view for components
/// that need one (see [`Bus::Banked`](interconnect::Bus)); components that
/// don't care about banking simply ignore the parameter.
pub trait AddressableNode {
    fn read(&mut self, addr: u32, bank: Option<&str>) -> Result<u32, BusError>;
    fn write(&mut self, addr: u32, value: u32, bank: Option<&str>) -> Result<(), BusError>;

    /// Convenience for callers that never bank.
    fn read_default(&mut self, addr: u32) -> Result<u32, BusError> {
        self.read(addr, None)
    }

    /// Convenience for callers that never bank.
    fn write_default(&mut self, addr: u32, value: u32) -> Result<(), BusError> {
        self.write(addr, value, None)
    }
}

impl<T: AddressableNode + ?Sized> AddressableNode for Box<T> {
    fn read(&mut self, addr: u32, bank: Option<&str>) -> Result<u32, BusError> {
        (**self).read(addr, bank)
    }
    fn write(&mut self, addr: u32, value: u32, bank: Option<&str>) -> Result<(), BusError> {
        (**self).write(addr, value, bank)
    }
}

/// The identity of the currently-executing engine, used by
/// [`interconnect::Bus::ImplicitBanked`] to pick a per-core translation view
/// without threading a bank parameter through every call site.
///
/// Set once by the owning thread at CPU construction time; read by the
/// implicit-banked bus on every access. Kept as an explicit helper (rather
/// than ambient thread-local state reached for by every call site) so the
/// "who am I" question has exactly one answer per thread.
pub mod engine_id {
    use std::cell::RefCell;

    thread_local! {
        static ENGINE_ID: RefCell<Option<String>> = const { RefCell::new(None) };
    }

    pub fn set(id: impl Into<String>) {
        ENGINE_ID.with(|e| *e.borrow_mut() = Some(id.into()));
    }

    pub fn get() -> Option<String> {
        ENGINE_ID.with(|e| e.borrow().clone())
    }
}
