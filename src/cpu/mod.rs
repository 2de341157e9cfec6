//! The CPU core: banked registers, CPSR/SPSR, CP15, decoder, and the
//! exception-entry sequencer (spec §4.5).
//!
//! Grounded on the teacher's `CpuCore` (`src/core/cpu.rs`): a single struct
//! owning register and status storage, with `read_control_register`/
//! `write_control_register`-style gated access to coprocessor state, and
//! `trigger_bus_error`/`handle_mmu_fault`-style conversion of a translation
//! fault into saved fault-status state plus a pending exception.

pub mod cp15;
pub mod decode;
pub mod exceptions;
pub mod execute;
pub mod instructions;
pub mod pending;
pub mod registers;
pub mod shifter;
pub mod types;

pub use pending::{ExceptionConsumer, PendingExceptions};
pub use types::{ExceptionKind, Mode};

use std::sync::Arc;

use thiserror::Error;

use crate::bus::{AddressableNode, BusError};
use crate::gdb::rungate::RunGate;
use crate::mmu::{self, TranslationContext};
use cp15::{Cp15, Cp15Error, Selector as Cp15Selector};
use registers::RegisterFile;
use types::cpsr;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MemoryFault {
    #[error(transparent)]
    Translation(#[from] mmu::Fault),
    #[error(transparent)]
    Bus(#[from] BusError),
}

fn spsr_slot(mode: Mode) -> Option<usize> {
    match mode {
        Mode::Svc => Some(0),
        Mode::Monitor => Some(1),
        Mode::Abort => Some(2),
        Mode::Undefined => Some(3),
        Mode::Irq => Some(4),
        Mode::Fiq => Some(5),
        _ => None,
    }
}

pub struct CpuCore {
    pub regs: RegisterFile,
    pub cpsr: u32,
    spsr: [u32; 6],
    pub cp15: Cp15,
    /// Secure/Non-secure world; reset starts Secure per the Security
    /// Extensions model.
    pub secure: bool,
    pending: Arc<PendingExceptions>,
    pub run_gate: Option<Arc<RunGate>>,
}

impl CpuCore {
    /// Returns the core plus the shared pending-exception latch, so the
    /// caller can wrap it in an [`ExceptionConsumer`] and register it on
    /// the interrupt fabric's IRQ/FIQ lines.
    pub fn new() -> (CpuCore, Arc<PendingExceptions>) {
        let pending = Arc::new(PendingExceptions::new());
        let core = CpuCore {
            regs: RegisterFile::new(),
            cpsr: Mode::Svc.bits() | (1 << cpsr::I) | (1 << cpsr::F),
            spsr: [0; 6],
            cp15: Cp15::new(),
            secure: true,
            pending: pending.clone(),
            run_gate: None,
        };
        (core, pending)
    }

    pub fn reset(&mut self, entry_pc: u32) {
        self.cpsr = Mode::Svc.bits() | (1 << cpsr::I) | (1 << cpsr::F);
        self.secure = true;
        self.regs.set_pc(entry_pc);
    }

    pub fn mode(&self) -> Mode {
        Mode::from_bits(self.cpsr).expect("CPSR mode field must always hold a legal encoding")
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.cpsr = (self.cpsr & !cpsr::MODE_MASK) | mode.bits();
    }

    pub fn flag_n(&self) -> bool {
        self.cpsr & (1 << cpsr::N) != 0
    }
    pub fn flag_z(&self) -> bool {
        self.cpsr & (1 << cpsr::Z) != 0
    }
    pub fn flag_c(&self) -> bool {
        self.cpsr & (1 << cpsr::C) != 0
    }
    pub fn flag_v(&self) -> bool {
        self.cpsr & (1 << cpsr::V) != 0
    }

    /// Overwrite N/Z/C/V, clearing first — the explicit non-bug variant of
    /// spec §9.2.
    pub fn set_nzcv(&mut self, n: bool, z: bool, c: bool, v: bool) {
        self.cpsr &= !((1 << cpsr::N) | (1 << cpsr::Z) | (1 << cpsr::C) | (1 << cpsr::V));
        self.cpsr |= (n as u32) << cpsr::N;
        self.cpsr |= (z as u32) << cpsr::Z;
        self.cpsr |= (c as u32) << cpsr::C;
        self.cpsr |= (v as u32) << cpsr::V;
    }

    pub fn spsr(&self) -> Option<u32> {
        spsr_slot(self.mode()).map(|i| self.spsr[i])
    }

    pub fn set_spsr(&mut self, value: u32) {
        if let Some(i) = spsr_slot(self.mode()) {
            self.spsr[i] = value;
        }
    }

    /// `register_read`/`register_write` in the original resolve through
    /// the current CPSR mode; R15 reads the raw PC (handlers that need the
    /// ARM-state `PC+8` pipeline view add the 8 explicitly, per spec
    /// §4.5.2's branch-offset wording).
    pub fn register_read(&self, reg: u8) -> u32 {
        self.regs.read(self.mode(), reg)
    }

    pub fn register_write(&mut self, reg: u8, value: u32) {
        self.regs.write(self.mode(), reg, value);
    }

    pub fn pc(&self) -> u32 {
        self.regs.pc()
    }

    pub fn raise(&self, kind: ExceptionKind) {
        self.pending.raise(kind);
    }

    fn translation_context(&self) -> TranslationContext {
        TranslationContext {
            sctlr_m: self.cp15.sctlr_m(self.secure),
            ttbr0: self.cp15.ttbr0(self.secure),
            ttbr1: self.cp15.ttbr1(self.secure),
            ttbcr_n: self.cp15.ttbcr_n(self.secure),
            dacr: self.cp15.dacr(self.secure),
            secure: self.secure,
            privileged: self.mode().is_privileged(),
        }
    }

    /// `mmu_read(v, instruction)` (spec §4.4 final paragraph): translate,
    /// converting a fault into latched CP15 fault state plus a pending
    /// Abort, then read the physical bus.
    pub fn mmu_read(&mut self, bus: &mut dyn AddressableNode, v: u32, instruction: bool) -> Result<u32, MemoryFault> {
        let ctx = self.translation_context();
        let phys = mmu::translate(&ctx, bus, v, instruction, false).map_err(|fault| {
            self.latch_abort(fault, instruction, v, false);
            fault
        })?;
        Ok(bus.read_default(phys)?)
    }

    pub fn mmu_write(
        &mut self,
        bus: &mut dyn AddressableNode,
        v: u32,
        value: u32,
        instruction: bool,
    ) -> Result<(), MemoryFault> {
        let ctx = self.translation_context();
        let phys = mmu::translate(&ctx, bus, v, instruction, true).map_err(|fault| {
            self.latch_abort(fault, instruction, v, true);
            fault
        })?;
        bus.write_default(phys, value)?;
        Ok(())
    }

    fn latch_abort(&mut self, fault: mmu::Fault, instruction: bool, addr: u32, write: bool) {
        self.cp15
            .latch_fault(self.secure, instruction, addr, fault.status_code(), fault.domain, write);
        let kind = if instruction {
            ExceptionKind::PrefetchAbort
        } else {
            ExceptionKind::DataAbort
        };
        self.raise(kind);
    }

    pub fn cp15_read(&self, crn: u8, opc1: u8, crm: u8, opc2: u8) -> Result<u32, Cp15Error> {
        let selector = Cp15Selector::from_fields(crn, opc1, crm, opc2).ok_or(Cp15Error::NoSuchRegister {
            crn,
            opc1,
            crm,
            opc2,
        })?;
        self.cp15.read(selector, self.secure, self.mode().is_privileged())
    }

    pub fn cp15_write(&mut self, crn: u8, opc1: u8, crm: u8, opc2: u8, value: u32) -> Result<(), Cp15Error> {
        let selector = Cp15Selector::from_fields(crn, opc1, crm, opc2).ok_or(Cp15Error::NoSuchRegister {
            crn,
            opc1,
            crm,
            opc2,
        })?;
        let secure = self.secure;
        let privileged = self.mode().is_privileged();
        self.cp15.write(selector, value, secure, privileged)
    }

    /// Exception-entry sequencer (spec §4.5.4).
    pub fn enter_exception(&mut self, kind: ExceptionKind) {
        let scr = exceptions::ScrBits::from_word(self.cp15.scr());
        let routed = exceptions::route(kind, self.secure, &scr);

        let saved_cpsr = self.cpsr;
        let saved_ip = self.pc();
        let thumb = self.cpsr & (1 << cpsr::T) != 0;
        let lr_value = exceptions::link_value(kind, saved_ip, thumb);

        let new_cpsr = exceptions::apply_entry_cpsr(
            self.cpsr,
            &routed,
            self.cp15.sctlr_te(self.secure),
            self.cp15.sctlr_ee(self.secure),
        );

        self.cpsr = new_cpsr;
        if routed.mode.has_spsr() {
            self.set_spsr(saved_cpsr);
        }
        self.register_write(14, lr_value);

        let entering_monitor = routed.mode == Mode::Monitor;
        let base = exceptions::vector_base(
            entering_monitor,
            self.cp15.mvbar(),
            self.cp15.vbar(self.secure),
            self.cp15.sctlr_v(self.secure),
        );
        self.regs.set_pc(base.wrapping_add(kind.vector_offset()));
    }

    /// Scan and service any pending exception (spec §4.5.1 step 1).
    pub fn service_pending(&mut self) {
        if let Some(kind) = self.pending.take_first() {
            self.enter_exception(kind);
        }
    }
}
