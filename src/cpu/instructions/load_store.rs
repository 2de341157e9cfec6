//! `LDR`/`LDRB`/`STR` (single transfer) and `LDM`/`STM`/`PUSH`/`POP`
//! (block transfer) (spec §4.5.2).
//!
//! `PUSH`/`POP`'s short single-register encodings (`STR Rt,[SP,#-4]!` /
//! `LDR Rt,[SP],#4`) aren't special-cased: they're ordinary single data
//! transfers with `Rn=13` and the matching `P/U/W` bits, so the generic
//! handler already produces the delegated behavior spec §4.5.2 describes.

use crate::bus::AddressableNode;
use crate::cpu::decode::ExecuteError;
use crate::cpu::shifter;
use crate::cpu::CpuCore;

use super::SkipAdvance;

/// `(index, add, wback) = (P, U, ¬P ∨ W)` (spec §4.5.2).
fn addressing(op: u32) -> (bool, bool, bool) {
    let p = op & (1 << 24) != 0;
    let u = op & (1 << 23) != 0;
    let w = op & (1 << 21) != 0;
    (p, u, !p || w)
}

fn offset_value(cpu: &CpuCore, op: u32) -> u32 {
    if op & (1 << 25) == 0 {
        op & 0xFFF
    } else {
        let rm = (op & 0xF) as u8;
        let rm_val = cpu.register_read(rm);
        let shift_type_bits = (op >> 5) & 0x3;
        let imm5 = (op >> 7) & 0x1F;
        let (shift_type, amount) = shifter::decode_imm_shift(shift_type_bits, imm5);
        let (result, _) = shifter::shift_with_carry(rm_val, shift_type, amount, cpu.flag_c());
        result
    }
}

/// Single data transfer: `LDR`/`LDRB`/`STR`, immediate or register offset,
/// including the `Rn=15` literal-pool form.
pub fn execute_single_transfer(
    cpu: &mut CpuCore,
    bus: &mut dyn AddressableNode,
    op: u32,
) -> Result<SkipAdvance, ExecuteError> {
    let byte = op & (1 << 22) != 0;
    let load = op & (1 << 20) != 0;
    let rn = ((op >> 16) & 0xF) as u8;
    let rt = ((op >> 12) & 0xF) as u8;
    let (pre_index, add, wback) = addressing(op);

    let base = if rn == 15 { cpu.pc().wrapping_add(8) } else { cpu.register_read(rn) };
    let offset = offset_value(cpu, op);
    let offset_addr = if add { base.wrapping_add(offset) } else { base.wrapping_sub(offset) };
    let address = if pre_index { offset_addr } else { base };

    if load {
        let word = cpu.mmu_read(bus, address, false)?;
        let value = if byte { word & 0xFF } else { word };
        if wback {
            cpu.register_write(rn, offset_addr);
        }
        if rt == 15 {
            if byte {
                return Err(ExecuteError::Unpredictable(op, "LDRB into PC"));
            }
            if value & 1 != 0 {
                return Err(ExecuteError::Unpredictable(op, "LoadWritePC into Thumb state"));
            }
            cpu.regs.set_pc(value & !0x3);
            return Ok(true);
        }
        cpu.register_write(rt, value);
    } else {
        let value = cpu.register_read(rt);
        let stored = if byte { value & 0xFF } else { value };
        cpu.mmu_write(bus, address, stored, false)?;
        if wback {
            cpu.register_write(rn, offset_addr);
        }
    }
    Ok(false)
}

/// `LDM`/`STM` (and the `PUSH`/`POP` multi-register aliases, which are the
/// same encoding with `Rn=13`).
pub fn execute_block_transfer(
    cpu: &mut CpuCore,
    bus: &mut dyn AddressableNode,
    op: u32,
) -> Result<SkipAdvance, ExecuteError> {
    let pre_index = op & (1 << 24) != 0;
    let up = op & (1 << 23) != 0;
    let wback = op & (1 << 21) != 0;
    let load = op & (1 << 20) != 0;
    let rn = ((op >> 16) & 0xF) as u8;
    let register_list = op & 0xFFFF;

    let count = register_list.count_ones();
    if count == 0 {
        return Err(ExecuteError::Unpredictable(op, "LDM/STM with an empty register list"));
    }

    let base = cpu.register_read(rn);
    let start = if up { base } else { base.wrapping_sub(count * 4) };
    let mut address = start.wrapping_add(if pre_index == up { 4 } else { 0 });

    let mut pc_loaded = false;
    for reg in 0u8..16 {
        if register_list & (1 << reg) == 0 {
            continue;
        }
        if load {
            let value = cpu.mmu_read(bus, address, false)?;
            if reg == 15 {
                pc_loaded = true;
            }
            cpu.register_write(reg, value);
        } else {
            let value = cpu.register_read(reg);
            cpu.mmu_write(bus, address, value, false)?;
        }
        address = address.wrapping_add(4);
    }

    if wback {
        let new_base = if up { base.wrapping_add(count * 4) } else { base.wrapping_sub(count * 4) };
        cpu.register_write(rn, new_base);
    }

    if pc_loaded {
        let pc = cpu.pc();
        if pc & 1 != 0 {
            return Err(ExecuteError::Unpredictable(op, "LoadWritePC into Thumb state"));
        }
        cpu.regs.set_pc(pc & !0x3);
        Ok(true)
    } else {
        Ok(false)
    }
}
