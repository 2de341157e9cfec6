//! Barrel shifter and flag-bearing addition (spec §4.5.2, §4.5.3).
//!
//! `add_with_carry` is the single source of truth for N/Z/C/V on every
//! arithmetic data-processing form, per the REDESIGN FLAGS note in spec §9.5
//! — including `SUB`/`CMP`, which call it with an inverted second operand.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftType {
    Lsl,
    Lsr,
    Asr,
    Ror,
    Rrx,
}

/// `ARMExpandImm_C`: rotate the low 8 bits of `imm12` right by `2 *
/// imm12[11:8]`, returning the new carry-out.
pub fn arm_expand_imm_c(imm12: u32, carry_in: bool) -> (u32, bool) {
    let rotation = 2 * ((imm12 >> 8) & 0xF);
    let imm8 = imm12 & 0xFF;
    if rotation == 0 {
        (imm8, carry_in)
    } else {
        let result = imm8.rotate_right(rotation);
        (result, (result >> 31) & 1 != 0)
    }
}

/// `DecodeImmShift`: `imm5=0` maps `LSR`/`ASR` to shift-by-32 and `ROR` to
/// `RRX` (spec §4.5.2).
pub fn decode_imm_shift(shift_type: u32, imm5: u32) -> (ShiftType, u32) {
    match shift_type & 0x3 {
        0 => (ShiftType::Lsl, imm5),
        1 => (ShiftType::Lsr, if imm5 == 0 { 32 } else { imm5 }),
        2 => (ShiftType::Asr, if imm5 == 0 { 32 } else { imm5 }),
        _ => {
            if imm5 == 0 {
                (ShiftType::Rrx, 1)
            } else {
                (ShiftType::Ror, imm5)
            }
        }
    }
}

/// `DecodeRegShift`: the shift type only, amount comes from a register.
pub fn decode_reg_shift(shift_type: u32) -> ShiftType {
    match shift_type & 0x3 {
        0 => ShiftType::Lsl,
        1 => ShiftType::Lsr,
        2 => ShiftType::Asr,
        _ => ShiftType::Ror,
    }
}

/// Apply `shift_type` by `amount` to `value`, returning `(result,
/// carry_out)`.
pub fn shift_with_carry(value: u32, shift_type: ShiftType, amount: u32, carry_in: bool) -> (u32, bool) {
    match shift_type {
        ShiftType::Lsl => {
            if amount == 0 {
                (value, carry_in)
            } else if amount < 32 {
                (value << amount, (value >> (32 - amount)) & 1 != 0)
            } else if amount == 32 {
                (0, value & 1 != 0)
            } else {
                (0, false)
            }
        }
        ShiftType::Lsr => {
            if amount == 0 {
                (value, carry_in)
            } else if amount < 32 {
                (value >> amount, (value >> (amount - 1)) & 1 != 0)
            } else if amount == 32 {
                (0, (value >> 31) & 1 != 0)
            } else {
                (0, false)
            }
        }
        ShiftType::Asr => {
            if amount == 0 {
                (value, carry_in)
            } else if amount < 32 {
                (((value as i32) >> amount) as u32, (value >> (amount - 1)) & 1 != 0)
            } else {
                let filled = if (value >> 31) & 1 != 0 { u32::MAX } else { 0 };
                (filled, (value >> 31) & 1 != 0)
            }
        }
        ShiftType::Ror => {
            if amount == 0 {
                (value, carry_in)
            } else {
                let amount = amount % 32;
                if amount == 0 {
                    (value, (value >> 31) & 1 != 0)
                } else {
                    (value.rotate_right(amount), (value >> (amount - 1)) & 1 != 0)
                }
            }
        }
        ShiftType::Rrx => {
            let result = (value >> 1) | ((carry_in as u32) << 31);
            (result, value & 1 != 0)
        }
    }
}

/// `AddWithCarry(a, b, carry_in)`: 32-bit truncated sum plus carry/overflow
/// extraction via a 64-bit widen-and-compare (spec §9.6 pins the 32-bit
/// truncation mask explicitly; the source's `(1<<31)-1` is a bug).
pub fn add_with_carry(a: u32, b: u32, carry_in: bool) -> (u32, bool, bool) {
    let unsigned_sum = a as u64 + b as u64 + carry_in as u64;
    let result = (unsigned_sum & 0xFFFF_FFFF) as u32;
    let carry_out = unsigned_sum > 0xFFFF_FFFF;

    let signed_sum = a as i32 as i64 + b as i32 as i64 + carry_in as i64;
    let overflow = signed_sum != result as i32 as i64;

    (result, carry_out, overflow)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_with_carry_pins_32_bit_truncation() {
        let (result, carry, overflow) = add_with_carry(0xFFFF_FFFF, 1, false);
        assert_eq!(result, 0);
        assert!(carry);
        assert!(!overflow);
    }

    #[test]
    fn add_with_carry_detects_signed_overflow_both_directions() {
        let (_, _, overflow) = add_with_carry(0x7FFF_FFFF, 1, false);
        assert!(overflow);
        let (_, _, overflow) = add_with_carry(0x8000_0000, 0xFFFF_FFFF, false);
        assert!(overflow);
    }

    #[test]
    fn subtraction_is_add_with_carry_of_inverted_operand() {
        let (result, carry, _) = add_with_carry(5, !3u32, true);
        assert_eq!(result, 2);
        assert!(carry); // no borrow
        let (result, carry, _) = add_with_carry(3, !5u32, true);
        assert_eq!(result, 0xFFFF_FFFE); // -2 as u32
        assert!(!carry); // borrow occurred
    }

    #[test]
    fn rrx_shifts_in_the_incoming_carry_and_outputs_bit_zero() {
        let (result, carry_out) = shift_with_carry(0b10, ShiftType::Rrx, 1, true);
        assert_eq!(result, 0x8000_0001);
        assert!(!carry_out);
    }

    #[test]
    fn lsr_by_32_returns_zero_and_carries_out_the_sign_bit() {
        let (result, carry_out) = shift_with_carry(0x8000_0000, ShiftType::Lsr, 32, false);
        assert_eq!(result, 0);
        assert!(carry_out);
    }

    #[test]
    fn imm_shift_decode_maps_zero_to_shift_32_or_rrx() {
        assert_eq!(decode_imm_shift(1, 0), (ShiftType::Lsr, 32));
        assert_eq!(decode_imm_shift(2, 0), (ShiftType::Asr, 32));
        assert_eq!(decode_imm_shift(3, 0), (ShiftType::Rrx, 1));
    }

    #[test]
    fn expand_imm_rotates_low_byte() {
        // imm12=0xFF1: imm8=0xF1, rotation=2*0xF=30, i.e. rotate_right(30)
        // == rotate_left(2).
        let (value, carry) = arm_expand_imm_c(0xFF1, false);
        assert_eq!(value, 0xF1u32.rotate_right(30));
        assert_eq!(carry, (value >> 31) & 1 != 0);
    }

    #[test]
    fn expand_imm_with_high_rotation_carries_out_the_sign_bit() {
        // imm12=0x801: imm8=1, rotation=2*8=16 -> 0x0001_0000, bit31=0.
        let (value, carry) = arm_expand_imm_c(0x801, false);
        assert_eq!(value, 0x0001_0000);
        assert!(!carry);
    }
}
