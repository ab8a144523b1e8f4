//! OPNA phase generator

use crate::opna::tables::DETUNE_TABLE;
use bincode::{Decode, Encode};
use opna_common::num::GetBit;

// Block-shifted F-num values are 17 bits
const SHIFTED_F_NUM_MASK: u32 = 0x1FFFF;

// Phase counter is 20 bits
pub(super) const PHASE_COUNTER_MASK: u32 = 0xFFFFF;

pub(super) fn compute_key_code(f_number: u16, block: u8) -> u8 {
    // Bits 4-2: Block
    // Bit 1: F11
    // Bit 0: (F11 & (F10 | F9 | F8)) | (!F11 & F10 & F9 & F8)
    let f11 = f_number.bit(10);
    let f10 = f_number.bit(9);
    let f9 = f_number.bit(8);
    let f8 = f_number.bit(7);
    (block << 2)
        | (u8::from(f11) << 1)
        | u8::from((f11 && (f10 || f9 || f8)) || (!f11 && f10 && f9 && f8))
}

// Phase increment before detune and multiple are applied
#[inline]
pub(super) fn block_f_number_to_increment(block: u8, f_number: u16) -> u32 {
    (u32::from(f_number) << block) >> 1
}

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub(super) struct PhaseGenerator {
    // Register values
    pub(super) multiple: u8,
    pub(super) detune: u8,
    // Internal state
    counter: u32,
}

impl PhaseGenerator {
    pub(super) fn new() -> Self {
        Self { multiple: 0, detune: 0, counter: 0 }
    }

    pub(super) fn reset(&mut self) {
        self.counter = 0;
    }

    #[inline]
    pub(super) fn clock(&mut self, base_increment: u32, key_code: u8) {
        let detune_magnitude: u32 =
            DETUNE_TABLE[key_code as usize][(self.detune & 3) as usize].into();
        let detuned = if self.detune.bit(2) {
            base_increment.wrapping_sub(detune_magnitude)
        } else {
            base_increment.wrapping_add(detune_magnitude)
        } & SHIFTED_F_NUM_MASK;

        // Multiple of 0 means x0.5
        let doubled_multiple = match self.multiple {
            0 => 1,
            m => u32::from(m) << 1,
        };

        self.counter = (self.counter + ((detuned * doubled_multiple) >> 1)) & PHASE_COUNTER_MASK;
    }

    #[inline]
    pub(super) fn counter(&self) -> u32 {
        self.counter
    }

    #[cfg(test)]
    pub(super) fn set_counter(&mut self, counter: u32) {
        self.counter = counter & PHASE_COUNTER_MASK;
    }
}

impl Default for PhaseGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn key_codes() {
        assert_eq!(compute_key_code(0x26A, 4), 16);
        assert_eq!(compute_key_code(0x380, 4), 17);
        assert_eq!(compute_key_code(0x400, 4), 18);
        assert_eq!(compute_key_code(0x480, 4), 19);
        assert_eq!(compute_key_code(0x7FF, 7), 31);
        assert_eq!(compute_key_code(0, 0), 0);
    }

    #[test]
    fn multiple_zero_halves_increment() {
        let mut half = PhaseGenerator::new();
        let mut one = PhaseGenerator { multiple: 1, ..PhaseGenerator::new() };
        let mut three = PhaseGenerator { multiple: 3, ..PhaseGenerator::new() };

        let increment = block_f_number_to_increment(4, 0x26A);
        half.clock(increment, 0);
        one.clock(increment, 0);
        three.clock(increment, 0);

        assert_eq!(one.counter(), increment);
        assert_eq!(half.counter(), increment >> 1);
        assert_eq!(three.counter(), increment * 3);
    }

    #[test]
    fn detune_sign_bit_subtracts() {
        let increment = block_f_number_to_increment(7, 0x7FF);
        let key_code = compute_key_code(0x7FF, 7);

        let mut up = PhaseGenerator { multiple: 1, detune: 3, ..PhaseGenerator::new() };
        let mut down = PhaseGenerator { multiple: 1, detune: 7, ..PhaseGenerator::new() };
        up.clock(increment, key_code);
        down.clock(increment, key_code);

        assert_eq!(up.counter(), increment + 22);
        assert_eq!(down.counter(), increment - 22);
    }

    #[test]
    fn detune_underflow_wraps_to_17_bits() {
        // F-num 0 with negative detune wraps around the 17-bit increment
        let mut phase = PhaseGenerator { multiple: 1, detune: 6, ..PhaseGenerator::new() };
        phase.clock(0, 0);

        assert_eq!(phase.counter(), SHIFTED_F_NUM_MASK);
    }

    #[test]
    fn counter_wraps_at_20_bits() {
        let mut phase = PhaseGenerator { multiple: 15, ..PhaseGenerator::new() };
        let increment = block_f_number_to_increment(7, 0x7FF);
        for _ in 0..100 {
            phase.clock(increment, 31);
            assert!(phase.counter() <= PHASE_COUNTER_MASK);
        }
    }
}
