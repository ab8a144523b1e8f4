//! OPNA FM operator, also referred to as a slot

use crate::opna::envelope::EnvelopeGenerator;
use crate::opna::phase::PhaseGenerator;
use crate::opna::tables::{EXP_TABLE, EXP_TABLE_BITS, LOG_SINE_HIRES_TABLE, LOG_SINE_TABLE};
use bincode::{Decode, Encode};
use opna_common::num::GetBit;
use opna_config::WaveformResolution;
use std::cmp;

// Int part of the attenuation is applied as a right shift to a 13-bit value; 13 or more is silence
const MAX_ATTENUATION_SHIFT: u32 = 13;

// Split a phase index into a quarter-wave table lookup plus the sign of the half-wave
#[inline]
fn quarter_wave_lookup(table: &[u16], index: u32, bits: u32) -> (u16, bool) {
    let negative = index.bit((bits + 1) as u8);
    let index = if index.bit(bits as u8) { !index } else { index };
    (table[(index & ((1 << bits) - 1)) as usize], negative)
}

// Attenuation is interpreted as a fixed-point number on a log2 scale, 8 fractional bits
#[inline]
fn attenuation_to_amplitude(attenuation: u32) -> i16 {
    let shift = cmp::min(attenuation >> EXP_TABLE_BITS, MAX_ATTENUATION_SHIFT);
    let fract_part = attenuation & ((1 << EXP_TABLE_BITS) - 1);
    ((EXP_TABLE[fract_part as usize] << 2) >> shift) as i16
}

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct FmOperator {
    phase: PhaseGenerator,
    envelope: EnvelopeGenerator,
    total_level: u8,
    // Copied from the owning channel's block/F-number
    key_code: u8,
}

impl FmOperator {
    pub(super) fn new() -> Self {
        Self {
            phase: PhaseGenerator::new(),
            envelope: EnvelopeGenerator::new(),
            total_level: 0,
            key_code: 0,
        }
    }

    pub fn set_detune(&mut self, detune: u8) {
        self.phase.detune = detune & 0x07;
    }

    pub fn set_multiple(&mut self, multiple: u8) {
        self.phase.multiple = multiple & 0x0F;
    }

    pub fn set_total_level(&mut self, total_level: u8) {
        self.total_level = total_level & 0x7F;
    }

    /// Takes effect the next time the envelope rate is recomputed, e.g. on an attack rate write,
    /// a block/F-number change, or an envelope state transition.
    pub fn set_key_scale(&mut self, key_scale: u8) {
        self.envelope.key_scale = key_scale & 0x03;
    }

    pub fn set_attack_rate(&mut self, attack_rate: u8) {
        self.envelope.set_attack_rate(attack_rate & 0x1F, self.key_code);
    }

    pub fn set_decay_rate(&mut self, decay_rate: u8) {
        self.envelope.set_decay_rate(decay_rate & 0x1F, self.key_code);
    }

    pub fn set_sustain_rate(&mut self, sustain_rate: u8) {
        self.envelope.set_sustain_rate(sustain_rate & 0x1F, self.key_code);
    }

    pub fn set_sustain_level(&mut self, sustain_level: u8) {
        self.envelope.sustain_level = sustain_level & 0x0F;
    }

    pub fn set_release_rate(&mut self, release_rate: u8) {
        self.envelope.set_release_rate(release_rate & 0x0F, self.key_code);
    }

    pub(super) fn update_key_code(&mut self, key_code: u8) {
        self.key_code = key_code;
        self.envelope.update_rate(key_code);
    }

    pub(super) fn key_on_or_off(&mut self, value: bool) {
        if value {
            if self.envelope.key_on(self.key_code) {
                self.phase.reset();
            }
        } else {
            self.envelope.key_off(self.key_code);
        }
    }

    #[inline]
    pub(super) fn clock_envelope(&mut self) {
        self.envelope.clock(self.key_code);
    }

    #[inline]
    pub(super) fn clock_phase(&mut self, base_increment: u32) {
        self.phase.clock(base_increment, self.key_code);
    }

    /// Compute this operator's output for the current phase, with `modulation` as the phase
    /// modulation input. The result is always in the range -8168..=8168.
    #[inline]
    pub(super) fn output(&self, modulation: i16, resolution: WaveformResolution) -> i16 {
        let phase = self.phase.counter();
        let bits = resolution.quarter_wave_bits();
        let (sine_attenuation, negative) = match resolution {
            WaveformResolution::Standard => {
                let index = (phase >> 10).wrapping_add_signed(i32::from(modulation >> 1));
                quarter_wave_lookup(&LOG_SINE_TABLE[..], index, bits)
            }
            WaveformResolution::High => {
                let index = (phase >> 8).wrapping_add_signed(i32::from(modulation) << 1);
                quarter_wave_lookup(&LOG_SINE_HIRES_TABLE[..], index, bits)
            }
        };

        // Sine attenuation is 4.8 fixed-point, envelope is 4.6, total level is 1.6 (0-96dB)
        let total_attenuation = u32::from(sine_attenuation)
            + (u32::from(self.envelope.attenuation()) << 2)
            + (u32::from(self.total_level) << 5);

        let amplitude = attenuation_to_amplitude(total_attenuation);
        if negative { -amplitude } else { amplitude }
    }

    #[cfg(test)]
    pub(super) fn envelope_state(&self) -> crate::opna::envelope::EnvelopeState {
        self.envelope.state()
    }

    #[cfg(test)]
    pub(super) fn envelope_rate(&self) -> crate::opna::envelope::RateCache {
        self.envelope.rate()
    }

    #[cfg(test)]
    pub(super) fn attenuation(&self) -> u16 {
        self.envelope.attenuation()
    }

    #[cfg(test)]
    pub(super) fn phase_counter(&self) -> u32 {
        self.phase.counter()
    }

    #[cfg(test)]
    pub(super) fn key_code(&self) -> u8 {
        self.key_code
    }

    #[cfg(test)]
    pub(super) fn registers(&self) -> (u8, u8, u8) {
        (self.phase.detune, self.phase.multiple, self.total_level)
    }
}

impl Default for FmOperator {
    fn default() -> Self {
        Self::new()
    }
}
