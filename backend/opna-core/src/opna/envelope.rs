//! OPNA envelope generator

use crate::opna::tables::RATE_INCREMENTS;
use bincode::{Decode, Encode};
use std::cmp;

// Attenuation is 10 bits
pub(super) const MAX_ATTENUATION: u16 = 0x03FF;

// Effective rates are 6 bits
const MAX_RATE: u8 = 63;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub(super) enum EnvelopeState {
    Attack,
    Decay,
    Sustain,
    Release,
    Off,
}

// Derived from the active state's rate and the key code; must be recomputed whenever either changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub(super) struct RateCache {
    selector: u8,
    multiplier: u8,
    shift: u8,
}

impl RateCache {
    pub(super) fn from_rate(r: u8, key_code: u8, key_scale: u8) -> Self {
        if r == 0 {
            return Self::default();
        }

        let rate = cmp::min(MAX_RATE, 2 * r + (key_code >> (3 - key_scale)));

        // Rates 48-63 update on every clock and scale the increment instead
        match 11_i8 - (rate >> 2) as i8 {
            shift @ 0.. => Self { selector: rate & 3, multiplier: 1, shift: shift as u8 },
            shift => Self { selector: (rate & 3) + 4, multiplier: 1 << (-shift - 1), shift: 0 },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub(super) struct EnvelopeGenerator {
    // Register values
    pub(super) attack_rate: u8,
    pub(super) decay_rate: u8,
    pub(super) sustain_rate: u8,
    pub(super) release_rate: u8,
    pub(super) sustain_level: u8,
    pub(super) key_scale: u8,
    // Internal state
    state: EnvelopeState,
    attenuation: u16,
    clock_counter: u16,
    rate: RateCache,
    key_on: bool,
}

impl EnvelopeGenerator {
    pub(super) fn new() -> Self {
        Self {
            attack_rate: 0,
            decay_rate: 0,
            sustain_rate: 0,
            release_rate: 0,
            sustain_level: 0,
            key_scale: 0,
            state: EnvelopeState::Release,
            attenuation: MAX_ATTENUATION,
            clock_counter: 0,
            rate: RateCache::default(),
            key_on: false,
        }
    }

    // Release runs at twice the granularity of the other states
    fn state_rate(&self, state: EnvelopeState) -> Option<u8> {
        match state {
            EnvelopeState::Attack => Some(self.attack_rate),
            EnvelopeState::Decay => Some(self.decay_rate),
            EnvelopeState::Sustain => Some(self.sustain_rate),
            EnvelopeState::Release => Some((self.release_rate << 1) | 1),
            EnvelopeState::Off => None,
        }
    }

    fn enter_state(&mut self, state: EnvelopeState, key_code: u8) {
        self.state = state;
        self.update_rate(key_code);
    }

    /// Recompute the cached rate for the current state. Off keeps whatever was cached last.
    pub(super) fn update_rate(&mut self, key_code: u8) {
        if let Some(r) = self.state_rate(self.state) {
            self.rate = RateCache::from_rate(r, key_code, self.key_scale);
        }
    }

    #[inline]
    pub(super) fn clock(&mut self, key_code: u8) {
        self.clock_counter = self.clock_counter.wrapping_add(1);

        let RateCache { selector, multiplier, shift } = self.rate;
        if self.clock_counter & ((1 << shift) - 1) != 0 {
            return;
        }

        let increment_idx = (self.clock_counter >> shift) & 7;
        let increment = u16::from(RATE_INCREMENTS[selector as usize][increment_idx as usize])
            * u16::from(multiplier);

        match self.state {
            EnvelopeState::Attack => {
                // Exponential approach towards 0
                let attenuation = i32::from(self.attenuation);
                let next = attenuation + (((-attenuation - 1) * i32::from(increment)) >> 4);
                if next <= 0 {
                    self.attenuation = 0;
                    self.enter_state(EnvelopeState::Decay, key_code);
                } else {
                    self.attenuation = next as u16;
                }
            }
            EnvelopeState::Decay => {
                self.attenuation += increment;

                // Sustain level applies in increments of 32, with 15 special cased to 31
                let sustain_level = match self.sustain_level {
                    15 => 0x1F,
                    sl => u16::from(sl),
                };
                if self.attenuation >= sustain_level << 5 {
                    self.enter_state(EnvelopeState::Sustain, key_code);
                }
            }
            EnvelopeState::Sustain => {
                self.attenuation = cmp::min(MAX_ATTENUATION, self.attenuation + increment);
            }
            EnvelopeState::Release => {
                self.attenuation += increment;
                if self.attenuation >= MAX_ATTENUATION {
                    self.attenuation = MAX_ATTENUATION;
                    self.state = EnvelopeState::Off;
                }
            }
            EnvelopeState::Off => {}
        }
    }

    /// Returns true if this call started a new note.
    pub(super) fn key_on(&mut self, key_code: u8) -> bool {
        if self.key_on {
            return false;
        }

        self.key_on = true;
        self.clock_counter = 0;
        self.enter_state(EnvelopeState::Attack, key_code);

        log::trace!("State at key on: {self:?}");

        true
    }

    pub(super) fn key_off(&mut self, key_code: u8) {
        if !self.key_on || self.state == EnvelopeState::Off {
            return;
        }

        self.key_on = false;
        self.enter_state(EnvelopeState::Release, key_code);

        log::trace!("State at key off: {self:?}");
    }

    pub(super) fn set_attack_rate(&mut self, attack_rate: u8, key_code: u8) {
        self.attack_rate = attack_rate;
        if self.state == EnvelopeState::Attack {
            self.update_rate(key_code);
        }
    }

    pub(super) fn set_decay_rate(&mut self, decay_rate: u8, key_code: u8) {
        self.decay_rate = decay_rate;
        if self.state == EnvelopeState::Decay {
            self.update_rate(key_code);
        }
    }

    pub(super) fn set_sustain_rate(&mut self, sustain_rate: u8, key_code: u8) {
        self.sustain_rate = sustain_rate;
        if self.state == EnvelopeState::Sustain {
            self.update_rate(key_code);
        }
    }

    pub(super) fn set_release_rate(&mut self, release_rate: u8, key_code: u8) {
        self.release_rate = release_rate;
        if self.state == EnvelopeState::Release {
            self.update_rate(key_code);
        }
    }

    #[inline]
    pub(super) fn attenuation(&self) -> u16 {
        self.attenuation
    }

    #[cfg(test)]
    pub(super) fn state(&self) -> EnvelopeState {
        self.state
    }

    #[cfg(test)]
    pub(super) fn rate(&self) -> RateCache {
        self.rate
    }
}

impl Default for EnvelopeGenerator {
    fn default() -> Self {
        Self::new()
    }
}
