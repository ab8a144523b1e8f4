//! Yamaha OPNA FM synthesis engine (the FM half of the YM2608)
//!
//! Six 4-operator channels with a register-mapped control surface. SSG, rhythm, ADPCM, LFO,
//! SSG-EG, and the timers are not emulated; writes to their registers are ignored.

mod channel;
mod envelope;
mod operator;
mod phase;
mod tables;

pub use channel::FmChannel;
pub use operator::FmOperator;

use bincode::{Decode, Encode};
use opna_common::num::GetBit;
use opna_config::{OpnaConfig, WaveformResolution};
use std::array;

/// Master clock of the YM2608 as used in the PC-98 series.
pub const OPNA_CLOCK_HZ: u32 = 7_987_200;

/// Native FM sample rate; one sample is produced every 144 master clock cycles.
pub const FM_SAMPLE_RATE_HZ: f64 = OPNA_CLOCK_HZ as f64 / 144.0;

pub const NUM_CHANNELS: usize = 6;

// Envelopes are clocked once every 3 samples
const ENVELOPE_DIVIDER: u8 = 3;

// Register bit 8 selects channels 4-6 (idx 3-5)
const BANK_1_BASE_CHANNEL: usize = 3;

// Channel 3 (idx 2) is the only channel whose operators can run at independent frequencies
const CHANNEL_3: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub enum Channel3Mode {
    #[default]
    Normal,
    /// Operators 1-3 use the frequencies from 0xA8-0xAA
    Special,
    /// Frequencies as in special mode. Timer-triggered key on is not emulated.
    Csm,
}

impl Channel3Mode {
    fn from_register(value: u8) -> Self {
        match value.bits(6..=7) {
            0b00 => Self::Normal,
            0b10 => Self::Csm,
            _ => Self::Special,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
struct Channel3Frequencies {
    // Indexed by register offset: 0xA8/0xAC = 0, 0xA9/0xAD = 1, 0xAA/0xAE = 2
    f_numbers: [u16; 3],
    blocks: [u8; 3],
    mode: Channel3Mode,
}

impl Channel3Frequencies {
    fn new() -> Self {
        Self { f_numbers: [0; 3], blocks: [0; 3], mode: Channel3Mode::Normal }
    }

    fn increment(&self, i: usize) -> u32 {
        phase::block_f_number_to_increment(self.blocks[i], self.f_numbers[i])
    }

    // Operator 1 takes A9, operator 2 takes AA, operator 3 takes A8, operator 4 uses the channel
    // frequency
    fn operator_increments(&self, channel_increment: u32) -> [u32; 4] {
        [self.increment(1), self.increment(2), self.increment(0), channel_increment]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct Opna {
    channels: [FmChannel; NUM_CHANNELS],
    // Shared by every 0xA4-0xA7 and 0xAC-0xAF write, consumed by the next low byte write
    pending_block_f_number_high: u8,
    channel_3: Channel3Frequencies,
    envelope_divider: u8,
    waveform_resolution: WaveformResolution,
}

impl Opna {
    #[must_use]
    pub fn new(waveform_resolution: WaveformResolution) -> Self {
        tables::force_init();

        Self {
            channels: array::from_fn(|_| FmChannel::new()),
            pending_block_f_number_high: 0,
            channel_3: Channel3Frequencies::new(),
            envelope_divider: 0,
            waveform_resolution,
        }
    }

    #[must_use]
    pub fn new_from_config(config: &OpnaConfig) -> Self {
        Self::new(config.waveform_resolution)
    }

    /// Return every register-controlled value and all internal state to power-on values. The
    /// configured waveform resolution is kept.
    pub fn reset(&mut self) {
        log::debug!("Resetting OPNA");

        *self = Self::new(self.waveform_resolution);
    }

    pub fn reload_config(&mut self, config: &OpnaConfig) {
        log::debug!("Reloading OPNA config: {config:?}");

        self.waveform_resolution = config.waveform_resolution;
    }

    #[must_use]
    pub fn waveform_resolution(&self) -> WaveformResolution {
        self.waveform_resolution
    }

    /// Direct access to a channel by index (0-5) for parameter edits that bypass register
    /// decoding.
    pub fn channel_mut(&mut self, index: usize) -> Option<&mut FmChannel> {
        self.channels.get_mut(index)
    }

    #[must_use]
    pub fn channel(&self, index: usize) -> Option<&FmChannel> {
        self.channels.get(index)
    }

    #[must_use]
    pub fn channel_3_mode(&self) -> Channel3Mode {
        self.channel_3.mode
    }

    /// Write an FM register. Bit 8 of `register` selects the second register bank (channels 4-6).
    /// Unrecognized registers are ignored.
    pub fn write(&mut self, register: u16, value: u8) {
        let register = register & 0x1FF;
        log::trace!("Wrote {value:02X} to {register:03X}");

        match register as u8 {
            0x27 => {
                let mode = Channel3Mode::from_register(value);
                if mode != self.channel_3.mode {
                    self.channel_3.mode = mode;
                    log::trace!("Channel 3 frequency mode: {mode:?}");
                }
            }
            0x28 => {
                let offset = value & 0x03;
                if offset == 3 {
                    // Invalid; only 3 channels per bank
                    return;
                }

                let base_channel = if value.bit(2) { BANK_1_BASE_CHANNEL } else { 0 };
                let channel_idx = base_channel + offset as usize;
                self.channels[channel_idx].key_on_or_off(value >> 4);

                log::trace!("Key on/off for channel {}: {:X}", channel_idx + 1, value >> 4);
            }
            0x30..=0x8F => self.write_operator_register(register, value),
            0xA0..=0xAF => self.write_frequency_register(register, value),
            0xB0..=0xB7 => self.write_channel_register(register, value),
            _ => {}
        }
    }

    fn channel_index(register: u16) -> Option<usize> {
        let offset = (register & 0x03) as usize;
        if offset == 3 {
            return None;
        }

        let base_channel = if register.bit(8) { BANK_1_BASE_CHANNEL } else { 0 };
        Some(base_channel + offset)
    }

    fn write_operator_register(&mut self, register: u16, value: u8) {
        let Some(channel_idx) = Self::channel_index(register) else { return };

        // Operator comes from bits 2 and 3 of register, except swapped
        // (01=Operator 3, 10=Operator 2)
        let operator_idx = (((register & 0x08) >> 3) | ((register & 0x04) >> 1)) as usize;
        let operator = &mut self.channels[channel_idx].operators_mut()[operator_idx];

        match (register & 0xF0) >> 4 {
            0x03 => {
                operator.set_detune(value >> 4);
                operator.set_multiple(value);
            }
            0x04 => operator.set_total_level(value),
            0x05 => {
                operator.set_key_scale(value >> 6);
                operator.set_attack_rate(value);
            }
            0x06 => operator.set_decay_rate(value),
            0x07 => operator.set_sustain_rate(value),
            0x08 => {
                operator.set_sustain_level(value >> 4);
                operator.set_release_rate(value);
            }
            _ => unreachable!("register is in 0x30..=0x8F"),
        }

        log::trace!(
            "Channel {} / operator {}: register {:X}0 = {value:02X}",
            channel_idx + 1,
            operator_idx + 1,
            (register & 0xF0) >> 4
        );
    }

    fn write_frequency_register(&mut self, register: u16, value: u8) {
        let Some(channel_idx) = Self::channel_index(register) else { return };

        let block = self.pending_block_f_number_high.bits(3..=5);
        let f_number = u16::from_le_bytes([value, self.pending_block_f_number_high.bits(0..=2)]);

        match register & 0x0C {
            0x00 => {
                // F-number low bits; applies the pending high bits and block
                self.channels[channel_idx].set_block_f_number(block, f_number);

                log::trace!("Channel {}: block={block}, F-num={f_number:03X}", channel_idx + 1);
            }
            0x08 => {
                // Channel 3 per-operator F-number low bits
                let i = channel_idx % 3;
                self.channel_3.blocks[i] = block;
                self.channel_3.f_numbers[i] = f_number;

                log::trace!("Channel 3 frequency {i}: block={block}, F-num={f_number:03X}");
            }
            _ => {
                // F-number high bits and block; takes effect on the next low bits write
                self.pending_block_f_number_high = value & 0x3F;
            }
        }
    }

    fn write_channel_register(&mut self, register: u16, value: u8) {
        let Some(channel_idx) = Self::channel_index(register) else { return };
        let channel = &mut self.channels[channel_idx];

        if register & 0x0C == 0 {
            channel.set_algorithm(value);
            channel.set_feedback(value >> 3);

            log::trace!(
                "Channel {}: algorithm={}, feedback={}",
                channel_idx + 1,
                channel.algorithm(),
                channel.feedback()
            );
        } else {
            channel.set_pan(value.bit(7), value.bit(6));

            log::trace!("Channel {}: L={}, R={}", channel_idx + 1, value.bit(7), value.bit(6));
        }
    }

    #[inline]
    fn clock(&mut self) -> (i32, i32) {
        if self.envelope_divider == 0 {
            for channel in &mut self.channels {
                channel.clock_envelopes();
            }
            self.envelope_divider = ENVELOPE_DIVIDER;
        }
        self.envelope_divider -= 1;

        let mut sum_l = 0;
        let mut sum_r = 0;
        for (i, channel) in self.channels.iter_mut().enumerate() {
            let sample = channel.output(self.waveform_resolution);

            if i == CHANNEL_3 && self.channel_3.mode != Channel3Mode::Normal {
                let increments = self.channel_3.operator_increments(channel.base_increment());
                channel.clock_phases_split(increments);
            } else {
                channel.clock_phases();
            }

            let (l_output, r_output) = channel.pan();
            if l_output {
                sum_l += i32::from(sample);
            }
            if r_output {
                sum_r += i32::from(sample);
            }
        }

        (sum_l, sum_r)
    }

    /// Generate `frames` stereo samples, passing each (L, R) pair to `output`.
    ///
    /// Samples are the unscaled sum of all panned channel outputs; each channel contributes at
    /// most ±8168.
    #[inline]
    pub fn generate(&mut self, frames: usize, mut output: impl FnMut(i32, i32)) {
        for _ in 0..frames {
            let (sample_l, sample_r) = self.clock();
            output(sample_l, sample_r);
        }
    }

    /// Fill two planar buffers.
    ///
    /// # Panics
    ///
    /// Panics if the buffers have different lengths.
    pub fn generate_stereo(&mut self, l_buffer: &mut [i32], r_buffer: &mut [i32]) {
        assert_eq!(
            l_buffer.len(),
            r_buffer.len(),
            "left and right buffers must be the same length"
        );

        for (l, r) in l_buffer.iter_mut().zip(r_buffer) {
            (*l, *r) = self.clock();
        }
    }

    /// Fill an interleaved L/R buffer. A trailing odd element is left untouched.
    pub fn generate_interleaved(&mut self, buffer: &mut [i32]) {
        for frame in buffer.chunks_exact_mut(2) {
            (frame[0], frame[1]) = self.clock();
        }
    }
}

impl Default for Opna {
    fn default() -> Self {
        Self::new(WaveformResolution::default())
    }
}
