//! OPNA FM channel: four operators combined through one of eight fixed algorithms

use crate::opna::operator::FmOperator;
use crate::opna::phase;
use bincode::{Decode, Encode};
use opna_common::num::GetBit;
use opna_config::WaveformResolution;
use std::array;

// Evaluates operators 1-3 given the delayed operator 0 output, returns the channel output
type AlgorithmFn = fn(&mut FmChannel, i16, WaveformResolution) -> i16;

// Operator numbering below is 0-3 (hardware OP1-OP4). Operator 0 is evaluated before the
// algorithm runs, and its output only reaches the algorithm two samples later. Operators that
// feed each other through `algorithm_mem` see the previous sample's value.
const ALGORITHMS: [AlgorithmFn; 8] = [
    algorithm_0,
    algorithm_1,
    algorithm_2,
    algorithm_3,
    algorithm_4,
    algorithm_5,
    algorithm_6,
    algorithm_7,
];

// O0 -> O1 -> O2 -> O3 -> Output
fn algorithm_0(channel: &mut FmChannel, slot0: i16, resolution: WaveformResolution) -> i16 {
    let m2 = channel.operators[2].output(channel.algorithm_mem, resolution);
    channel.algorithm_mem = channel.operators[1].output(slot0, resolution);
    channel.operators[3].output(m2, resolution)
}

// (O0 + O1) -> O2 -> O3 -> Output
fn algorithm_1(channel: &mut FmChannel, slot0: i16, resolution: WaveformResolution) -> i16 {
    let m2 = channel.operators[2].output(channel.algorithm_mem, resolution);
    channel.algorithm_mem = slot0.wrapping_add(channel.operators[1].output(0, resolution));
    channel.operators[3].output(m2, resolution)
}

// (O0 + (O1 -> O2)) -> O3 -> Output
fn algorithm_2(channel: &mut FmChannel, slot0: i16, resolution: WaveformResolution) -> i16 {
    let m2 = channel.operators[2].output(channel.algorithm_mem, resolution);
    channel.algorithm_mem = channel.operators[1].output(0, resolution);
    channel.operators[3].output(slot0.wrapping_add(m2), resolution)
}

// ((O0 -> O1) + O2) -> O3 -> Output
fn algorithm_3(channel: &mut FmChannel, slot0: i16, resolution: WaveformResolution) -> i16 {
    let m2 = channel.operators[2].output(0, resolution);
    let output = channel.operators[3].output(m2.wrapping_add(channel.algorithm_mem), resolution);
    channel.algorithm_mem = channel.operators[1].output(slot0, resolution);
    output
}

// (O0 -> O1) + (O2 -> O3) -> Output
fn algorithm_4(channel: &mut FmChannel, slot0: i16, resolution: WaveformResolution) -> i16 {
    let c1 = channel.operators[1].output(slot0, resolution);
    let m2 = channel.operators[2].output(0, resolution);
    c1.wrapping_add(channel.operators[3].output(m2, resolution))
}

// O0 -> (O1 + O2 + O3) -> Output, with O2 one sample behind
fn algorithm_5(channel: &mut FmChannel, slot0: i16, resolution: WaveformResolution) -> i16 {
    let c2 = channel.operators[2].output(channel.algorithm_mem, resolution);
    channel.algorithm_mem = slot0;
    c2.wrapping_add(channel.operators[1].output(slot0, resolution))
        .wrapping_add(channel.operators[3].output(slot0, resolution))
}

// (O0 -> O1) + O2 + O3 -> Output
fn algorithm_6(channel: &mut FmChannel, slot0: i16, resolution: WaveformResolution) -> i16 {
    channel.operators[1]
        .output(slot0, resolution)
        .wrapping_add(channel.operators[2].output(0, resolution))
        .wrapping_add(channel.operators[3].output(0, resolution))
}

// O0 + O1 + O2 + O3 -> Output
fn algorithm_7(channel: &mut FmChannel, slot0: i16, resolution: WaveformResolution) -> i16 {
    slot0
        .wrapping_add(channel.operators[1].output(0, resolution))
        .wrapping_add(channel.operators[2].output(0, resolution))
        .wrapping_add(channel.operators[3].output(0, resolution))
}

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct FmChannel {
    operators: [FmOperator; 4],
    // Operator 0 outputs from the last two samples; their sum drives self-feedback
    feedback_mem1: i16,
    feedback_mem2: i16,
    algorithm_mem: i16,
    algorithm: u8,
    feedback: u8,
    block: u8,
    f_number: u16,
    l_output: bool,
    r_output: bool,
}

impl FmChannel {
    pub(super) fn new() -> Self {
        Self {
            operators: array::from_fn(|_| FmOperator::new()),
            feedback_mem1: 0,
            feedback_mem2: 0,
            algorithm_mem: 0,
            algorithm: 0,
            feedback: 0,
            block: 0,
            f_number: 0,
            l_output: true,
            r_output: true,
        }
    }

    /// Operator by slot index, 0-3 in hardware order (OP1-OP4).
    pub fn operator_mut(&mut self, slot: usize) -> Option<&mut FmOperator> {
        self.operators.get_mut(slot)
    }

    /// Set the channel frequency. Recomputes the key code and active envelope rate of every
    /// operator.
    pub fn set_block_f_number(&mut self, block: u8, f_number: u16) {
        self.block = block & 0x07;
        self.f_number = f_number & 0x07FF;

        let key_code = phase::compute_key_code(self.f_number, self.block);
        for operator in &mut self.operators {
            operator.update_key_code(key_code);
        }
    }

    pub fn set_algorithm(&mut self, algorithm: u8) {
        self.algorithm = algorithm & 0x07;
    }

    pub fn set_feedback(&mut self, feedback: u8) {
        self.feedback = feedback & 0x07;
    }

    pub fn set_pan(&mut self, l_output: bool, r_output: bool) {
        self.l_output = l_output;
        self.r_output = r_output;
    }

    /// Key every operator on or off at once. Bit N of `slots` keys slot N on when set, off when
    /// clear.
    pub fn key_on_or_off(&mut self, slots: u8) {
        for (i, operator) in self.operators.iter_mut().enumerate() {
            operator.key_on_or_off(slots.bit(i as u8));
        }
    }

    #[must_use]
    pub fn block(&self) -> u8 {
        self.block
    }

    #[must_use]
    pub fn f_number(&self) -> u16 {
        self.f_number
    }

    #[must_use]
    pub fn algorithm(&self) -> u8 {
        self.algorithm
    }

    #[must_use]
    pub fn feedback(&self) -> u8 {
        self.feedback
    }

    #[must_use]
    pub fn pan(&self) -> (bool, bool) {
        (self.l_output, self.r_output)
    }

    pub(super) fn operators_mut(&mut self) -> &mut [FmOperator; 4] {
        &mut self.operators
    }

    pub(super) fn clock_envelopes(&mut self) {
        for operator in &mut self.operators {
            operator.clock_envelope();
        }
    }

    // Advance every operator from the channel frequency
    #[inline]
    pub(super) fn clock_phases(&mut self) {
        let increment = self.base_increment();
        for operator in &mut self.operators {
            operator.clock_phase(increment);
        }
    }

    // Advance each operator from its own base increment (channel 3 special mode)
    #[inline]
    pub(super) fn clock_phases_split(&mut self, increments: [u32; 4]) {
        for (operator, increment) in self.operators.iter_mut().zip(increments) {
            operator.clock_phase(increment);
        }
    }

    #[inline]
    pub(super) fn base_increment(&self) -> u32 {
        phase::block_f_number_to_increment(self.block, self.f_number)
    }

    // Compute this sample's channel output; phase is not advanced
    #[inline]
    pub(super) fn output(&mut self, resolution: WaveformResolution) -> i16 {
        let feedback_input = self.feedback_mem1.wrapping_add(self.feedback_mem2);
        let slot0 = self.feedback_mem1;
        self.feedback_mem1 = self.feedback_mem2;

        let modulation = match self.feedback {
            0 => 0,
            feedback => feedback_input >> (9 - feedback),
        };
        self.feedback_mem2 = self.operators[0].output(modulation, resolution);

        ALGORITHMS[self.algorithm as usize](self, slot0, resolution)
    }

    #[cfg(test)]
    pub(super) fn operator(&self, slot: usize) -> &FmOperator {
        &self.operators[slot]
    }
}

impl Default for FmChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    const BLOCK: u8 = 4;
    const F_NUMBER: u16 = 0x26A;

    fn voiced_channel(algorithm: u8, feedback: u8) -> FmChannel {
        let mut channel = FmChannel::new();
        channel.set_algorithm(algorithm);
        channel.set_feedback(feedback);
        channel.set_block_f_number(BLOCK, F_NUMBER);
        for slot in 0..4 {
            let operator = channel.operator_mut(slot).unwrap();
            operator.set_multiple(1);
            operator.set_attack_rate(31);
            operator.set_decay_rate(5);
            operator.set_sustain_level(2);
        }
        channel
    }

    // Run an operator standalone with no modulation, the same way the device clocks it
    fn isolated_outputs(mut operator: FmOperator, samples: usize) -> Vec<i16> {
        let increment = phase::block_f_number_to_increment(BLOCK, F_NUMBER);
        (0..samples)
            .map(|n| {
                if n % 3 == 0 {
                    operator.clock_envelope();
                }
                let output = operator.output(0, WaveformResolution::High);
                operator.clock_phase(increment);
                output
            })
            .collect()
    }

    fn channel_outputs(channel: &mut FmChannel, samples: usize) -> Vec<i16> {
        (0..samples)
            .map(|n| {
                if n % 3 == 0 {
                    channel.clock_envelopes();
                }
                let output = channel.output(WaveformResolution::High);
                channel.clock_phases();
                output
            })
            .collect()
    }

    #[test]
    fn algorithm_7_sums_independent_operators() {
        let mut channel = voiced_channel(7, 0);
        channel.key_on_or_off(0x0F);

        let isolated: Vec<_> =
            (0..4).map(|slot| isolated_outputs(channel.operator(slot).clone(), 500)).collect();
        let outputs = channel_outputs(&mut channel, 500);

        for (n, &output) in outputs.iter().enumerate() {
            // Operator 0 reaches the output through the two-sample feedback delay
            let slot0 = if n >= 2 { isolated[0][n - 2] } else { 0 };
            let expected = slot0
                .wrapping_add(isolated[1][n])
                .wrapping_add(isolated[2][n])
                .wrapping_add(isolated[3][n]);
            assert_eq!(output, expected, "sample {n}");
        }
        assert!(outputs.iter().any(|&output| output != 0));
    }

    #[test]
    fn operator_0_output_is_delayed_two_samples() {
        let mut channel = voiced_channel(7, 0);
        channel.key_on_or_off(0x01);

        let isolated = isolated_outputs(channel.operator(0).clone(), 100);
        let outputs = channel_outputs(&mut channel, 100);

        assert_eq!(&outputs[..2], &[0, 0]);
        assert_eq!(&outputs[2..], &isolated[..98]);
    }

    #[test]
    fn lone_carrier_matches_isolated_operator_in_every_algorithm() {
        for algorithm in 0..8 {
            let mut channel = voiced_channel(algorithm, 7);
            channel.key_on_or_off(0x08);

            let isolated = isolated_outputs(channel.operator(3).clone(), 200);
            let outputs = channel_outputs(&mut channel, 200);
            assert_eq!(outputs, isolated, "algorithm {algorithm}");
        }
    }

    #[test]
    fn modulator_alone_is_silent_in_serial_algorithm() {
        let mut channel = voiced_channel(0, 0);
        channel.key_on_or_off(0x01);

        assert!(channel_outputs(&mut channel, 300).iter().all(|&output| output == 0));
    }

    #[test]
    fn feedback_changes_operator_0() {
        let mut plain = voiced_channel(7, 0);
        let mut with_feedback = voiced_channel(7, 7);
        plain.key_on_or_off(0x01);
        with_feedback.key_on_or_off(0x01);

        let plain = channel_outputs(&mut plain, 200);
        let with_feedback = channel_outputs(&mut with_feedback, 200);

        // Feedback memory starts at zero, so the first audible sample is identical
        assert_eq!(plain[..3], with_feedback[..3]);
        assert_ne!(plain, with_feedback);
    }

    #[test]
    fn maximum_feedback_stays_within_operator_range() {
        for resolution in WaveformResolution::ALL {
            let mut channel = voiced_channel(7, 7);
            channel.key_on_or_off(0x01);
            channel.operator_mut(0).unwrap().set_multiple(15);
            channel.set_block_f_number(7, 0x7FF);

            for n in 0..20_000 {
                if n % 3 == 0 {
                    channel.clock_envelopes();
                }
                let output = channel.output(resolution);
                channel.clock_phases();

                assert!((-8168..=8168).contains(&output), "sample {n}: {output}");
                assert!((-8168..=8168).contains(&channel.feedback_mem2));
            }
        }
    }

    #[test]
    fn block_f_number_updates_key_code() {
        let mut channel = FmChannel::new();
        channel.set_block_f_number(0xFF, 0xFFFF);

        assert_eq!((channel.block(), channel.f_number()), (7, 0x7FF));
        for slot in 0..4 {
            assert_eq!(channel.operator(slot).key_code(), 31);
        }
    }

    #[test]
    fn operator_index_out_of_range() {
        let mut channel = FmChannel::new();
        assert!(channel.operator_mut(3).is_some());
        assert!(channel.operator_mut(4).is_none());
    }
}
