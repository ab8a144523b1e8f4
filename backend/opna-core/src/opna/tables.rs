//! Lookup tables shared by the phase, envelope, and operator output stages

use std::array;
use std::sync::LazyLock;

// Log-sine tables store 4.8 fixed-point attenuation on a log2 scale
pub(super) const LOG_SINE_BITS: u32 = 8;
pub(super) const LOG_SINE_HIRES_BITS: u32 = 10;

// Exponential table index is the fractional part (low 8 bits) of a 5.8 attenuation value
pub(super) const EXP_TABLE_BITS: u32 = 8;

fn log_sine_table<const N: usize>() -> [u16; N] {
    array::from_fn(|i| {
        use std::f64::consts::PI;

        // Indices cover 0 to PI/2, offset by half a step to avoid computing log2(0)
        let n = ((i << 1) | 1) as f64;
        let sine = (n / (2 * N) as f64 * PI / 2.0).sin();

        (-sine.log2() * f64::from(1 << 8)).round() as u16
    })
}

pub(super) static LOG_SINE_TABLE: LazyLock<[u16; 1 << LOG_SINE_BITS]> =
    LazyLock::new(log_sine_table);

pub(super) static LOG_SINE_HIRES_TABLE: LazyLock<[u16; 1 << LOG_SINE_HIRES_BITS]> =
    LazyLock::new(log_sine_table);

pub(super) static EXP_TABLE: LazyLock<[u16; 1 << EXP_TABLE_BITS]> = LazyLock::new(|| {
    array::from_fn(|i| {
        // 2^(-n) for n in (0, 1]; index i represents (i + 1)/256
        let n = ((i + 1) as f64) / 256.0;

        // 0.11 fixed-point, maximum 2042
        (2.0_f64.powf(-n) * f64::from(1 << 11)).round() as u16
    })
});

/// Build every lazily computed table now so that the first generated sample does not pay for it.
pub(super) fn force_init() {
    LazyLock::force(&LOG_SINE_TABLE);
    LazyLock::force(&LOG_SINE_HIRES_TABLE);
    LazyLock::force(&EXP_TABLE);
}

// Rows 0-3 are used for rates below 48, rows 4-7 for rates 48-63 together with a multiplier
#[rustfmt::skip]
pub(super) const RATE_INCREMENTS: &[[u8; 8]; 8] = &[
    [0, 1, 0, 1, 0, 1, 0, 1],
    [0, 1, 0, 1, 1, 1, 0, 1],
    [0, 1, 1, 1, 0, 1, 1, 1],
    [0, 1, 1, 1, 1, 1, 1, 1],
    [1, 1, 1, 1, 1, 1, 1, 1],
    [1, 1, 1, 2, 1, 1, 1, 2],
    [1, 2, 1, 2, 1, 2, 1, 2],
    [1, 2, 2, 2, 1, 2, 2, 2],
];

// Indexed by [key code][detune & 3]
#[rustfmt::skip]
pub(super) const DETUNE_TABLE: &[[u8; 4]; 32] = &[
    [0,  0,  1,  2],  [0,  0,  1,  2],  [0,  0,  1,  2],  [0,  0,  1,  2],  // Block 0
    [0,  1,  2,  2],  [0,  1,  2,  3],  [0,  1,  2,  3],  [0,  1,  2,  3],  // Block 1
    [0,  1,  2,  4],  [0,  1,  3,  4],  [0,  1,  3,  4],  [0,  1,  3,  5],  // Block 2
    [0,  2,  4,  5],  [0,  2,  4,  6],  [0,  2,  4,  6],  [0,  2,  5,  7],  // Block 3
    [0,  2,  5,  8],  [0,  3,  6,  8],  [0,  3,  6,  9],  [0,  3,  7, 10],  // Block 4
    [0,  4,  8, 11],  [0,  4,  8, 12],  [0,  4,  9, 13],  [0,  5, 10, 14],  // Block 5
    [0,  5, 11, 16],  [0,  6, 12, 17],  [0,  6, 13, 19],  [0,  7, 14, 20],  // Block 6
    [0,  8, 16, 22],  [0,  8, 16, 22],  [0,  8, 16, 22],  [0,  8, 16, 22],  // Block 7
];
