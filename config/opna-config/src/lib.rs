use bincode::{Decode, Encode};
use std::fmt::{Display, Formatter};

/// Resolution of the log-sine lookup used to convert phase into attenuation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum WaveformResolution {
    /// 256-entry quarter-wave table indexed by the top 10 phase bits; modulation input is halved
    Standard,
    /// 1024-entry quarter-wave table indexed by the top 12 phase bits; modulation input is doubled
    #[default]
    High,
}

impl WaveformResolution {
    pub const ALL: [Self; 2] = [Self::Standard, Self::High];

    /// Index width in bits of the quarter-wave log-sine table for this resolution.
    #[inline]
    #[must_use]
    pub const fn quarter_wave_bits(self) -> u32 {
        match self {
            Self::Standard => 8,
            Self::High => 10,
        }
    }
}

impl Display for WaveformResolution {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Standard => write!(f, "Standard"),
            Self::High => write!(f, "High"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OpnaConfig {
    #[cfg_attr(feature = "serde", serde(default))]
    pub waveform_resolution: WaveformResolution,
}
