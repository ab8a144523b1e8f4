//! Register write values, e.g. for scripting a device from the command line

use crate::opna::NUM_CHANNELS;
use std::fmt::{Display, Formatter};
use std::num::ParseIntError;
use std::str::FromStr;
use thiserror::Error;

// Two banks of 256 registers
const MAX_REGISTER: u16 = 0x1FF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterWrite {
    pub register: u16,
    pub value: u8,
}

#[derive(Debug, Error)]
pub enum ParseRegisterWriteError {
    #[error("expected REGISTER=VALUE, got '{0}'")]
    MissingSeparator(String),
    #[error("invalid register '{text}': {source}")]
    InvalidRegister {
        text: String,
        #[source]
        source: ParseIntError,
    },
    #[error("register {0:#X} out of range, maximum is 0x1FF")]
    RegisterOutOfRange(u16),
    #[error("invalid value '{text}': {source}")]
    InvalidValue {
        text: String,
        #[source]
        source: ParseIntError,
    },
}

fn parse_hex<T>(
    s: &str,
    from_str_radix: fn(&str, u32) -> Result<T, ParseIntError>,
) -> Result<T, ParseIntError> {
    let s = s.trim();
    let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
    from_str_radix(digits, 16)
}

// Bank (register bit 8) and channel offset for a channel index 0-5
fn bank_and_offset(channel: usize) -> (u16, u16) {
    ((channel / 3) as u16, (channel % 3) as u16)
}

impl RegisterWrite {
    #[must_use]
    pub const fn new(register: u16, value: u8) -> Self {
        Self { register, value }
    }

    /// The two writes that set a channel's block and F-number, high register first. Returns `None`
    /// for an invalid channel index.
    #[must_use]
    pub fn block_f_number(channel: usize, block: u8, f_number: u16) -> Option<[Self; 2]> {
        if channel >= NUM_CHANNELS {
            return None;
        }

        let (bank, offset) = bank_and_offset(channel);
        let [low, high] = (f_number & 0x07FF).to_le_bytes();
        Some([
            Self::new((bank << 8) | 0xA4 | offset, ((block & 0x07) << 3) | high),
            Self::new((bank << 8) | 0xA0 | offset, low),
        ])
    }

    /// Key on/off write for a channel. Bit N of `slots` keys slot N on.
    #[must_use]
    pub fn key_on_or_off(channel: usize, slots: u8) -> Option<Self> {
        if channel >= NUM_CHANNELS {
            return None;
        }

        let (bank, offset) = bank_and_offset(channel);
        Some(Self::new(0x28, (slots << 4) | ((bank as u8) << 2) | offset as u8))
    }
}

impl Display for RegisterWrite {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:03X}={:02X}", self.register, self.value)
    }
}

impl FromStr for RegisterWrite {
    type Err = ParseRegisterWriteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((register, value)) = s.split_once('=') else {
            return Err(ParseRegisterWriteError::MissingSeparator(s.into()));
        };

        let register = parse_hex(register, u16::from_str_radix).map_err(|source| {
            ParseRegisterWriteError::InvalidRegister { text: register.into(), source }
        })?;
        if register > MAX_REGISTER {
            return Err(ParseRegisterWriteError::RegisterOutOfRange(register));
        }

        let value = parse_hex(value, u8::from_str_radix).map_err(|source| {
            ParseRegisterWriteError::InvalidValue { text: value.into(), source }
        })?;

        Ok(Self { register, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Opna;
    use opna_config::WaveformResolution;
    use test_log::test;

    #[test]
    fn parse() {
        assert_eq!("28=F0".parse::<RegisterWrite>().unwrap(), RegisterWrite::new(0x28, 0xF0));
        assert_eq!("0x1B4=0xc0".parse::<RegisterWrite>().unwrap(), RegisterWrite::new(0x1B4, 0xC0));
        assert_eq!(" a4 = 22 ".parse::<RegisterWrite>().unwrap(), RegisterWrite::new(0xA4, 0x22));
    }

    #[test]
    fn parse_errors() {
        assert!(matches!(
            "28".parse::<RegisterWrite>(),
            Err(ParseRegisterWriteError::MissingSeparator(_))
        ));
        assert!(matches!(
            "zz=00".parse::<RegisterWrite>(),
            Err(ParseRegisterWriteError::InvalidRegister { .. })
        ));
        assert!(matches!(
            "200=00".parse::<RegisterWrite>(),
            Err(ParseRegisterWriteError::RegisterOutOfRange(0x200))
        ));
        assert!(matches!(
            "28=100".parse::<RegisterWrite>(),
            Err(ParseRegisterWriteError::InvalidValue { .. })
        ));
    }

    #[test]
    fn display_round_trips() {
        let write = RegisterWrite::new(0x1A2, 0x0F);
        assert_eq!(write.to_string(), "1A2=0F");
        assert_eq!(write.to_string().parse::<RegisterWrite>().unwrap(), write);
    }

    #[test]
    fn block_f_number_pair() {
        assert_eq!(
            RegisterWrite::block_f_number(4, 4, 0x26A),
            Some([RegisterWrite::new(0x1A5, 0x22), RegisterWrite::new(0x1A1, 0x6A)])
        );
        assert_eq!(RegisterWrite::block_f_number(6, 0, 0), None);

        let mut opna = Opna::new(WaveformResolution::High);
        for write in RegisterWrite::block_f_number(2, 7, 0x7FF).unwrap() {
            opna.write(write.register, write.value);
        }
        let channel = opna.channel(2).unwrap();
        assert_eq!((channel.block(), channel.f_number()), (7, 0x7FF));
    }

    #[test]
    fn key_on_or_off_write() {
        assert_eq!(RegisterWrite::key_on_or_off(0, 0x0F), Some(RegisterWrite::new(0x28, 0xF0)));
        assert_eq!(RegisterWrite::key_on_or_off(5, 0x05), Some(RegisterWrite::new(0x28, 0x56)));
        assert_eq!(RegisterWrite::key_on_or_off(6, 0x0F), None);
    }
}
