use std::ops::RangeInclusive;

pub trait GetBit {
    #[must_use]
    fn bit(self, i: u8) -> bool;

    #[must_use]
    fn bits(self, range: RangeInclusive<u8>) -> Self;
}

macro_rules! impl_get_bit {
    ($($t:ty),* $(,)?) => {
        $(
            impl GetBit for $t {
                #[inline]
                fn bit(self, i: u8) -> bool {
                    debug_assert!(i < (<$t>::BITS as u8));
                    self & (1 << i) != 0
                }

                #[inline]
                fn bits(self, range: RangeInclusive<u8>) -> Self {
                    let start = *range.start();
                    let end = *range.end();
                    debug_assert!(start <= end && end < (<$t>::BITS as u8));

                    (self >> start) & (((1 as $t) << (end - start)) << 1).wrapping_sub(1)
                }
            }
        )*
    };
}

impl_get_bit!(u8, u16, u32, usize);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_bits() {
        assert!(0x80_u8.bit(7));
        assert!(!0x80_u8.bit(6));
        assert!(0x0100_u16.bit(8));
        assert!(0x0008_0000_u32.bit(19));
    }

    #[test]
    fn bit_ranges() {
        // Register 0x80: sustain level in bits 7-4, release rate in bits 3-0
        assert_eq!(0xA5_u8.bits(4..=7), 0x0A);
        assert_eq!(0xA5_u8.bits(0..=3), 0x05);

        // Full-width range must not overflow the shift
        assert_eq!(0xFF_u8.bits(0..=7), 0xFF);
        assert_eq!(0x3F_u8.bits(3..=5), 0x07);
    }
}
