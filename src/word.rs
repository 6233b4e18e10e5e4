//! Conversion of 16-bit values to and from the extended data memory layout.
//!
//! Multi-byte fields in data memory are stored most significant byte first. Standard
//! commands use the opposite order and do not go through this module.

#[inline]
pub const fn encode(value: u16) -> [u8; 2] {
    value.to_be_bytes()
}

#[inline]
pub const fn decode(bytes: [u8; 2]) -> u16 {
    u16::from_be_bytes(bytes)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn encodes_most_significant_byte_first() {
        assert_eq!(encode(1500), [0x05, 0xDC]);
        assert_eq!(encode(0x0621), [0x06, 0x21]);
        assert_eq!(decode([0x0C, 0x80]), 3200);
    }

    #[test]
    fn every_value_survives_encoding() {
        for value in 0..=u16::MAX {
            assert_eq!(decode(encode(value)), value);
        }
    }
}
