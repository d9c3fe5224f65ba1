//! Helpers for splitting and combining the integer widths used by MMIO registers.

pub trait U32Ext {
    fn low_word(self) -> u16;
    fn high_word(self) -> u16;
    fn set_low_word(&mut self, value: u16);
    fn set_high_word(&mut self, value: u16);
}

impl U32Ext for u32 {
    #[inline]
    fn low_word(self) -> u16 {
        self as u16
    }

    #[inline]
    fn high_word(self) -> u16 {
        (self >> 16) as u16
    }

    #[inline]
    fn set_low_word(&mut self, value: u16) {
        *self = (*self & 0xFFFF_0000) | value as u32;
    }

    #[inline]
    fn set_high_word(&mut self, value: u16) {
        *self = (*self & 0x0000_FFFF) | ((value as u32) << 16);
    }
}

pub trait U16Ext {
    fn low_byte(self) -> u8;
    fn high_byte(self) -> u8;
    fn set_low_byte(&mut self, value: u8);
    fn set_high_byte(&mut self, value: u8);
}

impl U16Ext for u16 {
    #[inline]
    fn low_byte(self) -> u8 {
        self as u8
    }

    #[inline]
    fn high_byte(self) -> u8 {
        (self >> 8) as u8
    }

    #[inline]
    fn set_low_byte(&mut self, value: u8) {
        *self = (*self & 0xFF00) | value as u16;
    }

    #[inline]
    fn set_high_byte(&mut self, value: u8) {
        *self = (*self & 0x00FF) | ((value as u16) << 8);
    }
}

pub trait U8Ext {
    fn low_nibble(self) -> u8;
    fn high_nibble(self) -> u8;
}

impl U8Ext for u8 {
    #[inline]
    fn low_nibble(self) -> u8 {
        self & 0x0F
    }

    #[inline]
    fn high_nibble(self) -> u8 {
        self >> 4
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_word_access() {
        let mut value: u32 = 0x1234_5678;
        assert_eq!(value.low_word(), 0x5678);
        assert_eq!(value.high_word(), 0x1234);
        value.set_low_word(0xAAAA);
        value.set_high_word(0xBBBB);
        assert_eq!(value, 0xBBBB_AAAA);
    }

    #[test]
    fn test_byte_access() {
        let mut value: u16 = 0x1234;
        assert_eq!(value.low_byte(), 0x34);
        assert_eq!(value.high_byte(), 0x12);
        value.set_low_byte(0xCD);
        value.set_high_byte(0xAB);
        assert_eq!(value, 0xABCD);
    }
}
