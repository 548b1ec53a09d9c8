//! Unsigned Integer mit variabler Laenge.
//!
//! 7-Bit-Gruppen, niederwertigste Gruppe zuerst; das MSB jedes Oktetts ist das
//! Fortsetzungsbit.

use crate::bitstream::{BitReader, BitWriter};
use crate::{Error, Result};

pub fn encode(writer: &mut BitWriter, value: u64) {
    let mut v = value;
    loop {
        let low7 = v & 0x7F;
        v >>= 7;
        if v == 0 {
            writer.write_bits(low7, 8);
            return;
        }
        writer.write_bits(0x80 | low7, 8);
    }
}

pub fn decode(reader: &mut BitReader) -> Result<u64> {
    let mut result = 0u64;
    let mut shift = 0u32;
    loop {
        let octet = reader.read_bits(8)?;
        let data = octet & 0x7F;
        // im 10. Oktett ist nur noch Bit 0 gueltig
        if shift == 63 && (data > 1 || octet & 0x80 != 0) {
            return Err(Error::IntegerOverflow);
        }
        result |= data << shift;
        if octet & 0x80 == 0 {
            return Ok(result);
        }
        shift += 7;
    }
}

/// Anzahl Oktette die `value` belegt.
pub fn encoded_len(value: u64) -> usize {
    let bits = 64 - value.leading_zeros() as usize;
    bits.div_ceil(7).max(1)
}
