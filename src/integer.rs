//! Integer-Darstellungen.
//!
//! - Vorzeichenbehaftet: 1 Vorzeichenbit, danach der Betrag als Unsigned
//!   Integer; negative Werte tragen den Betrag `-value - 1`.
//! - Beschraenkt (`max - min < 4096`): n-Bit-Offset von `min`.

use crate::bitstream::{BitReader, BitWriter};
use crate::{Error, Result, bit_width, n_bit_unsigned_integer, unsigned_integer};

/// Groesster Bereich (`max - min + 1`) fuer die n-Bit-Darstellung.
pub const MAX_BOUNDED_RANGE: i128 = 4096;

pub fn encode(writer: &mut BitWriter, value: i64) {
    if value >= 0 {
        writer.write_bit(false);
        unsigned_integer::encode(writer, value as u64);
    } else {
        writer.write_bit(true);
        // !v == -v - 1, auch fuer i64::MIN
        unsigned_integer::encode(writer, !(value as u64));
    }
}

pub fn decode(reader: &mut BitReader) -> Result<i64> {
    let negative = reader.read_bit()?;
    let magnitude = unsigned_integer::decode(reader)?;
    if magnitude > i64::MAX as u64 {
        return Err(Error::IntegerOverflow);
    }
    Ok(if negative { -(magnitude as i64) - 1 } else { magnitude as i64 })
}

/// Schreibt `value` als Offset von `min` in `ceil(log2(max - min + 1))` Bits.
pub fn encode_bounded(writer: &mut BitWriter, value: i64, min: i64, max: i64) -> Result<()> {
    if value < min || value > max {
        return Err(Error::encode(format!("value {value} outside [{min}, {max}]")));
    }
    let bits = bounded_bits(min, max)?;
    n_bit_unsigned_integer::encode(writer, (i128::from(value) - i128::from(min)) as u64, bits)
}

pub fn decode_bounded(reader: &mut BitReader, min: i64, max: i64) -> Result<i64> {
    let bits = bounded_bits(min, max)?;
    let offset = n_bit_unsigned_integer::decode(reader, bits)?;
    let value = i128::from(min) + i128::from(offset);
    if value > i128::from(max) {
        return Err(Error::IntegerOverflow);
    }
    Ok(value as i64)
}

fn bounded_bits(min: i64, max: i64) -> Result<u8> {
    let (min, max) = (i128::from(min), i128::from(max));
    if max - min + 1 > MAX_BOUNDED_RANGE {
        return Err(Error::encode(format!("range [{min}, {max}] too wide for n-bit integer")));
    }
    bit_width::for_range(min, max)
        .ok_or_else(|| Error::encode(format!("empty integer range [{min}, {max}]")))
}
