//! n-Bit Unsigned Integer: Wert in genau `n` Bits, `n = 0` laesst den Wert weg.

use crate::bitstream::{BitReader, BitWriter};
use crate::{Error, Result};

/// Schreibt `value` in `n` Bits.
///
/// Werte die nicht in `n` Bits passen sind ein Encode-Fehler, kein stilles Abschneiden.
pub fn encode(writer: &mut BitWriter, value: u64, n: u8) -> Result<()> {
    if n < 64 && value >> n != 0 {
        return Err(Error::encode(format!("value {value} does not fit in {n} bits")));
    }
    writer.write_bits(value, n);
    Ok(())
}

#[inline]
pub fn decode(reader: &mut BitReader, n: u8) -> Result<u64> {
    reader.read_bits(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_bits_omitted() {
        let mut w = BitWriter::new();
        encode(&mut w, 0, 0).unwrap();
        assert_eq!(w.bit_position(), 0);
        assert!(w.into_vec().is_empty());
        assert_eq!(decode(&mut BitReader::new(&[]), 0).unwrap(), 0);
    }

    #[test]
    fn three_bit_values() {
        for val in 0..8u64 {
            let mut w = BitWriter::new();
            encode(&mut w, val, 3).unwrap();
            let data = w.into_vec();
            assert_eq!(decode(&mut BitReader::new(&data), 3).unwrap(), val);
        }
    }

    #[test]
    fn too_wide_is_rejected() {
        let mut w = BitWriter::new();
        assert!(matches!(encode(&mut w, 8, 3), Err(Error::Encode { .. })));
        assert_eq!(w.bit_position(), 0);
    }
}
