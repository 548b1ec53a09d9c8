//! Boolean: ein Bit, 1 = true.

use crate::Result;
use crate::bitstream::{BitReader, BitWriter};

#[inline]
pub fn encode(writer: &mut BitWriter, value: bool) {
    writer.write_bit(value);
}

#[inline]
pub fn decode(reader: &mut BitReader) -> Result<bool> {
    reader.read_bit()
}

/// Lexikalische Form nach xs:boolean (`true`, `false`, `1`, `0`, Whitespace egal).
pub fn parse_lexical(text: &str) -> Option<bool> {
    match text.trim() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ein_bit() {
        let mut w = BitWriter::new();
        encode(&mut w, true);
        encode(&mut w, false);
        encode(&mut w, true);
        assert_eq!(w.bit_position(), 3);
        let data = w.into_vec();
        assert_eq!(data, vec![0b1010_0000]);
        let mut r = BitReader::new(&data);
        assert!(decode(&mut r).unwrap());
        assert!(!decode(&mut r).unwrap());
    }

    #[test]
    fn lexikalische_formen() {
        assert_eq!(parse_lexical(" true "), Some(true));
        assert_eq!(parse_lexical("0"), Some(false));
        assert_eq!(parse_lexical("yes"), None);
    }
}
