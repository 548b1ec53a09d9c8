//! String-Literale: Zeichenanzahl als Unsigned Integer, danach jeder Code Point
//! als Unsigned Integer.
//!
//! Die String-Table-Varianten (Laenge + 1 fuer Local Names, Laenge + 2 fuer
//! Values) schreiben den Laengen-Offset selbst und nutzen [`encode_chars`] /
//! [`decode_chars`].

use crate::bitstream::{BitReader, BitWriter};
use crate::{Error, Result, unsigned_integer};

pub fn encode(writer: &mut BitWriter, value: &str) {
    unsigned_integer::encode(writer, char_count(value));
    encode_chars(writer, value);
}

pub fn decode(reader: &mut BitReader) -> Result<String> {
    let len = unsigned_integer::decode(reader)?;
    decode_chars(reader, len)
}

/// Code Points ohne Laengenpraefix.
pub fn encode_chars(writer: &mut BitWriter, value: &str) {
    if value.is_ascii() {
        // ASCII-Code-Points sind einzelne Oktette ohne Fortsetzungsbit
        writer.write_bytes(value.as_bytes());
    } else {
        for ch in value.chars() {
            unsigned_integer::encode(writer, u64::from(ch));
        }
    }
}

/// Liest `count` Code Points.
pub fn decode_chars(reader: &mut BitReader, count: u64) -> Result<String> {
    // jeder Code Point braucht mindestens ein Oktett
    if count.saturating_mul(8) > reader.remaining_bits() as u64 {
        return Err(Error::PrematureEndOfStream);
    }
    let mut s = String::with_capacity(count as usize);
    for _ in 0..count {
        let cp = unsigned_integer::decode(reader)?;
        let ch = u32::try_from(cp)
            .ok()
            .and_then(char::from_u32)
            .ok_or(Error::InvalidCodePoint(cp))?;
        s.push(ch);
    }
    Ok(s)
}

/// Zeichenanzahl (nicht Bytes).
pub fn char_count(value: &str) -> u64 {
    if value.is_ascii() {
        value.len() as u64
    } else {
        value.chars().count() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(value: &str) -> String {
        let mut w = BitWriter::new();
        encode(&mut w, value);
        let data = w.into_vec();
        decode(&mut BitReader::new(&data)).unwrap()
    }

    #[test]
    fn ascii_ist_bytegleich() {
        let mut w = BitWriter::new();
        encode(&mut w, "EVCC");
        assert_eq!(w.into_vec(), vec![4, b'E', b'V', b'C', b'C']);
    }

    #[test]
    fn nicht_ascii() {
        assert_eq!(round_trip("Ladesäule ⚡"), "Ladesäule ⚡");
        assert_eq!(round_trip(""), "");
    }

    #[test]
    fn surrogate_wird_abgelehnt() {
        let mut w = BitWriter::new();
        unsigned_integer::encode(&mut w, 1);
        unsigned_integer::encode(&mut w, 0xD800);
        let data = w.into_vec();
        assert_eq!(decode(&mut BitReader::new(&data)), Err(Error::InvalidCodePoint(0xD800)));
    }

    #[test]
    fn laenge_ueber_streamende() {
        let data = [50, b'a'];
        assert_eq!(decode(&mut BitReader::new(&data)), Err(Error::PrematureEndOfStream));
    }
}
