//! Binary (xs:hexBinary, xs:base64Binary): Laenge als Unsigned Integer, dann die Oktette.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::bitstream::{BitReader, BitWriter};
use crate::{Result, unsigned_integer};

pub fn encode(writer: &mut BitWriter, value: &[u8]) {
    unsigned_integer::encode(writer, value.len() as u64);
    writer.write_bytes(value);
}

pub fn decode(reader: &mut BitReader) -> Result<Vec<u8>> {
    let len = unsigned_integer::decode(reader)?;
    // read_bytes prueft die Restlaenge, bevor allokiert wird
    let len = usize::try_from(len).map_err(|_| crate::Error::PrematureEndOfStream)?;
    reader.read_bytes(len)
}

/// Lexikalische Form von xs:hexBinary (Gross- und Kleinbuchstaben).
pub fn parse_hex(text: &str) -> Option<Vec<u8>> {
    let text = text.trim();
    if text.len() % 2 != 0 {
        return None;
    }
    (0..text.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(text.get(i..i + 2)?, 16).ok())
        .collect()
}

/// Kanonische xs:hexBinary-Form (Grossbuchstaben).
pub fn to_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02X}");
    }
    out
}

pub fn parse_base64(text: &str) -> Option<Vec<u8>> {
    let compact: String = text.split_ascii_whitespace().collect();
    STANDARD.decode(compact).ok()
}

pub fn to_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}
