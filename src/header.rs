//! EXI Header.
//!
//! Aufbau:
//! - `$EXI` Cookie (optional, nur beim Decodieren toleriert)
//! - Distinguishing Bits `10`
//! - Presence Bit fuer Header-Options (hier immer 0)
//! - Format-Version: Preview-Bit + 4-Bit-Chunks fuer `version - 1`
//!
//! Das feste Options-Profil (bit-packed, keine Kompression) steht nie im
//! Header; ein gesetztes Presence Bit wird als Decode-Fehler abgewiesen.
//! Ohne Cookie ist der Header genau ein Byte: `0x80`.

use crate::bitstream::{BitReader, BitWriter};
use crate::n_bit_unsigned_integer;
use crate::{Error, Result};

const EXI_COOKIE: [u8; 4] = *b"$EXI";

const DISTINGUISHING_BITS: u64 = 0b10;

/// Einzige unterstuetzte Format-Version (Final 1).
pub const FORMAT_VERSION: u16 = 1;

/// Zustandsname fuer Fehler, die im Header auftreten.
const STATE: &str = "Header";

/// Was der Decoder im Header gesehen hat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExiHeader {
    pub cookie: bool,
    pub version: u16,
}

/// Schreibt den Header des festen Profils (Final Version 1, keine Options).
pub fn encode(writer: &mut BitWriter) {
    writer.write_bits(DISTINGUISHING_BITS, 2);
    writer.write_bit(false);
    // Final, version - 1 = 0 in einem Chunk
    writer.write_bit(false);
    writer.write_bits(u64::from(FORMAT_VERSION - 1), 4);
}

/// Liest den Header und prueft, dass er zum festen Profil passt.
pub fn decode(reader: &mut BitReader) -> Result<ExiHeader> {
    let cookie = try_decode_cookie(reader)?;

    let bits = n_bit_unsigned_integer::decode(reader, 2).map_err(|e| lift(reader, e))?;
    if bits != DISTINGUISHING_BITS {
        return Err(header_error(
            reader,
            format!("invalid distinguishing bits {bits:02b}, expected 10"),
        ));
    }

    let options_present = reader.read_bit().map_err(|e| lift(reader, e))?;
    if options_present {
        return Err(header_error(
            reader,
            "EXI options in header are not supported by this profile",
        ));
    }

    let preview = reader.read_bit().map_err(|e| lift(reader, e))?;
    let version = decode_version(reader)?;
    if preview || version != FORMAT_VERSION {
        return Err(header_error(
            reader,
            format!(
                "unsupported EXI format version {}{version}",
                if preview { "preview " } else { "" }
            ),
        ));
    }

    Ok(ExiHeader { cookie, version })
}

/// Konsumiert `$EXI` falls vorhanden, sonst bleibt der Reader stehen.
fn try_decode_cookie(reader: &mut BitReader) -> Result<bool> {
    let checkpoint = *reader;
    match reader.read_bytes(EXI_COOKIE.len()) {
        Ok(bytes) if bytes == EXI_COOKIE => Ok(true),
        Ok(bytes) if bytes[0] == EXI_COOKIE[0] && bytes[1] == EXI_COOKIE[1] => Err(header_error(
            &checkpoint,
            "malformed EXI cookie",
        )),
        _ => {
            *reader = checkpoint;
            Ok(false)
        }
    }
}

fn decode_version(reader: &mut BitReader) -> Result<u16> {
    let mut version: u16 = 1;
    loop {
        let chunk = n_bit_unsigned_integer::decode(reader, 4).map_err(|e| lift(reader, e))? as u16;
        version = version.saturating_add(chunk);
        if chunk < 15 {
            return Ok(version);
        }
    }
}

fn header_error(reader: &BitReader, message: impl Into<String>) -> Error {
    Error::Decode {
        offset: reader.byte_offset(),
        state: STATE.into(),
        message: message.into(),
    }
}

fn lift(reader: &BitReader, e: Error) -> Error {
    header_error(reader, e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded() -> Vec<u8> {
        let mut w = BitWriter::new();
        encode(&mut w);
        w.into_vec()
    }

    #[test]
    fn header_ist_ein_byte() {
        assert_eq!(encoded(), vec![0x80]);
    }

    #[test]
    fn round_trip_ohne_cookie() {
        let data = encoded();
        let mut r = BitReader::new(&data);
        let h = decode(&mut r).unwrap();
        assert_eq!(h, ExiHeader { cookie: false, version: 1 });
        assert_eq!(r.bit_position(), 8);
    }

    #[test]
    fn cookie_wird_toleriert() {
        let data = [b'$', b'E', b'X', b'I', 0x80];
        let mut r = BitReader::new(&data);
        let h = decode(&mut r).unwrap();
        assert!(h.cookie);
        assert_eq!(r.bit_position(), 40);
    }

    #[test]
    fn kaputtes_cookie() {
        let data = [b'$', b'E', b'X', b'X', 0x80];
        let err = decode(&mut BitReader::new(&data)).unwrap_err();
        assert!(matches!(err, Error::Decode { offset: 0, .. }), "{err}");
    }

    #[test]
    fn falsche_distinguishing_bits() {
        let err = decode(&mut BitReader::new(&[0x40])).unwrap_err();
        assert!(err.to_string().contains("distinguishing bits"));
    }

    #[test]
    fn options_bit_abgelehnt() {
        // 10 1 0 0000
        let err = decode(&mut BitReader::new(&[0xA0])).unwrap_err();
        assert!(err.to_string().contains("options"));
    }

    #[test]
    fn preview_und_version_2_abgelehnt() {
        // 10 0 1 0000 -> preview 1
        assert!(decode(&mut BitReader::new(&[0x90])).is_err());
        // 10 0 0 0001 -> version 2
        assert!(decode(&mut BitReader::new(&[0x81])).is_err());
    }

    #[test]
    fn leerer_stream() {
        let err = decode(&mut BitReader::new(&[])).unwrap_err();
        assert!(matches!(err, Error::Decode { offset: 0, ref state, .. } if state == "Header"));
    }
}
