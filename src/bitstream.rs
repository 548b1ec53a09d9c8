//! Bit-packed Writer und Reader.
//!
//! Bits werden MSB-first gepackt: das erste geschriebene Bit landet in Bit 7
//! des ersten Bytes. Am Streamende wird mit Null-Bits auf die Bytegrenze
//! aufgefuellt.

use crate::{Error, Result};

/// Schreibt Bits in einen wachsenden Byte-Buffer.
///
/// Bits sammeln sich in `accum` und werden als volle Bytes nach `buf`
/// verschoben, sobald mindestens 8 Bits anliegen.
#[derive(Debug, Default)]
pub struct BitWriter {
    buf: Vec<u8>,
    accum: u64,
    /// Gueltige Bits in `accum` (nach jedem Flush < 8).
    accum_bits: u8,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    fn flush_full_bytes(&mut self) {
        while self.accum_bits >= 8 {
            self.accum_bits -= 8;
            self.buf.push((self.accum >> self.accum_bits) as u8);
        }
        self.accum &= (1u64 << self.accum_bits) - 1;
    }

    #[inline]
    pub fn write_bit(&mut self, bit: bool) {
        self.accum = (self.accum << 1) | u64::from(bit);
        self.accum_bits += 1;
        if self.accum_bits == 8 {
            self.flush_full_bytes();
        }
    }

    /// Schreibt die unteren `n` Bits von `value`, MSB first. `n == 0` schreibt nichts.
    pub fn write_bits(&mut self, value: u64, n: u8) {
        debug_assert!(n <= 64, "bit count must be 0..=64, got {n}");
        if n == 0 {
            return;
        }
        // in Haelften schreiben, damit accum (max. 7 Restbits) nie ueberlaeuft
        if n > 32 {
            self.write_bits(value >> 32, n - 32);
            self.write_bits(value & 0xFFFF_FFFF, 32);
            return;
        }
        let mask = (1u64 << n) - 1;
        self.accum = (self.accum << n) | (value & mask);
        self.accum_bits += n;
        self.flush_full_bytes();
    }

    /// Schreibt Bytes als 8-Bit-Gruppen; bei Bytegrenze direkt per `extend_from_slice`.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        if self.accum_bits == 0 {
            self.buf.extend_from_slice(bytes);
        } else {
            for &b in bytes {
                self.write_bits(u64::from(b), 8);
            }
        }
    }

    /// Fuellt mit Null-Bits bis zur naechsten Bytegrenze auf.
    pub fn align_to_byte(&mut self) {
        if self.accum_bits > 0 {
            self.buf.push((self.accum << (8 - self.accum_bits)) as u8);
            self.accum = 0;
            self.accum_bits = 0;
        }
    }

    /// Anzahl bisher geschriebener Bits.
    pub fn bit_position(&self) -> usize {
        self.buf.len() * 8 + usize::from(self.accum_bits)
    }

    /// Schliesst den Stream ab (Padding) und gibt die Bytes zurueck.
    pub fn into_vec(mut self) -> Vec<u8> {
        self.align_to_byte();
        self.buf
    }
}

/// Liest Bits MSB-first aus einem Byte-Slice.
///
/// Die Leseposition ist jederzeit als Bit- und Byte-Offset abfragbar; der
/// Decoder haengt den Byte-Offset an jeden Fehler.
#[derive(Debug, Clone, Copy)]
pub struct BitReader<'a> {
    data: &'a [u8],
    bit_pos: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, bit_pos: 0 }
    }

    #[inline]
    pub fn read_bit(&mut self) -> Result<bool> {
        let byte = *self
            .data
            .get(self.bit_pos / 8)
            .ok_or(Error::PrematureEndOfStream)?;
        let shift = 7 - (self.bit_pos % 8);
        self.bit_pos += 1;
        Ok((byte >> shift) & 1 == 1)
    }

    /// Liest `n` Bits (0..=64) als vorzeichenlose Zahl, MSB first.
    pub fn read_bits(&mut self, n: u8) -> Result<u64> {
        debug_assert!(n <= 64, "bit count must be 0..=64, got {n}");
        if usize::from(n) > self.remaining_bits() {
            // Position bleibt stehen, damit der Fehler-Offset auf den Anfang zeigt
            return Err(Error::PrematureEndOfStream);
        }
        let mut value = 0u64;
        let mut left = n;
        while left > 0 {
            let byte = self.data[self.bit_pos / 8];
            let used = (self.bit_pos % 8) as u8;
            let avail = 8 - used;
            let take = avail.min(left);
            let chunk = (byte >> (avail - take)) & ((1u16 << take) - 1) as u8;
            value = (value << take) | u64::from(chunk);
            self.bit_pos += usize::from(take);
            left -= take;
        }
        Ok(value)
    }

    /// Liest `len` Bytes als 8-Bit-Gruppen.
    pub fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        if len.saturating_mul(8) > self.remaining_bits() {
            return Err(Error::PrematureEndOfStream);
        }
        if self.bit_pos % 8 == 0 {
            let start = self.bit_pos / 8;
            self.bit_pos += len * 8;
            return Ok(self.data[start..start + len].to_vec());
        }
        (0..len).map(|_| self.read_bits(8).map(|b| b as u8)).collect()
    }

    pub fn bit_position(&self) -> usize {
        self.bit_pos
    }

    /// Byte in dem das naechste Bit liegt.
    pub fn byte_offset(&self) -> usize {
        self.bit_pos / 8
    }

    pub fn remaining_bits(&self) -> usize {
        (self.data.len() * 8).saturating_sub(self.bit_pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_bits_msb_first() {
        let mut w = BitWriter::new();
        w.write_bit(true);
        w.write_bit(false);
        w.write_bit(true);
        assert_eq!(w.bit_position(), 3);
        let data = w.into_vec();
        assert_eq!(data, vec![0b1010_0000]);

        let mut r = BitReader::new(&data);
        assert!(r.read_bit().unwrap());
        assert!(!r.read_bit().unwrap());
        assert!(r.read_bit().unwrap());
    }

    #[test]
    fn header_byte_layout() {
        // 10 | 0 | 0 0000 -> 0x80
        let mut w = BitWriter::new();
        w.write_bits(0b10, 2);
        w.write_bit(false);
        w.write_bit(false);
        w.write_bits(0, 4);
        assert_eq!(w.into_vec(), vec![0x80]);
    }

    #[test]
    fn bits_across_byte_boundary() {
        let mut w = BitWriter::new();
        w.write_bits(0b101, 3);
        w.write_bits(0xCAFE, 16);
        w.write_bits(0b1, 1);
        let data = w.into_vec();
        assert_eq!(data.len(), 3);

        let mut r = BitReader::new(&data);
        assert_eq!(r.read_bits(3).unwrap(), 0b101);
        assert_eq!(r.read_bits(16).unwrap(), 0xCAFE);
        assert_eq!(r.read_bits(1).unwrap(), 1);
    }

    #[test]
    fn full_64_bit_value() {
        let val = 0xDEAD_BEEF_CAFE_BABE;
        let mut w = BitWriter::new();
        w.write_bit(true);
        w.write_bits(val, 64);
        let data = w.into_vec();
        assert_eq!(data.len(), 9);

        let mut r = BitReader::new(&data);
        assert!(r.read_bit().unwrap());
        assert_eq!(r.read_bits(64).unwrap(), val);
    }

    #[test]
    fn zero_width_reads_nothing() {
        let mut r = BitReader::new(&[]);
        assert_eq!(r.read_bits(0).unwrap(), 0);
        assert_eq!(r.bit_position(), 0);
    }

    #[test]
    fn unaligned_bytes() {
        let mut w = BitWriter::new();
        w.write_bits(0b11, 2);
        w.write_bytes(&[0x12, 0x34]);
        let data = w.into_vec();

        let mut r = BitReader::new(&data);
        assert_eq!(r.read_bits(2).unwrap(), 0b11);
        assert_eq!(r.read_bytes(2).unwrap(), vec![0x12, 0x34]);
    }

    #[test]
    fn premature_end_keeps_position() {
        let data = [0xFF];
        let mut r = BitReader::new(&data);
        r.read_bits(5).unwrap();
        assert_eq!(r.read_bits(4), Err(Error::PrematureEndOfStream));
        assert_eq!(r.bit_position(), 5);
        assert_eq!(r.byte_offset(), 0);
        assert_eq!(r.read_bytes(1), Err(Error::PrematureEndOfStream));
    }
}
