//! Bit-addressed, endian-aware input stream.
//!
//! `InputStream` is the one place raw bytes are turned into field values.
//! Every address taken or returned anywhere else in the crate is a bit
//! offset into a stream built here.

use crate::endian::Endian;
use crate::error::{CoreError, Result};
use bytes::Bytes;

/// Total size of a stream, known up front or discovered on demand.
///
/// Only the in-memory backing (`InputStream::from_bytes`) is implemented in
/// this core, so in practice every stream has a known size the moment it's
/// constructed; the `Unknown` arm exists so a future streaming source (e.g.
/// piped stdin, read ahead-of-need) only has to implement `probe` without
/// touching any call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamSize {
    Known(u64),
    Unknown,
}

/// A random-access, bit-addressed view over a byte buffer.
///
/// `size` (in bits) is monotonic: once known it never shrinks or changes to
/// a different value. `source_description` is purely informational (shown
/// in diagnostics), and `endian_default` records the endianness the root
/// parser was constructed with, for callers that want it without walking
/// to the root field set.
#[derive(Debug, Clone)]
pub struct InputStream {
    data: Bytes,
    size: StreamSize,
    endian_default: Endian,
    source_description: String,
}

impl InputStream {
    /// Build a stream over an owned, already-complete byte buffer.
    pub fn from_bytes(data: impl Into<Bytes>, endian_default: Endian, source_description: impl Into<String>) -> Self {
        let data = data.into();
        let size = StreamSize::Known(data.len() as u64 * 8);
        InputStream { data, size, endian_default, source_description: source_description.into() }
    }

    pub fn endian_default(&self) -> Endian {
        self.endian_default
    }

    pub fn source_description(&self) -> &str {
        &self.source_description
    }

    /// Size in bits, if known.
    pub fn size(&self) -> Option<u64> {
        match self.size {
            StreamSize::Known(n) => Some(n),
            StreamSize::Unknown => None,
        }
    }

    /// Cheap (when size is known) or probing check that the stream holds
    /// at least `n` bits.
    pub fn size_ge(&self, n: u64) -> bool {
        match self.size {
            StreamSize::Known(size) => size >= n,
            StreamSize::Unknown => (n / 8) as usize <= self.data.len(),
        }
    }

    fn ensure_within(&self, end_bit: u64) -> Result<()> {
        if let Some(size) = self.size() {
            if end_bit > size {
                return Err(CoreError::input_stream(end_bit, "read beyond known end of stream"));
            }
        }
        Ok(())
    }

    /// Read `nbits` (1..=64) starting at bit offset `offset`, interpreted
    /// per `endian`'s packing convention (see the crate-level docs on bit
    /// numbering). Never crosses the endian convention within one call.
    pub fn read_bits(&self, offset: u64, nbits: u32, endian: Endian) -> Result<u64> {
        if !(1..=64).contains(&nbits) {
            return Err(CoreError::input_stream(offset, format!("read_bits: nbits {nbits} out of 1..=64")));
        }
        self.ensure_within(offset + nbits as u64)?;

        let start_byte = (offset / 8) as usize;
        let start_bit = (offset % 8) as u32;
        let total_bits = start_bit + nbits;
        let nbytes = total_bits.div_ceil(8) as usize;
        let window = self.raw_bytes(start_byte, nbytes, offset)?;

        match endian {
            Endian::Big => {
                let mut acc: u128 = 0;
                for &b in window {
                    acc = (acc << 8) | b as u128;
                }
                let total = nbytes as u32 * 8;
                let shift = total - start_bit - nbits;
                let mask = mask_for(nbits);
                Ok(((acc >> shift) & mask) as u64)
            }
            Endian::Little => {
                let mut acc: u128 = 0;
                for (i, &b) in window.iter().enumerate() {
                    acc |= (b as u128) << (8 * i);
                }
                let mask = mask_for(nbits);
                Ok(((acc >> start_bit) & mask) as u64)
            }
        }
    }

    /// Read a whole-byte window. `offset` must be byte-aligned.
    pub fn read_bytes(&self, offset: u64, nbytes: u64) -> Result<&[u8]> {
        if offset % 8 != 0 {
            return Err(CoreError::input_stream(offset, "read_bytes: offset is not byte-aligned"));
        }
        self.ensure_within(offset + nbytes * 8)?;
        self.raw_bytes((offset / 8) as usize, nbytes as usize, offset)
    }

    fn raw_bytes(&self, start_byte: usize, nbytes: usize, offset_bits: u64) -> Result<&[u8]> {
        let end = start_byte + nbytes;
        self.data
            .get(start_byte..end)
            .ok_or_else(|| CoreError::input_stream(offset_bits, "read past end of underlying buffer"))
    }

    /// Decode a (possibly bit-packed) two's-complement integer.
    pub fn read_integer(&self, offset: u64, signed: bool, nbits: u32, endian: Endian) -> Result<i64> {
        let raw = self.read_bits(offset, nbits, endian)?;
        if signed && nbits < 64 && (raw & (1 << (nbits - 1))) != 0 {
            // sign-extend into i64
            let sign_extended = raw | (!0u64 << nbits);
            Ok(sign_extended as i64)
        } else {
            Ok(raw as i64)
        }
    }

    /// Decode an IEEE-754 binary32/binary64 float. `offset` must be
    /// byte-aligned; extended 80-bit floats are reconstructed by the
    /// `Float80` composite instead of here (see `formats::float`).
    pub fn read_float(&self, offset: u64, double: bool, endian: Endian) -> Result<f64> {
        let nbytes = if double { 8 } else { 4 };
        let bytes = self.read_bytes(offset, nbytes)?;
        Ok(match (double, endian) {
            (false, Endian::Big) => f32::from_be_bytes(bytes.try_into().unwrap()) as f64,
            (false, Endian::Little) => f32::from_le_bytes(bytes.try_into().unwrap()) as f64,
            (true, Endian::Big) => f64::from_be_bytes(bytes.try_into().unwrap()),
            (true, Endian::Little) => f64::from_le_bytes(bytes.try_into().unwrap()),
        })
    }

    /// Find the first byte-aligned occurrence of `pattern` at or after
    /// `start` (bits), before `end` (bits, exclusive) if given.
    pub fn search_bytes(&self, pattern: &[u8], start: u64, end: Option<u64>) -> Option<u64> {
        if pattern.is_empty() || start % 8 != 0 {
            return None;
        }
        let start_byte = (start / 8) as usize;
        let end_byte = match end {
            Some(e) => ((e + 7) / 8) as usize,
            None => self.data.len(),
        };
        let haystack = self.data.get(start_byte..end_byte.min(self.data.len()))?;
        memchr::memmem::find(haystack, pattern).map(|pos| (start_byte + pos) as u64 * 8)
    }
}

fn mask_for(nbits: u32) -> u128 {
    if nbits >= 128 { u128::MAX } else { (1u128 << nbits) - 1 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn big_endian_float64_is_negative_two() {
        let bytes: [u8; 8] = [0xc0, 0, 0, 0, 0, 0, 0, 0];
        let stream = InputStream::from_bytes(bytes.to_vec(), Endian::Big, "test");
        assert_eq!(stream.read_float(0, true, Endian::Big).unwrap(), -2.0);
    }

    #[test]
    fn read_bits_big_endian_matches_byte_read() {
        let bytes: [u8; 2] = [0b1010_0000, 0b0000_0000];
        let stream = InputStream::from_bytes(bytes.to_vec(), Endian::Big, "test");
        assert_eq!(stream.read_bits(0, 4, Endian::Big).unwrap(), 0b1010);
    }

    #[test]
    fn read_bytes_rejects_unaligned_offset() {
        let stream = InputStream::from_bytes(vec![0u8; 4], Endian::Big, "test");
        assert!(stream.read_bytes(3, 1).is_err());
    }

    #[test]
    fn search_bytes_finds_byte_aligned_pattern() {
        let stream = InputStream::from_bytes(b"xx!<arch>\ny".to_vec(), Endian::Big, "test");
        assert_eq!(stream.search_bytes(b"!<arch>\n", 0, None), Some(2 * 8));
    }

    #[test]
    fn size_ge_reflects_known_size() {
        let stream = InputStream::from_bytes(vec![0u8; 4], Endian::Big, "test");
        assert!(stream.size_ge(32));
        assert!(!stream.size_ge(33));
    }
}
