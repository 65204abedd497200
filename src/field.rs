//! Leaf field kinds: everything that bottoms out in a direct stream read
//! rather than a nested field set.
//!
//! A [`LeafKind`] knows how to size itself (`static_size_bits`, or
//! `compute_size_bits` when the size depends on the stream content, e.g. a
//! `CString`'s null terminator), and how to decode its [`Value`] and
//! display strings from the owning stream.

use chrono::{DateTime, TimeZone, Utc};

use crate::endian::Endian;
use crate::error::{CoreError, Result};
use crate::stream::InputStream;
use crate::value::Value;

/// Character sets leaf strings may be decoded with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charset {
    Ascii,
    Utf8,
    Utf16Le,
    Utf16Be,
    Iso8859_1,
}

impl Charset {
    fn decode(self, bytes: &[u8]) -> String {
        match self {
            Charset::Ascii | Charset::Utf8 => {
                String::from_utf8(bytes.to_vec()).unwrap_or_else(|_| lossy_escape(bytes))
            }
            Charset::Iso8859_1 => {
                let (text, _, had_errors) = encoding_rs::WINDOWS_1252.decode(bytes);
                if had_errors { lossy_escape(bytes) } else { text.into_owned() }
            }
            Charset::Utf16Le => {
                let (text, _, had_errors) = encoding_rs::UTF_16LE.decode(bytes);
                if had_errors { lossy_escape(bytes) } else { text.into_owned() }
            }
            Charset::Utf16Be => {
                let (text, _, had_errors) = encoding_rs::UTF_16BE.decode(bytes);
                if had_errors { lossy_escape(bytes) } else { text.into_owned() }
            }
        }
    }
}

/// Lossless byte-escape rendering used when charset decoding fails.
fn lossy_escape(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 4);
    for &b in bytes {
        if b.is_ascii_graphic() || b == b' ' {
            out.push(b as char);
        } else {
            out.push_str(&format!("\\x{b:02x}"));
        }
    }
    out
}

/// Mac epoch (1904-01-01 00:00 UTC) used by `TimestampMac32`/`TimestampMac64`.
fn mac_epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(1904, 1, 1, 0, 0, 0).unwrap()
}

/// A concrete leaf kind, independent of where it sits in the tree.
#[derive(Debug, Clone)]
pub enum LeafKind {
    Bit,
    /// An arbitrary-width (1..=64) bitfield.
    Bits(u32),
    UInt8,
    UInt16,
    UInt24,
    UInt32,
    UInt64,
    Int8,
    Int16,
    Int32,
    Int64,
    /// IEEE-754 binary32. Byte-aligned.
    Float32,
    /// IEEE-754 binary64. Byte-aligned.
    Float64,
    /// Fixed-byte-count string; `strip` trims the given bytes from both
    /// ends after decoding (e.g. AU's `info` field strips `" \0"`).
    StringFixed { nbytes: u32, charset: Charset, strip: Option<Vec<u8>> },
    /// Reads up to and including a null terminator.
    CString { charset: Charset },
    /// 1-byte length prefix followed by that many bytes of payload.
    PascalString8 { charset: Charset },
    /// 2-byte length prefix (in `endian`) followed by payload.
    PascalString16 { charset: Charset },
    Bytes(u32),
    RawBytes(u32),
    /// Bytes that must decode to all-zero; a `ParserError` otherwise.
    NullBytes(u32),
    PaddingBytes { nbytes: u32, pattern: Option<u8> },
    PaddingBits { nbits: u32, pattern: Option<u64> },
    NullField(u32),
    TimestampMac32,
    TimestampMac64,
    /// Decorator: displays `mapping.get(value)` or the value's hex
    /// rendering when absent. `inner` must decode to `Value::UInt`/`Int`.
    Enum { inner: Box<LeafKind>, mapping: &'static phf::Map<u64, &'static str> },
}

impl LeafKind {
    /// Size in bits when fixed at construction (doesn't depend on stream
    /// content); `None` means `compute_size_bits` must be called.
    pub fn static_size_bits(&self) -> Option<u64> {
        use LeafKind::*;
        match self {
            Bit => Some(1),
            Bits(n) => Some(*n as u64),
            UInt8 | Int8 => Some(8),
            UInt16 | Int16 => Some(16),
            UInt24 => Some(24),
            UInt32 | Int32 => Some(32),
            UInt64 | Int64 => Some(64),
            Float32 => Some(32),
            Float64 => Some(64),
            StringFixed { nbytes, .. } => Some(*nbytes as u64 * 8),
            Bytes(n) | RawBytes(n) | NullBytes(n) => Some(*n as u64 * 8),
            PaddingBytes { nbytes, .. } => Some(*nbytes as u64 * 8),
            PaddingBits { nbits, .. } => Some(*nbits as u64),
            NullField(n) => Some(*n as u64),
            TimestampMac32 => Some(32),
            TimestampMac64 => Some(64),
            CString { .. } | PascalString8 { .. } | PascalString16 { .. } => None,
            Enum { inner, .. } => inner.static_size_bits(),
        }
    }

    /// Compute the size in bits for kinds whose size depends on the
    /// stream content, given the field's absolute bit address.
    pub fn compute_size_bits(&self, stream: &InputStream, absolute_address: u64, endian: Endian, path: &str) -> Result<u64> {
        if let Some(n) = self.static_size_bits() {
            return Ok(n);
        }
        match self {
            LeafKind::CString { .. } => match stream.search_bytes(&[0], absolute_address, None) {
                Some(nul_offset) => Ok(nul_offset - absolute_address + 8),
                None => Err(CoreError::parser(path, "CString: no null terminator before end of stream")),
            },
            LeafKind::PascalString8 { .. } => {
                let len = stream.read_bits(absolute_address, 8, endian)?;
                Ok((1 + len) * 8)
            }
            LeafKind::PascalString16 { .. } => {
                let len = stream.read_bits(absolute_address, 16, endian)?;
                Ok((2 + len) * 8)
            }
            LeafKind::Enum { inner, .. } => inner.compute_size_bits(stream, absolute_address, endian, path),
            other => unreachable!("{other:?} has a static size"),
        }
    }

    /// Decode this leaf's value from the stream.
    pub fn decode_value(&self, stream: &InputStream, absolute_address: u64, size_bits: u64, endian: Endian, path: &str) -> Result<Value> {
        use LeafKind::*;
        match self {
            Bit => Ok(Value::UInt(stream.read_bits(absolute_address, 1, endian)?)),
            Bits(n) => Ok(Value::UInt(stream.read_bits(absolute_address, *n, endian)?)),
            UInt8 => Ok(Value::UInt(stream.read_bits(absolute_address, 8, endian)?)),
            UInt16 => Ok(Value::UInt(stream.read_bits(absolute_address, 16, endian)?)),
            UInt24 => Ok(Value::UInt(stream.read_bits(absolute_address, 24, endian)?)),
            UInt32 => Ok(Value::UInt(stream.read_bits(absolute_address, 32, endian)?)),
            UInt64 => Ok(Value::UInt(stream.read_bits(absolute_address, 64, endian)?)),
            Int8 => Ok(Value::Int(stream.read_integer(absolute_address, true, 8, endian)?)),
            Int16 => Ok(Value::Int(stream.read_integer(absolute_address, true, 16, endian)?)),
            Int32 => Ok(Value::Int(stream.read_integer(absolute_address, true, 32, endian)?)),
            Int64 => Ok(Value::Int(stream.read_integer(absolute_address, true, 64, endian)?)),
            Float32 => Ok(Value::Float(stream.read_float(absolute_address, false, endian)?)),
            Float64 => Ok(Value::Float(stream.read_float(absolute_address, true, endian)?)),
            StringFixed { charset, strip, .. } => {
                let bytes = stream.read_bytes(absolute_address, size_bits / 8)?;
                let mut text = charset.decode(bytes);
                if let Some(strip) = strip {
                    let strip_chars: Vec<char> = strip.iter().map(|&b| b as char).collect();
                    text = text.trim_matches(|c| strip_chars.contains(&c)).to_string();
                }
                Ok(Value::Str(text))
            }
            CString { charset } => {
                let nbytes = size_bits / 8 - 1;
                let bytes = stream.read_bytes(absolute_address, nbytes)?;
                Ok(Value::Str(charset.decode(bytes)))
            }
            PascalString8 { charset } => {
                let nbytes = size_bits / 8 - 1;
                let bytes = stream.read_bytes(absolute_address + 8, nbytes)?;
                Ok(Value::Str(charset.decode(bytes)))
            }
            PascalString16 { charset } => {
                let nbytes = size_bits / 8 - 2;
                let bytes = stream.read_bytes(absolute_address + 16, nbytes)?;
                Ok(Value::Str(charset.decode(bytes)))
            }
            Bytes(_) | RawBytes(_) => {
                let bytes = stream.read_bytes(absolute_address, size_bits / 8)?;
                Ok(Value::Bytes(bytes.to_vec().into()))
            }
            NullBytes(_) => {
                let bytes = stream.read_bytes(absolute_address, size_bits / 8)?;
                if bytes.iter().any(|&b| b != 0) {
                    return Err(CoreError::parser(path, "NullBytes: non-zero byte in a field required to be all-zero"));
                }
                Ok(Value::Bytes(bytes.to_vec().into()))
            }
            PaddingBytes { .. } => {
                let bytes = stream.read_bytes(absolute_address, size_bits / 8)?;
                Ok(Value::Bytes(bytes.to_vec().into()))
            }
            PaddingBits { .. } => Ok(Value::UInt(stream.read_bits(absolute_address, size_bits.min(64) as u32, endian)?)),
            NullField(_) => Ok(Value::UInt(0)),
            TimestampMac32 => {
                let secs = stream.read_bits(absolute_address, 32, endian)?;
                Ok(Value::Timestamp(mac_epoch() + chrono::Duration::seconds(secs as i64)))
            }
            TimestampMac64 => {
                let secs = stream.read_bits(absolute_address, 64, endian)?;
                Ok(Value::Timestamp(mac_epoch() + chrono::Duration::seconds(secs as i64)))
            }
            Enum { inner, .. } => inner.decode_value(stream, absolute_address, size_bits, endian, path),
        }
    }

    /// Human-readable display string for an already-decoded value.
    pub fn display(&self, value: &Value, stream: &InputStream, absolute_address: u64, size_bits: u64) -> String {
        match self {
            LeafKind::Enum { mapping, .. } => {
                let raw = value.as_u64().unwrap_or(0);
                match mapping.get(&raw) {
                    Some(name) => name.to_string(),
                    None => format!("{raw:#x}"),
                }
            }
            _ => match value {
                Value::UInt(v) => v.to_string(),
                Value::Int(v) => v.to_string(),
                Value::Float(v) => v.to_string(),
                Value::Str(s) => s.clone(),
                Value::Bytes(b) => lossy_escape(b),
                Value::Timestamp(t) => t.to_rfc3339(),
                Value::Set => self.raw_display(stream, absolute_address, size_bits),
            },
        }
    }

    /// Fallback raw rendering: a hex byte dump, used when a charset fails
    /// to decode or the caller explicitly wants the underlying bytes.
    pub fn raw_display(&self, stream: &InputStream, absolute_address: u64, size_bits: u64) -> String {
        match stream.read_bytes(absolute_address, size_bits / 8) {
            Ok(bytes) => bytes.iter().map(|b| format!("{b:02x}")).collect::<Vec<_>>().join(" "),
            Err(_) => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cstring_size_includes_terminator() {
        let stream = InputStream::from_bytes(b"abc\0".to_vec(), Endian::Big, "test");
        let kind = LeafKind::CString { charset: Charset::Ascii };
        let size = kind.compute_size_bits(&stream, 0, Endian::Big, "/x").unwrap();
        assert_eq!(size, 4 * 8);
        let value = kind.decode_value(&stream, 0, size, Endian::Big, "/x").unwrap();
        assert_eq!(value.as_str(), Some("abc"));
    }

    #[test]
    fn enum_of_cstring_computes_size_through_the_inner_kind() {
        static MAP: phf::Map<u64, &'static str> = phf::phf_map! { 0u64 => "zero" };
        let stream = InputStream::from_bytes(b"abc\0".to_vec(), Endian::Big, "test");
        let kind = LeafKind::Enum { inner: Box::new(LeafKind::CString { charset: Charset::Ascii }), mapping: &MAP };
        let size = kind.compute_size_bits(&stream, 0, Endian::Big, "/x").unwrap();
        assert_eq!(size, 4 * 8);
    }

    #[test]
    fn enum_display_falls_back_to_hex() {
        static MAP: phf::Map<u64, &'static str> = phf::phf_map! { 1u64 => "one" };
        let stream = InputStream::from_bytes(vec![2u8], Endian::Big, "test");
        let kind = LeafKind::Enum { inner: Box::new(LeafKind::UInt8), mapping: &MAP };
        let value = kind.decode_value(&stream, 0, 8, Endian::Big, "/x").unwrap();
        assert_eq!(kind.display(&value, &stream, 0, 8), "0x2");
    }

    #[test]
    fn float64_big_endian_decodes_negative_two() {
        let stream = InputStream::from_bytes(vec![0xc0, 0, 0, 0, 0, 0, 0, 0], Endian::Big, "test");
        let value = LeafKind::Float64.decode_value(&stream, 0, 64, Endian::Big, "/x").unwrap();
        assert_eq!(value, Value::Float(-2.0));
    }

    #[test]
    fn null_bytes_rejects_non_zero_content() {
        let stream = InputStream::from_bytes(vec![1u8, 0], Endian::Big, "test");
        let kind = LeafKind::NullBytes(2);
        assert!(kind.decode_value(&stream, 0, 16, Endian::Big, "/x").is_err());
    }
}
