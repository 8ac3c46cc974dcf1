// ABOUTME: Primitive sink and source used beneath the codec: big-endian scalars, UTF and bulk arrays.
// ABOUTME: Strings use a 32-bit length prefix and modified UTF-8 (NUL as C0 80, surrogate pairs).

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

use crate::error::{Error, Result};
use std::io::Write;

/// Validate and convert bytes to a UTF-8 string.
/// Uses simdutf8 for SIMD-accelerated validation when the feature is enabled.
#[cfg(feature = "simd-utf8")]
#[inline]
fn validate_utf8(bytes: &[u8]) -> Result<&str> {
    simdutf8::basic::from_utf8(bytes).map_err(|_| Error::InvalidUtf8)
}

#[cfg(not(feature = "simd-utf8"))]
#[inline]
fn validate_utf8(bytes: &[u8]) -> Result<&str> {
    std::str::from_utf8(bytes).map_err(|_| Error::InvalidUtf8)
}

/// Encode a string as modified UTF-8.
///
/// Plain UTF-8 is already valid modified UTF-8 unless the string contains
/// NUL or a supplementary character (a 4-byte sequence).
pub fn encode_modified_utf8(s: &str, out: &mut Vec<u8>) {
    let bytes = s.as_bytes();
    if memchr::memchr(0, bytes).is_none() && !bytes.iter().any(|&b| b >= 0xf0) {
        out.extend_from_slice(bytes);
        return;
    }

    let mut buf = [0u16; 2];
    for ch in s.chars() {
        match ch as u32 {
            0 => out.extend_from_slice(&[0xc0, 0x80]),
            c if c >= 0x1_0000 => {
                for unit in ch.encode_utf16(&mut buf).iter() {
                    push_three_byte(*unit, out);
                }
            }
            _ => {
                let mut tmp = [0u8; 4];
                out.extend_from_slice(ch.encode_utf8(&mut tmp).as_bytes());
            }
        }
    }
}

#[inline]
fn push_three_byte(unit: u16, out: &mut Vec<u8>) {
    out.push(0xe0 | (unit >> 12) as u8);
    out.push(0x80 | ((unit >> 6) & 0x3f) as u8);
    out.push(0x80 | (unit & 0x3f) as u8);
}

/// Decode modified UTF-8 into a string.
pub fn decode_modified_utf8(bytes: &[u8]) -> Result<String> {
    // Without C0 (encoded NUL) or ED (surrogate halves) the input is plain UTF-8.
    if memchr::memchr2(0xc0, 0xed, bytes).is_none() {
        return validate_utf8(bytes).map(str::to_owned);
    }

    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b0 = bytes[i];
        let unit = match b0 {
            0x01..=0x7f => {
                i += 1;
                u16::from(b0)
            }
            0xc0..=0xdf => {
                let b1 = continuation(bytes, i + 1)?;
                i += 2;
                (u16::from(b0 & 0x1f) << 6) | b1
            }
            0xe0..=0xef => {
                let b1 = continuation(bytes, i + 1)?;
                let b2 = continuation(bytes, i + 2)?;
                i += 3;
                (u16::from(b0 & 0x0f) << 12) | (b1 << 6) | b2
            }
            _ => return Err(Error::InvalidUtf8),
        };
        units.push(unit);
    }
    String::from_utf16(&units).map_err(|_| Error::InvalidUtf8)
}

#[inline]
fn continuation(bytes: &[u8], at: usize) -> Result<u16> {
    match bytes.get(at) {
        Some(&b) if b & 0xc0 == 0x80 => Ok(u16::from(b & 0x3f)),
        _ => Err(Error::InvalidUtf8),
    }
}

/// Ordered, typed sink for primitive values.
///
/// Implementors provide `write_raw`; every other operation has a
/// big-endian default built on it.
pub trait DataOutput {
    /// Write raw bytes.
    fn write_raw(&mut self, bytes: &[u8]) -> Result<()>;

    #[inline]
    fn write_u8(&mut self, v: u8) -> Result<()> {
        self.write_raw(&[v])
    }

    #[inline]
    fn write_byte(&mut self, v: i8) -> Result<()> {
        self.write_raw(&v.to_be_bytes())
    }

    #[inline]
    fn write_bool(&mut self, v: bool) -> Result<()> {
        self.write_u8(u8::from(v))
    }

    #[inline]
    fn write_short(&mut self, v: i16) -> Result<()> {
        self.write_raw(&v.to_be_bytes())
    }

    #[inline]
    fn write_char(&mut self, v: u16) -> Result<()> {
        self.write_raw(&v.to_be_bytes())
    }

    #[inline]
    fn write_int(&mut self, v: i32) -> Result<()> {
        self.write_raw(&v.to_be_bytes())
    }

    #[inline]
    fn write_long(&mut self, v: i64) -> Result<()> {
        self.write_raw(&v.to_be_bytes())
    }

    #[inline]
    fn write_float(&mut self, v: f32) -> Result<()> {
        self.write_raw(&v.to_be_bytes())
    }

    #[inline]
    fn write_double(&mut self, v: f64) -> Result<()> {
        self.write_raw(&v.to_be_bytes())
    }

    /// Write a length-prefixed modified UTF-8 string.
    fn write_utf(&mut self, s: &str) -> Result<()> {
        let mut buf = Vec::with_capacity(s.len());
        encode_modified_utf8(s, &mut buf);
        self.write_len(buf.len())?;
        self.write_raw(&buf)
    }

    /// Write a 32-bit element count.
    fn write_len(&mut self, len: usize) -> Result<()> {
        let len = i32::try_from(len).map_err(|_| Error::MaxCollectionSizeExceeded(len))?;
        self.write_int(len)
    }

    fn write_byte_array(&mut self, v: &[i8]) -> Result<()> {
        self.write_len(v.len())?;
        let bytes: Vec<u8> = v.iter().map(|&b| b as u8).collect();
        self.write_raw(&bytes)
    }

    fn write_short_array(&mut self, v: &[i16]) -> Result<()> {
        self.write_len(v.len())?;
        self.write_raw(&v.iter().flat_map(|x| x.to_be_bytes()).collect::<Vec<_>>())
    }

    fn write_int_array(&mut self, v: &[i32]) -> Result<()> {
        self.write_len(v.len())?;
        self.write_raw(&v.iter().flat_map(|x| x.to_be_bytes()).collect::<Vec<_>>())
    }

    fn write_long_array(&mut self, v: &[i64]) -> Result<()> {
        self.write_len(v.len())?;
        self.write_raw(&v.iter().flat_map(|x| x.to_be_bytes()).collect::<Vec<_>>())
    }

    fn write_float_array(&mut self, v: &[f32]) -> Result<()> {
        self.write_len(v.len())?;
        self.write_raw(&v.iter().flat_map(|x| x.to_be_bytes()).collect::<Vec<_>>())
    }

    fn write_double_array(&mut self, v: &[f64]) -> Result<()> {
        self.write_len(v.len())?;
        self.write_raw(&v.iter().flat_map(|x| x.to_be_bytes()).collect::<Vec<_>>())
    }

    fn write_char_array(&mut self, v: &[u16]) -> Result<()> {
        self.write_len(v.len())?;
        self.write_raw(&v.iter().flat_map(|x| x.to_be_bytes()).collect::<Vec<_>>())
    }

    fn write_bool_array(&mut self, v: &[bool]) -> Result<()> {
        self.write_len(v.len())?;
        self.write_raw(&v.iter().map(|&b| u8::from(b)).collect::<Vec<_>>())
    }
}

impl DataOutput for Vec<u8> {
    #[inline]
    fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.extend_from_slice(bytes);
        Ok(())
    }
}

/// A sink writing through any `std::io::Write`.
pub struct StreamOutput<W: Write> {
    writer: W,
}

impl<W: Write> StreamOutput<W> {
    /// Create a sink over the given writer.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Consume the sink and return the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }

    /// Get a reference to the underlying writer.
    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    /// Flush the underlying writer.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

impl<W: Write> DataOutput for StreamOutput<W> {
    #[inline]
    fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer.write_all(bytes)?;
        Ok(())
    }
}

/// Ordered, typed source of primitive values, the mirror of [`DataOutput`].
pub trait DataInput {
    /// Fill `buf` completely or fail with [`Error::Truncated`].
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()>;

    #[inline]
    fn read_u8(&mut self) -> Result<u8> {
        let mut b = [0u8; 1];
        self.read_exact(&mut b)?;
        Ok(b[0])
    }

    #[inline]
    fn read_byte(&mut self) -> Result<i8> {
        Ok(self.read_u8()? as i8)
    }

    #[inline]
    fn read_bool(&mut self) -> Result<bool> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(Error::format(format!("invalid boolean byte 0x{other:02x}"))),
        }
    }

    #[inline]
    fn read_short(&mut self) -> Result<i16> {
        let mut b = [0u8; 2];
        self.read_exact(&mut b)?;
        Ok(i16::from_be_bytes(b))
    }

    #[inline]
    fn read_char(&mut self) -> Result<u16> {
        let mut b = [0u8; 2];
        self.read_exact(&mut b)?;
        Ok(u16::from_be_bytes(b))
    }

    #[inline]
    fn read_int(&mut self) -> Result<i32> {
        let mut b = [0u8; 4];
        self.read_exact(&mut b)?;
        Ok(i32::from_be_bytes(b))
    }

    #[inline]
    fn read_long(&mut self) -> Result<i64> {
        let mut b = [0u8; 8];
        self.read_exact(&mut b)?;
        Ok(i64::from_be_bytes(b))
    }

    #[inline]
    fn read_float(&mut self) -> Result<f32> {
        let mut b = [0u8; 4];
        self.read_exact(&mut b)?;
        Ok(f32::from_be_bytes(b))
    }

    #[inline]
    fn read_double(&mut self) -> Result<f64> {
        let mut b = [0u8; 8];
        self.read_exact(&mut b)?;
        Ok(f64::from_be_bytes(b))
    }

    /// Read a 32-bit element count, rejecting negative values.
    fn read_len(&mut self) -> Result<usize> {
        let n = self.read_int()?;
        usize::try_from(n).map_err(|_| Error::format(format!("negative length {n}")))
    }

    /// Read a length-prefixed modified UTF-8 string.
    fn read_utf(&mut self) -> Result<String> {
        let len = self.read_len()?;
        let bytes = self.read_vec(len)?;
        decode_modified_utf8(&bytes)
    }

    /// Read `len` raw bytes into a fresh buffer.
    ///
    /// The buffer grows in bounded steps so a forged length cannot force a
    /// large allocation before the bytes actually arrive.
    fn read_vec(&mut self, len: usize) -> Result<Vec<u8>> {
        const CHUNK: usize = 64 * 1024;
        let mut buf = Vec::with_capacity(len.min(CHUNK));
        while buf.len() < len {
            let start = buf.len();
            let end = len.min(start + CHUNK);
            buf.resize(end, 0);
            self.read_exact(&mut buf[start..end])?;
        }
        Ok(buf)
    }
}

/// A source reading from an in-memory byte slice.
pub struct SliceInput<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> SliceInput<'a> {
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Get the current position in the input.
    #[must_use]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Get the remaining bytes.
    #[must_use]
    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    /// Check if we've reached the end of input.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Fail if any input is left unconsumed.
    pub fn finish(&self) -> Result<()> {
        if self.pos < self.data.len() {
            return Err(Error::TrailingBytes);
        }
        Ok(())
    }

    #[inline]
    fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.data.len() - self.pos {
            return Err(Error::Truncated);
        }
        let bytes = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }
}

impl DataInput for SliceInput<'_> {
    #[inline]
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let bytes = self.read_bytes(buf.len())?;
        buf.copy_from_slice(bytes);
        Ok(())
    }

    fn read_vec(&mut self, len: usize) -> Result<Vec<u8>> {
        Ok(self.read_bytes(len)?.to_vec())
    }
}

/// A source reading from any `std::io::Read`.
pub struct StreamInput<R: std::io::Read> {
    reader: R,
}

impl<R: std::io::Read> StreamInput<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: std::io::Read> DataInput for StreamInput<R> {
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.reader.read_exact(buf)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utf_bytes(s: &str) -> Vec<u8> {
        let mut out = Vec::new();
        out.write_utf(s).unwrap();
        out
    }

    #[test]
    fn test_scalars_are_big_endian() {
        let mut out = Vec::new();
        out.write_int(1).unwrap();
        out.write_short(-2).unwrap();
        out.write_char(0x41).unwrap();
        out.write_bool(true).unwrap();
        assert_eq!(out, vec![0, 0, 0, 1, 0xff, 0xfe, 0, 0x41, 1]);

        let mut input = SliceInput::new(&out);
        assert_eq!(input.read_int().unwrap(), 1);
        assert_eq!(input.read_short().unwrap(), -2);
        assert_eq!(input.read_char().unwrap(), 0x41);
        assert!(input.read_bool().unwrap());
        input.finish().unwrap();
    }

    #[test]
    fn test_utf_ascii_fast_path() {
        assert_eq!(utf_bytes("hi"), vec![0, 0, 0, 2, b'h', b'i']);
    }

    #[test]
    fn test_utf_nul_is_two_bytes() {
        assert_eq!(utf_bytes("a\0"), vec![0, 0, 0, 3, b'a', 0xc0, 0x80]);
    }

    #[test]
    fn test_utf_supplementary_uses_surrogates() {
        let bytes = utf_bytes("\u{1F600}");
        assert_eq!(&bytes[..4], &[0, 0, 0, 6]);
        assert_eq!(&bytes[4..], &[0xed, 0xa0, 0xbd, 0xed, 0xb8, 0x80]);
    }

    #[test]
    fn test_utf_decode_round_trip() {
        for s in ["", "plain", "caf\u{e9}", "nul\0inside", "emoji \u{1F600}!"] {
            let bytes = utf_bytes(s);
            let mut input = SliceInput::new(&bytes);
            assert_eq!(input.read_utf().unwrap(), s);
            assert!(input.is_empty());
        }
    }

    #[test]
    fn test_utf_decode_rejects_bad_continuation() {
        assert!(matches!(
            decode_modified_utf8(&[0xc0, 0x41]),
            Err(Error::InvalidUtf8)
        ));
    }

    #[test]
    fn test_truncated_and_trailing() {
        let mut input = SliceInput::new(&[0, 0]);
        assert!(matches!(input.read_int(), Err(Error::Truncated)));

        let input = SliceInput::new(&[1]);
        assert!(matches!(input.finish(), Err(Error::TrailingBytes)));
    }

    #[test]
    fn test_negative_length_is_format_error() {
        let mut input = SliceInput::new(&[0xff, 0xff, 0xff, 0xff]);
        assert!(input.read_len().unwrap_err().is_format_error());
    }

    #[test]
    fn test_bulk_arrays() {
        let mut out = Vec::new();
        out.write_int_array(&[1, -1]).unwrap();
        out.write_bool_array(&[true, false]).unwrap();
        assert_eq!(
            out,
            vec![0, 0, 0, 2, 0, 0, 0, 1, 0xff, 0xff, 0xff, 0xff, 0, 0, 0, 2, 1, 0]
        );
    }

    #[test]
    fn test_stream_output() {
        let mut sink = StreamOutput::new(Vec::new());
        sink.write_long(-1).unwrap();
        sink.flush().unwrap();
        assert_eq!(sink.get_ref().len(), 8);
        assert_eq!(sink.into_inner(), vec![0xff; 8]);
    }
}
