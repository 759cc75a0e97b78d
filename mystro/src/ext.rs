//! Extension traits for wire value encoding.
use bytes::{Buf, BufMut, Bytes};

use crate::{common::ByteStr, mysql::error::ProtocolError};

/// Returns the encoded size of a length-encoded integer.
pub const fn lenenc_int_len(value: u64) -> usize {
    match value {
        ..0xfb => 1,
        ..=0xffff => 3,
        ..=0xff_ffff => 4,
        _ => 9,
    }
}

/// Length-encoded value writes into [`BufMut`].
pub trait BufMutExt {
    /// Write a length-encoded integer.
    ///
    /// The first byte selects the width: values below `0xfb` are stored
    /// inline, `0xfc`/`0xfd`/`0xfe` prefix a 2, 3 or 8 byte little-endian
    /// integer.
    fn put_lenenc_int(&mut self, value: u64);

    /// Write a length-encoded integer followed by the bytes themselves.
    fn put_lenenc_bytes(&mut self, bytes: &[u8]);

    /// Write string and nul termination.
    fn put_nul_string(&mut self, string: &str);
}

impl<B: BufMut> BufMutExt for B {
    fn put_lenenc_int(&mut self, value: u64) {
        match value {
            ..0xfb => self.put_u8(value as u8),
            ..=0xffff => {
                self.put_u8(0xfc);
                self.put_u16_le(value as u16);
            },
            ..=0xff_ffff => {
                self.put_u8(0xfd);
                self.put_uint_le(value, 3);
            },
            _ => {
                self.put_u8(0xfe);
                self.put_u64_le(value);
            },
        }
    }

    fn put_lenenc_bytes(&mut self, bytes: &[u8]) {
        self.put_lenenc_int(bytes.len() as u64);
        self.put(bytes);
    }

    fn put_nul_string(&mut self, string: &str) {
        self.put(string.as_bytes());
        self.put_u8(b'\0');
    }
}

/// Length-encoded value reads from [`Bytes`].
///
/// All reads are checked, a packet shorter than its declared layout is a
/// [`ProtocolError`] rather than a panic.
pub trait BytesExt {
    /// Read a length-encoded integer.
    ///
    /// The null sentinel `0xfb` and `0xff` are not valid here.
    fn get_lenenc_int(&mut self) -> Result<u64, ProtocolError>;

    /// Read a length-encoded byte string.
    fn get_lenenc_bytes(&mut self) -> Result<Bytes, ProtocolError>;

    /// Read a length-encoded utf8 string.
    fn get_lenenc_bytestr(&mut self) -> Result<ByteStr, ProtocolError>;

    /// Read a nul terminated utf8 string.
    ///
    /// Using [`ByteStr`] avoid allocating [`Vec`] as it required for [`String::from_utf8`].
    fn get_nul_bytestr(&mut self) -> Result<ByteStr, ProtocolError>;
}

impl BytesExt for Bytes {
    fn get_lenenc_int(&mut self) -> Result<u64, ProtocolError> {
        if !self.has_remaining() {
            return Err(ProtocolError::truncated("length-encoded integer"));
        }
        let (value, more) = match self.get_u8() {
            value @ ..=0xfa => (u64::from(value), 0),
            0xfc => (0, 2),
            0xfd => (0, 3),
            0xfe => (0, 8),
            first => return Err(ProtocolError::unexpected_byte(first, "length-encoded integer")),
        };
        if more == 0 {
            return Ok(value);
        }
        if self.remaining() < more {
            return Err(ProtocolError::truncated("length-encoded integer"));
        }
        Ok(self.get_uint_le(more))
    }

    fn get_lenenc_bytes(&mut self) -> Result<Bytes, ProtocolError> {
        let len = self.get_lenenc_int()? as usize;
        if self.remaining() < len {
            return Err(ProtocolError::truncated("length-encoded string"));
        }
        Ok(self.split_to(len))
    }

    fn get_lenenc_bytestr(&mut self) -> Result<ByteStr, ProtocolError> {
        Ok(ByteStr::from_utf8(self.get_lenenc_bytes()?)?)
    }

    fn get_nul_bytestr(&mut self) -> Result<ByteStr, ProtocolError> {
        let Some(end) = self.iter().position(|e| matches!(e, b'\0')) else {
            return Err(ProtocolError::truncated("nul terminated string"));
        };
        let me = self.split_to(end);
        Buf::advance(self, 1); // nul
        Ok(ByteStr::from_utf8(me)?)
    }
}

/// Helper trait to [`Display`][std::fmt::Display] bytes.
pub trait FmtExt {
    /// Lossy [`Display`][std::fmt::Display] bytes.
    fn lossy(&self) -> LossyFmt<'_>;
}

/// Lossy [`Display`][std::fmt::Display] implementation for bytes.
pub struct LossyFmt<'a>(pub &'a [u8]);

impl FmtExt for [u8] {
    fn lossy(&self) -> LossyFmt<'_> {
        LossyFmt(self)
    }
}

impl std::fmt::Display for LossyFmt<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for &b in self.0 {
            if b.is_ascii_graphic() || b.is_ascii_whitespace() {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{b:x}")?;
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for LossyFmt<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "b\"{self}\"")
    }
}
