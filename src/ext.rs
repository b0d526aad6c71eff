use byteorder::{ReadBytesExt, WriteBytesExt, LE};
use std::io::{self, Read, Write};

use crate::error::{Error, Result};
use crate::name::{Name, NameEncoding};

/// Longest FString byte length this crate will allocate for.
const MAX_STRING_LEN: i32 = 131072;

pub trait ReadExt: Read {
    fn read_bool(&mut self) -> io::Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    fn read_guid(&mut self) -> io::Result<[u8; 16]> {
        let mut buf = [0u8; 16];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn read_len(&mut self, len: usize) -> io::Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Reads the length-prefixed FString wire format: a positive i32 length
    /// means ASCII bytes including a null terminator, a negative length means
    /// UTF-16LE code units (abs(len) * 2 bytes including a 2-byte terminator),
    /// and a length of 0 decodes to an empty string. Discards the encoding
    /// tag; use [`Self::read_string_with_encoding`] or [`Self::read_name`]
    /// to preserve it.
    fn read_string(&mut self) -> Result<String> {
        Ok(self.read_string_with_encoding()?.0)
    }

    /// Like [`Self::read_string`], but also returns which wire encoding the
    /// value was read as (`Ascii` for a positive length prefix, `Utf16` for
    /// a negative one), so a caller that needs to re-emit the same bytes
    /// later can force that encoding rather than re-inferring it from
    /// content.
    fn read_string_with_encoding(&mut self) -> Result<(String, NameEncoding)> {
        let len = self.read_i32::<LE>()?;
        if len == 0 {
            return Ok((String::new(), NameEncoding::Ascii));
        }
        if len.unsigned_abs() > MAX_STRING_LEN as u32 {
            return Err(Error::StringTooLong(len));
        }
        if len > 0 {
            let mut bytes = self.read_len(len as usize)?;
            bytes.pop(); // drop null terminator
            Ok((String::from_utf8(bytes)?, NameEncoding::Ascii))
        } else {
            let units = (-len) as usize;
            let mut buf = vec![0u16; units];
            for u in buf.iter_mut() {
                *u = self.read_u16::<LE>()?;
            }
            buf.pop(); // drop null terminator
            Ok((String::from_utf16(&buf)?, NameEncoding::Utf16))
        }
    }

    /// Reads a length-prefixed string and wraps it as a [`Name`], preserving
    /// the wire encoding it was actually read as and seeding its hashes with
    /// `seed`.
    fn read_name(&mut self, seed: u64) -> Result<Name> {
        let (value, encoding) = self.read_string_with_encoding()?;
        Ok(Name::with_encoding(value, encoding, seed))
    }
}

impl<R: Read + ?Sized> ReadExt for R {}

pub trait WriteExt: Write {
    fn write_bool(&mut self, value: bool) -> io::Result<()> {
        self.write_u8(value as u8)
    }

    /// Writes `value` under an explicit `encoding` tag rather than inferring
    /// one from its bytes, so a [`Name`]'s recorded encoding round-trips even
    /// when its value happens to be ASCII-safe (the reference encoder does
    /// write ASCII-only content as UTF-16LE in some cases).
    fn write_string_as(&mut self, value: &str, encoding: NameEncoding) -> Result<()> {
        if value.is_empty() {
            self.write_i32::<LE>(0)?;
            return Ok(());
        }
        match encoding {
            NameEncoding::Ascii => {
                self.write_i32::<LE>(value.len() as i32 + 1)?;
                self.write_all(value.as_bytes())?;
                self.write_u8(0)?;
            }
            NameEncoding::Utf16 => {
                let units: Vec<u16> = value.encode_utf16().collect();
                self.write_i32::<LE>(-(units.len() as i32 + 1))?;
                for u in units {
                    self.write_u16::<LE>(u)?;
                }
                self.write_u16::<LE>(0)?;
            }
        }
        Ok(())
    }

    /// Writes `value` using the FString wire format, picking ASCII or
    /// UTF-16LE automatically from its content. Prefer [`Self::write_name`]
    /// when an already-known encoding tag must be preserved.
    fn write_string(&mut self, value: &str) -> Result<()> {
        self.write_string_as(value, NameEncoding::for_value(value))
    }

    /// Writes `name`'s value under its own recorded encoding.
    fn write_name(&mut self, name: &Name) -> Result<()> {
        self.write_string_as(name.as_str(), name.encoding())
    }
}

impl<W: Write + ?Sized> WriteExt for W {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn ascii_round_trip() {
        let mut buf = Cursor::new(Vec::new());
        buf.write_string("Content/A.uasset").unwrap();
        buf.set_position(0);
        assert_eq!(buf.read_string().unwrap(), "Content/A.uasset");
    }

    #[test]
    fn empty_round_trip() {
        let mut buf = Cursor::new(Vec::new());
        buf.write_string("").unwrap();
        buf.set_position(0);
        assert_eq!(buf.read_string().unwrap(), "");
    }

    #[test]
    fn utf16_round_trip() {
        let mut buf = Cursor::new(Vec::new());
        buf.write_string("héllo").unwrap();
        buf.set_position(0);
        assert_eq!(buf.read_string().unwrap(), "héllo");
    }

    #[test]
    fn ascii_content_forced_to_utf16_encoding_round_trips_the_tag() {
        let mut buf = Cursor::new(Vec::new());
        buf.write_string_as("Content/A.uasset", NameEncoding::Utf16)
            .unwrap();
        buf.set_position(0);
        let (value, encoding) = buf.read_string_with_encoding().unwrap();
        assert_eq!(value, "Content/A.uasset");
        assert_eq!(encoding, NameEncoding::Utf16);
    }

    #[test]
    fn write_name_preserves_its_own_encoding() {
        let name = Name::with_encoding("Content/A.uasset", NameEncoding::Utf16, 0);
        let mut buf = Cursor::new(Vec::new());
        buf.write_name(&name).unwrap();
        buf.set_position(0);
        let (value, encoding) = buf.read_string_with_encoding().unwrap();
        assert_eq!(value, "Content/A.uasset");
        assert_eq!(encoding, NameEncoding::Utf16);
    }
}
