use byteorder::{ReadBytesExt, WriteBytesExt, LE};
use std::io::{Read, Write};

use crate::compression::Compression;
use crate::error::{Error, Result};
use crate::ext::{ReadExt, WriteExt};

pub const MAGIC: u32 = 0x5A6F_12E1;
pub const MIN_VERSION: i16 = 11;
pub const LATEST_VERSION: i16 = 11;

/// Number of compression-method name slots in the trailer.
const METHOD_SLOTS: usize = 5;

/// The fixed-size footer at the end of a pak archive, 221 bytes before EOF.
#[derive(Debug, Clone)]
pub struct Footer {
    pub version: i16,
    pub subversion: i16,
    pub index_offset: u64,
    pub index_size: u64,
    pub index_hash: [u8; 20],
    pub compression_methods: Vec<Option<Compression>>,
}

impl Footer {
    pub const SERIALIZED_SIZE: u64 = 16 + 1 + 4 + 2 + 2 + 8 + 8 + 20 + (METHOD_SLOTS as u64 * 32);

    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let guid = reader.read_guid()?;
        if guid != [0; 16] {
            return Err(Error::Encrypted);
        }
        let encrypted = reader.read_bool()?;
        if encrypted {
            return Err(Error::Encrypted);
        }
        let magic = reader.read_u32::<LE>()?;
        if magic != MAGIC {
            return Err(Error::Magic(magic));
        }
        let version = reader.read_i16::<LE>()?;
        let subversion = reader.read_i16::<LE>()?;
        if version < MIN_VERSION {
            return Err(Error::UnsupportedVersion {
                actual: version as i32,
                minimum: crate::Version(MIN_VERSION),
            });
        }
        let index_offset = reader.read_u64::<LE>()?;
        let index_size = reader.read_u64::<LE>()?;
        let mut index_hash = [0u8; 20];
        reader.read_exact(&mut index_hash)?;

        let mut compression_methods = Vec::with_capacity(METHOD_SLOTS);
        for _ in 0..METHOD_SLOTS {
            let raw = reader.read_len(32)?;
            let name: String = raw
                .into_iter()
                .take_while(|&b| b != 0)
                .map(|b| b as char)
                .collect();
            compression_methods.push(if name.is_empty() {
                None
            } else {
                use std::str::FromStr;
                Some(Compression::from_str(&name).map_err(|_| Error::UnknownCompressionMethod(name))?)
            });
        }

        Ok(Footer {
            version,
            subversion,
            index_offset,
            index_size,
            index_hash,
            compression_methods,
        })
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&[0u8; 16])?;
        writer.write_bool(false)?;
        writer.write_u32::<LE>(MAGIC)?;
        writer.write_i16::<LE>(self.version)?;
        writer.write_i16::<LE>(self.subversion)?;
        writer.write_u64::<LE>(self.index_offset)?;
        writer.write_u64::<LE>(self.index_size)?;
        writer.write_all(&self.index_hash)?;
        for i in 0..METHOD_SLOTS {
            let mut name = [0u8; 32];
            if let Some(Some(method)) = self.compression_methods.get(i) {
                let s = method.to_string();
                name[..s.len()].copy_from_slice(s.as_bytes());
            }
            writer.write_all(&name)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn round_trip() {
        let footer = Footer {
            version: 11,
            subversion: 0,
            index_offset: 1234,
            index_size: 56,
            index_hash: [7u8; 20],
            compression_methods: vec![None, Some(Compression::Zlib), None, None, None],
        };
        let mut buf = Cursor::new(Vec::new());
        footer.write(&mut buf).unwrap();
        assert_eq!(buf.get_ref().len() as u64, Footer::SERIALIZED_SIZE);
        buf.set_position(0);
        let decoded = Footer::read(&mut buf).unwrap();
        assert_eq!(decoded.index_offset, 1234);
        assert_eq!(decoded.compression_methods[1], Some(Compression::Zlib));
    }

    #[test]
    fn rejects_old_version() {
        let footer = Footer {
            version: 5,
            subversion: 0,
            index_offset: 0,
            index_size: 0,
            index_hash: [0; 20],
            compression_methods: vec![None; 5],
        };
        let mut buf = Cursor::new(Vec::new());
        // build manually since Footer::write doesn't validate
        buf.write_all(&[0u8; 16]).unwrap();
        buf.write_bool(false).unwrap();
        buf.write_u32::<LE>(MAGIC).unwrap();
        buf.write_i16::<LE>(footer.version).unwrap();
        buf.write_i16::<LE>(footer.subversion).unwrap();
        buf.write_u64::<LE>(0).unwrap();
        buf.write_u64::<LE>(0).unwrap();
        buf.write_all(&[0u8; 20]).unwrap();
        for _ in 0..5 {
            buf.write_all(&[0u8; 32]).unwrap();
        }
        buf.set_position(0);
        assert!(matches!(
            Footer::read(&mut buf),
            Err(Error::UnsupportedVersion { .. })
        ));
    }
}
