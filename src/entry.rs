use byteorder::{ReadBytesExt, WriteBytesExt, LE};
use std::io::{Read, Seek, SeekFrom, Write};

use crate::compression::{self, Compression, OodleAdapter};
use crate::error::{Error, Result};

const BLOCK_SIZE_ESCAPE: u32 = 0x3F;

/// A byte range of a compressed block, relative to the start of the entry's
/// on-disk header (i.e. `entry_offset + block.start` is the absolute file
/// position of the block's compressed bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    pub start: u64,
    pub end: u64,
}

impl Block {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }
}

fn align(value: u64, alignment: u64) -> u64 {
    if alignment <= 1 {
        return value;
    }
    value.div_ceil(alignment) * alignment
}

/// One entry's metadata: everything needed to locate and decode its payload,
/// absent the payload bytes themselves (those load lazily).
#[derive(Debug, Clone)]
pub struct Entry {
    pub offset: u64,
    pub compressed: u64,
    pub uncompressed: u64,
    pub compression: Compression,
    pub compression_block_size: u32,
    pub blocks: Option<Vec<Block>>,
    pub hash: [u8; 20],
    pub(crate) data: Option<Vec<u8>>,
}

impl Entry {
    /// Size in bytes of the in-file header that prefixes an entry's payload.
    pub fn file_header_size(compressed: bool, block_count: u32) -> u64 {
        53 + if compressed { 16 * block_count as u64 + 4 } else { 0 }
    }

    /// Decodes one entry's compact metadata record from the encoded-entries
    /// blob, resolving `compression_index` against the archive's method
    /// table (index 0 is always [`Compression::None`]).
    pub fn decode_meta<R: Read>(reader: &mut R, methods: &[Compression]) -> Result<Self> {
        let flags = reader.read_u32::<LE>()?;

        let compression_index = ((flags >> 23) & 0x3F) as usize;
        let encrypted = (flags >> 22) & 1 != 0;
        let block_count = (flags >> 6) & 0xFFFF;
        let block_size_code = flags & 0x3F;

        let block_size = if block_size_code == BLOCK_SIZE_ESCAPE {
            reader.read_u32::<LE>()?
        } else {
            block_size_code << 11
        };

        let offset = if (flags >> 31) & 1 != 0 {
            reader.read_u32::<LE>()? as u64
        } else {
            reader.read_u64::<LE>()?
        };

        if (flags >> 30) & 1 == 0 {
            return Err(Error::Other("entry missing required uncompressed-size bit".into()));
        }
        let uncompressed = reader.read_u32::<LE>()? as u64;

        if encrypted {
            return Err(Error::Encrypted);
        }

        let compression = methods.get(compression_index).copied().ok_or_else(|| {
            Error::Other(format!("compression slot {compression_index} out of range"))
        })?;

        if compression == Compression::None {
            return Ok(Entry {
                offset,
                compressed: uncompressed,
                uncompressed,
                compression,
                compression_block_size: 0,
                blocks: None,
                hash: [0; 20],
                data: None,
            });
        }

        if (flags >> 29) & 1 == 0 {
            return Err(Error::Other("entry missing required compressed-size bit".into()));
        }
        let compressed = reader.read_u32::<LE>()? as u64;

        let blocks = if block_count > 0 {
            let header_size = Self::file_header_size(true, block_count);
            if block_count == 1 {
                Some(vec![Block {
                    start: header_size,
                    end: header_size + compressed,
                }])
            } else {
                let mut blocks = Vec::with_capacity(block_count as usize);
                let mut running = header_size;
                for _ in 0..block_count {
                    let end_delta = reader.read_i32::<LE>()? as u64;
                    let start = running;
                    let end = start + end_delta;
                    running += align(end - start, 1);
                    blocks.push(Block { start, end });
                }
                Some(blocks)
            }
        } else {
            None
        };

        Ok(Entry {
            offset,
            compressed,
            uncompressed,
            compression,
            compression_block_size: block_size,
            blocks,
            hash: [0; 20],
            data: None,
        })
    }

    /// Encodes this entry's compact metadata record, resolving
    /// [`Self::compression`] to `compression_index` within `methods`.
    pub fn encode_meta<W: Write>(&self, writer: &mut W, compression_index: u32) -> Result<()> {
        let block_count = self.blocks.as_ref().map_or(0, |b| b.len() as u32);

        let mut flags: u32 = 0;
        flags |= ((self.offset < u32::MAX as u64) as u32) << 31;
        flags |= 1 << 30;
        flags |= ((self.compression != Compression::None) as u32) << 29;
        flags |= (compression_index & 0x3F) << 23;

        let block_size_code = if block_count > 0 {
            flags |= (block_count & 0xFFFF) << 6;
            BLOCK_SIZE_ESCAPE
        } else {
            (self.compression_block_size >> 11) & 0x3F
        };
        flags |= block_size_code;

        writer.write_u32::<LE>(flags)?;
        if block_size_code == BLOCK_SIZE_ESCAPE {
            writer.write_u32::<LE>(self.compression_block_size)?;
        }

        if self.offset < u32::MAX as u64 {
            writer.write_u32::<LE>(self.offset as u32)?;
        } else {
            writer.write_u64::<LE>(self.offset)?;
        }

        writer.write_u32::<LE>(self.uncompressed as u32)?;

        if self.compression == Compression::None {
            return Ok(());
        }

        writer.write_u32::<LE>(self.compressed as u32)?;

        if let Some(blocks) = &self.blocks {
            if blocks.len() >= 2 {
                for block in blocks {
                    writer.write_i32::<LE>((block.end - block.start) as i32)?;
                }
            }
        }

        Ok(())
    }

    /// Reads the in-file header that prefixes this entry's payload and
    /// returns the resolved compression method and block table, discarding
    /// the reserved offset/flags fields (the index already carries the
    /// authoritative copies).
    pub fn read_file_header<R: Read>(reader: &mut R, methods: &[Compression]) -> Result<Entry> {
        let _offset = reader.read_i64::<LE>()?;
        let compressed = reader.read_i64::<LE>()? as u64;
        let uncompressed = reader.read_i64::<LE>()? as u64;
        let method_index = reader.read_i32::<LE>()? as usize;
        let mut hash = [0u8; 20];
        reader.read_exact(&mut hash)?;
        let compression = methods.get(method_index).copied().ok_or_else(|| {
            Error::Other(format!("compression slot {method_index} out of range"))
        })?;
        let blocks = if compression != Compression::None {
            let block_count = reader.read_i32::<LE>()? as usize;
            let mut blocks = Vec::with_capacity(block_count);
            for _ in 0..block_count {
                let start = reader.read_i64::<LE>()? as u64;
                let end = reader.read_i64::<LE>()? as u64;
                blocks.push(Block { start, end });
            }
            Some(blocks)
        } else {
            None
        };
        let _flags = reader.read_u8()?;
        let compression_block_size = reader.read_u32::<LE>()?;
        Ok(Entry {
            offset: 0,
            compressed,
            uncompressed,
            compression,
            compression_block_size,
            blocks,
            hash,
            data: None,
        })
    }

    /// Writes this entry's in-file header.
    pub fn write_file_header<W: Write>(&self, writer: &mut W, method_index: u32) -> Result<()> {
        writer.write_i64::<LE>(0)?;
        writer.write_i64::<LE>(self.compressed as i64)?;
        writer.write_i64::<LE>(self.uncompressed as i64)?;
        writer.write_i32::<LE>(method_index as i32)?;
        writer.write_all(&self.hash)?;
        if self.compression != Compression::None {
            let blocks = self.blocks.as_deref().unwrap_or_default();
            writer.write_i32::<LE>(blocks.len() as i32)?;
            for block in blocks {
                writer.write_i64::<LE>(block.start as i64)?;
                writer.write_i64::<LE>(block.end as i64)?;
            }
        }
        writer.write_u8(0)?;
        writer.write_u32::<LE>(self.compression_block_size)?;
        Ok(())
    }

    /// Loads this entry's payload from `reader`, positioned anywhere (the
    /// absolute file offset is `self.offset`), decompressing block by block.
    ///
    /// Re-parses the in-file header at `self.offset` via
    /// [`Self::read_file_header`] to validate it against the index's own
    /// copy of the size fields before trusting either.
    pub fn load_data<R: Read + Seek>(
        &self,
        reader: &mut R,
        methods: &[Compression],
        oodle: Option<&dyn OodleAdapter>,
    ) -> Result<Vec<u8>> {
        reader.seek(SeekFrom::Start(self.offset))?;
        let on_disk = Self::read_file_header(reader, methods)?;
        if on_disk.compressed != self.compressed || on_disk.uncompressed != self.uncompressed {
            log::warn!(
                "entry header at offset {} disagrees with index: on-disk compressed={} uncompressed={}, index compressed={} uncompressed={}",
                self.offset, on_disk.compressed, on_disk.uncompressed, self.compressed, self.uncompressed
            );
        }

        if self.compression == Compression::None {
            let mut buf = vec![0u8; self.uncompressed as usize];
            reader.read_exact(&mut buf)?;
            return Ok(buf);
        }

        let mut out = vec![0u8; self.uncompressed as usize];
        let blocks = self
            .blocks
            .as_ref()
            .ok_or_else(|| Error::Other("compressed entry missing block table".into()))?;
        let block_size = self.compression_block_size as usize;
        let mut written = 0usize;
        for block in blocks {
            reader.seek(SeekFrom::Start(self.offset + block.start))?;
            let mut compressed = vec![0u8; block.len() as usize];
            reader.read_exact(&mut compressed)?;
            let remaining = out.len() - written;
            let this_block_len = block_size.min(remaining);
            compression::decompress_block(
                self.compression,
                &compressed,
                &mut out[written..written + this_block_len],
                oodle,
            )?;
            written += this_block_len;
        }
        Ok(out)
    }

    /// Compresses `data` (if this entry uses compression), writes the
    /// in-file header and payload to `writer` at its current position, and
    /// returns a fully-populated `Entry` (with `offset` set to
    /// `file_offset`) ready to be indexed.
    #[allow(clippy::too_many_arguments)]
    pub fn save_data<W: Write>(
        writer: &mut W,
        file_offset: u64,
        compression: Compression,
        compression_block_size: u32,
        method_index: u32,
        data: &[u8],
        oodle: Option<&dyn OodleAdapter>,
    ) -> Result<Entry> {
        use sha1::{Digest, Sha1};

        let uncompressed = data.len() as u64;

        let (stored, blocks) = if compression == Compression::None {
            (data.to_vec(), None)
        } else {
            let block_size = compression_block_size.max(1) as usize;
            let chunks: Vec<&[u8]> = data.chunks(block_size).collect();
            let block_count = chunks.len().max(1) as u32;
            let header_size = Entry::file_header_size(true, block_count);
            let mut stored = Vec::new();
            let mut blocks = Vec::with_capacity(chunks.len());
            let mut running = header_size;
            for chunk in chunks.iter().copied() {
                let compressed_chunk = compression::compress_block(compression, chunk, oodle)?;
                let start = running;
                let end = start + compressed_chunk.len() as u64;
                blocks.push(Block { start, end });
                running += align(end - start, 1);
                stored.extend_from_slice(&compressed_chunk);
            }
            (stored, Some(blocks))
        };

        let mut hasher = Sha1::new();
        hasher.update(&stored);
        let hash: [u8; 20] = hasher.finalize().into();

        let entry = Entry {
            offset: file_offset,
            compressed: stored.len() as u64,
            uncompressed,
            compression,
            compression_block_size,
            blocks,
            hash,
            data: None,
        };

        entry.write_file_header(writer, method_index)?;
        writer.write_all(&stored)?;

        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn methods() -> Vec<Compression> {
        vec![Compression::None, Compression::Zlib]
    }

    #[test]
    fn meta_round_trip_uncompressed() {
        let entry = Entry {
            offset: 128,
            compressed: 64,
            uncompressed: 64,
            compression: Compression::None,
            compression_block_size: 0,
            blocks: None,
            hash: [0; 20],
            data: None,
        };
        let mut buf = Cursor::new(Vec::new());
        entry.encode_meta(&mut buf, 0).unwrap();
        buf.set_position(0);
        let decoded = Entry::decode_meta(&mut buf, &methods()).unwrap();
        assert_eq!(decoded.offset, entry.offset);
        assert_eq!(decoded.uncompressed, entry.uncompressed);
        assert_eq!(decoded.compression, Compression::None);
        assert!(decoded.blocks.is_none());
    }

    #[test]
    fn meta_round_trip_compressed_single_block() {
        let entry = Entry {
            offset: 4096,
            compressed: 100,
            uncompressed: 65535,
            compression: Compression::Zlib,
            compression_block_size: 65536,
            blocks: Some(vec![Block { start: 53, end: 153 }]),
            hash: [0; 20],
            data: None,
        };
        let mut buf = Cursor::new(Vec::new());
        entry.encode_meta(&mut buf, 1).unwrap();
        buf.set_position(0);
        let decoded = Entry::decode_meta(&mut buf, &methods()).unwrap();
        assert_eq!(decoded.compression, Compression::Zlib);
        assert_eq!(decoded.compressed, 100);
        assert_eq!(decoded.blocks.unwrap().len(), 1);
    }

    #[test]
    fn offset_crossing_u32_boundary_uses_64_bit_path() {
        let entry = Entry {
            offset: (u32::MAX as u64) + 1,
            compressed: 4,
            uncompressed: 4,
            compression: Compression::None,
            compression_block_size: 0,
            blocks: None,
            hash: [0; 20],
            data: None,
        };
        let mut buf = Cursor::new(Vec::new());
        entry.encode_meta(&mut buf, 0).unwrap();
        buf.set_position(0);
        let decoded = Entry::decode_meta(&mut buf, &methods()).unwrap();
        assert_eq!(decoded.offset, entry.offset);
    }

    #[test]
    fn encrypted_entries_are_rejected() {
        let mut buf = Cursor::new(Vec::new());
        // bit22 set, minimal required bits 30/29 also set
        let flags: u32 = (1 << 30) | (1 << 22);
        buf.write_u32::<LE>(flags).unwrap();
        buf.write_u32::<LE>(0).unwrap(); // offset
        buf.write_u32::<LE>(0).unwrap(); // uncompressed
        buf.set_position(0);
        assert!(matches!(
            Entry::decode_meta(&mut buf, &methods()),
            Err(Error::Encrypted)
        ));
    }

    #[test]
    fn payload_round_trip_via_save_and_load() {
        let data = vec![0x41u8; 100_000];
        let mut buf = Cursor::new(Vec::new());
        let entry = Entry::save_data(&mut buf, 0, Compression::Zlib, 65536, 1, &data, None).unwrap();
        assert_eq!(entry.blocks.as_ref().unwrap().len(), 2);
        buf.set_position(0);
        let loaded = entry.load_data(&mut buf, &methods(), None).unwrap();
        assert_eq!(loaded, data);
    }
}
