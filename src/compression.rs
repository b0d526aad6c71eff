use crate::error::{Error, Result};

/// Compression methods an entry may be stored under. `LZ4` and `Custom` are
/// recognized (so the method name table round-trips) but rejected at
/// decode/encode time: the reference encoder this crate targets never
/// produces them.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString,
)]
pub enum Compression {
    #[default]
    #[strum(serialize = "")]
    None,
    Zlib,
    Gzip,
    Oodle,
    LZ4,
    Custom,
}

/// A pluggable third-party codec (Oodle in practice) injected by the caller.
/// The core crate never links a concrete implementation.
pub trait OodleAdapter: Send + Sync {
    fn decompress(&self, compressed: &[u8], uncompressed: &mut [u8]) -> Result<()>;
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// Upper bound on the compressed size of `uncompressed_len` bytes, used
    /// to size scratch buffers before calling [`Self::compress`]. The
    /// default is deliberately generous for adapters that don't expose a
    /// tighter bound.
    fn max_compressed_size(&self, uncompressed_len: usize) -> usize {
        uncompressed_len + uncompressed_len / 16 + 64
    }
}

/// Decompresses exactly `out.len()` bytes from `input` using `method`.
pub fn decompress_block(
    method: Compression,
    input: &[u8],
    out: &mut [u8],
    oodle: Option<&dyn OodleAdapter>,
) -> Result<()> {
    match method {
        Compression::None => {
            out.copy_from_slice(&input[..out.len()]);
            Ok(())
        }
        #[cfg(feature = "compression")]
        Compression::Zlib => {
            use std::io::Read;
            let mut decoder = flate2::read::ZlibDecoder::new(input);
            decoder.read_exact(out)?;
            Ok(())
        }
        #[cfg(feature = "compression")]
        Compression::Gzip => {
            use std::io::Read;
            let mut decoder = flate2::read::GzDecoder::new(input);
            decoder.read_exact(out)?;
            Ok(())
        }
        #[cfg(not(feature = "compression"))]
        Compression::Zlib | Compression::Gzip => Err(Error::CompressionUnimplemented(method)),
        Compression::Oodle => match oodle {
            Some(adapter) => adapter.decompress(input, out),
            None => Err(Error::MissingCompressionAdapter(method)),
        },
        Compression::LZ4 | Compression::Custom => Err(Error::CompressionUnimplemented(method)),
    }
}

/// Compresses `data` with `method`, returning the stored bytes.
pub fn compress_block(
    method: Compression,
    data: &[u8],
    oodle: Option<&dyn OodleAdapter>,
) -> Result<Vec<u8>> {
    match method {
        Compression::None => Ok(data.to_vec()),
        #[cfg(feature = "compression")]
        Compression::Zlib => {
            use std::io::Write;
            let mut encoder =
                flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::fast());
            encoder.write_all(data)?;
            Ok(encoder.finish()?)
        }
        #[cfg(feature = "compression")]
        Compression::Gzip => {
            use std::io::Write;
            let mut encoder =
                flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::fast());
            encoder.write_all(data)?;
            Ok(encoder.finish()?)
        }
        #[cfg(not(feature = "compression"))]
        Compression::Zlib | Compression::Gzip => Err(Error::CompressionUnimplemented(method)),
        Compression::Oodle => match oodle {
            Some(adapter) => adapter.compress(data),
            None => Err(Error::MissingCompressionAdapter(method)),
        },
        Compression::LZ4 | Compression::Custom => Err(Error::CompressionUnimplemented(method)),
    }
}
