//! Read and write Unreal Engine `.pak` archives: mount an existing archive,
//! enumerate and lazily read its entries, or build a new archive from
//! scratch and save it back out, byte-compatible with the reference
//! `UnrealPak` tool.
//!
//! ```no_run
//! use std::io::Cursor;
//! use unpak::{Compression, PakBuilder};
//!
//! # fn main() -> unpak::Result<()> {
//! let mut pak = PakBuilder::new().create("../../../MyGame/", Compression::None);
//! pak.add_entry("Content/Hello.uasset", b"hello".to_vec())?;
//!
//! let mut out = Cursor::new(Vec::new());
//! pak.save::<Cursor<Vec<u8>>, _>(&mut out, None)?;
//! # Ok(())
//! # }
//! ```

mod compression;
mod entry;
mod error;
mod ext;
mod footer;
mod hash;
mod index;
mod name;
mod ordered_map;
mod pak;

pub use compression::{Compression, OodleAdapter};
pub use error::{Error, Result};
pub use footer::MAGIC;
pub use name::{Name, NameEncoding};
pub use pak::{Asset, PakBuilder, PakFile};

/// The on-disk pak format version this crate reads and writes. Only
/// versions carrying the FNV64 path-hash fix (11 and later) are supported;
/// anything older is rejected with [`Error::UnsupportedVersion`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Version(pub i16);

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "V{}", self.0)
    }
}

impl Version {
    pub const MIN_SUPPORTED: Version = Version(footer::MIN_VERSION);
    pub const LATEST: Version = Version(footer::LATEST_VERSION);
}
