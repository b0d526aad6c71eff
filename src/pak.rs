use std::io::{Read, Seek, SeekFrom, Write};

use crate::compression::{Compression, OodleAdapter};
use crate::entry::Entry;
use crate::error::{Error, Result};
use crate::footer::{Footer, LATEST_VERSION};
use crate::hash::crc32_lower;
use crate::index::Index;
use crate::name::Name;
use crate::ordered_map::OrderedMap;

const MOUNT_PREFIX: &str = "../../../";
const ASSET_EXPORT_EXT: &str = "uexp";
const ASSET_BULK_EXT: &str = "ubulk";
const ASSET_OPTIONAL_BULK_EXT: &str = "uptnl";

/// The three files that make up one Unreal "asset": the main package file
/// plus its optional cooked export payload and bulk data payload.
pub struct Asset {
    pub main: Vec<u8>,
    pub export: Option<Vec<u8>>,
    pub bulk: Option<Vec<u8>>,
}

/// Configures an archive before it is mounted or created: which Oodle
/// implementation (if any) to use, and which compression methods a new
/// archive is allowed to pick from.
#[derive(Default)]
pub struct PakBuilder {
    oodle: Option<Box<dyn OodleAdapter>>,
}

impl PakBuilder {
    pub fn new() -> Self {
        PakBuilder::default()
    }

    pub fn oodle(mut self, adapter: Box<dyn OodleAdapter>) -> Self {
        self.oodle = Some(adapter);
        self
    }

    pub fn mount<R: Read + Seek>(self, reader: &mut R) -> Result<PakFile> {
        PakFile::mount(reader, self.oodle)
    }

    pub fn create(self, mount_point: impl Into<String>, compression: Compression) -> PakFile {
        PakFile::create(mount_point, compression, self.oodle)
    }
}

/// A mounted or in-progress pak archive: its entries, mount point, and the
/// compression method slots declared in its trailer.
pub struct PakFile {
    mount_point: Name,
    relative_mount_point: String,
    path_hash_seed: u64,
    version: i16,
    compression_slots: Vec<Option<Compression>>,
    default_compression: Compression,
    entries: OrderedMap<String, Entry>,
    oodle: Option<Box<dyn OodleAdapter>>,
}

impl PakFile {
    pub fn mount<R: Read + Seek>(
        reader: &mut R,
        oodle: Option<Box<dyn OodleAdapter>>,
    ) -> Result<Self> {
        let len = reader.seek(SeekFrom::End(0))?;
        if len < Footer::SERIALIZED_SIZE {
            return Err(Error::Other("stream too short to contain a footer".into()));
        }
        reader.seek(SeekFrom::Start(len - Footer::SERIALIZED_SIZE))?;
        let footer = Footer::read(reader)?;

        let methods: Vec<Compression> = std::iter::once(Compression::None)
            .chain(footer.compression_methods.iter().filter_map(|m| *m))
            .collect();

        reader.seek(SeekFrom::Start(footer.index_offset))?;
        let index = Index::read(reader, &methods)?;

        let mut entries: OrderedMap<String, Entry> = OrderedMap::new();
        for (path, mut entry) in index.entries.iter().map(|(k, v)| (k.clone(), v.clone())) {
            entry.data = None;
            entries.insert(path, entry);
        }

        let relative_mount_point = strip_mount_prefix(index.mount_point.as_str());

        log::debug!(
            "mounted pak: version={} entries={} mount_point={:?}",
            footer.version,
            entries.len(),
            index.mount_point.as_str()
        );

        Ok(PakFile {
            mount_point: index.mount_point,
            relative_mount_point,
            path_hash_seed: index.path_hash_seed,
            version: footer.version,
            compression_slots: footer.compression_methods,
            default_compression: Compression::None,
            entries,
            oodle,
        })
    }

    pub fn create(
        mount_point: impl Into<String>,
        compression: Compression,
        oodle: Option<Box<dyn OodleAdapter>>,
    ) -> Self {
        let mount_point = mount_point.into();
        let relative_mount_point = strip_mount_prefix(&mount_point);
        let seed_source = mount_point
            .rsplit('/')
            .find(|s| !s.is_empty())
            .unwrap_or(&mount_point);
        let path_hash_seed = crc32_lower(seed_source) as u64;

        let mut compression_slots = vec![None; 5];
        if compression != Compression::None {
            compression_slots[0] = Some(compression);
        }

        PakFile {
            mount_point: Name::new(mount_point, path_hash_seed),
            relative_mount_point,
            path_hash_seed,
            version: LATEST_VERSION,
            compression_slots,
            default_compression: compression,
            entries: OrderedMap::new(),
            oodle,
        }
    }

    pub fn mount_point(&self) -> &str {
        self.mount_point.as_str()
    }

    /// The compression method table implied by this archive's slots, with
    /// index 0 always [`Compression::None`], matching how `mount` builds it
    /// from a footer's `compression_methods`.
    fn method_table(&self) -> Vec<Compression> {
        std::iter::once(Compression::None)
            .chain(self.compression_slots.iter().filter_map(|m| *m))
            .collect()
    }

    pub fn version(&self) -> i16 {
        self.version
    }

    pub fn entries(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|s| s.as_str())
    }

    pub fn has_entry(&self, path: &str) -> bool {
        self.resolve(path).is_some()
    }

    fn resolve(&self, path: &str) -> Option<&str> {
        let candidates = [
            path.to_string(),
            strip_prefix_owned(path, self.mount_point.as_str()),
            strip_prefix_owned(path, &self.relative_mount_point),
        ];
        for candidate in &candidates {
            if self.entries.contains_key(candidate.as_str()) {
                return self
                    .entries
                    .keys()
                    .find(|k| k.as_str() == candidate.as_str())
                    .map(|s| s.as_str());
            }
        }
        None
    }

    /// Reads one entry's payload, loading it lazily from `reader` if it
    /// hasn't been loaded or created in memory yet.
    pub fn read_entry<R: Read + Seek>(&self, path: &str, reader: &mut R) -> Result<Vec<u8>> {
        let key = self
            .resolve(path)
            .ok_or_else(|| Error::MissingEntry(path.to_string()))?
            .to_string();
        let entry = self.entries.get(key.as_str()).unwrap();
        if let Some(data) = &entry.data {
            return Ok(data.clone());
        }
        entry.load_data(reader, &self.method_table(), self.oodle.as_deref())
    }

    /// Adds a brand-new entry with its payload already in memory.
    pub fn add_entry(&mut self, path: impl Into<String>, data: Vec<u8>) -> Result<()> {
        let path = normalize_key(&path.into(), self.mount_point.as_str(), &self.relative_mount_point);
        if self.entries.contains_key(path.as_str()) {
            return Err(Error::EntryAlreadyExists(path));
        }
        let entry = Entry {
            offset: 0,
            compressed: data.len() as u64,
            uncompressed: data.len() as u64,
            compression: self.default_compression,
            compression_block_size: 0,
            blocks: None,
            hash: [0; 20],
            data: Some(data),
        };
        self.entries.insert(path, entry);
        Ok(())
    }

    pub fn remove_entry(&mut self, path: &str) -> Result<()> {
        let key = self
            .resolve(path)
            .ok_or_else(|| Error::MissingEntry(path.to_string()))?
            .to_string();
        self.entries.remove(key.as_str());
        Ok(())
    }

    /// Overwrites an existing entry's payload in place.
    pub fn write_entry(&mut self, path: &str, data: Vec<u8>) -> Result<()> {
        let key = self
            .resolve(path)
            .ok_or_else(|| Error::MissingEntry(path.to_string()))?
            .to_string();
        let entry = self.entries.get_mut(key.as_str()).unwrap();
        entry.data = Some(data.clone());
        entry.uncompressed = data.len() as u64;
        entry.compressed = data.len() as u64;
        Ok(())
    }

    /// Reads a primary asset's main package bytes together with its
    /// optional `.uexp` export and `.ubulk`/`.uptnl` bulk payloads.
    pub fn get_asset<R: Read + Seek>(&self, path: &str, reader: &mut R) -> Result<Asset> {
        let ext = path.rsplit('.').next().unwrap_or("");
        if [ASSET_EXPORT_EXT, ASSET_BULK_EXT, ASSET_OPTIONAL_BULK_EXT].contains(&ext) {
            return Err(Error::NotAnAssetPath(path.to_string()));
        }
        let main = self.read_entry(path, reader)?;
        let export = self
            .read_entry(&with_ext(path, ASSET_EXPORT_EXT), reader)
            .ok();
        let bulk = self
            .read_entry(&with_ext(path, ASSET_BULK_EXT), reader)
            .ok()
            .or_else(|| self.read_entry(&with_ext(path, ASSET_OPTIONAL_BULK_EXT), reader).ok());
        Ok(Asset { main, export, bulk })
    }

    /// Writes every entry's payload, then the two sub-indices and the
    /// trailer, to `writer`. Entries lacking in-memory data are pulled from
    /// `source` first.
    pub fn save<R: Read + Seek, W: Write + Seek>(
        &mut self,
        writer: &mut W,
        source: Option<&mut R>,
    ) -> Result<()> {
        if let Some(source) = source {
            let methods = self.method_table();
            let paths: Vec<String> = self
                .entries
                .iter()
                .filter(|(_, e)| e.data.is_none())
                .map(|(k, _)| k.clone())
                .collect();
            for path in paths {
                let data = {
                    let entry = self.entries.get(path.as_str()).unwrap();
                    entry.load_data(source, &methods, self.oodle.as_deref())?
                };
                self.entries.get_mut(path.as_str()).unwrap().data = Some(data);
            }
        }

        let mut compression_slots = self.compression_slots.clone();
        let mut written: OrderedMap<String, Entry> = OrderedMap::new();

        for (path, entry) in self.entries.iter() {
            let data = entry
                .data
                .as_ref()
                .ok_or_else(|| Error::MissingEntryData(path.clone()))?;
            let offset = writer.stream_position()?;
            let compression = entry.compression;
            let method_index = resolve_method_index(&mut compression_slots, compression)?;
            let block_size = if entry.compression_block_size > 0 {
                entry.compression_block_size
            } else {
                0x10000
            };
            let written_entry = Entry::save_data(
                writer,
                offset,
                compression,
                block_size,
                method_index,
                data,
                self.oodle.as_deref(),
            )?;
            log::trace!("wrote entry {path:?} at offset {offset}");
            written.insert(path.clone(), written_entry);
        }

        let index_offset = writer.stream_position()?;
        let index_bytes = Index::write(&self.mount_point, self.path_hash_seed, &written, |c| {
            resolve_method_index(&mut compression_slots, c).unwrap_or(0)
        })?;
        writer.write_all(&index_bytes)?;
        let index_size = index_bytes.len() as u64;

        use sha1::{Digest, Sha1};
        let index_hash: [u8; 20] = Sha1::digest(&index_bytes).into();

        let footer = Footer {
            version: self.version,
            subversion: 0,
            index_offset,
            index_size,
            index_hash,
            compression_methods: compression_slots,
        };
        footer.write(writer)?;

        self.entries = written;
        log::debug!("saved pak: index_offset={index_offset} index_size={index_size}");
        Ok(())
    }
}

fn resolve_method_index(
    slots: &mut [Option<Compression>],
    method: Compression,
) -> Result<u32> {
    if method == Compression::None {
        return Ok(0);
    }
    if let Some((i, _)) = slots.iter().enumerate().find(|(_, s)| **s == Some(method)) {
        return Ok(i as u32 + 1);
    }
    if let Some((i, slot)) = slots.iter_mut().enumerate().find(|(_, s)| s.is_none()) {
        *slot = Some(method);
        return Ok(i as u32 + 1);
    }
    Err(Error::Other(format!(
        "no free compression slot for {method:?}"
    )))
}

/// Matches the source's `Path.IsPathRooted`: a leading `/` or `\`, or a
/// Windows drive letter (`[A-Za-z]:[\\/]`).
fn is_rooted(path: &str) -> bool {
    if path.starts_with('/') || path.starts_with('\\') {
        return true;
    }
    let bytes = path.as_bytes();
    bytes.len() >= 3
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && (bytes[2] == b'\\' || bytes[2] == b'/')
}

/// Strips the `../../../` mount-point prefix if present. If what remains is
/// itself a rooted path, the relative mount point collapses to empty;
/// otherwise it's the (possibly prefix-stripped) mount point unchanged.
fn strip_mount_prefix(mount_point: &str) -> String {
    let stripped = mount_point.strip_prefix(MOUNT_PREFIX).unwrap_or(mount_point);
    if is_rooted(stripped) {
        String::new()
    } else {
        stripped.to_string()
    }
}

fn strip_prefix_owned(path: &str, prefix: &str) -> String {
    path.strip_prefix(prefix).unwrap_or(path).to_string()
}

fn normalize_key(path: &str, mount_point: &str, relative_mount_point: &str) -> String {
    let path = path.strip_prefix(MOUNT_PREFIX).unwrap_or(path);
    let path = path.strip_prefix(mount_point).unwrap_or(path);
    let path = path.strip_prefix(relative_mount_point).unwrap_or(path);
    path.to_string()
}

fn with_ext(path: &str, ext: &str) -> String {
    match path.rsplit_once('.') {
        Some((stem, _)) => format!("{stem}.{ext}"),
        None => format!("{path}.{ext}"),
    }
}
