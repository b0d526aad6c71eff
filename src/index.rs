use byteorder::{ReadBytesExt, WriteBytesExt, LE};
use std::io::{Cursor, Read, Seek, SeekFrom, Write};

use crate::compression::Compression;
use crate::entry::Entry;
use crate::error::{Error, Result};
use crate::ext::{ReadExt, WriteExt};
use crate::name::Name;
use crate::ordered_map::OrderedMap;

/// Marks a full-directory-index slot whose entry was omitted.
const DELETED_OFFSET: i32 = i32::MIN;

/// The decoded archive index: mount point, path-hash seed, and every entry
/// keyed by its full logical path, in the order discovered while walking the
/// full-directory sub-index.
pub struct Index {
    pub mount_point: Name,
    pub path_hash_seed: u64,
    pub entries: OrderedMap<String, Entry>,
}

struct SubHeader {
    offset: u64,
    size: u64,
    hash: [u8; 20],
}

impl SubHeader {
    fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let offset = reader.read_u64::<LE>()?;
        let size = reader.read_u64::<LE>()?;
        let mut hash = [0u8; 20];
        reader.read_exact(&mut hash)?;
        Ok(SubHeader { offset, size, hash })
    }
}

impl Index {
    pub fn read<R: Read + Seek>(reader: &mut R, methods: &[Compression]) -> Result<Self> {
        let mount_point = reader.read_name(0)?;
        let _entry_count = reader.read_i32::<LE>()?;
        let path_hash_seed = reader.read_u64::<LE>()?;

        let has_path_hash = reader.read_i32::<LE>()?;
        let _path_hash_header = (has_path_hash != 0).then_try(|| SubHeader::read(reader))?;

        let has_full_directory = reader.read_i32::<LE>()?;
        if has_full_directory == 0 {
            return Err(Error::MissingFullDirectoryIndex);
        }
        let full_directory_header = SubHeader::read(reader)?;

        let blob_len = reader.read_i32::<LE>()? as usize;
        let blob = reader.read_len(blob_len)?;

        let unencoded_count = reader.read_i32::<LE>()?;
        if unencoded_count != 0 {
            return Err(Error::UnencodedEntriesPresent);
        }

        reader.seek(SeekFrom::Start(full_directory_header.offset))?;
        let mut verify = vec![0u8; full_directory_header.size as usize];
        reader.read_exact(&mut verify)?;
        use sha1::{Digest, Sha1};
        let actual_hash: [u8; 20] = Sha1::digest(&verify).into();
        if actual_hash != full_directory_header.hash {
            log::warn!("full directory index hash mismatch");
        }

        let mut cursor = Cursor::new(verify);
        let directory_count = cursor.read_i32::<LE>()?;
        let mut entries = OrderedMap::new();
        for _ in 0..directory_count {
            let directory = cursor.read_string()?;
            let file_count = cursor.read_i32::<LE>()?;
            for _ in 0..file_count {
                let file_name = cursor.read_string()?;
                let offset = cursor.read_i32::<LE>()?;
                if offset == DELETED_OFFSET {
                    continue;
                }
                let mut entry_cursor = Cursor::new(&blob[offset as usize..]);
                let entry = Entry::decode_meta(&mut entry_cursor, methods)?;
                let path = join_path(&directory, &file_name);
                entries.insert(path, entry);
            }
        }

        log::debug!(
            "mounted index: mount_point={:?} entries={}",
            mount_point.as_str(),
            entries.len()
        );

        Ok(Index {
            mount_point,
            path_hash_seed,
            entries,
        })
    }

    /// Serializes the full index body (primary header, encoded-entries
    /// blob, path-hash sub-index, full-directory sub-index) and returns it
    /// as a standalone buffer with both sub-index headers already
    /// back-patched with their real offset/size/sha1.
    pub fn write(
        mount_point: &Name,
        path_hash_seed: u64,
        entries: &OrderedMap<String, Entry>,
        mut resolve_slot: impl FnMut(Compression) -> u32,
    ) -> Result<Vec<u8>> {
        use sha1::{Digest, Sha1};

        let mut blob = Vec::new();
        let mut blob_offsets: Vec<(String, i32)> = Vec::with_capacity(entries.len());
        for (path, entry) in entries.iter() {
            let offset = blob.len() as i32;
            let slot = resolve_slot(entry.compression);
            entry.encode_meta(&mut blob, slot)?;
            blob_offsets.push((path.clone(), offset));
        }

        let mut directories: OrderedMap<String, Vec<(String, i32)>> = OrderedMap::new();
        directories.insert("/".to_string(), Vec::new());
        for (path, offset) in &blob_offsets {
            let (dir, file) = split_path(path);
            ensure_directory_chain(&mut directories, &dir);
            directories.get_mut(&dir).unwrap().push((file, *offset));
        }

        let mut out = Vec::new();
        out.write_name(mount_point)?;
        out.write_i32::<LE>(entries.len() as i32)?;
        out.write_u64::<LE>(path_hash_seed)?;

        out.write_i32::<LE>(1)?;
        let path_hash_header_pos = out.len();
        out.write_all(&[0u8; 36])?;

        out.write_i32::<LE>(1)?;
        let full_dir_header_pos = out.len();
        out.write_all(&[0u8; 36])?;

        out.write_i32::<LE>(blob.len() as i32)?;
        out.write_all(&blob)?;
        out.write_i32::<LE>(0)?;

        let path_hash_start = out.len();
        out.write_i32::<LE>(blob_offsets.len() as i32)?;
        for (path, offset) in &blob_offsets {
            let name = Name::new(path.as_str(), path_hash_seed);
            out.write_u64::<LE>(name.fnv64())?;
            out.write_i32::<LE>(*offset)?;
        }
        out.write_i32::<LE>(0)?; // directory count in path-hash sub-index
        let path_hash_end = out.len();

        let full_dir_start = out.len();
        out.write_i32::<LE>(directories.len() as i32)?;
        for (dir, files) in directories.iter() {
            out.write_string(dir)?;
            out.write_i32::<LE>(files.len() as i32)?;
            for (file, offset) in files {
                out.write_string(file)?;
                out.write_i32::<LE>(*offset)?;
            }
        }
        let full_dir_end = out.len();

        let path_hash_hash: [u8; 20] = Sha1::digest(&out[path_hash_start..path_hash_end]).into();
        let mut patch = Cursor::new(&mut out[path_hash_header_pos..path_hash_header_pos + 36]);
        patch.write_u64::<LE>(path_hash_start as u64)?;
        patch.write_u64::<LE>((path_hash_end - path_hash_start) as u64)?;
        patch.write_all(&path_hash_hash)?;

        let full_dir_hash: [u8; 20] = Sha1::digest(&out[full_dir_start..full_dir_end]).into();
        let mut patch = Cursor::new(&mut out[full_dir_header_pos..full_dir_header_pos + 36]);
        patch.write_u64::<LE>(full_dir_start as u64)?;
        patch.write_u64::<LE>((full_dir_end - full_dir_start) as u64)?;
        patch.write_all(&full_dir_hash)?;

        Ok(out)
    }
}

fn join_path(directory: &str, file: &str) -> String {
    if directory == "/" {
        file.to_string()
    } else {
        format!("{}{}", directory.trim_start_matches('/'), file)
    }
}

/// Splits `path` into its directory (including trailing slash, `"/"` for the
/// root) and file name, matching the layout `join_path` expects back.
fn split_path(path: &str) -> (String, String) {
    match path.rfind('/') {
        Some(idx) => (format!("/{}/", &path[..idx]), path[idx + 1..].to_string()),
        None => ("/".to_string(), path.to_string()),
    }
}

/// Returns the parent of directory path `dir` (itself in `"/Sub/"` form),
/// or `"/"` if `dir` is already a top-level directory.
fn parent_dir(dir: &str) -> String {
    let trimmed = dir.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) => "/".to_string(),
        Some(idx) => trimmed[..=idx].to_string(),
        None => "/".to_string(),
    }
}

fn ensure_directory_chain(directories: &mut OrderedMap<String, Vec<(String, i32)>>, dir: &str) {
    if directories.contains_key(dir) {
        return;
    }
    let mut ancestors = Vec::new();
    let mut current = dir.to_string();
    while !directories.contains_key(&current) && current != "/" {
        ancestors.push(current.clone());
        current = parent_dir(&current);
    }
    for ancestor in ancestors.into_iter().rev() {
        directories.insert(ancestor, Vec::new());
    }
}

trait OptionExt {
    fn then_try<T>(self, f: impl FnOnce() -> Result<T>) -> Result<Option<T>>;
}
impl OptionExt for bool {
    fn then_try<T>(self, f: impl FnOnce() -> Result<T>) -> Result<Option<T>> {
        if self {
            Ok(Some(f()?))
        } else {
            Ok(None)
        }
    }
}
