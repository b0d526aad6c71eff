use crate::Compression;

/// Errors produced while mounting, reading, or saving a pak archive.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("wrong magic: {0:#x}")]
    Magic(u32),
    #[error("unsupported version {actual:?}, minimum supported is {minimum:?}")]
    UnsupportedVersion {
        actual: i32,
        minimum: crate::Version,
    },
    #[error("archive or entry is encrypted, which is not supported")]
    Encrypted,
    #[error("archive has no full directory index, which is not supported")]
    MissingFullDirectoryIndex,
    #[error("archive index declares unencoded entries, which is not supported")]
    UnencodedEntriesPresent,
    #[error("compression method {0:?} is not implemented")]
    CompressionUnimplemented(Compression),
    #[error("compression method {0:?} requires an adapter that was not provided")]
    MissingCompressionAdapter(Compression),
    #[error("unrecognized compression method name {0:?}")]
    UnknownCompressionMethod(String),
    #[error("no entry at path {0:?}")]
    MissingEntry(String),
    #[error("entry already exists at path {0:?}")]
    EntryAlreadyExists(String),
    #[error("entry at {0:?} has no data loaded")]
    MissingEntryData(String),
    #[error("{0:?} does not look like a primary asset path")]
    NotAnAssetPath(String),
    #[error("string length {0} exceeds maximum allowed")]
    StringTooLong(i32),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid utf-8 string")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("invalid utf-16 string")]
    Utf16(#[from] std::string::FromUtf16Error),
    #[error("{0}")]
    Other(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
