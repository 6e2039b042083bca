//! Error types for HDF5 format parsing.

use core::fmt;

/// Errors that can occur when parsing HDF5 binary format structures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// The HDF5 magic signature was not found inside the search window.
    SignatureNotFound,
    /// The superblock version is not supported.
    UnsupportedVersion(u8),
    /// Unexpected end of data.
    UnexpectedEof {
        /// Number of bytes expected.
        expected: u64,
        /// Number of bytes actually available.
        available: u64,
    },
    /// Invalid offset size (must be 2, 4, or 8).
    InvalidOffsetSize(u8),
    /// Invalid length size (must be 2, 4, or 8).
    InvalidLengthSize(u8),
    /// A structure did not start with its expected magic bytes.
    InvalidSignature {
        expected: &'static str,
        found: [u8; 4],
        address: u64,
    },
    /// Invalid object header version.
    InvalidObjectHeaderVersion(u8),
    /// Metadata checksum mismatch.
    ChecksumMismatch {
        /// The checksum stored in the file.
        expected: u32,
        /// The checksum we computed.
        computed: u32,
    },
    InvalidDatatypeClass(u8),
    InvalidDatatypeVersion {
        class: u8,
        version: u8,
    },
    InvalidDataspaceVersion(u8),
    InvalidLayoutVersion(u8),
    InvalidLayoutClass(u8),
    InvalidMessageVersion {
        message: &'static str,
        version: u8,
    },
    /// Sibling keys in a chunk B-tree node are not strictly increasing.
    KeyOrder {
        node: u64,
        index: usize,
    },
    /// A heap id or offset does not resolve to a live object.
    HeapObjectNotFound {
        heap: u64,
        id: u64,
    },
    /// A record field was requested that the layout never declared.
    MissingField(&'static str),
    /// Recognized construct that this reader does not implement.
    Unsupported(String),
    /// A filter failed to decode a chunk.
    Filter(String),
    /// Structurally valid bytes carrying impossible values.
    InvalidData(String),
}

impl FormatError {
    pub(crate) fn eof(expected: u64, available: usize) -> Self {
        FormatError::UnexpectedEof {
            expected,
            available: available as u64,
        }
    }
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatError::SignatureNotFound => {
                write!(f, "HDF5 signature not found at any valid offset")
            }
            FormatError::UnsupportedVersion(v) => {
                write!(f, "unsupported superblock version: {v}")
            }
            FormatError::UnexpectedEof {
                expected,
                available,
            } => {
                write!(f, "unexpected EOF: need {expected} bytes, have {available}")
            }
            FormatError::InvalidOffsetSize(s) => {
                write!(f, "invalid offset size: {s} (must be 2, 4, or 8)")
            }
            FormatError::InvalidLengthSize(s) => {
                write!(f, "invalid length size: {s} (must be 2, 4, or 8)")
            }
            FormatError::InvalidSignature {
                expected,
                found,
                address,
            } => {
                write!(
                    f,
                    "expected {expected} signature at {address:#x}, found {:?}",
                    String::from_utf8_lossy(found)
                )
            }
            FormatError::InvalidObjectHeaderVersion(v) => {
                write!(f, "invalid object header version: {v}")
            }
            FormatError::ChecksumMismatch { expected, computed } => {
                write!(
                    f,
                    "checksum mismatch: expected {expected:#010x}, computed {computed:#010x}"
                )
            }
            FormatError::InvalidDatatypeClass(c) => write!(f, "invalid datatype class: {c}"),
            FormatError::InvalidDatatypeVersion { class, version } => {
                write!(f, "invalid version {version} for datatype class {class}")
            }
            FormatError::InvalidDataspaceVersion(v) => {
                write!(f, "invalid dataspace version: {v}")
            }
            FormatError::InvalidLayoutVersion(v) => write!(f, "invalid data layout version: {v}"),
            FormatError::InvalidLayoutClass(c) => write!(f, "invalid data layout class: {c}"),
            FormatError::InvalidMessageVersion { message, version } => {
                write!(f, "invalid {message} message version: {version}")
            }
            FormatError::KeyOrder { node, index } => {
                write!(
                    f,
                    "chunk b-tree node at {node:#x}: key {index} is not greater than its predecessor"
                )
            }
            FormatError::HeapObjectNotFound { heap, id } => {
                write!(f, "heap at {heap:#x} has no object {id}")
            }
            FormatError::MissingField(name) => write!(f, "record has no field {name:?}"),
            FormatError::Unsupported(what) => write!(f, "unsupported: {what}"),
            FormatError::Filter(msg) => write!(f, "filter error: {msg}"),
            FormatError::InvalidData(msg) => write!(f, "invalid data: {msg}"),
        }
    }
}

impl std::error::Error for FormatError {}
