//! HDF5 file signature (magic bytes) detection.

use crate::error::FormatError;

/// The 8-byte HDF5 magic signature.
pub const HDF5_SIGNATURE: [u8; 8] = [0x89, b'H', b'D', b'F', b'\r', b'\n', 0x1A, b'\n'];

/// Default bound on how far into a file the superblock is searched for.
pub const DEFAULT_SEARCH_LIMIT: u64 = 500_000;

/// Search for the HDF5 signature at offset 0, 512, 1024, 2048, ...
///
/// Offsets at or beyond `limit` are not examined, so a file with a large
/// user block fails fast instead of being scanned to the end.
pub fn find_signature(data: &[u8], limit: u64) -> Result<u64, FormatError> {
    let mut offset: u64 = 0;
    while offset < limit && offset + 8 <= data.len() as u64 {
        let at = offset as usize;
        if data[at..at + 8] == HDF5_SIGNATURE {
            tracing::debug!(offset, "found HDF5 signature");
            return Ok(offset);
        }
        offset = if offset == 0 { 512 } else { offset * 2 };
    }
    Err(FormatError::SignatureNotFound)
}
