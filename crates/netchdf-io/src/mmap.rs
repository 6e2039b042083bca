//! Memory-mapped byte source.

use std::fs;
use std::io;
use std::path::Path;

use memmap2::Mmap;

use crate::ByteSource;

/// Read-only memory-mapped file.
///
/// `as_bytes` and `read_at` return slices into the mapping
/// without copying.
pub struct MmapSource {
    _file: fs::File,
    mmap: Mmap,
}

impl MmapSource {
    /// Open and map a file for reading.
    ///
    /// The file must not be modified by another process while mapped.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = fs::File::open(path)?;
        // SAFETY: read-only mapping; HDF5 files are treated as immutable for
        // the lifetime of the reader.
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Self { _file: file, mmap })
    }
}

impl ByteSource for MmapSource {
    fn as_bytes(&self) -> &[u8] {
        &self.mmap
    }
}

impl std::fmt::Debug for MmapSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MmapSource").field("len", &self.mmap.len()).finish()
    }
}
