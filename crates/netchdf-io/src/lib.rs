//! Byte sources for HDF5 decoding.
//!
//! Every decoder in the workspace works against a [`ByteSource`]: a
//! read-only, random-access view of the whole file. There is no ambient
//! cursor; reads either take an absolute position or an explicit
//! [`ReadState`] token carrying the position and byte order.

use std::io::{self, Read};
use std::path::Path;

use byteorder::{BigEndian, ByteOrder, LittleEndian};

#[cfg(feature = "mmap")]
mod mmap;

#[cfg(feature = "mmap")]
pub use mmap::MmapSource;

/// Byte order of a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Endian {
    #[default]
    Little,
    Big,
}

impl Endian {
    pub fn read_u16(self, buf: &[u8]) -> u16 {
        match self {
            Endian::Little => LittleEndian::read_u16(buf),
            Endian::Big => BigEndian::read_u16(buf),
        }
    }

    pub fn read_i16(self, buf: &[u8]) -> i16 {
        match self {
            Endian::Little => LittleEndian::read_i16(buf),
            Endian::Big => BigEndian::read_i16(buf),
        }
    }

    pub fn read_u32(self, buf: &[u8]) -> u32 {
        match self {
            Endian::Little => LittleEndian::read_u32(buf),
            Endian::Big => BigEndian::read_u32(buf),
        }
    }

    pub fn read_i32(self, buf: &[u8]) -> i32 {
        match self {
            Endian::Little => LittleEndian::read_i32(buf),
            Endian::Big => BigEndian::read_i32(buf),
        }
    }

    pub fn read_u64(self, buf: &[u8]) -> u64 {
        match self {
            Endian::Little => LittleEndian::read_u64(buf),
            Endian::Big => BigEndian::read_u64(buf),
        }
    }

    pub fn read_i64(self, buf: &[u8]) -> i64 {
        match self {
            Endian::Little => LittleEndian::read_i64(buf),
            Endian::Big => BigEndian::read_i64(buf),
        }
    }

    pub fn read_f32(self, buf: &[u8]) -> f32 {
        match self {
            Endian::Little => LittleEndian::read_f32(buf),
            Endian::Big => BigEndian::read_f32(buf),
        }
    }

    pub fn read_f64(self, buf: &[u8]) -> f64 {
        match self {
            Endian::Little => LittleEndian::read_f64(buf),
            Endian::Big => BigEndian::read_f64(buf),
        }
    }

    /// Read an unsigned integer of 1..=8 bytes.
    pub fn read_uint(self, buf: &[u8], nbytes: usize) -> u64 {
        match self {
            Endian::Little => LittleEndian::read_uint(buf, nbytes),
            Endian::Big => BigEndian::read_uint(buf, nbytes),
        }
    }
}

/// Explicit position token for sequential reads.
///
/// Copying a state is how a caller forks a read at a different position
/// or byte order without disturbing the original.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadState {
    pub pos: u64,
    pub order: Endian,
}

impl ReadState {
    pub fn new(pos: u64) -> Self {
        Self {
            pos,
            order: Endian::Little,
        }
    }

    pub fn with_order(pos: u64, order: Endian) -> Self {
        Self { pos, order }
    }

    /// Return a copy positioned at `pos`.
    pub fn at(self, pos: u64) -> Self {
        Self { pos, ..self }
    }

    pub fn skip(&mut self, n: u64) {
        self.pos += n;
    }
}

fn short_read(pos: u64, len: usize, available: usize) -> io::Error {
    io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("short read: {len} bytes at {pos}, source has {available}"),
    )
}

/// Read-only random access to the bytes of one file.
///
/// Implementors only provide [`as_bytes`](ByteSource::as_bytes); every typed
/// read is derived from it and bounds-checked, so a read past the end is an
/// `UnexpectedEof` I/O error rather than a panic. Plain slices are sources
/// too, which lets record decoders share the same readers.
pub trait ByteSource: Send + Sync {
    /// The entire content.
    fn as_bytes(&self) -> &[u8];

    fn len(&self) -> u64 {
        self.as_bytes().len() as u64
    }

    fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }

    /// Borrow `len` bytes at absolute position `pos`.
    fn read_at(&self, pos: u64, len: usize) -> io::Result<&[u8]> {
        let data = self.as_bytes();
        let start = usize::try_from(pos).map_err(|_| short_read(pos, len, data.len()))?;
        start
            .checked_add(len)
            .and_then(|end| data.get(start..end))
            .ok_or_else(|| short_read(pos, len, data.len()))
    }

    /// Borrow `len` bytes at the state's position and advance it.
    fn read_bytes(&self, state: &mut ReadState, len: usize) -> io::Result<&[u8]> {
        let buf = self.read_at(state.pos, len)?;
        state.pos += len as u64;
        Ok(buf)
    }

    fn read_u8(&self, state: &mut ReadState) -> io::Result<u8> {
        Ok(self.read_bytes(state, 1)?[0])
    }

    fn read_u16(&self, state: &mut ReadState) -> io::Result<u16> {
        let order = state.order;
        Ok(order.read_u16(self.read_bytes(state, 2)?))
    }

    fn read_u32(&self, state: &mut ReadState) -> io::Result<u32> {
        let order = state.order;
        Ok(order.read_u32(self.read_bytes(state, 4)?))
    }

    fn read_i32(&self, state: &mut ReadState) -> io::Result<i32> {
        let order = state.order;
        Ok(order.read_i32(self.read_bytes(state, 4)?))
    }

    fn read_u64(&self, state: &mut ReadState) -> io::Result<u64> {
        let order = state.order;
        Ok(order.read_u64(self.read_bytes(state, 8)?))
    }

    fn read_f64(&self, state: &mut ReadState) -> io::Result<f64> {
        let order = state.order;
        Ok(order.read_f64(self.read_bytes(state, 8)?))
    }

    /// Read an unsigned value whose width (1..=8 bytes) is only known at runtime.
    fn read_uint(&self, state: &mut ReadState, nbytes: usize) -> io::Result<u64> {
        if nbytes == 0 || nbytes > 8 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("cannot read a {nbytes}-byte integer"),
            ));
        }
        let order = state.order;
        Ok(order.read_uint(self.read_bytes(state, nbytes)?, nbytes))
    }

    /// Read exactly `len` bytes as text, stopping at the first NUL.
    fn read_string(&self, state: &mut ReadState, len: usize) -> io::Result<String> {
        let buf = self.read_bytes(state, len)?;
        let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
        Ok(String::from_utf8_lossy(&buf[..end]).into_owned())
    }
}

impl ByteSource for [u8] {
    fn as_bytes(&self) -> &[u8] {
        self
    }
}

impl<T: ByteSource + ?Sized> ByteSource for std::sync::Arc<T> {
    fn as_bytes(&self) -> &[u8] {
        (**self).as_bytes()
    }
}

impl<T: ByteSource + ?Sized> ByteSource for Box<T> {
    fn as_bytes(&self) -> &[u8] {
        (**self).as_bytes()
    }
}

/// In-memory source backed by an owned `Vec<u8>`.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    data: Vec<u8>,
}

impl MemorySource {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn from_slice(data: &[u8]) -> Self {
        Self {
            data: data.to_vec(),
        }
    }
}

impl ByteSource for MemorySource {
    fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

/// File-backed source that loads the entire file into memory.
#[derive(Debug)]
pub struct FileSource {
    data: Vec<u8>,
}

impl FileSource {
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let mut file = std::fs::File::open(path)?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        Ok(Self { data })
    }
}

impl ByteSource for FileSource {
    fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}
