//! Parsing of HDF5 on-disk structures.
//!
//! Every parser in this crate works on a borrowed byte slice holding the
//! whole file and an explicit position; nothing here performs I/O or keeps
//! state between calls. Addresses read from the file are relative to the
//! superblock base and are turned into slice positions by [`FileContext`].

pub mod attribute;
pub mod attribute_info;
pub mod btree_v1;
pub mod btree_v2;
pub mod checksum;
pub mod data_layout;
pub mod dataspace;
pub mod datatype;
pub mod error;
pub mod fill_value;
pub mod filter_pipeline;
pub mod filters;
pub mod fractal_heap;
pub mod global_heap;
pub mod link;
pub mod local_heap;
pub mod message;
pub mod message_type;
pub mod object_header;
pub mod record;
pub mod signature;
pub mod superblock;
pub mod symbol_table;

pub use error::FormatError;

use byteorder::{ByteOrder, LittleEndian};
use record::RecordReader;

/// The undefined address, compared at offset width.
pub const UNDEFINED_ADDRESS: u64 = u64::MAX;

/// True when `value` is all ones at `size` bytes.
pub fn is_undefined(value: u64, size: u8) -> bool {
    match size {
        0 => false,
        8.. => value == u64::MAX,
        s => value == (1u64 << (s as u32 * 8)) - 1,
    }
}

/// Read a little-endian unsigned integer of `size` bytes at `pos`.
pub fn read_uint(data: &[u8], pos: usize, size: usize) -> Result<u64, FormatError> {
    if size == 0 || size > 8 {
        return Err(FormatError::InvalidData(format!("integer width {size}")));
    }
    let end = pos
        .checked_add(size)
        .filter(|&e| e <= data.len())
        .ok_or_else(|| FormatError::eof((pos + size) as u64, data.len()))?;
    Ok(LittleEndian::read_uint(&data[pos..end], size))
}

/// Read an offset-sized address at `pos`, mapping all ones to `None`.
pub fn read_address(data: &[u8], pos: usize, offset_size: u8) -> Result<Option<u64>, FormatError> {
    let v = read_uint(data, pos, offset_size as usize)?;
    Ok(if is_undefined(v, offset_size) { None } else { Some(v) })
}

/// Number of bytes needed to hold `value`.
pub fn bytes_needed(value: u64) -> usize {
    (((64 - value.leading_zeros()) as usize) + 7) / 8
}

/// Whole-file view shared by the structure parsers.
#[derive(Debug, Clone, Copy)]
pub struct FileContext<'a> {
    pub data: &'a [u8],
    /// File offset that addresses are relative to.
    pub base: u64,
    pub offset_size: u8,
    pub length_size: u8,
    pub verify_checksums: bool,
}

impl<'a> FileContext<'a> {
    pub fn new(data: &'a [u8], base: u64, offset_size: u8, length_size: u8) -> Self {
        Self {
            data,
            base,
            offset_size,
            length_size,
            verify_checksums: false,
        }
    }

    pub fn with_checksums(mut self, verify: bool) -> Self {
        self.verify_checksums = verify;
        self
    }

    /// Slice position of a file address.
    pub fn pos(&self, address: u64) -> Result<usize, FormatError> {
        let abs = self
            .base
            .checked_add(address)
            .ok_or_else(|| FormatError::InvalidData(format!("address {address:#x} overflows")))?;
        if abs >= self.data.len() as u64 {
            return Err(FormatError::UnexpectedEof {
                expected: abs + 1,
                available: self.data.len() as u64,
            });
        }
        Ok(abs as usize)
    }

    /// `len` bytes starting at a file address.
    pub fn bytes(&self, address: u64, len: usize) -> Result<&'a [u8], FormatError> {
        let start = self.pos(address)?;
        let end = start
            .checked_add(len)
            .filter(|&e| e <= self.data.len())
            .ok_or_else(|| FormatError::eof((start + len) as u64, self.data.len()))?;
        Ok(&self.data[start..end])
    }

    /// A [`RecordReader`] positioned at a file address with this file's sizes.
    pub fn reader(&self, name: &'static str, address: u64) -> Result<RecordReader<'a>, FormatError> {
        Ok(RecordReader::new(name, self.data, self.pos(address)?).sizes(self.offset_size, self.length_size))
    }

    /// Convert a slice position back to a file address.
    pub fn address_of(&self, pos: usize) -> u64 {
        pos as u64 - self.base
    }

    pub fn is_undefined(&self, address: u64) -> bool {
        is_undefined(address, self.offset_size)
    }
}
