//! HDF5 superblock parsing for versions 0, 1, 2 and 3.

use crate::checksum;
use crate::error::FormatError;
use crate::record::{Record, RecordReader};
use crate::signature::HDF5_SIGNATURE;
use crate::symbol_table::SymbolTableEntry;

/// Parsed HDF5 superblock (all versions).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Superblock {
    /// Superblock version (0–3).
    pub version: u8,
    /// Size of offsets in bytes (2, 4, or 8).
    pub offset_size: u8,
    /// Size of lengths in bytes (2, 4, or 8).
    pub length_size: u8,
    /// File offset at which the signature was found.
    pub superblock_start: u64,
    /// Base address as stored in the file.
    pub base_address: u64,
    /// End-of-file address as stored in the file.
    pub eof_address: u64,
    /// Root group object header address.
    pub root_group_address: u64,
    /// Root symbol table entry (v0/v1 only).
    pub root_entry: Option<SymbolTableEntry>,
    /// Group leaf / internal node K (v0/v1 only).
    pub group_leaf_node_k: Option<u16>,
    pub group_internal_node_k: Option<u16>,
    /// Indexed storage internal node K (v1 only).
    pub indexed_storage_internal_node_k: Option<u16>,
    pub consistency_flags: u32,
    /// Superblock extension address (v2/v3 only).
    pub superblock_extension_address: Option<u64>,
}

fn validate_sizes(offset_size: u8, length_size: u8) -> Result<(), FormatError> {
    if !matches!(offset_size, 2 | 4 | 8) {
        return Err(FormatError::InvalidOffsetSize(offset_size));
    }
    if !matches!(length_size, 2 | 4 | 8) {
        return Err(FormatError::InvalidLengthSize(length_size));
    }
    Ok(())
}

impl Superblock {
    /// Parse a superblock from `data` starting at `signature_offset`.
    pub fn parse(data: &[u8], signature_offset: usize) -> Result<Superblock, FormatError> {
        let head = RecordReader::new("superblock", data, signature_offset)
            .field("signature", 8)?
            .field("version", 1)?
            .finish();
        if head.bytes("signature")? != HDF5_SIGNATURE {
            return Err(FormatError::SignatureNotFound);
        }
        match head.u8("version")? {
            v @ (0 | 1) => Self::parse_v0v1(data, signature_offset, v),
            v @ (2 | 3) => Self::parse_v2v3(data, signature_offset, v),
            v => Err(FormatError::UnsupportedVersion(v)),
        }
    }

    fn parse_v0v1(data: &[u8], start: usize, version: u8) -> Result<Superblock, FormatError> {
        let fixed = RecordReader::new("superblock", data, start)
            .skip(9)?
            .field("free_space_version", 1)?
            .field("root_group_version", 1)?
            .skip(1)?
            .field("shared_header_version", 1)?
            .field("offset_size", 1)?
            .field("length_size", 1)?
            .skip(1)?
            .field("group_leaf_k", 2)?
            .field("group_internal_k", 2)?
            .field_if(version == 1, "indexed_storage_k", 2)?
            .skip(if version == 1 { 2 } else { 0 })?
            .field("flags", 4)?;
        let os = fixed.uint("offset_size")? as u8;
        let ls = fixed.uint("length_size")? as u8;
        validate_sizes(os, ls)?;

        let rec = fixed
            .sizes(os, ls)
            .offset("base")?
            .offset("free_space")?
            .offset("eof")?
            .offset("driver_info")?
            .finish();
        let root_entry = SymbolTableEntry::parse(data, rec.end(), os)?;

        Ok(Superblock {
            version,
            offset_size: os,
            length_size: ls,
            superblock_start: start as u64,
            base_address: rec.uint("base")?,
            eof_address: rec.uint("eof")?,
            root_group_address: root_entry.object_header_address,
            root_entry: Some(root_entry),
            group_leaf_node_k: Some(rec.u16("group_leaf_k")?),
            group_internal_node_k: Some(rec.u16("group_internal_k")?),
            indexed_storage_internal_node_k: rec.uint("indexed_storage_k").ok().map(|k| k as u16),
            consistency_flags: rec.u32("flags")?,
            superblock_extension_address: None,
        })
    }

    fn parse_v2v3(data: &[u8], start: usize, version: u8) -> Result<Superblock, FormatError> {
        let fixed = RecordReader::new("superblock", data, start)
            .skip(9)?
            .field("offset_size", 1)?
            .field("length_size", 1)?
            .field("flags", 1)?;
        let os = fixed.uint("offset_size")? as u8;
        let ls = fixed.uint("length_size")? as u8;
        validate_sizes(os, ls)?;

        let rec: Record = fixed
            .sizes(os, ls)
            .offset("base")?
            .offset("extension")?
            .offset("eof")?
            .offset("root")?
            .field("checksum", 4)?
            .finish();
        checksum::verify(data, start, rec.position("checksum")?)?;

        Ok(Superblock {
            version,
            offset_size: os,
            length_size: ls,
            superblock_start: start as u64,
            base_address: rec.uint("base")?,
            eof_address: rec.uint("eof")?,
            root_group_address: rec.uint("root")?,
            root_entry: None,
            group_leaf_node_k: None,
            group_internal_node_k: None,
            indexed_storage_internal_node_k: None,
            consistency_flags: rec.u32("flags")?,
            superblock_extension_address: rec.address("extension")?,
        })
    }

    /// File offset that addresses are relative to.
    ///
    /// A stored base that disagrees with where the superblock was found is
    /// replaced by the superblock position.
    pub fn effective_base(&self) -> u64 {
        self.superblock_start
    }

    /// The file length the superblock claims, adjusted for a relocated base.
    pub fn effective_eof(&self) -> u64 {
        if self.base_address != self.superblock_start {
            self.eof_address.saturating_add(self.superblock_start)
        } else {
            self.eof_address
        }
    }
}
