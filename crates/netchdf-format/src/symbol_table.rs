//! Symbol table message (0x0011), symbol table entries and SNOD nodes.

use crate::error::FormatError;
use crate::record::RecordReader;
use crate::FileContext;

/// Symbol table message found in old-style group object headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolTableMessage {
    /// Address of the v1 B-tree (type 0) indexing the group.
    pub btree_address: u64,
    /// Address of the local heap holding member names.
    pub local_heap_address: u64,
}

impl SymbolTableMessage {
    pub fn parse(data: &[u8], offset_size: u8) -> Result<SymbolTableMessage, FormatError> {
        let rec = RecordReader::new("symbol table message", data, 0)
            .sizes(offset_size, 8)
            .offset("btree")?
            .offset("heap")?
            .finish();
        Ok(SymbolTableMessage {
            btree_address: rec.uint("btree")?,
            local_heap_address: rec.uint("heap")?,
        })
    }
}

/// Cache type of an entry whose scratch pad holds B-tree and heap addresses.
pub const CACHE_GROUP: u32 = 1;
/// Cache type of an entry whose scratch pad holds a soft link value offset.
pub const CACHE_SOFT_LINK: u32 = 2;

/// One entry of a symbol table node (and of the v0/v1 superblock).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolTableEntry {
    /// Offset of the link name in the group's local heap.
    pub link_name_offset: u64,
    pub object_header_address: u64,
    /// 0 = nothing cached, 1 = group, 2 = soft link.
    pub cache_type: u32,
    pub scratch_pad: [u8; 16],
}

impl SymbolTableEntry {
    /// Encoded size of an entry.
    pub fn size(offset_size: u8) -> usize {
        2 * offset_size as usize + 24
    }

    /// Parse an entry at slice position `pos`.
    pub fn parse(data: &[u8], pos: usize, offset_size: u8) -> Result<SymbolTableEntry, FormatError> {
        let rec = RecordReader::new("symbol table entry", data, pos)
            .sizes(offset_size, 8)
            .offset("name")?
            .offset("header")?
            .field("cache_type", 4)?
            .skip(4)?
            .field("scratch", 16)?
            .finish();
        let mut scratch_pad = [0u8; 16];
        scratch_pad.copy_from_slice(rec.bytes("scratch")?);
        Ok(SymbolTableEntry {
            link_name_offset: rec.uint("name")?,
            object_header_address: rec.uint("header")?,
            cache_type: rec.u32("cache_type")?,
            scratch_pad,
        })
    }

    /// Local-heap offset of the soft link value, for cache type 2.
    pub fn soft_link_offset(&self) -> Option<u64> {
        (self.cache_type == CACHE_SOFT_LINK)
            .then(|| u32::from_le_bytes([self.scratch_pad[0], self.scratch_pad[1], self.scratch_pad[2], self.scratch_pad[3]]) as u64)
    }
}

/// A parsed symbol table node (`SNOD`).
#[derive(Debug, Clone)]
pub struct SymbolTableNode {
    pub entries: Vec<SymbolTableEntry>,
}

impl SymbolTableNode {
    pub fn parse(ctx: &FileContext<'_>, address: u64) -> Result<SymbolTableNode, FormatError> {
        let head = ctx
            .reader("symbol table node", address)?
            .magic("SNOD")?
            .field("version", 1)?
            .skip(1)?
            .field("count", 2)?
            .finish();
        let version = head.u8("version")?;
        if version != 1 {
            return Err(FormatError::InvalidMessageVersion {
                message: "symbol table node",
                version,
            });
        }
        let count = head.uint("count")? as usize;
        let entry_size = SymbolTableEntry::size(ctx.offset_size);
        (0..count)
            .map(|i| SymbolTableEntry::parse(ctx.data, head.end() + i * entry_size, ctx.offset_size))
            .collect::<Result<Vec<_>, _>>()
            .map(|entries| SymbolTableNode { entries })
    }
}
