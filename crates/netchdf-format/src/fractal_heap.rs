//! HDF5 Fractal Heap parsing (FRHP header, FHIB indirect and FHDB direct
//! blocks).
//!
//! Opening a heap walks the doubling table once and records where every
//! allocated direct block sits in the heap's linear address space; heap ids
//! are then resolved against that list.

use crate::btree_v2::{BTreeV2, BTreeV2Record};
use crate::checksum;
use crate::error::FormatError;
use crate::record::RecordReader;
use crate::FileContext;

const ID_TYPE_MANAGED: u8 = 0;
const ID_TYPE_HUGE: u8 = 1;
const ID_TYPE_TINY: u8 = 2;

/// Parsed fractal heap header (signature "FRHP").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FractalHeapHeader {
    pub address: u64,
    pub heap_id_length: u16,
    /// Encoded length of the I/O filter pipeline (0 = no filters).
    pub io_filter_length: u16,
    pub flags: u8,
    pub max_managed_object_size: u32,
    pub huge_btree_address: Option<u64>,
    pub managed_objects: u64,
    pub huge_objects: u64,
    pub tiny_objects: u64,
    pub table_width: u16,
    pub starting_block_size: u64,
    pub max_direct_block_size: u64,
    /// log2 of the heap's maximum linear address space.
    pub max_heap_bits: u16,
    pub starting_rows: u16,
    pub root_block_address: Option<u64>,
    /// Rows in the root indirect block; 0 means the root is a direct block.
    pub current_rows: u16,
}

impl FractalHeapHeader {
    pub fn parse(ctx: &FileContext<'_>, address: u64) -> Result<FractalHeapHeader, FormatError> {
        let head = ctx
            .reader("fractal heap", address)?
            .magic("FRHP")?
            .field("version", 1)?
            .field("id_len", 2)?
            .field("filter_len", 2)?
            .field("flags", 1)?
            .field("max_managed", 4)?
            .length("next_huge_id")?
            .offset("huge_btree")?
            .length("free_space")?
            .offset("free_space_manager")?
            .length("managed_space")?
            .length("allocated_space")?
            .length("iterator_offset")?
            .length("managed_count")?
            .length("huge_size")?
            .length("huge_count")?
            .length("tiny_size")?
            .length("tiny_count")?
            .field("table_width", 2)?
            .length("start_block")?
            .length("max_direct")?
            .field("max_heap_bits", 2)?
            .field("start_rows", 2)?
            .offset("root")?
            .field("current_rows", 2)?;
        let filter_len = head.uint("filter_len")? as usize;
        let ls = head.length_size();
        let rec = head
            .field_if(filter_len > 0, "filtered_root_size", ls)?
            .field_if(filter_len > 0, "root_filter_mask", 4)?
            .field_if(filter_len > 0, "filter_info", filter_len)?
            .finish();

        let version = rec.u8("version")?;
        if version != 0 {
            return Err(FormatError::InvalidMessageVersion {
                message: "fractal heap",
                version,
            });
        }
        if ctx.verify_checksums {
            checksum::verify(ctx.data, rec.start(), rec.end())?;
        }

        let header = FractalHeapHeader {
            address,
            heap_id_length: rec.u16("id_len")?,
            io_filter_length: filter_len as u16,
            flags: rec.u8("flags")?,
            max_managed_object_size: rec.u32("max_managed")?,
            huge_btree_address: rec.address("huge_btree")?,
            managed_objects: rec.uint("managed_count")?,
            huge_objects: rec.uint("huge_count")?,
            tiny_objects: rec.uint("tiny_count")?,
            table_width: rec.u16("table_width")?,
            starting_block_size: rec.uint("start_block")?,
            max_direct_block_size: rec.uint("max_direct")?,
            max_heap_bits: rec.u16("max_heap_bits")?,
            starting_rows: rec.u16("start_rows")?,
            root_block_address: rec.address("root")?,
            current_rows: rec.u16("current_rows")?,
        };
        header.validate()?;
        Ok(header)
    }

    fn validate(&self) -> Result<(), FormatError> {
        let pow2 = |v: u64| v != 0 && v.is_power_of_two();
        if self.table_width == 0
            || !(self.table_width as u64).is_power_of_two()
            || !pow2(self.starting_block_size)
            || !pow2(self.max_direct_block_size)
            || self.max_direct_block_size < self.starting_block_size
        {
            return Err(FormatError::InvalidData(format!(
                "fractal heap at {:#x}: doubling table width {}, start {}, max direct {}",
                self.address, self.table_width, self.starting_block_size, self.max_direct_block_size
            )));
        }
        Ok(())
    }

    /// Width of the block offset field in FHIB and FHDB headers.
    fn block_offset_size(&self) -> usize {
        (self.max_heap_bits as usize + 7) / 8
    }

    /// Width of the length field in managed heap ids.
    fn managed_length_size(&self) -> usize {
        let direct = (log2(self.max_direct_block_size) as usize + 7) / 8;
        let managed = log2(self.max_managed_object_size as u64) as usize / 8 + 1;
        direct.min(managed)
    }

    /// Size of blocks in doubling-table row `row`.
    pub fn row_block_size(&self, row: u32) -> u64 {
        if row < 2 {
            self.starting_block_size
        } else {
            self.starting_block_size << (row - 1)
        }
    }

    /// Number of leading rows holding direct blocks.
    pub fn max_direct_rows(&self) -> u32 {
        log2(self.max_direct_block_size) - log2(self.starting_block_size) + 2
    }

    /// Rows in a child indirect block spanning `block_size` bytes.
    pub fn indirect_rows(&self, block_size: u64) -> u32 {
        let first_row_span = self.starting_block_size * self.table_width as u64;
        (log2(block_size) + 1).saturating_sub(log2(first_row_span))
    }
}

fn log2(v: u64) -> u32 {
    if v == 0 {
        0
    } else {
        63 - v.leading_zeros()
    }
}

/// An allocated direct block located in the heap's linear space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DirectBlock {
    heap_offset: u64,
    size: u64,
    address: u64,
}

/// A fractal heap ready to resolve heap ids.
#[derive(Debug, Clone)]
pub struct FractalHeap {
    pub header: FractalHeapHeader,
    /// Sorted by heap offset.
    blocks: Vec<DirectBlock>,
}

impl FractalHeap {
    pub fn open(ctx: &FileContext<'_>, address: u64) -> Result<FractalHeap, FormatError> {
        let header = FractalHeapHeader::parse(ctx, address)?;
        let mut blocks = Vec::new();

        if let Some(root) = header.root_block_address {
            if header.current_rows == 0 {
                blocks.push(DirectBlock {
                    heap_offset: 0,
                    size: header.starting_block_size,
                    address: root,
                });
            } else {
                let mut work = vec![(root, 0u64, header.current_rows as u32)];
                while let Some((iblock, heap_offset, nrows)) = work.pop() {
                    Self::read_indirect(ctx, &header, iblock, heap_offset, nrows, &mut blocks, &mut work)?;
                }
            }
        }
        blocks.sort_by_key(|b| b.heap_offset);
        tracing::trace!(address, blocks = blocks.len(), "opened fractal heap");
        Ok(FractalHeap { header, blocks })
    }

    fn read_indirect(
        ctx: &FileContext<'_>,
        header: &FractalHeapHeader,
        address: u64,
        heap_offset: u64,
        nrows: u32,
        blocks: &mut Vec<DirectBlock>,
        work: &mut Vec<(u64, u64, u32)>,
    ) -> Result<(), FormatError> {
        let head = ctx
            .reader("fractal heap indirect block", address)?
            .magic("FHIB")?
            .field("version", 1)?
            .offset("heap")?
            .field("block_offset", header.block_offset_size())?
            .finish();
        if head.uint("heap")? != header.address {
            return Err(FormatError::InvalidData(format!(
                "indirect block at {address:#x} belongs to another heap"
            )));
        }
        let filtered = header.io_filter_length > 0;
        let width = header.table_width as u64;
        let max_direct_rows = header.max_direct_rows();
        let mut pos = head.end();
        let mut row_start = heap_offset;

        for row in 0..nrows {
            let size = header.row_block_size(row);
            for col in 0..width {
                let child_offset = row_start + col * size;
                let is_direct = row < max_direct_rows;
                let rec = RecordReader::new("fractal heap block entry", ctx.data, pos)
                    .sizes(ctx.offset_size, ctx.length_size)
                    .offset("address")?
                    .field_if(is_direct && filtered, "filtered_size", ctx.length_size as usize)?
                    .field_if(is_direct && filtered, "filter_mask", 4)?
                    .finish();
                pos = rec.end();
                let Some(child) = rec.address("address")? else {
                    continue;
                };
                if is_direct {
                    blocks.push(DirectBlock {
                        heap_offset: child_offset,
                        size,
                        address: child,
                    });
                } else {
                    work.push((child, child_offset, header.indirect_rows(size)));
                }
            }
            row_start += width * size;
        }
        if ctx.verify_checksums {
            checksum::verify(ctx.data, head.start(), pos)?;
        }
        Ok(())
    }

    /// Resolve a heap id to the object's bytes.
    pub fn get(&self, ctx: &FileContext<'_>, id: &[u8]) -> Result<Vec<u8>, FormatError> {
        let first = *id.first().ok_or_else(|| FormatError::InvalidData("empty heap id".into()))?;
        match (first >> 4) & 0x03 {
            ID_TYPE_MANAGED => self.get_managed(ctx, id),
            ID_TYPE_HUGE => self.get_huge(ctx, id),
            ID_TYPE_TINY => self.get_tiny(id),
            t => Err(FormatError::InvalidData(format!("heap id type {t}"))),
        }
    }

    fn get_managed(&self, ctx: &FileContext<'_>, id: &[u8]) -> Result<Vec<u8>, FormatError> {
        if self.header.io_filter_length > 0 {
            return Err(FormatError::Unsupported("filtered fractal heap direct blocks".into()));
        }
        let rec = RecordReader::new("managed heap id", id, 1)
            .field("offset", self.header.block_offset_size())?
            .field("length", self.header.managed_length_size())?
            .finish();
        let offset = rec.uint("offset")?;
        let length = rec.uint("length")? as usize;

        let not_found = || FormatError::HeapObjectNotFound {
            heap: self.header.address,
            id: offset,
        };
        let idx = self.blocks.partition_point(|b| b.heap_offset <= offset);
        let block = idx.checked_sub(1).map(|i| self.blocks[i]).ok_or_else(not_found)?;
        let within = offset - block.heap_offset;
        if within + length as u64 > block.size {
            return Err(not_found());
        }

        let magic = ctx.bytes(block.address, 4)?;
        if magic != b"FHDB" {
            let mut found = [0u8; 4];
            found.copy_from_slice(magic);
            return Err(FormatError::InvalidSignature {
                expected: "FHDB",
                found,
                address: block.address,
            });
        }
        // object offsets count from the start of the block, header included
        Ok(ctx.bytes(block.address + within, length)?.to_vec())
    }

    fn get_tiny(&self, id: &[u8]) -> Result<Vec<u8>, FormatError> {
        let (length, start) = if self.header.heap_id_length <= 18 {
            ((id[0] & 0x0F) as usize + 1, 1)
        } else {
            let b1 = *id.get(1).ok_or_else(|| FormatError::eof(2, id.len()))?;
            ((((id[0] & 0x0F) as usize) << 8 | b1 as usize) + 1, 2)
        };
        id.get(start..start + length)
            .map(<[u8]>::to_vec)
            .ok_or_else(|| FormatError::eof((start + length) as u64, id.len()))
    }

    fn get_huge(&self, ctx: &FileContext<'_>, id: &[u8]) -> Result<Vec<u8>, FormatError> {
        let os = ctx.offset_size as usize;
        let ls = ctx.length_size as usize;
        let filtered = self.header.io_filter_length > 0;
        if filtered {
            return Err(FormatError::Unsupported("filtered huge fractal heap objects".into()));
        }
        // ids long enough to hold the address and length are direct
        if id.len() > os + ls {
            let rec = RecordReader::new("huge heap id", id, 1)
                .sizes(ctx.offset_size, ctx.length_size)
                .offset("address")?
                .length("length")?
                .finish();
            return Ok(ctx.bytes(rec.uint("address")?, rec.uint("length")? as usize)?.to_vec());
        }

        let key_width = (id.len() - 1).min(ls);
        let key = crate::read_uint(id, 1, key_width)?;
        let btree_address = self.header.huge_btree_address.ok_or(FormatError::HeapObjectNotFound {
            heap: self.header.address,
            id: key,
        })?;
        let tree = BTreeV2::open(ctx, btree_address)?;
        for record in tree.entries(ctx)? {
            match record {
                BTreeV2Record::HugeIndirect { address, length, id: object } if object == key => {
                    return Ok(ctx.bytes(address, length as usize)?.to_vec());
                }
                BTreeV2Record::HugeIndirectFiltered { .. } | BTreeV2Record::HugeDirectFiltered { .. } => {
                    return Err(FormatError::Unsupported("filtered huge fractal heap objects".into()));
                }
                _ => {}
            }
        }
        Err(FormatError::HeapObjectNotFound {
            heap: self.header.address,
            id: key,
        })
    }
}
