//! HDF5 Data Layout message parsing (message type 0x0008).

use crate::error::FormatError;
use crate::record::RecordReader;

/// How the chunks of a chunked dataset are located.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkIndex {
    /// Version 1 B-tree of chunk keys (layout v1-v3).
    BTreeV1 { address: Option<u64> },
    /// The dataset is one chunk.
    Single {
        address: Option<u64>,
        /// Stored size and filter mask, present when the chunk is filtered.
        filtered_size: Option<u64>,
        filter_mask: u32,
    },
    /// Chunks stored back to back in tile order, unfiltered.
    Implicit { address: Option<u64> },
    FixedArray { address: Option<u64> },
    ExtensibleArray { address: Option<u64> },
    BTreeV2 { address: Option<u64> },
}

impl ChunkIndex {
    pub fn address(&self) -> Option<u64> {
        match *self {
            ChunkIndex::BTreeV1 { address }
            | ChunkIndex::Single { address, .. }
            | ChunkIndex::Implicit { address }
            | ChunkIndex::FixedArray { address }
            | ChunkIndex::ExtensibleArray { address }
            | ChunkIndex::BTreeV2 { address } => address,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ChunkIndex::BTreeV1 { .. } => "b-tree v1",
            ChunkIndex::Single { .. } => "single chunk",
            ChunkIndex::Implicit { .. } => "implicit",
            ChunkIndex::FixedArray { .. } => "fixed array",
            ChunkIndex::ExtensibleArray { .. } => "extensible array",
            ChunkIndex::BTreeV2 { .. } => "b-tree v2",
        }
    }
}

/// Parsed data layout message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataLayout {
    /// Raw data stored inside the message.
    Compact { data: Vec<u8> },
    /// One contiguous block; versions 1 and 2 do not store the size.
    Contiguous { address: Option<u64>, size: Option<u64> },
    Chunked {
        version: u8,
        /// Chunk dimensions as stored. The entry after the dataspace rank is
        /// the element size.
        dimensions: Vec<u64>,
        /// Separate element size field of versions 1 and 2.
        element_size: Option<u32>,
        index: ChunkIndex,
    },
    /// Virtual dataset; mappings live in the global heap.
    Virtual { heap_address: Option<u64>, heap_index: u32 },
}

impl DataLayout {
    pub fn parse(data: &[u8], offset_size: u8, length_size: u8) -> Result<DataLayout, FormatError> {
        let head = RecordReader::new("data layout", data, 0)
            .sizes(offset_size, length_size)
            .field("version", 1)?;
        let version = head.uint("version")? as u8;
        match version {
            1 | 2 => Self::parse_v1v2(head, version),
            3 | 4 => Self::parse_v3v4(head, version),
            v => Err(FormatError::InvalidLayoutVersion(v)),
        }
    }

    fn parse_v1v2(head: RecordReader<'_>, version: u8) -> Result<DataLayout, FormatError> {
        let head = head.field("rank", 1)?.field("class", 1)?.skip(5)?;
        let rank = head.uint("rank")? as usize;
        let class = head.uint("class")? as u8;
        if class > 2 {
            return Err(FormatError::InvalidLayoutClass(class));
        }
        let os = head.offset_size();
        let head = head
            .field_if(class != 0, "address", os)?
            .array("dims", 4, rank)?;

        match class {
            0 => {
                let head = head.field("size", 4)?;
                let size = head.uint("size")? as usize;
                let rec = head.field("data", size)?.finish();
                Ok(DataLayout::Compact {
                    data: rec.bytes("data")?.to_vec(),
                })
            }
            1 => {
                let rec = head.finish();
                Ok(DataLayout::Contiguous {
                    address: rec.address("address")?,
                    size: None,
                })
            }
            _ => {
                let rec = head.field("element_size", 4)?.finish();
                Ok(DataLayout::Chunked {
                    version,
                    dimensions: rec.uints("dims")?,
                    element_size: Some(rec.u32("element_size")?),
                    index: ChunkIndex::BTreeV1 {
                        address: rec.address("address")?,
                    },
                })
            }
        }
    }

    fn parse_v3v4(head: RecordReader<'_>, version: u8) -> Result<DataLayout, FormatError> {
        let head = head.field("class", 1)?;
        let class = head.uint("class")? as u8;
        match class {
            0 => {
                let head = head.field("size", 2)?;
                let size = head.uint("size")? as usize;
                let rec = head.field("data", size)?.finish();
                Ok(DataLayout::Compact {
                    data: rec.bytes("data")?.to_vec(),
                })
            }
            1 => {
                let rec = head.offset("address")?.length("size")?.finish();
                Ok(DataLayout::Contiguous {
                    address: rec.address("address")?,
                    size: Some(rec.uint("size")?),
                })
            }
            2 if version == 3 => {
                let head = head.field("rank", 1)?;
                let rank = head.uint("rank")? as usize;
                let rec = head.offset("address")?.array("dims", 4, rank)?.finish();
                Ok(DataLayout::Chunked {
                    version,
                    dimensions: rec.uints("dims")?,
                    element_size: None,
                    index: ChunkIndex::BTreeV1 {
                        address: rec.address("address")?,
                    },
                })
            }
            2 => Self::parse_v4_chunked(head),
            3 if version == 4 => {
                let rec = head.offset("address")?.field("index", 4)?.finish();
                Ok(DataLayout::Virtual {
                    heap_address: rec.address("address")?,
                    heap_index: rec.u32("index")?,
                })
            }
            c => Err(FormatError::InvalidLayoutClass(c)),
        }
    }

    fn parse_v4_chunked(head: RecordReader<'_>) -> Result<DataLayout, FormatError> {
        let head = head
            .field("flags", 1)?
            .field("rank", 1)?
            .field("dim_width", 1)?;
        let flags = head.uint("flags")?;
        let rank = head.uint("rank")? as usize;
        let width = head.uint("dim_width")? as usize;
        if !(1..=8).contains(&width) {
            return Err(FormatError::InvalidData(format!("chunk dimension width {width}")));
        }
        let head = head.array("dims", width, rank)?.field("index_type", 1)?;
        let index_type = head.uint("index_type")? as u8;

        let filtered = flags & 0x02 != 0;
        let ls = head.length_size();
        let head = match index_type {
            1 => head
                .field_if(filtered, "filtered_size", ls)?
                .field_if(filtered, "filter_mask", 4)?,
            2 => head,
            3 => head.field("page_bits", 1)?,
            4 => head.skip(5)?,
            5 => head.field("node_size", 4)?.skip(2)?,
            t => {
                return Err(FormatError::InvalidData(format!("chunk index type {t}")));
            }
        };
        let rec = head.offset("address")?.finish();
        let address = rec.address("address")?;
        let index = match index_type {
            1 => ChunkIndex::Single {
                address,
                filtered_size: rec.uint("filtered_size").ok(),
                filter_mask: rec.uint_or("filter_mask", 0) as u32,
            },
            2 => ChunkIndex::Implicit { address },
            3 => ChunkIndex::FixedArray { address },
            4 => ChunkIndex::ExtensibleArray { address },
            _ => ChunkIndex::BTreeV2 { address },
        };
        Ok(DataLayout::Chunked {
            version: 4,
            dimensions: rec.uints("dims")?,
            element_size: None,
            index,
        })
    }

    /// Chunk shape for a dataspace of `rank` dimensions.
    pub fn chunk_shape(&self, rank: usize) -> Option<Vec<u64>> {
        match self {
            DataLayout::Chunked { dimensions, .. } if dimensions.len() >= rank => {
                Some(dimensions[..rank].to_vec())
            }
            _ => None,
        }
    }

    pub fn class_name(&self) -> &'static str {
        match self {
            DataLayout::Compact { .. } => "compact",
            DataLayout::Contiguous { .. } => "contiguous",
            DataLayout::Chunked { .. } => "chunked",
            DataLayout::Virtual { .. } => "virtual",
        }
    }
}
