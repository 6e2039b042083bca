//! Locating the chunks of chunked storage.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use netchdf_format::btree_v1::{BTreeV1Node, NODE_TYPE_CHUNK};
use netchdf_format::data_layout::ChunkIndex;
use netchdf_format::{FileContext, FormatError};

use crate::error::{Error, Result};
use crate::layout::{IndexND, IndexSpace, Tiling};

/// One chunk touched by a read, present or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DataChunk {
    /// First element of the chunk, one entry per variable dimension.
    pub offsets: Vec<u64>,
    /// `None` for a chunk that was never written.
    pub address: Option<u64>,
    /// Stored size in bytes.
    pub size: u64,
    pub filter_mask: u32,
}

impl DataChunk {
    pub fn missing(offsets: Vec<u64>) -> Self {
        Self {
            offsets,
            address: None,
            size: 0,
            filter_mask: 0,
        }
    }

    pub fn is_missing(&self) -> bool {
        self.address.is_none()
    }

    pub fn space(&self, chunk: &[u64]) -> IndexSpace {
        IndexSpace::new(self.offsets.clone(), chunk.to_vec())
    }
}

/// Chunk lookup for one read.
///
/// B-tree nodes are cached by address, so a node is parsed at most once
/// however many tiles the read covers.
pub(crate) struct TiledData<'a> {
    ctx: FileContext<'a>,
    tiling: Tiling,
    chunk: Vec<u64>,
    index: ChunkIndex,
    /// Unfiltered bytes of one chunk.
    chunk_bytes: u64,
    nodes: HashMap<u64, Arc<BTreeV1Node>>,
}

impl<'a> TiledData<'a> {
    pub fn new(ctx: FileContext<'a>, varshape: &[u64], chunk: &[u64], index: ChunkIndex, elem_size: usize) -> Self {
        let chunk: Vec<u64> = chunk[..varshape.len()].to_vec();
        let chunk_bytes = chunk.iter().product::<u64>() * elem_size as u64;
        Self {
            ctx,
            tiling: Tiling::new(varshape, &chunk),
            chunk,
            index,
            chunk_bytes,
            nodes: HashMap::new(),
        }
    }

    /// Every chunk whose tile intersects `want`, in tile order.
    pub fn find_data_chunks(&mut self, want: &IndexSpace) -> Result<Vec<DataChunk>> {
        if want.is_empty() && want.rank() > 0 {
            return Ok(Vec::new());
        }
        let tiles = self.tiling.section(want);
        let tile_shape = self.tiling.tile_shape().to_vec();
        let mut chunks = Vec::with_capacity(tiles.total_elements() as usize);
        for tile in IndexND::new(tiles, &tile_shape).iter() {
            let key = self.tiling.index(&tile);
            let chunk = self
                .find_entry_containing_key(&key)?
                .unwrap_or_else(|| DataChunk::missing(key));
            chunks.push(chunk);
        }
        tracing::debug!(
            index = self.index.name(),
            want = %want,
            chunks = chunks.len(),
            missing = chunks.iter().filter(|c| c.is_missing()).count(),
            "resolved chunks"
        );
        Ok(chunks)
    }

    /// The chunk whose first element is `key`, or `None` when that chunk
    /// was never written.
    pub fn find_entry_containing_key(&mut self, key: &[u64]) -> Result<Option<DataChunk>> {
        match self.index {
            ChunkIndex::BTreeV1 { address: None }
            | ChunkIndex::Single { address: None, .. }
            | ChunkIndex::Implicit { address: None } => Ok(None),
            ChunkIndex::BTreeV1 { address: Some(root) } => self.search_btree(root, key),
            ChunkIndex::Single {
                address: Some(address),
                filtered_size,
                filter_mask,
            } => Ok(key.iter().all(|&k| k == 0).then(|| DataChunk {
                offsets: key.to_vec(),
                address: Some(address),
                size: filtered_size.unwrap_or(self.chunk_bytes),
                filter_mask,
            })),
            ChunkIndex::Implicit { address: Some(base) } => Ok(Some(DataChunk {
                offsets: key.to_vec(),
                address: Some(base + self.tiling.order(key) * self.chunk_bytes),
                size: self.chunk_bytes,
                filter_mask: 0,
            })),
            other => Err(Error::Unsupported(format!("{} chunk index", other.name()))),
        }
    }

    fn node(&mut self, address: u64) -> Result<Arc<BTreeV1Node>> {
        if let Some(n) = self.nodes.get(&address) {
            return Ok(Arc::clone(n));
        }
        let node = Arc::new(BTreeV1Node::parse(&self.ctx, address, self.chunk.len() + 1)?);
        if node.node_type != NODE_TYPE_CHUNK {
            return Err(FormatError::InvalidData(format!(
                "expected chunk b-tree node at {address:#x}, found type {}",
                node.node_type
            ))
            .into());
        }
        self.nodes.insert(address, Arc::clone(&node));
        Ok(node)
    }

    /// Descend by taking, at each level, the last child whose key is not
    /// after `key` in tile order.
    fn search_btree(&mut self, root: u64, key: &[u64]) -> Result<Option<DataChunk>> {
        let mut address = root;
        let mut level: Option<u8> = None;
        loop {
            let node = self.node(address)?;
            if level.is_some_and(|parent| node.level >= parent) {
                return Err(FormatError::InvalidData(format!(
                    "b-tree node at {address:#x} does not descend (level {})",
                    node.level
                ))
                .into());
            }
            level = Some(node.level);

            let keys = node.chunk_keys();
            let mut pick = None;
            for (i, k) in keys.iter().take(node.children.len()).enumerate() {
                if self.tiling.compare(&k.offsets, key) == Ordering::Greater {
                    break;
                }
                pick = Some(i);
            }
            let Some(i) = pick else {
                return Ok(None);
            };
            if !node.is_leaf() {
                address = node.children[i];
                continue;
            }
            let k = &keys[i];
            if self.tiling.compare(&k.offsets, key) != Ordering::Equal {
                return Ok(None);
            }
            return Ok(Some(DataChunk {
                offsets: key.to_vec(),
                address: Some(node.children[i]),
                size: k.chunk_size as u64,
                filter_mask: k.filter_mask,
            }));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk_node(level: u8, keys: &[&[u64]], children: &[u64]) -> Vec<u8> {
        let mut buf = b"TREE".to_vec();
        buf.push(NODE_TYPE_CHUNK);
        buf.push(level);
        buf.extend_from_slice(&(children.len() as u16).to_le_bytes());
        buf.extend_from_slice(&u64::MAX.to_le_bytes());
        buf.extend_from_slice(&u64::MAX.to_le_bytes());
        for (i, offsets) in keys.iter().enumerate() {
            buf.extend_from_slice(&16u32.to_le_bytes());
            buf.extend_from_slice(&(i as u32 & 1).to_le_bytes());
            for o in offsets.iter() {
                buf.extend_from_slice(&o.to_le_bytes());
            }
            if let Some(c) = children.get(i) {
                buf.extend_from_slice(&c.to_le_bytes());
            }
        }
        buf
    }

    fn place(file: &mut Vec<u8>, at: usize, bytes: &[u8]) {
        if file.len() < at + bytes.len() {
            file.resize(at + bytes.len(), 0);
        }
        file[at..at + bytes.len()].copy_from_slice(bytes);
    }

    /// 4x4 variable in 2x2 chunks; tiles (0,0) and (1,1) are written.
    fn sparse_file() -> Vec<u8> {
        let mut file = vec![0u8; 64];
        let leaf = chunk_node(0, &[&[0, 0, 0], &[2, 2, 0], &[4, 4, 0]], &[0x1000, 0x2000]);
        place(&mut file, 0, &leaf);
        file.resize(0x2100, 0);
        file
    }

    #[test]
    fn finds_present_and_missing_tiles() {
        let file = sparse_file();
        let ctx = FileContext::new(&file, 0, 8, 8);
        let index = ChunkIndex::BTreeV1 { address: Some(0) };
        let mut tiled = TiledData::new(ctx, &[4, 4], &[2, 2, 4], index, 4);
        let chunks = tiled.find_data_chunks(&IndexSpace::from_shape(&[4, 4])).unwrap();
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0].address, Some(0x1000));
        assert_eq!(chunks[0].size, 16);
        assert!(chunks[1].is_missing());
        assert_eq!(chunks[1].offsets, vec![0, 2]);
        assert!(chunks[2].is_missing());
        assert_eq!(chunks[3].address, Some(0x2000));
        assert_eq!(chunks[3].filter_mask, 1);
        assert_eq!(tiled.nodes.len(), 1);
    }

    #[test]
    fn descends_internal_nodes() {
        // root over two leaves: [0..2) rows and [2..4) rows
        let mut file = vec![0u8; 0x400];
        let root = chunk_node(1, &[&[0, 0, 0], &[2, 0, 0], &[4, 4, 0]], &[0x100, 0x200]);
        let left = chunk_node(0, &[&[0, 0, 0], &[0, 2, 0], &[2, 0, 0]], &[0x1000, 0x1100]);
        let right = chunk_node(0, &[&[2, 2, 0], &[4, 4, 0]], &[0x1300]);
        place(&mut file, 0, &root);
        place(&mut file, 0x100, &left);
        place(&mut file, 0x200, &right);
        let ctx = FileContext::new(&file, 0, 8, 8);
        let index = ChunkIndex::BTreeV1 { address: Some(0) };
        let mut tiled = TiledData::new(ctx, &[4, 4], &[2, 2, 1], index, 1);

        let addrs: Vec<_> = tiled
            .find_data_chunks(&IndexSpace::from_shape(&[4, 4]))
            .unwrap()
            .iter()
            .map(|c| c.address)
            .collect();
        assert_eq!(addrs, vec![Some(0x1000), Some(0x1100), None, Some(0x1300)]);
        assert_eq!(tiled.nodes.len(), 3);
    }

    #[test]
    fn section_touches_only_needed_tiles() {
        let file = sparse_file();
        let ctx = FileContext::new(&file, 0, 8, 8);
        let index = ChunkIndex::BTreeV1 { address: Some(0) };
        let mut tiled = TiledData::new(ctx, &[4, 4], &[2, 2, 4], index, 4);
        let chunks = tiled
            .find_data_chunks(&IndexSpace::new(vec![3, 3], vec![1, 1]))
            .unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].offsets, vec![2, 2]);
    }

    #[test]
    fn bad_magic_is_a_format_error() {
        let mut file = sparse_file();
        file[0..4].copy_from_slice(b"XXXX");
        let ctx = FileContext::new(&file, 0, 8, 8);
        let index = ChunkIndex::BTreeV1 { address: Some(0) };
        let mut tiled = TiledData::new(ctx, &[4, 4], &[2, 2, 4], index, 4);
        let err = tiled.find_data_chunks(&IndexSpace::from_shape(&[4, 4])).unwrap_err();
        assert!(matches!(err, Error::Format(FormatError::InvalidSignature { .. })), "{err}");
    }

    #[test]
    fn implicit_index_is_tile_order() {
        let ctx = FileContext::new(&[], 0, 8, 8);
        let index = ChunkIndex::Implicit { address: Some(0x800) };
        let mut tiled = TiledData::new(ctx, &[5, 4], &[2, 4], index, 2);
        let chunks = tiled.find_data_chunks(&IndexSpace::from_shape(&[5, 4])).unwrap();
        let addrs: Vec<_> = chunks.iter().map(|c| c.address.unwrap()).collect();
        assert_eq!(addrs, vec![0x800, 0x810, 0x820]);
        assert_eq!(chunks[2].offsets, vec![4, 0]);
    }

    #[test]
    fn single_chunk_and_unallocated() {
        let ctx = FileContext::new(&[], 0, 8, 8);
        let index = ChunkIndex::Single {
            address: Some(0x40),
            filtered_size: Some(11),
            filter_mask: 0,
        };
        let mut tiled = TiledData::new(ctx, &[3, 3], &[3, 3], index, 8);
        let chunks = tiled.find_data_chunks(&IndexSpace::from_shape(&[3, 3])).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].size, 11);

        let mut empty = TiledData::new(ctx, &[3, 3], &[3, 3], ChunkIndex::BTreeV1 { address: None }, 8);
        let chunks = empty.find_data_chunks(&IndexSpace::from_shape(&[3, 3])).unwrap();
        assert!(chunks[0].is_missing());
    }

    #[test]
    fn newer_indexes_are_unsupported() {
        let ctx = FileContext::new(&[], 0, 8, 8);
        let index = ChunkIndex::FixedArray { address: Some(0) };
        let mut tiled = TiledData::new(ctx, &[4], &[2], index, 1);
        assert!(matches!(
            tiled.find_data_chunks(&IndexSpace::from_shape(&[4])),
            Err(Error::Unsupported(_))
        ));
    }
}
