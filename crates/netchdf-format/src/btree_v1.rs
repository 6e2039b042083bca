//! HDF5 B-tree v1 parsing: type 0 (group symbol tables) and type 1 (raw
//! data chunks).
//!
//! Traversals use an explicit stack of node addresses, so tree depth never
//! turns into call depth.

use std::cmp::Ordering;

use crate::error::FormatError;
use crate::record::RecordReader;
use crate::symbol_table::{SymbolTableEntry, SymbolTableNode};
use crate::FileContext;

pub const NODE_TYPE_GROUP: u8 = 0;
pub const NODE_TYPE_CHUNK: u8 = 1;

/// Key of a raw data chunk node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChunkKey {
    /// Stored (possibly filtered) size of the chunk in bytes.
    pub chunk_size: u32,
    /// Bit `i` set means filter `i` was skipped for this chunk.
    pub filter_mask: u32,
    /// Element offset of the chunk in each dimension, plus a trailing 0 for
    /// the element-size dimension.
    pub offsets: Vec<u64>,
}

impl ChunkKey {
    /// Row-major order of the chunk offsets, ignoring the element-size slot.
    pub fn compare_offsets(&self, other: &ChunkKey) -> Ordering {
        let n = self.offsets.len().min(other.offsets.len()).saturating_sub(1);
        self.offsets[..n].cmp(&other.offsets[..n])
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKeys {
    /// Local heap offsets of the boundary names.
    Group(Vec<u64>),
    Chunk(Vec<ChunkKey>),
}

/// A parsed B-tree v1 node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BTreeV1Node {
    pub address: u64,
    pub node_type: u8,
    /// 0 for leaves.
    pub level: u8,
    pub entries_used: u16,
    pub left_sibling: Option<u64>,
    pub right_sibling: Option<u64>,
    /// `entries_used + 1` keys.
    pub keys: NodeKeys,
    pub children: Vec<u64>,
}

/// A leaf entry of a chunk tree: the key and the chunk's address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkEntry {
    pub key: ChunkKey,
    pub address: u64,
}

impl BTreeV1Node {
    /// Parse the node at `address`. `ndims` is the stored dimensionality of
    /// chunk keys (rank + 1) and is ignored for group nodes.
    pub fn parse(ctx: &FileContext<'_>, address: u64, ndims: usize) -> Result<BTreeV1Node, FormatError> {
        let head = ctx
            .reader("b-tree v1", address)?
            .magic("TREE")?
            .field("type", 1)?
            .field("level", 1)?
            .field("entries", 2)?
            .offset("left")?
            .offset("right")?
            .finish();
        let node_type = head.u8("type")?;
        let entries = head.uint("entries")? as usize;
        let mut pos = head.end();
        let os = ctx.offset_size as usize;

        let mut children = Vec::with_capacity(entries);
        let keys = match node_type {
            NODE_TYPE_GROUP => {
                let ls = ctx.length_size as usize;
                let mut keys = Vec::with_capacity(entries + 1);
                for i in 0..=entries {
                    keys.push(crate::read_uint(ctx.data, pos, ls)?);
                    pos += ls;
                    if i < entries {
                        children.push(crate::read_uint(ctx.data, pos, os)?);
                        pos += os;
                    }
                }
                NodeKeys::Group(keys)
            }
            NODE_TYPE_CHUNK => {
                let mut keys = Vec::with_capacity(entries + 1);
                for i in 0..=entries {
                    let rec = RecordReader::new("chunk key", ctx.data, pos)
                        .field("size", 4)?
                        .field("mask", 4)?
                        .array("offsets", 8, ndims)?
                        .finish();
                    keys.push(ChunkKey {
                        chunk_size: rec.u32("size")?,
                        filter_mask: rec.u32("mask")?,
                        offsets: rec.uints("offsets")?,
                    });
                    pos = rec.end();
                    if i < entries {
                        children.push(crate::read_uint(ctx.data, pos, os)?);
                        pos += os;
                    }
                }
                check_key_order(address, &keys[..entries])?;
                NodeKeys::Chunk(keys)
            }
            t => {
                return Err(FormatError::InvalidData(format!(
                    "b-tree v1 node type {t} at {address:#x}"
                )))
            }
        };

        Ok(BTreeV1Node {
            address,
            node_type,
            level: head.u8("level")?,
            entries_used: entries as u16,
            left_sibling: head.address("left")?,
            right_sibling: head.address("right")?,
            keys,
            children,
        })
    }

    pub fn is_leaf(&self) -> bool {
        self.level == 0
    }

    pub fn chunk_keys(&self) -> &[ChunkKey] {
        match &self.keys {
            NodeKeys::Chunk(keys) => keys,
            NodeKeys::Group(_) => &[],
        }
    }
}

/// Children of an internal node, paired with the level they must have.
fn descend(node: &BTreeV1Node) -> impl Iterator<Item = (u64, Option<u8>)> + '_ {
    let level = node.level.checked_sub(1);
    node.children.iter().rev().map(move |&child| (child, level))
}

fn check_level(address: u64, node: &BTreeV1Node, expected: Option<u8>) -> Result<(), FormatError> {
    match expected {
        Some(level) if node.level != level => Err(FormatError::InvalidData(format!(
            "b-tree node at {address:#x} has level {}, expected {level}",
            node.level
        ))),
        _ => Ok(()),
    }
}

fn check_key_order(node: u64, keys: &[ChunkKey]) -> Result<(), FormatError> {
    for (i, pair) in keys.windows(2).enumerate() {
        if pair[0].compare_offsets(&pair[1]) != Ordering::Less {
            tracing::debug!(node, index = i + 1, "chunk keys out of order");
            return Err(FormatError::KeyOrder { node, index: i + 1 });
        }
    }
    Ok(())
}

/// All symbol table entries of a group B-tree, in name order.
pub fn group_entries(ctx: &FileContext<'_>, btree_address: u64) -> Result<Vec<SymbolTableEntry>, FormatError> {
    let mut entries = Vec::new();
    let mut stack = vec![(btree_address, None)];
    while let Some((address, expected)) = stack.pop() {
        let node = BTreeV1Node::parse(ctx, address, 0)?;
        check_level(address, &node, expected)?;
        if node.node_type != NODE_TYPE_GROUP {
            return Err(FormatError::InvalidData(format!(
                "expected group b-tree node at {address:#x}, found type {}",
                node.node_type
            )));
        }
        if node.is_leaf() {
            for &snod in &node.children {
                entries.extend(SymbolTableNode::parse(ctx, snod)?.entries);
            }
        } else {
            stack.extend(descend(&node));
        }
    }
    Ok(entries)
}

/// All leaf entries of a chunk B-tree, in tile order.
pub fn chunk_entries(ctx: &FileContext<'_>, btree_address: u64, ndims: usize) -> Result<Vec<ChunkEntry>, FormatError> {
    let mut entries = Vec::new();
    let mut stack = vec![(btree_address, None)];
    while let Some((address, expected)) = stack.pop() {
        let node = BTreeV1Node::parse(ctx, address, ndims)?;
        check_level(address, &node, expected)?;
        if node.node_type != NODE_TYPE_CHUNK {
            return Err(FormatError::InvalidData(format!(
                "expected chunk b-tree node at {address:#x}, found type {}",
                node.node_type
            )));
        }
        if node.is_leaf() {
            entries.extend(
                node.chunk_keys()
                    .iter()
                    .zip(&node.children)
                    .map(|(key, &address)| ChunkEntry {
                        key: key.clone(),
                        address,
                    }),
            );
        } else {
            stack.extend(descend(&node));
        }
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group_node(level: u8, keys: &[u64], children: &[u64]) -> Vec<u8> {
        let mut buf = b"TREE".to_vec();
        buf.push(NODE_TYPE_GROUP);
        buf.push(level);
        buf.extend_from_slice(&(children.len() as u16).to_le_bytes());
        buf.extend_from_slice(&u64::MAX.to_le_bytes());
        buf.extend_from_slice(&u64::MAX.to_le_bytes());
        for (i, k) in keys.iter().enumerate() {
            buf.extend_from_slice(&k.to_le_bytes());
            if let Some(c) = children.get(i) {
                buf.extend_from_slice(&c.to_le_bytes());
            }
        }
        buf
    }

    fn chunk_node(level: u8, keys: &[(u32, &[u64])], children: &[u64]) -> Vec<u8> {
        let mut buf = b"TREE".to_vec();
        buf.push(NODE_TYPE_CHUNK);
        buf.push(level);
        buf.extend_from_slice(&(children.len() as u16).to_le_bytes());
        buf.extend_from_slice(&u64::MAX.to_le_bytes());
        buf.extend_from_slice(&u64::MAX.to_le_bytes());
        for (i, (size, offsets)) in keys.iter().enumerate() {
            buf.extend_from_slice(&size.to_le_bytes());
            buf.extend_from_slice(&0u32.to_le_bytes());
            for o in offsets.iter() {
                buf.extend_from_slice(&o.to_le_bytes());
            }
            if let Some(c) = children.get(i) {
                buf.extend_from_slice(&c.to_le_bytes());
            }
        }
        buf
    }

    fn place(file: &mut [u8], at: usize, bytes: &[u8]) {
        file[at..at + bytes.len()].copy_from_slice(bytes);
    }

    #[test]
    fn parse_group_leaf() {
        let data = group_node(0, &[0, 5, 10], &[0x100, 0x200]);
        let ctx = FileContext::new(&data, 0, 8, 8);
        let node = BTreeV1Node::parse(&ctx, 0, 0).unwrap();
        assert!(node.is_leaf());
        assert_eq!(node.entries_used, 2);
        assert_eq!(node.keys, NodeKeys::Group(vec![0, 5, 10]));
        assert_eq!(node.children, vec![0x100, 0x200]);
        assert_eq!(node.left_sibling, None);
    }

    #[test]
    fn chunk_tree_entries_in_order() {
        let mut file = vec![0u8; 1024];
        let leaf1 = chunk_node(0, &[(16, &[0, 0, 0]), (16, &[0, 2, 0]), (0, &[2, 0, 0])], &[0x300, 0x310]);
        let leaf2 = chunk_node(0, &[(16, &[2, 0, 0]), (16, &[2, 2, 0]), (0, &[4, 0, 0])], &[0x320, 0x330]);
        let root = chunk_node(1, &[(0, &[0, 0, 0]), (0, &[2, 0, 0]), (0, &[4, 0, 0])], &[0, 200]);
        place(&mut file, 0, &leaf1);
        place(&mut file, 200, &leaf2);
        place(&mut file, 400, &root);
        let ctx = FileContext::new(&file, 0, 8, 8);

        let entries = chunk_entries(&ctx, 400, 3).unwrap();
        let addrs: Vec<u64> = entries.iter().map(|e| e.address).collect();
        assert_eq!(addrs, vec![0x300, 0x310, 0x320, 0x330]);
        assert_eq!(entries[3].key.offsets, vec![2, 2, 0]);
        assert_eq!(entries[0].key.chunk_size, 16);
    }

    #[test]
    fn out_of_order_keys_are_rejected() {
        let data = chunk_node(0, &[(8, &[2, 0, 0]), (8, &[0, 0, 0]), (0, &[4, 0, 0])], &[0x10, 0x20]);
        let ctx = FileContext::new(&data, 0, 8, 8);
        assert_eq!(
            BTreeV1Node::parse(&ctx, 0, 3),
            Err(FormatError::KeyOrder { node: 0, index: 1 })
        );
    }

    #[test]
    fn self_referencing_node_is_rejected() {
        let data = group_node(1, &[0, 8], &[0]);
        let ctx = FileContext::new(&data, 0, 8, 8);
        assert!(matches!(group_entries(&ctx, 0), Err(FormatError::InvalidData(_))));

        let data = chunk_node(1, &[(0, &[0, 0]), (0, &[4, 0])], &[0]);
        let ctx = FileContext::new(&data, 0, 8, 8);
        assert!(matches!(chunk_entries(&ctx, 0, 2), Err(FormatError::InvalidData(_))));
    }

    #[test]
    fn bad_magic_is_format_error() {
        let mut data = group_node(0, &[0, 1], &[0x100]);
        data[0] = b'X';
        let ctx = FileContext::new(&data, 0, 8, 8);
        assert!(matches!(
            BTreeV1Node::parse(&ctx, 0, 0),
            Err(FormatError::InvalidSignature { expected: "TREE", .. })
        ));
    }

    #[test]
    fn group_entries_walk_snods() {
        let mut file = vec![0u8; 1024];
        let leaf = group_node(0, &[0, 8], &[300]);
        place(&mut file, 0, &leaf);
        // SNOD with two entries
        let mut snod = b"SNOD".to_vec();
        snod.extend_from_slice(&[1, 0]);
        snod.extend_from_slice(&2u16.to_le_bytes());
        for (name, hdr) in [(1u64, 600u64), (5, 700)] {
            snod.extend_from_slice(&name.to_le_bytes());
            snod.extend_from_slice(&hdr.to_le_bytes());
            snod.extend_from_slice(&[0; 24]);
        }
        place(&mut file, 300, &snod);
        let ctx = FileContext::new(&file, 0, 8, 8);

        let entries = group_entries(&ctx, 0).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].object_header_address, 700);
    }
}
