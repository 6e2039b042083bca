//! HDF5 B-tree v2 parsing (BTHD header, BTIN internal and BTLF leaf nodes).
//!
//! Node capacities are derived from the node size the way the format
//! defines them; those capacities in turn fix the width of the record
//! count fields stored in internal nodes.

use crate::checksum;
use crate::error::FormatError;
use crate::record::RecordReader;
use crate::FileContext;

/// magic + version + type + checksum
const NODE_PREFIX: u64 = 10;

/// A decoded B-tree v2 record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BTreeV2Record {
    /// Type 1: huge object, indirectly accessed, not filtered.
    HugeIndirect { address: u64, length: u64, id: u64 },
    /// Type 2: huge object, indirectly accessed, filtered.
    HugeIndirectFiltered {
        address: u64,
        length: u64,
        filter_mask: u32,
        memory_size: u64,
        id: u64,
    },
    /// Type 3: huge object, directly accessed, not filtered.
    HugeDirect { address: u64, length: u64 },
    /// Type 4: huge object, directly accessed, filtered.
    HugeDirectFiltered {
        address: u64,
        length: u64,
        filter_mask: u32,
        memory_size: u64,
    },
    /// Type 5: link indexed by name hash.
    LinkName { hash: u32, heap_id: Vec<u8> },
    /// Type 6: link indexed by creation order.
    LinkCreationOrder { order: u64, heap_id: Vec<u8> },
    /// Type 8: attribute indexed by name hash.
    AttributeName {
        heap_id: Vec<u8>,
        flags: u8,
        creation_order: u32,
        hash: u32,
    },
    /// Type 9: attribute indexed by creation order.
    AttributeCreationOrder {
        heap_id: Vec<u8>,
        flags: u8,
        creation_order: u32,
    },
}

impl BTreeV2Record {
    fn parse(
        tree_type: u8,
        data: &[u8],
        pos: usize,
        record_size: usize,
        offset_size: u8,
        length_size: u8,
    ) -> Result<BTreeV2Record, FormatError> {
        let r = RecordReader::new("b-tree v2 record", data, pos).sizes(offset_size, length_size);
        let rec = match tree_type {
            1 => r.offset("address")?.length("length")?.length("id")?,
            2 => r
                .offset("address")?
                .length("length")?
                .field("mask", 4)?
                .length("memory_size")?
                .length("id")?,
            3 => r.offset("address")?.length("length")?,
            4 => r
                .offset("address")?
                .length("length")?
                .field("mask", 4)?
                .length("memory_size")?,
            5 => r.field("hash", 4)?.field("heap_id", record_size.saturating_sub(4))?,
            6 => r.field("order", 8)?.field("heap_id", record_size.saturating_sub(8))?,
            7 => {
                return Err(FormatError::Unsupported(
                    "shared object header message index".into(),
                ))
            }
            8 => r
                .field("heap_id", 8)?
                .field("flags", 1)?
                .field("order", 4)?
                .field("hash", 4)?,
            9 => r.field("heap_id", 8)?.field("flags", 1)?.field("order", 4)?,
            t => return Err(FormatError::Unsupported(format!("b-tree v2 record type {t}"))),
        }
        .finish();

        Ok(match tree_type {
            1 => BTreeV2Record::HugeIndirect {
                address: rec.uint("address")?,
                length: rec.uint("length")?,
                id: rec.uint("id")?,
            },
            2 => BTreeV2Record::HugeIndirectFiltered {
                address: rec.uint("address")?,
                length: rec.uint("length")?,
                filter_mask: rec.u32("mask")?,
                memory_size: rec.uint("memory_size")?,
                id: rec.uint("id")?,
            },
            3 => BTreeV2Record::HugeDirect {
                address: rec.uint("address")?,
                length: rec.uint("length")?,
            },
            4 => BTreeV2Record::HugeDirectFiltered {
                address: rec.uint("address")?,
                length: rec.uint("length")?,
                filter_mask: rec.u32("mask")?,
                memory_size: rec.uint("memory_size")?,
            },
            5 => BTreeV2Record::LinkName {
                hash: rec.u32("hash")?,
                heap_id: rec.bytes("heap_id")?.to_vec(),
            },
            6 => BTreeV2Record::LinkCreationOrder {
                order: rec.uint("order")?,
                heap_id: rec.bytes("heap_id")?.to_vec(),
            },
            8 => BTreeV2Record::AttributeName {
                heap_id: rec.bytes("heap_id")?.to_vec(),
                flags: rec.u8("flags")?,
                creation_order: rec.u32("order")?,
                hash: rec.u32("hash")?,
            },
            _ => BTreeV2Record::AttributeCreationOrder {
                heap_id: rec.bytes("heap_id")?.to_vec(),
                flags: rec.u8("flags")?,
                creation_order: rec.u32("order")?,
            },
        })
    }

    /// Fractal heap id of link and attribute records.
    pub fn heap_id(&self) -> Option<&[u8]> {
        match self {
            BTreeV2Record::LinkName { heap_id, .. }
            | BTreeV2Record::LinkCreationOrder { heap_id, .. }
            | BTreeV2Record::AttributeName { heap_id, .. }
            | BTreeV2Record::AttributeCreationOrder { heap_id, .. } => Some(heap_id),
            _ => None,
        }
    }
}

/// Parsed `BTHD` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BTreeV2Header {
    pub address: u64,
    pub tree_type: u8,
    pub node_size: u32,
    pub record_size: u16,
    pub depth: u16,
    pub split_percent: u8,
    pub merge_percent: u8,
    pub root_address: Option<u64>,
    pub root_records: u16,
    pub total_records: u64,
}

impl BTreeV2Header {
    pub fn parse(ctx: &FileContext<'_>, address: u64) -> Result<BTreeV2Header, FormatError> {
        let rec = ctx
            .reader("b-tree v2 header", address)?
            .magic("BTHD")?
            .field("version", 1)?
            .field("type", 1)?
            .field("node_size", 4)?
            .field("record_size", 2)?
            .field("depth", 2)?
            .field("split", 1)?
            .field("merge", 1)?
            .offset("root")?
            .field("root_nrec", 2)?
            .length("total")?
            .finish();
        let version = rec.u8("version")?;
        if version != 0 {
            return Err(FormatError::InvalidMessageVersion {
                message: "b-tree v2 header",
                version,
            });
        }
        if ctx.verify_checksums {
            checksum::verify(ctx.data, rec.start(), rec.end())?;
        }
        Ok(BTreeV2Header {
            address,
            tree_type: rec.u8("type")?,
            node_size: rec.u32("node_size")?,
            record_size: rec.u16("record_size")?,
            depth: rec.u16("depth")?,
            split_percent: rec.u8("split")?,
            merge_percent: rec.u8("merge")?,
            root_address: rec.address("root")?,
            root_records: rec.u16("root_nrec")?,
            total_records: rec.uint("total")?,
        })
    }
}

/// Width in bytes of a counter whose maximum is `max`.
fn limit_enc_size(max: u64) -> usize {
    let log2 = if max == 0 { 0 } else { 63 - max.leading_zeros() as usize };
    log2 / 8 + 1
}

/// Capacity of nodes at one depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct NodeInfo {
    max_nrec: u64,
    cum_max_nrec: u64,
    cum_max_nrec_size: usize,
}

enum Work {
    Node { address: u64, nrec: u64, depth: u16 },
    Record(BTreeV2Record),
}

/// An opened B-tree v2 with its per-depth node geometry.
#[derive(Debug, Clone)]
pub struct BTreeV2 {
    pub header: BTreeV2Header,
    node_info: Vec<NodeInfo>,
    /// Width of the record-count field in internal node pointers.
    max_nrec_size: usize,
}

impl BTreeV2 {
    pub fn open(ctx: &FileContext<'_>, address: u64) -> Result<BTreeV2, FormatError> {
        let header = BTreeV2Header::parse(ctx, address)?;
        let node_size = header.node_size as u64;
        let record_size = header.record_size as u64;
        if record_size == 0 || node_size <= NODE_PREFIX {
            return Err(FormatError::InvalidData(format!(
                "b-tree v2 at {address:#x}: node size {node_size}, record size {record_size}"
            )));
        }

        let leaf_max = (node_size - NODE_PREFIX) / record_size;
        let max_nrec_size = limit_enc_size(leaf_max);
        let mut node_info = vec![NodeInfo {
            max_nrec: leaf_max,
            cum_max_nrec: leaf_max,
            cum_max_nrec_size: 0,
        }];
        for d in 1..=header.depth as usize {
            let below = node_info[d - 1];
            let ptr_size = ctx.offset_size as u64
                + max_nrec_size as u64
                + if d > 1 { below.cum_max_nrec_size as u64 } else { 0 };
            let max_nrec = node_size.saturating_sub(NODE_PREFIX + ptr_size) / (record_size + ptr_size);
            let cum_max_nrec = (max_nrec + 1)
                .saturating_mul(below.cum_max_nrec)
                .saturating_add(max_nrec);
            node_info.push(NodeInfo {
                max_nrec,
                cum_max_nrec,
                cum_max_nrec_size: limit_enc_size(cum_max_nrec),
            });
        }

        Ok(BTreeV2 {
            header,
            node_info,
            max_nrec_size,
        })
    }

    /// All records in tree order.
    pub fn entries(&self, ctx: &FileContext<'_>) -> Result<Vec<BTreeV2Record>, FormatError> {
        let mut out = Vec::with_capacity(self.header.total_records as usize);
        let root = match self.header.root_address {
            Some(a) if self.header.total_records > 0 => a,
            _ => return Ok(out),
        };
        let mut stack = vec![Work::Node {
            address: root,
            nrec: self.header.root_records as u64,
            depth: self.header.depth,
        }];
        while let Some(work) = stack.pop() {
            match work {
                Work::Record(r) => out.push(r),
                Work::Node { address, nrec, depth } if depth == 0 => {
                    out.extend(self.read_leaf(ctx, address, nrec)?);
                }
                Work::Node { address, nrec, depth } => {
                    let (records, children) = self.read_internal(ctx, address, nrec, depth)?;
                    // child[0], record[0], child[1], ..., child[n]
                    let mut records = records.into_iter().rev();
                    for (i, &(child, child_nrec)) in children.iter().enumerate().rev() {
                        if i < children.len() - 1 {
                            if let Some(r) = records.next() {
                                stack.push(Work::Record(r));
                            }
                        }
                        stack.push(Work::Node {
                            address: child,
                            nrec: child_nrec,
                            depth: depth - 1,
                        });
                    }
                }
            }
        }
        Ok(out)
    }

    fn read_leaf(&self, ctx: &FileContext<'_>, address: u64, nrec: u64) -> Result<Vec<BTreeV2Record>, FormatError> {
        let head = ctx
            .reader("b-tree v2 leaf", address)?
            .magic("BTLF")?
            .field("version", 1)?
            .field("type", 1)?;
        let records = self.read_records(ctx, head.pos(), nrec)?;
        if ctx.verify_checksums {
            let end = head.pos() + nrec as usize * self.header.record_size as usize;
            checksum::verify(ctx.data, ctx.pos(address)?, end)?;
        }
        Ok(records)
    }

    fn read_internal(
        &self,
        ctx: &FileContext<'_>,
        address: u64,
        nrec: u64,
        depth: u16,
    ) -> Result<(Vec<BTreeV2Record>, Vec<(u64, u64)>), FormatError> {
        let head = ctx
            .reader("b-tree v2 internal", address)?
            .magic("BTIN")?
            .field("version", 1)?
            .field("type", 1)?;
        let records = self.read_records(ctx, head.pos(), nrec)?;
        let mut pos = head.pos() + nrec as usize * self.header.record_size as usize;

        let total_width = if depth > 1 {
            self.node_info[depth as usize - 1].cum_max_nrec_size
        } else {
            0
        };
        let mut children = Vec::with_capacity(nrec as usize + 1);
        for _ in 0..=nrec {
            let rec = RecordReader::new("b-tree v2 child pointer", ctx.data, pos)
                .sizes(ctx.offset_size, ctx.length_size)
                .offset("address")?
                .field("nrec", self.max_nrec_size)?
                .field_if(total_width > 0, "total", total_width)?
                .finish();
            children.push((rec.uint("address")?, rec.uint("nrec")?));
            pos = rec.end();
        }
        if ctx.verify_checksums {
            checksum::verify(ctx.data, ctx.pos(address)?, pos)?;
        }
        Ok((records, children))
    }

    fn read_records(&self, ctx: &FileContext<'_>, start: usize, nrec: u64) -> Result<Vec<BTreeV2Record>, FormatError> {
        let rs = self.header.record_size as usize;
        (0..nrec as usize)
            .map(|i| {
                BTreeV2Record::parse(
                    self.header.tree_type,
                    ctx.data,
                    start + i * rs,
                    rs,
                    ctx.offset_size,
                    ctx.length_size,
                )
            })
            .collect()
    }

    /// Maximum records a node at `depth` can hold.
    pub fn max_records(&self, depth: u16) -> Option<u64> {
        self.node_info.get(depth as usize).map(|n| n.max_nrec)
    }
}
