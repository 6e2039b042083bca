//! Link (0x0006), link info (0x0002) and group info (0x000A) messages.

use crate::error::FormatError;
use crate::record::RecordReader;

/// Where a link points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkTarget {
    /// Object header address.
    Hard(u64),
    /// Path of the target, resolved against the file root.
    Soft(String),
    External { file: String, object: String },
    /// User-defined link type.
    Other(u8),
}

/// A decoded link message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub name: String,
    pub creation_order: Option<u64>,
    pub target: LinkTarget,
}

impl Link {
    pub fn parse(data: &[u8], offset_size: u8) -> Result<Link, FormatError> {
        let head = RecordReader::new("link", data, 0)
            .sizes(offset_size, 8)
            .field("version", 1)?
            .field("flags", 1)?;
        let version = head.uint("version")? as u8;
        if version != 1 {
            return Err(FormatError::InvalidMessageVersion { message: "link", version });
        }
        let flags = head.uint("flags")? as u8;
        let head = head
            .field_if(flags & 0x08 != 0, "type", 1)?
            .field_if(flags & 0x04 != 0, "order", 8)?
            .field_if(flags & 0x10 != 0, "charset", 1)?
            .field("name_len", 1 << (flags & 0x03))?;
        let name_len = head.uint("name_len")? as usize;
        let head = head.field("name", name_len)?;
        let link_type = head.uint("type").unwrap_or(0) as u8;

        let (target, rec) = match link_type {
            0 => {
                let rec = head.offset("address")?.finish();
                (LinkTarget::Hard(rec.uint("address")?), rec)
            }
            1 | 64 => {
                let h = head.field("info_len", 2)?;
                let len = h.uint("info_len")? as usize;
                let rec = h.field("info", len)?.finish();
                let target = if link_type == 1 {
                    LinkTarget::Soft(rec.string("info")?)
                } else {
                    // version/flags byte, then two NUL-terminated names
                    let info = rec.bytes("info")?;
                    let mut parts = info.get(1..).unwrap_or(&[]).split(|&b| b == 0);
                    let file = String::from_utf8_lossy(parts.next().unwrap_or(&[])).into_owned();
                    let object = String::from_utf8_lossy(parts.next().unwrap_or(&[])).into_owned();
                    LinkTarget::External { file, object }
                };
                (target, rec)
            }
            other => (LinkTarget::Other(other), head.finish()),
        };

        Ok(Link {
            name: rec.string("name")?,
            creation_order: rec.uint("order").ok(),
            target,
        })
    }
}

/// Link info message of a new-style group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkInfo {
    pub max_creation_index: Option<u64>,
    /// Fractal heap holding dense links; `None` when links are compact.
    pub fractal_heap_address: Option<u64>,
    pub name_index_address: Option<u64>,
    pub creation_order_index_address: Option<u64>,
}

impl LinkInfo {
    pub fn parse(data: &[u8], offset_size: u8) -> Result<LinkInfo, FormatError> {
        let head = RecordReader::new("link info", data, 0)
            .sizes(offset_size, 8)
            .field("version", 1)?
            .field("flags", 1)?;
        let flags = head.uint("flags")?;
        let rec = head
            .field_if(flags & 0x01 != 0, "max_index", 8)?
            .offset("heap")?
            .offset("name_btree")?
            .field_if(flags & 0x02 != 0, "order_btree", offset_size as usize)?
            .finish();
        Ok(LinkInfo {
            max_creation_index: rec.uint("max_index").ok(),
            fractal_heap_address: rec.address("heap")?,
            name_index_address: rec.address("name_btree")?,
            creation_order_index_address: if rec.has("order_btree") {
                rec.address("order_btree")?
            } else {
                None
            },
        })
    }
}

/// Group info message; kept for completeness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupInfo {
    pub max_compact: Option<u16>,
    pub min_dense: Option<u16>,
    pub est_num_entries: Option<u16>,
    pub est_name_length: Option<u16>,
}

impl GroupInfo {
    pub fn parse(data: &[u8]) -> Result<GroupInfo, FormatError> {
        let head = RecordReader::new("group info", data, 0)
            .field("version", 1)?
            .field("flags", 1)?;
        let flags = head.uint("flags")?;
        let rec = head
            .field_if(flags & 0x01 != 0, "max_compact", 2)?
            .field_if(flags & 0x01 != 0, "min_dense", 2)?
            .field_if(flags & 0x02 != 0, "est_entries", 2)?
            .field_if(flags & 0x02 != 0, "est_name_len", 2)?
            .finish();
        let opt = |name| rec.uint(name).ok().map(|v| v as u16);
        Ok(GroupInfo {
            max_compact: opt("max_compact"),
            min_dense: opt("min_dense"),
            est_num_entries: opt("est_entries"),
            est_name_length: opt("est_name_len"),
        })
    }
}
