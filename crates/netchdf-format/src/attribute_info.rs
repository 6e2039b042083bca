//! Attribute info message (0x0015).

use crate::error::FormatError;
use crate::record::RecordReader;

/// Where an object keeps attributes that did not fit in its header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeInfo {
    pub max_creation_index: Option<u16>,
    /// Fractal heap holding dense attributes.
    pub fractal_heap_address: Option<u64>,
    /// B-tree v2 (type 8) indexing attributes by name.
    pub name_index_address: Option<u64>,
    /// B-tree v2 (type 9) indexing attributes by creation order.
    pub creation_order_index_address: Option<u64>,
}

impl AttributeInfo {
    pub fn parse(data: &[u8], offset_size: u8) -> Result<AttributeInfo, FormatError> {
        let head = RecordReader::new("attribute info", data, 0)
            .sizes(offset_size, 8)
            .field("version", 1)?
            .field("flags", 1)?;
        let version = head.uint("version")? as u8;
        if version != 0 {
            return Err(FormatError::InvalidMessageVersion {
                message: "attribute info",
                version,
            });
        }
        let flags = head.uint("flags")?;
        let rec = head
            .field_if(flags & 0x01 != 0, "max_index", 2)?
            .offset("heap")?
            .offset("name_btree")?
            .field_if(flags & 0x02 != 0, "order_btree", offset_size as usize)?
            .finish();
        Ok(AttributeInfo {
            max_creation_index: rec.uint("max_index").ok().map(|v| v as u16),
            fractal_heap_address: rec.address("heap")?,
            name_index_address: rec.address("name_btree")?,
            creation_order_index_address: if rec.has("order_btree") {
                rec.address("order_btree")?
            } else {
                None
            },
        })
    }

    /// True when attributes are stored in a fractal heap.
    pub fn is_dense(&self) -> bool {
        self.fractal_heap_address.is_some() && self.name_index_address.is_some()
    }
}
