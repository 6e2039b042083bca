//! Fill value messages: old style (0x0004) and new style (0x0005).

use crate::error::FormatError;
use crate::record::RecordReader;

/// Old fill value message: a size and the raw value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FillValueOld {
    pub value: Vec<u8>,
}

impl FillValueOld {
    pub fn parse(data: &[u8]) -> Result<FillValueOld, FormatError> {
        let head = RecordReader::new("fill value (old)", data, 0).field("size", 4)?;
        let size = head.uint("size")? as usize;
        let rec = head.field("value", size)?.finish();
        Ok(FillValueOld {
            value: rec.bytes("value")?.to_vec(),
        })
    }
}

/// New fill value message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FillValue {
    pub version: u8,
    pub space_allocation_time: u8,
    pub fill_write_time: u8,
    /// The stored value, when one is defined and non-empty.
    pub value: Option<Vec<u8>>,
}

impl FillValue {
    pub fn parse(data: &[u8]) -> Result<FillValue, FormatError> {
        let head = RecordReader::new("fill value", data, 0).field("version", 1)?;
        let version = head.uint("version")? as u8;
        let (head, alloc, write, defined) = match version {
            1 | 2 => {
                let head = head
                    .field("alloc_time", 1)?
                    .field("write_time", 1)?
                    .field("defined", 1)?;
                let alloc = head.uint("alloc_time")? as u8;
                let write = head.uint("write_time")? as u8;
                // version 1 always stores the size and value
                let defined = version == 1 || head.uint("defined")? != 0;
                (head, alloc, write, defined)
            }
            3 => {
                let head = head.field("flags", 1)?;
                let flags = head.uint("flags")? as u8;
                (head, flags & 0x03, (flags >> 2) & 0x03, flags & 0x20 != 0)
            }
            v => {
                return Err(FormatError::InvalidMessageVersion {
                    message: "fill value",
                    version: v,
                })
            }
        };

        let mut value = None;
        if defined {
            let head = head.field("size", 4)?;
            let size = head.uint("size")? as usize;
            if size > 0 {
                let rec = head.field("value", size)?.finish();
                value = Some(rec.bytes("value")?.to_vec());
            }
        }
        Ok(FillValue {
            version,
            space_allocation_time: alloc,
            fill_write_time: write,
            value,
        })
    }
}
