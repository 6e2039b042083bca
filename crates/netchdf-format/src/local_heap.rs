//! HDF5 local heap parsing.

use crate::error::FormatError;
use crate::FileContext;

/// Parsed local heap header.
#[derive(Debug, Clone)]
pub struct LocalHeap {
    pub data_segment_size: u64,
    pub free_list_head_offset: u64,
    /// File address of the data segment.
    pub data_segment_address: u64,
}

impl LocalHeap {
    pub fn parse(ctx: &FileContext<'_>, address: u64) -> Result<LocalHeap, FormatError> {
        let rec = ctx
            .reader("local heap", address)?
            .magic("HEAP")?
            .field("version", 1)?
            .skip(3)?
            .length("size")?
            .length("free_list")?
            .offset("data")?
            .finish();
        let version = rec.u8("version")?;
        if version != 0 {
            return Err(FormatError::InvalidMessageVersion {
                message: "local heap",
                version,
            });
        }
        Ok(LocalHeap {
            data_segment_size: rec.uint("size")?,
            free_list_head_offset: rec.uint("free_list")?,
            data_segment_address: rec.uint("data")?,
        })
    }

    /// Read the NUL-terminated string at `offset` within the data segment.
    pub fn get_string(&self, ctx: &FileContext<'_>, offset: u64) -> Result<String, FormatError> {
        if offset >= self.data_segment_size {
            return Err(FormatError::HeapObjectNotFound {
                heap: self.data_segment_address,
                id: offset,
            });
        }
        let segment = ctx.bytes(self.data_segment_address, self.data_segment_size as usize)?;
        let tail = &segment[offset as usize..];
        let end = tail
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| FormatError::InvalidData(format!("unterminated heap string at {offset}")))?;
        Ok(String::from_utf8_lossy(&tail[..end]).into_owned())
    }
}
