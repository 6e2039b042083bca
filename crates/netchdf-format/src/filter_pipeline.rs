//! HDF5 Filter Pipeline message parsing (message type 0x000B).

use crate::error::FormatError;
use crate::record::RecordReader;

/// Well-known filter IDs.
pub const FILTER_DEFLATE: u16 = 1;
pub const FILTER_SHUFFLE: u16 = 2;
pub const FILTER_FLETCHER32: u16 = 3;
pub const FILTER_SZIP: u16 = 4;
pub const FILTER_NBIT: u16 = 5;
pub const FILTER_SCALEOFFSET: u16 = 6;

/// Flag bit 0: the filter may be skipped when it fails on write.
pub const FILTER_FLAG_OPTIONAL: u16 = 0x0001;

/// Description of a single filter in a pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterDescription {
    pub filter_id: u16,
    pub name: Option<String>,
    /// Filter flags (bit 0 = optional).
    pub flags: u16,
    /// Client data values passed to the filter.
    pub client_data: Vec<u32>,
}

impl FilterDescription {
    pub fn is_optional(&self) -> bool {
        self.flags & FILTER_FLAG_OPTIONAL != 0
    }
}

/// A filter pipeline in declared (write) order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterPipeline {
    pub version: u8,
    pub filters: Vec<FilterDescription>,
}

impl FilterPipeline {
    pub fn parse(data: &[u8]) -> Result<FilterPipeline, FormatError> {
        let head = RecordReader::new("filter pipeline", data, 0)
            .field("version", 1)?
            .field("nfilters", 1)?;
        let version = head.uint("version")? as u8;
        let count = head.uint("nfilters")? as usize;
        let mut pos = match version {
            1 => head.skip(6)?.pos(),
            2 => head.pos(),
            v => {
                return Err(FormatError::InvalidMessageVersion {
                    message: "filter pipeline",
                    version: v,
                })
            }
        };

        let mut filters = Vec::with_capacity(count);
        for _ in 0..count {
            let (filter, next) = Self::parse_filter(data, pos, version)?;
            filters.push(filter);
            pos = next;
        }
        Ok(FilterPipeline { version, filters })
    }

    fn parse_filter(data: &[u8], pos: usize, version: u8) -> Result<(FilterDescription, usize), FormatError> {
        let head = RecordReader::new("filter description", data, pos).field("id", 2)?;
        let filter_id = head.uint("id")? as u16;
        let has_name_len = version == 1 || filter_id >= 256;
        let head = head
            .field_if(has_name_len, "name_len", 2)?
            .field("flags", 2)?
            .field("nvalues", 2)?;
        let name_len = head.uint("name_len").unwrap_or(0) as usize;
        let nvalues = head.uint("nvalues")? as usize;

        let head = if name_len == 0 {
            head
        } else if version == 1 {
            // NUL-terminated, padded to eight bytes
            head.field("name", name_len)?.pad_to(8)?
        } else {
            head.field("name", name_len)?
        };
        let rec = head
            .array("values", 4, nvalues)?
            .field_if(version == 1 && nvalues % 2 == 1, "pad", 4)?
            .finish();

        let name = if rec.has("name") {
            Some(rec.string("name")?)
        } else {
            None
        };
        let client_data = rec.uints("values")?.into_iter().map(|v| v as u32).collect();
        Ok((
            FilterDescription {
                filter_id,
                name,
                flags: rec.u16("flags")?,
                client_data,
            },
            rec.end(),
        ))
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}
