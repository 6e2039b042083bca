//! Dataspace message (0x0001).

use crate::error::FormatError;
use crate::record::RecordReader;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataspaceType {
    Scalar,
    Simple,
    Null,
}

/// Parsed dataspace message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataspace {
    pub space_type: DataspaceType,
    /// Current dimension sizes; empty for scalar and null spaces.
    pub dimensions: Vec<u64>,
    /// Maximum sizes when stored; `u64::MAX` marks an unlimited dimension.
    pub max_dimensions: Option<Vec<u64>>,
}

impl Dataspace {
    pub fn parse(data: &[u8], length_size: u8) -> Result<Dataspace, FormatError> {
        let head = RecordReader::new("dataspace", data, 0)
            .sizes(8, length_size)
            .field("version", 1)?
            .field("rank", 1)?
            .field("flags", 1)?;
        let version = head.uint("version")? as u8;
        let rank = head.uint("rank")? as usize;
        let flags = head.uint("flags")?;
        let ls = length_size as usize;

        let (head, space_type) = match version {
            1 => {
                let st = if rank == 0 { DataspaceType::Scalar } else { DataspaceType::Simple };
                (head.skip(5)?, st)
            }
            2 => {
                let head = head.field("type", 1)?;
                let st = match head.uint("type")? {
                    0 => DataspaceType::Scalar,
                    1 => DataspaceType::Simple,
                    2 => DataspaceType::Null,
                    t => {
                        return Err(FormatError::InvalidData(format!("dataspace type {t}")));
                    }
                };
                (head, st)
            }
            v => return Err(FormatError::InvalidDataspaceVersion(v)),
        };

        let rec = head
            .array("dims", ls, rank)?
            .field_if(flags & 0x01 != 0, "max", ls * rank)?
            .finish();
        let dimensions = rec.uints("dims")?;
        let max_dimensions = if rec.has("max") {
            let raw = rec.bytes("max")?;
            Some(
                raw.chunks(ls)
                    .map(|c| {
                        let v = crate::read_uint(c, 0, ls)?;
                        Ok(if crate::is_undefined(v, length_size) { u64::MAX } else { v })
                    })
                    .collect::<Result<Vec<_>, FormatError>>()?,
            )
        } else {
            None
        };

        Ok(Dataspace {
            space_type,
            dimensions,
            max_dimensions,
        })
    }

    pub fn rank(&self) -> usize {
        self.dimensions.len()
    }

    /// Number of elements: 1 for scalar, 0 for null.
    pub fn num_elements(&self) -> u64 {
        match self.space_type {
            DataspaceType::Scalar => 1,
            DataspaceType::Null => 0,
            DataspaceType::Simple => self.dimensions.iter().product(),
        }
    }

    /// True when dimension `i` has no maximum.
    pub fn is_unlimited(&self, i: usize) -> bool {
        self.max_dimensions
            .as_ref()
            .and_then(|m| m.get(i))
            .is_some_and(|&m| m == u64::MAX)
    }
}
