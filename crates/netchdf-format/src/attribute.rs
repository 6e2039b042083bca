//! Attribute message (0x000C).
//!
//! The datatype and dataspace may each be shared; a shared one is kept as a
//! pointer and resolved by the caller against the target header.

use crate::dataspace::Dataspace;
use crate::datatype::{CharacterSet, Datatype};
use crate::error::FormatError;
use crate::message::{Shareable, SharedPointer};
use crate::message_type::MessageType;
use crate::record::RecordReader;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeMessage {
    pub name: String,
    pub charset: CharacterSet,
    pub datatype: Shareable<Datatype>,
    pub dataspace: Shareable<Dataspace>,
    /// Raw value bytes; may carry trailing message padding.
    pub data: Vec<u8>,
}

fn padded(len: usize, pad: bool) -> usize {
    if pad {
        (len + 7) / 8 * 8
    } else {
        len
    }
}

impl AttributeMessage {
    pub fn parse(data: &[u8], offset_size: u8, length_size: u8) -> Result<AttributeMessage, FormatError> {
        let head = RecordReader::new("attribute", data, 0)
            .field("version", 1)?
            .field("flags", 1)?
            .field("name_len", 2)?
            .field("dt_size", 2)?
            .field("ds_size", 2)?;
        let version = head.uint("version")? as u8;
        if !(1..=3).contains(&version) {
            return Err(FormatError::InvalidMessageVersion {
                message: "attribute",
                version,
            });
        }
        // version 1 keeps this byte reserved
        let flags = if version == 1 { 0 } else { head.uint("flags")? };
        let pad = version == 1;
        let name_len = head.uint("name_len")? as usize;
        let dt_size = head.uint("dt_size")? as usize;
        let ds_size = head.uint("ds_size")? as usize;

        let head = head.field_if(version == 3, "charset", 1)?;
        let head = head.field("name", name_len)?.skip(padded(name_len, pad) - name_len)?;
        let head = head.field("datatype", dt_size)?.skip(padded(dt_size, pad) - dt_size)?;
        let rec = head.field("dataspace", ds_size)?.skip(padded(ds_size, pad) - ds_size)?;
        let value_start = rec.pos();
        let rec = rec.finish();

        let charset = match rec.uint_or("charset", 0) {
            1 => CharacterSet::Utf8,
            _ => CharacterSet::Ascii,
        };

        let dt_bytes = rec.bytes("datatype")?;
        let datatype = if flags & 0x01 != 0 {
            Shareable::Shared(SharedPointer::parse(dt_bytes, offset_size, MessageType::Datatype)?)
        } else {
            Shareable::Inline(Datatype::parse(dt_bytes)?.0)
        };
        let ds_bytes = rec.bytes("dataspace")?;
        let dataspace = if flags & 0x02 != 0 {
            Shareable::Shared(SharedPointer::parse(ds_bytes, offset_size, MessageType::Dataspace)?)
        } else {
            Shareable::Inline(Dataspace::parse(ds_bytes, length_size)?)
        };

        Ok(AttributeMessage {
            name: rec.string("name")?,
            charset,
            datatype,
            dataspace,
            data: data[value_start..].to_vec(),
        })
    }
}
