//! Decoding of raw header messages into the closed [`Message`] enum.

use crate::attribute::AttributeMessage;
use crate::attribute_info::AttributeInfo;
use crate::data_layout::DataLayout;
use crate::dataspace::Dataspace;
use crate::datatype::Datatype;
use crate::error::FormatError;
use crate::fill_value::{FillValue, FillValueOld};
use crate::filter_pipeline::FilterPipeline;
use crate::link::{GroupInfo, Link, LinkInfo};
use crate::message_type::MessageType;
use crate::object_header::RawMessage;
use crate::record::RecordReader;
use crate::symbol_table::SymbolTableMessage;
use crate::FileContext;

/// Pointer stored in place of a shared message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SharedPointer {
    pub version: u8,
    /// Kind of message the pointer stands for.
    pub kind: MessageType,
    /// Object header holding the real message.
    pub address: u64,
}

impl SharedPointer {
    pub fn parse(data: &[u8], offset_size: u8, kind: MessageType) -> Result<SharedPointer, FormatError> {
        let head = RecordReader::new("shared message", data, 0)
            .sizes(offset_size, 8)
            .field("version", 1)?
            .field("type", 1)?;
        let version = head.uint("version")? as u8;
        let head = match version {
            1 => head.skip(6)?,
            2 => head,
            3 => match head.uint("type")? {
                1 => {
                    return Err(FormatError::Unsupported(
                        "message stored in the shared message heap".into(),
                    ))
                }
                _ => head,
            },
            v => {
                return Err(FormatError::InvalidMessageVersion {
                    message: "shared message",
                    version: v,
                })
            }
        };
        let rec = head.offset("address")?.finish();
        Ok(SharedPointer {
            version,
            kind,
            address: rec.uint("address")?,
        })
    }
}

/// A value that is either stored in place or shared through another header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shareable<T> {
    Inline(T),
    Shared(SharedPointer),
}

/// A decoded header message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Dataspace(Dataspace),
    LinkInfo(LinkInfo),
    Datatype(Datatype),
    FillValueOld(FillValueOld),
    FillValue(FillValue),
    Link(Link),
    Layout(DataLayout),
    GroupInfo(GroupInfo),
    FilterPipeline(FilterPipeline),
    Attribute(AttributeMessage),
    Comment(String),
    /// Seconds since the Unix epoch.
    ModificationTime(u64),
    SymbolTable(SymbolTableMessage),
    AttributeInfo(AttributeInfo),
    RefCount(u32),
    /// The payload lives in the header at `address`.
    Shared { kind: MessageType, address: u64 },
    Unknown { type_id: u16 },
}

impl Message {
    /// Decode one raw message with the file's offset and length sizes.
    pub fn decode(raw: &RawMessage, ctx: &FileContext<'_>) -> Result<Message, FormatError> {
        let (os, ls) = (ctx.offset_size, ctx.length_size);
        let data = raw.data.as_slice();
        if raw.is_shared() {
            let ptr = SharedPointer::parse(data, os, raw.msg_type)?;
            return Ok(Message::Shared {
                kind: ptr.kind,
                address: ptr.address,
            });
        }
        let msg = match raw.msg_type {
            MessageType::Dataspace => Message::Dataspace(Dataspace::parse(data, ls)?),
            MessageType::LinkInfo => Message::LinkInfo(LinkInfo::parse(data, os)?),
            MessageType::Datatype => Message::Datatype(Datatype::parse(data)?.0),
            MessageType::FillValueOld => Message::FillValueOld(FillValueOld::parse(data)?),
            MessageType::FillValue => Message::FillValue(FillValue::parse(data)?),
            MessageType::Link => Message::Link(Link::parse(data, os)?),
            MessageType::DataLayout => Message::Layout(DataLayout::parse(data, os, ls)?),
            MessageType::GroupInfo => Message::GroupInfo(GroupInfo::parse(data)?),
            MessageType::FilterPipeline => Message::FilterPipeline(FilterPipeline::parse(data)?),
            MessageType::Attribute => Message::Attribute(AttributeMessage::parse(data, os, ls)?),
            MessageType::Comment => {
                let rec = RecordReader::new("comment", data, 0).zstring("text")?.finish();
                Message::Comment(rec.string("text")?)
            }
            MessageType::ModificationTimeOld => Message::ModificationTime(old_time(data)?),
            MessageType::ModificationTime => {
                let rec = RecordReader::new("modification time", data, 0)
                    .field("version", 1)?
                    .skip(3)?
                    .field("seconds", 4)?
                    .finish();
                Message::ModificationTime(rec.uint("seconds")?)
            }
            MessageType::SymbolTable => Message::SymbolTable(SymbolTableMessage::parse(data, os)?),
            MessageType::AttributeInfo => Message::AttributeInfo(AttributeInfo::parse(data, os)?),
            MessageType::ReferenceCount => {
                let rec = RecordReader::new("reference count", data, 0)
                    .field("version", 1)?
                    .field("count", 4)?
                    .finish();
                Message::RefCount(rec.u32("count")?)
            }
            other => {
                tracing::debug!(msg_type = ?other, address = raw.address, "skipping message");
                Message::Unknown {
                    type_id: other.to_u16(),
                }
            }
        };
        Ok(msg)
    }
}

/// Old-style modification time: "YYYYMMDDhhmmss" in UTC.
fn old_time(data: &[u8]) -> Result<u64, FormatError> {
    let rec = RecordReader::new("modification time (old)", data, 0)
        .field("stamp", 14)?
        .finish();
    let stamp = rec.bytes("stamp")?;
    let num = |range: std::ops::Range<usize>| -> Result<i64, FormatError> {
        std::str::from_utf8(&stamp[range])
            .ok()
            .and_then(|s| s.trim().parse::<i64>().ok())
            .ok_or_else(|| FormatError::InvalidData("modification time digits".into()))
    };
    let (y, m, d) = (num(0..4)?, num(4..6)?, num(6..8)?);
    let secs = num(8..10)? * 3600 + num(10..12)? * 60 + num(12..14)?;
    let days = days_from_civil(y, m, d);
    Ok((days * 86_400 + secs).max(0) as u64)
}

/// Days since 1970-01-01 in the proleptic Gregorian calendar.
fn days_from_civil(y: i64, m: i64, d: i64) -> i64 {
    let y = if m <= 2 { y - 1 } else { y };
    let era = y.div_euclid(400);
    let yoe = y - era * 400;
    let mp = (m + 9) % 12;
    let doy = (153 * mp + 2) / 5 + d - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}
