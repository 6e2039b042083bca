//! HDF5 object header parsing (v1 and v2).
//!
//! The parser only splits a header into raw messages; decoding of the
//! payloads lives in [`crate::message`]. Continuation blocks are followed
//! through a work list so deep continuation chains never recurse.

use std::collections::{HashSet, VecDeque};

use crate::checksum;
use crate::error::FormatError;
use crate::message_type::MessageType;
use crate::record::RecordReader;
use crate::FileContext;

/// Header message flag: the payload is a shared-message pointer.
pub const MSG_FLAG_SHARED: u8 = 0x02;
/// Header message flag: a reader must understand this message.
pub const MSG_FLAG_MUST_UNDERSTAND: u8 = 0x08;

const OHDR: &[u8; 4] = b"OHDR";

/// A single header message with its payload copied out of the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub msg_type: MessageType,
    pub flags: u8,
    /// Creation order (v2, when the header tracks it).
    pub creation_order: Option<u16>,
    /// File address of the payload's first byte.
    pub address: u64,
    pub data: Vec<u8>,
}

impl RawMessage {
    pub fn is_shared(&self) -> bool {
        self.flags & MSG_FLAG_SHARED != 0
    }
}

/// Parsed object header.
#[derive(Debug, Clone)]
pub struct ObjectHeader {
    /// Address of the header itself.
    pub address: u64,
    /// Header version (1 or 2).
    pub version: u8,
    /// All non-nil, non-continuation messages from every chunk.
    pub messages: Vec<RawMessage>,
    /// Reference count (v1 only).
    pub reference_count: Option<u32>,
    /// Header flags (v2 only; 0 for v1).
    pub flags: u8,
    /// Modification time in seconds since the epoch (v2, when stored).
    pub modification_time: Option<u32>,
}

/// One block of header messages still to be read.
#[derive(Debug, Clone, Copy)]
struct Block {
    start: usize,
    end: usize,
}

fn continuation(ctx: &FileContext<'_>, payload: &[u8]) -> Result<(u64, u64), FormatError> {
    let rec = RecordReader::new("continuation", payload, 0)
        .sizes(ctx.offset_size, ctx.length_size)
        .offset("address")?
        .length("length")?
        .finish();
    Ok((rec.uint("address")?, rec.uint("length")?))
}

/// Record a continuation target, failing when the header already visited it.
fn first_visit(seen: &mut HashSet<u64>, address: u64) -> Result<(), FormatError> {
    if seen.insert(address) {
        Ok(())
    } else {
        Err(FormatError::InvalidData(format!(
            "object header continuation at {address:#x} visited twice"
        )))
    }
}

fn check_understood(msg_type: MessageType, flags: u8) -> Result<(), FormatError> {
    match msg_type {
        MessageType::Unknown(id) if flags & MSG_FLAG_MUST_UNDERSTAND != 0 => Err(
            FormatError::Unsupported(format!("message type {id:#x} marked must-understand")),
        ),
        _ => Ok(()),
    }
}

impl ObjectHeader {
    /// Parse the object header at `address`.
    pub fn parse(ctx: &FileContext<'_>, address: u64) -> Result<ObjectHeader, FormatError> {
        let head = ctx.bytes(address, 4)?;
        let header = if head == OHDR {
            Self::parse_v2(ctx, address)?
        } else {
            Self::parse_v1(ctx, address)?
        };
        tracing::debug!(
            address,
            version = header.version,
            messages = header.messages.len(),
            "decoded object header"
        );
        Ok(header)
    }

    fn parse_v1(ctx: &FileContext<'_>, address: u64) -> Result<ObjectHeader, FormatError> {
        let prefix = ctx
            .reader("object header", address)?
            .field("version", 1)?
            .skip(1)?
            .field("nmessages", 2)?
            .field("refcount", 4)?
            .field("size", 4)?
            .skip(4)?
            .finish();
        let version = prefix.u8("version")?;
        if version != 1 {
            return Err(FormatError::InvalidObjectHeaderVersion(version));
        }
        let nmess = prefix.uint("nmessages")? as usize;
        let size = prefix.uint("size")? as usize;

        let mut messages = Vec::new();
        let mut count = 0usize;
        let mut seen = HashSet::new();
        let mut blocks = VecDeque::from([Block {
            start: prefix.end(),
            end: prefix.end() + size,
        }]);

        while let Some(block) = blocks.pop_front() {
            let mut pos = block.start;
            while count < nmess && pos < block.end {
                let rec = RecordReader::new("message header", ctx.data, pos)
                    .field("type", 2)?
                    .field("size", 2)?
                    .field("flags", 1)?
                    .skip(3)?
                    .finish();
                let msg_size = rec.uint("size")? as usize;
                let payload = ctx.data.get(rec.end()..rec.end() + msg_size).ok_or_else(|| {
                    FormatError::eof((rec.end() + msg_size) as u64, ctx.data.len())
                })?;
                let msg_type = MessageType::from_u16(rec.u16("type")?);
                let flags = rec.u8("flags")?;
                check_understood(msg_type, flags)?;
                count += 1;

                match msg_type {
                    MessageType::Nil => {}
                    MessageType::ObjectHeaderContinuation => {
                        let (cont, len) = continuation(ctx, payload)?;
                        first_visit(&mut seen, cont)?;
                        let start = ctx.pos(cont)?;
                        blocks.push_back(Block {
                            start,
                            end: start + len as usize,
                        });
                    }
                    _ => messages.push(RawMessage {
                        msg_type,
                        flags,
                        creation_order: None,
                        address: ctx.address_of(rec.end()),
                        data: payload.to_vec(),
                    }),
                }
                pos = rec.end() + msg_size;
            }
        }

        Ok(ObjectHeader {
            address,
            version: 1,
            messages,
            reference_count: Some(prefix.u32("refcount")?),
            flags: 0,
            modification_time: None,
        })
    }

    fn parse_v2(ctx: &FileContext<'_>, address: u64) -> Result<ObjectHeader, FormatError> {
        let fixed = ctx
            .reader("object header", address)?
            .magic("OHDR")?
            .field("version", 1)?
            .field("flags", 1)?;
        let version = fixed.uint("version")? as u8;
        if version != 2 {
            return Err(FormatError::InvalidObjectHeaderVersion(version));
        }
        let flags = fixed.uint("flags")? as u8;
        let chunk_width = 1usize << (flags & 0x03);
        let prefix = fixed
            .field_if(flags & 0x20 != 0, "times", 16)?
            .field_if(flags & 0x10 != 0, "phase_change", 4)?
            .field("chunk0_size", chunk_width)?
            .finish();
        // access, modification, change, birth
        let modification_time = prefix
            .bytes("times")
            .ok()
            .map(|t| u32::from_le_bytes([t[4], t[5], t[6], t[7]]));

        let header_start = ctx.pos(address)?;
        let chunk0_start = prefix.end();
        let chunk0_end = chunk0_start + prefix.uint("chunk0_size")? as usize;
        if ctx.verify_checksums {
            checksum::verify(ctx.data, header_start, chunk0_end)?;
        }

        let track_order = flags & 0x04 != 0;
        let mut messages = Vec::new();
        let mut seen = HashSet::new();
        let mut blocks = VecDeque::from([Block {
            start: chunk0_start,
            end: chunk0_end,
        }]);

        while let Some(block) = blocks.pop_front() {
            let mut pos = block.start;
            // Trailing gaps shorter than a message header are padding.
            while pos + 3 < block.end {
                let rec = RecordReader::new("message header", ctx.data, pos)
                    .field("type", 1)?
                    .field("size", 2)?
                    .field("flags", 1)?
                    .field_if(track_order, "order", 2)?
                    .finish();
                let msg_size = rec.uint("size")? as usize;
                let payload = ctx.data.get(rec.end()..rec.end() + msg_size).ok_or_else(|| {
                    FormatError::eof((rec.end() + msg_size) as u64, ctx.data.len())
                })?;
                let msg_type = MessageType::from_u16(rec.u16("type")?);
                let msg_flags = rec.u8("flags")?;
                check_understood(msg_type, msg_flags)?;

                match msg_type {
                    MessageType::Nil => {}
                    MessageType::ObjectHeaderContinuation => {
                        let (cont, len) = continuation(ctx, payload)?;
                        first_visit(&mut seen, cont)?;
                        blocks.push_back(Self::ochk_block(ctx, cont, len as usize)?);
                    }
                    _ => messages.push(RawMessage {
                        msg_type,
                        flags: msg_flags,
                        creation_order: rec.uint("order").ok().map(|o| o as u16),
                        address: ctx.address_of(rec.end()),
                        data: payload.to_vec(),
                    }),
                }
                pos = rec.end() + msg_size;
            }
        }

        Ok(ObjectHeader {
            address,
            version: 2,
            messages,
            reference_count: None,
            flags,
            modification_time,
        })
    }

    /// Message area of a v2 continuation block: the bytes between the
    /// `OCHK` magic and the trailing checksum.
    fn ochk_block(ctx: &FileContext<'_>, address: u64, length: usize) -> Result<Block, FormatError> {
        let rec = ctx.reader("continuation block", address)?.magic("OCHK")?.finish();
        if length < 8 {
            return Err(FormatError::InvalidData(format!(
                "continuation block at {address:#x} is {length} bytes"
            )));
        }
        let start = rec.position("magic")?;
        let end = start + length - 4;
        if ctx.verify_checksums {
            checksum::verify(ctx.data, start, end)?;
        } else if end + 4 > ctx.data.len() {
            return Err(FormatError::eof((end + 4) as u64, ctx.data.len()));
        }
        Ok(Block { start: rec.end(), end })
    }

    /// First message of the given type.
    pub fn find(&self, msg_type: MessageType) -> Option<&RawMessage> {
        self.messages.iter().find(|m| m.msg_type == msg_type)
    }

    /// All messages of the given type, in header order.
    pub fn find_all(&self, msg_type: MessageType) -> impl Iterator<Item = &RawMessage> + '_ {
        self.messages.iter().filter(move |m| m.msg_type == msg_type)
    }
}
