//! Datatype message (0x0003).
//!
//! Covers classes 0 through 10, with recursive parsing for compound,
//! enumeration, variable-length and array types. Values here describe the
//! bytes on disk; interpretation (typedef naming, array unwrapping) happens
//! in the type builder of the `netchdf` crate.

use netchdf_io::Endian;

use crate::error::FormatError;
use crate::record::RecordReader;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StringPadding {
    NullTerminate,
    NullPad,
    SpacePad,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CharacterSet {
    Ascii,
    Utf8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceType {
    Object,
    DatasetRegion,
}

/// A member of a compound datatype.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompoundMember {
    pub name: String,
    /// Byte offset within the compound element.
    pub byte_offset: u64,
    /// Member dimensions stored by version-1 compounds; empty otherwise.
    pub dimensions: Vec<u32>,
    pub datatype: Datatype,
}

/// A label and its numeric value, read in the base type's byte order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnumMember {
    pub name: String,
    pub value: u64,
}

/// Parsed datatype.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Datatype {
    /// Class 0.
    FixedPoint {
        size: u32,
        order: Endian,
        signed: bool,
        bit_offset: u16,
        bit_precision: u16,
    },
    /// Class 1.
    FloatingPoint {
        size: u32,
        order: Endian,
        bit_offset: u16,
        bit_precision: u16,
        exponent_location: u8,
        exponent_size: u8,
        mantissa_location: u8,
        mantissa_size: u8,
        exponent_bias: u32,
    },
    /// Class 2.
    Time {
        size: u32,
        order: Endian,
        bit_precision: u16,
    },
    /// Class 3: fixed-length string.
    String {
        size: u32,
        padding: StringPadding,
        charset: CharacterSet,
    },
    /// Class 4.
    BitField {
        size: u32,
        order: Endian,
        bit_offset: u16,
        bit_precision: u16,
    },
    /// Class 5.
    Opaque { size: u32, tag: String },
    /// Class 6.
    Compound { size: u32, members: Vec<CompoundMember> },
    /// Class 7.
    Reference { size: u32, ref_type: ReferenceType },
    /// Class 8.
    Enumeration {
        size: u32,
        base: Box<Datatype>,
        members: Vec<EnumMember>,
    },
    /// Class 9.
    VariableLength {
        size: u32,
        is_string: bool,
        padding: StringPadding,
        charset: CharacterSet,
        base: Box<Datatype>,
    },
    /// Class 10.
    Array {
        size: u32,
        base: Box<Datatype>,
        dimensions: Vec<u32>,
    },
}

fn padding(val: u8) -> Result<StringPadding, FormatError> {
    match val {
        0 => Ok(StringPadding::NullTerminate),
        1 => Ok(StringPadding::NullPad),
        2 => Ok(StringPadding::SpacePad),
        _ => Err(FormatError::InvalidData(format!("string padding {val}"))),
    }
}

fn charset(val: u8) -> Result<CharacterSet, FormatError> {
    match val {
        0 => Ok(CharacterSet::Ascii),
        1 => Ok(CharacterSet::Utf8),
        _ => Err(FormatError::InvalidData(format!("character set {val}"))),
    }
}

fn order(bits: u8) -> Endian {
    if bits & 0x01 == 0 {
        Endian::Little
    } else {
        Endian::Big
    }
}

/// Read a NUL-terminated name at `pos`; with `align`, the name plus its
/// terminator is padded to a multiple of `align` bytes.
fn name_at(data: &[u8], pos: usize, align: usize) -> Result<(String, usize), FormatError> {
    let rec = RecordReader::new("name", data, pos).zstring("name")?;
    let used = rec.pos() - pos;
    let padded = if align > 1 { (used + align - 1) / align * align } else { used };
    let rec = rec.skip(padded - used)?.finish();
    Ok((rec.string("name")?, padded))
}

impl Datatype {
    /// Parse a datatype message, returning the type and the bytes consumed.
    pub fn parse(data: &[u8]) -> Result<(Datatype, usize), FormatError> {
        let head = RecordReader::new("datatype", data, 0)
            .field("class_version", 1)?
            .field("bits0", 1)?
            .field("bits1", 1)?
            .field("bits2", 1)?
            .field("size", 4)?
            .finish();
        let cv = head.u8("class_version")?;
        let class = cv & 0x0F;
        let version = cv >> 4;
        let b0 = head.u8("bits0")?;
        let b1 = head.u8("bits1")?;
        let size = head.u32("size")?;
        let mut pos = head.end();

        let dt = match class {
            0 | 4 => {
                let rec = RecordReader::new("fixed point", data, pos)
                    .field("offset", 2)?
                    .field("precision", 2)?
                    .finish();
                pos = rec.end();
                if class == 0 {
                    Datatype::FixedPoint {
                        size,
                        order: order(b0),
                        signed: b0 & 0x08 != 0,
                        bit_offset: rec.u16("offset")?,
                        bit_precision: rec.u16("precision")?,
                    }
                } else {
                    Datatype::BitField {
                        size,
                        order: order(b0),
                        bit_offset: rec.u16("offset")?,
                        bit_precision: rec.u16("precision")?,
                    }
                }
            }
            1 => {
                if b0 & 0x40 != 0 {
                    return Err(FormatError::Unsupported("VAX floating point byte order".into()));
                }
                let rec = RecordReader::new("floating point", data, pos)
                    .field("offset", 2)?
                    .field("precision", 2)?
                    .field("exp_loc", 1)?
                    .field("exp_size", 1)?
                    .field("man_loc", 1)?
                    .field("man_size", 1)?
                    .field("bias", 4)?
                    .finish();
                pos = rec.end();
                Datatype::FloatingPoint {
                    size,
                    order: order(b0),
                    bit_offset: rec.u16("offset")?,
                    bit_precision: rec.u16("precision")?,
                    exponent_location: rec.u8("exp_loc")?,
                    exponent_size: rec.u8("exp_size")?,
                    mantissa_location: rec.u8("man_loc")?,
                    mantissa_size: rec.u8("man_size")?,
                    exponent_bias: rec.u32("bias")?,
                }
            }
            2 => {
                let rec = RecordReader::new("time", data, pos).field("precision", 2)?.finish();
                pos = rec.end();
                Datatype::Time {
                    size,
                    order: order(b0),
                    bit_precision: rec.u16("precision")?,
                }
            }
            3 => Datatype::String {
                size,
                padding: padding(b0 & 0x0F)?,
                charset: charset(b0 >> 4)?,
            },
            5 => {
                let len = b0 as usize;
                let rec = RecordReader::new("opaque", data, pos)
                    .field("tag", len)?
                    .pad_to(8)?
                    .finish();
                pos = rec.end();
                Datatype::Opaque {
                    size,
                    tag: rec.string("tag")?,
                }
            }
            6 => {
                let nmembers = u16::from_le_bytes([b0, b1]) as usize;
                let mut members = Vec::with_capacity(nmembers);
                for _ in 0..nmembers {
                    let (member, used) = Self::parse_member(data, pos, version, size)?;
                    members.push(member);
                    pos += used;
                }
                Datatype::Compound { size, members }
            }
            7 => {
                let ref_type = match b0 & 0x0F {
                    0 => ReferenceType::Object,
                    1 => ReferenceType::DatasetRegion,
                    t => return Err(FormatError::InvalidData(format!("reference type {t}"))),
                };
                Datatype::Reference { size, ref_type }
            }
            8 => {
                let nmembers = u16::from_le_bytes([b0, b1]) as usize;
                let (base, used) = Datatype::parse(&data[pos..])?;
                pos += used;
                let (base_order, base_size) = match &base {
                    Datatype::FixedPoint { order, size, .. } => (*order, *size as usize),
                    other => {
                        return Err(FormatError::InvalidData(format!(
                            "enumeration base must be an integer, found class {}",
                            other.class()
                        )))
                    }
                };
                let align = if version < 3 { 8 } else { 0 };
                let mut names = Vec::with_capacity(nmembers);
                for _ in 0..nmembers {
                    let (name, used) = name_at(data, pos, align)?;
                    names.push(name);
                    pos += used;
                }
                let values = RecordReader::new("enum values", data, pos)
                    .field("values", base_size * nmembers)?
                    .finish();
                pos = values.end();
                let raw = values.bytes("values")?;
                let members = names
                    .into_iter()
                    .enumerate()
                    .map(|(i, name)| EnumMember {
                        name,
                        value: if base_size == 0 {
                            0
                        } else {
                            base_order.read_uint(&raw[i * base_size..(i + 1) * base_size], base_size)
                        },
                    })
                    .collect();
                Datatype::Enumeration {
                    size,
                    base: Box::new(base),
                    members,
                }
            }
            9 => {
                let is_string = b0 & 0x0F == 1;
                let (base, used) = Datatype::parse(&data[pos..])?;
                pos += used;
                Datatype::VariableLength {
                    size,
                    is_string,
                    padding: padding((b0 >> 4) & 0x0F).unwrap_or(StringPadding::NullTerminate),
                    charset: charset(b1 & 0x0F).unwrap_or(CharacterSet::Ascii),
                    base: Box::new(base),
                }
            }
            10 => {
                let head = RecordReader::new("array", data, pos).field("ndims", 1)?;
                let ndims = head.uint("ndims")? as usize;
                let rec = head
                    .skip(if version < 3 { 3 } else { 0 })?
                    .array("dims", 4, ndims)?
                    .skip(if version < 3 { 4 * ndims } else { 0 })?
                    .finish();
                if !(2..=3).contains(&version) {
                    return Err(FormatError::InvalidDatatypeVersion { class, version });
                }
                pos = rec.end();
                let (base, used) = Datatype::parse(&data[pos..])?;
                pos += used;
                Datatype::Array {
                    size,
                    base: Box::new(base),
                    dimensions: rec.uints("dims")?.into_iter().map(|d| d as u32).collect(),
                }
            }
            c => return Err(FormatError::InvalidDatatypeClass(c)),
        };
        Ok((dt, pos))
    }

    fn parse_member(
        data: &[u8],
        pos: usize,
        version: u8,
        compound_size: u32,
    ) -> Result<(CompoundMember, usize), FormatError> {
        let align = if version < 3 { 8 } else { 0 };
        let (name, name_len) = name_at(data, pos, align)?;
        let mut at = pos + name_len;
        let offset_width = if version < 3 {
            4
        } else {
            crate::bytes_needed(compound_size as u64).max(1)
        };
        let byte_offset = crate::read_uint(data, at, offset_width)?;
        at += offset_width;

        let mut dimensions = Vec::new();
        if version == 1 {
            let rec = RecordReader::new("compound member", data, at)
                .field("rank", 1)?
                .skip(11)?
                .array("dims", 4, 4)?
                .finish();
            let rank = (rec.uint("rank")? as usize).min(4);
            dimensions = rec.uints("dims")?[..rank].iter().map(|&d| d as u32).collect();
            at = rec.end();
        }

        let (datatype, used) = Datatype::parse(&data[at..])?;
        at += used;
        Ok((
            CompoundMember {
                name,
                byte_offset,
                dimensions,
                datatype,
            },
            at - pos,
        ))
    }

    /// Class number as stored in the message.
    pub fn class(&self) -> u8 {
        match self {
            Datatype::FixedPoint { .. } => 0,
            Datatype::FloatingPoint { .. } => 1,
            Datatype::Time { .. } => 2,
            Datatype::String { .. } => 3,
            Datatype::BitField { .. } => 4,
            Datatype::Opaque { .. } => 5,
            Datatype::Compound { .. } => 6,
            Datatype::Reference { .. } => 7,
            Datatype::Enumeration { .. } => 8,
            Datatype::VariableLength { .. } => 9,
            Datatype::Array { .. } => 10,
        }
    }

    /// Size in bytes of one element as stored in the file.
    pub fn size(&self) -> u32 {
        match self {
            Datatype::FixedPoint { size, .. }
            | Datatype::FloatingPoint { size, .. }
            | Datatype::Time { size, .. }
            | Datatype::String { size, .. }
            | Datatype::BitField { size, .. }
            | Datatype::Opaque { size, .. }
            | Datatype::Compound { size, .. }
            | Datatype::Reference { size, .. }
            | Datatype::Enumeration { size, .. }
            | Datatype::VariableLength { size, .. }
            | Datatype::Array { size, .. } => *size,
        }
    }

    /// Byte order for classes that carry one.
    pub fn order(&self) -> Option<Endian> {
        match self {
            Datatype::FixedPoint { order, .. }
            | Datatype::FloatingPoint { order, .. }
            | Datatype::Time { order, .. }
            | Datatype::BitField { order, .. } => Some(*order),
            Datatype::Enumeration { base, .. } => base.order(),
            _ => None,
        }
    }
}
