//! Declarative field-layout reader.
//!
//! HDF5 metadata structures are sequences of little-endian fields whose
//! widths depend on the superblock's offset/length sizes and on flag bits
//! read earlier in the same structure. [`RecordReader`] lets a decoder
//! declare those fields by name instead of tracking byte positions by hand:
//!
//! ```
//! use netchdf_format::record::RecordReader;
//!
//! let bytes = [b'H', b'E', b'A', b'P', 0, 0, 0, 0, 16, 0, 0, 0];
//! let rec = RecordReader::new("local heap", &bytes, 0)
//!     .sizes(4, 4)
//!     .magic("HEAP").unwrap()
//!     .field("version", 1).unwrap()
//!     .skip(3).unwrap()
//!     .length("data_size").unwrap()
//!     .finish();
//! assert_eq!(rec.uint("data_size").unwrap(), 16);
//! assert_eq!(rec.end(), 12);
//! ```

use byteorder::{ByteOrder, LittleEndian};

use crate::error::FormatError;

#[derive(Debug, Clone, Copy)]
struct Field {
    name: &'static str,
    pos: usize,
    width: usize,
    /// Element width for array fields; equal to `width` for scalars.
    elem: usize,
}

fn find<'f>(fields: &'f [Field], name: &'static str) -> Result<&'f Field, FormatError> {
    fields
        .iter()
        .rev()
        .find(|f| f.name == name)
        .ok_or(FormatError::MissingField(name))
}

fn uint_at(data: &[u8], field: &Field) -> Result<u64, FormatError> {
    match field.width {
        0 => Ok(0),
        1..=8 => Ok(LittleEndian::read_uint(
            &data[field.pos..field.pos + field.width],
            field.width,
        )),
        w => Err(FormatError::InvalidData(format!(
            "field {} is {w} bytes wide, not an integer",
            field.name
        ))),
    }
}

fn all_ones(value: u64, width: usize) -> bool {
    width > 0 && ((width >= 8 && value == u64::MAX) || (width < 8 && value == (1u64 << (width * 8)) - 1))
}

/// Builder that declares and bounds-checks fields in order.
#[derive(Debug, Clone)]
pub struct RecordReader<'a> {
    name: &'static str,
    data: &'a [u8],
    start: usize,
    pos: usize,
    offset_size: usize,
    length_size: usize,
    fields: Vec<Field>,
}

impl<'a> RecordReader<'a> {
    /// Start reading the structure `name` at byte `start` of `data`.
    pub fn new(name: &'static str, data: &'a [u8], start: usize) -> Self {
        Self {
            name,
            data,
            start,
            pos: start,
            offset_size: 8,
            length_size: 8,
            fields: Vec::new(),
        }
    }

    /// Set the widths used by [`offset`](Self::offset) and [`length`](Self::length).
    pub fn sizes(mut self, offset_size: u8, length_size: u8) -> Self {
        self.offset_size = offset_size as usize;
        self.length_size = length_size as usize;
        self
    }

    fn ensure(&self, width: usize) -> Result<(), FormatError> {
        match self.pos.checked_add(width) {
            Some(end) if end <= self.data.len() => Ok(()),
            _ => {
                tracing::trace!(record = self.name, pos = self.pos, width, "record overruns data");
                Err(FormatError::eof((self.pos + width) as u64, self.data.len()))
            }
        }
    }

    /// Declare a fixed-width field.
    pub fn field(mut self, name: &'static str, width: usize) -> Result<Self, FormatError> {
        self.ensure(width)?;
        self.fields.push(Field {
            name,
            pos: self.pos,
            width,
            elem: width,
        });
        self.pos += width;
        Ok(self)
    }

    /// Declare a field only when `cond` holds; absent fields read as missing.
    pub fn field_if(self, cond: bool, name: &'static str, width: usize) -> Result<Self, FormatError> {
        if cond {
            self.field(name, width)
        } else {
            Ok(self)
        }
    }

    /// A field with the superblock's offset width.
    pub fn offset(self, name: &'static str) -> Result<Self, FormatError> {
        let w = self.offset_size;
        self.field(name, w)
    }

    /// A field with the superblock's length width.
    pub fn length(self, name: &'static str) -> Result<Self, FormatError> {
        let w = self.length_size;
        self.field(name, w)
    }

    /// `count` consecutive elements of `elem` bytes each.
    pub fn array(mut self, name: &'static str, elem: usize, count: usize) -> Result<Self, FormatError> {
        let width = elem
            .checked_mul(count)
            .ok_or_else(|| FormatError::InvalidData(format!("array {name} too large")))?;
        self.ensure(width)?;
        self.fields.push(Field {
            name,
            pos: self.pos,
            width,
            elem,
        });
        self.pos += width;
        Ok(self)
    }

    /// A NUL-terminated string; the terminator is consumed but not part of the field.
    pub fn zstring(mut self, name: &'static str) -> Result<Self, FormatError> {
        let rest = self.data.get(self.pos..).unwrap_or(&[]);
        let len = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| FormatError::eof((self.data.len() + 1) as u64, self.data.len()))?;
        self.fields.push(Field {
            name,
            pos: self.pos,
            width: len,
            elem: 1,
        });
        self.pos += len + 1;
        Ok(self)
    }

    /// Check a 4-byte signature and record it as the field `"magic"`.
    pub fn magic(self, expected: &'static str) -> Result<Self, FormatError> {
        self.ensure(4)?;
        let found = &self.data[self.pos..self.pos + 4];
        if found != expected.as_bytes() {
            let mut sig = [0u8; 4];
            sig.copy_from_slice(found);
            return Err(FormatError::InvalidSignature {
                expected,
                found: sig,
                address: self.pos as u64,
            });
        }
        self.field("magic", 4)
    }

    pub fn skip(mut self, n: usize) -> Result<Self, FormatError> {
        self.ensure(n)?;
        self.pos += n;
        Ok(self)
    }

    /// Advance to the next multiple of `align` measured from the record start.
    pub fn pad_to(self, align: usize) -> Result<Self, FormatError> {
        let used = self.pos - self.start;
        let pad = (align - used % align) % align;
        self.skip(pad)
    }

    /// Value of a field declared earlier, for conditional layouts.
    pub fn uint(&self, name: &'static str) -> Result<u64, FormatError> {
        uint_at(self.data, find(&self.fields, name)?)
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn offset_size(&self) -> usize {
        self.offset_size
    }

    pub fn length_size(&self) -> usize {
        self.length_size
    }

    pub fn finish(self) -> Record<'a> {
        Record {
            name: self.name,
            data: self.data,
            start: self.start,
            end: self.pos,
            offset_size: self.offset_size,
            fields: self.fields,
        }
    }
}

/// A fully declared record with named field access.
#[derive(Debug, Clone)]
pub struct Record<'a> {
    name: &'static str,
    data: &'a [u8],
    start: usize,
    end: usize,
    offset_size: usize,
    fields: Vec<Field>,
}

impl<'a> Record<'a> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn has(&self, name: &'static str) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }

    pub fn uint(&self, name: &'static str) -> Result<u64, FormatError> {
        uint_at(self.data, find(&self.fields, name)?)
    }

    /// Like [`uint`](Self::uint) but a missing conditional field yields `default`.
    pub fn uint_or(&self, name: &'static str, default: u64) -> u64 {
        self.uint(name).unwrap_or(default)
    }

    pub fn u8(&self, name: &'static str) -> Result<u8, FormatError> {
        Ok(self.uint(name)? as u8)
    }

    pub fn u16(&self, name: &'static str) -> Result<u16, FormatError> {
        Ok(self.uint(name)? as u16)
    }

    pub fn u32(&self, name: &'static str) -> Result<u32, FormatError> {
        Ok(self.uint(name)? as u32)
    }

    /// An offset-sized field, `None` when it holds the undefined address.
    pub fn address(&self, name: &'static str) -> Result<Option<u64>, FormatError> {
        let field = find(&self.fields, name)?;
        let value = uint_at(self.data, field)?;
        if all_ones(value, field.width) {
            Ok(None)
        } else {
            Ok(Some(value))
        }
    }

    pub fn bytes(&self, name: &'static str) -> Result<&'a [u8], FormatError> {
        let f = find(&self.fields, name)?;
        Ok(&self.data[f.pos..f.pos + f.width])
    }

    pub fn string(&self, name: &'static str) -> Result<String, FormatError> {
        let raw = self.bytes(name)?;
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        Ok(String::from_utf8_lossy(&raw[..end]).into_owned())
    }

    /// Elements of an array field as unsigned integers.
    pub fn uints(&self, name: &'static str) -> Result<Vec<u64>, FormatError> {
        let f = find(&self.fields, name)?;
        if f.elem == 0 {
            return Ok(Vec::new());
        }
        (0..f.width / f.elem)
            .map(|i| {
                uint_at(
                    self.data,
                    &Field {
                        name: f.name,
                        pos: f.pos + i * f.elem,
                        width: f.elem,
                        elem: f.elem,
                    },
                )
            })
            .collect()
    }

    /// Absolute position of a field's first byte.
    pub fn position(&self, name: &'static str) -> Result<usize, FormatError> {
        Ok(find(&self.fields, name)?.pos)
    }

    pub fn start(&self) -> usize {
        self.start
    }

    /// Position one past the last declared byte.
    pub fn end(&self) -> usize {
        self.end
    }

    pub fn size(&self) -> usize {
        self.end - self.start
    }

    pub fn offset_size(&self) -> usize {
        self.offset_size
    }
}
