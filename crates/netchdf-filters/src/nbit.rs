//! N-bit filter: each element keeps only its `precision` significant bits,
//! packed back to back most-significant bit first.
//!
//! Client data layout:
//!
//! | index | value |
//! |-------|-------|
//! | 0 | number of client values |
//! | 1 | 1 when the chunk was stored uncompressed |
//! | 2 | element count |
//! | 3.. | type description, recursively |
//!
//! A type description starts with its class: atomic `(1, size, order,
//! precision, offset)`, array `(2, size, base...)`, compound `(3, size,
//! nmembers, (member_offset, member...)*)` or no-op `(4, size)`.

use crate::{BitReader, FilterError};

const CLASS_ATOMIC: u32 = 1;
const CLASS_ARRAY: u32 = 2;
const CLASS_COMPOUND: u32 = 3;
const CLASS_NOOP: u32 = 4;

const ORDER_BE: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
enum NbitType {
    Atomic {
        size: usize,
        big_endian: bool,
        precision: usize,
        offset: usize,
    },
    Array {
        size: usize,
        base: Box<NbitType>,
    },
    Compound {
        size: usize,
        members: Vec<(usize, NbitType)>,
    },
    NoOp {
        size: usize,
    },
}

impl NbitType {
    fn size(&self) -> usize {
        match self {
            NbitType::Atomic { size, .. }
            | NbitType::Array { size, .. }
            | NbitType::Compound { size, .. }
            | NbitType::NoOp { size } => *size,
        }
    }
}

fn invalid(reason: impl Into<String>) -> FilterError {
    FilterError::InvalidParameters {
        filter: "nbit",
        reason: reason.into(),
    }
}

struct Params<'a> {
    values: &'a [u32],
    pos: usize,
}

impl Params<'_> {
    fn next(&mut self) -> Result<usize, FilterError> {
        let v = self
            .values
            .get(self.pos)
            .ok_or_else(|| invalid(format!("client data ends at index {}", self.pos)))?;
        self.pos += 1;
        Ok(*v as usize)
    }

    fn parse_type(&mut self) -> Result<NbitType, FilterError> {
        let class = self.next()? as u32;
        match class {
            CLASS_ATOMIC => {
                let size = self.next()?;
                let big_endian = self.next()? as u32 == ORDER_BE;
                let precision = self.next()?;
                let offset = self.next()?;
                if precision == 0 || precision + offset > size * 8 {
                    return Err(invalid(format!(
                        "precision {precision} at offset {offset} exceeds {size} bytes"
                    )));
                }
                Ok(NbitType::Atomic {
                    size,
                    big_endian,
                    precision,
                    offset,
                })
            }
            CLASS_ARRAY => {
                let size = self.next()?;
                let base = Box::new(self.parse_type()?);
                if base.size() == 0 {
                    return Err(invalid("array of zero-sized elements"));
                }
                Ok(NbitType::Array { size, base })
            }
            CLASS_COMPOUND => {
                let size = self.next()?;
                let count = self.next()?;
                let mut members = Vec::with_capacity(count.min(1024));
                for _ in 0..count {
                    let offset = self.next()?;
                    let member = self.parse_type()?;
                    if offset + member.size() > size {
                        return Err(invalid("compound member past the end of its record"));
                    }
                    members.push((offset, member));
                }
                Ok(NbitType::Compound { size, members })
            }
            CLASS_NOOP => Ok(NbitType::NoOp { size: self.next()? }),
            other => Err(invalid(format!("type class {other}"))),
        }
    }
}

/// Unpack an n-bit chunk.
pub fn decompress(data: &[u8], client_data: &[u32]) -> Result<Vec<u8>, FilterError> {
    let mut params = Params {
        values: client_data,
        pos: 1,
    };
    let stored_raw = params.next()? != 0;
    let count = params.next()?;
    if stored_raw {
        return Ok(data.to_vec());
    }
    let ty = params.parse_type()?;
    let size = ty.size();
    if size == 0 {
        return Err(invalid("zero-sized element"));
    }
    let total = count
        .checked_mul(size)
        .ok_or_else(|| invalid("element count overflows"))?;

    let mut out = vec![0u8; total];
    let mut bits = BitReader::new(data);
    for element in out.chunks_exact_mut(size) {
        unpack(&ty, element, &mut bits);
    }
    Ok(out)
}

fn unpack(ty: &NbitType, out: &mut [u8], bits: &mut BitReader<'_>) {
    match ty {
        NbitType::Atomic {
            size,
            big_endian,
            precision,
            offset,
        } => {
            let (lo_bit, hi_bit) = (*offset, offset + precision);
            // most significant byte first, matching the stream order
            for k in (lo_bit / 8..=(hi_bit - 1) / 8).rev() {
                let lo = lo_bit.max(k * 8);
                let hi = hi_bit.min(k * 8 + 8);
                let value = bits.read((hi - lo) as u32) as u8;
                let idx = if *big_endian { size - 1 - k } else { k };
                out[idx] |= value << (lo - k * 8);
            }
        }
        NbitType::Array { base, .. } => {
            for element in out.chunks_exact_mut(base.size()) {
                unpack(base, element, bits);
            }
        }
        NbitType::Compound { members, .. } => {
            for (offset, member) in members {
                unpack(member, &mut out[*offset..offset + member.size()], bits);
            }
        }
        NbitType::NoOp { .. } => {
            for byte in out.iter_mut() {
                *byte = bits.read(8) as u8;
            }
        }
    }
}
