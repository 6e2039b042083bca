//! Scale-offset filter decoding.
//!
//! The encoder subtracts the chunk minimum from every element (after scaling
//! floats by `10^D`) and keeps `minbits` bits per element. The chunk starts
//! with a 21-byte header: `minbits` (u32 LE), the byte width of the stored
//! minimum, then the minimum itself (LE).

use byteorder::{ByteOrder, LittleEndian};

use crate::{BitReader, FilterError};

const HEADER_SIZE: usize = 21;

const SCALE_FLOAT_D: u32 = 0;
const SCALE_FLOAT_E: u32 = 1;
const SCALE_INT: u32 = 2;

const CLASS_INTEGER: u32 = 0;
const CLASS_FLOAT: u32 = 1;

/// Parameters carried in the filter's client data. Index 5 (signedness) is
/// not needed for decoding.
#[derive(Debug, Clone, PartialEq)]
struct Params {
    scale_type: u32,
    scale_factor: i32,
    count: usize,
    class: u32,
    size: usize,
    big_endian: bool,
    /// Fill value bytes in little-endian order.
    fill: Option<Vec<u8>>,
}

impl Params {
    fn parse(cd: &[u32]) -> Result<Params, FilterError> {
        if cd.len() < 8 {
            return Err(invalid(format!("{} client values, need 8", cd.len())));
        }
        let size = cd[4] as usize;
        if !matches!(size, 1 | 2 | 4 | 8) {
            return Err(invalid(format!("element size {size}")));
        }
        let fill = if cd[7] != 0 {
            let bytes: Vec<u8> = cd[8..].iter().flat_map(|v| v.to_le_bytes()).take(size).collect();
            if bytes.len() < size {
                return Err(invalid("fill value is truncated"));
            }
            Some(bytes)
        } else {
            None
        };
        Ok(Params {
            scale_type: cd[0],
            scale_factor: cd[1] as i32,
            count: cd[2] as usize,
            class: cd[3],
            size,
            big_endian: cd[6] != 0,
            fill,
        })
    }
}

fn invalid(reason: impl Into<String>) -> FilterError {
    FilterError::InvalidParameters {
        filter: "scale-offset",
        reason: reason.into(),
    }
}

/// Decode a scale-offset chunk into elements in the dataset's byte order.
pub fn decompress(data: &[u8], client_data: &[u32]) -> Result<Vec<u8>, FilterError> {
    let p = Params::parse(client_data)?;
    if p.class == CLASS_FLOAT && p.scale_type == SCALE_FLOAT_E {
        return Err(FilterError::Unsupported("scale-offset E-scaling".into()));
    }
    if p.class == CLASS_FLOAT && !matches!(p.size, 4 | 8) {
        return Err(invalid(format!("{}-byte float", p.size)));
    }
    if data.len() < HEADER_SIZE {
        return Err(FilterError::Truncated {
            filter: "scale-offset",
            needed: HEADER_SIZE,
            available: data.len(),
        });
    }
    let minbits = LittleEndian::read_u32(&data[..4]);
    let min_size = (data[4] as usize).min(8);
    let min = if min_size == 0 { 0 } else { LittleEndian::read_uint(&data[5..5 + min_size], min_size) };

    let total = p.count * p.size;
    let payload = &data[HEADER_SIZE..];

    if minbits as usize == p.size * 8 {
        if payload.len() < total {
            return Err(FilterError::Truncated {
                filter: "scale-offset",
                needed: HEADER_SIZE + total,
                available: data.len(),
            });
        }
        return Ok(payload[..total].to_vec());
    }
    if minbits as usize > p.size * 8 {
        return Err(invalid(format!("minbits {minbits} wider than {} bytes", p.size)));
    }

    let mask = if minbits == 0 { 0 } else { u64::MAX >> (64 - minbits) };
    let mut bits = BitReader::new(payload);
    let mut out = Vec::with_capacity(total);
    for _ in 0..p.count {
        let packed = if minbits == 0 { 0 } else { bits.read(minbits) };
        let le: Vec<u8> = match (&p.fill, p.class) {
            (Some(fill), _) if minbits > 0 && packed == mask => fill.clone(),
            (_, CLASS_INTEGER) => integer_value(packed, min, &p),
            (_, CLASS_FLOAT) if p.scale_type == SCALE_FLOAT_D => float_value(packed, min, &p),
            (_, class) => {
                return Err(invalid(format!(
                    "class {class} with scale type {}",
                    p.scale_type
                )))
            }
        };
        if p.big_endian {
            out.extend(le.iter().rev());
        } else {
            out.extend_from_slice(&le);
        }
    }
    Ok(out)
}

fn integer_value(packed: u64, min: u64, p: &Params) -> Vec<u8> {
    // signed minimums are stored sign-extended, so wrapping addition covers both
    packed.wrapping_add(min).to_le_bytes()[..p.size].to_vec()
}

fn float_value(packed: u64, min: u64, p: &Params) -> Vec<u8> {
    if p.size == 4 {
        let min = f32::from_bits(min as u32);
        let v = (packed as u32 as i32) as f32 / 10f32.powi(p.scale_factor) + min;
        v.to_le_bytes().to_vec()
    } else {
        let min = f64::from_bits(min);
        let v = (packed as i64) as f64 / 10f64.powi(p.scale_factor) + min;
        v.to_le_bytes().to_vec()
    }
}
