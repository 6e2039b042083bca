//! Decoders for the HDF5 chunk filters.
//!
//! Each function undoes one filter on a chunk's bytes. The pipeline that
//! chains them, in reverse declaration order and under the chunk's filter
//! mask, lives with the format parsers.
//!
//! Deflate uses `flate2` by default; the `fast-deflate` feature switches to
//! `libdeflater`, which needs a size hint for its output buffer.

use std::fmt;

use byteorder::{ByteOrder, LittleEndian};

mod deflate;
pub mod nbit;
pub mod scale_offset;

pub use deflate::deflate_decompress;

/// Errors raised while decoding a filtered chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    /// The filter is recognized but this build cannot decode it.
    Unsupported(String),
    /// The compressed stream is corrupt.
    Decompress(String),
    /// The stored Fletcher32 checksum does not match the payload.
    Fletcher32Mismatch { expected: u32, computed: u32 },
    /// Client data values are missing or out of range.
    InvalidParameters {
        filter: &'static str,
        reason: String,
    },
    /// The input is shorter than the filter's framing requires.
    Truncated {
        filter: &'static str,
        needed: usize,
        available: usize,
    },
}

impl fmt::Display for FilterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterError::Unsupported(what) => write!(f, "unsupported filter: {what}"),
            FilterError::Decompress(msg) => write!(f, "decompression failed: {msg}"),
            FilterError::Fletcher32Mismatch { expected, computed } => write!(
                f,
                "fletcher32 mismatch: stored {expected:#010x}, computed {computed:#010x}"
            ),
            FilterError::InvalidParameters { filter, reason } => {
                write!(f, "{filter}: invalid parameters: {reason}")
            }
            FilterError::Truncated {
                filter,
                needed,
                available,
            } => write!(f, "{filter}: need {needed} bytes, have {available}"),
        }
    }
}

impl std::error::Error for FilterError {}

/// Undo the byte shuffle: the input holds all first bytes of each element,
/// then all second bytes, and so on. Bytes past the last whole element are
/// copied unchanged.
pub fn unshuffle(data: &[u8], element_size: usize) -> Vec<u8> {
    if element_size <= 1 || data.len() < element_size {
        return data.to_vec();
    }
    let count = data.len() / element_size;
    let mut out = vec![0u8; data.len()];
    for j in 0..element_size {
        let plane = &data[j * count..(j + 1) * count];
        for (i, &b) in plane.iter().enumerate() {
            out[i * element_size + j] = b;
        }
    }
    let whole = count * element_size;
    out[whole..].copy_from_slice(&data[whole..]);
    out
}

/// HDF5's Fletcher32 over big-endian 16-bit words, with ones'-complement
/// folding after every 360 words.
pub fn fletcher32(data: &[u8]) -> u32 {
    let mut sum1: u32 = 0;
    let mut sum2: u32 = 0;
    for block in data.chunks(720) {
        let mut words = block.chunks_exact(2);
        for w in &mut words {
            sum1 += (w[0] as u32) << 8 | w[1] as u32;
            sum2 += sum1;
        }
        if let [last] = words.remainder() {
            sum1 += (*last as u32) << 8;
            sum2 += sum1;
        }
        sum1 = (sum1 & 0xffff) + (sum1 >> 16);
        sum2 = (sum2 & 0xffff) + (sum2 >> 16);
    }
    sum1 = (sum1 & 0xffff) + (sum1 >> 16);
    sum2 = (sum2 & 0xffff) + (sum2 >> 16);
    (sum2 << 16) | sum1
}

/// Check the trailing Fletcher32 checksum and strip it.
///
/// Old library versions wrote the checksum with each 16-bit half byte
/// swapped; that form is accepted too.
pub fn fletcher32_verify(data: &[u8]) -> Result<Vec<u8>, FilterError> {
    if data.len() < 4 {
        return Err(FilterError::Truncated {
            filter: "fletcher32",
            needed: 4,
            available: data.len(),
        });
    }
    let (payload, tail) = data.split_at(data.len() - 4);
    let stored = LittleEndian::read_u32(tail);
    let computed = fletcher32(payload);
    let c = computed.to_le_bytes();
    let swapped = u32::from_le_bytes([c[1], c[0], c[3], c[2]]);
    if stored != computed && stored != swapped {
        return Err(FilterError::Fletcher32Mismatch {
            expected: stored,
            computed,
        });
    }
    Ok(payload.to_vec())
}

/// Reads a packed stream most-significant bit first, as n-bit and
/// scale-offset store it.
pub(crate) struct BitReader<'a> {
    data: &'a [u8],
    byte: usize,
    /// Bits not yet consumed in `data[byte]`.
    left: u32,
}

impl<'a> BitReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            byte: 0,
            left: 8,
        }
    }

    /// Read `n` bits (at most 64); bits past the end read as zero.
    pub(crate) fn read(&mut self, mut n: u32) -> u64 {
        let mut value = 0u64;
        while n > 0 {
            let cur = self.data.get(self.byte).copied().unwrap_or(0) as u64;
            let take = n.min(self.left);
            let shift = self.left - take;
            let bits = (cur >> shift) & ((1u64 << take) - 1);
            value = (value << take) | bits;
            n -= take;
            self.left -= take;
            if self.left == 0 {
                self.byte += 1;
                self.left = 8;
            }
        }
        value
    }
}
