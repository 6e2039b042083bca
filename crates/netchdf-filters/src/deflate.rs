use crate::FilterError;

/// Inflate a zlib stream.
///
/// `size_hint` is the expected decoded size (0 when unknown). The flate2
/// backend only uses it to reserve capacity; libdeflater needs an output
/// buffer up front and grows it when the hint is too small.
pub fn deflate_decompress(data: &[u8], size_hint: usize) -> Result<Vec<u8>, FilterError> {
    #[cfg(feature = "fast-deflate")]
    {
        fast_decompress(data, size_hint)
    }
    #[cfg(all(feature = "deflate", not(feature = "fast-deflate")))]
    {
        flate2_decompress(data, size_hint)
    }
    #[cfg(not(any(feature = "deflate", feature = "fast-deflate")))]
    {
        let _ = (data, size_hint);
        Err(FilterError::Unsupported(
            "deflate (built without a deflate backend)".into(),
        ))
    }
}

#[cfg(all(feature = "deflate", not(feature = "fast-deflate")))]
fn flate2_decompress(data: &[u8], size_hint: usize) -> Result<Vec<u8>, FilterError> {
    use std::io::Read;
    let mut decoder = flate2::read::ZlibDecoder::new(data);
    let mut out = Vec::with_capacity(size_hint);
    decoder
        .read_to_end(&mut out)
        .map_err(|e| FilterError::Decompress(e.to_string()))?;
    Ok(out)
}

#[cfg(feature = "fast-deflate")]
fn fast_decompress(data: &[u8], size_hint: usize) -> Result<Vec<u8>, FilterError> {
    use libdeflater::{DecompressionError, Decompressor};

    let mut decompressor = Decompressor::new();
    let mut capacity = size_hint.max(data.len() * 4).max(64);
    loop {
        let mut out = vec![0u8; capacity];
        match decompressor.zlib_decompress(data, &mut out) {
            Ok(n) => {
                out.truncate(n);
                return Ok(out);
            }
            Err(DecompressionError::InsufficientSpace) => capacity *= 2,
            Err(e) => return Err(FilterError::Decompress(format!("{e:?}"))),
        }
    }
}
