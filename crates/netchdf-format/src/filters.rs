//! Running a chunk back through its filter pipeline.

use netchdf_filters::{nbit, scale_offset, FilterError};

use crate::filter_pipeline::{
    FilterPipeline, FILTER_DEFLATE, FILTER_FLETCHER32, FILTER_NBIT, FILTER_SCALEOFFSET,
    FILTER_SHUFFLE, FILTER_SZIP,
};

/// Decode one stored chunk.
///
/// Filters are applied in REVERSE order of declaration. Filter `i` is
/// skipped when bit `i` of `filter_mask` is set. `element_size` feeds the
/// shuffle filter when its client data does not name one; `chunk_bytes` is
/// the expected decoded size, used as an allocation hint.
pub fn apply(
    raw: Vec<u8>,
    pipeline: &FilterPipeline,
    filter_mask: u32,
    element_size: usize,
    chunk_bytes: usize,
) -> Result<Vec<u8>, FilterError> {
    let mut data = raw;
    for (i, filter) in pipeline.filters.iter().enumerate().rev() {
        if i < 32 && filter_mask & (1 << i) != 0 {
            continue;
        }
        data = match filter.filter_id {
            FILTER_DEFLATE => netchdf_filters::deflate_decompress(&data, chunk_bytes)?,
            FILTER_SHUFFLE => {
                let size = match filter.client_data.first() {
                    Some(&n) if n > 0 => n as usize,
                    _ => element_size,
                };
                netchdf_filters::unshuffle(&data, size)
            }
            FILTER_FLETCHER32 => netchdf_filters::fletcher32_verify(&data)?,
            FILTER_SZIP => return Err(FilterError::Unsupported("szip".into())),
            FILTER_NBIT => nbit::decompress(&data, &filter.client_data)?,
            FILTER_SCALEOFFSET => scale_offset::decompress(&data, &filter.client_data)?,
            other => return Err(FilterError::Unsupported(format!("filter id {other}"))),
        };
    }
    Ok(data)
}
