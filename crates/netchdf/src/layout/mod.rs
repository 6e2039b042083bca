//! Index arithmetic for moving elements between storage and destination
//! buffers.
//!
//! Everything in this module counts elements, not bytes. Byte positions are
//! formed at the edges by multiplying with the element size.

mod chunker;
mod index_nd;
mod index_space;
mod max_chunker;
mod regular;
mod tiling;

pub use chunker::{Chunker, Merge, TransferChunk};
pub use index_nd::IndexND;
pub use index_space::IndexSpace;
pub use max_chunker::MaxChunker;
pub use regular::{LayoutChunk, LayoutRegular};
pub use tiling::Tiling;

/// Row-major strides of `shape`.
pub(crate) fn strides(shape: &[u64]) -> Vec<u64> {
    let mut strider = vec![0u64; shape.len()];
    let mut acc = 1u64;
    for k in (0..shape.len()).rev() {
        strider[k] = acc;
        acc = acc.saturating_mul(shape[k]);
    }
    strider
}
