use netchdf_format::FormatError;

use super::{Chunker, IndexSpace, Merge};
use crate::error::Result;

/// A run of a row-major array: `nelems` elements read at byte `src_pos`,
/// written at element `dest_elem` of the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutChunk {
    pub src_pos: u64,
    pub nelems: u64,
    pub dest_elem: u64,
}

/// Runs that read a wanted section out of a row-major block stored at
/// `data_pos`. Serves contiguous and compact storage, where the whole
/// dataspace is one chunk.
#[derive(Debug, Clone)]
pub struct LayoutRegular {
    data_pos: u64,
    elem_size: usize,
    chunker: Chunker,
}

impl LayoutRegular {
    pub fn new(data_pos: u64, elem_size: usize, varshape: &[u64], want: &IndexSpace) -> Self {
        let whole = IndexSpace::from_shape(varshape);
        Self {
            data_pos,
            elem_size,
            chunker: Chunker::new(&whole, want, Merge::All),
        }
    }

    pub fn total_elements(&self) -> u64 {
        self.chunker.total_elements()
    }

    /// Copy every run out of `source`, which byte positions index into.
    pub fn transfer(self, source: &[u8], dst: &mut [u8]) -> Result<()> {
        let elem_size = self.elem_size;
        for run in self {
            let len = run.nelems as usize * elem_size;
            let s = run.src_pos as usize;
            let d = run.dest_elem as usize * elem_size;
            let from = source
                .get(s..s + len)
                .ok_or(FormatError::UnexpectedEof {
                    expected: (s + len) as u64,
                    available: source.len() as u64,
                })?;
            let to = dst.get_mut(d..d + len).ok_or_else(|| {
                FormatError::InvalidData(format!("destination run {}..{} out of range", d, d + len))
            })?;
            to.copy_from_slice(from);
        }
        Ok(())
    }
}

impl Iterator for LayoutRegular {
    type Item = LayoutChunk;

    fn next(&mut self) -> Option<LayoutChunk> {
        let run = self.chunker.next()?;
        Some(LayoutChunk {
            src_pos: self.data_pos + run.src_elem * self.elem_size as u64,
            nelems: run.nelems,
            dest_elem: run.dest_elem,
        })
    }
}
