use netchdf_format::FormatError;

use super::{IndexND, IndexSpace};
use crate::error::Result;

/// Whether trailing dimensions that match in source and destination may be
/// folded into one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Merge {
    #[default]
    All,
    None,
}

/// A run of elements contiguous in both source and destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferChunk {
    /// First element to read, relative to the data chunk.
    pub src_elem: u64,
    /// Run length in elements.
    pub nelems: u64,
    /// First element to write, relative to the wanted space.
    pub dest_elem: u64,
}

/// Walks the intersection of one data chunk with the wanted space and
/// emits the contiguous runs that move it into the destination.
///
/// Runs are monotonic in both source and destination position. A chunker is
/// single use.
#[derive(Debug, Clone)]
pub struct Chunker {
    src: IndexND,
    dst: IndexND,
    nelems: u64,
    total: u64,
    incr_digit: usize,
    done: u64,
    first: bool,
}

impl Chunker {
    pub fn new(data_chunk: &IndexSpace, want: &IndexSpace, merge: Merge) -> Self {
        let rank = want.rank();
        let data_chunk = IndexSpace::new(
            data_chunk.start[..rank].to_vec(),
            data_chunk.shape[..rank].to_vec(),
        );
        let intersect = want.intersect(&data_chunk);
        let src = IndexND::new(intersect.shift_origin(&data_chunk.start), &data_chunk.shape);
        let dst = IndexND::new(intersect.shift_origin(&want.start), &want.shape);

        let merge_dims = match merge {
            Merge::None => 0,
            Merge::All => (0..rank)
                .rev()
                .take_while(|&i| {
                    intersect.shape[i] == data_chunk.shape[i] && intersect.shape[i] == want.shape[i]
                })
                .count(),
        };
        let first_dim = if rank == merge_dims { 0 } else { rank - merge_dims - 1 };
        let nelems = intersect.shape[first_dim.min(rank)..].iter().product();
        let incr_digit = first_dim.saturating_sub(1);
        let total = if intersect.is_empty() { 0 } else { intersect.total_elements() };

        tracing::trace!(
            chunk = %data_chunk,
            want = %want,
            nelems,
            total,
            "chunker"
        );

        Self {
            src,
            dst,
            nelems,
            total,
            incr_digit,
            done: 0,
            first: true,
        }
    }

    /// Elements in one run.
    pub fn nelems(&self) -> u64 {
        self.nelems
    }

    /// Elements moved by the whole chunker.
    pub fn total_elements(&self) -> u64 {
        self.total
    }

    /// Copy every run from `src` into `dst`, both holding elements of
    /// `elem_size` bytes.
    pub fn transfer(self, src: &[u8], elem_size: usize, dst: &mut [u8]) -> Result<()> {
        for run in self {
            let len = run.nelems as usize * elem_size;
            let s = run.src_elem as usize * elem_size;
            let d = run.dest_elem as usize * elem_size;
            let from = src.get(s..s + len).ok_or_else(|| {
                FormatError::InvalidData(format!(
                    "chunk holds {} bytes, run needs {}..{}",
                    src.len(),
                    s,
                    s + len
                ))
            })?;
            let to = dst.get_mut(d..d + len).ok_or_else(|| {
                FormatError::InvalidData(format!("destination run {}..{} out of range", d, d + len))
            })?;
            to.copy_from_slice(from);
        }
        Ok(())
    }

    /// Write `fill` into every destination element the runs cover. An empty
    /// fill leaves the destination as is.
    pub fn transfer_missing(self, fill: &[u8], elem_size: usize, dst: &mut [u8]) -> Result<()> {
        if fill.is_empty() {
            return Ok(());
        }
        for run in self {
            let d = run.dest_elem as usize * elem_size;
            let len = run.nelems as usize * elem_size;
            let to = dst.get_mut(d..d + len).ok_or_else(|| {
                FormatError::InvalidData(format!("destination run {}..{} out of range", d, d + len))
            })?;
            for elem in to.chunks_exact_mut(elem_size) {
                let n = elem_size.min(fill.len());
                elem[..n].copy_from_slice(&fill[..n]);
            }
        }
        Ok(())
    }
}

impl Iterator for Chunker {
    type Item = TransferChunk;

    fn next(&mut self) -> Option<TransferChunk> {
        if self.done >= self.total {
            return None;
        }
        if !self.first {
            self.src.incr(self.incr_digit);
            self.dst.incr(self.incr_digit);
        }
        self.first = false;
        self.done += self.nelems;
        Some(TransferChunk {
            src_elem: self.src.element(),
            nelems: self.nelems,
            dest_elem: self.dst.element(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn space(start: &[u64], shape: &[u64]) -> IndexSpace {
        IndexSpace::new(start.to_vec(), shape.to_vec())
    }

    #[test]
    fn identical_spaces_merge_into_one_run() {
        let s = space(&[0, 0], &[3, 4]);
        let runs: Vec<_> = Chunker::new(&s, &s, Merge::All).collect();
        assert_eq!(
            runs,
            vec![TransferChunk {
                src_elem: 0,
                nelems: 12,
                dest_elem: 0
            }]
        );
    }

    #[test]
    fn no_merge_emits_one_run_per_element_row() {
        let s = space(&[0, 0], &[2, 3]);
        let runs: Vec<_> = Chunker::new(&s, &s, Merge::None).collect();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[1].src_elem, 3);
        assert_eq!(runs[1].nelems, 3);
    }

    #[test]
    fn chunk_inside_larger_want() {
        // 2x2 chunk at (2,2) of a 4x4 want
        let chunk = space(&[2, 2], &[2, 2]);
        let want = space(&[0, 0], &[4, 4]);
        let runs: Vec<_> = Chunker::new(&chunk, &want, Merge::All).collect();
        assert_eq!(
            runs,
            vec![
                TransferChunk {
                    src_elem: 0,
                    nelems: 2,
                    dest_elem: 10
                },
                TransferChunk {
                    src_elem: 2,
                    nelems: 2,
                    dest_elem: 14
                },
            ]
        );
    }

    #[test]
    fn transfer_places_values() {
        let chunk = space(&[0, 2], &[2, 2]);
        let want = space(&[0, 0], &[2, 4]);
        let src = [1u8, 2, 3, 4];
        let mut dst = [0u8; 8];
        Chunker::new(&chunk, &want, Merge::All)
            .transfer(&src, 1, &mut dst)
            .unwrap();
        assert_eq!(dst, [0, 0, 1, 2, 0, 0, 3, 4]);
    }

    #[test]
    fn partial_overlap_of_chunk_and_want() {
        let chunk = space(&[0, 0], &[4, 4]);
        let want = space(&[1, 1], &[2, 2]);
        let src: Vec<u8> = (0..16).collect();
        let mut dst = [0u8; 4];
        Chunker::new(&chunk, &want, Merge::All)
            .transfer(&src, 1, &mut dst)
            .unwrap();
        assert_eq!(dst, [5, 6, 9, 10]);
    }

    #[test]
    fn missing_runs_get_fill() {
        let chunk = space(&[2], &[2]);
        let want = space(&[0], &[4]);
        let mut dst = [0u8; 8];
        Chunker::new(&chunk, &want, Merge::All)
            .transfer_missing(&[7, 9], 2, &mut dst)
            .unwrap();
        assert_eq!(dst, [0, 0, 0, 0, 7, 9, 7, 9]);
    }

    #[test]
    fn short_source_is_an_error() {
        let s = space(&[0], &[4]);
        let mut dst = [0u8; 4];
        assert!(Chunker::new(&s, &s, Merge::All).transfer(&[1, 2], 1, &mut dst).is_err());
    }

    #[test]
    fn disjoint_spaces_yield_nothing() {
        let runs: Vec<_> =
            Chunker::new(&space(&[4], &[2]), &space(&[0], &[4]), Merge::All).collect();
        assert!(runs.is_empty());
    }

    #[test]
    fn scalar_is_one_run() {
        let s = IndexSpace::from_shape(&[]);
        let runs: Vec<_> = Chunker::new(&s, &s, Merge::All).collect();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].nelems, 1);
    }
}
