use std::cmp::Ordering;

use super::{strides, IndexSpace};

/// Division of an index space into equal-sized tiles.
///
/// Indices are points of the variable; tiles are points of the tiled space.
/// The chunk shape may carry an extra trailing dimension (the element size
/// of chunked storage), which is ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tiling {
    chunk: Vec<u64>,
    index_shape: Vec<u64>,
    tile_shape: Vec<u64>,
    strider: Vec<u64>,
}

impl Tiling {
    pub fn new(varshape: &[u64], chunk: &[u64]) -> Self {
        let rank = varshape.len();
        debug_assert!(chunk.len() >= rank);
        let chunk: Vec<u64> = chunk[..rank].iter().map(|&c| c.max(1)).collect();
        let index_shape: Vec<u64> = varshape.iter().zip(&chunk).map(|(&v, &c)| v.max(c)).collect();
        let tile_shape: Vec<u64> = index_shape
            .iter()
            .zip(&chunk)
            .map(|(&n, &c)| (n + c - 1) / c)
            .collect();
        let strider = strides(&tile_shape);
        Self {
            chunk,
            index_shape,
            tile_shape,
            strider,
        }
    }

    pub fn rank(&self) -> usize {
        self.chunk.len()
    }

    pub fn chunk(&self) -> &[u64] {
        &self.chunk
    }

    pub fn tile_shape(&self) -> &[u64] {
        &self.tile_shape
    }

    /// The tile holding index `pt`. Extra trailing coordinates are ignored.
    pub fn tile(&self, pt: &[u64]) -> Vec<u64> {
        pt.iter().zip(&self.chunk).map(|(&p, &c)| p / c).collect()
    }

    /// The first index of a tile; inverse of [`tile`](Self::tile).
    pub fn index(&self, tile: &[u64]) -> Vec<u64> {
        tile.iter().zip(&self.chunk).map(|(&t, &c)| t * c).collect()
    }

    /// Row-major position of the tile holding `pt`.
    pub fn order(&self, pt: &[u64]) -> u64 {
        pt.iter()
            .zip(&self.chunk)
            .zip(&self.strider)
            .map(|((&p, &c), &s)| (p / c) * s)
            .sum()
    }

    /// Order two index points by the tile they fall in.
    pub fn compare(&self, a: &[u64], b: &[u64]) -> Ordering {
        self.order(a).cmp(&self.order(b))
    }

    /// The block of tiles covering an index space.
    pub fn section(&self, space: &IndexSpace) -> IndexSpace {
        debug_assert_eq!(space.rank(), self.rank());
        let last: Vec<u64> = space
            .last()
            .iter()
            .zip(&self.index_shape)
            .map(|(&l, &n)| l.min(n.saturating_sub(1)))
            .collect();
        let start = self.tile(&space.start);
        let end = self.tile(&last);
        let shape = start.iter().zip(&end).map(|(&s, &e)| e + 1 - s).collect();
        IndexSpace::new(start, shape)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tile_of_index_round_trips() {
        let tiling = Tiling::new(&[10, 7], &[3, 2, 4]);
        assert_eq!(tiling.tile_shape(), &[4, 4]);
        for t0 in 0..4 {
            for t1 in 0..4 {
                let t = vec![t0, t1];
                assert_eq!(tiling.tile(&tiling.index(&t)), t);
            }
        }
    }

    #[test]
    fn order_is_row_major_over_tiles() {
        let tiling = Tiling::new(&[4, 4], &[2, 2]);
        assert_eq!(tiling.order(&[0, 0]), 0);
        assert_eq!(tiling.order(&[1, 3]), 1);
        assert_eq!(tiling.order(&[2, 0]), 2);
        assert_eq!(tiling.compare(&[0, 2], &[2, 0]), Ordering::Less);
        assert_eq!(tiling.compare(&[3, 3], &[2, 2]), Ordering::Equal);
    }

    #[test]
    fn chunk_larger_than_variable() {
        let tiling = Tiling::new(&[3], &[8]);
        assert_eq!(tiling.tile_shape(), &[1]);
        let s = tiling.section(&IndexSpace::from_shape(&[3]));
        assert_eq!(s, IndexSpace::new(vec![0], vec![1]));
    }

    #[test]
    fn section_covers_partial_tiles() {
        let tiling = Tiling::new(&[10, 10], &[4, 4]);
        let want = IndexSpace::new(vec![3, 5], vec![2, 6]);
        assert_eq!(tiling.section(&want), IndexSpace::new(vec![0, 1], vec![2, 2]));
    }
}
