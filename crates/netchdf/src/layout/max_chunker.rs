use super::{IndexND, IndexSpace};

/// Splits a wanted space into row-major pieces of at most `max_elems`
/// elements.
///
/// Each piece is a rectangle that is also one contiguous run of the wanted
/// space, so pieces tile it without overlap. The innermost dimension is
/// taken whole whenever it fits; an outer dimension grows past one only when
/// every faster dimension is taken whole. Yielded spaces are in the same
/// coordinates as `want`.
#[derive(Debug, Clone)]
pub struct MaxChunker {
    max_elems: u64,
    want: IndexSpace,
    odo: IndexND,
    total: u64,
    done: u64,
}

impl MaxChunker {
    pub fn new(max_elems: usize, want: &IndexSpace) -> Self {
        let relative = IndexSpace::from_shape(&want.shape);
        let total = if want.is_empty() { 0 } else { want.total_elements() };
        Self {
            max_elems: (max_elems as u64).max(1),
            odo: IndexND::new(relative, &want.shape),
            want: want.clone(),
            total,
            done: 0,
        }
    }

    fn piece_shape(&self, current: &[u64]) -> Vec<u64> {
        let rank = self.want.rank();
        let mut piece = vec![1u64; rank];
        let mut budget = self.max_elems;
        for k in (0..rank).rev() {
            let remaining = self.want.shape[k] - current[k];
            let take = budget.max(1).min(remaining);
            piece[k] = take;
            if current[k] != 0 || take != self.want.shape[k] {
                break;
            }
            budget /= take;
        }
        piece
    }
}

impl Iterator for MaxChunker {
    type Item = IndexSpace;

    fn next(&mut self) -> Option<IndexSpace> {
        if self.done >= self.total {
            return None;
        }
        let current = self.odo.current().to_vec();
        let shape = self.piece_shape(&current);
        let start = current.iter().zip(&self.want.start).map(|(&c, &s)| c + s).collect();
        let piece = IndexSpace::new(start, shape);
        self.done += piece.total_elements();
        self.odo.set(self.done);
        Some(piece)
    }
}
