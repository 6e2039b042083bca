use std::fmt;

/// A rectangular block of indices: `start` and `shape` per dimension.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexSpace {
    pub start: Vec<u64>,
    pub shape: Vec<u64>,
}

impl IndexSpace {
    pub fn new(start: Vec<u64>, shape: Vec<u64>) -> Self {
        debug_assert_eq!(start.len(), shape.len());
        Self { start, shape }
    }

    /// The block starting at the origin.
    pub fn from_shape(shape: &[u64]) -> Self {
        Self {
            start: vec![0; shape.len()],
            shape: shape.to_vec(),
        }
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Number of indices in the block. A rank-0 space holds one element.
    /// Saturates at `u64::MAX`.
    pub fn total_elements(&self) -> u64 {
        self.checked_elements().unwrap_or(u64::MAX)
    }

    /// Number of indices, or `None` when the count overflows.
    pub fn checked_elements(&self) -> Option<u64> {
        self.shape.iter().try_fold(1u64, |n, &d| n.checked_mul(d))
    }

    pub fn is_empty(&self) -> bool {
        self.shape.iter().any(|&n| n == 0)
    }

    /// Inclusive upper corner. Meaningless for an empty space.
    pub fn last(&self) -> Vec<u64> {
        self.start
            .iter()
            .zip(&self.shape)
            .map(|(&s, &n)| (s + n).saturating_sub(1))
            .collect()
    }

    /// End corner, exclusive.
    pub fn end(&self) -> Vec<u64> {
        self.start.iter().zip(&self.shape).map(|(&s, &n)| s + n).collect()
    }

    pub fn contains_point(&self, pt: &[u64]) -> bool {
        pt.len() == self.rank()
            && pt
                .iter()
                .zip(self.start.iter().zip(&self.shape))
                .all(|(&p, (&s, &n))| p >= s && p < s + n)
    }

    /// True when `other` lies entirely inside this space.
    pub fn contains(&self, other: &IndexSpace) -> bool {
        other.rank() == self.rank()
            && (0..self.rank()).all(|i| {
                other.start[i] >= self.start[i]
                    && other.start[i] + other.shape[i] <= self.start[i] + self.shape[i]
            })
    }

    /// Overlap of two spaces. Dimensions that do not overlap get length 0.
    pub fn intersect(&self, other: &IndexSpace) -> IndexSpace {
        let rank = self.rank().min(other.rank());
        let mut start = Vec::with_capacity(rank);
        let mut shape = Vec::with_capacity(rank);
        for i in 0..rank {
            let first = self.start[i].max(other.start[i]);
            let end = (self.start[i] + self.shape[i]).min(other.start[i] + other.shape[i]);
            start.push(first);
            shape.push(end.saturating_sub(first));
        }
        IndexSpace { start, shape }
    }

    pub fn intersects(&self, other: &IndexSpace) -> bool {
        (0..self.rank().min(other.rank())).all(|i| {
            let first = self.start[i].max(other.start[i]);
            let end = (self.start[i] + self.shape[i]).min(other.start[i] + other.shape[i]);
            first < end
        })
    }

    /// Re-express this space relative to `origin`, which must not lie past
    /// `start` in any dimension.
    pub fn shift_origin(&self, origin: &[u64]) -> IndexSpace {
        IndexSpace {
            start: self
                .start
                .iter()
                .zip(origin)
                .map(|(&s, &o)| s - o)
                .collect(),
            shape: self.shape.clone(),
        }
    }
}

impl fmt::Display for IndexSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} {:?} total={}", self.start, self.shape, self.total_elements())
    }
}
