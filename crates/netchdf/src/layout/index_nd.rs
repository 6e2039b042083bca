use super::{strides, IndexSpace};

/// Row-major odometer over a section of a larger array.
///
/// `element()` maps the current index to its flat position in the full
/// array described by `datashape`. The datashape may carry extra trailing
/// dimensions, which are ignored.
#[derive(Debug, Clone)]
pub struct IndexND {
    section: IndexSpace,
    last: Vec<u64>,
    strider: Vec<u64>,
    current: Vec<u64>,
}

impl IndexND {
    pub fn new(section: IndexSpace, datashape: &[u64]) -> Self {
        let rank = section.rank();
        debug_assert!(datashape.len() >= rank);
        let strider = strides(&datashape[..rank]);
        let last = section.last();
        let current = section.start.clone();
        Self {
            section,
            last,
            strider,
            current,
        }
    }

    pub fn current(&self) -> &[u64] {
        &self.current
    }

    /// Flat element number of the current index.
    pub fn element(&self) -> u64 {
        self.current
            .iter()
            .zip(&self.strider)
            .map(|(&c, &s)| c * s)
            .sum()
    }

    /// Set the current index from a flat element number.
    pub fn set(&mut self, element: u64) -> &[u64] {
        let mut rest = element;
        for (c, &s) in self.current.iter_mut().zip(&self.strider) {
            *c = if s == 0 { 0 } else { rest / s };
            rest -= *c * s;
        }
        &self.current
    }

    /// Advance `digit` by one, carrying into slower digits.
    pub fn incr(&mut self, digit: usize) -> &[u64] {
        if self.current.is_empty() {
            return &self.current;
        }
        let mut d = digit.min(self.current.len() - 1) as isize;
        while d >= 0 {
            let i = d as usize;
            self.current[i] += 1;
            if self.current[i] <= self.last[i] {
                break;
            }
            self.current[i] = self.section.start[i];
            d -= 1;
        }
        &self.current
    }

    /// Every index of the section, in row-major order.
    pub fn iter(&self) -> IndexIter {
        IndexIter {
            odo: IndexND {
                current: self.section.start.clone(),
                ..self.clone()
            },
            remaining: self.section.total_elements(),
            first: true,
        }
    }
}

/// Iterator returned by [`IndexND::iter`].
#[derive(Debug, Clone)]
pub struct IndexIter {
    odo: IndexND,
    remaining: u64,
    first: bool,
}

impl Iterator for IndexIter {
    type Item = Vec<u64>;

    fn next(&mut self) -> Option<Vec<u64>> {
        if self.remaining == 0 {
            return None;
        }
        if !self.first {
            let fastest = self.odo.current.len().saturating_sub(1);
            self.odo.incr(fastest);
        }
        self.first = false;
        self.remaining -= 1;
        Some(self.odo.current.clone())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = usize::try_from(self.remaining).unwrap_or(usize::MAX);
        (n, Some(n))
    }
}
