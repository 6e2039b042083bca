//! Caller-facing rectangular selections.

use std::fmt;

use crate::array::TypedArray;
use crate::error::{Error, Result};
use crate::layout::IndexSpace;

/// A rectangular selection: a start index and a length per dimension.
///
/// Starts are signed so that a bad request can be reported rather than
/// wrapped; [`read_section`](crate::Hdf5File::read_section) rejects
/// negative starts.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Section {
    pub start: Vec<i64>,
    pub shape: Vec<u64>,
}

impl Section {
    pub fn new(start: Vec<i64>, shape: Vec<u64>) -> Self {
        Self { start, shape }
    }

    /// The whole of an array with the given shape.
    pub fn from_shape(shape: &[u64]) -> Self {
        Self {
            start: vec![0; shape.len()],
            shape: shape.to_vec(),
        }
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn total_elements(&self) -> u64 {
        self.shape.iter().product()
    }

    /// Check the selection against a variable shape and convert it to an
    /// index space.
    pub(crate) fn to_index_space(&self, var_shape: &[u64]) -> Result<IndexSpace> {
        if self.start.len() != self.shape.len() {
            return Err(Error::Range(format!(
                "section start has rank {}, shape has rank {}",
                self.start.len(),
                self.shape.len()
            )));
        }
        if self.shape.len() != var_shape.len() {
            return Err(Error::Range(format!(
                "section has rank {}, variable has rank {}",
                self.shape.len(),
                var_shape.len()
            )));
        }
        let mut start = Vec::with_capacity(self.start.len());
        for (dim, (&s, (&len, &size))) in self
            .start
            .iter()
            .zip(self.shape.iter().zip(var_shape))
            .enumerate()
        {
            let s = u64::try_from(s)
                .map_err(|_| Error::Range(format!("negative start {s} in dimension {dim}")))?;
            let end = s
                .checked_add(len)
                .ok_or_else(|| Error::Range(format!("dimension {dim} overflows")))?;
            if end > size {
                return Err(Error::Range(format!(
                    "dimension {dim}: {s}..{end} exceeds length {size}"
                )));
            }
            start.push(s);
        }
        Ok(IndexSpace::new(start, self.shape.clone()))
    }
}

impl From<&IndexSpace> for Section {
    fn from(space: &IndexSpace) -> Self {
        Self {
            start: space.start.iter().map(|&s| s as i64).collect(),
            shape: space.shape.clone(),
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dims: Vec<String> = self
            .start
            .iter()
            .zip(&self.shape)
            .map(|(s, n)| format!("{s}:{}", s + *n as i64 - 1))
            .collect();
        write!(f, "[{}]", dims.join(", "))
    }
}

/// One piece yielded by a chunk iterator: the values and where they sit in
/// the variable.
#[derive(Debug, Clone, PartialEq)]
pub struct ArraySection {
    pub array: TypedArray,
    pub section: Section,
}
