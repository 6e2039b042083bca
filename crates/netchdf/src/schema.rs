//! The logical schema of an opened file.
//!
//! Everything here is built once by [`open`](crate::open) and is immutable
//! afterwards.

use netchdf_format::data_layout::ChunkIndex;
use netchdf_format::filter_pipeline::FilterPipeline;

use crate::array::TypedArray;
use crate::typedef::Typedef;
use crate::types::TypeDescriptor;

/// A shared dimension declared by a dimension scale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dimension {
    pub name: String,
    pub length: u64,
    pub is_unlimited: bool,
}

/// A named value attached to a group or variable.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub datatype: TypeDescriptor,
    pub values: TypedArray,
}

impl Attribute {
    /// The first value as text, for string attributes.
    pub fn as_str(&self) -> Option<&str> {
        self.values.as_strings()?.first().map(String::as_str)
    }
}

/// Where the raw bytes of a variable live.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum StorageLayout {
    /// Bytes copied out of the layout message.
    Compact(Vec<u8>),
    /// One block; `None` when never allocated.
    Contiguous { address: Option<u64> },
    Chunked {
        /// Chunk shape, one entry per variable dimension.
        chunk: Vec<u64>,
        index: ChunkIndex,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Storage {
    pub layout: StorageLayout,
    pub filters: Option<FilterPipeline>,
    /// One element; empty means zeros.
    pub fill: Vec<u8>,
    pub elem_size: usize,
}

/// A typed multidimensional array stored in the file.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    /// Absolute path of the dataset, starting with `/`.
    pub path: String,
    pub datatype: TypeDescriptor,
    pub shape: Vec<u64>,
    /// Shared dimension names, one per axis; empty when the variable has
    /// only anonymous dimensions.
    pub dimensions: Vec<String>,
    /// Per axis, whether the dataspace allows unlimited growth.
    pub unlimited: Vec<bool>,
    pub attributes: Vec<Attribute>,
    pub(crate) storage: Storage,
}

impl Variable {
    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn total_elements(&self) -> u64 {
        self.shape.iter().product()
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn is_chunked(&self) -> bool {
        matches!(self.storage.layout, StorageLayout::Chunked { .. })
    }

    /// Chunk shape of chunked storage.
    pub fn chunk_shape(&self) -> Option<&[u64]> {
        match &self.storage.layout {
            StorageLayout::Chunked { chunk, .. } => Some(chunk),
            _ => None,
        }
    }
}

/// A container of variables, attributes, dimensions, typedefs and nested
/// groups.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Group {
    pub name: String,
    /// Absolute path, `/` for the root.
    pub path: String,
    pub dimensions: Vec<Dimension>,
    pub typedefs: Vec<Typedef>,
    pub attributes: Vec<Attribute>,
    pub variables: Vec<Variable>,
    pub groups: Vec<Group>,
}

impl Group {
    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| v.name == name)
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn dimension(&self, name: &str) -> Option<&Dimension> {
        self.dimensions.iter().find(|d| d.name == name)
    }

    pub fn typedef(&self, name: &str) -> Option<&Typedef> {
        self.typedefs.iter().find(|t| t.name == name)
    }

    /// Direct child group by name.
    pub fn group(&self, name: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.name == name)
    }

    /// Descendant group by a `/`-separated path relative to this group.
    /// Leading, trailing and repeated separators are ignored.
    pub fn find_group(&self, path: &str) -> Option<&Group> {
        path.split('/')
            .filter(|p| !p.is_empty())
            .try_fold(self, |g, name| g.group(name))
    }

    /// Variable by a `/`-separated path relative to this group.
    pub fn find_variable(&self, path: &str) -> Option<&Variable> {
        let path = path.trim_matches('/');
        match path.rsplit_once('/') {
            Some((groups, name)) => self.find_group(groups)?.variable(name),
            None => self.variable(path),
        }
    }

    /// All variables of this group and its descendants, parents first.
    pub fn all_variables(&self) -> Vec<&Variable> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(g) = stack.pop() {
            out.extend(g.variables.iter());
            stack.extend(g.groups.iter().rev());
        }
        out
    }
}
