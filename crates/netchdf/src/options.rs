//! Options controlling how a file is opened and read.

use netchdf_format::signature::DEFAULT_SEARCH_LIMIT;

/// Default number of elements per piece yielded by a chunk iterator.
pub const DEFAULT_MAX_ELEMENTS: usize = 100_000;

/// Read-side configuration.
///
/// Options group related settings into one value passed to
/// [`open_with`](crate::open_with) or [`Hdf5File::from_bytes`](crate::Hdf5File::from_bytes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadOptions {
    /// Superblock offsets at or past this bound are not searched.
    pub signature_search_limit: u64,
    /// Decode chunks of one read on the rayon pool.
    pub parallel: bool,
    /// Upper bound on the chunks decoded in one parallel batch.
    pub max_parallel_chunks: usize,
    /// Reads touching fewer chunks than this stay sequential.
    pub parallel_threshold: usize,
    /// Verify metadata checksums (v2 headers, B-tree v2, fractal heap).
    pub verify_checksums: bool,
    /// Hide the netCDF-4 and dimension-scale bookkeeping attributes.
    pub strict: bool,
    /// Map files into memory instead of reading them whole.
    pub use_mmap: bool,
    /// Piece size of a chunk iterator when the caller gives none.
    pub default_max_elements: usize,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            signature_search_limit: DEFAULT_SEARCH_LIMIT,
            parallel: cfg!(feature = "parallel"),
            max_parallel_chunks: 64,
            parallel_threshold: 4,
            verify_checksums: false,
            strict: false,
            use_mmap: cfg!(feature = "mmap"),
            default_max_elements: DEFAULT_MAX_ELEMENTS,
        }
    }
}

impl ReadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signature_search_limit(mut self, limit: u64) -> Self {
        self.signature_search_limit = limit;
        self
    }

    /// Enable or disable parallel chunk decoding. Has no effect without the
    /// `parallel` feature.
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn max_parallel_chunks(mut self, n: usize) -> Self {
        self.max_parallel_chunks = n.max(1);
        self
    }

    pub fn parallel_threshold(mut self, n: usize) -> Self {
        self.parallel_threshold = n;
        self
    }

    pub fn verify_checksums(mut self, verify: bool) -> Self {
        self.verify_checksums = verify;
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Memory-map files opened by path. Has no effect without the `mmap`
    /// feature.
    pub fn use_mmap(mut self, mmap: bool) -> Self {
        self.use_mmap = mmap;
        self
    }

    pub fn default_max_elements(mut self, n: usize) -> Self {
        self.default_max_elements = n.max(1);
        self
    }

    /// Whether a read over `nchunks` chunks should fan out to rayon.
    pub(crate) fn use_parallel(&self, nchunks: usize) -> bool {
        cfg!(feature = "parallel") && self.parallel && nchunks >= self.parallel_threshold.max(2)
    }
}
