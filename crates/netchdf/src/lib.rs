//! Read-only access to HDF5 and netCDF-4 files.
//!
//! Opening a file decodes its whole schema up front: groups, variables,
//! attributes, shared dimensions and user-defined types. Array data is read
//! on demand, either as one [`TypedArray`] per request or streamed in
//! bounded pieces by a [`ChunkIter`].
//!
//! ```no_run
//! use netchdf::Section;
//!
//! let file = netchdf::open("ocean.nc").unwrap();
//! let temp = file.find_variable("/model/temp").unwrap();
//! println!("{} {:?} {}", temp.name, temp.shape, temp.datatype);
//!
//! let corner = file
//!     .read_section(temp, Some(&Section::new(vec![0, 0], vec![2, 2])))
//!     .unwrap();
//! println!("{:?}", corner.to_f64_vec());
//!
//! for piece in file.chunk_iterator(temp, None, Some(10_000)).unwrap() {
//!     let piece = piece.unwrap();
//!     println!("{} -> {} values", piece.section, piece.array.len());
//! }
//! ```
//!
//! Everything behind [`Hdf5File`] is immutable after open apart from an
//! internal heap cache, so one file can be shared across threads.

pub mod array;
mod builder;
mod chunk_iter;
mod chunk_reader;
pub mod error;
pub mod layout;
mod materialize;
pub mod options;
pub mod schema;
pub mod section;
mod session;
mod tiled_data;
pub mod typedef;
pub mod types;
mod vlen;

use std::collections::HashMap;
use std::io;
use std::path::Path;

use netchdf_format::signature::find_signature;
use netchdf_format::superblock::Superblock;
use netchdf_format::FileContext;
use netchdf_io::{ByteSource, FileSource, MemorySource};

pub use array::{ArrayValues, StructArray, TypedArray};
pub use chunk_iter::ChunkIter;
pub use error::{Error, Result};
pub use options::{ReadOptions, DEFAULT_MAX_ELEMENTS};
pub use schema::{Attribute, Dimension, Group, Variable};
pub use section::{ArraySection, Section};
pub use typedef::{Typedef, TypedefKind};
pub use types::{CharacterSet, CompoundField, ReferenceType, StringPadding, TypeDescriptor, TypedefId};

use chunk_reader::read_raw;
use layout::IndexSpace;
use materialize::Materializer;
use session::DecodeSession;
use vlen::HeapCache;

/// Open a file with default options.
pub fn open<P: AsRef<Path>>(path: P) -> Result<Hdf5File> {
    open_with(path, ReadOptions::default())
}

/// Open a file, memory-mapping it when the options ask for it and the
/// `mmap` feature is enabled.
pub fn open_with<P: AsRef<Path>>(path: P, options: ReadOptions) -> Result<Hdf5File> {
    let path = path.as_ref();
    tracing::debug!(path = %path.display(), mmap = options.use_mmap, "opening");
    let source = open_source(path, options.use_mmap)?;
    Hdf5File::from_source(source, options)
}

fn open_source(path: &Path, mmap: bool) -> io::Result<Box<dyn ByteSource>> {
    #[cfg(feature = "mmap")]
    if mmap {
        return Ok(Box::new(netchdf_io::MmapSource::open(path)?));
    }
    #[cfg(not(feature = "mmap"))]
    let _ = mmap;
    Ok(Box::new(FileSource::open(path)?))
}

/// An open file: its decoded schema plus the bytes array reads come from.
pub struct Hdf5File {
    source: Box<dyn ByteSource>,
    superblock_version: u8,
    base: u64,
    offset_size: u8,
    length_size: u8,
    options: ReadOptions,
    root: Group,
    heap: HeapCache,
    /// Object header address to absolute path, for object references.
    paths: HashMap<u64, String>,
}

impl std::fmt::Debug for Hdf5File {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hdf5File")
            .field("len", &self.source.len())
            .field("superblock_version", &self.superblock_version)
            .field("root", &self.root.path)
            .finish_non_exhaustive()
    }
}

impl Hdf5File {
    /// Decode a file held in memory.
    pub fn from_bytes(bytes: Vec<u8>, options: ReadOptions) -> Result<Hdf5File> {
        Self::from_source(Box::new(MemorySource::new(bytes)), options)
    }

    /// Decode the schema of any byte source.
    pub fn from_source(source: Box<dyn ByteSource>, options: ReadOptions) -> Result<Hdf5File> {
        let data = source.as_bytes();
        let sig = find_signature(data, options.signature_search_limit)?;
        let sb = Superblock::parse(data, sig as usize)?;
        tracing::debug!(
            version = sb.version,
            offset_size = sb.offset_size,
            length_size = sb.length_size,
            base = sb.effective_base(),
            root = sb.root_group_address,
            "superblock"
        );

        let eof = sb.effective_eof();
        if eof != u64::MAX && eof > source.len() {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("file is truncated: superblock claims {eof} bytes, found {}", source.len()),
            )));
        }

        let ctx = FileContext::new(data, sb.effective_base(), sb.offset_size, sb.length_size)
            .with_checksums(options.verify_checksums);
        let mut session = DecodeSession::new(ctx);
        session.walk(sb.root_group_address)?;
        let headers = session.header_count();
        let built = session.build(options.strict)?;
        tracing::debug!(
            headers,
            variables = built.root.all_variables().len(),
            "opened"
        );

        Ok(Hdf5File {
            source,
            superblock_version: sb.version,
            base: sb.effective_base(),
            offset_size: sb.offset_size,
            length_size: sb.length_size,
            options,
            root: built.root,
            heap: built.heap,
            paths: built.paths,
        })
    }

    pub fn root(&self) -> &Group {
        &self.root
    }

    pub fn superblock_version(&self) -> u8 {
        self.superblock_version
    }

    pub fn options(&self) -> &ReadOptions {
        &self.options
    }

    /// Variable by absolute path, e.g. `/group/name`.
    pub fn find_variable(&self, path: &str) -> Result<&Variable> {
        self.root
            .find_variable(path)
            .ok_or_else(|| Error::NotFound(path.to_string()))
    }

    /// Read `section` of `var`, or all of it when `section` is `None`.
    ///
    /// Unwritten chunks and unallocated storage read as the variable's fill
    /// value, or zeros when it has none.
    pub fn read_section(&self, var: &Variable, section: Option<&Section>) -> Result<TypedArray> {
        let want = self.index_space(var, section)?;
        let bytes = read_raw(self.context(), var, &want, &self.options)?;
        let shape: Vec<usize> = want.shape.iter().map(|&d| d as usize).collect();
        self.materializer().materialize(&bytes, &shape, &var.datatype)
    }

    /// Stream `section` of `var` in pieces of at most `max_elements`
    /// elements ([`ReadOptions::default_max_elements`] when `None`).
    pub fn chunk_iterator<'f>(
        &'f self,
        var: &'f Variable,
        section: Option<&Section>,
        max_elements: Option<usize>,
    ) -> Result<ChunkIter<'f>> {
        let want = self.index_space(var, section)?;
        let max = max_elements.unwrap_or(self.options.default_max_elements);
        ChunkIter::new(self, var, want, max)
    }

    fn index_space(&self, var: &Variable, section: Option<&Section>) -> Result<IndexSpace> {
        match section {
            Some(s) => s.to_index_space(&var.shape),
            None => Ok(IndexSpace::from_shape(&var.shape)),
        }
    }

    pub(crate) fn context(&self) -> FileContext<'_> {
        FileContext::new(self.source.as_bytes(), self.base, self.offset_size, self.length_size)
            .with_checksums(self.options.verify_checksums)
    }

    pub(crate) fn materializer(&self) -> Materializer<'_> {
        Materializer::new(self.context(), &self.heap, &self.paths)
    }
}
