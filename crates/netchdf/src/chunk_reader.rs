//! Reading the raw bytes of a section.
//!
//! Contiguous and compact storage go through [`LayoutRegular`]. Chunked
//! storage resolves the chunks covering the section, runs each one back
//! through the filter pipeline and places it with a [`Chunker`]. With the
//! `parallel` feature, chunks are decoded on the rayon pool in batches of at
//! most `max_parallel_chunks`; placement stays sequential so no destination
//! range is shared between workers.

use std::io;

use netchdf_format::{filters, FileContext, FormatError};

use crate::error::Result;
use crate::layout::{Chunker, IndexSpace, LayoutRegular, Merge};
use crate::options::ReadOptions;
use crate::schema::{Storage, StorageLayout, Variable};
use crate::tiled_data::{DataChunk, TiledData};

/// Raw element bytes of `want`, in row-major order.
pub(crate) fn read_raw(ctx: FileContext<'_>, var: &Variable, want: &IndexSpace, options: &ReadOptions) -> Result<Vec<u8>> {
    let storage = &var.storage;
    let elem = storage.elem_size;
    let mut dst = zeroed(byte_count(&want.shape, elem)?)?;
    match &storage.layout {
        StorageLayout::Compact(data) => {
            LayoutRegular::new(0, elem, &var.shape, want).transfer(data, &mut dst)?;
        }
        StorageLayout::Contiguous { address: Some(address) } => {
            LayoutRegular::new(ctx.base + address, elem, &var.shape, want).transfer(ctx.data, &mut dst)?;
        }
        StorageLayout::Contiguous { address: None } => fill(&mut dst, &storage.fill, elem),
        StorageLayout::Chunked { .. } => {
            ChunkReader::new(ctx, var, options).read_into(want, &mut dst)?;
        }
    }
    Ok(dst)
}

/// Bytes held by `shape` elements of `elem` bytes each.
pub(crate) fn byte_count(shape: &[u64], elem: usize) -> Result<usize> {
    shape
        .iter()
        .try_fold(elem, |n, &d| usize::try_from(d).ok().and_then(|d| n.checked_mul(d)))
        .ok_or_else(|| {
            FormatError::InvalidData(format!("{shape:?} elements of {elem} bytes overflow the address space")).into()
        })
}

/// A zeroed buffer. A size the allocator refuses is an error, not an abort.
pub(crate) fn zeroed(len: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|e| io::Error::new(io::ErrorKind::OutOfMemory, e))?;
    buf.resize(len, 0);
    Ok(buf)
}

/// Repeat one fill element over `dst`. An empty fill leaves zeros.
pub(crate) fn fill(dst: &mut [u8], value: &[u8], elem: usize) {
    if value.len() != elem || elem == 0 {
        return;
    }
    for e in dst.chunks_exact_mut(elem) {
        e.copy_from_slice(value);
    }
}

/// Decodes the chunks of one chunked variable.
pub(crate) struct ChunkReader<'f> {
    ctx: FileContext<'f>,
    var: &'f Variable,
    options: &'f ReadOptions,
    chunk: &'f [u64],
}

impl<'f> ChunkReader<'f> {
    pub fn new(ctx: FileContext<'f>, var: &'f Variable, options: &'f ReadOptions) -> Self {
        let chunk = match &var.storage.layout {
            StorageLayout::Chunked { chunk, .. } => chunk.as_slice(),
            _ => &[],
        };
        Self {
            ctx,
            var,
            options,
            chunk,
        }
    }

    fn storage(&self) -> &'f Storage {
        &self.var.storage
    }

    pub fn chunk_shape(&self) -> &'f [u64] {
        self.chunk
    }

    /// Every chunk whose tile intersects `want`, present or missing.
    pub fn chunks(&self, want: &IndexSpace) -> Result<Vec<DataChunk>> {
        let StorageLayout::Chunked { chunk, index } = &self.storage().layout else {
            return Ok(Vec::new());
        };
        let mut tiled = TiledData::new(self.ctx, &self.var.shape, chunk, *index, self.storage().elem_size);
        tiled.find_data_chunks(want)
    }

    /// Unfiltered bytes of one chunk, `None` when it was never written.
    pub fn decode(&self, chunk: &DataChunk) -> Result<Option<Vec<u8>>> {
        let Some(address) = chunk.address else {
            return Ok(None);
        };
        let storage = self.storage();
        let raw = self.ctx.bytes(address, chunk.size as usize)?.to_vec();
        let chunk_bytes = byte_count(self.chunk, storage.elem_size)?;
        let data = match &storage.filters {
            Some(pipeline) if !pipeline.is_empty() => {
                filters::apply(raw, pipeline, chunk.filter_mask, storage.elem_size, chunk_bytes)?
            }
            _ => raw,
        };
        Ok(Some(data))
    }

    /// Decode a batch, on the rayon pool when the options allow it. The
    /// first failure fails the batch.
    pub fn decode_batch(&self, batch: &[DataChunk], parallel: bool) -> Result<Vec<Option<Vec<u8>>>> {
        #[cfg(feature = "parallel")]
        if parallel {
            use rayon::prelude::*;
            return batch.par_iter().map(|c| self.decode(c)).collect();
        }
        #[cfg(not(feature = "parallel"))]
        let _ = parallel;
        batch.iter().map(|c| self.decode(c)).collect()
    }

    /// Move one decoded (or missing) chunk into a destination holding
    /// `want`.
    pub fn place(&self, chunk: &DataChunk, decoded: Option<&[u8]>, want: &IndexSpace, dst: &mut [u8]) -> Result<()> {
        let storage = self.storage();
        let chunker = Chunker::new(&chunk.space(self.chunk), want, Merge::All);
        match decoded {
            Some(data) => chunker.transfer(data, storage.elem_size, dst),
            None => chunker.transfer_missing(&storage.fill, storage.elem_size, dst),
        }
    }

    pub fn read_into(&self, want: &IndexSpace, dst: &mut [u8]) -> Result<()> {
        let chunks = self.chunks(want)?;
        let parallel = self.options.use_parallel(chunks.len());
        let batch_size = if parallel {
            self.options.max_parallel_chunks.max(1)
        } else {
            1
        };
        tracing::debug!(
            variable = %self.var.path,
            chunks = chunks.len(),
            parallel,
            "reading chunks"
        );
        for batch in chunks.chunks(batch_size) {
            let decoded = self.decode_batch(batch, parallel)?;
            for (chunk, data) in batch.iter().zip(&decoded) {
                self.place(chunk, data.as_deref(), want, dst)?;
            }
        }
        Ok(())
    }
}
