//! Streaming a section of a variable as bounded pieces.

use std::collections::VecDeque;

use crate::chunk_reader::{byte_count, read_raw, zeroed, ChunkReader};
use crate::error::Result;
use crate::layout::{Chunker, IndexSpace, MaxChunker, Merge};
use crate::schema::Variable;
use crate::section::{ArraySection, Section};
use crate::tiled_data::DataChunk;
use crate::Hdf5File;

fn to_section(file: &Hdf5File, var: &Variable, space: &IndexSpace, bytes: &[u8]) -> Result<ArraySection> {
    let shape: Vec<usize> = space.shape.iter().map(|&d| d as usize).collect();
    let array = file.materializer().materialize(bytes, &shape, &var.datatype)?;
    Ok(ArraySection {
        array,
        section: Section::from(space),
    })
}

enum Source<'f> {
    /// Chunk by chunk, in tile order.
    Chunked {
        reader: ChunkReader<'f>,
        chunks: std::vec::IntoIter<DataChunk>,
        batch: usize,
        parallel: bool,
    },
    /// Contiguous and compact storage, split by element count.
    Regular { pieces: MaxChunker },
}

/// Iterator over the pieces of one read, created by
/// [`Hdf5File::chunk_iterator`].
///
/// Every piece holds at most the requested number of elements, except that
/// a stored chunk lying wholly inside the section and no larger than the
/// limit is yielded as is. Pieces never overlap and together cover the
/// section. After an error the iterator is exhausted.
pub struct ChunkIter<'f> {
    file: &'f Hdf5File,
    var: &'f Variable,
    want: IndexSpace,
    max_elems: usize,
    source: Source<'f>,
    pending: VecDeque<ArraySection>,
    done: bool,
}

impl<'f> ChunkIter<'f> {
    pub(crate) fn new(file: &'f Hdf5File, var: &'f Variable, want: IndexSpace, max_elems: usize) -> Result<Self> {
        let options = file.options();
        let source = if var.is_chunked() && !want.is_empty() {
            let reader = ChunkReader::new(file.context(), var, options);
            let chunks = reader.chunks(&want)?;
            let parallel = options.use_parallel(chunks.len());
            let batch = if parallel {
                options.max_parallel_chunks.max(1)
            } else {
                1
            };
            Source::Chunked {
                reader,
                chunks: chunks.into_iter(),
                batch,
                parallel,
            }
        } else {
            Source::Regular {
                pieces: MaxChunker::new(max_elems, &want),
            }
        };
        Ok(Self {
            file,
            var,
            want,
            max_elems: max_elems.max(1),
            source,
            pending: VecDeque::new(),
            done: false,
        })
    }

    /// Queue the next pieces. `false` when the source is exhausted.
    fn refill(&mut self) -> Result<bool> {
        let (file, var) = (self.file, self.var);
        let elem = var.storage.elem_size;
        match &mut self.source {
            Source::Regular { pieces } => {
                let Some(piece) = pieces.next() else {
                    return Ok(false);
                };
                let bytes = read_raw(file.context(), var, &piece, file.options())?;
                let section = to_section(file, var, &piece, &bytes)?;
                self.pending.push_back(section);
                Ok(true)
            }
            Source::Chunked {
                reader,
                chunks,
                batch,
                parallel,
            } => {
                let batch: Vec<DataChunk> = chunks.by_ref().take(*batch).collect();
                if batch.is_empty() {
                    return Ok(false);
                }
                let decoded = reader.decode_batch(&batch, *parallel)?;
                let chunk_shape = reader.chunk_shape().to_vec();
                let fill = &var.storage.fill;
                let mut out = Vec::new();
                for (chunk, data) in batch.iter().zip(&decoded) {
                    let space = chunk.space(&chunk_shape);
                    if let Some(data) = data {
                        let n = space.total_elements() as usize;
                        if self.want.contains(&space) && n <= self.max_elems && data.len() >= n * elem {
                            out.push(to_section(file, var, &space, &data[..n * elem])?);
                            continue;
                        }
                    }
                    let inter = self.want.intersect(&space);
                    if inter.is_empty() {
                        continue;
                    }
                    for piece in MaxChunker::new(self.max_elems, &inter) {
                        let mut dst = zeroed(byte_count(&piece.shape, elem)?)?;
                        let chunker = Chunker::new(&space, &piece, Merge::All);
                        match data {
                            Some(data) => chunker.transfer(data, elem, &mut dst)?,
                            None => chunker.transfer_missing(fill, elem, &mut dst)?,
                        }
                        out.push(to_section(file, var, &piece, &dst)?);
                    }
                }
                self.pending.extend(out);
                Ok(true)
            }
        }
    }
}

impl Iterator for ChunkIter<'_> {
    type Item = Result<ArraySection>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(section) = self.pending.pop_front() {
                return Some(Ok(section));
            }
            if self.done {
                return None;
            }
            match self.refill() {
                Ok(true) => {}
                Ok(false) => {
                    self.done = true;
                    return None;
                }
                Err(e) => {
                    self.done = true;
                    self.pending.clear();
                    return Some(Err(e));
                }
            }
        }
    }
}
