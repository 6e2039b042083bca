//! Variable-length data.
//!
//! A vlen element on disk is `sequence length (u32 LE) + global heap id`,
//! where the heap id is a collection address followed by a 4-byte object
//! index. The payload lives in the global heap collection.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use netchdf_format::global_heap::{GlobalHeapCollection, GlobalHeapId};
use netchdf_format::FileContext;
use netchdf_io::{ByteSource, ReadState};

use crate::error::Result;

/// Size of one vlen element record.
pub(crate) fn element_size(offset_size: u8) -> usize {
    4 + GlobalHeapId::size(offset_size)
}

/// A parsed vlen element record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct VlenRef {
    /// Number of base elements in the sequence.
    pub length: u32,
    pub id: GlobalHeapId,
}

impl VlenRef {
    pub fn parse(data: &[u8], pos: usize, offset_size: u8) -> Result<VlenRef> {
        let mut state = ReadState::new(pos as u64);
        let length = data.read_u32(&mut state)?;
        let id = GlobalHeapId::parse(data, state.pos as usize, offset_size)?;
        Ok(VlenRef { length, id })
    }
}

/// Global heap collections keyed by address.
///
/// Shared by every read of one file; collections are parsed on first use.
#[derive(Debug, Default)]
pub(crate) struct HeapCache {
    collections: Mutex<HashMap<u64, Arc<GlobalHeapCollection>>>,
}

impl HeapCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn collection(&self, ctx: &FileContext<'_>, address: u64) -> Result<Arc<GlobalHeapCollection>> {
        if let Some(c) = self.lock().get(&address) {
            return Ok(Arc::clone(c));
        }
        // parse outside the lock; a racing reader may parse the same one
        let parsed = Arc::new(GlobalHeapCollection::parse(ctx, address)?);
        tracing::debug!(address, objects = parsed.objects.len(), "global heap collection");
        Ok(Arc::clone(self.lock().entry(address).or_insert(parsed)))
    }

    /// Bytes of one heap object. A null collection address is an empty
    /// value.
    pub fn get(&self, ctx: &FileContext<'_>, id: GlobalHeapId) -> Result<Vec<u8>> {
        match id.collection {
            None => Ok(Vec::new()),
            Some(address) => Ok(self.collection(ctx, address)?.get(id.index)?.to_vec()),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u64, Arc<GlobalHeapCollection>>> {
        self.collections.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
