//! HDF5 Global Heap collection parsing.

use std::collections::BTreeMap;

use crate::error::FormatError;
use crate::record::RecordReader;
use crate::FileContext;

/// Locator of one global heap object, as stored in vlen data and references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GlobalHeapId {
    /// Collection address; `None` for a null (empty) value.
    pub collection: Option<u64>,
    pub index: u32,
}

impl GlobalHeapId {
    /// Size on disk: an address and a 4-byte index.
    pub fn size(offset_size: u8) -> usize {
        offset_size as usize + 4
    }

    pub fn parse(data: &[u8], pos: usize, offset_size: u8) -> Result<GlobalHeapId, FormatError> {
        let rec = RecordReader::new("global heap id", data, pos)
            .sizes(offset_size, 8)
            .offset("collection")?
            .field("index", 4)?
            .finish();
        let collection = rec.address("collection")?.filter(|&a| a != 0);
        Ok(GlobalHeapId {
            collection,
            index: rec.u32("index")?,
        })
    }
}

/// A parsed `GCOL` collection: object index to bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalHeapCollection {
    pub address: u64,
    /// Total size of this collection including header.
    pub collection_size: u64,
    pub objects: BTreeMap<u16, Vec<u8>>,
}

impl GlobalHeapCollection {
    pub fn parse(ctx: &FileContext<'_>, address: u64) -> Result<GlobalHeapCollection, FormatError> {
        let head = ctx
            .reader("global heap", address)?
            .magic("GCOL")?
            .field("version", 1)?
            .skip(3)?
            .length("size")?
            .finish();
        let version = head.u8("version")?;
        if version != 1 {
            return Err(FormatError::InvalidMessageVersion {
                message: "global heap",
                version,
            });
        }
        let collection_size = head.uint("size")?;
        let limit = (head.start() as u64)
            .saturating_add(collection_size)
            .min(ctx.data.len() as u64) as usize;

        let ls = ctx.length_size as usize;
        let object_header = 8 + ls;
        let mut objects = BTreeMap::new();
        let mut pos = head.end();
        while pos + object_header <= limit {
            let rec = RecordReader::new("global heap object", ctx.data, pos)
                .sizes(ctx.offset_size, ctx.length_size)
                .field("index", 2)?
                .field("refcount", 2)?
                .skip(4)?
                .length("size")?
                .finish();
            let index = rec.u16("index")?;
            // index 0 is the free space that ends the collection
            if index == 0 {
                break;
            }
            let size = rec.uint("size")? as usize;
            let data = RecordReader::new("global heap object", ctx.data, rec.end())
                .field("data", size)?
                .pad_to(8)?
                .finish();
            objects.insert(index, data.bytes("data")?.to_vec());
            pos = data.end();
        }
        tracing::trace!(address, objects = objects.len(), "parsed global heap collection");

        Ok(GlobalHeapCollection {
            address,
            collection_size,
            objects,
        })
    }

    pub fn get(&self, index: u32) -> Result<&[u8], FormatError> {
        u16::try_from(index)
            .ok()
            .and_then(|i| self.objects.get(&i))
            .map(Vec::as_slice)
            .ok_or(FormatError::HeapObjectNotFound {
                heap: self.address,
                id: index as u64,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collection(objects: &[(u16, &[u8])]) -> Vec<u8> {
        let mut b = b"GCOL".to_vec();
        b.extend_from_slice(&[1, 0, 0, 0]);
        b.extend_from_slice(&4096u64.to_le_bytes());
        for (idx, data) in objects {
            b.extend_from_slice(&idx.to_le_bytes());
            b.extend_from_slice(&1u16.to_le_bytes());
            b.extend_from_slice(&[0; 4]);
            b.extend_from_slice(&(data.len() as u64).to_le_bytes());
            b.extend_from_slice(data);
            while b.len() % 8 != 0 {
                b.push(0);
            }
        }
        b.extend_from_slice(&[0; 16]);
        b.resize(4096, 0);
        b
    }

    #[test]
    fn objects_by_index() {
        let data = collection(&[(1, b"hello"), (2, b"a longer value!")]);
        let ctx = FileContext::new(&data, 0, 8, 8);
        let heap = GlobalHeapCollection::parse(&ctx, 0).unwrap();
        assert_eq!(heap.get(1).unwrap(), b"hello");
        assert_eq!(heap.get(2).unwrap(), b"a longer value!");
        assert_eq!(
            heap.get(3),
            Err(FormatError::HeapObjectNotFound { heap: 0, id: 3 })
        );
    }

    #[test]
    fn heap_id_null_collection() {
        let mut b = 0u64.to_le_bytes().to_vec();
        b.extend_from_slice(&0u32.to_le_bytes());
        let id = GlobalHeapId::parse(&b, 0, 8).unwrap();
        assert_eq!(id.collection, None);

        let mut b = 512u32.to_le_bytes().to_vec();
        b.extend_from_slice(&7u32.to_le_bytes());
        let id = GlobalHeapId::parse(&b, 0, 4).unwrap();
        assert_eq!(id, GlobalHeapId { collection: Some(512), index: 7 });
        assert_eq!(GlobalHeapId::size(4), 8);
    }
}
