//! Byte-level builders for small HDF5 files used by the integration tests.
//!
//! Everything is little-endian with 8-byte offsets and lengths. Structures
//! are appended to a [`Writer`] at 8-byte aligned addresses and the
//! superblock is written last, once the root group address is known.

#![allow(dead_code)]

use netchdf_format::checksum::lookup3;

/// Route `tracing` events to the test harness's captured output.
/// Run with `RUST_LOG=netchdf=debug` to see them.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub const UNDEF: u64 = u64::MAX;
pub const SIGNATURE: [u8; 8] = [0x89, b'H', b'D', b'F', b'\r', b'\n', 0x1a, b'\n'];

// message type ids
pub const DATASPACE: u16 = 0x01;
pub const LINK_INFO: u16 = 0x02;
pub const DATATYPE: u16 = 0x03;
pub const FILL_VALUE_OLD: u16 = 0x04;
pub const FILL_VALUE: u16 = 0x05;
pub const LINK: u16 = 0x06;
pub const LAYOUT: u16 = 0x08;
pub const FILTERS: u16 = 0x0B;
pub const ATTRIBUTE: u16 = 0x0C;
pub const SYMBOL_TABLE: u16 = 0x11;

pub const FILTER_DEFLATE: u16 = 1;
pub const FILTER_SHUFFLE: u16 = 2;
pub const FILTER_FLETCHER32: u16 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Superblock {
    V0,
    V2,
}

impl Superblock {
    fn len(self) -> usize {
        match self {
            Superblock::V0 => 96,
            Superblock::V2 => 48,
        }
    }
}

/// Appends structures and hands back their addresses.
pub struct Writer {
    buf: Vec<u8>,
    superblock: Superblock,
}

impl Writer {
    pub fn new(superblock: Superblock) -> Self {
        Self {
            buf: vec![0; superblock.len()],
            superblock,
        }
    }

    fn align(&mut self) {
        while self.buf.len() % 8 != 0 {
            self.buf.push(0);
        }
    }

    /// Append `bytes` and return their address.
    pub fn put(&mut self, bytes: &[u8]) -> u64 {
        self.align();
        let at = self.buf.len() as u64;
        self.buf.extend_from_slice(bytes);
        at
    }

    /// Address the next [`put`](Self::put) will return.
    pub fn next_address(&self) -> u64 {
        (self.buf.len() as u64 + 7) & !7
    }

    /// Overwrite bytes already written.
    pub fn patch(&mut self, address: u64, bytes: &[u8]) {
        let at = address as usize;
        self.buf[at..at + bytes.len()].copy_from_slice(bytes);
    }

    /// Write the superblock pointing at `root` and return the file.
    pub fn finish(mut self, root: u64) -> Vec<u8> {
        self.align();
        let eof = self.buf.len() as u64;
        let mut sb = SIGNATURE.to_vec();
        match self.superblock {
            Superblock::V0 => {
                // versions, reserved, offset and length sizes
                sb.extend_from_slice(&[0, 0, 0, 0, 0, 8, 8, 0]);
                sb.extend_from_slice(&4u16.to_le_bytes());
                sb.extend_from_slice(&16u16.to_le_bytes());
                sb.extend_from_slice(&0u32.to_le_bytes());
                for a in [0, UNDEF, eof, UNDEF] {
                    sb.extend_from_slice(&a.to_le_bytes());
                }
                sb.extend_from_slice(&0u64.to_le_bytes());
                sb.extend_from_slice(&root.to_le_bytes());
                sb.extend_from_slice(&[0; 24]);
            }
            Superblock::V2 => {
                sb.extend_from_slice(&[2, 8, 8, 0]);
                for a in [0, UNDEF, eof, root] {
                    sb.extend_from_slice(&a.to_le_bytes());
                }
                let sum = lookup3(&sb);
                sb.extend_from_slice(&sum.to_le_bytes());
            }
        }
        assert_eq!(sb.len(), self.superblock.len());
        self.buf[..sb.len()].copy_from_slice(&sb);
        self.buf
    }
}

fn u16le(v: u16) -> [u8; 2] {
    v.to_le_bytes()
}

fn u32le(v: u32) -> [u8; 4] {
    v.to_le_bytes()
}

fn u64le(v: u64) -> [u8; 8] {
    v.to_le_bytes()
}

fn pad8(b: &mut Vec<u8>) {
    while b.len() % 8 != 0 {
        b.push(0);
    }
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// One header message.
#[derive(Debug, Clone)]
pub struct Msg {
    pub kind: u16,
    pub flags: u8,
    pub data: Vec<u8>,
}

pub fn msg(kind: u16, data: Vec<u8>) -> Msg {
    Msg { kind, flags: 0, data }
}

/// A message stored in another object's header.
pub fn shared(kind: u16, address: u64) -> Msg {
    let mut data = vec![3, 2];
    data.extend_from_slice(&u64le(address));
    Msg { kind, flags: 0x02, data }
}

pub fn dataspace(dims: &[u64], max: Option<&[u64]>) -> Vec<u8> {
    let flags = u8::from(max.is_some());
    let mut b = vec![1, dims.len() as u8, flags, 0, 0, 0, 0, 0];
    for &d in dims {
        b.extend_from_slice(&u64le(d));
    }
    if let Some(max) = max {
        for &d in max {
            b.extend_from_slice(&u64le(d));
        }
    }
    b
}

pub fn scalar_space() -> Vec<u8> {
    dataspace(&[], None)
}

pub fn fixed_type(size: u32, signed: bool) -> Vec<u8> {
    let mut b = vec![0x10, if signed { 0x08 } else { 0 }, 0, 0];
    b.extend_from_slice(&u32le(size));
    b.extend_from_slice(&u16le(0));
    b.extend_from_slice(&u16le(size as u16 * 8));
    b
}

pub fn u8_type() -> Vec<u8> {
    fixed_type(1, false)
}

pub fn i32_type() -> Vec<u8> {
    fixed_type(4, true)
}

fn float_type(size: u32, exp_loc: u8, exp_size: u8, man_size: u8, bias: u32) -> Vec<u8> {
    let mut b = vec![0x11, 0x20, size as u8 * 8 - 1, 0];
    b.extend_from_slice(&u32le(size));
    b.extend_from_slice(&u16le(0));
    b.extend_from_slice(&u16le(size as u16 * 8));
    b.extend_from_slice(&[exp_loc, exp_size, 0, man_size]);
    b.extend_from_slice(&u32le(bias));
    b
}

pub fn f32_type() -> Vec<u8> {
    float_type(4, 23, 8, 23, 127)
}

pub fn f64_type() -> Vec<u8> {
    float_type(8, 52, 11, 52, 1023)
}

/// Fixed-length, NUL-terminated ASCII string.
pub fn string_type(size: u32) -> Vec<u8> {
    let mut b = vec![0x13, 0, 0, 0];
    b.extend_from_slice(&u32le(size));
    b
}

pub fn vlen_string_type() -> Vec<u8> {
    let mut b = vec![0x19, 0x01, 0, 0];
    b.extend_from_slice(&u32le(16));
    b.extend_from_slice(&u8_type());
    b
}

pub fn vlen_type(base: &[u8]) -> Vec<u8> {
    let mut b = vec![0x19, 0, 0, 0];
    b.extend_from_slice(&u32le(16));
    b.extend_from_slice(base);
    b
}

pub fn object_ref_type() -> Vec<u8> {
    let mut b = vec![0x17, 0, 0, 0];
    b.extend_from_slice(&u32le(8));
    b
}

/// One-byte enumeration, version 3 encoding.
pub fn enum_u8_type(members: &[(&str, u8)]) -> Vec<u8> {
    let n = members.len() as u16;
    let mut b = vec![0x38, n as u8, (n >> 8) as u8, 0];
    b.extend_from_slice(&u32le(1));
    b.extend_from_slice(&u8_type());
    for (name, _) in members {
        b.extend_from_slice(name.as_bytes());
        b.push(0);
    }
    for (_, v) in members {
        b.push(*v);
    }
    b
}

/// Version 3 compound of `(name, offset, member type)`.
pub fn compound_type(size: u32, members: &[(&str, u32, Vec<u8>)]) -> Vec<u8> {
    let n = members.len() as u16;
    let mut b = vec![0x36, n as u8, (n >> 8) as u8, 0];
    b.extend_from_slice(&u32le(size));
    let width = if size < 256 { 1 } else if size < 65536 { 2 } else { 4 };
    for (name, offset, dt) in members {
        b.extend_from_slice(name.as_bytes());
        b.push(0);
        b.extend_from_slice(&offset.to_le_bytes()[..width]);
        b.extend_from_slice(dt);
    }
    b
}

pub fn compact_layout(data: &[u8]) -> Vec<u8> {
    let mut b = vec![3, 0];
    b.extend_from_slice(&u16le(data.len() as u16));
    b.extend_from_slice(data);
    b
}

pub fn contiguous_layout(address: u64, size: u64) -> Vec<u8> {
    let mut b = vec![3, 1];
    b.extend_from_slice(&u64le(address));
    b.extend_from_slice(&u64le(size));
    b
}

/// Version 3 chunked layout indexed by a v1 B-tree.
pub fn chunked_layout(btree: u64, chunk: &[u32], elem_size: u32) -> Vec<u8> {
    let mut b = vec![3, 2, chunk.len() as u8 + 1];
    b.extend_from_slice(&u64le(btree));
    for &c in chunk {
        b.extend_from_slice(&u32le(c));
    }
    b.extend_from_slice(&u32le(elem_size));
    b
}

/// Version 4 chunked layout holding one unfiltered chunk.
pub fn single_chunk_layout(address: u64, chunk: &[u32], elem_size: u32) -> Vec<u8> {
    let mut b = vec![4, 2, 0, chunk.len() as u8 + 1, 4];
    for &c in chunk {
        b.extend_from_slice(&u32le(c));
    }
    b.extend_from_slice(&u32le(elem_size));
    b.push(1);
    b.extend_from_slice(&u64le(address));
    b
}

/// Version 4 layout with an index this reader does not implement.
pub fn fixed_array_layout(address: u64, chunk: &[u32], elem_size: u32) -> Vec<u8> {
    let mut b = vec![4, 2, 0, chunk.len() as u8 + 1, 4];
    for &c in chunk {
        b.extend_from_slice(&u32le(c));
    }
    b.extend_from_slice(&u32le(elem_size));
    b.extend_from_slice(&[3, 10]);
    b.extend_from_slice(&u64le(address));
    b
}

pub fn fill_value(value: &[u8]) -> Vec<u8> {
    let mut b = vec![2, 2, 2, 1];
    b.extend_from_slice(&u32le(value.len() as u32));
    b.extend_from_slice(value);
    b
}

/// Version 2 pipeline of `(id, client data)`.
pub fn filters(list: &[(u16, Vec<u32>)]) -> Vec<u8> {
    let mut b = vec![2, list.len() as u8];
    for (id, values) in list {
        b.extend_from_slice(&u16le(*id));
        b.extend_from_slice(&u16le(0));
        b.extend_from_slice(&u16le(values.len() as u16));
        for v in values {
            b.extend_from_slice(&u32le(*v));
        }
    }
    b
}

/// Version 1 attribute message.
pub fn attribute(name: &str, dt: &[u8], space: &[u8], data: &[u8]) -> Vec<u8> {
    let mut b = vec![1, 0];
    b.extend_from_slice(&u16le(name.len() as u16 + 1));
    b.extend_from_slice(&u16le(dt.len() as u16));
    b.extend_from_slice(&u16le(space.len() as u16));
    b.extend_from_slice(name.as_bytes());
    b.push(0);
    pad8(&mut b);
    b.extend_from_slice(dt);
    pad8(&mut b);
    b.extend_from_slice(space);
    pad8(&mut b);
    b.extend_from_slice(data);
    b
}

/// Scalar fixed-length string attribute.
pub fn string_attribute(name: &str, value: &str) -> Msg {
    let size = value.len() as u32 + 1;
    let mut data = value.as_bytes().to_vec();
    data.push(0);
    msg(ATTRIBUTE, attribute(name, &string_type(size), &scalar_space(), &data))
}

pub fn i32_attribute(name: &str, values: &[i32]) -> Msg {
    let data: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
    msg(
        ATTRIBUTE,
        attribute(name, &i32_type(), &dataspace(&[values.len() as u64], None), &data),
    )
}

pub fn symbol_table(btree: u64, heap: u64) -> Vec<u8> {
    let mut b = u64le(btree).to_vec();
    b.extend_from_slice(&u64le(heap));
    b
}

fn link_head(name: &str, kind: Option<u8>, order: Option<u64>) -> Vec<u8> {
    let mut flags = 0u8;
    if kind.is_some() {
        flags |= 0x08;
    }
    if order.is_some() {
        flags |= 0x04;
    }
    let mut b = vec![1, flags];
    if let Some(k) = kind {
        b.push(k);
    }
    if let Some(o) = order {
        b.extend_from_slice(&u64le(o));
    }
    b.push(name.len() as u8);
    b.extend_from_slice(name.as_bytes());
    b
}

pub fn hard_link(name: &str, address: u64) -> Vec<u8> {
    let mut b = link_head(name, None, None);
    b.extend_from_slice(&u64le(address));
    b
}

pub fn ordered_hard_link(name: &str, address: u64, order: u64) -> Vec<u8> {
    let mut b = link_head(name, None, Some(order));
    b.extend_from_slice(&u64le(address));
    b
}

pub fn soft_link(name: &str, target: &str) -> Vec<u8> {
    let mut b = link_head(name, Some(1), None);
    b.extend_from_slice(&u16le(target.len() as u16));
    b.extend_from_slice(target.as_bytes());
    b
}

pub fn link_info(heap: u64, name_index: u64) -> Vec<u8> {
    let mut b = vec![0, 0];
    b.extend_from_slice(&u64le(heap));
    b.extend_from_slice(&u64le(name_index));
    b
}

// ---------------------------------------------------------------------------
// Object headers
// ---------------------------------------------------------------------------

pub fn v1_header(messages: &[Msg]) -> Vec<u8> {
    let mut body = Vec::new();
    for m in messages {
        body.extend_from_slice(&u16le(m.kind));
        body.extend_from_slice(&u16le(m.data.len() as u16));
        body.extend_from_slice(&[m.flags, 0, 0, 0]);
        body.extend_from_slice(&m.data);
    }
    let mut b = vec![1, 0];
    b.extend_from_slice(&u16le(messages.len() as u16));
    b.extend_from_slice(&u32le(1));
    b.extend_from_slice(&u32le(body.len() as u32));
    b.extend_from_slice(&[0; 4]);
    b.extend_from_slice(&body);
    b
}

/// Version 2 header with a four-byte chunk size and a valid checksum.
pub fn v2_header(messages: &[Msg]) -> Vec<u8> {
    let mut body = Vec::new();
    for m in messages {
        body.push(m.kind as u8);
        body.extend_from_slice(&u16le(m.data.len() as u16));
        body.push(m.flags);
        body.extend_from_slice(&m.data);
    }
    let mut b = b"OHDR".to_vec();
    b.extend_from_slice(&[2, 0x02]);
    b.extend_from_slice(&u32le(body.len() as u32));
    b.extend_from_slice(&body);
    let sum = lookup3(&b);
    b.extend_from_slice(&u32le(sum));
    b
}

/// Dataset with a v1 header.
pub fn dataset(w: &mut Writer, dt: &[u8], dims: &[u64], layout: Vec<u8>, extra: Vec<Msg>) -> u64 {
    let mut messages = vec![
        msg(DATASPACE, dataspace(dims, None)),
        msg(DATATYPE, dt.to_vec()),
        msg(LAYOUT, layout),
    ];
    messages.extend(extra);
    w.put(&v1_header(&messages))
}

/// Contiguous dataset whose raw bytes are `data`.
pub fn contiguous(w: &mut Writer, dt: &[u8], dims: &[u64], data: &[u8], extra: Vec<Msg>) -> u64 {
    let address = w.put(data);
    dataset(w, dt, dims, contiguous_layout(address, data.len() as u64), extra)
}

// ---------------------------------------------------------------------------
// Groups
// ---------------------------------------------------------------------------

pub enum Entry<'a> {
    Hard(&'a str, u64),
    Soft(&'a str, &'a str),
}

/// Symbol-table group: local heap, one symbol table node and a one-leaf
/// group B-tree. Returns the group's header address.
pub fn v0_group(w: &mut Writer, entries: &[Entry<'_>], extra: Vec<Msg>) -> u64 {
    // offset 0 holds the empty string
    let mut heap = vec![0u8; 8];
    let mut offsets = Vec::with_capacity(entries.len());
    let mut intern = |heap: &mut Vec<u8>, s: &str| -> u64 {
        let at = heap.len() as u64;
        heap.extend_from_slice(s.as_bytes());
        heap.push(0);
        pad8(heap);
        at
    };
    for e in entries {
        match e {
            Entry::Hard(name, _) => offsets.push((intern(&mut heap, name), None)),
            Entry::Soft(name, target) => {
                let n = intern(&mut heap, name);
                let t = intern(&mut heap, target);
                offsets.push((n, Some(t)));
            }
        }
    }
    let data = w.put(&heap);
    let mut h = b"HEAP".to_vec();
    h.extend_from_slice(&[0, 0, 0, 0]);
    h.extend_from_slice(&u64le(heap.len() as u64));
    h.extend_from_slice(&u64le(UNDEF));
    h.extend_from_slice(&u64le(data));
    let heap_address = w.put(&h);

    let mut snod = b"SNOD".to_vec();
    snod.extend_from_slice(&[1, 0]);
    snod.extend_from_slice(&u16le(entries.len() as u16));
    for (e, (name, soft)) in entries.iter().zip(&offsets) {
        snod.extend_from_slice(&u64le(*name));
        match (e, soft) {
            (Entry::Hard(_, address), _) => {
                snod.extend_from_slice(&u64le(*address));
                snod.extend_from_slice(&u32le(0));
                snod.extend_from_slice(&[0; 20]);
            }
            (Entry::Soft(..), Some(target)) => {
                snod.extend_from_slice(&u64le(UNDEF));
                snod.extend_from_slice(&u32le(2));
                snod.extend_from_slice(&[0; 4]);
                snod.extend_from_slice(&u32le(*target as u32));
                snod.extend_from_slice(&[0; 12]);
            }
            (Entry::Soft(..), None) => unreachable!(),
        }
    }
    let snod_address = w.put(&snod);

    let last = offsets.last().map_or(0, |(n, _)| *n);
    let mut tree = b"TREE".to_vec();
    tree.extend_from_slice(&[0, 0]);
    tree.extend_from_slice(&u16le(1));
    tree.extend_from_slice(&u64le(UNDEF));
    tree.extend_from_slice(&u64le(UNDEF));
    tree.extend_from_slice(&u64le(0));
    tree.extend_from_slice(&u64le(snod_address));
    tree.extend_from_slice(&u64le(last));
    let tree_address = w.put(&tree);

    let mut messages = vec![msg(SYMBOL_TABLE, symbol_table(tree_address, heap_address))];
    messages.extend(extra);
    w.put(&v1_header(&messages))
}

/// Group with compact link messages in a v2 header.
pub fn v2_group(w: &mut Writer, links: Vec<Vec<u8>>, extra: Vec<Msg>) -> u64 {
    let mut messages: Vec<Msg> = links.into_iter().map(|l| msg(LINK, l)).collect();
    messages.extend(extra);
    w.put(&v2_header(&messages))
}

/// Group whose links live in a fractal heap indexed by a v2 B-tree. Each
/// link is stored as a tiny heap object, so link messages must fit in 16
/// bytes (a hard link name of at most five characters).
pub fn dense_group(w: &mut Writer, links: &[Vec<u8>]) -> u64 {
    const ID_LEN: usize = 17;
    let mut ids = Vec::with_capacity(links.len());
    for l in links {
        assert!(!l.is_empty() && l.len() <= ID_LEN - 1, "link too long for a tiny id");
        let mut id = vec![0x20 | (l.len() as u8 - 1)];
        id.extend_from_slice(l);
        id.resize(ID_LEN, 0);
        ids.push(id);
    }

    let mut heap = b"FRHP".to_vec();
    heap.push(0);
    heap.extend_from_slice(&u16le(ID_LEN as u16));
    heap.extend_from_slice(&u16le(0));
    heap.push(0);
    heap.extend_from_slice(&u32le(4096));
    for v in [0, UNDEF, 0, UNDEF, 0, 0, 0, 0, 0, 0] {
        heap.extend_from_slice(&u64le(v));
    }
    heap.extend_from_slice(&u64le(links.iter().map(|l| l.len() as u64).sum()));
    heap.extend_from_slice(&u64le(links.len() as u64));
    heap.extend_from_slice(&u16le(4));
    heap.extend_from_slice(&u64le(512));
    heap.extend_from_slice(&u64le(65536));
    heap.extend_from_slice(&u16le(32));
    heap.extend_from_slice(&u16le(0));
    heap.extend_from_slice(&u64le(UNDEF));
    heap.extend_from_slice(&u16le(0));
    let sum = lookup3(&heap);
    heap.extend_from_slice(&u32le(sum));
    let heap_address = w.put(&heap);

    let record_size = 4 + ID_LEN as u16;
    let mut leaf = b"BTLF".to_vec();
    leaf.extend_from_slice(&[0, 5]);
    for (i, id) in ids.iter().enumerate() {
        leaf.extend_from_slice(&u32le(i as u32));
        leaf.extend_from_slice(id);
    }
    let sum = lookup3(&leaf);
    leaf.extend_from_slice(&u32le(sum));
    let leaf_address = w.put(&leaf);

    let mut tree = b"BTHD".to_vec();
    tree.extend_from_slice(&[0, 5]);
    tree.extend_from_slice(&u32le(512));
    tree.extend_from_slice(&u16le(record_size));
    tree.extend_from_slice(&u16le(0));
    tree.extend_from_slice(&[100, 40]);
    tree.extend_from_slice(&u64le(leaf_address));
    tree.extend_from_slice(&u16le(links.len() as u16));
    tree.extend_from_slice(&u64le(links.len() as u64));
    let sum = lookup3(&tree);
    tree.extend_from_slice(&u32le(sum));
    let tree_address = w.put(&tree);

    w.put(&v2_header(&[msg(LINK_INFO, link_info(heap_address, tree_address))]))
}

// ---------------------------------------------------------------------------
// Chunk index and global heap
// ---------------------------------------------------------------------------

/// One stored chunk: tile origin, address, stored size and filter mask.
pub struct ChunkRef {
    pub origin: Vec<u64>,
    pub address: u64,
    pub size: u32,
    pub mask: u32,
}

/// Leaf of a chunk B-tree. `end` is the key past the last chunk.
pub fn chunk_btree(w: &mut Writer, chunks: &[ChunkRef], end: &[u64]) -> u64 {
    let mut b = b"TREE".to_vec();
    b.extend_from_slice(&[1, 0]);
    b.extend_from_slice(&u16le(chunks.len() as u16));
    b.extend_from_slice(&u64le(UNDEF));
    b.extend_from_slice(&u64le(UNDEF));
    for c in chunks {
        b.extend_from_slice(&u32le(c.size));
        b.extend_from_slice(&u32le(c.mask));
        for &o in &c.origin {
            b.extend_from_slice(&u64le(o));
        }
        b.extend_from_slice(&u64le(0));
        b.extend_from_slice(&u64le(c.address));
    }
    b.extend_from_slice(&u32le(0));
    b.extend_from_slice(&u32le(0));
    for &o in end {
        b.extend_from_slice(&u64le(o));
    }
    b.extend_from_slice(&u64le(0));
    w.put(&b)
}

/// Store each chunk and index them; `chunks` pairs tile origins with
/// stored bytes.
pub fn chunked_data(w: &mut Writer, chunks: &[(Vec<u64>, Vec<u8>)], end: &[u64]) -> u64 {
    let refs: Vec<ChunkRef> = chunks
        .iter()
        .map(|(origin, bytes)| ChunkRef {
            origin: origin.clone(),
            address: w.put(bytes),
            size: bytes.len() as u32,
            mask: 0,
        })
        .collect();
    chunk_btree(w, &refs, end)
}

/// Global heap collection holding `objects` at indexes 1, 2, ...
pub fn global_heap(w: &mut Writer, objects: &[Vec<u8>]) -> u64 {
    let mut b = b"GCOL".to_vec();
    b.extend_from_slice(&[1, 0, 0, 0]);
    b.extend_from_slice(&u64le(0));
    for (i, o) in objects.iter().enumerate() {
        b.extend_from_slice(&u16le(i as u16 + 1));
        b.extend_from_slice(&u16le(1));
        b.extend_from_slice(&[0; 4]);
        b.extend_from_slice(&u64le(o.len() as u64));
        b.extend_from_slice(o);
        pad8(&mut b);
    }
    // free space object
    let used = b.len() + 16;
    let total = used.max(4096);
    b.extend_from_slice(&u16le(0));
    b.extend_from_slice(&[0; 6]);
    b.extend_from_slice(&u64le((total - b.len() - 8) as u64));
    b.resize(total, 0);
    let len = b.len() as u64;
    b[8..16].copy_from_slice(&u64le(len));
    w.put(&b)
}

/// Variable-length element pointing at object `index` of `collection`.
pub fn vlen_element(count: u32, collection: u64, index: u32) -> Vec<u8> {
    let mut b = u32le(count).to_vec();
    b.extend_from_slice(&u64le(collection));
    b.extend_from_slice(&u32le(index));
    b
}
