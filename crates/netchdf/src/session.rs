//! Open-time decoding state.
//!
//! A [`DecodeSession`] owns every cache used while a file is opened: parsed
//! object headers, global heap collections and the typedef registry. Phase
//! one ([`walk`](DecodeSession::walk)) follows links from the root with an
//! address-keyed work list and records every group, dataset and committed
//! datatype in a flat arena. Shared messages are left as pointers; phase two
//! (the schema builder) resolves them against the cached headers.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use netchdf_format::attribute::AttributeMessage;
use netchdf_format::attribute_info::AttributeInfo;
use netchdf_format::btree_v1;
use netchdf_format::btree_v2::BTreeV2;
use netchdf_format::dataspace::Dataspace;
use netchdf_format::datatype::Datatype;
use netchdf_format::fractal_heap::FractalHeap;
use netchdf_format::link::{Link, LinkInfo, LinkTarget};
use netchdf_format::local_heap::LocalHeap;
use netchdf_format::message::{Message, Shareable};
use netchdf_format::message_type::MessageType;
use netchdf_format::object_header::ObjectHeader;
use netchdf_format::symbol_table::SymbolTableMessage;
use netchdf_format::{FileContext, FormatError};

use crate::error::Result;
use crate::typedef::{GroupId, TypedefRegistry};
use crate::vlen::HeapCache;

/// What a hard link points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ObjectKind {
    Group(GroupId),
    Dataset,
    /// A committed (named) datatype.
    Datatype,
}

/// One link of a group, resolved to an object header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Member {
    pub name: String,
    pub path: String,
    pub address: u64,
    pub kind: ObjectKind,
}

#[derive(Debug, Clone)]
pub(crate) struct GroupNode {
    pub name: String,
    pub path: String,
    pub address: u64,
    pub parent: Option<GroupId>,
    pub children: Vec<GroupId>,
    pub members: Vec<Member>,
}

fn join(parent: &str, name: &str) -> String {
    if parent.ends_with('/') {
        format!("{parent}{name}")
    } else {
        format!("{parent}/{name}")
    }
}

pub(crate) struct DecodeSession<'a> {
    pub ctx: FileContext<'a>,
    headers: HashMap<u64, Arc<ObjectHeader>>,
    /// Groups in discovery order; a parent always precedes its children.
    pub groups: Vec<GroupNode>,
    /// First path found for each object header.
    pub paths: HashMap<u64, String>,
    by_path: HashMap<String, u64>,
    pub heap: HeapCache,
    pub registry: TypedefRegistry,
}

impl<'a> DecodeSession<'a> {
    pub fn new(ctx: FileContext<'a>) -> Self {
        Self {
            ctx,
            headers: HashMap::new(),
            groups: Vec::new(),
            paths: HashMap::new(),
            by_path: HashMap::new(),
            heap: HeapCache::new(),
            registry: TypedefRegistry::default(),
        }
    }

    /// The header at `address`, parsed once per session.
    pub fn object_header(&mut self, address: u64) -> Result<Arc<ObjectHeader>> {
        if let Some(h) = self.headers.get(&address) {
            return Ok(Arc::clone(h));
        }
        let header = Arc::new(ObjectHeader::parse(&self.ctx, address)?);
        self.headers.insert(address, Arc::clone(&header));
        Ok(header)
    }

    pub fn header_count(&self) -> usize {
        self.headers.len()
    }

    /// Phase one: discover every object reachable from the root group.
    pub fn walk(&mut self, root: u64) -> Result<()> {
        self.object_header(root)?;
        self.groups.push(GroupNode {
            name: String::new(),
            path: "/".into(),
            address: root,
            parent: None,
            children: Vec::new(),
            members: Vec::new(),
        });
        self.paths.insert(root, "/".into());
        self.by_path.insert("/".into(), root);

        let mut group_of: HashMap<u64, GroupId> = HashMap::from([(root, 0)]);
        let mut work: VecDeque<GroupId> = VecDeque::from([0]);
        let mut soft: Vec<(GroupId, String, String)> = Vec::new();

        while let Some(gid) = work.pop_front() {
            let address = self.groups[gid].address;
            let header = self.object_header(address)?;
            let links = match self.links(&header) {
                Ok(links) => links,
                Err(e) if gid != 0 => {
                    tracing::warn!(path = %self.groups[gid].path, error = %e, "skipping unreadable group links");
                    continue;
                }
                Err(e) => return Err(e),
            };
            for link in links {
                match link.target {
                    LinkTarget::Hard(target) => {
                        self.add_member(gid, link.name, target, &mut group_of, &mut work);
                    }
                    LinkTarget::Soft(path) => soft.push((gid, link.name, path)),
                    LinkTarget::External { file, object } => {
                        tracing::warn!(
                            name = %link.name,
                            file = %file,
                            object = %object,
                            "skipping external link"
                        );
                    }
                    LinkTarget::Other(kind) => {
                        tracing::warn!(name = %link.name, kind, "skipping user-defined link");
                    }
                }
            }
        }

        // soft links resolve against the finished walk, so targets found
        // later in the traversal still count
        for (gid, name, target) in soft {
            let full = if target.starts_with('/') {
                target.clone()
            } else {
                join(&self.groups[gid].path, &target)
            };
            match self.by_path.get(&full).copied() {
                Some(address) if group_of.contains_key(&address) => {
                    tracing::warn!(
                        group = %self.groups[gid].path,
                        name = %name,
                        target = %target,
                        "soft link to a group is not followed"
                    );
                }
                Some(address) => {
                    let mut none = VecDeque::new();
                    self.add_member(gid, name, address, &mut group_of, &mut none);
                }
                None => {
                    tracing::warn!(
                        group = %self.groups[gid].path,
                        name = %name,
                        target = %target,
                        "soft link target not found"
                    );
                }
            }
        }
        tracing::debug!(
            groups = self.groups.len(),
            headers = self.headers.len(),
            "walked object graph"
        );
        Ok(())
    }

    fn add_member(
        &mut self,
        gid: GroupId,
        name: String,
        address: u64,
        group_of: &mut HashMap<u64, GroupId>,
        work: &mut VecDeque<GroupId>,
    ) {
        let path = join(&self.groups[gid].path, &name);
        if group_of.contains_key(&address) {
            tracing::warn!(path = %path, address, "group already linked elsewhere; skipping to avoid a loop");
            return;
        }
        let header = match self.object_header(address) {
            Ok(h) => h,
            Err(e) => {
                tracing::warn!(path = %path, address, error = %e, "skipping unreadable object");
                return;
            }
        };
        let kind = if header.find(MessageType::DataLayout).is_some() {
            ObjectKind::Dataset
        } else if header.find(MessageType::Datatype).is_some() {
            ObjectKind::Datatype
        } else {
            let child = self.groups.len();
            self.groups.push(GroupNode {
                name: name.clone(),
                path: path.clone(),
                address,
                parent: Some(gid),
                children: Vec::new(),
                members: Vec::new(),
            });
            self.groups[gid].children.push(child);
            group_of.insert(address, child);
            work.push_back(child);
            ObjectKind::Group(child)
        };
        self.paths.entry(address).or_insert_with(|| path.clone());
        self.by_path.insert(path.clone(), address);
        self.groups[gid].members.push(Member {
            name,
            path,
            address,
            kind,
        });
    }

    /// Links of a group header from its symbol table, link messages and
    /// dense link storage.
    fn links(&mut self, header: &ObjectHeader) -> Result<Vec<Link>> {
        let os = self.ctx.offset_size;
        let mut out = Vec::new();
        for raw in &header.messages {
            match raw.msg_type {
                MessageType::SymbolTable => {
                    let st = SymbolTableMessage::parse(&raw.data, os)?;
                    out.extend(self.symbol_table_links(&st)?);
                }
                MessageType::Link => out.push(Link::parse(&raw.data, os)?),
                MessageType::LinkInfo => {
                    let info = LinkInfo::parse(&raw.data, os)?;
                    if let (Some(heap), Some(index)) = (info.fractal_heap_address, info.name_index_address) {
                        out.extend(self.dense_links(heap, index)?);
                    }
                }
                _ => {}
            }
        }
        Ok(out)
    }

    fn symbol_table_links(&self, st: &SymbolTableMessage) -> Result<Vec<Link>> {
        let heap = LocalHeap::parse(&self.ctx, st.local_heap_address)?;
        let entries = btree_v1::group_entries(&self.ctx, st.btree_address)?;
        let mut links = Vec::with_capacity(entries.len());
        for e in entries {
            let name = heap.get_string(&self.ctx, e.link_name_offset)?;
            let target = match e.soft_link_offset() {
                Some(off) => LinkTarget::Soft(heap.get_string(&self.ctx, off)?),
                None => LinkTarget::Hard(e.object_header_address),
            };
            links.push(Link {
                name,
                creation_order: None,
                target,
            });
        }
        Ok(links)
    }

    fn dense_links(&self, heap_address: u64, index_address: u64) -> Result<Vec<Link>> {
        let heap = FractalHeap::open(&self.ctx, heap_address)?;
        let tree = BTreeV2::open(&self.ctx, index_address)?;
        let mut links = Vec::new();
        for record in tree.entries(&self.ctx)? {
            if let Some(id) = record.heap_id() {
                let bytes = heap.get(&self.ctx, id)?;
                links.push(Link::parse(&bytes, self.ctx.offset_size)?);
            }
        }
        links.sort_by(|a, b| a.creation_order.cmp(&b.creation_order).then_with(|| a.name.cmp(&b.name)));
        Ok(links)
    }

    /// Attribute messages of a header, compact and dense.
    pub fn attributes(&mut self, header: &ObjectHeader) -> Result<Vec<AttributeMessage>> {
        let mut out = Vec::new();
        for raw in &header.messages {
            match raw.msg_type {
                MessageType::Attribute => match Message::decode(raw, &self.ctx)? {
                    Message::Attribute(a) => out.push(a),
                    Message::Shared { kind, address } => {
                        if let Message::Attribute(a) = self.shared_message(kind, address)? {
                            out.push(a);
                        }
                    }
                    _ => {}
                },
                MessageType::AttributeInfo => {
                    let info = AttributeInfo::parse(&raw.data, self.ctx.offset_size)?;
                    if let (Some(heap), Some(index)) = (info.fractal_heap_address, info.name_index_address) {
                        let heap = FractalHeap::open(&self.ctx, heap)?;
                        let tree = BTreeV2::open(&self.ctx, index)?;
                        for record in tree.entries(&self.ctx)? {
                            if let Some(id) = record.heap_id() {
                                let bytes = heap.get(&self.ctx, id)?;
                                out.push(AttributeMessage::parse(
                                    &bytes,
                                    self.ctx.offset_size,
                                    self.ctx.length_size,
                                )?);
                            }
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(out)
    }

    /// The message of `kind` stored in the header at `address`.
    pub fn shared_message(&mut self, kind: MessageType, address: u64) -> Result<Message> {
        let header = self.object_header(address)?;
        let raw = header.find(kind).ok_or_else(|| {
            FormatError::InvalidData(format!("shared {kind:?} message not found in header {address:#x}"))
        })?;
        match Message::decode(raw, &self.ctx)? {
            Message::Shared { .. } => Err(FormatError::InvalidData(format!(
                "shared {kind:?} message at {address:#x} points to another shared message"
            ))
            .into()),
            msg => Ok(msg),
        }
    }

    /// The first message of `kind` in `header`, with shared pointers
    /// followed. The second value is the address of the header the message
    /// came from when it was shared.
    pub fn message(&mut self, header: &ObjectHeader, kind: MessageType) -> Result<Option<(Message, Option<u64>)>> {
        let Some(raw) = header.find(kind) else {
            return Ok(None);
        };
        match Message::decode(raw, &self.ctx)? {
            Message::Shared { kind, address } => Ok(Some((self.shared_message(kind, address)?, Some(address)))),
            msg => Ok(Some((msg, None))),
        }
    }

    pub fn shared_datatype(&mut self, dt: &Shareable<Datatype>) -> Result<(Datatype, Option<u64>)> {
        match dt {
            Shareable::Inline(dt) => Ok((dt.clone(), None)),
            Shareable::Shared(ptr) => match self.shared_message(MessageType::Datatype, ptr.address)? {
                Message::Datatype(dt) => Ok((dt, Some(ptr.address))),
                _ => Err(FormatError::InvalidData(format!("no datatype at {:#x}", ptr.address)).into()),
            },
        }
    }

    pub fn shared_dataspace(&mut self, ds: &Shareable<Dataspace>) -> Result<Dataspace> {
        match ds {
            Shareable::Inline(ds) => Ok(ds.clone()),
            Shareable::Shared(ptr) => match self.shared_message(MessageType::Dataspace, ptr.address)? {
                Message::Dataspace(ds) => Ok(ds),
                _ => Err(FormatError::InvalidData(format!("no dataspace at {:#x}", ptr.address)).into()),
            },
        }
    }
}
