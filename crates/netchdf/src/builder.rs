//! Phase two of opening a file: turning the walked object graph into the
//! immutable [`Group`] tree.
//!
//! Committed datatypes are registered first so that datasets sharing them
//! resolve to the same typedef. Each group then gets its attributes and
//! variables, netCDF-4 dimension scales are turned into shared dimensions,
//! and every typedef is attached to the lowest group that covers all of
//! its users.

use std::collections::HashMap;

use netchdf_format::attribute::AttributeMessage;
use netchdf_format::data_layout::{ChunkIndex, DataLayout};
use netchdf_format::dataspace::{Dataspace, DataspaceType};
use netchdf_format::message::Message;
use netchdf_format::message_type::MessageType;
use netchdf_format::object_header::ObjectHeader;
use netchdf_format::FormatError;

use crate::chunk_reader::byte_count;
use crate::error::{Error, Result};
use crate::materialize::Materializer;
use crate::schema::{Attribute, Dimension, Group, Storage, StorageLayout, Variable};
use crate::session::{DecodeSession, Member, ObjectKind};
use crate::typedef::{common_parent, GroupId, Typedef};
use crate::types::{check_readable, TypeBuilder};
use crate::vlen::HeapCache;

const DIMENSION_SCALE: &str = "DIMENSION_SCALE";
/// Prefix of the NAME attribute of a dimension scale that only declares a
/// dimension.
const HIDDEN_DIMENSION: &str = "This is a netCDF dimension but not a netCDF variable";
const NON_COORD_PREFIX: &str = "_nc4_non_coord_";

/// Bookkeeping attributes hidden in strict mode.
const STRICT_HIDDEN: [&str; 9] = [
    "_NCProperties",
    "_Netcdf4Coordinates",
    "_nc3_strict",
    "_Netcdf4Dimid",
    "DIMENSION_LABELS",
    "CLASS",
    "NAME",
    "DIMENSION_LIST",
    "REFERENCE_LIST",
];

/// The result of opening: the schema plus the state later reads need.
pub(crate) struct Built {
    pub root: Group,
    pub heap: HeapCache,
    pub paths: HashMap<u64, String>,
}

#[derive(Default)]
struct GroupParts {
    dimensions: Vec<Dimension>,
    typedefs: Vec<Typedef>,
    attributes: Vec<Attribute>,
    variables: Vec<Variable>,
}

fn take_attribute(attributes: &mut Vec<Attribute>, name: &str) -> Option<Attribute> {
    let i = attributes.iter().position(|a| a.name == name)?;
    Some(attributes.remove(i))
}

fn shape_of(space: &Dataspace) -> Vec<u64> {
    match space.space_type {
        DataspaceType::Scalar => Vec::new(),
        DataspaceType::Simple => space.dimensions.clone(),
        DataspaceType::Null => vec![0],
    }
}

fn storage_layout(layout: DataLayout, rank: usize) -> Result<StorageLayout> {
    match layout {
        DataLayout::Compact { data } => Ok(StorageLayout::Compact(data)),
        DataLayout::Contiguous { address, .. } => Ok(StorageLayout::Contiguous { address }),
        DataLayout::Chunked { dimensions, index, .. } => {
            if let ChunkIndex::FixedArray { .. } | ChunkIndex::ExtensibleArray { .. } | ChunkIndex::BTreeV2 { .. } = index
            {
                return Err(Error::Unsupported(format!("{} chunk index", index.name())));
            }
            if dimensions.len() < rank {
                return Err(FormatError::InvalidData(format!(
                    "chunk rank {} below dataspace rank {rank}",
                    dimensions.len()
                ))
                .into());
            }
            let chunk = dimensions[..rank].to_vec();
            if chunk.contains(&0) {
                return Err(FormatError::InvalidData(format!("zero chunk dimension in {chunk:?}")).into());
            }
            Ok(StorageLayout::Chunked { chunk, index })
        }
        DataLayout::Virtual { .. } => Err(Error::Unsupported("virtual dataset layout".into())),
    }
}

impl<'a> DecodeSession<'a> {
    /// Phase two. Consumes the session.
    pub fn build(mut self, strict: bool) -> Result<Built> {
        self.register_committed_types();

        let mut parts = Vec::with_capacity(self.groups.len());
        for gid in 0..self.groups.len() {
            parts.push(self.group_parts(gid, strict)?);
        }

        let parents: Vec<Option<GroupId>> = self.groups.iter().map(|g| g.parent).collect();
        let homes: Vec<GroupId> = self
            .registry
            .referencing_groups()
            .map(|(_, groups)| common_parent(groups, |g| parents[g]).unwrap_or(0))
            .collect();
        let registry = std::mem::take(&mut self.registry);
        for (typedef, home) in registry.into_typedefs().into_iter().zip(homes) {
            tracing::debug!(name = %typedef.name, kind = typedef.kind.name(), group = %self.groups[home].path, "typedef");
            parts[home].typedefs.push(typedef);
        }

        // children always follow their parent in the arena
        let mut built: Vec<Option<Group>> = (0..self.groups.len()).map(|_| None).collect();
        for gid in (0..self.groups.len()).rev() {
            let node = &self.groups[gid];
            let p = std::mem::take(&mut parts[gid]);
            let groups = node.children.iter().filter_map(|&c| built[c].take()).collect();
            built[gid] = Some(Group {
                name: node.name.clone(),
                path: node.path.clone(),
                dimensions: p.dimensions,
                typedefs: p.typedefs,
                attributes: p.attributes,
                variables: p.variables,
                groups,
            });
        }
        let root = built
            .first_mut()
            .and_then(Option::take)
            .ok_or_else(|| FormatError::InvalidData("no root group".into()))?;
        Ok(Built {
            root,
            heap: self.heap,
            paths: self.paths,
        })
    }

    fn members(&self, gid: GroupId, kind: ObjectKind) -> Vec<Member> {
        self.groups[gid]
            .members
            .iter()
            .filter(|m| m.kind == kind)
            .cloned()
            .collect()
    }

    fn register_committed_types(&mut self) {
        for gid in 0..self.groups.len() {
            for m in self.members(gid, ObjectKind::Datatype) {
                if let Err(e) = self.register_committed(gid, &m) {
                    tracing::warn!(path = %m.path, error = %e, "skipping committed datatype");
                }
            }
        }
    }

    fn register_committed(&mut self, gid: GroupId, m: &Member) -> Result<()> {
        let header = self.object_header(m.address)?;
        if let Some((Message::Datatype(dt), _)) = self.message(&header, MessageType::Datatype)? {
            TypeBuilder::new(&mut self.registry).register_committed(&dt, m.address, &m.name, gid)?;
        }
        Ok(())
    }

    fn group_parts(&mut self, gid: GroupId, strict: bool) -> Result<GroupParts> {
        let header = self.object_header(self.groups[gid].address)?;
        let path = self.groups[gid].path.clone();
        let mut attributes = self.build_attributes(&header, gid, &path);

        let mut variables = Vec::new();
        for m in self.members(gid, ObjectKind::Dataset) {
            match self.build_variable(gid, &m) {
                Ok(v) => variables.push(v),
                Err(e) => tracing::warn!(path = %m.path, error = %e, "skipping dataset"),
            }
        }

        let mut dimensions = Vec::new();
        apply_dimension_scales(&mut variables, &mut dimensions);

        if strict {
            attributes.retain(|a| !STRICT_HIDDEN.contains(&a.name.as_str()));
            for v in &mut variables {
                v.attributes.retain(|a| !STRICT_HIDDEN.contains(&a.name.as_str()));
            }
        }
        Ok(GroupParts {
            dimensions,
            typedefs: Vec::new(),
            attributes,
            variables,
        })
    }

    /// Every readable attribute of `header`; failures are logged and
    /// skipped.
    fn build_attributes(&mut self, header: &ObjectHeader, gid: GroupId, owner: &str) -> Vec<Attribute> {
        let messages = match self.attributes(header) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(owner, error = %e, "skipping unreadable attributes");
                return Vec::new();
            }
        };
        let mut out = Vec::with_capacity(messages.len());
        for msg in messages {
            // back-pointers from dimension scales; always dropped
            if msg.name == "REFERENCE_LIST" {
                continue;
            }
            match self.build_attribute(&msg, gid) {
                Ok(a) => out.push(a),
                Err(e) => tracing::warn!(owner, attribute = %msg.name, error = %e, "skipping attribute"),
            }
        }
        out
    }

    fn build_attribute(&mut self, msg: &AttributeMessage, gid: GroupId) -> Result<Attribute> {
        let (dt, origin) = self.shared_datatype(&msg.datatype)?;
        let space = self.shared_dataspace(&msg.dataspace)?;
        let datatype = TypeBuilder::new(&mut self.registry).resolve(&dt, origin, &msg.name, gid)?;
        check_readable(&datatype)?;
        let shape = shape_of(&space);
        byte_count(&shape, datatype.size())?;
        let shape: Vec<usize> = shape.iter().map(|&d| d as usize).collect();
        let values = Materializer::new(self.ctx, &self.heap, &self.paths).materialize(&msg.data, &shape, &datatype)?;
        Ok(Attribute {
            name: msg.name.clone(),
            datatype,
            values,
        })
    }

    fn build_variable(&mut self, gid: GroupId, m: &Member) -> Result<Variable> {
        let header = self.object_header(m.address)?;
        let missing = |what: &str| -> Error { FormatError::InvalidData(format!("{} has no {what} message", m.path)).into() };

        let space = match self.message(&header, MessageType::Dataspace)? {
            Some((Message::Dataspace(ds), _)) => ds,
            _ => return Err(missing("dataspace")),
        };
        let (dt, origin) = match self.message(&header, MessageType::Datatype)? {
            Some((Message::Datatype(dt), origin)) => (dt, origin),
            _ => return Err(missing("datatype")),
        };
        let layout = match self.message(&header, MessageType::DataLayout)? {
            Some((Message::Layout(l), _)) => l,
            _ => return Err(missing("layout")),
        };
        let filters = match self.message(&header, MessageType::FilterPipeline)? {
            Some((Message::FilterPipeline(p), _)) => Some(p),
            _ => None,
        };

        let name = m.name.strip_prefix(NON_COORD_PREFIX).unwrap_or(&m.name).to_string();
        let datatype = TypeBuilder::new(&mut self.registry).resolve(&dt, origin, &name, gid)?;
        check_readable(&datatype)?;
        let elem_size = datatype.size();
        if elem_size == 0 {
            return Err(Error::Unsupported(format!("zero-size elements of {datatype}")));
        }

        let shape = shape_of(&space);
        byte_count(&shape, elem_size)?;
        let unlimited = (0..shape.len()).map(|i| space.is_unlimited(i)).collect();
        let layout = storage_layout(layout, shape.len())?;
        if let StorageLayout::Chunked { chunk, .. } = &layout {
            byte_count(chunk, elem_size)?;
        }
        let fill = self.fill_value(&header, elem_size)?;
        let attributes = self.build_attributes(&header, gid, &m.path);
        tracing::debug!(
            path = %m.path,
            datatype = %datatype,
            shape = ?shape,
            chunked = matches!(layout, StorageLayout::Chunked { .. }),
            "variable"
        );

        Ok(Variable {
            name,
            path: m.path.clone(),
            datatype,
            shape,
            dimensions: Vec::new(),
            unlimited,
            attributes,
            storage: Storage {
                layout,
                filters,
                fill,
                elem_size,
            },
        })
    }

    /// The defined fill value when it is exactly one element wide.
    fn fill_value(&mut self, header: &ObjectHeader, elem_size: usize) -> Result<Vec<u8>> {
        if let Some((Message::FillValue(f), _)) = self.message(header, MessageType::FillValue)? {
            if let Some(value) = f.value.filter(|v| v.len() == elem_size) {
                return Ok(value);
            }
        }
        if let Some((Message::FillValueOld(f), _)) = self.message(header, MessageType::FillValueOld)? {
            if f.value.len() == elem_size {
                return Ok(f.value);
            }
        }
        Ok(Vec::new())
    }
}

/// Last path component of each DIMENSION_LIST entry, one per axis.
fn dimension_list_names(list: &Attribute, v: &Variable) -> Option<Vec<String>> {
    let refs = list.values.as_vlen()?;
    if refs.len() != v.rank() {
        tracing::warn!(path = %v.path, entries = refs.len(), rank = v.rank(), "DIMENSION_LIST does not match rank");
        return None;
    }
    Some(
        refs.iter()
            .zip(&v.shape)
            .map(|(r, &len)| {
                r.as_strings()
                    .and_then(|s| s.first())
                    .and_then(|p| p.rsplit('/').next())
                    .map_or_else(|| len.to_string(), str::to_string)
            })
            .collect(),
    )
}

/// Turn dimension-scale datasets into shared dimensions and attach
/// dimension names to the variables that list them.
fn apply_dimension_scales(variables: &mut Vec<Variable>, dimensions: &mut Vec<Dimension>) {
    let mut multi = Vec::new();
    for (i, v) in variables.iter_mut().enumerate() {
        let is_scale = v.attribute("CLASS").and_then(Attribute::as_str) == Some(DIMENSION_SCALE);
        if !is_scale || v.rank() == 0 {
            continue;
        }
        take_attribute(&mut v.attributes, "CLASS");
        if dimensions.iter().all(|d| d.name != v.name) {
            dimensions.push(Dimension {
                name: v.name.clone(),
                length: v.shape[0],
                is_unlimited: v.unlimited[0],
            });
        }
        v.dimensions = vec![v.name.clone()];
        if v.rank() > 1 {
            multi.push(i);
        }
    }

    // trailing axes of a multi-dimensional scale take the one dimension of
    // matching length, else stay anonymous
    for i in multi {
        let v = &mut variables[i];
        for axis in 1..v.rank() {
            let len = v.shape[axis];
            let mut found = dimensions.iter().filter(|d| d.length == len && d.name != v.name);
            let name = match (found.next(), found.next()) {
                (Some(d), None) => d.name.clone(),
                _ => len.to_string(),
            };
            v.dimensions.push(name);
        }
    }

    let mut hidden = Vec::new();
    for (i, v) in variables.iter_mut().enumerate() {
        if let Some(list) = take_attribute(&mut v.attributes, "DIMENSION_LIST") {
            if let Some(names) = dimension_list_names(&list, v) {
                for (name, &len) in names.iter().zip(&v.shape) {
                    if let Some(d) = dimensions.iter_mut().find(|d| &d.name == name) {
                        d.length = d.length.max(len);
                    }
                }
                v.dimensions = names;
            }
        }
        if let Some(name) = take_attribute(&mut v.attributes, "NAME") {
            if name.as_str().is_some_and(|s| s.starts_with(HIDDEN_DIMENSION)) {
                hidden.push(i);
            }
        }
        take_attribute(&mut v.attributes, "REFERENCE_LIST");
    }
    for i in hidden.into_iter().rev() {
        let v = variables.remove(i);
        tracing::debug!(path = %v.path, "dimension-only scale hidden");
    }
}
