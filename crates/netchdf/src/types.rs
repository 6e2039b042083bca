//! Resolved element types.
//!
//! [`TypeDescriptor`] is what the schema exposes: the on-disk
//! [`Datatype`] with array members unwrapped, enum bases made unsigned and
//! user types tied to their [`Typedef`](crate::typedef::Typedef).

use std::collections::BTreeMap;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use netchdf_format::datatype::Datatype;
use netchdf_io::Endian;

pub use netchdf_format::datatype::{CharacterSet, ReferenceType, StringPadding};

use crate::error::{Error, Result};
use crate::typedef::{GroupId, TypedefKind, TypedefRegistry};

/// Index of a typedef in its file's registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypedefId(pub usize);

/// One member of a compound type.
#[derive(Debug, Clone, PartialEq)]
pub struct CompoundField {
    pub name: String,
    /// Byte offset inside the compound element.
    pub offset: usize,
    /// Array dimensions of the member; empty for a scalar member.
    pub dims: Vec<u64>,
    pub datatype: TypeDescriptor,
}

impl CompoundField {
    /// Elements of `datatype` per compound element.
    pub fn count(&self) -> usize {
        self.dims.iter().product::<u64>() as usize
    }
}

/// Element type of a variable or attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeDescriptor {
    Fixed {
        size: usize,
        order: Endian,
        signed: bool,
    },
    Float {
        size: usize,
        order: Endian,
    },
    Time {
        size: usize,
        order: Endian,
    },
    BitField {
        size: usize,
        order: Endian,
    },
    String {
        size: usize,
        order: Endian,
        padding: StringPadding,
        charset: CharacterSet,
        /// Stored through the global heap instead of inline.
        variable_length: bool,
    },
    Opaque {
        size: usize,
        order: Endian,
        tag: String,
        typedef: Option<TypedefId>,
    },
    Compound {
        size: usize,
        order: Endian,
        members: Vec<CompoundField>,
        typedef: Option<TypedefId>,
    },
    Reference {
        size: usize,
        order: Endian,
        kind: ReferenceType,
    },
    /// Unsigned integer of `size` bytes whose values carry labels.
    Enum {
        size: usize,
        order: Endian,
        values: Arc<BTreeMap<u64, String>>,
        typedef: Option<TypedefId>,
    },
    Vlen {
        size: usize,
        order: Endian,
        base: Box<TypeDescriptor>,
        typedef: Option<TypedefId>,
    },
    Array {
        size: usize,
        order: Endian,
        base: Box<TypeDescriptor>,
        dims: Vec<u64>,
    },
}

impl TypeDescriptor {
    /// Bytes per element as stored.
    pub fn size(&self) -> usize {
        match self {
            TypeDescriptor::Fixed { size, .. }
            | TypeDescriptor::Float { size, .. }
            | TypeDescriptor::Time { size, .. }
            | TypeDescriptor::BitField { size, .. }
            | TypeDescriptor::String { size, .. }
            | TypeDescriptor::Opaque { size, .. }
            | TypeDescriptor::Compound { size, .. }
            | TypeDescriptor::Reference { size, .. }
            | TypeDescriptor::Enum { size, .. }
            | TypeDescriptor::Vlen { size, .. }
            | TypeDescriptor::Array { size, .. } => *size,
        }
    }

    pub fn order(&self) -> Endian {
        match self {
            TypeDescriptor::Fixed { order, .. }
            | TypeDescriptor::Float { order, .. }
            | TypeDescriptor::Time { order, .. }
            | TypeDescriptor::BitField { order, .. }
            | TypeDescriptor::String { order, .. }
            | TypeDescriptor::Opaque { order, .. }
            | TypeDescriptor::Compound { order, .. }
            | TypeDescriptor::Reference { order, .. }
            | TypeDescriptor::Enum { order, .. }
            | TypeDescriptor::Vlen { order, .. }
            | TypeDescriptor::Array { order, .. } => *order,
        }
    }

    pub fn typedef(&self) -> Option<TypedefId> {
        match self {
            TypeDescriptor::Opaque { typedef, .. }
            | TypeDescriptor::Compound { typedef, .. }
            | TypeDescriptor::Enum { typedef, .. }
            | TypeDescriptor::Vlen { typedef, .. } => *typedef,
            _ => None,
        }
    }

    pub fn is_string(&self) -> bool {
        matches!(self, TypeDescriptor::String { .. })
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, TypeDescriptor::Reference { .. })
    }

    /// Short class name for messages.
    pub fn class_name(&self) -> &'static str {
        match self {
            TypeDescriptor::Fixed { .. } => "fixed",
            TypeDescriptor::Float { .. } => "float",
            TypeDescriptor::Time { .. } => "time",
            TypeDescriptor::BitField { .. } => "bitfield",
            TypeDescriptor::String { .. } => "string",
            TypeDescriptor::Opaque { .. } => "opaque",
            TypeDescriptor::Compound { .. } => "compound",
            TypeDescriptor::Reference { .. } => "reference",
            TypeDescriptor::Enum { .. } => "enum",
            TypeDescriptor::Vlen { .. } => "vlen",
            TypeDescriptor::Array { .. } => "array",
        }
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDescriptor::Fixed { size, signed, .. } => {
                write!(f, "{}int{}", if *signed { "" } else { "u" }, size * 8)
            }
            TypeDescriptor::Float { size, .. } => write!(f, "float{}", size * 8),
            TypeDescriptor::String {
                variable_length: true,
                ..
            } => f.write_str("string"),
            TypeDescriptor::String { size, .. } => write!(f, "string({size})"),
            TypeDescriptor::Vlen { base, .. } => write!(f, "vlen<{base}>"),
            TypeDescriptor::Array { base, dims, .. } => write!(f, "{base}{dims:?}"),
            other => write!(f, "{}({})", other.class_name(), other.size()),
        }
    }
}

/// Structural hash of an on-disk datatype, the second key of typedef
/// lookup.
pub(crate) fn datatype_hash(dt: &Datatype) -> u64 {
    let mut h = DefaultHasher::new();
    dt.hash(&mut h);
    h.finish()
}

/// Turns on-disk datatypes into descriptors, registering user types.
pub(crate) struct TypeBuilder<'r> {
    pub registry: &'r mut TypedefRegistry,
}

impl<'r> TypeBuilder<'r> {
    pub fn new(registry: &'r mut TypedefRegistry) -> Self {
        Self { registry }
    }

    /// Resolve `dt` as used by an object in `group`.
    ///
    /// `origin` is the address of the committed datatype when `dt` was
    /// reached through a shared pointer. Compound and enum types that no
    /// registered typedef covers are registered under `name`.
    pub fn resolve(
        &mut self,
        dt: &Datatype,
        origin: Option<u64>,
        name: &str,
        group: GroupId,
    ) -> Result<TypeDescriptor> {
        let desc = match dt {
            Datatype::FixedPoint {
                size, order, signed, ..
            } => TypeDescriptor::Fixed {
                size: *size as usize,
                order: *order,
                signed: *signed,
            },
            Datatype::FloatingPoint { size, order, .. } => TypeDescriptor::Float {
                size: *size as usize,
                order: *order,
            },
            Datatype::Time { size, order, .. } => TypeDescriptor::Time {
                size: *size as usize,
                order: *order,
            },
            Datatype::BitField { size, order, .. } => TypeDescriptor::BitField {
                size: *size as usize,
                order: *order,
            },
            Datatype::String {
                size,
                padding,
                charset,
            } => TypeDescriptor::String {
                size: *size as usize,
                order: Endian::Little,
                padding: *padding,
                charset: *charset,
                variable_length: false,
            },
            Datatype::Opaque { size, tag } => TypeDescriptor::Opaque {
                size: *size as usize,
                order: Endian::Little,
                tag: tag.clone(),
                typedef: self.lookup(dt, origin, group),
            },
            Datatype::Reference { size, ref_type } => TypeDescriptor::Reference {
                size: *size as usize,
                order: Endian::Little,
                kind: *ref_type,
            },
            Datatype::Compound { size, members } => {
                let mut fields = Vec::with_capacity(members.len());
                for m in members {
                    let (member_type, array_dims) = match &m.datatype {
                        Datatype::Array {
                            base, dimensions, ..
                        } => (base.as_ref(), dimensions.clone()),
                        other => (other, Vec::new()),
                    };
                    let dims: Vec<u64> = if !m.dimensions.is_empty() {
                        m.dimensions.iter().map(|&d| d as u64).collect()
                    } else {
                        array_dims.iter().map(|&d| d as u64).collect()
                    };
                    let datatype = self.resolve(member_type, None, &m.name, group)?;
                    fields.push(CompoundField {
                        name: m.name.clone(),
                        offset: m.byte_offset as usize,
                        dims,
                        datatype,
                    });
                }
                let typedef = self.find_or_register(dt, origin, name, group, || {
                    TypedefKind::Compound {
                        members: fields.clone(),
                    }
                });
                TypeDescriptor::Compound {
                    size: *size as usize,
                    order: Endian::Little,
                    members: fields,
                    typedef: Some(typedef),
                }
            }
            Datatype::Enumeration {
                size,
                base,
                members,
            } => {
                let order = base.order().unwrap_or_default();
                let values: Arc<BTreeMap<u64, String>> = Arc::new(
                    members
                        .iter()
                        .map(|m| (m.value, m.name.clone()))
                        .collect(),
                );
                let base_size = base.size() as usize;
                let typedef = self.find_or_register(dt, origin, name, group, || TypedefKind::Enum {
                    base_size,
                    values: Arc::clone(&values),
                });
                TypeDescriptor::Enum {
                    size: *size as usize,
                    order,
                    values,
                    typedef: Some(typedef),
                }
            }
            Datatype::VariableLength {
                size,
                is_string,
                padding,
                charset,
                base,
            } => {
                if *is_string {
                    TypeDescriptor::String {
                        size: *size as usize,
                        order: Endian::Little,
                        padding: *padding,
                        charset: *charset,
                        variable_length: true,
                    }
                } else {
                    let base = self.resolve(base, None, name, group)?;
                    TypeDescriptor::Vlen {
                        size: *size as usize,
                        order: base.order(),
                        base: Box::new(base),
                        typedef: self.lookup(dt, origin, group),
                    }
                }
            }
            Datatype::Array {
                size,
                base,
                dimensions,
            } => {
                let base = self.resolve(base, None, name, group)?;
                TypeDescriptor::Array {
                    size: *size as usize,
                    order: base.order(),
                    base: Box::new(base),
                    dims: dimensions.iter().map(|&d| d as u64).collect(),
                }
            }
        };
        Ok(desc)
    }

    /// Register a committed datatype object as a typedef named `name`.
    pub fn register_committed(
        &mut self,
        dt: &Datatype,
        address: u64,
        name: &str,
        group: GroupId,
    ) -> Result<Option<TypedefId>> {
        match dt {
            Datatype::Compound { .. } | Datatype::Enumeration { .. } => {
                let desc = self.resolve(dt, Some(address), name, group)?;
                Ok(desc.typedef())
            }
            Datatype::Opaque { size, .. } => {
                let size = *size as usize;
                Ok(Some(self.find_or_register(dt, Some(address), name, group, || {
                    TypedefKind::Opaque { size }
                })))
            }
            Datatype::VariableLength { is_string: false, base, .. } => {
                let base = self.resolve(base, None, name, group)?;
                Ok(Some(self.find_or_register(dt, Some(address), name, group, || {
                    TypedefKind::Vlen { base }
                })))
            }
            other => {
                tracing::debug!(name, class = ?other.class(), "committed datatype is not a user type");
                Ok(None)
            }
        }
    }

    fn lookup(&mut self, dt: &Datatype, origin: Option<u64>, group: GroupId) -> Option<TypedefId> {
        let id = self.registry.find(origin, datatype_hash(dt))?;
        self.registry.reference(id, group);
        Some(id)
    }

    fn find_or_register(
        &mut self,
        dt: &Datatype,
        origin: Option<u64>,
        name: &str,
        group: GroupId,
        kind: impl FnOnce() -> TypedefKind,
    ) -> TypedefId {
        let hash = datatype_hash(dt);
        self.registry.register(origin, hash, name, group, kind)
    }
}

/// Reject element types a reader cannot produce values for.
pub(crate) fn check_readable(desc: &TypeDescriptor) -> Result<()> {
    match desc {
        TypeDescriptor::Float { size, .. } if !matches!(size, 2 | 4 | 8) => {
            Err(Error::Unsupported(format!("{size}-byte float")))
        }
        TypeDescriptor::Fixed { size, .. }
        | TypeDescriptor::BitField { size, .. }
        | TypeDescriptor::Enum { size, .. }
            if !matches!(size, 1 | 2 | 4 | 8) =>
        {
            Err(Error::Unsupported(format!("{size}-byte integer")))
        }
        TypeDescriptor::Array { base, .. } | TypeDescriptor::Vlen { base, .. } => check_readable(base),
        TypeDescriptor::Compound { members, .. } => {
            members.iter().try_for_each(|m| check_readable(&m.datatype))
        }
        _ => Ok(()),
    }
}
