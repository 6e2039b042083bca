//! User-defined types and their deduplication.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::types::{CompoundField, TypeDescriptor, TypedefId};

/// Index of a group in the decode session's group arena.
pub(crate) type GroupId = usize;

/// A named, reusable user type.
#[derive(Debug, Clone, PartialEq)]
pub struct Typedef {
    pub id: TypedefId,
    pub name: String,
    pub kind: TypedefKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypedefKind {
    Compound {
        members: Vec<CompoundField>,
    },
    Enum {
        /// Byte width of the unsigned base integer.
        base_size: usize,
        values: Arc<BTreeMap<u64, String>>,
    },
    Opaque {
        size: usize,
    },
    Vlen {
        base: TypeDescriptor,
    },
}

impl TypedefKind {
    pub fn name(&self) -> &'static str {
        match self {
            TypedefKind::Compound { .. } => "compound",
            TypedefKind::Enum { .. } => "enum",
            TypedefKind::Opaque { .. } => "opaque",
            TypedefKind::Vlen { .. } => "vlen",
        }
    }
}

/// Typedefs of one file, keyed by datatype address and by structural hash.
///
/// Lookup tries the address first and the hash second, so two committed
/// types with the same structure at different addresses collapse into the
/// first one registered.
#[derive(Debug, Default)]
pub(crate) struct TypedefRegistry {
    typedefs: Vec<Typedef>,
    by_address: HashMap<u64, TypedefId>,
    by_hash: HashMap<u64, TypedefId>,
    /// Groups that reference each typedef, in first-seen order.
    groups: Vec<Vec<GroupId>>,
}

impl TypedefRegistry {
    pub fn find(&self, address: Option<u64>, hash: u64) -> Option<TypedefId> {
        address
            .and_then(|a| self.by_address.get(&a))
            .or_else(|| self.by_hash.get(&hash))
            .copied()
    }

    /// Return the typedef for `(address, hash)`, creating it from `kind` when
    /// neither key is known. Either way `group` is recorded as a referrer.
    pub fn register(
        &mut self,
        address: Option<u64>,
        hash: u64,
        name: &str,
        group: GroupId,
        kind: impl FnOnce() -> TypedefKind,
    ) -> TypedefId {
        if let Some(id) = self.find(address, hash) {
            tracing::trace!(name, existing = id.0, "typedef already registered");
            self.reference(id, group);
            return id;
        }
        let id = TypedefId(self.typedefs.len());
        let kind = kind();
        tracing::debug!(name, kind = kind.name(), ?address, "registering typedef");
        self.typedefs.push(Typedef {
            id,
            name: name.to_string(),
            kind,
        });
        if let Some(a) = address {
            self.by_address.insert(a, id);
        }
        self.by_hash.insert(hash, id);
        self.groups.push(vec![group]);
        id
    }

    /// Record that `group` references typedef `id`.
    pub fn reference(&mut self, id: TypedefId, group: GroupId) {
        if let Some(groups) = self.groups.get_mut(id.0) {
            if !groups.contains(&group) {
                groups.push(group);
            }
        }
    }

    pub fn get(&self, id: TypedefId) -> Option<&Typedef> {
        self.typedefs.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.typedefs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.typedefs.is_empty()
    }

    /// Each typedef with the groups that reference it.
    pub fn referencing_groups(&self) -> impl Iterator<Item = (TypedefId, &[GroupId])> {
        self.groups
            .iter()
            .enumerate()
            .map(|(i, g)| (TypedefId(i), g.as_slice()))
    }

    pub fn into_typedefs(self) -> Vec<Typedef> {
        self.typedefs
    }
}

/// Lowest common ancestor of `groups`, given each group's parent.
pub(crate) fn common_parent(groups: &[GroupId], parent: impl Fn(GroupId) -> Option<GroupId>) -> Option<GroupId> {
    let ancestors = |g: GroupId| {
        let mut chain = vec![g];
        let mut cur = g;
        while let Some(p) = parent(cur) {
            chain.push(p);
            cur = p;
        }
        chain
    };
    let (&first, rest) = groups.split_first()?;
    let mut top = first;
    for &g in rest {
        let mine = ancestors(top);
        let theirs = ancestors(g);
        top = mine.into_iter().find(|a| theirs.contains(a))?;
    }
    Some(top)
}
