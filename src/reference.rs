//! Wire-scoped entity references and the links entities hold to each other.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::entity::NodeId;
use crate::unpacker::Resolver;

/// Session-local identity of an entity inside one stream: `(type id, entity id)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RefKey {
    pub type_id: u32,
    pub entity_id: u64,
}

impl fmt::Display for RefKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}:{}", self.type_id, self.entity_id)
    }
}

/// A reference as it appears on the wire.
///
/// Definition headers carry a version and optionally aliases; references in
/// field values carry neither. Type and entity ids are local to one session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub type_id: u32,
    pub entity_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
}

impl EntityRef {
    /// A bare value-position reference.
    pub fn new(type_id: u32, entity_id: u64) -> Self {
        Self {
            type_id,
            entity_id,
            version: None,
            aliases: Vec::new(),
        }
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.version = Some(version);
        self
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn key(&self) -> RefKey {
        RefKey {
            type_id: self.type_id,
            entity_id: self.entity_id,
        }
    }

    /// The same reference stripped of version and aliases.
    pub fn as_value(&self) -> EntityRef {
        EntityRef::new(self.type_id, self.entity_id)
    }

    pub fn is_super(&self) -> bool {
        self.entity_id == 0
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}:{}", self.type_id, self.entity_id)?;
        if let Some(version) = self.version {
            write!(f, "v{}", version)?;
        }
        for alias in &self.aliases {
            write!(f, "/{:?}", alias)?;
        }
        Ok(())
    }
}

/// A link from one entity to another.
///
/// Freshly unpacked entities hold `Unresolved` links built from their bundle;
/// `finish_resolving` turns them into `Resolved` nodes of the output graph.
/// Entities assembled in memory for packing hold `Resolved` links directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Link {
    Unresolved(EntityRef),
    Resolved(NodeId),
}

impl Link {
    pub fn to(node: NodeId) -> Self {
        Link::Resolved(node)
    }

    /// The linked node once resolved.
    pub fn node(&self) -> Option<NodeId> {
        match self {
            Link::Resolved(node) => Some(*node),
            Link::Unresolved(_) => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Link::Resolved(_))
    }

    /// Try to resolve against the current session; returns whether the link
    /// is resolved afterwards. Safe to call repeatedly.
    pub fn resolve(&mut self, resolver: &Resolver<'_>) -> bool {
        if let Link::Unresolved(reference) = self {
            match resolver.resolve(reference) {
                Some(node) => *self = Link::Resolved(node),
                None => return false,
            }
        }
        true
    }
}
