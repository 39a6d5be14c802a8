//! Process-wide entity identity and type-name registry.
//!
//! Every entity receives an [`InstanceId`] when it is constructed. The id
//! pairs a process-wide type id with a serial number drawn from one shared
//! counter, so two live entities never share an id. Ids are not persisted:
//! every unpack allocates fresh ones.
//!
//! Wire streams do not use these ids. Each packing or unpacking session keeps
//! its own [`SessionTypes`] table mapping type names to small integers that
//! are only meaningful inside that stream.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Immutable, trimmed name identifying an entity type.
///
/// Once entities of a type have been persisted its name must never change.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeName(String);

impl TypeName {
    /// Create a type name, trimming surrounding whitespace.
    ///
    /// Returns `None` for names that are empty after trimming or contain a
    /// double quote (which the wire format cannot carry in a type alias).
    pub fn new(name: impl AsRef<str>) -> Option<Self> {
        let trimmed = name.as_ref().trim();
        if trimmed.is_empty() || trimmed.contains('"') {
            return None;
        }
        Some(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TypeName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Process-unique identity of one entity instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct InstanceId {
    /// Process-wide type id from [`IdentityService::type_id`].
    pub type_id: u32,
    pub serial: u64,
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.type_id, self.serial)
    }
}

#[derive(Debug, Default)]
struct IdentityState {
    ids: HashMap<String, u32>,
    names: Vec<TypeName>,
    next_serial: u64,
}

/// Lockable generator of type ids and instance ids.
///
/// One canonical instance is shared by the whole process
/// ([`IdentityService::global`]); tests may build isolated instances and
/// inject them through an [`EngineContext`](crate::EngineContext).
#[derive(Debug, Default)]
pub struct IdentityService {
    state: Mutex<IdentityState>,
}

impl IdentityService {
    /// Create an isolated identity service
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide shared instance.
    pub fn global() -> Arc<IdentityService> {
        static GLOBAL: OnceLock<Arc<IdentityService>> = OnceLock::new();
        GLOBAL.get_or_init(|| Arc::new(IdentityService::new())).clone()
    }

    fn lock(&self) -> MutexGuard<'_, IdentityState> {
        // A panic while holding the lock cannot leave the counters inconsistent,
        // so a poisoned lock is still usable.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Process-wide id for `name`, allocated on first sight.
    pub fn type_id(&self, name: &TypeName) -> u32 {
        let mut state = self.lock();
        if let Some(&id) = state.ids.get(name.as_str()) {
            return id;
        }
        let id = state.names.len() as u32 + 1;
        state.ids.insert(name.as_str().to_string(), id);
        state.names.push(name.clone());
        id
    }

    /// Reverse lookup of a process-wide type id.
    pub fn type_name(&self, type_id: u32) -> Option<TypeName> {
        if type_id == 0 {
            return None;
        }
        self.lock().names.get(type_id as usize - 1).cloned()
    }

    /// Allocate a fresh identity for a new instance of `name`.
    pub fn allocate(&self, name: &TypeName) -> InstanceId {
        let type_id = self.type_id(name);
        let mut state = self.lock();
        state.next_serial += 1;
        InstanceId {
            type_id,
            serial: state.next_serial,
        }
    }

    /// Number of distinct type names seen so far.
    pub fn type_count(&self) -> usize {
        self.lock().names.len()
    }
}

/// Per-session table between type names and compact wire ids.
///
/// Ids start at 1 and are append-only for the life of the session.
#[derive(Debug, Clone, Default)]
pub struct SessionTypes {
    by_name: IndexMap<TypeName, u32>,
    by_id: HashMap<u32, TypeName>,
}

impl SessionTypes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wire id for `name`; the flag is true when the id was just allocated.
    pub fn intern(&mut self, name: &TypeName) -> (u32, bool) {
        if let Some(&id) = self.by_name.get(name) {
            return (id, false);
        }
        let id = self.by_name.len() as u32 + 1;
        self.by_name.insert(name.clone(), id);
        self.by_id.insert(id, name.clone());
        (id, true)
    }

    /// Record a declaration read from a stream.
    ///
    /// Returns `false` when either the id or the name is already bound to a
    /// different partner. Re-declaring an identical pair is accepted.
    pub fn declare(&mut self, id: u32, name: TypeName) -> bool {
        match (self.by_id.get(&id), self.by_name.get(&name)) {
            (Some(existing), _) if *existing != name => false,
            (_, Some(&existing)) if existing != id => false,
            (Some(_), Some(_)) => true,
            _ => {
                self.by_id.insert(id, name.clone());
                self.by_name.insert(name, id);
                true
            }
        }
    }

    pub fn name(&self, id: u32) -> Option<&TypeName> {
        self.by_id.get(&id)
    }

    pub fn id(&self, name: &TypeName) -> Option<u32> {
        self.by_name.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Declared pairs in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &TypeName)> {
        self.by_name.iter().map(|(name, id)| (*id, name))
    }
}
