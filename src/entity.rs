//! Core entity trait and the arena that holds an entity graph.
//!
//! Entities never own each other. A graph of entities lives in an
//! [`EntityGraph`] arena and entities point at one another through
//! [`NodeId`] handles, which lets cyclic graphs exist without shared
//! ownership and lets the unpacker construct entities before the entities
//! they point to are complete.

use std::any::Any;
use std::fmt;

use crate::bundle::Bundle;
use crate::error::{PackError, UnpackError};
use crate::identity::InstanceId;
use crate::packer::PackSession;
use crate::unpacker::Resolver;

/// Handle of one entity inside an [`EntityGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn from_index(index: usize) -> Self {
        NodeId(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Upcast helper so graph users can downcast `dyn Packable` to concrete types.
///
/// Implemented for every `'static` type; entity authors never implement it.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Contract between domain types and the engine.
///
/// # Example
///
/// ```ignore
/// use graphpack::{Bundle, Link, Packable, PackSession, Resolver};
///
/// #[derive(Debug)]
/// struct Node {
///     id: InstanceId,
///     next: Option<Link>,
/// }
///
/// impl Packable for Node {
///     fn instance_id(&self) -> InstanceId {
///         self.id
///     }
///
///     fn bundle_self(&self, _is_super: bool, session: &mut PackSession<'_>) -> Result<Bundle, PackError> {
///         let next = session.link_opt(self.next.as_ref())?;
///         Ok(Bundle::of("demo.Node", 1)?.with("next", next)?)
///     }
///
///     fn finish_resolving(&mut self, resolver: &Resolver<'_>) -> Result<bool, UnpackError> {
///         Ok(self.next.as_mut().map_or(true, |link| link.resolve(resolver)))
///     }
/// }
/// ```
pub trait Packable: AsAny + fmt::Debug {
    /// Identity assigned when the entity was constructed.
    fn instance_id(&self) -> InstanceId;

    /// Flatten the entity into a bundle.
    ///
    /// `is_super` is true when the bundle is requested as the base-type part
    /// of a derived entity. References to other entities are obtained from
    /// `session`, which schedules them for packing.
    fn bundle_self(&self, is_super: bool, session: &mut PackSession<'_>)
        -> Result<Bundle, PackError>;

    /// Attempt to turn raw references into links to other entities.
    ///
    /// Called once per resolution pass until it returns `true`; must be safe
    /// to call any number of times. The readiness predicate is the entity's
    /// own: it does not have to wait for the entities it points to. A
    /// key/value entry, for instance, reports ready as soon as its key is
    /// resolved and finished, even while its value is still pending, because
    /// only the key is needed to place the entry in a table. Breaking that
    /// asymmetry would stop cyclic tables from ever converging.
    fn finish_resolving(&mut self, resolver: &Resolver<'_>) -> Result<bool, UnpackError>;
}

/// Arena of entities addressed by [`NodeId`].
#[derive(Default)]
pub struct EntityGraph {
    // `None` only while the unpacker has an entity checked out for resolution.
    slots: Vec<Option<Box<dyn Packable>>>,
}

impl EntityGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entity: Box<dyn Packable>) -> NodeId {
        self.slots.push(Some(entity));
        NodeId(self.slots.len() - 1)
    }

    /// Convenience for inserting an unboxed entity
    pub fn add<T: Packable>(&mut self, entity: T) -> NodeId {
        self.insert(Box::new(entity))
    }

    pub fn get(&self, node: NodeId) -> Option<&dyn Packable> {
        self.slots.get(node.0).and_then(|slot| slot.as_deref())
    }

    pub fn get_mut(&mut self, node: NodeId) -> Option<&mut (dyn Packable + 'static)> {
        self.slots.get_mut(node.0).and_then(|slot| slot.as_deref_mut())
    }

    pub fn get_as<T: Packable>(&self, node: NodeId) -> Option<&T> {
        self.get(node).and_then(|entity| entity.as_any().downcast_ref::<T>())
    }

    pub fn get_as_mut<T: Packable>(&mut self, node: NodeId) -> Option<&mut T> {
        self.get_mut(node)
            .and_then(|entity| entity.as_any_mut().downcast_mut::<T>())
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.get(node).is_some()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &dyn Packable)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(idx, slot)| slot.as_deref().map(|entity| (NodeId(idx), entity)))
    }

    /// Nodes holding an entity of type `T`.
    pub fn nodes_of<T: Packable>(&self) -> Vec<NodeId> {
        self.iter()
            .filter_map(|(node, entity)| entity.as_any().is::<T>().then_some(node))
            .collect()
    }

    pub(crate) fn check_out(&mut self, node: NodeId) -> Option<Box<dyn Packable>> {
        self.slots.get_mut(node.0).and_then(Option::take)
    }

    pub(crate) fn check_in(&mut self, node: NodeId, entity: Box<dyn Packable>) {
        if let Some(slot) = self.slots.get_mut(node.0) {
            *slot = Some(entity);
        }
    }
}

impl fmt::Debug for EntityGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{IdentityService, TypeName};

    #[derive(Debug)]
    struct Leaf {
        id: InstanceId,
        value: i32,
    }

    impl Packable for Leaf {
        fn instance_id(&self) -> InstanceId {
            self.id
        }

        fn bundle_self(
            &self,
            _is_super: bool,
            _session: &mut PackSession<'_>,
        ) -> Result<Bundle, PackError> {
            Ok(Bundle::of("test.Leaf", 1)?.with("value", self.value)?)
        }

        fn finish_resolving(&mut self, _resolver: &Resolver<'_>) -> Result<bool, UnpackError> {
            Ok(true)
        }
    }

    fn leaf(identity: &IdentityService, value: i32) -> Leaf {
        Leaf {
            id: identity.allocate(&TypeName::new("test.Leaf").unwrap()),
            value,
        }
    }

    #[test]
    fn test_insert_and_downcast() {
        let identity = IdentityService::new();
        let mut graph = EntityGraph::new();
        let a = graph.add(leaf(&identity, 1));
        let b = graph.add(leaf(&identity, 2));

        assert_eq!(graph.len(), 2);
        assert_eq!(graph.get_as::<Leaf>(b).unwrap().value, 2);

        graph.get_as_mut::<Leaf>(a).unwrap().value = 10;
        assert_eq!(graph.get_as::<Leaf>(a).unwrap().value, 10);
        assert_eq!(graph.nodes_of::<Leaf>(), vec![a, b]);
    }

    #[test]
    fn test_checked_out_entity_is_invisible() {
        let identity = IdentityService::new();
        let mut graph = EntityGraph::new();
        let a = graph.add(leaf(&identity, 1));

        let entity = graph.check_out(a).unwrap();
        assert!(!graph.contains(a));
        assert_eq!(graph.iter().count(), 0);

        graph.check_in(a, entity);
        assert!(graph.contains(a));
    }

    #[test]
    fn test_nodes_of_skips_checked_out() {
        let identity = IdentityService::new();
        let mut graph = EntityGraph::new();
        let a = graph.add(leaf(&identity, 1));
        let b = graph.add(leaf(&identity, 2));

        let entity = graph.check_out(a).unwrap();
        assert_eq!(graph.nodes_of::<Leaf>(), vec![b]);
        graph.check_in(a, entity);
        assert_eq!(graph.nodes_of::<Leaf>(), vec![a, b]);
    }

    #[test]
    fn test_unknown_node_is_none() {
        let graph = EntityGraph::new();
        assert!(graph.get(NodeId::from_index(3)).is_none());
    }
}
