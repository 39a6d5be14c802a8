//! Factory registry used by the unpacker to build entities by type name.
//!
//! Registration is an explicit step performed by the host application
//! before unpacking; nothing registers itself.

use std::collections::HashMap;
use std::ops::RangeInclusive;

use crate::bundle::Bundle;
use crate::entity::Packable;
use crate::error::{BundleError, UnpackError};
use crate::identity::TypeName;
use crate::reference::EntityRef;
use crate::unpacker::UnpackContext;

/// Builds shallow entities of one type from their bundles.
pub trait EntityFactory: Send + Sync {
    fn type_name(&self) -> &TypeName;

    /// Oldest bundle version this factory can read.
    fn oldest_version(&self) -> u32;

    /// Newest bundle version this factory can read.
    fn newest_version(&self) -> u32;

    /// Construct an entity from its own bundle fields.
    ///
    /// Reference fields must be kept as unresolved links; the entities they
    /// name may not exist yet. Linking happens later in
    /// [`Packable::finish_resolving`].
    fn construct(
        &self,
        context: &UnpackContext<'_>,
        bundle: &Bundle,
        reference: &EntityRef,
    ) -> Result<Box<dyn Packable>, UnpackError>;
}

/// Closure-backed [`EntityFactory`].
pub struct FnFactory<F> {
    type_name: TypeName,
    versions: RangeInclusive<u32>,
    construct: F,
}

impl<F> FnFactory<F>
where
    F: Fn(&UnpackContext<'_>, &Bundle, &EntityRef) -> Result<Box<dyn Packable>, UnpackError>
        + Send
        + Sync,
{
    pub fn new(type_name: TypeName, versions: RangeInclusive<u32>, construct: F) -> Self {
        Self {
            type_name,
            versions,
            construct,
        }
    }
}

impl<F> EntityFactory for FnFactory<F>
where
    F: Fn(&UnpackContext<'_>, &Bundle, &EntityRef) -> Result<Box<dyn Packable>, UnpackError>
        + Send
        + Sync,
{
    fn type_name(&self) -> &TypeName {
        &self.type_name
    }

    fn oldest_version(&self) -> u32 {
        *self.versions.start()
    }

    fn newest_version(&self) -> u32 {
        *self.versions.end()
    }

    fn construct(
        &self,
        context: &UnpackContext<'_>,
        bundle: &Bundle,
        reference: &EntityRef,
    ) -> Result<Box<dyn Packable>, UnpackError> {
        (self.construct)(context, bundle, reference)
    }
}

/// Registry for looking up entity factories by type name
#[derive(Default)]
pub struct FactoryRegistry {
    factories: HashMap<String, Box<dyn EntityFactory>>,
}

impl FactoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under its own type name, replacing any previous one.
    pub fn register(&mut self, factory: Box<dyn EntityFactory>) {
        self.factories
            .insert(factory.type_name().as_str().to_string(), factory);
    }

    /// Register a closure as the factory for `type_name`.
    ///
    /// # Arguments
    ///
    /// * `type_name` - Name written in the stream's type alias lines
    /// * `versions` - Inclusive range of readable bundle versions
    /// * `construct` - Builds a shallow entity from a bundle
    ///
    /// # Example
    ///
    /// ```ignore
    /// use graphpack::{FactoryRegistry, Link};
    ///
    /// let mut registry = FactoryRegistry::new();
    /// registry.register_fn("demo.Node", 1..=1, |ctx, bundle, _reference| {
    ///     Ok(Box::new(Node {
    ///         id: ctx.allocate(bundle.type_name()),
    ///         next: bundle.get_ref("next")?.map(Link::Unresolved),
    ///     }))
    /// })?;
    /// ```
    pub fn register_fn<F>(
        &mut self,
        type_name: &str,
        versions: RangeInclusive<u32>,
        construct: F,
    ) -> Result<(), BundleError>
    where
        F: Fn(&UnpackContext<'_>, &Bundle, &EntityRef) -> Result<Box<dyn Packable>, UnpackError>
            + Send
            + Sync
            + 'static,
    {
        let name = TypeName::new(type_name)
            .ok_or_else(|| BundleError::InvalidName(type_name.to_string()))?;
        self.register(Box::new(FnFactory::new(name, versions, construct)));
        Ok(())
    }

    pub fn get(&self, type_name: &str) -> Option<&dyn EntityFactory> {
        self.factories.get(type_name).map(|factory| factory.as_ref())
    }

    pub fn has_factory(&self, type_name: &str) -> bool {
        self.factories.contains_key(type_name)
    }

    /// Registered type names, sorted.
    pub fn list_factories(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn count(&self) -> usize {
        self.factories.len()
    }
}
