//! Unpacking: text to entity graph.
//!
//! Unpacking runs in two phases:
//!
//! 1. Every definition in the stream is parsed into a bundle and handed to
//!    its type's factory, which builds a shallow entity holding unresolved
//!    links. Each entity is registered under its `(type, entity)` key.
//! 2. A convergence loop calls [`Packable::finish_resolving`] on every
//!    unfinished entity, pass after pass, until all report finished. A pass
//!    that finishes nothing while entities remain is a deadlock.
//!
//! Because links resolve to arena slots rather than to finished objects, a
//! cycle `a -> b -> a` converges in a single pass.

use std::collections::HashMap;
use std::io::BufRead;

use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{EngineConfig, VersionPolicy};
use crate::context::EngineContext;
use crate::entity::{EntityGraph, NodeId, Packable};
use crate::error::{Deadlock, UnpackError};
use crate::identity::{IdentityService, InstanceId, SessionTypes, TypeName};
use crate::metadata::{self, MetadataHandler};
use crate::reference::{EntityRef, RefKey};
use crate::registry::{EntityFactory, FactoryRegistry};
use crate::text::parser::{Definition, Parser, Statement};
use crate::text::Header;

/// What a factory can see while constructing an entity.
pub struct UnpackContext<'a> {
    identity: &'a IdentityService,
    types: &'a SessionTypes,
    config: &'a EngineConfig,
}

impl<'a> UnpackContext<'a> {
    pub fn new(
        identity: &'a IdentityService,
        types: &'a SessionTypes,
        config: &'a EngineConfig,
    ) -> Self {
        Self {
            identity,
            types,
            config,
        }
    }

    pub fn identity(&self) -> &IdentityService {
        self.identity
    }

    /// Fresh instance identity for a new entity of `type_name`.
    pub fn allocate(&self, type_name: &TypeName) -> InstanceId {
        self.identity.allocate(type_name)
    }

    /// Type name behind a wire type id of this stream.
    pub fn type_name(&self, type_id: u32) -> Option<&TypeName> {
        self.types.name(type_id)
    }

    pub fn config(&self) -> &EngineConfig {
        self.config
    }
}

/// Read-only view of the session handed to [`Packable::finish_resolving`].
///
/// The entity being finished is checked out of the graph for the duration
/// of the call, so [`Resolver::get`] returns `None` for its own node.
pub struct Resolver<'a> {
    graph: &'a EntityGraph,
    nodes: &'a HashMap<RefKey, NodeId>,
    aliases: &'a IndexMap<String, NodeId>,
    finished: &'a [bool],
}

impl<'a> Resolver<'a> {
    /// Node constructed for `reference`, finished or not.
    pub fn resolve(&self, reference: &EntityRef) -> Option<NodeId> {
        self.nodes.get(&reference.key()).copied()
    }

    pub fn is_finished(&self, node: NodeId) -> bool {
        self.finished.get(node.index()).copied().unwrap_or(false)
    }

    pub fn get(&self, node: NodeId) -> Option<&'a dyn Packable> {
        self.graph.get(node)
    }

    pub fn get_as<T: Packable>(&self, node: NodeId) -> Option<&'a T> {
        self.graph.get_as::<T>(node)
    }

    pub fn lookup_alias(&self, alias: &str) -> Option<NodeId> {
        self.aliases.get(alias).copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct UnpackStats {
    /// Resolution passes run.
    pub passes: usize,
    pub entities: usize,
    pub metadata: usize,
}

/// A fully resolved graph.
#[derive(Debug)]
pub struct Unpacked {
    pub header: Header,
    pub graph: EntityGraph,
    /// Alias to node, in order of first appearance.
    pub aliases: IndexMap<String, NodeId>,
    pub references: HashMap<RefKey, NodeId>,
    pub stats: UnpackStats,
}

impl Unpacked {
    pub fn by_alias(&self, alias: &str) -> Option<NodeId> {
        self.aliases.get(alias).copied()
    }

    pub fn by_ref(&self, reference: &EntityRef) -> Option<NodeId> {
        self.references.get(&reference.key()).copied()
    }

    /// Entity under `alias`, downcast to `T`.
    pub fn alias_as<T: Packable>(&self, alias: &str) -> Option<&T> {
        self.by_alias(alias)
            .and_then(|node| self.graph.get_as::<T>(node))
    }
}

/// Reader of one packed stream.
///
/// # Example
///
/// ```ignore
/// use graphpack::{EngineContext, FactoryRegistry, Unpacker};
///
/// let unpacked = Unpacker::new(reader, &registry, &EngineContext::shared()).unpack()?;
/// let head = unpacked.by_alias("head");
/// ```
pub struct Unpacker<'r, R> {
    parser: Parser<R>,
    registry: &'r FactoryRegistry,
    context: EngineContext,
    handlers: Vec<Box<dyn MetadataHandler>>,
}

struct Constructed {
    graph: EntityGraph,
    nodes: HashMap<RefKey, NodeId>,
    aliases: IndexMap<String, NodeId>,
    /// Definition order.
    order: Vec<(NodeId, EntityRef)>,
    metadata: usize,
}

impl<'r, R: BufRead> Unpacker<'r, R> {
    pub fn new(reader: R, registry: &'r FactoryRegistry, context: &EngineContext) -> Self {
        Self {
            parser: Parser::new(reader),
            registry,
            context: context.clone(),
            handlers: Vec::new(),
        }
    }

    /// Receive every metadata line of the stream, in order.
    pub fn add_metadata_handler(&mut self, handler: Box<dyn MetadataHandler>) {
        self.handlers.push(handler);
    }

    /// Read the whole stream and resolve it.
    ///
    /// On failure nothing of the graph is returned, except inside a
    /// [`Deadlock`] diagnostic.
    pub fn unpack(mut self) -> Result<Unpacked, UnpackError> {
        let header = self.parser.read_header()?.clone();
        debug!("Unpacking stream '{}' (format {})", header.label, header.version);

        let constructed = self.construct_all()?;
        let Constructed {
            mut graph,
            nodes,
            aliases,
            order,
            metadata,
        } = constructed;
        let entities = order.len();

        let passes = resolve_all(&mut graph, &nodes, &aliases, order)?;
        info!("Unpacked {} entities in {} passes", entities, passes);

        Ok(Unpacked {
            header,
            graph,
            aliases,
            references: nodes,
            stats: UnpackStats {
                passes,
                entities,
                metadata,
            },
        })
    }

    fn construct_all(&mut self) -> Result<Constructed, UnpackError> {
        let mut constructed = Constructed {
            graph: EntityGraph::new(),
            nodes: HashMap::new(),
            aliases: IndexMap::new(),
            order: Vec::new(),
            metadata: 0,
        };

        while let Some(statement) = self.parser.next_statement()? {
            match statement {
                Statement::Metadata { name, value } => {
                    constructed.metadata += 1;
                    for handler in self.handlers.iter_mut() {
                        metadata::dispatch(handler.as_mut(), &name, &value);
                    }
                }
                Statement::TypeAlias { id, name } => {
                    debug!("Type alias {} -> {}", id, name);
                }
                Statement::Definition(definition) => {
                    self.construct(&mut constructed, definition)?;
                }
            }
        }
        Ok(constructed)
    }

    fn construct(
        &self,
        constructed: &mut Constructed,
        definition: Definition,
    ) -> Result<(), UnpackError> {
        let Definition {
            reference,
            bundle,
            position,
        } = definition;
        let type_name = bundle.type_name().as_str();

        let factory = self
            .registry
            .get(type_name)
            .ok_or_else(|| UnpackError::UnknownType(type_name.to_string()))?;
        self.check_version(factory, bundle.version())?;

        let key = reference.key();
        if constructed.nodes.contains_key(&key) {
            return Err(UnpackError::DuplicateDefinition(reference));
        }

        let context = UnpackContext::new(
            &self.context.identity,
            self.parser.types(),
            &self.context.config,
        );
        let entity = factory.construct(&context, &bundle, &reference)?;
        let node = constructed.graph.insert(entity);
        constructed.nodes.insert(key, node);
        debug!("Constructed {} at {} as {}", reference, position, node);

        for alias in &reference.aliases {
            match constructed.aliases.get(alias) {
                Some(existing) if *existing != node => {
                    return Err(UnpackError::DuplicateAlias(alias.clone()));
                }
                Some(_) => {}
                None => {
                    constructed.aliases.insert(alias.clone(), node);
                }
            }
        }
        constructed.order.push((node, reference));
        Ok(())
    }

    fn check_version(&self, factory: &dyn EntityFactory, version: u32) -> Result<(), UnpackError> {
        let oldest = factory.oldest_version();
        let newest = factory.newest_version();
        if (oldest..=newest).contains(&version) {
            return Ok(());
        }
        match self.context.config.version_policy {
            VersionPolicy::Strict => Err(UnpackError::UnsupportedVersion {
                type_name: factory.type_name().to_string(),
                version,
                oldest,
                newest,
            }),
            VersionPolicy::Lenient => {
                warn!(
                    "Accepting {} version {} outside supported range {}..={}",
                    factory.type_name(),
                    version,
                    oldest,
                    newest
                );
                Ok(())
            }
        }
    }
}

/// Convergence loop. Returns the number of passes run.
fn resolve_all(
    graph: &mut EntityGraph,
    nodes: &HashMap<RefKey, NodeId>,
    aliases: &IndexMap<String, NodeId>,
    mut unfinished: Vec<(NodeId, EntityRef)>,
) -> Result<usize, UnpackError> {
    let mut finished = vec![false; graph.len()];
    let mut passes = 0;

    while !unfinished.is_empty() {
        passes += 1;
        let before = unfinished.len();
        let mut remaining = Vec::with_capacity(before);

        for (node, reference) in unfinished {
            let mut entity = graph
                .check_out(node)
                .ok_or_else(|| UnpackError::entity(&reference, "entity missing from graph"))?;
            let result = {
                let resolver = Resolver {
                    graph: &*graph,
                    nodes,
                    aliases,
                    finished: &finished,
                };
                entity.finish_resolving(&resolver)
            };
            graph.check_in(node, entity);

            match result {
                Ok(true) => finished[node.index()] = true,
                Ok(false) => remaining.push((node, reference)),
                Err(UnpackError::Entity {
                    reference: None,
                    message,
                }) => return Err(UnpackError::entity(&reference, message)),
                Err(err) => return Err(err),
            }
        }

        debug!(
            "Resolution pass {}: {} finished, {} remaining",
            passes,
            before - remaining.len(),
            remaining.len()
        );
        if remaining.len() == before {
            warn!("Resolution deadlock with {} unfinished entities", before);
            let unfinished = remaining.into_iter().map(|(_, reference)| reference).collect();
            return Err(UnpackError::Deadlock(Box::new(Deadlock {
                unfinished,
                passes,
                partial: std::mem::take(graph),
            })));
        }
        unfinished = remaining;
    }
    Ok(passes)
}

/// Unpack a complete stream held in memory.
pub fn unpack_str(
    text: &str,
    registry: &FactoryRegistry,
    context: &EngineContext,
) -> Result<Unpacked, UnpackError> {
    Unpacker::new(text.as_bytes(), registry, context).unpack()
}
