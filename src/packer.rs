//! Packing: entity graph to text.
//!
//! A [`Packer`] writes the stream header when created, accepts roots through
//! [`Packer::pack`], and writes everything on [`Packer::finish`]. Entities
//! reachable from the roots are discovered while their referrers bundle
//! themselves, so finishing runs in passes: each pass writes every entity
//! first seen during the previous one, until a pass finds nothing new.

use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::bundle::{Bundle, Holder};
use crate::config::EngineConfig;
use crate::context::EngineContext;
use crate::entity::{EntityGraph, NodeId};
use crate::error::{BundleError, PackError};
use crate::identity::{IdentityService, InstanceId, SessionTypes, TypeName};
use crate::metadata::MetaValue;
use crate::reference::{EntityRef, Link};
use crate::text::{writer, FormatVersion};

/// Summary of a finished packing session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PackStats {
    /// Passes that wrote at least one entity.
    pub passes: usize,
    pub entities: usize,
    pub types: usize,
}

#[derive(Debug)]
struct Record {
    node: NodeId,
    /// Value form of the wire reference: no version, no aliases.
    reference: EntityRef,
    aliases: Vec<String>,
}

/// Write-side session state, handed to [`Packable::bundle_self`].
///
/// [`Packable::bundle_self`]: crate::Packable::bundle_self
pub struct PackSession<'g> {
    graph: &'g EntityGraph,
    identity: Arc<IdentityService>,
    types: SessionTypes,
    records: Vec<Record>,
    by_instance: HashMap<InstanceId, usize>,
    next_entity: HashMap<u32, u64>,
    pending: Vec<usize>,
    pending_type_lines: Vec<String>,
}

impl<'g> PackSession<'g> {
    fn new(graph: &'g EntityGraph, identity: Arc<IdentityService>) -> Self {
        Self {
            graph,
            identity,
            types: SessionTypes::new(),
            records: Vec::new(),
            by_instance: HashMap::new(),
            next_entity: HashMap::new(),
            pending: Vec::new(),
            pending_type_lines: Vec::new(),
        }
    }

    /// The graph being packed.
    pub fn graph(&self) -> &'g EntityGraph {
        self.graph
    }

    /// Type ids allocated so far in this stream.
    pub fn types(&self) -> &SessionTypes {
        &self.types
    }

    /// Wire reference for `node`, scheduling it for packing on first use.
    pub fn reference(&mut self, node: NodeId) -> Result<EntityRef, PackError> {
        let index = self.record_index(node)?;
        Ok(self.records[index].reference.clone())
    }

    /// [`PackSession::reference`] as a holder, null for `None`.
    pub fn reference_opt(&mut self, node: Option<NodeId>) -> Result<Holder, PackError> {
        match node {
            Some(node) => Ok(Holder::Ref(self.reference(node)?)),
            None => Ok(Holder::Null),
        }
    }

    pub fn link(&mut self, link: &Link) -> Result<Holder, PackError> {
        match link {
            Link::Resolved(node) => Ok(Holder::Ref(self.reference(*node)?)),
            Link::Unresolved(reference) => Err(PackError::UnresolvedLink(reference.clone())),
        }
    }

    pub fn link_opt(&mut self, link: Option<&Link>) -> Result<Holder, PackError> {
        match link {
            Some(link) => self.link(link),
            None => Ok(Holder::Null),
        }
    }

    fn record_index(&mut self, node: NodeId) -> Result<usize, PackError> {
        let entity = self
            .graph
            .get(node)
            .ok_or(PackError::UnknownNode(node.index()))?;
        let instance = entity.instance_id();
        if let Some(&index) = self.by_instance.get(&instance) {
            return Ok(index);
        }

        let type_name = self
            .identity
            .type_name(instance.type_id)
            .ok_or(PackError::UnknownType(instance.type_id))?;
        let type_id = self.intern_type(&type_name);
        let counter = self.next_entity.entry(type_id).or_insert(0);
        *counter += 1;

        let index = self.records.len();
        self.records.push(Record {
            node,
            reference: EntityRef::new(type_id, *counter),
            aliases: Vec::new(),
        });
        self.by_instance.insert(instance, index);
        self.pending.push(index);
        Ok(index)
    }

    /// Wire id for `name`, queueing its alias line when it is new.
    fn intern_type(&mut self, name: &TypeName) -> u32 {
        let (id, newly) = self.types.intern(name);
        if newly {
            debug!("Type alias {} -> {}", id, name);
            self.pending_type_lines
                .push(writer::type_alias_line(id, name));
        }
        id
    }
}

/// Streaming writer of one packed graph.
///
/// # Example
///
/// ```ignore
/// use graphpack::{EngineContext, Packer};
///
/// let mut packer = Packer::new(std::io::stdout(), &graph, &EngineContext::shared())?;
/// packer.pack(Some("root"), root)?;
/// let stats = packer.finish()?;
/// ```
pub struct Packer<'g, W: Write> {
    out: W,
    session: PackSession<'g>,
    config: EngineConfig,
    stats: PackStats,
    finished: bool,
}

impl<'g, W: Write> Packer<'g, W> {
    /// Create a packer and write the stream header.
    pub fn new(out: W, graph: &'g EntityGraph, context: &EngineContext) -> Result<Self, PackError> {
        let mut packer = Self {
            out,
            session: PackSession::new(graph, Arc::clone(&context.identity)),
            config: context.config.clone(),
            stats: PackStats::default(),
            finished: false,
        };
        let header = writer::header_line(FormatVersion::CURRENT, &packer.config.label);
        writeln!(packer.out, "{}", header)?;
        if packer.config.stamp_created {
            let millis = chrono::Utc::now().timestamp_millis();
            packer.write_metadata("created", &MetaValue::Long(millis))?;
        }
        Ok(packer)
    }

    /// Write a `~name=value;` line immediately.
    pub fn write_metadata(&mut self, name: &str, value: &MetaValue) -> Result<(), PackError> {
        if self.finished {
            return Err(PackError::Finished);
        }
        if !crate::bundle::is_identifier(name) {
            return Err(BundleError::InvalidName(name.to_string()).into());
        }
        writeln!(self.out, "{}", writer::metadata_line(name, value))?;
        Ok(())
    }

    /// Queue `node` as a root, optionally under `alias`.
    ///
    /// Packing an instance again is a no-op apart from merging the new alias
    /// into the single definition that will be written.
    pub fn pack(&mut self, alias: Option<&str>, node: NodeId) -> Result<EntityRef, PackError> {
        if self.finished {
            return Err(PackError::Finished);
        }
        let index = self.session.record_index(node)?;
        if let Some(alias) = alias {
            let alias = alias.trim();
            if alias.is_empty() {
                return Err(BundleError::InvalidName(alias.to_string()).into());
            }
            let aliases = &mut self.session.records[index].aliases;
            if !aliases.iter().any(|a| a == alias) {
                aliases.push(alias.to_string());
            }
        }
        Ok(self.session.records[index].reference.clone())
    }

    /// Write every queued entity and everything reachable from it.
    pub fn finish(&mut self) -> Result<PackStats, PackError> {
        if self.finished {
            return Err(PackError::AlreadyFinished);
        }
        self.finished = true;

        loop {
            let batch = std::mem::take(&mut self.session.pending);
            if batch.is_empty() {
                break;
            }
            self.stats.passes += 1;
            debug!("Pack pass {}: {} entities", self.stats.passes, batch.len());
            if self.config.annotate_passes {
                writeln!(self.out, "# pass {}", self.stats.passes)?;
            }
            for index in batch {
                self.emit(index)?;
            }
        }

        self.out.flush()?;
        self.stats.types = self.session.types.len();
        info!(
            "Packed {} entities of {} types in {} passes",
            self.stats.entities, self.stats.types, self.stats.passes
        );
        Ok(self.stats)
    }

    fn emit(&mut self, index: usize) -> Result<(), PackError> {
        let graph = self.session.graph;
        let node = self.session.records[index].node;
        let entity = graph
            .get(node)
            .ok_or(PackError::UnknownNode(node.index()))?;
        let bundle = entity.bundle_self(false, &mut self.session)?;

        let record_type = self.session.records[index].reference.type_id;
        let bundle_type = self.session.intern_type(bundle.type_name());
        if bundle_type != record_type {
            let allocated = self
                .session
                .types
                .name(record_type)
                .map(|name| name.to_string())
                .unwrap_or_default();
            return Err(PackError::TypeMismatch {
                allocated,
                bundled: bundle.type_name().to_string(),
            });
        }
        let super_ids = self.super_type_ids(&bundle);

        for line in std::mem::take(&mut self.session.pending_type_lines) {
            writeln!(self.out, "{}", line)?;
        }

        let record = &self.session.records[index];
        let mut header = record.reference.clone().with_version(bundle.version());
        header.aliases = record.aliases.clone();

        let mut line = String::new();
        writer::write_definition(&mut line, &header, &bundle, &super_ids);
        line.push(';');
        writeln!(self.out, "{}", line)?;
        self.stats.entities += 1;
        Ok(())
    }

    fn super_type_ids(&mut self, bundle: &Bundle) -> Vec<u32> {
        let mut ids = Vec::new();
        let mut current = bundle.super_bundle();
        while let Some(super_bundle) = current {
            ids.push(self.session.intern_type(super_bundle.type_name()));
            current = super_bundle.super_bundle();
        }
        ids
    }

    /// Statistics so far; final once [`Packer::finish`] has returned.
    pub fn stats(&self) -> PackStats {
        self.stats
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Consume the packer, returning the output sink.
    pub fn into_inner(self) -> W {
        self.out
    }
}

/// Pack `roots` (alias, node) into a string.
pub fn pack_to_string(
    graph: &EntityGraph,
    roots: &[(Option<&str>, NodeId)],
    context: &EngineContext,
) -> Result<String, PackError> {
    let mut packer = Packer::new(Vec::new(), graph, context)?;
    for (alias, node) in roots {
        packer.pack(*alias, *node)?;
    }
    packer.finish()?;
    Ok(String::from_utf8_lossy(&packer.into_inner()).into_owned())
}
