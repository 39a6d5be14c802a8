//! # graphpack: text serialization for entity graphs
//!
//! graphpack flattens a graph of domain entities into a versioned,
//! human-readable text stream and reads it back, including graphs that
//! contain reference cycles.
//!
//! ## Features
//!
//! - **Readable wire format**: one line per entity, typed literals, comments
//!   and metadata lines
//! - **Structural sharing**: an entity referenced from many places is written
//!   once and read back as one node
//! - **Cycle-tolerant unpacking**: entities are constructed shallowly, then
//!   linked by a multi-pass convergence loop with deadlock detection
//! - **Versioned types**: every definition carries its bundle version and
//!   factories declare the range they accept
//!
//! ## Example stream
//!
//! ```text
//! &1000000:"graphpack";
//! 1@"demo.Node";
//! r1:1v1/"head"=(name=s"a",next=r1:2);
//! r1:2v1=(name=s"b",next=r1:1);
//! ```
//!
//! ## Example: round trip
//!
//! ```ignore
//! use graphpack::{pack_to_string, unpack_str, EngineContext, FactoryRegistry};
//!
//! let context = EngineContext::shared();
//! let text = pack_to_string(&graph, &[(Some("head"), head)], &context)?;
//!
//! let mut registry = FactoryRegistry::new();
//! registry.register_fn("demo.Node", 1..=1, construct_node)?;
//! let unpacked = unpack_str(&text, &registry, &context)?;
//! ```

// Core model
pub mod bundle;
pub mod entity;
pub mod error;
pub mod identity;
pub mod metadata;
pub mod reference;

// Sessions
pub mod config;
pub mod context;
pub mod packer;
pub mod registry;
pub mod unpacker;

// Wire format
pub mod text;

// Re-export key types
pub use bundle::{BoxedArray, Bundle, ElemKind, FromHolder, Holder, PrimitiveArray};
pub use entity::{EntityGraph, NodeId, Packable};
pub use error::{BundleError, ConfigError, Deadlock, PackError, ParseError, ParseErrorKind, UnpackError};
pub use identity::{IdentityService, InstanceId, SessionTypes, TypeName};
pub use metadata::{MetaValue, MetadataHandler, MetadataRecorder};
pub use reference::{EntityRef, Link, RefKey};

pub use config::{EngineConfig, VersionPolicy};
pub use context::EngineContext;
pub use packer::{pack_to_string, PackSession, PackStats, Packer};
pub use registry::{EntityFactory, FactoryRegistry, FnFactory};
pub use unpacker::{unpack_str, Resolver, UnpackContext, UnpackStats, Unpacked, Unpacker};

pub use text::{FormatVersion, Header, Position};
