//! Error types for packing, parsing and unpacking.
//!
//! Every failure in the engine surfaces as one of these enums. Parse errors
//! carry the position and offending token; unpack errors wrap them together
//! with the semantic and resolution failures of a session.

use std::fmt;
use std::io;

use crate::entity::EntityGraph;
use crate::reference::EntityRef;
use crate::text::Position;

/// Classifies a failure raised while reading the text format.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseErrorKind {
    /// Reading the underlying input failed.
    Io(String),
    /// A character that cannot start or continue a token.
    UnexpectedChar(char),
    /// Input ended in the middle of a token or clause.
    UnexpectedEof,
    /// A quoted string was not closed before end of input.
    UnterminatedString,
    /// An escape sequence other than `\b \n \r \t \\ \' \"`.
    BadEscape(char),
    /// A numeric literal that does not fit or does not parse.
    BadNumber(String),
    /// Array length, element tag or element syntax is wrong.
    MalformedArray(String),
    /// A metadata line that does not follow `~NAME=value;`.
    MalformedMetadata(String),
    /// A valid token in a position the grammar does not allow.
    UnexpectedToken { expected: String },
    /// The format header is missing or carries an unsupported version.
    BadHeader(String),
    /// A type id was used before its `@` declaration.
    UndeclaredType(u32),
    /// A type id or type name was declared twice with different partners.
    ConflictingTypeAlias(String),
    /// The same field name appears twice in one bundle.
    DuplicateField(String),
    /// Entity id 0 outside a super clause, or non-zero inside one.
    MisplacedEntityId(u64),
    /// A definition or super clause without `v<version>`.
    MissingVersion,
    /// A value-position reference that carries a version.
    VersionOnValue,
    /// A value-position reference that carries aliases.
    AliasOnValue,
    /// A super clause that is not the first item of a body.
    MisplacedSuper,
    /// Super clauses nested deeper than the parser accepts.
    SuperTooDeep(usize),
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseErrorKind::Io(msg) => write!(f, "read failed: {}", msg),
            ParseErrorKind::UnexpectedChar(c) => write!(f, "unexpected character {:?}", c),
            ParseErrorKind::UnexpectedEof => write!(f, "unexpected end of input"),
            ParseErrorKind::UnterminatedString => write!(f, "unterminated string"),
            ParseErrorKind::BadEscape(c) => write!(f, "bad escape sequence \\{}", c),
            ParseErrorKind::BadNumber(msg) => write!(f, "bad number: {}", msg),
            ParseErrorKind::MalformedArray(msg) => write!(f, "malformed array: {}", msg),
            ParseErrorKind::MalformedMetadata(msg) => write!(f, "malformed metadata: {}", msg),
            ParseErrorKind::UnexpectedToken { expected } => {
                write!(f, "unexpected token, expected {}", expected)
            }
            ParseErrorKind::BadHeader(msg) => write!(f, "bad format header: {}", msg),
            ParseErrorKind::UndeclaredType(id) => {
                write!(f, "type id {} used before its declaration", id)
            }
            ParseErrorKind::ConflictingTypeAlias(msg) => {
                write!(f, "conflicting type alias: {}", msg)
            }
            ParseErrorKind::DuplicateField(name) => write!(f, "duplicate field '{}'", name),
            ParseErrorKind::MisplacedEntityId(id) => {
                if *id == 0 {
                    write!(f, "entity id 0 is only valid in a super clause")
                } else {
                    write!(f, "super clause must use entity id 0, found {}", id)
                }
            }
            ParseErrorKind::MissingVersion => write!(f, "definition is missing its version"),
            ParseErrorKind::VersionOnValue => {
                write!(f, "reference in value position must not carry a version")
            }
            ParseErrorKind::AliasOnValue => {
                write!(f, "reference in value position must not carry aliases")
            }
            ParseErrorKind::MisplacedSuper => {
                write!(f, "super clause must be the first item of a body")
            }
            ParseErrorKind::SuperTooDeep(limit) => {
                write!(f, "super clauses nested more than {} deep", limit)
            }
        }
    }
}

/// A lexical, grammar or semantic failure at a known position.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub position: Position,
    /// Rendering of the offending token, when one was read.
    pub token: Option<String>,
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, position: Position) -> Self {
        Self {
            kind,
            position,
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.kind, self.position)?;
        if let Some(token) = &self.token {
            write!(f, " (found {})", token)?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseError {}

/// Error raised when reading or writing bundle fields
#[derive(Debug, Clone, PartialEq)]
pub enum BundleError {
    FieldMissing {
        field: String,
    },
    WrongKind {
        field: String,
        expected: &'static str,
        actual: &'static str,
    },
    DuplicateField(String),
    InvalidName(String),
}

impl fmt::Display for BundleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BundleError::FieldMissing { field } => write!(f, "Field '{}' is missing", field),
            BundleError::WrongKind {
                field,
                expected,
                actual,
            } => write!(
                f,
                "Field '{}' holds {}, expected {}",
                field, actual, expected
            ),
            BundleError::DuplicateField(name) => write!(f, "Duplicate field '{}'", name),
            BundleError::InvalidName(name) => write!(f, "Invalid name '{}'", name),
        }
    }
}

impl std::error::Error for BundleError {}

/// Error type for packer operations
#[derive(Debug)]
pub enum PackError {
    Io(io::Error),
    /// `pack` or `write_metadata` called after `finish`.
    Finished,
    /// `finish` called a second time.
    AlreadyFinished,
    UnknownNode(usize),
    /// An identity service lookup failed for a referenced entity.
    UnknownType(u32),
    /// The bundle's type differs from the type the entity was allocated under.
    TypeMismatch {
        allocated: String,
        bundled: String,
    },
    /// A link that never resolved during unpacking cannot be written.
    UnresolvedLink(EntityRef),
    Bundle(BundleError),
}

impl fmt::Display for PackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackError::Io(e) => write!(f, "IO error: {}", e),
            PackError::Finished => write!(f, "Packer already finished; no further packing"),
            PackError::AlreadyFinished => write!(f, "Packer finished twice"),
            PackError::UnknownNode(idx) => write!(f, "Node #{} is not in the graph", idx),
            PackError::UnknownType(id) => {
                write!(f, "Type id {} is unknown to the identity service", id)
            }
            PackError::TypeMismatch { allocated, bundled } => write!(
                f,
                "Entity allocated as '{}' bundled itself as '{}'",
                allocated, bundled
            ),
            PackError::UnresolvedLink(r) => write!(f, "Cannot pack unresolved link {}", r),
            PackError::Bundle(e) => write!(f, "Bundle error: {}", e),
        }
    }
}

impl std::error::Error for PackError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PackError::Io(e) => Some(e),
            PackError::Bundle(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for PackError {
    fn from(err: io::Error) -> Self {
        PackError::Io(err)
    }
}

impl From<BundleError> for PackError {
    fn from(err: BundleError) -> Self {
        PackError::Bundle(err)
    }
}

/// Diagnostic payload of a resolution deadlock.
///
/// Holds every reference that never finished and the partially built graph
/// as it stood when the zero-progress pass was detected.
#[derive(Debug)]
pub struct Deadlock {
    pub unfinished: Vec<EntityRef>,
    pub passes: usize,
    pub partial: EntityGraph,
}

/// Error type for unpacker operations
#[derive(Debug)]
pub enum UnpackError {
    Io(io::Error),
    Parse(ParseError),
    /// No factory is registered for the type name.
    UnknownType(String),
    UnsupportedVersion {
        type_name: String,
        version: u32,
        oldest: u32,
        newest: u32,
    },
    /// The same (type, entity) pair was defined twice.
    DuplicateDefinition(EntityRef),
    /// One alias names two different entities.
    DuplicateAlias(String),
    /// A factory or `finish_resolving` rejected an entity.
    Entity {
        reference: Option<EntityRef>,
        message: String,
    },
    Bundle(BundleError),
    Deadlock(Box<Deadlock>),
}

impl UnpackError {
    pub fn entity(reference: &EntityRef, message: impl Into<String>) -> Self {
        UnpackError::Entity {
            reference: Some(reference.clone()),
            message: message.into(),
        }
    }

    /// The unfinished references when this is a deadlock.
    pub fn unfinished(&self) -> Option<&[EntityRef]> {
        match self {
            UnpackError::Deadlock(d) => Some(&d.unfinished),
            _ => None,
        }
    }
}

impl fmt::Display for UnpackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnpackError::Io(e) => write!(f, "IO error: {}", e),
            UnpackError::Parse(e) => write!(f, "Parse error: {}", e),
            UnpackError::UnknownType(name) => {
                write!(f, "No factory registered for type '{}'", name)
            }
            UnpackError::UnsupportedVersion {
                type_name,
                version,
                oldest,
                newest,
            } => write!(
                f,
                "Type '{}' version {} outside supported range {}..={}",
                type_name, version, oldest, newest
            ),
            UnpackError::DuplicateDefinition(r) => write!(f, "Entity {} defined twice", r),
            UnpackError::DuplicateAlias(alias) => {
                write!(f, "Alias '{}' names more than one entity", alias)
            }
            UnpackError::Entity { reference, message } => match reference {
                Some(r) => write!(f, "Entity {}: {}", r, message),
                None => write!(f, "Entity error: {}", message),
            },
            UnpackError::Bundle(e) => write!(f, "Bundle error: {}", e),
            UnpackError::Deadlock(d) => {
                let refs: Vec<String> = d.unfinished.iter().map(|r| r.to_string()).collect();
                write!(
                    f,
                    "Resolution deadlock after {} passes; unfinished: {}",
                    d.passes,
                    refs.join(", ")
                )
            }
        }
    }
}

impl std::error::Error for UnpackError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            UnpackError::Io(e) => Some(e),
            UnpackError::Parse(e) => Some(e),
            UnpackError::Bundle(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for UnpackError {
    fn from(err: io::Error) -> Self {
        UnpackError::Io(err)
    }
}

impl From<ParseError> for UnpackError {
    fn from(err: ParseError) -> Self {
        UnpackError::Parse(err)
    }
}

impl From<BundleError> for UnpackError {
    fn from(err: BundleError) -> Self {
        UnpackError::Bundle(err)
    }
}

/// Error type for configuration loading
#[derive(Debug)]
pub enum ConfigError {
    Io(io::Error),
    Yaml(serde_yaml::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to read config: {}", e),
            ConfigError::Yaml(e) => write!(f, "Failed to parse YAML: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<io::Error> for ConfigError {
    fn from(err: io::Error) -> Self {
        ConfigError::Io(err)
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::Yaml(err)
    }
}
