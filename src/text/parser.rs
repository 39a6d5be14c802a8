//! Grammar layer: tokens to statements.
//!
//! ```text
//! stream     := header ';' (metadata | typeAlias | definition)* EOF
//! typeAlias  := <int> '@' <quoted> ';'
//! definition := ref-with-version '=' '(' body ')' ';'
//! body       := [superDef ','] (NAME '=' value (',' NAME '=' value)*)?
//! superDef   := 'r' <type> ':0v' <version> '=' '(' body ')'
//! ```
//!
//! The parser enforces the semantic rules that only need the stream itself
//! (declared type ids, versions on definitions only, entity id 0 only in
//! super clauses, unique field names). Nothing is dereferenced here.

use std::io::BufRead;

use crate::bundle::{Bundle, Holder};
use crate::error::{ParseError, ParseErrorKind};
use crate::identity::{SessionTypes, TypeName};
use crate::metadata::MetaValue;
use crate::reference::EntityRef;
use crate::text::tokenizer::{Spanned, Token, Tokenizer};
use crate::text::{FormatVersion, Header, Position};

/// Deepest super-clause chain a definition may carry.
pub const MAX_SUPER_DEPTH: usize = 64;

/// One parsed entity definition.
#[derive(Debug, Clone, PartialEq)]
pub struct Definition {
    /// Header reference, carrying the version and any aliases.
    pub reference: EntityRef,
    pub bundle: Bundle,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Metadata { name: String, value: MetaValue },
    TypeAlias { id: u32, name: TypeName },
    Definition(Definition),
}

pub struct Parser<R> {
    tokens: Tokenizer<R>,
    types: SessionTypes,
    header: Option<Header>,
}

impl<R: BufRead> Parser<R> {
    pub fn new(reader: R) -> Self {
        Self {
            tokens: Tokenizer::new(reader),
            types: SessionTypes::new(),
            header: None,
        }
    }

    /// Type aliases declared so far.
    pub fn types(&self) -> &SessionTypes {
        &self.types
    }

    pub fn header(&self) -> Option<&Header> {
        self.header.as_ref()
    }

    pub fn position(&self) -> Position {
        self.tokens.position()
    }

    pub fn into_inner(self) -> R {
        self.tokens.into_inner()
    }

    /// Next token that is not a comment.
    fn next_significant(&mut self) -> Result<Spanned, ParseError> {
        loop {
            let spanned = self.tokens.next_token()?;
            if !matches!(spanned.token, Token::Comment(_)) {
                return Ok(spanned);
            }
        }
    }

    fn unexpected(spanned: &Spanned, expected: &str) -> ParseError {
        let kind = if spanned.token == Token::Eof {
            ParseErrorKind::UnexpectedEof
        } else {
            ParseErrorKind::UnexpectedToken {
                expected: expected.to_string(),
            }
        };
        ParseError::new(kind, spanned.position).with_token(spanned.token.to_string())
    }

    fn expect_punct(&mut self, punct: char) -> Result<(), ParseError> {
        let spanned = self.next_significant()?;
        match spanned.token {
            Token::Punct(c) if c == punct => Ok(()),
            _ => Err(Self::unexpected(&spanned, &format!("'{}'", punct))),
        }
    }

    /// Read and validate the format header.
    ///
    /// Called implicitly by the first [`Parser::next_statement`].
    pub fn read_header(&mut self) -> Result<&Header, ParseError> {
        if self.header.is_none() {
            let spanned = self.next_significant()?;
            let (encoded, label) = match spanned.token {
                Token::Header { version, label } => (version, label),
                _ => return Err(Self::unexpected(&spanned, "format header '&'")),
            };
            let version = FormatVersion::decode(encoded).ok_or_else(|| {
                ParseError::new(
                    ParseErrorKind::BadHeader(format!("version {} out of range", encoded)),
                    spanned.position,
                )
            })?;
            if !version.is_readable() {
                return Err(ParseError::new(
                    ParseErrorKind::BadHeader(format!(
                        "format version {} is not readable by {}",
                        version,
                        FormatVersion::CURRENT
                    )),
                    spanned.position,
                ));
            }
            self.expect_punct(';')?;
            self.header = Some(Header { version, label });
        }
        match &self.header {
            Some(header) => Ok(header),
            None => Err(ParseError::new(ParseErrorKind::UnexpectedEof, self.position())),
        }
    }

    /// Next statement, or `None` at end of input.
    pub fn next_statement(&mut self) -> Result<Option<Statement>, ParseError> {
        self.read_header()?;

        let spanned = self.next_significant()?;
        let position = spanned.position;
        match spanned.token {
            Token::Eof => Ok(None),
            Token::Metadata { name, value } => Ok(Some(Statement::Metadata { name, value })),
            Token::Integer(id) => {
                let statement = self.parse_type_alias(id, position)?;
                Ok(Some(statement))
            }
            Token::Reference(reference) => {
                let (reference, bundle) = self.parse_definition(reference, position, 0)?;
                self.expect_punct(';')?;
                Ok(Some(Statement::Definition(Definition {
                    reference,
                    bundle,
                    position,
                })))
            }
            _ => Err(Self::unexpected(
                &spanned,
                "metadata, type alias or entity definition",
            )),
        }
    }

    fn parse_type_alias(&mut self, id: u64, position: Position) -> Result<Statement, ParseError> {
        let id = match u32::try_from(id) {
            Ok(id) if id > 0 => id,
            _ => {
                return Err(ParseError::new(
                    ParseErrorKind::BadNumber(format!("type id {}", id)),
                    position,
                ))
            }
        };
        self.expect_punct('@')?;
        let spanned = self.next_significant()?;
        let name = match &spanned.token {
            Token::Quoted(text) => TypeName::new(text),
            _ => None,
        }
        .ok_or_else(|| Self::unexpected(&spanned, "quoted type name"))?;
        self.expect_punct(';')?;

        if !self.types.declare(id, name.clone()) {
            return Err(ParseError::new(
                ParseErrorKind::ConflictingTypeAlias(format!("{}@{:?}", id, name.as_str())),
                position,
            ));
        }
        Ok(Statement::TypeAlias { id, name })
    }

    fn type_name(&self, type_id: u32, position: Position) -> Result<TypeName, ParseError> {
        self.types
            .name(type_id)
            .cloned()
            .ok_or_else(|| ParseError::new(ParseErrorKind::UndeclaredType(type_id), position))
    }

    /// `=(body)` after a definition or super-clause header. `depth` is 0 for
    /// a top-level definition and counts enclosing bodies for super clauses.
    fn parse_definition(
        &mut self,
        reference: EntityRef,
        position: Position,
        depth: usize,
    ) -> Result<(EntityRef, Bundle), ParseError> {
        let is_super = depth > 0;
        let version = reference.version.ok_or_else(|| {
            ParseError::new(ParseErrorKind::MissingVersion, position).with_token(reference.to_string())
        })?;
        if is_super != reference.is_super() {
            return Err(ParseError::new(
                ParseErrorKind::MisplacedEntityId(reference.entity_id),
                position,
            )
            .with_token(reference.to_string()));
        }
        if is_super && !reference.aliases.is_empty() {
            return Err(ParseError::new(
                ParseErrorKind::UnexpectedToken {
                    expected: "super clause without aliases".to_string(),
                },
                position,
            )
            .with_token(reference.to_string()));
        }
        let type_name = self.type_name(reference.type_id, position)?;

        self.expect_punct('=')?;
        self.expect_punct('(')?;

        let mut bundle = Bundle::new(type_name, version);
        let opening = self.next_significant()?;
        if opening.token == Token::Punct(')') {
            return Ok((reference, bundle));
        }
        self.tokens.push_back(opening);

        let mut index = 0usize;
        loop {
            let item = self.next_significant()?;
            match item.token {
                Token::Reference(super_ref) => {
                    if index != 0 {
                        return Err(ParseError::new(ParseErrorKind::MisplacedSuper, item.position)
                            .with_token(super_ref.to_string()));
                    }
                    if depth >= MAX_SUPER_DEPTH {
                        return Err(ParseError::new(
                            ParseErrorKind::SuperTooDeep(MAX_SUPER_DEPTH),
                            item.position,
                        )
                        .with_token(super_ref.to_string()));
                    }
                    let (_, super_bundle) =
                        self.parse_definition(super_ref, item.position, depth + 1)?;
                    bundle.set_super(super_bundle);
                }
                Token::Identifier(name) => {
                    self.expect_punct('=')?;
                    let value = self.parse_value()?;
                    if bundle.contains(&name) {
                        return Err(ParseError::new(
                            ParseErrorKind::DuplicateField(name.clone()),
                            item.position,
                        )
                        .with_token(name));
                    }
                    bundle.put(&name, value).map_err(|e| {
                        ParseError::new(
                            ParseErrorKind::UnexpectedToken {
                                expected: format!("valid field name ({})", e),
                            },
                            item.position,
                        )
                    })?;
                }
                _ => return Err(Self::unexpected(&item, "field name or super clause")),
            }
            index += 1;

            let separator = self.next_significant()?;
            match separator.token {
                Token::Punct(',') => continue,
                Token::Punct(')') => break,
                _ => return Err(Self::unexpected(&separator, "',' or ')'")),
            }
        }
        Ok((reference, bundle))
    }

    fn parse_value(&mut self) -> Result<Holder, ParseError> {
        let spanned = self.tokens.next_value()?;
        match spanned.token {
            Token::Reference(reference) => {
                self.check_value_ref(&reference, spanned.position)?;
                Ok(Holder::Ref(reference))
            }
            Token::Value(holder) => {
                for reference in holder.references() {
                    self.check_value_ref(reference, spanned.position)?;
                }
                Ok(holder)
            }
            _ => Err(Self::unexpected(&spanned, "value")),
        }
    }

    fn check_value_ref(&self, reference: &EntityRef, position: Position) -> Result<(), ParseError> {
        let fail = |kind| Err(ParseError::new(kind, position).with_token(reference.to_string()));
        if reference.version.is_some() {
            return fail(ParseErrorKind::VersionOnValue);
        }
        if !reference.aliases.is_empty() {
            return fail(ParseErrorKind::AliasOnValue);
        }
        if reference.is_super() {
            return fail(ParseErrorKind::MisplacedEntityId(0));
        }
        self.type_name(reference.type_id, position)?;
        Ok(())
    }
}

/// Parse a complete stream held in memory.
pub fn parse_str(text: &str) -> Result<(Header, Vec<Statement>), ParseError> {
    let mut parser = Parser::new(text.as_bytes());
    let header = parser.read_header()?.clone();
    let mut statements = Vec::new();
    while let Some(statement) = parser.next_statement()? {
        statements.push(statement);
    }
    Ok((header, statements))
}
