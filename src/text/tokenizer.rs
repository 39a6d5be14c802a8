//! Character-level scanner for the text format.
//!
//! The scanner decodes UTF-8 incrementally from any [`BufRead`] and keeps
//! one character and one token of putback. Field names and value literals
//! share their leading letters (`i42` is a valid identifier and an int
//! literal), so the parser picks the entry point: [`Tokenizer::next_token`]
//! at structural positions, [`Tokenizer::next_value`] after a field's `=`.

use std::fmt;
use std::io::BufRead;

use crate::bundle::{BoxedArray, ElemKind, Holder, PrimitiveArray};
use crate::error::{ParseError, ParseErrorKind};
use crate::metadata::MetaValue;
use crate::reference::EntityRef;
use crate::text::writer;
use crate::text::Position;

/// Null sentinel.
pub const NULL: char = 'ø';

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// One of `; = ( ) , @`.
    Punct(char),
    Identifier(String),
    /// Bare unsigned integer, as used by type alias declarations.
    Integer(u64),
    Quoted(String),
    Header {
        version: u64,
        label: String,
    },
    Metadata {
        name: String,
        value: MetaValue,
    },
    Comment(String),
    Reference(EntityRef),
    Value(Holder),
    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Punct(c) => write!(f, "'{}'", c),
            Token::Identifier(name) => write!(f, "identifier {}", name),
            Token::Integer(n) => write!(f, "integer {}", n),
            Token::Quoted(s) => {
                let mut out = String::new();
                writer::write_quoted(&mut out, s);
                f.write_str(&out)
            }
            Token::Header { version, label } => write!(f, "header &{}:{:?}", version, label),
            Token::Metadata { name, value } => write!(f, "metadata ~{}={}", name, value),
            Token::Comment(text) => write!(f, "comment #{}", text),
            Token::Reference(r) => write!(f, "reference {}", r),
            Token::Value(holder) => {
                let mut out = String::new();
                writer::write_holder(&mut out, holder);
                write!(f, "value {}", out)
            }
            Token::Eof => write!(f, "end of input"),
        }
    }
}

/// A token with the position of its first character.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub position: Position,
}

pub struct Tokenizer<R> {
    reader: R,
    /// Position of the next character to be read.
    position: Position,
    last: Option<(char, Position)>,
    unread: Option<(char, Position)>,
    pushed: Option<Spanned>,
}

impl<R: BufRead> Tokenizer<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            position: Position::start(),
            last: None,
            unread: None,
            pushed: None,
        }
    }

    /// Position of the next unread character.
    pub fn position(&self) -> Position {
        match &self.pushed {
            Some(spanned) => spanned.position,
            None => self.position,
        }
    }

    /// Return a token so the next call to `next_token` or `next_value`
    /// yields it again. Only one token of putback is kept.
    pub fn push_back(&mut self, token: Spanned) {
        self.pushed = Some(token);
    }

    /// Consume the tokenizer, returning the underlying reader.
    pub fn into_inner(self) -> R {
        self.reader
    }

    // ------------------------------------------------------------------
    // Character layer
    // ------------------------------------------------------------------

    fn error(&self, kind: ParseErrorKind, position: Position) -> ParseError {
        ParseError::new(kind, position)
    }

    fn next_byte(&mut self) -> Result<Option<u8>, ParseError> {
        let buf = self
            .reader
            .fill_buf()
            .map_err(|e| ParseError::new(ParseErrorKind::Io(e.to_string()), self.position))?;
        if buf.is_empty() {
            return Ok(None);
        }
        let byte = buf[0];
        self.reader.consume(1);
        Ok(Some(byte))
    }

    fn read_char(&mut self) -> Result<Option<char>, ParseError> {
        let start = match self.unread.take() {
            Some((c, pos)) => {
                self.last = Some((c, pos));
                self.position = advance(pos, c);
                return Ok(Some(c));
            }
            None => self.position,
        };

        let first = match self.next_byte()? {
            Some(b) => b,
            None => {
                self.last = None;
                return Ok(None);
            }
        };
        let width = utf8_width(first);
        if width == 0 {
            return Err(self.error(ParseErrorKind::UnexpectedChar('\u{FFFD}'), start));
        }
        let mut bytes = [first, 0, 0, 0];
        for slot in bytes.iter_mut().take(width).skip(1) {
            *slot = self
                .next_byte()?
                .ok_or_else(|| self.error(ParseErrorKind::UnexpectedEof, start))?;
        }
        let c = std::str::from_utf8(&bytes[..width])
            .ok()
            .and_then(|s| s.chars().next())
            .ok_or_else(|| self.error(ParseErrorKind::UnexpectedChar('\u{FFFD}'), start))?;

        self.last = Some((c, start));
        self.position = advance(start, c);
        Ok(Some(c))
    }

    /// Put the last character read back; at most one level deep.
    fn unread(&mut self) {
        if let Some((c, pos)) = self.last.take() {
            self.unread = Some((c, pos));
            self.position = pos;
        }
    }

    fn peek_char(&mut self) -> Result<Option<char>, ParseError> {
        let c = self.read_char()?;
        self.unread();
        Ok(c)
    }

    fn skip_whitespace(&mut self) -> Result<(), ParseError> {
        while let Some(c) = self.read_char()? {
            if !c.is_whitespace() {
                self.unread();
                break;
            }
        }
        Ok(())
    }

    /// Whitespace and `#` comments, up to the next significant character.
    fn skip_whitespace_and_comments(&mut self) -> Result<(), ParseError> {
        loop {
            self.skip_whitespace()?;
            if self.peek_char()? != Some('#') {
                return Ok(());
            }
            while let Some(c) = self.read_char()? {
                if c == '\n' {
                    break;
                }
            }
        }
    }

    /// Spaces and tabs only; metadata lines never span a newline.
    fn skip_blanks(&mut self) -> Result<(), ParseError> {
        while let Some(c) = self.read_char()? {
            if c != ' ' && c != '\t' {
                self.unread();
                break;
            }
        }
        Ok(())
    }

    fn expect_char(&mut self, expected: char) -> Result<(), ParseError> {
        let pos = self.position;
        match self.read_char()? {
            Some(c) if c == expected => Ok(()),
            Some(c) => Err(self
                .error(
                    ParseErrorKind::UnexpectedToken {
                        expected: format!("'{}'", expected),
                    },
                    pos,
                )
                .with_token(c.to_string())),
            None => Err(self.error(ParseErrorKind::UnexpectedEof, pos)),
        }
    }

    fn scan_digits(&mut self) -> Result<String, ParseError> {
        let mut digits = String::new();
        while let Some(c) = self.read_char()? {
            if c.is_ascii_digit() {
                digits.push(c);
            } else {
                self.unread();
                break;
            }
        }
        Ok(digits)
    }

    fn scan_unsigned(&mut self, what: &str) -> Result<u64, ParseError> {
        let pos = self.position;
        let digits = self.scan_digits()?;
        if digits.is_empty() {
            return Err(self.unexpected_here(pos, what));
        }
        digits
            .parse::<u64>()
            .map_err(|e| self.error(ParseErrorKind::BadNumber(format!("{}: {}", digits, e)), pos))
    }

    fn unexpected_here(&mut self, pos: Position, expected: &str) -> ParseError {
        let found = match self.peek_char() {
            Ok(Some(c)) => c.to_string(),
            _ => return self.error(ParseErrorKind::UnexpectedEof, pos),
        };
        self.error(
            ParseErrorKind::UnexpectedToken {
                expected: expected.to_string(),
            },
            pos,
        )
        .with_token(found)
    }

    /// Body of a quoted string; the opening quote must be the next char.
    fn scan_quoted(&mut self) -> Result<String, ParseError> {
        let start = self.position;
        self.expect_char('"')?;
        let mut text = String::new();
        loop {
            let pos = self.position;
            match self.read_char()? {
                None => return Err(self.error(ParseErrorKind::UnterminatedString, start)),
                Some('"') => return Ok(text),
                Some('\\') => {
                    let escaped = match self.read_char()? {
                        Some('b') => '\u{8}',
                        Some('n') => '\n',
                        Some('r') => '\r',
                        Some('t') => '\t',
                        Some('\\') => '\\',
                        Some('\'') => '\'',
                        Some('"') => '"',
                        Some(other) => return Err(self.error(ParseErrorKind::BadEscape(other), pos)),
                        None => return Err(self.error(ParseErrorKind::UnterminatedString, start)),
                    };
                    text.push(escaped);
                }
                Some(c) => text.push(c),
            }
        }
    }

    fn scan_word(&mut self, first: char) -> Result<String, ParseError> {
        let mut word = String::from(first);
        word.push_str(&self.scan_word_tail()?);
        Ok(word)
    }

    // ------------------------------------------------------------------
    // Structural tokens
    // ------------------------------------------------------------------

    /// Next token at a structural position.
    pub fn next_token(&mut self) -> Result<Spanned, ParseError> {
        if let Some(token) = self.pushed.take() {
            return Ok(token);
        }
        self.skip_whitespace()?;
        let position = self.position;
        let c = match self.read_char()? {
            Some(c) => c,
            None => {
                return Ok(Spanned {
                    token: Token::Eof,
                    position,
                })
            }
        };

        let token = match c {
            ';' | '=' | '(' | ')' | ',' | '@' => Token::Punct(c),
            '#' => {
                let mut text = String::new();
                while let Some(c) = self.read_char()? {
                    if c == '\n' {
                        break;
                    }
                    text.push(c);
                }
                Token::Comment(text.trim().to_string())
            }
            '~' => self.scan_metadata(position)?,
            '&' => {
                let version = self.scan_unsigned("format version")?;
                self.expect_char(':')?;
                let label = self.scan_quoted()?;
                Token::Header { version, label }
            }
            '"' => {
                self.unread();
                Token::Quoted(self.scan_quoted()?)
            }
            '0'..='9' => {
                self.unread();
                Token::Integer(self.scan_unsigned("integer")?)
            }
            'r' => {
                let digits = self.scan_digits()?;
                if !digits.is_empty() && self.peek_char()? == Some(':') {
                    Token::Reference(self.scan_reference_tail(&digits, position)?)
                } else {
                    let mut word = format!("r{}", digits);
                    word.push_str(&self.scan_word_tail()?);
                    Token::Identifier(word)
                }
            }
            c if c.is_ascii_alphabetic() || c == '_' => Token::Identifier(self.scan_word(c)?),
            other => {
                return Err(self
                    .error(ParseErrorKind::UnexpectedChar(other), position)
                    .with_token(other.to_string()))
            }
        };
        Ok(Spanned { token, position })
    }

    fn scan_word_tail(&mut self) -> Result<String, ParseError> {
        let mut tail = String::new();
        while let Some(c) = self.read_char()? {
            if c.is_ascii_alphanumeric() || c == '_' {
                tail.push(c);
            } else {
                self.unread();
                break;
            }
        }
        Ok(tail)
    }

    /// `NAME=value;` after the leading `~`.
    fn scan_metadata(&mut self, start: Position) -> Result<Token, ParseError> {
        let malformed = |msg: &str| ParseError::new(ParseErrorKind::MalformedMetadata(msg.to_string()), start);

        let mut name = String::new();
        while let Some(c) = self.read_char()? {
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-' {
                name.push(c);
            } else {
                self.unread();
                break;
            }
        }
        if name.is_empty() {
            return Err(malformed("missing name"));
        }
        self.skip_blanks()?;
        self.expect_char('=')?;
        self.skip_blanks()?;

        if self.peek_char()? == Some('"') {
            let text = self.scan_quoted()?;
            self.skip_blanks()?;
            self.expect_char(';')?;
            return Ok(Token::Metadata {
                name,
                value: MetaValue::Str(text),
            });
        }

        let mut raw = String::new();
        loop {
            match self.read_char()? {
                Some(';') => break,
                Some('\n') | None => return Err(malformed("missing ';'")),
                Some(c) => raw.push(c),
            }
        }
        let raw = raw.trim();
        let (body, suffix) = match raw.char_indices().last() {
            Some((idx, suffix)) => (&raw[..idx], suffix),
            None => return Err(malformed("missing value")),
        };
        let value = match suffix {
            'L' => MetaValue::Long(
                body.parse()
                    .map_err(|_| malformed(&format!("bad long {}", body)))?,
            ),
            'D' => MetaValue::Double(
                body.parse()
                    .map_err(|_| malformed(&format!("bad double {}", body)))?,
            ),
            'B' => match body {
                "T" => MetaValue::Bool(true),
                "F" => MetaValue::Bool(false),
                _ => return Err(malformed(&format!("bad boolean {}", body))),
            },
            other => return Err(malformed(&format!("unknown type suffix {:?}", other))),
        };
        Ok(Token::Metadata { name, value })
    }

    /// `:<entity>[v<version>][/"alias"]*` after `r<type>`.
    fn scan_reference_tail(&mut self, type_digits: &str, start: Position) -> Result<EntityRef, ParseError> {
        let type_id = type_digits.parse::<u32>().map_err(|e| {
            self.error(
                ParseErrorKind::BadNumber(format!("type id {}: {}", type_digits, e)),
                start,
            )
        })?;
        self.expect_char(':')?;
        let entity_id = self.scan_unsigned("entity id")?;
        let mut reference = EntityRef::new(type_id, entity_id);

        if self.peek_char()? == Some('v') {
            self.read_char()?;
            let pos = self.position;
            let version = self.scan_unsigned("version")?;
            let version = u32::try_from(version).map_err(|_| {
                self.error(ParseErrorKind::BadNumber(format!("version {}", version)), pos)
            })?;
            reference.version = Some(version);
        }
        while self.peek_char()? == Some('/') {
            self.read_char()?;
            let alias = self.scan_quoted()?;
            reference.aliases.push(alias);
        }
        Ok(reference)
    }

    // ------------------------------------------------------------------
    // Value tokens
    // ------------------------------------------------------------------

    /// Next token at a value position: a scalar, string, array, null or
    /// reference literal.
    pub fn next_value(&mut self) -> Result<Spanned, ParseError> {
        if let Some(token) = self.pushed.take() {
            return Ok(token);
        }
        self.skip_whitespace_and_comments()?;
        let position = self.position;
        let tag = match self.read_char()? {
            Some(c) => c,
            None => return Err(self.error(ParseErrorKind::UnexpectedEof, position)),
        };

        let token = match tag {
            NULL => Token::Value(Holder::Null),
            'a' | 'A' => Token::Value(self.scan_array(tag == 'A', position)?),
            'r' => {
                let digits = self.scan_digits()?;
                if digits.is_empty() {
                    return Err(self.unexpected_here(position, "type id"));
                }
                Token::Reference(self.scan_reference_tail(&digits, position)?)
            }
            's' => Token::Value(Holder::Str(self.scan_quoted()?)),
            'e' => Token::Value(Holder::Name(self.scan_quoted()?)),
            _ => match ElemKind::from_tag(tag) {
                Some(kind) if kind.is_primitive() => Token::Value(self.scan_scalar(kind)?),
                _ => {
                    return Err(self
                        .error(ParseErrorKind::UnexpectedChar(tag), position)
                        .with_token(tag.to_string()))
                }
            },
        };
        Ok(Spanned { token, position })
    }

    /// Body of a primitive scalar, after its tag (or inside an array).
    fn scan_scalar(&mut self, kind: ElemKind) -> Result<Holder, ParseError> {
        let pos = self.position;
        let holder = match kind {
            ElemKind::Bool => match self.read_char()? {
                Some('T') => Holder::Bool(true),
                Some('F') => Holder::Bool(false),
                Some(c) => {
                    return Err(self
                        .error(
                            ParseErrorKind::UnexpectedToken {
                                expected: "'T' or 'F'".to_string(),
                            },
                            pos,
                        )
                        .with_token(c.to_string()))
                }
                None => return Err(self.error(ParseErrorKind::UnexpectedEof, pos)),
            },
            ElemKind::Char => {
                let text = self.scan_quoted()?;
                let mut chars = text.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Holder::Char(c),
                    _ => {
                        return Err(self
                            .error(
                                ParseErrorKind::UnexpectedToken {
                                    expected: "single character".to_string(),
                                },
                                pos,
                            )
                            .with_token(format!("{:?}", text)))
                    }
                }
            }
            ElemKind::Byte => Holder::Byte(self.scan_hex_pair()? as i8),
            ElemKind::Short => {
                let text = self.scan_signed()?;
                Holder::Short(self.parse_number(&text, pos)?)
            }
            ElemKind::Int => {
                let text = self.scan_signed()?;
                Holder::Int(self.parse_number(&text, pos)?)
            }
            ElemKind::Long => {
                let text = self.scan_signed()?;
                Holder::Long(self.parse_number(&text, pos)?)
            }
            ElemKind::Float => {
                let text = self.scan_float()?;
                Holder::Float(self.parse_number(&text, pos)?)
            }
            ElemKind::Double => {
                let text = self.scan_float()?;
                Holder::Double(self.parse_number(&text, pos)?)
            }
            ElemKind::Str => Holder::Str(self.scan_quoted()?),
            ElemKind::Name => Holder::Name(self.scan_quoted()?),
            ElemKind::Ref => {
                self.expect_char('r')?;
                let digits = self.scan_digits()?;
                if digits.is_empty() {
                    return Err(self.unexpected_here(pos, "type id"));
                }
                Holder::Ref(self.scan_reference_tail(&digits, pos)?)
            }
        };
        Ok(holder)
    }

    fn parse_number<T>(&self, text: &str, pos: Position) -> Result<T, ParseError>
    where
        T: std::str::FromStr,
        T::Err: fmt::Display,
    {
        text.parse::<T>()
            .map_err(|e| self.error(ParseErrorKind::BadNumber(format!("{}: {}", text, e)), pos))
    }

    fn scan_hex_pair(&mut self) -> Result<u8, ParseError> {
        let pos = self.position;
        let mut value = 0u8;
        for _ in 0..2 {
            match self.read_char()? {
                Some(c) if c.is_ascii_hexdigit() => {
                    value = value * 16 + c.to_digit(16).unwrap_or(0) as u8;
                }
                Some(c) => {
                    return Err(self
                        .error(
                            ParseErrorKind::UnexpectedToken {
                                expected: "hex digit".to_string(),
                            },
                            pos,
                        )
                        .with_token(c.to_string()))
                }
                None => return Err(self.error(ParseErrorKind::UnexpectedEof, pos)),
            }
        }
        Ok(value)
    }

    /// `-?[0-9]+`, sign scanned in place.
    fn scan_signed(&mut self) -> Result<String, ParseError> {
        let pos = self.position;
        let mut text = String::new();
        if self.peek_char()? == Some('-') {
            self.read_char()?;
            text.push('-');
        }
        let digits = self.scan_digits()?;
        if digits.is_empty() {
            return Err(self.unexpected_here(pos, "digits"));
        }
        text.push_str(&digits);
        Ok(text)
    }

    /// `-?digits[.digits][(e|E)[+-]digits]`, or `NaN`, `inf`, `-inf`.
    fn scan_float(&mut self) -> Result<String, ParseError> {
        let pos = self.position;
        let mut text = String::new();
        if self.peek_char()? == Some('-') {
            self.read_char()?;
            text.push('-');
        }
        match self.peek_char()? {
            Some('N') => {
                self.scan_literal("NaN", pos)?;
                text.push_str("NaN");
                return Ok(text);
            }
            Some('i') => {
                self.scan_literal("inf", pos)?;
                text.push_str("inf");
                return Ok(text);
            }
            _ => {}
        }

        let whole = self.scan_digits()?;
        if whole.is_empty() {
            return Err(self.unexpected_here(pos, "digits"));
        }
        text.push_str(&whole);
        if self.peek_char()? == Some('.') {
            self.read_char()?;
            text.push('.');
            text.push_str(&self.scan_digits()?);
        }
        if matches!(self.peek_char()?, Some('e') | Some('E')) {
            self.read_char()?;
            text.push('e');
            if let Some(sign @ ('+' | '-')) = self.peek_char()? {
                self.read_char()?;
                text.push(sign);
            }
            let exponent = self.scan_digits()?;
            if exponent.is_empty() {
                return Err(self.unexpected_here(pos, "exponent digits"));
            }
            text.push_str(&exponent);
        }
        Ok(text)
    }

    fn scan_literal(&mut self, literal: &str, pos: Position) -> Result<(), ParseError> {
        for expected in literal.chars() {
            match self.read_char()? {
                Some(c) if c == expected => {}
                Some(c) => {
                    return Err(self
                        .error(ParseErrorKind::BadNumber(format!("expected {}", literal)), pos)
                        .with_token(c.to_string()))
                }
                None => return Err(self.error(ParseErrorKind::UnexpectedEof, pos)),
            }
        }
        Ok(())
    }

    /// `<len><tag>[e0,e1,...]` after `a` or `A`.
    fn scan_array(&mut self, boxed: bool, start: Position) -> Result<Holder, ParseError> {
        let malformed = |msg: String| ParseError::new(ParseErrorKind::MalformedArray(msg), start);

        let len = self.scan_unsigned("array length")? as usize;
        let tag_pos = self.position;
        let tag = self
            .read_char()?
            .ok_or_else(|| self.error(ParseErrorKind::UnexpectedEof, tag_pos))?;
        let kind = ElemKind::from_tag(tag)
            .ok_or_else(|| malformed(format!("unknown element tag {:?}", tag)))?;
        if !boxed && !kind.is_primitive() {
            return Err(malformed(format!(
                "element tag {:?} requires a boxed array",
                tag
            )));
        }
        self.expect_char('[')?;

        let mut items = Vec::with_capacity(len.min(1024));
        self.skip_whitespace()?;
        if self.peek_char()? == Some(']') {
            self.read_char()?;
        } else {
            loop {
                self.skip_whitespace()?;
                let elem_pos = self.position;
                if self.peek_char()? == Some(NULL) {
                    self.read_char()?;
                    if !boxed {
                        return Err(ParseError::new(
                            ParseErrorKind::MalformedArray(
                                "null element in primitive array".to_string(),
                            ),
                            elem_pos,
                        ));
                    }
                    items.push(Holder::Null);
                } else {
                    items.push(self.scan_scalar(kind)?);
                }

                self.skip_whitespace()?;
                let sep_pos = self.position;
                match self.read_char()? {
                    Some(',') => continue,
                    Some(']') => break,
                    Some(c) if kind == ElemKind::Byte && c.is_ascii_hexdigit() => {
                        self.unread();
                        continue;
                    }
                    Some(c) => {
                        return Err(ParseError::new(
                            ParseErrorKind::MalformedArray("expected ',' or ']'".to_string()),
                            sep_pos,
                        )
                        .with_token(c.to_string()))
                    }
                    None => return Err(self.error(ParseErrorKind::UnexpectedEof, sep_pos)),
                }
            }
        }

        if items.len() != len {
            return Err(malformed(format!(
                "declared length {} but found {} elements",
                len,
                items.len()
            )));
        }

        if boxed {
            BoxedArray::new(kind, items)
                .map(Holder::Boxed)
                .ok_or_else(|| malformed("element kind mismatch".to_string()))
        } else {
            PrimitiveArray::from_holders(kind, items)
                .map(Holder::Array)
                .ok_or_else(|| malformed("element kind mismatch".to_string()))
        }
    }
}

fn advance(pos: Position, c: char) -> Position {
    if c == '\n' {
        Position::new(pos.line + 1, 1, pos.offset + 1)
    } else {
        Position::new(pos.line, pos.column + 1, pos.offset + 1)
    }
}

fn utf8_width(first: u8) -> usize {
    match first {
        0x00..=0x7F => 1,
        0xC2..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF4 => 4,
        _ => 0,
    }
}
