//! The human-readable wire format.
//!
//! A stream is a format header followed by statements, each terminated by
//! `;`:
//!
//! ```text
//! &1000000:"graphpack";
//! ~created=1700000000000L;
//! 1@"demo.Node";
//! r1:1v1/"head"=(name=s"a",next=r1:2);
//! r1:2v1=(name=s"b",next=r1:1);
//! ```
//!
//! [`tokenizer`] turns characters into tokens, [`parser`] turns tokens into
//! statements and bundles, and [`writer`] renders the same constructs back
//! to text.

use std::fmt;

use serde::Serialize;

pub mod parser;
pub mod tokenizer;
pub mod writer;

pub use parser::{Definition, Parser, Statement};
pub use tokenizer::{Spanned, Token, Tokenizer};

/// Location in the input, 1-based line and column plus 0-based char offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Position {
    pub line: usize,
    pub column: usize,
    pub offset: usize,
}

impl Position {
    pub fn new(line: usize, column: usize, offset: usize) -> Self {
        Self {
            line,
            column,
            offset,
        }
    }

    pub fn start() -> Self {
        Self::new(1, 1, 0)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// Format version, encoded on the wire as `major * 1_000_000 + minor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct FormatVersion {
    pub major: u32,
    pub minor: u32,
}

impl FormatVersion {
    /// Version written by this engine.
    pub const CURRENT: FormatVersion = FormatVersion { major: 1, minor: 0 };

    pub fn encode(self) -> u64 {
        self.major as u64 * 1_000_000 + self.minor as u64
    }

    pub fn decode(encoded: u64) -> Option<Self> {
        let major = u32::try_from(encoded / 1_000_000).ok()?;
        let minor = (encoded % 1_000_000) as u32;
        Some(Self { major, minor })
    }

    /// Streams are readable when the major version matches.
    pub fn is_readable(self) -> bool {
        self.major == Self::CURRENT.major
    }
}

impl fmt::Display for FormatVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Parsed stream header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Header {
    pub version: FormatVersion,
    pub label: String,
}
