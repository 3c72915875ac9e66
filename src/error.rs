//! Error types for the documentation compiler.
//!
//! Two fatal families: parse errors carry the source file and 1-based line
//! number of the offending line; structure errors are only detectable once
//! a whole plugin's blocks have been merged, so they carry no position.

use std::fmt;
use thiserror::Error;

/// What went wrong while interpreting a single line or block.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseErrorKind {
    #[error("Cannot continue: {0}")]
    CannotContinue(String),
    #[error("Type {0} is incompatible with type {1}")]
    TypeConflict(String, String),
    #[error("Invalid args for block directive @{0}: \"{1}\"")]
    InvalidBlockArgs(String, String),
    #[error("Unrecognized block directive \"{0}\"")]
    UnrecognizedBlockDirective(String),
    #[error("Unrecognized inline directive \"{0}\"")]
    UnrecognizedInlineDirective(String),
    #[error("Redundant control \"{0}\"")]
    RedundantControl(String),
    #[error("Inconsistent control \"{0}\" ({1} vs {2})")]
    InconsistentControl(String, String, String),
    #[error("Block given multiple headers.")]
    MultipleHeaders,
    #[error("@parentsection is only allowed in section blocks (parent {0})")]
    MisplacedParentSection(String),
    #[error("{0}")]
    InvalidBlock(String),
}

/// A fatal error attributed to a position in a source file.
///
/// The position is attached by the file parser once it knows which line it
/// was processing; errors raised below that layer start out unattributed.
#[derive(Debug)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub filename: Option<String>,
    pub lineno: Option<usize>,
}

impl ParseError {
    pub fn new(kind: ParseErrorKind) -> Self {
        ParseError {
            kind,
            filename: None,
            lineno: None,
        }
    }

    /// Attaches a filename and 1-based line number, keeping any position
    /// that was already recorded closer to the source of the error.
    pub fn at(mut self, filename: &str, lineno: usize) -> Self {
        if self.filename.is_none() {
            self.filename = Some(filename.to_string());
        }
        if self.lineno.is_none() {
            self.lineno = Some(lineno);
        }
        self
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.filename.is_some() || self.lineno.is_some() {
            let filename = self.filename.as_deref().unwrap_or("???");
            match self.lineno {
                Some(lineno) => write!(f, "{}.{:03}: {}", filename, lineno, self.kind),
                None => write!(f, "{}.???: {}", filename, self.kind),
            }
        } else {
            write!(f, "{}", self.kind)
        }
    }
}

impl std::error::Error for ParseError {}

impl From<ParseErrorKind> for ParseError {
    fn from(kind: ParseErrorKind) -> Self {
        ParseError::new(kind)
    }
}

/// A fatal error in the overall structure of a plugin's documentation,
/// raised when a module is closed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StructureError {
    #[error("Duplicate section {0} defined.")]
    DuplicateSection(String),
    #[error("Duplicate backmatter {0} defined.")]
    DuplicateBackmatter(String),
    #[error("Section {0} never defined.")]
    NoSuchSection(String),
    #[error("Section {0} has non-existent parent {1}. Try setting the id of the parent section explicitly.")]
    NoSuchParentSection(String, String),
    #[error("Sections {0:?} not included in ordering {1:?}.")]
    NeglectedSections(Vec<String>, Vec<String>),
    #[error("Child section {0} included in ordering {1:?}.")]
    OrderedChildSections(String, Vec<String>),
    #[error("Block type is ambiguous.")]
    AmbiguousBlock,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Structure(#[from] StructureError),
}

impl From<ParseErrorKind> for Error {
    fn from(kind: ParseErrorKind) -> Self {
        Error::Parse(ParseError::new(kind))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
