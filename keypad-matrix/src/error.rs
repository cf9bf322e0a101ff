//! Error types for the scanner
//!
//! - [`ConfigError`] - an inconsistent layout or timing configuration. Fatal
//!   before scanning starts.
//! - [`Error`] - anything that stops a [`ScanEngine`](crate::ScanEngine) from
//!   being built or from completing a sweep, generic over the line driver's
//!   error type.
//!
//! Contact noise, presses on absent keys and keys stuck past the release
//! timeout are not errors; the engine recovers from them on its own.
//!
//! ```
//! use keypad_matrix::{layouts, ConfigError, Layout, Topology};
//!
//! let layout = Layout {
//!     symbols: &layouts::LETTER_GAME.symbols[..4],
//!     ..layouts::LETTER_GAME
//! };
//! let result = Topology::new(layout);
//! assert!(matches!(result, Err(ConfigError::TableRows { expected: 5, found: 4 })));
//! ```

use core::fmt::{self, Debug};

use crate::line::{LineId, Pull, Role};
use crate::topology::Polarity;

/// Inconsistent matrix or timing configuration
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// No rows or no columns
    EmptyMatrix,
    /// The symbol table does not have one entry per row
    TableRows { expected: usize, found: usize },
    /// A symbol table row does not have one entry per column
    TableColumns {
        row: usize,
        expected: usize,
        found: usize,
    },
    /// A line identifier is used more than once across rows and columns
    DuplicateLine(LineId),
    /// A row that is not a drive line, or a column that is not a sense line
    WrongRole { line: LineId, expected: Role },
    /// A column pull resistor that cannot produce the polarity's pressed level
    PullMismatch {
        line: LineId,
        pull: Pull,
        polarity: Polarity,
    },
    /// A delay or timeout that would make the release-wait unbounded or spin
    InvalidTiming(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::EmptyMatrix => write!(f, "Matrix needs at least one row and one column"),
            ConfigError::TableRows { expected, found } => write!(
                f,
                "Symbol table has {found} rows, matrix has {expected}"
            ),
            ConfigError::TableColumns {
                row,
                expected,
                found,
            } => write!(
                f,
                "Symbol table row {row} has {found} entries, matrix has {expected} columns"
            ),
            ConfigError::DuplicateLine(line) => write!(f, "{line} is assigned more than once"),
            ConfigError::WrongRole { line, expected } => {
                write!(f, "{line} must be a {expected:?} line")
            }
            ConfigError::PullMismatch {
                line,
                pull,
                polarity,
            } => write!(
                f,
                "{line} has pull {pull:?}, which never reads pressed with {polarity:?} polarity"
            ),
            ConfigError::InvalidTiming(reason) => write!(f, "Invalid timing: {reason}"),
        }
    }
}

impl core::error::Error for ConfigError {}

/// Errors that stop the scanner
///
/// Generic over the [`LineDriver`](crate::LineDriver) error so callers can
/// match on the underlying hardware error.
#[derive(Debug)]
pub enum Error<E> {
    /// Layout or timing configuration rejected
    Config(ConfigError),
    /// The line driver could not resolve or configure a line at startup
    Setup { line: LineId, source: E },
    /// A drive or read failed mid-scan
    Line(E),
}

impl<E> From<ConfigError> for Error<E> {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

impl<E: Debug> fmt::Display for Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(err) => write!(f, "Configuration error: {err}"),
            Error::Setup { line, source } => write!(f, "Cannot set up {line}: {source:?}"),
            Error::Line(err) => write!(f, "Line error: {err:?}"),
        }
    }
}

impl<E: Debug> core::error::Error for Error<E> {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Error::Config(err) => Some(err),
            _ => None,
        }
    }
}
