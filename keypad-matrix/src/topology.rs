//! Static description of a key matrix: its lines, wiring polarity and the
//! symbol printed on each key.

use core::fmt;

use crate::error::ConfigError;
use crate::line::{Level, Line, Pull, Role};

/// Wiring polarity of the matrix.
///
/// Both conventions run the same scan; only the levels differ.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Polarity {
    /// Rows are driven high when scanned, columns use pull-downs and read high on
    /// a press (diodes pointing from row to column).
    #[default]
    ActiveHigh,
    /// Rows are driven low when scanned, columns use pull-ups and read low on a
    /// press.
    ActiveLow,
}

impl Polarity {
    /// Level that asserts a row.
    pub const fn active(self) -> Level {
        match self {
            Polarity::ActiveHigh => Level::High,
            Polarity::ActiveLow => Level::Low,
        }
    }

    /// Level of a row that is not being scanned.
    pub const fn inactive(self) -> Level {
        match self {
            Polarity::ActiveHigh => Level::Low,
            Polarity::ActiveLow => Level::High,
        }
    }

    /// Level a column reads while a key on the asserted row is closed.
    pub const fn pressed(self) -> Level {
        self.active()
    }

    /// Pull resistor the columns need for this polarity.
    pub const fn column_pull(self) -> Pull {
        match self {
            Polarity::ActiveHigh => Pull::Down,
            Polarity::ActiveLow => Pull::Up,
        }
    }
}

/// Label printed on a key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Symbol<'a>(&'a str);

impl<'a> Symbol<'a> {
    pub const fn new(label: &'a str) -> Self {
        Symbol(label)
    }

    pub const fn as_str(&self) -> &'a str {
        self.0
    }
}

impl fmt::Display for Symbol<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl PartialEq<&str> for Symbol<'_> {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Position of a key: row index and column index into the [`Topology`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Coord {
    pub row: usize,
    pub col: usize,
}

impl Coord {
    pub const fn new(row: usize, col: usize) -> Self {
        Coord { row, col }
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "row {}, col {}", self.row, self.col)
    }
}

/// Raw, unvalidated matrix description.
///
/// `symbols[row][col]` is `None` where no physical key sits. Turn it into a
/// [`Topology`] before scanning.
#[derive(Clone, Copy, Debug)]
pub struct Layout<'a> {
    pub rows: &'a [Line],
    pub columns: &'a [Line],
    pub symbols: &'a [&'a [Option<Symbol<'a>>]],
    pub polarity: Polarity,
}

/// A validated [`Layout`].
///
/// Every row and column index covered by the symbol table is within the line
/// lists, lines are unique and have the right role, and column pulls agree
/// with the polarity.
#[derive(Clone, Copy, Debug)]
pub struct Topology<'a> {
    layout: Layout<'a>,
}

impl<'a> Topology<'a> {
    /// Validate a layout.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] describing the first inconsistency found.
    pub fn new(layout: Layout<'a>) -> Result<Self, ConfigError> {
        let Layout {
            rows,
            columns,
            symbols,
            polarity,
        } = layout;

        if rows.is_empty() || columns.is_empty() {
            return Err(ConfigError::EmptyMatrix);
        }
        if symbols.len() != rows.len() {
            return Err(ConfigError::TableRows {
                expected: rows.len(),
                found: symbols.len(),
            });
        }
        for (row, entries) in symbols.iter().enumerate() {
            if entries.len() != columns.len() {
                return Err(ConfigError::TableColumns {
                    row,
                    expected: columns.len(),
                    found: entries.len(),
                });
            }
        }

        for line in rows {
            if line.role != Role::Drive {
                return Err(ConfigError::WrongRole {
                    line: line.id,
                    expected: Role::Drive,
                });
            }
        }
        for line in columns {
            if line.role != Role::Sense {
                return Err(ConfigError::WrongRole {
                    line: line.id,
                    expected: Role::Sense,
                });
            }
            if line.pull != Pull::None && line.pull != polarity.column_pull() {
                return Err(ConfigError::PullMismatch {
                    line: line.id,
                    pull: line.pull,
                    polarity,
                });
            }
        }

        // Quadratic, but matrices are tiny and this runs once.
        let lines = || rows.iter().chain(columns.iter());
        for (index, line) in lines().enumerate() {
            if lines().skip(index + 1).any(|other| other.id == line.id) {
                return Err(ConfigError::DuplicateLine(line.id));
            }
        }

        Ok(Topology { layout })
    }

    pub fn rows(&self) -> &'a [Line] {
        self.layout.rows
    }

    pub fn columns(&self) -> &'a [Line] {
        self.layout.columns
    }

    pub fn polarity(&self) -> Polarity {
        self.layout.polarity
    }

    pub fn layout(&self) -> Layout<'a> {
        self.layout
    }

    /// Number of (row, column) positions, mapped or not.
    pub fn len(&self) -> usize {
        self.layout.rows.len() * self.layout.columns.len()
    }

    /// Always false for a validated topology.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, coord: Coord) -> bool {
        coord.row < self.layout.rows.len() && coord.col < self.layout.columns.len()
    }

    /// Symbol at a position, or `None` for absent keys and out-of-range
    /// positions alike.
    pub fn symbol_at(&self, row: usize, col: usize) -> Option<Symbol<'a>> {
        self.layout
            .symbols
            .get(row)
            .and_then(|entries| entries.get(col))
            .copied()
            .flatten()
    }

    /// All positions in scan order: row-major, column-minor.
    pub fn coords(&self) -> impl Iterator<Item = Coord> + 'a {
        let cols = self.layout.columns.len();
        (0..self.layout.rows.len())
            .flat_map(move |row| (0..cols).map(move |col| Coord::new(row, col)))
    }

    /// Mapped symbols in scan order.
    pub fn symbols(&self) -> impl Iterator<Item = Symbol<'a>> + 'a {
        self.layout
            .symbols
            .iter()
            .copied()
            .flat_map(|entries| entries.iter().filter_map(|entry| *entry))
    }

    /// First position carrying `symbol`, in scan order.
    pub fn find(&self, symbol: &str) -> Option<Coord> {
        self.coords().find(|coord| {
            self.symbol_at(coord.row, coord.col)
                .is_some_and(|found| found.as_str() == symbol)
        })
    }
}
