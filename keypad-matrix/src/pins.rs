//! [`LineDriver`] over `embedded-hal` pins.
//!
//! Each row is an [`OutputPin`] and each column an [`InputPin`], tagged with
//! the [`LineId`] the [`Topology`](crate::Topology) refers to it by. Both pin
//! types must share one error type, which is how HAL crates with type-erased
//! GPIO pins expose them.
//!
//! Pull resistors and pin directions are configured by the HAL when the pins
//! are created; [`PinDriver`] only checks that every line of the topology has
//! a pin of the right kind.
//!
//! ## Example
//!
//! ```rust,ignore
//! use keypad_matrix::{layouts, Config, PinDriver, ScanEngine, Topology};
//!
//! let driver = PinDriver::new(
//!     [(8, row0), (10, row1), (12, row2), (16, row3), (18, row4)],
//!     [(7, col0), (11, col1), (13, col2), (15, col3), (19, col4), (21, col5)],
//! );
//! let topology = Topology::new(layouts::LETTER_GAME)?;
//! let mut engine = ScanEngine::new(topology, driver, delay, clock, Config::default())?;
//! ```

use core::fmt::{self, Debug};

use embedded_hal::digital::{InputPin, OutputPin};

use crate::line::{Level, Line, LineDriver, LineId, Role};

/// Errors of a [`PinDriver`]
#[derive(Debug, PartialEq, Eq)]
pub enum PinError<E> {
    /// No pin carries this line identifier
    UnknownLine(LineId),
    /// The pin exists but is an output where an input was needed, or the
    /// other way round
    WrongRole(LineId),
    /// The HAL reported an error
    Pin(E),
}

impl<E: Debug> fmt::Display for PinError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PinError::UnknownLine(line) => write!(f, "No pin for {line}"),
            PinError::WrongRole(line) => write!(f, "Pin for {line} has the wrong direction"),
            PinError::Pin(e) => write!(f, "Pin error: {e:?}"),
        }
    }
}

impl<E: Debug> core::error::Error for PinError<E> {}

/// Row and column pins of a matrix.
pub struct PinDriver<O, I, const ROWS: usize, const COLS: usize> {
    rows: [(LineId, O); ROWS],
    columns: [(LineId, I); COLS],
}

impl<O, I, E, const ROWS: usize, const COLS: usize> PinDriver<O, I, ROWS, COLS>
where
    O: OutputPin<Error = E>,
    I: InputPin<Error = E>,
    E: Debug,
{
    /// Pair each pin with its line identifier.
    pub fn new(rows: [(u32, O); ROWS], columns: [(u32, I); COLS]) -> Self {
        PinDriver {
            rows: rows.map(|(id, pin)| (LineId(id), pin)),
            columns: columns.map(|(id, pin)| (LineId(id), pin)),
        }
    }

    /// Give the pins back.
    pub fn release(self) -> ([(LineId, O); ROWS], [(LineId, I); COLS]) {
        (self.rows, self.columns)
    }

    fn row(&mut self, line: LineId) -> Result<&mut O, PinError<E>> {
        match self.rows.iter().position(|(id, _)| *id == line) {
            Some(index) => Ok(&mut self.rows[index].1),
            None => Err(self.missing(line)),
        }
    }

    fn column(&mut self, line: LineId) -> Result<&mut I, PinError<E>> {
        match self.columns.iter().position(|(id, _)| *id == line) {
            Some(index) => Ok(&mut self.columns[index].1),
            None => Err(self.missing(line)),
        }
    }

    fn missing(&self, line: LineId) -> PinError<E> {
        let known = self.rows.iter().any(|(id, _)| *id == line)
            || self.columns.iter().any(|(id, _)| *id == line);
        if known {
            PinError::WrongRole(line)
        } else {
            PinError::UnknownLine(line)
        }
    }
}

impl<O, I, E, const ROWS: usize, const COLS: usize> LineDriver for PinDriver<O, I, ROWS, COLS>
where
    O: OutputPin<Error = E>,
    I: InputPin<Error = E>,
    E: Debug,
{
    type Error = PinError<E>;

    fn setup(&mut self, line: &Line) -> Result<(), Self::Error> {
        match line.role {
            Role::Drive => self.row(line.id).map(|_| ()),
            Role::Sense => self.column(line.id).map(|_| ()),
        }
    }

    fn drive(&mut self, line: LineId, level: Level) -> Result<(), Self::Error> {
        self.row(line)?.set_state(level).map_err(PinError::Pin)
    }

    fn read(&mut self, line: LineId) -> Result<Level, Self::Error> {
        let high = self.column(line)?.is_high().map_err(PinError::Pin)?;
        Ok(Level::from(high))
    }
}
