//! Digital lines and the driver contract the scan engine talks to.

use core::fmt::{self, Debug};

/// Logical level of a digital line.
pub use embedded_hal::digital::PinState as Level;

/// Opaque identifier of a physical line (a GPIO number, a board pin, an
/// expander bit). How it maps to hardware is up to the [`LineDriver`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LineId(pub u32);

impl fmt::Display for LineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}", self.0)
    }
}

/// Electrical role of a line in the matrix.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    /// Output asserted by the scanner, one at a time (a row).
    Drive,
    /// Input sampled while a row is asserted (a column).
    Sense,
}

/// Pull resistor configured on a sense line.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Pull {
    /// Floating, or biased externally.
    #[default]
    None,
    Up,
    Down,
}

impl Pull {
    /// Level a sense line settles to when no closed switch drives it.
    pub const fn idle_level(self) -> Option<Level> {
        match self {
            Pull::None => None,
            Pull::Up => Some(Level::High),
            Pull::Down => Some(Level::Low),
        }
    }
}

/// A line of the matrix: identifier, role and pull configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Line {
    pub id: LineId,
    pub role: Role,
    pub pull: Pull,
}

impl Line {
    /// A drive (row) line.
    pub const fn drive(id: u32) -> Self {
        Line {
            id: LineId(id),
            role: Role::Drive,
            pull: Pull::None,
        }
    }

    /// A sense (column) line with the given pull resistor.
    pub const fn sense(id: u32, pull: Pull) -> Self {
        Line {
            id: LineId(id),
            role: Role::Sense,
            pull,
        }
    }
}

/// Access to the digital lines of a matrix.
///
/// Implementations own the hardware handles. The scan engine is the only
/// caller while it exists, and it never asserts more than one drive line at a
/// time.
pub trait LineDriver {
    /// Error type for line operations
    type Error: Debug;

    /// Resolve and configure a line before scanning starts.
    ///
    /// Called once per row and column by
    /// [`ScanEngine::new`](crate::ScanEngine::new). A line that cannot be
    /// resolved must fail here rather than on a later `drive` or `read`.
    fn setup(&mut self, line: &Line) -> Result<(), Self::Error>;

    /// Set a drive line to `level`.
    ///
    /// The new level must be visible on sense lines once the configured settle
    /// delay has elapsed.
    fn drive(&mut self, line: LineId, level: Level) -> Result<(), Self::Error>;

    /// Sample the instantaneous level of a sense line.
    fn read(&mut self, line: LineId) -> Result<Level, Self::Error>;
}

impl<T: LineDriver + ?Sized> LineDriver for &mut T {
    type Error = T::Error;

    fn setup(&mut self, line: &Line) -> Result<(), Self::Error> {
        T::setup(self, line)
    }

    fn drive(&mut self, line: LineId, level: Level) -> Result<(), Self::Error> {
        T::drive(self, line, level)
    }

    fn read(&mut self, line: LineId) -> Result<Level, Self::Error> {
        T::read(self, line)
    }
}
