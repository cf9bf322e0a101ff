//! Simulated key matrix on a virtual clock.
//!
//! [`SimMatrix`] models the electrical behaviour of a diode matrix: a column
//! reads pressed while a row carrying a closed contact on that column is
//! asserted, or while the column itself is stuck. Time only moves when the
//! scan engine sleeps, so every run is deterministic.
//!
//! The matrix hands out three borrowing handles, [`SimMatrix::driver`],
//! [`SimMatrix::delay`] and [`SimMatrix::clock`], that plug straight into
//! [`ScanEngine::new`](crate::ScanEngine::new).

use alloc::vec::Vec;
use core::cell::{Cell, RefCell};
use core::fmt;

use embedded_hal::delay::DelayNs;

use crate::line::{Level, Line, LineDriver, LineId, Role};
use crate::time::{Clock, Instant};
use crate::topology::{Coord, Polarity, Topology};

/// A key held closed over a span of virtual time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Contact {
    pub coord: Coord,
    pub from: Instant,
    /// Open-ended when `None`.
    pub until: Option<Instant>,
}

impl Contact {
    /// Closed from `from` (inclusive) to `until` (exclusive).
    pub fn between(coord: Coord, from: Instant, until: Instant) -> Self {
        Contact {
            coord,
            from,
            until: Some(until),
        }
    }

    /// Closed from `from` on, never released.
    pub fn held(coord: Coord, from: Instant) -> Self {
        Contact {
            coord,
            from,
            until: None,
        }
    }

    fn closed_at(&self, now: Instant) -> bool {
        now >= self.from && self.until.map_or(true, |until| now < until)
    }
}

/// One recorded change of a row's level.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Drive {
    pub row: usize,
    pub level: Level,
    pub at: Instant,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SimError {
    /// The line is neither a row nor a column of the simulated matrix.
    UnknownLine(LineId),
    /// Driving a column, reading a row, or setting up a line with the wrong
    /// role.
    WrongRole(LineId),
    /// Reading a column marked with [`SimMatrix::fail_column`].
    Fault(LineId),
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimError::UnknownLine(line) => write!(f, "{line} is not wired in the simulation"),
            SimError::WrongRole(line) => write!(f, "{line} used with the wrong role"),
            SimError::Fault(line) => write!(f, "reading {line} failed"),
        }
    }
}

impl core::error::Error for SimError {}

/// Simulated matrix wired like a [`Topology`].
pub struct SimMatrix {
    polarity: Polarity,
    rows: Vec<LineId>,
    columns: Vec<LineId>,
    contacts: RefCell<Vec<Contact>>,
    stuck: RefCell<Vec<(usize, Instant)>>,
    faults: RefCell<Vec<(usize, Instant)>>,
    row_levels: RefCell<Vec<Option<Level>>>,
    drives: RefCell<Vec<Drive>>,
    now_ns: Cell<u64>,
    max_active: Cell<usize>,
}

impl SimMatrix {
    pub fn new(topology: &Topology<'_>) -> Self {
        SimMatrix {
            polarity: topology.polarity(),
            rows: topology.rows().iter().map(|line| line.id).collect(),
            columns: topology.columns().iter().map(|line| line.id).collect(),
            contacts: RefCell::new(Vec::new()),
            stuck: RefCell::new(Vec::new()),
            faults: RefCell::new(Vec::new()),
            row_levels: RefCell::new(alloc::vec![None; topology.rows().len()]),
            drives: RefCell::new(Vec::new()),
            now_ns: Cell::new(0),
            max_active: Cell::new(0),
        }
    }

    pub fn polarity(&self) -> Polarity {
        self.polarity
    }

    pub fn add_contact(&self, contact: Contact) {
        self.contacts.borrow_mut().push(contact);
    }

    /// Hold column `col` at the pressed level from `from` on, whatever the
    /// rows do.
    pub fn stick_column(&self, col: usize, from: Instant) {
        self.stuck.borrow_mut().push((col, from));
    }

    /// Make every read of column `col` fail from `from` on.
    pub fn fail_column(&self, col: usize, from: Instant) {
        self.faults.borrow_mut().push((col, from));
    }

    pub fn now(&self) -> Instant {
        Instant::from_ticks(self.now_ns.get() / 1000)
    }

    /// Most rows ever asserted at the same time.
    pub fn max_active_rows(&self) -> usize {
        self.max_active.get()
    }

    /// Rows asserted right now.
    pub fn active_rows(&self) -> usize {
        let active = Some(self.polarity.active());
        self.row_levels
            .borrow()
            .iter()
            .filter(|level| **level == active)
            .count()
    }

    /// Every row level change so far, oldest first.
    pub fn drives(&self) -> Vec<Drive> {
        self.drives.borrow().clone()
    }

    pub fn driver(&self) -> SimDriver<'_> {
        SimDriver { sim: self }
    }

    pub fn delay(&self) -> SimDelay<'_> {
        SimDelay { sim: self }
    }

    pub fn clock(&self) -> SimClock<'_> {
        SimClock { sim: self }
    }

    fn advance_ns(&self, ns: u64) {
        self.now_ns.set(self.now_ns.get().saturating_add(ns));
    }

    fn row_index(&self, line: LineId) -> Option<usize> {
        self.rows.iter().position(|id| *id == line)
    }

    fn column_index(&self, line: LineId) -> Option<usize> {
        self.columns.iter().position(|id| *id == line)
    }

    fn role_of(&self, line: LineId) -> Result<Role, SimError> {
        if self.row_index(line).is_some() {
            Ok(Role::Drive)
        } else if self.column_index(line).is_some() {
            Ok(Role::Sense)
        } else {
            Err(SimError::UnknownLine(line))
        }
    }

    fn column_pressed(&self, col: usize) -> bool {
        let now = self.now();
        if self
            .stuck
            .borrow()
            .iter()
            .any(|(stuck, from)| *stuck == col && now >= *from)
        {
            return true;
        }

        let active = Some(self.polarity.active());
        let levels = self.row_levels.borrow();
        self.contacts.borrow().iter().any(|contact| {
            contact.coord.col == col
                && levels.get(contact.coord.row) == Some(&active)
                && contact.closed_at(now)
        })
    }
}

/// [`LineDriver`] handle of a [`SimMatrix`].
pub struct SimDriver<'s> {
    sim: &'s SimMatrix,
}

impl LineDriver for SimDriver<'_> {
    type Error = SimError;

    fn setup(&mut self, line: &Line) -> Result<(), SimError> {
        if self.sim.role_of(line.id)? != line.role {
            return Err(SimError::WrongRole(line.id));
        }
        Ok(())
    }

    fn drive(&mut self, line: LineId, level: Level) -> Result<(), SimError> {
        let row = match self.sim.row_index(line) {
            Some(row) => row,
            None => {
                self.sim.role_of(line)?;
                return Err(SimError::WrongRole(line));
            }
        };

        self.sim.row_levels.borrow_mut()[row] = Some(level);
        self.sim.drives.borrow_mut().push(Drive {
            row,
            level,
            at: self.sim.now(),
        });
        let active = self.sim.active_rows();
        if active > self.sim.max_active.get() {
            self.sim.max_active.set(active);
        }
        Ok(())
    }

    fn read(&mut self, line: LineId) -> Result<Level, SimError> {
        let col = match self.sim.column_index(line) {
            Some(col) => col,
            None => {
                self.sim.role_of(line)?;
                return Err(SimError::WrongRole(line));
            }
        };

        let now = self.sim.now();
        if self
            .sim
            .faults
            .borrow()
            .iter()
            .any(|(failing, from)| *failing == col && now >= *from)
        {
            return Err(SimError::Fault(line));
        }

        let pressed = self.sim.polarity.pressed();
        Ok(if self.sim.column_pressed(col) {
            pressed
        } else {
            !pressed
        })
    }
}

/// Delay handle of a [`SimMatrix`]: sleeping advances the virtual clock.
pub struct SimDelay<'s> {
    sim: &'s SimMatrix,
}

impl DelayNs for SimDelay<'_> {
    fn delay_ns(&mut self, ns: u32) {
        self.sim.advance_ns(u64::from(ns));
    }

    fn delay_us(&mut self, us: u32) {
        self.sim.advance_ns(u64::from(us) * 1000);
    }

    fn delay_ms(&mut self, ms: u32) {
        self.sim.advance_ns(u64::from(ms) * 1_000_000);
    }
}

/// Clock handle of a [`SimMatrix`].
pub struct SimClock<'s> {
    sim: &'s SimMatrix,
}

impl Clock for SimClock<'_> {
    fn now(&mut self) -> Instant {
        self.sim.now()
    }
}
