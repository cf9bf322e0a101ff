//! The scan engine: one sweep over the matrix, debounce confirmation and
//! release tracking.
//!
//! A sweep drives the rows one at a time. While a row is asserted every column
//! is sampled in order; a column at the pressed level is re-sampled after the
//! debounce delay and, if it still reads pressed, the key is confirmed. The
//! row is dropped immediately, the key becomes the single [`HeldKey`], and the
//! rest of the sweep is skipped.
//!
//! The same sweep then waits, bounded by the release timeout, for the key's
//! column to return to idle. A held key is therefore reported once, and a
//! second tap after the caller's pause is a new press.

use embedded_hal::delay::DelayNs;
use fugit::MicrosDurationU32;
use log::{debug, info, trace, warn};

use crate::config::Config;
use crate::error::Error;
use crate::line::{Level, LineDriver, LineId};
use crate::time::{elapsed, Clock, Duration, Instant};
use crate::topology::{Coord, Symbol, Topology};

/// The key the engine is waiting on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeldKey {
    pub coord: Coord,
    pub confirmed_at: Instant,
}

/// Engine state between calls.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    /// No key held; the next call sweeps the matrix.
    Idle,
    /// A confirmed key has not been released yet. Only seen between calls
    /// when a release-wait failed with a line error.
    Held(HeldKey),
}

/// A confirmed press on a mapped key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeyPress<'a> {
    pub symbol: Symbol<'a>,
    pub coord: Coord,
    pub confirmed_at: Instant,
}

/// How a release-wait ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Release {
    /// The column returned to its idle level.
    Released {
        coord: Coord,
        held_for: Duration,
        at: Instant,
    },
    /// The column still read pressed when the release timeout expired.
    TimedOut { coord: Coord, at: Instant },
}

impl Release {
    pub fn coord(&self) -> Coord {
        match *self {
            Release::Released { coord, .. } | Release::TimedOut { coord, .. } => coord,
        }
    }

    pub fn at(&self) -> Instant {
        match *self {
            Release::Released { at, .. } | Release::TimedOut { at, .. } => at,
        }
    }

    pub fn timed_out(&self) -> bool {
        matches!(self, Release::TimedOut { .. })
    }
}

/// Scans a [`Topology`] through a [`LineDriver`].
///
/// The engine owns the driver, the delay and the clock for its whole life.
/// All methods take `&mut self`, so a sweep or release-wait can never be
/// re-entered.
pub struct ScanEngine<'a, D, T, C> {
    topology: Topology<'a>,
    config: Config,
    driver: D,
    delay: T,
    clock: C,
    state: State,
    last_release: Option<Release>,
}

impl<'a, D, T, C> ScanEngine<'a, D, T, C>
where
    D: LineDriver,
    T: DelayNs,
    C: Clock,
{
    /// Set up every line and park all rows at their inactive level.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Setup`] for the first line the driver cannot resolve,
    /// or [`Error::Line`] if parking a row fails.
    pub fn new(
        topology: Topology<'a>,
        mut driver: D,
        delay: T,
        clock: C,
        config: Config,
    ) -> Result<Self, Error<D::Error>> {
        for line in topology.rows().iter().chain(topology.columns()) {
            driver
                .setup(line)
                .map_err(|source| Error::Setup {
                    line: line.id,
                    source,
                })?;
        }

        let mut engine = ScanEngine {
            topology,
            config,
            driver,
            delay,
            clock,
            state: State::Idle,
            last_release: None,
        };
        engine.park_rows()?;

        info!(
            "scanning {}x{} matrix, {:?}, debounce {} us",
            topology.rows().len(),
            topology.columns().len(),
            topology.polarity(),
            config.debounce.to_micros()
        );
        Ok(engine)
    }

    pub fn topology(&self) -> &Topology<'a> {
        &self.topology
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn is_held(&self) -> bool {
        matches!(self.state, State::Held(_))
    }

    /// Outcome of the most recent release-wait.
    pub fn last_release(&self) -> Option<Release> {
        self.last_release
    }

    pub fn now(&mut self) -> Instant {
        self.clock.now()
    }

    /// Sleep on the engine's delay, for callers pacing their sweeps.
    pub fn pause(&mut self, duration: MicrosDurationU32) {
        self.delay.delay_us(duration.to_micros());
    }

    /// Sweep the whole matrix and report at most one key.
    ///
    /// A confirmed key is waited on (bounded by the release timeout) before
    /// this returns; [`last_release`](Self::last_release) tells how that wait
    /// ended. Returns `None` when no key is confirmed, when the confirmed key
    /// is absent from the symbol table, and when the repeat guard holds the
    /// press back.
    ///
    /// On a line error every row is parked before the error is returned.
    pub fn sweep(&mut self) -> Result<Option<KeyPress<'a>>, Error<D::Error>> {
        let result = self.sweep_and_wait();
        self.park_on_error(result)
    }

    /// Wait until the held key's column returns to idle or the release
    /// timeout expires, then go back to [`State::Idle`].
    ///
    /// The held row is asserted while polling (it is the only asserted row)
    /// and parked again afterwards. Returns `None` if no key was held.
    pub fn wait_for_release(&mut self) -> Result<Option<Release>, Error<D::Error>> {
        let result = self.poll_release();
        self.park_on_error(result)
    }

    /// Hand the driver, delay and clock back, with every row parked.
    pub fn release(mut self) -> Result<(D, T, C), Error<D::Error>> {
        self.park_rows()?;
        Ok((self.driver, self.delay, self.clock))
    }

    fn sweep_and_wait(&mut self) -> Result<Option<KeyPress<'a>>, Error<D::Error>> {
        // Left over from a release-wait that failed.
        if self.is_held() {
            self.poll_release()?;
        }

        let Some(coord) = self.find_press()? else {
            return Ok(None);
        };
        let press = self.confirm(coord);
        self.poll_release()?;
        Ok(press)
    }

    fn poll_release(&mut self) -> Result<Option<Release>, Error<D::Error>> {
        let held = match self.state {
            State::Held(held) => held,
            State::Idle => return Ok(None),
        };

        let polarity = self.topology.polarity();
        let row = self.topology.rows()[held.coord.row].id;
        let column = self.topology.columns()[held.coord.col].id;
        let timeout = u64::from(self.config.release_timeout.to_micros());
        let poll = u64::from(self.config.release_poll.to_micros());

        let started = self.clock.now();
        self.drive(row, polarity.active())?;
        self.delay.delay_us(self.config.settle.to_micros());

        let release = loop {
            let level = self.read(column)?;
            let now = self.clock.now();
            if level != polarity.pressed() {
                break Release::Released {
                    coord: held.coord,
                    held_for: elapsed(held.confirmed_at, now),
                    at: now,
                };
            }

            let waited = elapsed(started, now).to_micros();
            if waited >= timeout {
                warn!(
                    "key at {} still pressed after {} ms, giving up",
                    held.coord,
                    waited / 1000
                );
                break Release::TimedOut {
                    coord: held.coord,
                    at: now,
                };
            }

            // Never sleep past the deadline.
            let nap = poll.min(timeout - waited);
            self.delay.delay_us(nap as u32);
        };

        self.drive(row, polarity.inactive())?;
        self.state = State::Idle;
        self.last_release = Some(release);
        Ok(Some(release))
    }

    fn find_press(&mut self) -> Result<Option<Coord>, Error<D::Error>> {
        let topology = self.topology;
        let polarity = topology.polarity();

        self.park_rows()?;

        for (r, row) in topology.rows().iter().enumerate() {
            self.drive(row.id, polarity.active())?;
            self.delay.delay_us(self.config.settle.to_micros());

            for (c, column) in topology.columns().iter().enumerate() {
                if self.read(column.id)? != polarity.pressed() {
                    continue;
                }

                self.delay.delay_us(self.config.debounce.to_micros());
                if self.read(column.id)? != polarity.pressed() {
                    trace!("noise on row {}, col {}", r, c);
                    continue;
                }

                self.drive(row.id, polarity.inactive())?;
                return Ok(Some(Coord::new(r, c)));
            }

            self.drive(row.id, polarity.inactive())?;
        }

        Ok(None)
    }

    fn confirm(&mut self, coord: Coord) -> Option<KeyPress<'a>> {
        let now = self.clock.now();
        self.state = State::Held(HeldKey {
            coord,
            confirmed_at: now,
        });

        if let (Some(window), Some(Release::Released { coord: last, at, .. })) =
            (self.config.repeat_guard, self.last_release)
        {
            if last == coord && elapsed(at, now).to_micros() < u64::from(window.to_micros()) {
                debug!("repeat of {} within guard window, held back", coord);
                return None;
            }
        }

        match self.topology.symbol_at(coord.row, coord.col) {
            Some(symbol) => {
                debug!("confirmed {} at {}", symbol, coord);
                Some(KeyPress {
                    symbol,
                    coord,
                    confirmed_at: now,
                })
            }
            None => {
                debug!("press at unmapped {}", coord);
                None
            }
        }
    }

    fn park_on_error<R>(
        &mut self,
        result: Result<R, Error<D::Error>>,
    ) -> Result<R, Error<D::Error>> {
        if result.is_err() {
            // The first error is the one reported.
            let _ = self.park_rows();
        }
        result
    }

    fn park_rows(&mut self) -> Result<(), Error<D::Error>> {
        let inactive = self.topology.polarity().inactive();
        for row in self.topology.rows() {
            self.drive(row.id, inactive)?;
        }
        Ok(())
    }

    fn drive(&mut self, line: LineId, level: Level) -> Result<(), Error<D::Error>> {
        self.driver.drive(line, level).map_err(Error::Line)
    }

    fn read(&mut self, line: LineId) -> Result<Level, Error<D::Error>> {
        self.driver.read(line).map_err(Error::Line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line::{Line, Pull};
    use crate::sim::{Contact, SimError, SimMatrix};
    use crate::topology::{Layout, Polarity};

    const fn sym(label: &'static str) -> Option<Symbol<'static>> {
        Some(Symbol::new(label))
    }

    static ROWS: [Line; 5] = [
        Line::drive(1),
        Line::drive(2),
        Line::drive(3),
        Line::drive(4),
        Line::drive(5),
    ];
    static COLUMNS: [Line; 6] = [
        Line::sense(10, Pull::Down),
        Line::sense(11, Pull::Down),
        Line::sense(12, Pull::Down),
        Line::sense(13, Pull::Down),
        Line::sense(14, Pull::Down),
        Line::sense(15, Pull::Down),
    ];
    // Row 2, col 3 is 'R'; row 2, col 4 has no key.
    static SYMBOLS: [&[Option<Symbol<'static>>]; 5] = [
        &[sym("A"), sym("B"), sym("C"), sym("D"), sym("E"), sym("F")],
        &[sym("G"), sym("H"), sym("I"), sym("J"), sym("K"), sym("L")],
        &[sym("M"), sym("N"), sym("O"), sym("R"), None, sym("Q")],
        &[sym("S"), sym("T"), sym("U"), sym("V"), sym("W"), sym("X")],
        &[sym("Y"), sym("Z"), sym("1"), sym("2"), sym("3"), sym("4")],
    ];

    fn topology(polarity: Polarity) -> Topology<'static> {
        Topology::new(Layout {
            rows: &ROWS,
            columns: &COLUMNS,
            symbols: &SYMBOLS,
            polarity,
        })
        .unwrap()
    }

    fn ms(millis: u64) -> Instant {
        Instant::from_ticks(millis * 1000)
    }

    type SimEngine<'s> =
        ScanEngine<'static, crate::sim::SimDriver<'s>, crate::sim::SimDelay<'s>, crate::sim::SimClock<'s>>;

    fn engine(sim: &SimMatrix, config: Config) -> SimEngine<'_> {
        ScanEngine::new(
            topology(sim.polarity()),
            sim.driver(),
            sim.delay(),
            sim.clock(),
            config,
        )
        .unwrap()
    }

    #[test]
    fn test_reports_held_key_once() {
        let sim = SimMatrix::new(&topology(Polarity::ActiveHigh));
        sim.add_contact(Contact::between(Coord::new(2, 3), ms(0), ms(40)));
        let mut engine = engine(&sim, Config::default());

        let press = engine.sweep().unwrap().unwrap();
        assert_eq!(press.symbol, "R");
        assert_eq!(press.coord, Coord::new(2, 3));
        // Rows 0..=2 settled, then one debounce window.
        assert_eq!(press.confirmed_at, Instant::from_ticks(3 * 800 + 20_000));

        // The same sweep waited for the release.
        assert_eq!(engine.state(), State::Idle);
        let release = engine.last_release().unwrap();
        assert!(!release.timed_out());
        assert_eq!(release.coord(), Coord::new(2, 3));
        assert!(release.at() >= ms(40));
        assert!(release.at() <= ms(42));
        assert!(sim.now() >= ms(40));
        assert_eq!(sim.active_rows(), 0);

        assert_eq!(engine.sweep().unwrap(), None);
    }

    #[test]
    fn test_second_tap_after_pause_is_reported() {
        let sim = SimMatrix::new(&topology(Polarity::ActiveHigh));
        sim.add_contact(Contact::between(Coord::new(2, 3), ms(0), ms(40)));
        sim.add_contact(Contact::between(Coord::new(2, 3), ms(500), ms(700)));
        let mut engine = engine(&sim, Config::default());

        let first = engine.sweep().unwrap().unwrap();
        assert_eq!(first.symbol, "R");
        match engine.last_release().unwrap() {
            Release::Released { held_for, .. } => assert!(held_for.to_millis() < 20),
            other => panic!("unexpected {other:?}"),
        }

        // The caller is busy well past both the release and the next press.
        engine.pause(MicrosDurationU32::millis(550));

        let mut later = Vec::new();
        while sim.now() < ms(1500) {
            if let Some(press) = engine.sweep().unwrap() {
                later.push(press);
            }
            engine.pause(MicrosDurationU32::millis(20));
        }

        assert_eq!(later.len(), 1);
        assert_eq!(later[0].symbol, "R");
        assert!(later[0].confirmed_at >= ms(590));
        assert!(later[0].confirmed_at < ms(700));
        let release = engine.last_release().unwrap();
        assert!(!release.timed_out());
        assert!(release.at() >= ms(700));
        assert!(release.at() <= ms(702));
    }

    #[test]
    fn test_unmapped_key_is_no_key() {
        let sim = SimMatrix::new(&topology(Polarity::ActiveHigh));
        sim.add_contact(Contact::between(Coord::new(2, 4), ms(0), ms(40)));
        let mut engine = engine(&sim, Config::default());

        // The press was still confirmed and waited on until released.
        assert_eq!(engine.sweep().unwrap(), None);
        assert_eq!(engine.state(), State::Idle);
        let release = engine.last_release().unwrap();
        assert_eq!(release.coord(), Coord::new(2, 4));
        assert!(!release.timed_out());
        assert_eq!(engine.sweep().unwrap(), None);
    }

    #[test]
    fn test_noise_spike_is_rejected() {
        let sim = SimMatrix::new(&topology(Polarity::ActiveHigh));
        // Shorter than the 20 ms debounce window.
        sim.add_contact(Contact::between(Coord::new(2, 3), ms(0), ms(5)));
        let mut engine = engine(&sim, Config::default());

        assert_eq!(engine.sweep().unwrap(), None);
        assert_eq!(engine.state(), State::Idle);
        assert_eq!(engine.last_release(), None);
        // Rows settle, one rejected candidate, rows settle.
        assert_eq!(sim.now(), Instant::from_ticks(5 * 800 + 20_000));
    }

    #[test]
    fn test_first_key_in_scan_order_wins() {
        let sim = SimMatrix::new(&topology(Polarity::ActiveHigh));
        sim.add_contact(Contact::held(Coord::new(3, 0), ms(0)));
        sim.add_contact(Contact::held(Coord::new(1, 5), ms(0)));
        sim.add_contact(Contact::held(Coord::new(1, 2), ms(0)));
        let mut engine = engine(&sim, Config::default());

        let press = engine.sweep().unwrap().unwrap();
        assert_eq!(press.coord, Coord::new(1, 2));
        assert_eq!(press.symbol, "I");
        // Later rows were never asserted in that sweep.
        assert!(sim
            .drives()
            .iter()
            .filter(|drive| drive.level == Level::High)
            .all(|drive| drive.row <= 1));
    }

    #[test]
    fn test_single_row_asserted() {
        let sim = SimMatrix::new(&topology(Polarity::ActiveHigh));
        sim.add_contact(Contact::between(Coord::new(0, 0), ms(0), ms(30)));
        sim.add_contact(Contact::between(Coord::new(4, 5), ms(100), ms(400)));
        sim.add_contact(Contact::between(Coord::new(2, 3), ms(150), ms(160)));
        let mut engine = engine(&sim, Config::default());

        let mut keys = Vec::new();
        while sim.now() < ms(600) {
            if let Some(press) = engine.sweep().unwrap() {
                keys.push(press.symbol.as_str());
            }
            engine.pause(MicrosDurationU32::millis(10));
        }

        assert_eq!(keys, ["A", "4"]);
        assert_eq!(sim.max_active_rows(), 1);
        assert!(sim.drives().len() > 100);
        assert_eq!(sim.active_rows(), 0);
    }

    #[test]
    fn test_release_timeout_bounds_the_wait() {
        let sim = SimMatrix::new(&topology(Polarity::ActiveHigh));
        // Never released.
        sim.add_contact(Contact::held(Coord::new(2, 3), ms(0)));
        let mut engine = engine(&sim, Config::default());

        let press = engine.sweep().unwrap().unwrap();
        assert_eq!(press.symbol, "R");

        let release = engine.last_release().unwrap();
        assert!(release.timed_out());
        assert_eq!((release.at() - press.confirmed_at).to_millis(), 2000);
        assert_eq!(sim.now(), release.at());
        assert_eq!(engine.state(), State::Idle);
        assert_eq!(sim.active_rows(), 0);

        // A key stuck past the timeout is reported again.
        assert_eq!(engine.sweep().unwrap().unwrap().symbol, "R");
    }

    #[test]
    fn test_release_timeout_is_configurable() {
        let sim = SimMatrix::new(&topology(Polarity::ActiveHigh));
        sim.stick_column(0, ms(0));
        let config = Config::builder()
            .release_timeout(MicrosDurationU32::millis(250))
            .release_poll(MicrosDurationU32::millis(7))
            .build()
            .unwrap();
        let mut engine = engine(&sim, config);

        // A stuck column reads pressed on every row, so the first row wins.
        let press = engine.sweep().unwrap().unwrap();
        assert_eq!(press.coord, Coord::new(0, 0));
        let release = engine.last_release().unwrap();
        assert!(release.timed_out());
        assert_eq!((release.at() - press.confirmed_at).to_millis(), 250);
    }

    #[test]
    fn test_active_low_polarity() {
        static LOW_COLUMNS: [Line; 6] = [
            Line::sense(10, Pull::Up),
            Line::sense(11, Pull::Up),
            Line::sense(12, Pull::Up),
            Line::sense(13, Pull::Up),
            Line::sense(14, Pull::Up),
            Line::sense(15, Pull::None),
        ];
        let topology = Topology::new(Layout {
            rows: &ROWS,
            columns: &LOW_COLUMNS,
            symbols: &SYMBOLS,
            polarity: Polarity::ActiveLow,
        })
        .unwrap();
        let sim = SimMatrix::new(&topology);
        sim.add_contact(Contact::between(Coord::new(4, 5), ms(0), ms(60)));
        let mut engine =
            ScanEngine::new(topology, sim.driver(), sim.delay(), sim.clock(), Config::default())
                .unwrap();

        // Parked rows sit high with active-low wiring.
        assert!(sim.drives().iter().all(|drive| drive.level == Level::High));
        assert_eq!(engine.sweep().unwrap().unwrap().symbol, "4");
        assert_eq!(sim.max_active_rows(), 1);
        assert!(!engine.last_release().unwrap().timed_out());
        assert_eq!(engine.sweep().unwrap(), None);
        assert_eq!(sim.active_rows(), 0);
    }

    #[test]
    fn test_repeat_guard_holds_back_chatter() {
        let config = Config::builder()
            .repeat_guard(MicrosDurationU32::millis(300))
            .build()
            .unwrap();
        let keys_with = |config: Config| {
            let sim = SimMatrix::new(&topology(Polarity::ActiveHigh));
            sim.add_contact(Contact::between(Coord::new(2, 3), ms(0), ms(40)));
            sim.add_contact(Contact::between(Coord::new(2, 3), ms(60), ms(120)));
            sim.add_contact(Contact::between(Coord::new(2, 3), ms(1000), ms(1100)));
            let mut engine = engine(&sim, config);
            let mut keys = Vec::new();
            while sim.now() < ms(1500) {
                if let Some(press) = engine.sweep().unwrap() {
                    keys.push(press.confirmed_at);
                }
                engine.pause(MicrosDurationU32::millis(10));
            }
            keys
        };

        let guarded = keys_with(config);
        assert_eq!(guarded.len(), 2);
        assert!(guarded[1] >= ms(1000));

        let unguarded = keys_with(Config::default());
        assert_eq!(unguarded.len(), 3);
    }

    #[test]
    fn test_setup_rejects_unknown_line() {
        static OTHER_ROWS: [Line; 5] = [
            Line::drive(1),
            Line::drive(2),
            Line::drive(3),
            Line::drive(4),
            Line::drive(99),
        ];
        let sim = SimMatrix::new(&topology(Polarity::ActiveHigh));
        let other = Topology::new(Layout {
            rows: &OTHER_ROWS,
            ..topology(Polarity::ActiveHigh).layout()
        })
        .unwrap();

        let result = ScanEngine::new(other, sim.driver(), sim.delay(), sim.clock(), Config::default());
        assert!(matches!(
            result,
            Err(Error::Setup { line: LineId(99), .. })
        ));
    }

    #[test]
    fn test_read_error_while_probing_parks_rows() {
        let sim = SimMatrix::new(&topology(Polarity::ActiveHigh));
        sim.fail_column(2, ms(0));
        let mut engine = engine(&sim, Config::default());

        // Row 0 is asserted when column 2 fails.
        let result = engine.sweep();
        assert!(matches!(result, Err(Error::Line(SimError::Fault(LineId(12))))));
        assert_eq!(sim.active_rows(), 0);
        assert_eq!(engine.state(), State::Idle);
    }

    #[test]
    fn test_read_error_while_waiting_parks_rows() {
        let sim = SimMatrix::new(&topology(Polarity::ActiveHigh));
        sim.add_contact(Contact::held(Coord::new(2, 3), ms(0)));
        // After the confirm at 22.4 ms, during the release-wait.
        sim.fail_column(3, ms(30));
        let mut engine = engine(&sim, Config::default());

        let result = engine.sweep();
        assert!(matches!(result, Err(Error::Line(SimError::Fault(LineId(13))))));
        assert_eq!(sim.active_rows(), 0);
        assert!(matches!(
            engine.state(),
            State::Held(HeldKey { coord, .. }) if coord == Coord::new(2, 3)
        ));

        // Retrying keeps failing on the held key's column, and still parks.
        assert!(engine.wait_for_release().is_err());
        assert_eq!(sim.active_rows(), 0);
    }

    #[test]
    fn test_release_parks_rows() {
        let sim = SimMatrix::new(&topology(Polarity::ActiveHigh));
        sim.add_contact(Contact::held(Coord::new(0, 1), ms(0)));
        let mut engine = engine(&sim, Config::default());
        assert!(engine.sweep().unwrap().is_some());
        let (_driver, _delay, _clock) = engine.release().unwrap();
        assert_eq!(sim.active_rows(), 0);
    }
}
