//! Pull-based key stream on top of a [`ScanEngine`].

use embedded_hal::delay::DelayNs;
use fugit::MicrosDurationU32;

use crate::error::Error;
use crate::line::LineDriver;
use crate::scan::{KeyPress, Release, ScanEngine};
use crate::time::{elapsed, Clock};
use crate::topology::{Coord, Symbol};

/// Outcome of one step of an [`EventStream`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Event<'a> {
    /// Nothing confirmed in this sweep.
    Idle,
    Key(KeyPress<'a>),
    /// A confirmed key never released; the engine gave up on it and is idle
    /// again. Follows the key's own event when it had a symbol.
    Stuck(Coord),
}

/// "Get next key or none", one sweep per call.
///
/// The stream is also an endless [`Iterator`]: `next()` always returns
/// `Some`, carrying `Ok(None)` when no key was confirmed. Pace it yourself,
/// for example with [`ScanEngine::pause`] through
/// [`engine_mut`](Self::engine_mut).
pub struct EventStream<'a, D, T, C> {
    engine: ScanEngine<'a, D, T, C>,
    stuck: Option<Coord>,
}

impl<'a, D, T, C> EventStream<'a, D, T, C>
where
    D: LineDriver,
    T: DelayNs,
    C: Clock,
{
    pub fn new(engine: ScanEngine<'a, D, T, C>) -> Self {
        EventStream {
            engine,
            stuck: None,
        }
    }

    pub fn engine(&self) -> &ScanEngine<'a, D, T, C> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut ScanEngine<'a, D, T, C> {
        &mut self.engine
    }

    pub fn into_engine(self) -> ScanEngine<'a, D, T, C> {
        self.engine
    }

    /// Symbol of the next confirmed key, if this sweep found one.
    pub fn next_key(&mut self) -> Result<Option<Symbol<'a>>, Error<D::Error>> {
        self.stuck = None;
        Ok(self.engine.sweep()?.map(|press| press.symbol))
    }

    /// Like [`next_key`](Self::next_key), but also reports a key whose
    /// release-wait timed out as [`Event::Stuck`].
    ///
    /// When the stuck key had a symbol, its [`Event::Key`] comes first and
    /// the next call returns the `Stuck` without sweeping.
    pub fn next_event(&mut self) -> Result<Event<'a>, Error<D::Error>> {
        if let Some(coord) = self.stuck.take() {
            return Ok(Event::Stuck(coord));
        }

        let before = self.engine.last_release();
        let press = self.engine.sweep()?;
        let after = self.engine.last_release();

        let timed_out = match after {
            Some(Release::TimedOut { coord, .. }) if after != before => Some(coord),
            _ => None,
        };
        Ok(match (press, timed_out) {
            (Some(press), Some(coord)) => {
                self.stuck = Some(coord);
                Event::Key(press)
            }
            (Some(press), None) => Event::Key(press),
            (None, Some(coord)) => Event::Stuck(coord),
            (None, None) => Event::Idle,
        })
    }

    /// Sweep every `interval` until a key is confirmed or `timeout` has
    /// passed since the call.
    pub fn wait_for_key(
        &mut self,
        timeout: MicrosDurationU32,
        interval: MicrosDurationU32,
    ) -> Result<Option<KeyPress<'a>>, Error<D::Error>> {
        let timeout = u64::from(timeout.to_micros());
        let interval = u64::from(interval.to_micros());
        let started = self.engine.now();
        self.stuck = None;

        loop {
            if let Some(press) = self.engine.sweep()? {
                return Ok(Some(press));
            }

            let waited = elapsed(started, self.engine.now()).to_micros();
            if waited >= timeout {
                return Ok(None);
            }
            let nap = interval.min(timeout - waited);
            self.engine.pause(MicrosDurationU32::from_ticks(nap as u32));
        }
    }
}

impl<'a, D, T, C> Iterator for EventStream<'a, D, T, C>
where
    D: LineDriver,
    T: DelayNs,
    C: Clock,
{
    type Item = Result<Option<Symbol<'a>>, Error<D::Error>>;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.next_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::layouts;
    use crate::sim::{Contact, SimMatrix};
    use crate::time::Instant;
    use crate::topology::Topology;

    fn ms(millis: u64) -> Instant {
        Instant::from_ticks(millis * 1000)
    }

    fn stream(
        sim: &SimMatrix,
    ) -> EventStream<'static, crate::sim::SimDriver<'_>, crate::sim::SimDelay<'_>, crate::sim::SimClock<'_>>
    {
        let topology = Topology::new(layouts::LETTER_GAME).unwrap();
        let engine =
            ScanEngine::new(topology, sim.driver(), sim.delay(), sim.clock(), Config::default())
                .unwrap();
        EventStream::new(engine)
    }

    fn sim() -> SimMatrix {
        SimMatrix::new(&Topology::new(layouts::LETTER_GAME).unwrap())
    }

    #[test]
    fn test_long_press_yields_one_symbol() {
        let sim = sim();
        sim.add_contact(Contact::between(Coord::new(2, 3), ms(0), ms(500)));
        let mut stream = stream(&sim);

        let mut symbols = Vec::new();
        while sim.now() < ms(1000) {
            if let Some(symbol) = stream.next_key().unwrap() {
                symbols.push(symbol.as_str());
            }
            stream.engine_mut().pause(MicrosDurationU32::millis(20));
        }
        assert_eq!(symbols, ["P"]);
    }

    #[test]
    fn test_stuck_key_is_reported() {
        let sim = sim();
        sim.add_contact(Contact::held(Coord::new(2, 3), ms(0)));
        let mut stream = stream(&sim);

        let press = match stream.next_event().unwrap() {
            Event::Key(press) => press,
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(press.symbol, "P");
        assert_eq!((sim.now() - press.confirmed_at).to_millis(), 2000);
        assert!(!stream.engine().is_held());

        // Reported on its own, without another sweep.
        let before = sim.now();
        assert_eq!(stream.next_event().unwrap(), Event::Stuck(Coord::new(2, 3)));
        assert_eq!(sim.now(), before);

        // Still closed, so it is confirmed again.
        assert!(matches!(stream.next_event().unwrap(), Event::Key(_)));
        assert_eq!(stream.next_event().unwrap(), Event::Stuck(Coord::new(2, 3)));
    }

    #[test]
    fn test_stuck_unmapped_key() {
        let topology = Topology::new(layouts::DIODE_TEST).unwrap();
        let sim = SimMatrix::new(&topology);
        // Row 5, col 1 has no key.
        sim.add_contact(Contact::held(Coord::new(5, 1), ms(0)));
        let engine =
            ScanEngine::new(topology, sim.driver(), sim.delay(), sim.clock(), Config::default())
                .unwrap();
        let mut stream = EventStream::new(engine);

        assert_eq!(stream.next_event().unwrap(), Event::Stuck(Coord::new(5, 1)));
    }

    #[test]
    fn test_tap_after_pause_is_a_new_key() {
        let sim = sim();
        sim.add_contact(Contact::between(Coord::new(2, 3), ms(0), ms(40)));
        sim.add_contact(Contact::between(Coord::new(2, 3), ms(500), ms(700)));
        let mut stream = stream(&sim);

        assert!(matches!(stream.next_event().unwrap(), Event::Key(_)));
        stream.engine_mut().pause(MicrosDurationU32::millis(550));

        let mut events = Vec::new();
        while sim.now() < ms(1500) {
            match stream.next_event().unwrap() {
                Event::Idle => {}
                event => events.push(event),
            }
            stream.engine_mut().pause(MicrosDurationU32::millis(20));
        }
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Event::Key(press) if press.symbol == "P"));
    }

    #[test]
    fn test_release_then_idle() {
        let sim = sim();
        sim.add_contact(Contact::between(Coord::new(0, 0), ms(0), ms(100)));
        let mut stream = stream(&sim);

        assert!(matches!(stream.next_event().unwrap(), Event::Key(_)));
        assert_eq!(stream.next_event().unwrap(), Event::Idle);
        assert_eq!(stream.next_event().unwrap(), Event::Idle);
    }

    #[test]
    fn test_iterator_never_ends() {
        let sim = sim();
        sim.add_contact(Contact::between(Coord::new(4, 1), ms(0), ms(50)));
        let stream = stream(&sim);

        let keys: Vec<_> = stream.take(5).map(Result::unwrap).collect();
        assert_eq!(keys.len(), 5);
        assert_eq!(keys[0].unwrap(), "Z");
        assert!(keys[1..].iter().all(Option::is_none));
    }

    #[test]
    fn test_wait_for_key() {
        let sim = sim();
        sim.add_contact(Contact::between(Coord::new(1, 1), ms(500), ms(700)));
        let mut stream = stream(&sim);

        let press = stream
            .wait_for_key(MicrosDurationU32::secs(30), MicrosDurationU32::millis(20))
            .unwrap()
            .unwrap();
        assert_eq!(press.symbol, "H");
        assert!(press.confirmed_at >= ms(520));
        assert!(press.confirmed_at < ms(600));
    }

    #[test]
    fn test_wait_for_key_times_out() {
        let sim = sim();
        let mut stream = stream(&sim);

        let result = stream
            .wait_for_key(MicrosDurationU32::millis(100), MicrosDurationU32::millis(20))
            .unwrap();
        assert_eq!(result, None);
        // The last sweep may start right at the deadline.
        let waited = sim.now().duration_since_epoch().to_millis();
        assert!((100..=105).contains(&waited));
    }
}
