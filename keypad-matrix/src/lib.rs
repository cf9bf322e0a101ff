//! Key matrix scanning and debouncing for keypads wired to plain digital lines.
//!
//! One row is driven at a time, the columns are sampled, and a candidate press
//! is re-sampled after a debounce delay before it is reported. At most one key
//! is reported per sweep and a reported key is held until it is released (or a
//! safety timeout expires), so a long press yields exactly one symbol.
//!
//! Wiring polarity (rows driven high into pull-down columns, or rows driven low
//! into pull-up columns) is a property of the [`Topology`], not a separate code
//! path.
//!
//! This crate is `no_std` so it can run on the target board as well as in the
//! host-side tooling. Hardware access goes through the [`LineDriver`] trait;
//! [`PinDriver`] adapts `embedded-hal` pins to it.
//!
//! ```
//! use keypad_matrix::{layouts, Config, Topology};
//!
//! let topology = Topology::new(layouts::LETTER_GAME).unwrap();
//! assert_eq!(topology.symbol_at(2, 3).unwrap().as_str(), "P");
//! assert!(topology.symbol_at(9, 9).is_none());
//!
//! let config = Config::builder()
//!     .debounce(fugit::MicrosDurationU32::millis(20))
//!     .build()
//!     .unwrap();
//! assert_eq!(config.debounce.to_millis(), 20);
//! ```

#![cfg_attr(not(test), no_std)]

#[cfg(any(test, feature = "sim"))]
extern crate alloc;

pub mod config;
pub mod error;
pub mod layouts;
pub mod line;
pub mod pins;
pub mod scan;
#[cfg(any(test, feature = "sim"))]
pub mod sim;
pub mod stream;
pub mod time;
pub mod topology;

pub use config::{Builder, Config};
pub use error::{ConfigError, Error};
pub use line::{Level, Line, LineDriver, LineId, Pull, Role};
pub use pins::{PinDriver, PinError};
pub use scan::{HeldKey, KeyPress, Release, ScanEngine, State};
pub use stream::{Event, EventStream};
pub use time::{Clock, Duration, Instant};
pub use topology::{Coord, Layout, Polarity, Symbol, Topology};
