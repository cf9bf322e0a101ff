//! Scan timing configuration and builder

use fugit::MicrosDurationU32;

use crate::error::ConfigError;

/// Timing parameters of the scan engine.
///
/// Use [`Builder`] to create a `Config`; [`Config::default`] gives the
/// nominal values.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Config {
    /// Wait between asserting a row and sampling its columns. Covers the
    /// propagation through a series diode and the wiring capacitance.
    pub settle: MicrosDurationU32,
    /// Wait before re-sampling a column that read pressed.
    pub debounce: MicrosDurationU32,
    /// Sleep between samples while waiting for a held key to be released.
    pub release_poll: MicrosDurationU32,
    /// Give up waiting for a release after this long.
    pub release_timeout: MicrosDurationU32,
    /// Hold back a press on the same key that follows its release within
    /// this window.
    pub repeat_guard: Option<MicrosDurationU32>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            settle: MicrosDurationU32::micros(800),
            debounce: MicrosDurationU32::millis(20),
            release_poll: MicrosDurationU32::millis(1),
            release_timeout: MicrosDurationU32::secs(2),
            repeat_guard: None,
        }
    }
}

impl Config {
    pub fn builder() -> Builder {
        Builder::new()
    }

    /// Upper bound of a sweep that finds nothing: every row settles and every
    /// column bounces.
    pub fn worst_case_sweep(&self, rows: usize, columns: usize) -> fugit::MicrosDurationU64 {
        let per_row = u64::from(self.settle.to_micros())
            + columns as u64 * u64::from(self.debounce.to_micros());
        fugit::MicrosDurationU64::from_ticks(rows as u64 * per_row)
    }
}

/// Builder for [`Config`]
///
/// # Example
///
/// ```
/// use fugit::MicrosDurationU32;
/// use keypad_matrix::Config;
///
/// let config = Config::builder()
///     .debounce(MicrosDurationU32::millis(50))
///     .repeat_guard(MicrosDurationU32::millis(300))
///     .build()
///     .expect("valid configuration");
/// assert_eq!(config.settle, MicrosDurationU32::micros(800));
/// ```
#[derive(Clone, Copy, Debug, Default)]
pub struct Builder {
    config: Config,
}

impl Builder {
    /// Create a new Builder with the nominal timings
    pub fn new() -> Self {
        Self::default()
    }

    pub fn settle(mut self, settle: MicrosDurationU32) -> Self {
        self.config.settle = settle;
        self
    }

    pub fn debounce(mut self, debounce: MicrosDurationU32) -> Self {
        self.config.debounce = debounce;
        self
    }

    pub fn release_poll(mut self, interval: MicrosDurationU32) -> Self {
        self.config.release_poll = interval;
        self
    }

    pub fn release_timeout(mut self, timeout: MicrosDurationU32) -> Self {
        self.config.release_timeout = timeout;
        self
    }

    /// Enable the repeat guard
    pub fn repeat_guard(mut self, window: MicrosDurationU32) -> Self {
        self.config.repeat_guard = Some(window);
        self
    }

    /// Build the configuration
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidTiming` if the release poll interval is
    /// zero or longer than the release timeout, or if the timeout is zero.
    pub fn build(self) -> Result<Config, ConfigError> {
        let config = self.config;
        if config.release_timeout.ticks() == 0 {
            return Err(ConfigError::InvalidTiming("release timeout must be non-zero"));
        }
        if config.release_poll.ticks() == 0 {
            return Err(ConfigError::InvalidTiming("release poll interval must be non-zero"));
        }
        if config.release_poll > config.release_timeout {
            return Err(ConfigError::InvalidTiming(
                "release poll interval exceeds the release timeout",
            ));
        }
        Ok(config)
    }
}
