//! Unified error types for the coop controller.
//!
//! A single `Error` enum that every subsystem can convert into, keeping the
//! top-level control loop's error handling uniform. All variants are `Copy`
//! so they can be passed around without allocation.
//!
//! Hardware-level transients are recovered locally by no-op-and-continue;
//! logical failures (full event table, unknown refnum, bad parse) surface as
//! `bool`/`Option` and are rendered by the console, so they never appear
//! here.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible operation in the controller funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Persistent configuration could not be loaded or decoded.
    Config(ConfigError),
    /// RTC access failed or the clock is not set.
    Rtc(RtcError),
    /// Peripheral initialisation failed.
    Init(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "config: {e}"),
            Self::Rtc(e) => write!(f, "rtc: {e}"),
            Self::Init(msg) => write!(f, "init: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Reasons a stored configuration blob is rejected at load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Blob is shorter than the fixed layout.
    Truncated,
    /// Magic prefix does not match.
    BadMagic,
    /// Stored version is not the current layout version.
    BadVersion,
    /// Fletcher-16 over the payload does not match the stored checksum.
    BadChecksum,
    /// The storage backend reported no blob at all (first boot).
    NotFound,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated => write!(f, "blob truncated"),
            Self::BadMagic => write!(f, "bad magic"),
            Self::BadVersion => write!(f, "version mismatch"),
            Self::BadChecksum => write!(f, "checksum mismatch"),
            Self::NotFound => write!(f, "no stored config"),
        }
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// RTC errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RtcError {
    /// Bus transaction failed (transient; caller retries next iteration).
    Bus,
    /// The oscillator-stopped flag is set; wall time is meaningless.
    NotSet,
}

impl fmt::Display for RtcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bus => write!(f, "bus transaction failed"),
            Self::NotSet => write!(f, "time not set"),
        }
    }
}

impl From<RtcError> for Error {
    fn from(e: RtcError) -> Self {
        Self::Rtc(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Controller-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
