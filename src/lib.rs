//! Coop controller library.
//!
//! Offline, deterministic chicken-coop controller: a declarative daily
//! schedule anchored on solar events drives a motorized door, an
//! electromechanical lock, two latching relays and a bi-color status LED,
//! with an RTC-alarm deep-sleep main loop.
//!
//! Exposes the pure-logic modules for integration testing and external
//! inspection. All platform-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` inside the adapter modules; everything
//! else builds and tests on the host.
//!
//! Time model: the RTC and the scheduler are strictly UTC. Timezone and
//! DST exist only at the console boundary for human display and input.

#![deny(unused_must_use)]

pub mod app;
pub mod config;
pub mod console;
pub mod devices;
pub mod schedule;
pub mod solar;
pub mod timeutil;

pub mod adapters;
pub mod logger;

pub mod pins;

mod error;

pub use error::{ConfigError, Error, Result, RtcError};
