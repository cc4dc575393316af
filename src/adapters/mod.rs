//! Adapters: concrete implementations of the port traits.
//!
//! - [`sim`] — deterministic host simulation; drives the full control loop
//!   from tests and doubles as the reference platform.
//! - [`ds3231`] — DS3231 RTC register logic over a generic register bus;
//!   pure enough to test on the host, wired to I²C on hardware.
//! - [`host`] — interactive host-binary adapters (system clock, stdin
//!   console, file-backed config store, logging actuators).
//! - [`esp`] — ESP-IDF GPIO/timer/sleep adapters, compiled only for the
//!   `espidf` target.

pub mod ds3231;
pub mod host;
pub mod sim;

#[cfg(target_os = "espidf")]
pub mod esp;
