//! Lock pulse engine.
//!
//! The lock actuator is a high-current solenoid/motor behind an H-bridge.
//! It is only ever energized in bounded pulses, and this module is the
//! single owner of that bound: the configured pulse length is capped at
//! [`LOCK_MAX_PULSE_MS`] here, regardless of what the configuration or a
//! corrupt EEPROM says, and never depends on higher-level scheduling.
//!
//! Two drive paths share one engine and one settled truth:
//!
//! - **Tick path** (`engage`/`release` + `tick`): non-blocking, used when
//!   the lock is commanded as a schedulable device in its own right.
//! - **Blocking path** (`engage_blocking`/`release_blocking`): a hard-capped
//!   wait that guarantees the actuator is de-energized on return, on every
//!   path. The door state machine uses this before and after motion; its
//!   safety argument depends on the blocking property, so do not convert
//!   these to cooperative waits.

use std::cell::RefCell;
use std::rc::Rc;

use log::info;

use crate::app::ports::{DelayMs, LockHw};
use crate::config::Config;
use crate::devices::{DevState, Device, DeviceId};

/// Absolute maximum energize time, milliseconds. Exists to prevent motor
/// burnout and bridge thermal failure under all circumstances.
pub const LOCK_MAX_PULSE_MS: u32 = 1500;

/// Bridge discharge dead-time before a direction change, milliseconds.
const DIR_DEAD_TIME_MS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PulseState {
    Idle,
    Engaging,
    Releasing,
}

/// The pulse engine. Shared between the registered lock device (tick path)
/// and the door state machine (blocking path) through an `Rc<RefCell<_>>`
/// handle, so there is exactly one owner of the lock hardware.
pub struct LockMachine {
    state: PulseState,
    t0_ms: u32,
    /// Last known mechanical truth: `On` = locked, `Off` = unlocked,
    /// `Unknown` = never commanded since boot.
    settled: DevState,
    hw: Box<dyn LockHw>,
    cfg: Rc<RefCell<Config>>,
}

impl LockMachine {
    pub fn new(hw: Box<dyn LockHw>, cfg: Rc<RefCell<Config>>) -> Self {
        Self { state: PulseState::Idle, t0_ms: 0, settled: DevState::Unknown, hw, cfg }
    }

    pub fn init(&mut self) {
        self.hw.stop();
        self.state = PulseState::Idle;
        self.t0_ms = 0;
        self.settled = DevState::Unknown;
    }

    /// Configured pulse length bounded by the hard safety cap.
    fn bounded_pulse_ms(&self) -> u32 {
        let ms = u32::from(self.cfg.borrow().lock_pulse_ms);
        if ms == 0 || ms > LOCK_MAX_PULSE_MS {
            LOCK_MAX_PULSE_MS
        } else {
            ms
        }
    }

    // ── Tick path ─────────────────────────────────────────────

    /// Start an engage pulse. Ignored unless idle.
    pub fn engage(&mut self) {
        if self.state != PulseState::Idle {
            return;
        }
        self.hw.set_engage_dir();
        self.hw.enable();
        self.state = PulseState::Engaging;
        self.t0_ms = 0;
    }

    /// Start a release pulse. Ignored unless idle.
    pub fn release(&mut self) {
        if self.state != PulseState::Idle {
            return;
        }
        self.hw.set_release_dir();
        self.hw.enable();
        self.state = PulseState::Releasing;
        self.t0_ms = 0;
    }

    pub fn tick(&mut self, now_ms: u32) {
        if self.state == PulseState::Idle {
            return;
        }

        // Arm start time on first tick.
        if self.t0_ms == 0 {
            self.t0_ms = now_ms;
            return;
        }

        if now_ms.wrapping_sub(self.t0_ms) >= self.bounded_pulse_ms() {
            self.hw.stop();

            // Mechanical truth updates only when the pulse completes.
            self.settled = match self.state {
                PulseState::Engaging => DevState::On,
                PulseState::Releasing => DevState::Off,
                PulseState::Idle => self.settled,
            };
            info!("lock: settled {:?}", self.settled);

            self.state = PulseState::Idle;
            self.t0_ms = 0;
        }
    }

    // ── Blocking path ─────────────────────────────────────────

    /// Blocking engage: on return the lock is locked and de-energized.
    pub fn engage_blocking(&mut self, delay: &mut dyn DelayMs) {
        self.pulse_blocking(true, delay);
    }

    /// Blocking release: on return the lock is unlocked and de-energized.
    pub fn release_blocking(&mut self, delay: &mut dyn DelayMs) {
        self.pulse_blocking(false, delay);
    }

    fn pulse_blocking(&mut self, engage: bool, delay: &mut dyn DelayMs) {
        // Defensive baseline: fully disabled before any direction change.
        // This also aborts a tick-path pulse that happens to be running.
        self.hw.stop();
        self.state = PulseState::Idle;
        self.t0_ms = 0;

        delay.delay_ms(DIR_DEAD_TIME_MS);

        if engage {
            self.hw.set_engage_dir();
        } else {
            self.hw.set_release_dir();
        }

        let ms = self.bounded_pulse_ms();
        self.hw.enable();
        delay.delay_ms(ms);

        // Always shut down power before returning.
        self.hw.stop();

        self.settled = if engage { DevState::On } else { DevState::Off };
        info!("lock: settled {:?} (blocking pulse {ms} ms)", self.settled);
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn busy(&self) -> bool {
        self.state != PulseState::Idle
    }

    pub fn state(&self) -> DevState {
        self.settled
    }
}

// ---------------------------------------------------------------------------
// Device adapter
// ---------------------------------------------------------------------------

/// Registered lock device: Device API → pulse engine, tick path.
pub struct LockDevice {
    sm: Rc<RefCell<LockMachine>>,
}

impl LockDevice {
    pub fn new(sm: Rc<RefCell<LockMachine>>) -> Self {
        Self { sm }
    }
}

impl Device for LockDevice {
    fn id(&self) -> DeviceId {
        DeviceId::Lock
    }

    fn name(&self) -> &'static str {
        "lock"
    }

    fn init(&mut self) {
        self.sm.borrow_mut().init();
    }

    fn state(&self) -> DevState {
        self.sm.borrow().state()
    }

    fn set_state(&mut self, state: DevState) {
        match state {
            DevState::On => self.sm.borrow_mut().engage(),
            DevState::Off => self.sm.borrow_mut().release(),
            DevState::Unknown => {}
        }
    }

    fn state_string(&self, state: DevState) -> &'static str {
        match state {
            DevState::On => "LOCK",
            DevState::Off => "UNLOCK",
            DevState::Unknown => "UNKNOWN",
        }
    }

    fn tick(&mut self, now_ms: u32) {
        self.sm.borrow_mut().tick(now_ms);
    }

    fn is_busy(&self) -> bool {
        self.sm.borrow().busy()
    }
}
