//! Door motion state machine.
//!
//! The door is dead-reckoned: no position sensing, motion is a fixed
//! travel time. The machine serializes open/close requests, aborts and
//! restarts on new commands, and coordinates the lock so that:
//!
//! - the door ALWAYS unlocks (blocking) before motion,
//! - the door NEVER moves while locked,
//! - the lock engages ONLY after a close completes and the settle window
//!   elapses,
//! - OPEN is the safe fallback when state is unknown.
//!
//! Every motion transition publishes a status-LED mode so an observer at
//! the coop can read the machine: pulsing green while opening, pulsing red
//! while closing, solid red while locking, blinking red when position is
//! unknown, dark when idle.

use std::cell::RefCell;
use std::rc::Rc;

use log::info;

use crate::app::ports::{DelayMs, DoorHw};
use crate::config::Config;
use crate::devices::led::{LedColor, LedMachine, LedMode};
use crate::devices::lock::LockMachine;
use crate::devices::{DevState, Device, DeviceId};

/// Electrical dead-time between hard-stop and reverse drive, protecting
/// the H-bridge from shoot-through on mid-motion reversal.
const REVERSE_DEAD_TIME_MS: u32 = 100;

/// Bounds on the configured post-close settle window.
const SETTLE_MIN_MS: u32 = 250;
const SETTLE_MAX_MS: u32 = 5000;

/// Internal motion states (physical truth; `DevState` is settled intent).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoorMotion {
    /// Unknown at boot, or aborted mid-motion.
    IdleUnknown,
    IdleOpen,
    IdleClosed,
    MovingOpen,
    MovingClose,
    /// Settling after close, then engaging the lock.
    PostcloseLock,
}

pub struct DoorDevice {
    motion: DoorMotion,
    settled: DevState,
    t0_ms: u32,
    hw: Box<dyn DoorHw>,
    lock: Rc<RefCell<LockMachine>>,
    led: Rc<RefCell<LedMachine>>,
    cfg: Rc<RefCell<Config>>,
    delay: Box<dyn DelayMs>,
}

impl DoorDevice {
    pub fn new(
        hw: Box<dyn DoorHw>,
        lock: Rc<RefCell<LockMachine>>,
        led: Rc<RefCell<LedMachine>>,
        cfg: Rc<RefCell<Config>>,
        delay: Box<dyn DelayMs>,
    ) -> Self {
        Self {
            motion: DoorMotion::IdleUnknown,
            settled: DevState::Unknown,
            t0_ms: 0,
            hw,
            lock,
            led,
            cfg,
            delay,
        }
    }

    pub fn motion(&self) -> DoorMotion {
        self.motion
    }

    /// Request a new door state: `On` = open, `Off` = close.
    ///
    /// Edge-triggered; a request mid-motion aborts the current action.
    /// The blocking lock release means that on entry to `Moving*` the
    /// latch is physically clear.
    pub fn request(&mut self, state: DevState) {
        if state != DevState::On && state != DevState::Off {
            return;
        }

        // Abort any active motion immediately.
        if matches!(self.motion, DoorMotion::MovingOpen | DoorMotion::MovingClose) {
            self.hw.stop();
        }

        self.t0_ms = 0;
        self.settled = DevState::Unknown;

        // Never drive against the latch.
        self.lock.borrow_mut().release_blocking(self.delay.as_mut());

        if state == DevState::On {
            info!("door: opening");
            self.hw.set_open_dir();
            self.hw.enable();
            self.set_motion(DoorMotion::MovingOpen);
        } else {
            info!("door: closing");
            self.hw.set_close_dir();
            self.hw.enable();
            self.set_motion(DoorMotion::MovingClose);
        }
    }

    /// Manual reversal path for the door switch.
    ///
    /// Chooses the opposite of the current travel (close when open or
    /// opening, open when closed or closing, close when unknown), with a
    /// hard stop and an electrical dead-time before the reverse drive.
    /// A lock engagement in progress must finish first.
    pub fn toggle(&mut self) {
        if self.motion == DoorMotion::PostcloseLock {
            return;
        }

        let target = match self.motion {
            DoorMotion::IdleOpen | DoorMotion::MovingOpen => DevState::Off,
            DoorMotion::IdleClosed | DoorMotion::MovingClose => DevState::On,
            DoorMotion::IdleUnknown => DevState::Off,
            DoorMotion::PostcloseLock => return,
        };

        info!("door: toggle -> {:?}", target);
        self.hw.stop();
        self.t0_ms = 0;
        self.delay.delay_ms(REVERSE_DEAD_TIME_MS);
        self.request(target);
    }

    fn settle_ms(&self) -> u32 {
        u32::from(self.cfg.borrow().door_settle_ms).clamp(SETTLE_MIN_MS, SETTLE_MAX_MS)
    }

    fn travel_ms(&self) -> u32 {
        u32::from(self.cfg.borrow().door_travel_ms)
    }

    fn set_motion(&mut self, motion: DoorMotion) {
        if self.motion == motion {
            return;
        }
        self.motion = motion;

        let mut led = self.led.borrow_mut();
        match motion {
            DoorMotion::IdleOpen | DoorMotion::IdleClosed => led.set(LedMode::Off, LedColor::Green),
            DoorMotion::MovingOpen => led.set(LedMode::Pulse, LedColor::Green),
            DoorMotion::MovingClose => led.set(LedMode::Pulse, LedColor::Red),
            DoorMotion::PostcloseLock => led.set(LedMode::On, LedColor::Red),
            DoorMotion::IdleUnknown => led.set(LedMode::Blink, LedColor::Red),
        }
    }

    fn service(&mut self, now_ms: u32) {
        match self.motion {
            DoorMotion::MovingOpen => {
                if self.t0_ms == 0 {
                    self.t0_ms = now_ms;
                    return;
                }
                if now_ms.wrapping_sub(self.t0_ms) >= self.travel_ms() {
                    self.hw.stop();
                    self.t0_ms = 0;
                    self.settled = DevState::On;
                    info!("door: open");
                    self.set_motion(DoorMotion::IdleOpen);
                }
            }

            DoorMotion::MovingClose => {
                if self.t0_ms == 0 {
                    self.t0_ms = now_ms;
                    return;
                }
                if now_ms.wrapping_sub(self.t0_ms) >= self.travel_ms() {
                    self.hw.stop();
                    self.t0_ms = 0;
                    self.set_motion(DoorMotion::PostcloseLock);
                }
            }

            DoorMotion::PostcloseLock => {
                // Hold through the settle window (gravity and obstructions
                // clear), then throw the latch.
                if self.t0_ms == 0 {
                    self.t0_ms = now_ms;
                    return;
                }
                if now_ms.wrapping_sub(self.t0_ms) >= self.settle_ms() {
                    self.lock.borrow_mut().engage_blocking(self.delay.as_mut());
                    self.t0_ms = 0;
                    self.settled = DevState::Off;
                    info!("door: closed and locked");
                    self.set_motion(DoorMotion::IdleClosed);
                }
            }

            DoorMotion::IdleOpen | DoorMotion::IdleClosed | DoorMotion::IdleUnknown => {}
        }
    }
}

impl Device for DoorDevice {
    fn id(&self) -> DeviceId {
        DeviceId::Door
    }

    fn name(&self) -> &'static str {
        "door"
    }

    fn init(&mut self) {
        self.hw.stop();
        self.settled = DevState::Unknown;
        self.t0_ms = 0;
        self.set_motion(DoorMotion::IdleUnknown);
    }

    /// Settled truth only; `Unknown` while moving or locking.
    fn state(&self) -> DevState {
        self.settled
    }

    fn set_state(&mut self, state: DevState) {
        if state == DevState::On || state == DevState::Off {
            self.request(state);
        }
    }

    fn scheduled_state(&mut self, state: DevState, _when_epoch: u32) {
        // The door has no override arbitration; scheduled intent is a
        // plain request.
        self.set_state(state);
    }

    fn state_string(&self, state: DevState) -> &'static str {
        match state {
            DevState::On => "OPEN",
            DevState::Off => "CLOSED",
            // Unsettled: reflect motion truth.
            DevState::Unknown => match self.motion {
                DoorMotion::MovingOpen => "OPENING",
                DoorMotion::MovingClose => "CLOSING",
                DoorMotion::PostcloseLock => "LOCKING",
                DoorMotion::IdleUnknown => "UNKNOWN",
                _ => "TRANSITION",
            },
        }
    }

    fn tick(&mut self, now_ms: u32) {
        self.service(now_ms);
    }

    fn is_busy(&self) -> bool {
        !matches!(
            self.motion,
            DoorMotion::IdleUnknown | DoorMotion::IdleClosed | DoorMotion::IdleOpen
        )
    }
}

/// Registry adapter for a shared door. The machine lives behind an
/// `Rc<RefCell<_>>` so the control loop and the console can reach
/// `toggle()`, which is not part of the generic device capability set.
pub struct DoorHandle {
    sm: Rc<RefCell<DoorDevice>>,
}

impl DoorHandle {
    pub fn new(sm: Rc<RefCell<DoorDevice>>) -> Self {
        Self { sm }
    }
}

impl Device for DoorHandle {
    fn id(&self) -> DeviceId {
        DeviceId::Door
    }

    fn name(&self) -> &'static str {
        "door"
    }

    fn init(&mut self) {
        self.sm.borrow_mut().init();
    }

    fn state(&self) -> DevState {
        self.sm.borrow().state()
    }

    fn set_state(&mut self, state: DevState) {
        self.sm.borrow_mut().set_state(state);
    }

    fn scheduled_state(&mut self, state: DevState, when_epoch: u32) {
        self.sm.borrow_mut().scheduled_state(state, when_epoch);
    }

    fn state_string(&self, state: DevState) -> &'static str {
        self.sm.borrow().state_string(state)
    }

    fn tick(&mut self, now_ms: u32) {
        self.sm.borrow_mut().tick(now_ms);
    }

    fn is_busy(&self) -> bool {
        self.sm.borrow().is_busy()
    }
}
