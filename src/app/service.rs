//! The main control loop as a host-testable service.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ each iteration                                               │
//! │                                                              │
//! │  tick devices ─ config switch ─ console ─ door latch ─ RTC   │
//! │        │                                              │      │
//! │        ▼                                              ▼      │
//! │  minute/ETag changed? ──▶ solar day ──▶ reducer ──▶ applier  │
//! │        │                                                     │
//! │        ▼                                                     │
//! │  sleep gate ──▶ arm RTC alarm ──▶ deep sleep ──▶ re-arm INTs │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! [`CoopService`] owns the schedule, the device registry and the console;
//! all I/O flows through the [`Platform`] ports passed to [`iterate`],
//! which is what makes the whole loop drivable from tests with simulated
//! hardware.
//!
//! [`iterate`]: CoopService::iterate

use std::cell::RefCell;
use std::rc::Rc;

use log::{info, warn};

use crate::app::ports::{
    ConfigStore, DelayMs, DoorHw, EpochSource, LedHw, LockHw, Platform, RelayHw,
};
use crate::config::Config;
use crate::console::Console;
use crate::devices::door::{DoorDevice, DoorHandle};
use crate::devices::led::{LedColor, LedMachine, LedMode};
use crate::devices::lock::{LockDevice, LockMachine};
use crate::devices::relay::RelayDevice;
use crate::devices::{DeviceId, DeviceRegistry};
use crate::schedule::apply::apply;
use crate::schedule::reducer::reduce;
use crate::schedule::Scheduler;
use crate::{solar, timeutil};

/// Door switch debounce window.
const DOOR_DEBOUNCE_MS: u32 = 20;
/// Config slide switch confirmation delay.
const CONFIG_SW_CONFIRM_MS: u32 = 75;
/// Boot greeting: green blink cycles after a clean start.
const BOOT_BLINK_CYCLES: u16 = 4;

/// What one loop iteration did; returned so tests and the host binary can
/// observe the loop without reaching into its state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopStep {
    /// Console active; the loop never sleeps in CONFIG mode.
    ConfigMode,
    /// RTC invalid or unreadable; scheduling suppressed, LED blinking red.
    RtcInvalid,
    /// Stayed awake: motion in progress, debounce running, or a door
    /// event pending.
    Awake,
    /// Armed the minute alarm and entered deep sleep; interrupt sources
    /// were re-armed after the wake.
    Slept { wake_minute: u16 },
}

/// Actuator hardware and shared services handed in by `main`.
pub struct HardwareBundle {
    pub door: Box<dyn DoorHw>,
    pub lock: Box<dyn LockHw>,
    pub led: Box<dyn LedHw>,
    pub relay1: Box<dyn RelayHw>,
    pub relay2: Box<dyn RelayHw>,
    /// Delay provider for the door's blocking paths (lock pulses,
    /// reversal dead-time).
    pub door_delay: Box<dyn DelayMs>,
    /// Epoch source for relay override stamping.
    pub epoch: Rc<RefCell<dyn EpochSource>>,
}

pub struct CoopService {
    cfg: Rc<RefCell<Config>>,
    scheduler: Scheduler,
    devices: DeviceRegistry,
    door: Rc<RefCell<DoorDevice>>,
    led: Rc<RefCell<LedMachine>>,
    console: Console,
    store: Box<dyn ConfigStore>,

    last_minute: u16,
    last_etag: u32,
    in_config_mode: bool,
    debounce_active: bool,
    debounce_start_ms: u32,
}

impl CoopService {
    /// Assemble the device graph and run one-shot init.
    ///
    /// `config_ok` is the outcome of the boot-time load: a clean load gets
    /// the green boot greeting, a corrupt or missing blob gets continuous
    /// blink-red until the operator intervenes.
    pub fn new(
        config: Config,
        config_ok: bool,
        hw: HardwareBundle,
        store: Box<dyn ConfigStore>,
    ) -> Self {
        let cfg = Rc::new(RefCell::new(config));

        let led = Rc::new(RefCell::new(LedMachine::new(hw.led)));
        let lock = Rc::new(RefCell::new(LockMachine::new(hw.lock, Rc::clone(&cfg))));
        let door = Rc::new(RefCell::new(DoorDevice::new(
            hw.door,
            Rc::clone(&lock),
            Rc::clone(&led),
            Rc::clone(&cfg),
            hw.door_delay,
        )));

        let mut devices = DeviceRegistry::new();
        devices.register(Box::new(DoorHandle::new(Rc::clone(&door))));
        devices.register(Box::new(LockDevice::new(Rc::clone(&lock))));
        devices.register(Box::new(crate::devices::led::LedDevice::new(Rc::clone(&led))));
        devices.register(Box::new(RelayDevice::new(
            DeviceId::Relay1,
            "relay1",
            hw.relay1,
            Rc::clone(&hw.epoch),
        )));
        devices.register(Box::new(RelayDevice::new(
            DeviceId::Relay2,
            "relay2",
            hw.relay2,
            Rc::clone(&hw.epoch),
        )));
        devices.init_all();

        if config_ok {
            led.borrow_mut().set_cycles(LedMode::Blink, LedColor::Green, BOOT_BLINK_CYCLES);
        } else {
            warn!("boot: config invalid, running defaults");
            led.borrow_mut().set(LedMode::Blink, LedColor::Red);
        }

        let console = Console::new(Rc::clone(&door), Rc::clone(&led));

        Self {
            cfg,
            scheduler: Scheduler::new(),
            devices,
            door,
            led,
            console,
            store,
            last_minute: 0xFFFF,
            last_etag: 0,
            in_config_mode: false,
            debounce_active: false,
            debounce_start_ms: 0,
        }
    }

    // ── Accessors (console-free observation for tests and main) ──

    pub fn config(&self) -> Rc<RefCell<Config>> {
        Rc::clone(&self.cfg)
    }

    pub fn door(&self) -> Rc<RefCell<DoorDevice>> {
        Rc::clone(&self.door)
    }

    pub fn led(&self) -> Rc<RefCell<LedMachine>> {
        Rc::clone(&self.led)
    }

    pub fn devices_mut(&mut self) -> &mut DeviceRegistry {
        &mut self.devices
    }

    pub fn scheduler_mut(&mut self) -> &mut Scheduler {
        &mut self.scheduler
    }

    // ── The loop body ─────────────────────────────────────────

    /// Run one iteration of the control loop.
    pub fn iterate(&mut self, p: &mut impl Platform) -> LoopStep {
        let now_ms = p.now_ms();
        self.devices.tick_all(now_ms);

        self.service_config_switch(p);
        if self.in_config_mode {
            self.console.poll(
                p,
                &self.cfg,
                &mut self.scheduler,
                &mut self.devices,
                self.store.as_mut(),
            );
        }

        self.service_door_switch(p, now_ms);

        // Scheduling requires wall time.
        if !p.time_is_set() {
            self.led.borrow_mut().set(LedMode::Blink, LedColor::Red);
            return LoopStep::RtcInvalid;
        }
        let Some(now) = p.get_time() else {
            // Bus transient; retry next pass.
            return LoopStep::RtcInvalid;
        };

        let now_minute = now.minute_of_day();
        let cur_etag = self.scheduler.etag();
        let minute_changed = now_minute != self.last_minute;
        let schedule_dirty = cur_etag != self.last_etag;

        if minute_changed || schedule_dirty {
            self.last_minute = now_minute;
            self.last_etag = cur_etag;
            self.evaluate_schedule(&now, now_minute);
        }

        // ── Sleep gate ────────────────────────────────────────
        if self.in_config_mode {
            return LoopStep::ConfigMode;
        }
        if self.devices.any_busy() || self.debounce_active || p.door_event_pending() {
            return LoopStep::Awake;
        }

        let wake_minute = match self.scheduler.next_event_minute(&self.cfg.borrow().events) {
            Some(m) => strictly_future_minute(now_minute, m),
            None => next_minute(now_minute),
        };

        if !p.alarm_set_minute_of_day(wake_minute) {
            // Could not arm: stay awake rather than sleep unwakeable.
            return LoopStep::Awake;
        }
        info!("sleep until {:02}:{:02}", wake_minute / 60, wake_minute % 60);
        p.enter_deep_sleep();

        // Deterministic re-arm: clear what fired, unmask only de-asserted
        // level-triggered sources.
        if p.rtc_int_asserted() {
            p.alarm_clear_flag();
        }
        p.clear_wake_flags();
        if !p.rtc_int_asserted() {
            p.enable_rtc_interrupt();
        }
        if !p.door_switch_asserted() {
            p.enable_door_interrupt();
        }

        LoopStep::Slept { wake_minute }
    }

    /// CONFIG slide switch with a stable-change confirmation delay.
    fn service_config_switch(&mut self, p: &mut impl Platform) {
        let raw = p.config_switch_on();
        if raw == self.in_config_mode {
            return;
        }

        p.delay_ms(CONFIG_SW_CONFIRM_MS);
        if p.config_switch_on() != raw {
            return; // bounce
        }

        self.in_config_mode = raw;
        if raw {
            info!("entering CONFIG mode");
            self.console.begin(p);
        } else {
            info!("entering RUN mode");
            self.console.end(p);
        }
    }

    /// Door switch: ISR latch → debounce window → toggle on confirmed
    /// assertion → re-enable the interrupt once the line is released.
    fn service_door_switch(&mut self, p: &mut impl Platform, now_ms: u32) {
        if !self.debounce_active && p.door_event_pending() {
            let _ = p.take_door_event();
            self.debounce_active = true;
            self.debounce_start_ms = now_ms;
        }

        if self.debounce_active
            && now_ms.wrapping_sub(self.debounce_start_ms) >= DOOR_DEBOUNCE_MS
        {
            self.debounce_active = false;
            if p.door_switch_asserted() {
                self.door.borrow_mut().toggle();
            }
        }

        if !p.door_switch_asserted() && !self.debounce_active {
            p.enable_door_interrupt();
        }
    }

    /// Recompute the solar day on a date change, then reduce and apply.
    fn evaluate_schedule(&mut self, now: &timeutil::DateTime, now_minute: u16) {
        if !self.scheduler.is_day_current(now.year, now.month, now.day) {
            let sol = {
                let cfg = self.cfg.borrow();
                if cfg.has_location() {
                    // Scheduling must be DST-invariant: anchors are
                    // requested in UTC, full stop.
                    solar::solar_compute(
                        now.year,
                        now.month,
                        now.day,
                        cfg.latitude_deg(),
                        cfg.longitude_deg(),
                    )
                } else {
                    None
                }
            };
            self.scheduler.update_day(now.year, now.month, now.day, sol);
        }

        let today_midnight = timeutil::midnight_epoch(now.year, now.month, now.day);
        let rs = {
            let cfg = self.cfg.borrow();
            if cfg.events.is_empty() {
                return;
            }
            reduce(&cfg.events, self.scheduler.solar(), now_minute, today_midnight)
        };
        apply(&rs, &mut self.devices);
    }
}

// ── Minute helpers ────────────────────────────────────────────

fn next_minute(now: u16) -> u16 {
    (now + 1) % 1440
}

/// Guarantee a strictly-future wake minute; a target at or before `now`
/// wraps to the next minute.
fn strictly_future_minute(now: u16, target: u16) -> u16 {
    if target <= now {
        next_minute(now)
    } else {
        target
    }
}
