//! Deterministic host simulation of the whole platform.
//!
//! One shared [`SimClock`] is the single time authority: the uptime port
//! reads it, blocking delays advance it, the simulated RTC derives wall
//! time from it, and deep sleep fast-forwards it to the armed alarm
//! minute. Integration tests drive the control loop against this and
//! assert on the recorded actuator traffic, the same way the firmware's
//! bring-up console was exercised against the host build of the original
//! hardware.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::app::ports::{
    ConfigSwitchPort, ConfigStore, ConsoleIo, DelayMs, DoorHw, EpochSource, LedHw, LockHw,
    RelayHw, RtcPort, SleepPort, UptimePort,
};
use crate::timeutil::{self, DateTime};

// ───────────────────────────────────────────────────────────────
// Clock
// ───────────────────────────────────────────────────────────────

/// Simulated monotonic clock, milliseconds since boot.
#[derive(Debug, Default)]
pub struct SimClock {
    ms: u64,
}

impl SimClock {
    pub fn advance(&mut self, ms: u64) {
        self.ms += ms;
    }

    pub fn now_ms(&self) -> u32 {
        self.ms as u32
    }
}

/// Delay provider that advances the shared clock instead of sleeping.
pub struct SimDelay {
    clock: Rc<RefCell<SimClock>>,
}

impl SimDelay {
    pub fn new(clock: Rc<RefCell<SimClock>>) -> Self {
        Self { clock }
    }
}

impl DelayMs for SimDelay {
    fn delay_ms(&mut self, ms: u32) {
        self.clock.borrow_mut().advance(u64::from(ms));
    }
}

// ───────────────────────────────────────────────────────────────
// RTC
// ───────────────────────────────────────────────────────────────

/// Simulated RTC: wall time is an epoch base plus elapsed sim time.
pub struct SimRtc {
    clock: Rc<RefCell<SimClock>>,
    valid: bool,
    base_epoch: u32,
    base_ms: u64,
    alarm_minute: Option<u16>,
    alarm_flag: bool,
}

impl SimRtc {
    pub fn new(clock: Rc<RefCell<SimClock>>) -> Self {
        Self { clock, valid: false, base_epoch: 0, base_ms: 0, alarm_minute: None, alarm_flag: false }
    }

    pub fn epoch(&self) -> u32 {
        let elapsed_s = (self.clock.borrow().ms - self.base_ms) / 1000;
        self.base_epoch + elapsed_s as u32
    }

    pub fn alarm_minute(&self) -> Option<u16> {
        self.alarm_minute
    }

    pub fn raise_alarm(&mut self) {
        self.alarm_flag = true;
    }

    pub fn alarm_flag(&self) -> bool {
        self.alarm_flag
    }
}

impl RtcPort for SimRtc {
    fn time_is_set(&mut self) -> bool {
        self.valid
    }

    fn get_time(&mut self) -> Option<DateTime> {
        Some(timeutil::ymdhms_from_epoch(self.epoch()))
    }

    fn set_time(&mut self, t: &DateTime) -> bool {
        self.base_epoch = timeutil::epoch_from_ymdhms(t.year, t.month, t.day, t.hour, t.minute, t.second);
        self.base_ms = self.clock.borrow().ms;
        self.valid = true;
        true
    }

    fn alarm_set_minute_of_day(&mut self, minute: u16) -> bool {
        if minute >= 1440 {
            return false;
        }
        self.alarm_flag = false;
        self.alarm_minute = Some(minute);
        true
    }

    fn alarm_disable(&mut self) {
        self.alarm_minute = None;
    }

    fn alarm_clear_flag(&mut self) {
        self.alarm_flag = false;
    }
}

impl EpochSource for SimRtc {
    fn current_epoch(&mut self) -> u32 {
        if self.valid {
            self.epoch()
        } else {
            0
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Recording actuator hardware
// ───────────────────────────────────────────────────────────────

/// One shared call log so a test can assert on cross-device ordering.
pub type CallLog = Rc<RefCell<Vec<String>>>;

pub struct RecDoorHw {
    log: CallLog,
    pub energized: Rc<RefCell<bool>>,
}

impl RecDoorHw {
    pub fn new(log: CallLog) -> Self {
        Self { log, energized: Rc::new(RefCell::new(false)) }
    }
}

impl DoorHw for RecDoorHw {
    fn set_open_dir(&mut self) {
        self.log.borrow_mut().push("door.open_dir".into());
    }
    fn set_close_dir(&mut self) {
        self.log.borrow_mut().push("door.close_dir".into());
    }
    fn enable(&mut self) {
        *self.energized.borrow_mut() = true;
        self.log.borrow_mut().push("door.enable".into());
    }
    fn stop(&mut self) {
        *self.energized.borrow_mut() = false;
        self.log.borrow_mut().push("door.stop".into());
    }
}

pub struct RecLockHw {
    log: CallLog,
    pub energized: Rc<RefCell<bool>>,
}

impl RecLockHw {
    pub fn new(log: CallLog) -> Self {
        Self { log, energized: Rc::new(RefCell::new(false)) }
    }
}

impl LockHw for RecLockHw {
    fn set_engage_dir(&mut self) {
        self.log.borrow_mut().push("lock.engage_dir".into());
    }
    fn set_release_dir(&mut self) {
        self.log.borrow_mut().push("lock.release_dir".into());
    }
    fn enable(&mut self) {
        *self.energized.borrow_mut() = true;
        self.log.borrow_mut().push("lock.enable".into());
    }
    fn stop(&mut self) {
        *self.energized.borrow_mut() = false;
        self.log.borrow_mut().push("lock.stop".into());
    }
}

pub struct RecRelayHw {
    name: &'static str,
    log: CallLog,
}

impl RecRelayHw {
    pub fn new(name: &'static str, log: CallLog) -> Self {
        Self { name, log }
    }
}

impl RelayHw for RecRelayHw {
    fn pulse_set(&mut self) {
        self.log.borrow_mut().push(format!("{}.set", self.name));
    }
    fn pulse_reset(&mut self) {
        self.log.borrow_mut().push(format!("{}.reset", self.name));
    }
}

/// LED output sink that keeps only the latest value; the carrier is
/// counted, not logged, because it ticks thousands of times per second.
#[derive(Default)]
pub struct RecLedHw {
    pub last: Rc<RefCell<Option<(&'static str, u8)>>>,
}

impl LedHw for RecLedHw {
    fn led_off(&mut self) {
        *self.last.borrow_mut() = None;
    }
    fn led_red_pwm(&mut self, duty: u8) {
        *self.last.borrow_mut() = Some(("red", duty));
    }
    fn led_green_pwm(&mut self, duty: u8) {
        *self.last.borrow_mut() = Some(("green", duty));
    }
    fn carrier_tick(&mut self) {}
}

// ───────────────────────────────────────────────────────────────
// Config store
// ───────────────────────────────────────────────────────────────

/// RAM-backed blob store.
#[derive(Default)]
pub struct SimStore {
    pub blob: Rc<RefCell<Option<Vec<u8>>>>,
}

impl ConfigStore for SimStore {
    fn load_blob(&mut self, buf: &mut [u8]) -> Option<usize> {
        let blob = self.blob.borrow();
        let blob = blob.as_ref()?;
        let n = blob.len().min(buf.len());
        buf[..n].copy_from_slice(&blob[..n]);
        Some(n)
    }

    fn save_blob(&mut self, blob: &[u8]) -> bool {
        *self.blob.borrow_mut() = Some(blob.to_vec());
        true
    }
}

// ───────────────────────────────────────────────────────────────
// Platform
// ───────────────────────────────────────────────────────────────

/// The complete simulated platform handed to `CoopService::iterate`.
pub struct SimPlatform {
    pub clock: Rc<RefCell<SimClock>>,
    pub rtc: Rc<RefCell<SimRtc>>,

    pub config_switch: bool,
    /// Door switch line level; true = pressed (asserted).
    pub door_switch: bool,
    /// ISR latch, set by [`press_door_switch`](Self::press_door_switch).
    pub door_event: bool,
    pub door_int_enabled: bool,
    pub rtc_int_enabled: bool,

    pub console_in: VecDeque<u8>,
    pub console_out: String,

    /// Wake minutes of every deep sleep taken.
    pub sleeps: Vec<u16>,
}

impl SimPlatform {
    pub fn new() -> Self {
        let clock = Rc::new(RefCell::new(SimClock::default()));
        let rtc = Rc::new(RefCell::new(SimRtc::new(Rc::clone(&clock))));
        Self {
            clock,
            rtc,
            config_switch: false,
            door_switch: false,
            door_event: false,
            door_int_enabled: true,
            rtc_int_enabled: true,
            console_in: VecDeque::new(),
            console_out: String::new(),
            sleeps: Vec::new(),
        }
    }

    /// Set the RTC to a UTC wall time and mark it valid.
    pub fn set_wall_time(&mut self, year: i32, month: u8, day: u8, hour: u8, minute: u8, second: u8) {
        self.rtc
            .borrow_mut()
            .set_time(&DateTime { year, month, day, hour, minute, second });
    }

    /// Simulate the door switch being pressed: line asserts, ISR latches
    /// the event and masks itself.
    pub fn press_door_switch(&mut self) {
        self.door_switch = true;
        if self.door_int_enabled {
            self.door_int_enabled = false;
            self.door_event = true;
        }
    }

    pub fn release_door_switch(&mut self) {
        self.door_switch = false;
    }

    /// Feed a console line (terminator appended).
    pub fn type_line(&mut self, line: &str) {
        self.console_in.extend(line.bytes());
        self.console_in.push_back(b'\r');
    }

    pub fn advance_ms(&mut self, ms: u64) {
        self.clock.borrow_mut().advance(ms);
    }
}

impl Default for SimPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl UptimePort for SimPlatform {
    fn now_ms(&mut self) -> u32 {
        self.clock.borrow().now_ms()
    }
}

impl DelayMs for SimPlatform {
    fn delay_ms(&mut self, ms: u32) {
        self.clock.borrow_mut().advance(u64::from(ms));
    }
}

impl ConfigSwitchPort for SimPlatform {
    fn config_switch_on(&mut self) -> bool {
        self.config_switch
    }
}

impl ConsoleIo for SimPlatform {
    fn read_byte(&mut self) -> Option<u8> {
        self.console_in.pop_front()
    }

    fn write(&mut self, s: &str) {
        self.console_out.push_str(s);
    }
}

impl RtcPort for SimPlatform {
    fn time_is_set(&mut self) -> bool {
        self.rtc.borrow_mut().time_is_set()
    }

    fn get_time(&mut self) -> Option<DateTime> {
        self.rtc.borrow_mut().get_time()
    }

    fn set_time(&mut self, t: &DateTime) -> bool {
        self.rtc.borrow_mut().set_time(t)
    }

    fn alarm_set_minute_of_day(&mut self, minute: u16) -> bool {
        self.rtc.borrow_mut().alarm_set_minute_of_day(minute)
    }

    fn alarm_disable(&mut self) {
        self.rtc.borrow_mut().alarm_disable();
    }

    fn alarm_clear_flag(&mut self) {
        self.rtc.borrow_mut().alarm_clear_flag();
    }
}

impl SleepPort for SimPlatform {
    /// Fast-forward the shared clock to the top of the armed alarm minute
    /// and raise the RTC interrupt, exactly what the hardware wake looks
    /// like. With no alarm armed the sleep lasts to the next minute.
    fn enter_deep_sleep(&mut self) {
        let (alarm, epoch, subsec_ms) = {
            let rtc = self.rtc.borrow();
            let elapsed_ms = self.clock.borrow().ms - rtc.base_ms;
            (rtc.alarm_minute(), rtc.epoch(), elapsed_ms % 1000)
        };

        let target = alarm.unwrap_or(((epoch / 60 % 1440) as u16 + 1) % 1440);
        let day_start = epoch - epoch % 86_400;
        let mut target_epoch = day_start + u32::from(target) * 60;
        if target_epoch <= epoch {
            target_epoch += 86_400;
        }

        let advance = u64::from(target_epoch - epoch) * 1000 - subsec_ms;
        self.clock.borrow_mut().advance(advance);
        self.rtc.borrow_mut().raise_alarm();
        self.sleeps.push(target);
    }

    fn rtc_int_asserted(&mut self) -> bool {
        self.rtc.borrow().alarm_flag()
    }

    fn door_switch_asserted(&mut self) -> bool {
        self.door_switch
    }

    fn take_door_event(&mut self) -> bool {
        let pending = self.door_event;
        self.door_event = false;
        pending
    }

    fn door_event_pending(&mut self) -> bool {
        self.door_event
    }

    fn clear_wake_flags(&mut self) {}

    fn enable_rtc_interrupt(&mut self) {
        self.rtc_int_enabled = true;
    }

    fn enable_door_interrupt(&mut self) {
        self.door_int_enabled = true;
    }
}
