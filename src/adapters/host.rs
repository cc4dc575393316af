//! Host-binary adapters.
//!
//! The controller has always had a host build for bring-up: same control
//! core, console on stdin/stdout, wall time from the system clock, config
//! in a file, actuators logged instead of driven. The host platform keeps
//! the configuration switch asserted so the console is immediately
//! interactive.

use std::cell::RefCell;
use std::fs;
use std::io::{BufRead, Write as _};
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::mpsc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use log::info;

use crate::app::ports::{
    ConfigSwitchPort, ConfigStore, ConsoleIo, DelayMs, DoorHw, EpochSource, LedHw, LockHw,
    RelayHw, RtcPort, SleepPort, UptimePort,
};
use crate::timeutil::{self, DateTime};

/// Seconds between the Unix epoch and 2000-01-01 00:00:00 UTC.
const UNIX_EPOCH_OFFSET_2000: u64 = 946_684_800;

// ───────────────────────────────────────────────────────────────
// RTC over the system clock
// ───────────────────────────────────────────────────────────────

/// Wall clock derived from system time, with a settable offset so the
/// console's `set time` behaves like writing a real RTC.
pub struct HostRtc {
    offset_s: i64,
    alarm_minute: Option<u16>,
    alarm_flag: bool,
}

impl HostRtc {
    pub fn new() -> Self {
        Self { offset_s: 0, alarm_minute: None, alarm_flag: false }
    }

    fn epoch(&self) -> u32 {
        let unix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(UNIX_EPOCH_OFFSET_2000);
        let base = unix.saturating_sub(UNIX_EPOCH_OFFSET_2000) as i64;
        base.saturating_add(self.offset_s).max(0) as u32
    }
}

impl Default for HostRtc {
    fn default() -> Self {
        Self::new()
    }
}

impl RtcPort for HostRtc {
    fn time_is_set(&mut self) -> bool {
        true
    }

    fn get_time(&mut self) -> Option<DateTime> {
        Some(timeutil::ymdhms_from_epoch(self.epoch()))
    }

    fn set_time(&mut self, t: &DateTime) -> bool {
        let want = timeutil::epoch_from_ymdhms(t.year, t.month, t.day, t.hour, t.minute, t.second);
        let now = self.epoch() as i64 - self.offset_s;
        self.offset_s = i64::from(want) - now;
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

impl EpochSource for HostRtc {
    fn current_epoch(&mut self) -> u32 {
        self.epoch()
    }
}

// ───────────────────────────────────────────────────────────────
// Platform
// ───────────────────────────────────────────────────────────────

pub struct HostPlatform {
    start: Instant,
    pub rtc: Rc<RefCell<HostRtc>>,
    stdin_rx: mpsc::Receiver<u8>,
}

impl HostPlatform {
    pub fn new(rtc: Rc<RefCell<HostRtc>>) -> Self {
        // Reader thread: blocking stdin on its own thread, bytes drained
        // non-blocking by the loop.
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let stdin = std::io::stdin();
            let mut lines = stdin.lock().lines();
            while let Some(Ok(line)) = lines.next() {
                for b in line.bytes() {
                    if tx.send(b).is_err() {
                        return;
                    }
                }
                if tx.send(b'\r').is_err() {
                    return;
                }
            }
        });

        Self { start: Instant::now(), rtc, stdin_rx: rx }
    }
}

impl UptimePort for HostPlatform {
    fn now_ms(&mut self) -> u32 {
        self.start.elapsed().as_millis() as u32
    }
}

impl DelayMs for HostPlatform {
    fn delay_ms(&mut self, ms: u32) {
        std::thread::sleep(Duration::from_millis(u64::from(ms)));
    }
}

impl ConfigSwitchPort for HostPlatform {
    fn config_switch_on(&mut self) -> bool {
        true // host build lives in the console
    }
}

impl ConsoleIo for HostPlatform {
    fn read_byte(&mut self) -> Option<u8> {
        self.stdin_rx.try_recv().ok()
    }

    fn write(&mut self, s: &str) {
        let mut out = std::io::stdout();
        let _ = out.write_all(s.as_bytes());
        let _ = out.flush();
    }
}

impl RtcPort for HostPlatform {
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

impl SleepPort for HostPlatform {
    /// "Deep sleep" on the host is a plain wait until the armed minute.
    fn enter_deep_sleep(&mut self) {
        let Some(target) = self.rtc.borrow().alarm_minute else {
            std::thread::sleep(Duration::from_secs(1));
            return;
        };
        let now = self.rtc.borrow_mut().minutes_since_midnight();
        let mut delta = i32::from(target) - i32::from(now);
        if delta <= 0 {
            delta += 1440;
        }
        std::thread::sleep(Duration::from_secs(u64::try_from(delta).unwrap() * 60));
        self.rtc.borrow_mut().alarm_flag = true;
    }

    fn rtc_int_asserted(&mut self) -> bool {
        self.rtc.borrow().alarm_flag
    }

    fn door_switch_asserted(&mut self) -> bool {
        false
    }

    fn take_door_event(&mut self) -> bool {
        false
    }

    fn door_event_pending(&mut self) -> bool {
        false
    }

    fn clear_wake_flags(&mut self) {}
    fn enable_rtc_interrupt(&mut self) {}
    fn enable_door_interrupt(&mut self) {}
}

// ───────────────────────────────────────────────────────────────
// Config store and logging actuators
// ───────────────────────────────────────────────────────────────

/// Blob persisted to a file; writes go through a temp file then rename so
/// a crash mid-save leaves the old blob intact.
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ConfigStore for FileConfigStore {
    fn load_blob(&mut self, buf: &mut [u8]) -> Option<usize> {
        let data = fs::read(&self.path).ok()?;
        let n = data.len().min(buf.len());
        buf[..n].copy_from_slice(&data[..n]);
        Some(n)
    }

    fn save_blob(&mut self, blob: &[u8]) -> bool {
        let tmp = self.path.with_extension("tmp");
        if fs::write(&tmp, blob).is_err() {
            return false;
        }
        fs::rename(&tmp, &self.path).is_ok()
    }
}

/// Actuators that narrate instead of driving hardware.
pub struct LogDoorHw;

impl DoorHw for LogDoorHw {
    fn set_open_dir(&mut self) {
        info!("door hw: direction OPEN");
    }
    fn set_close_dir(&mut self) {
        info!("door hw: direction CLOSE");
    }
    fn enable(&mut self) {
        info!("door hw: motor ON");
    }
    fn stop(&mut self) {
        info!("door hw: motor OFF");
    }
}

pub struct LogLockHw;

impl LockHw for LogLockHw {
    fn set_engage_dir(&mut self) {
        info!("lock hw: direction ENGAGE");
    }
    fn set_release_dir(&mut self) {
        info!("lock hw: direction RELEASE");
    }
    fn enable(&mut self) {
        info!("lock hw: coil ON");
    }
    fn stop(&mut self) {
        info!("lock hw: coil OFF");
    }
}

pub struct LogRelayHw(pub &'static str);

impl RelayHw for LogRelayHw {
    fn pulse_set(&mut self) {
        info!("{} hw: SET pulse", self.0);
    }
    fn pulse_reset(&mut self) {
        info!("{} hw: RESET pulse", self.0);
    }
}

/// The LED prints only level changes; the carrier is silent.
#[derive(Default)]
pub struct LogLedHw {
    last: Option<(&'static str, u8)>,
}

impl LedHw for LogLedHw {
    fn led_off(&mut self) {
        if self.last.is_some() {
            self.last = None;
            info!("led hw: off");
        }
    }
    fn led_red_pwm(&mut self, duty: u8) {
        if self.last != Some(("red", duty)) {
            self.last = Some(("red", duty));
        }
    }
    fn led_green_pwm(&mut self, duty: u8) {
        if self.last != Some(("green", duty)) {
            self.last = Some(("green", duty));
        }
    }
    fn carrier_tick(&mut self) {}
}

/// Blocking delay for the door's safety paths.
pub struct HostDelay;

impl DelayMs for HostDelay {
    fn delay_ms(&mut self, ms: u32) {
        std::thread::sleep(Duration::from_millis(u64::from(ms)));
    }
}
