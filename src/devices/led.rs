//! Bi-color status LED state machine.
//!
//! Non-blocking at the state-machine level. A software-PWM carrier is
//! driven by repeated `carrier_tick()` calls into the LED hardware layer;
//! the pulse envelope steps through a perceptual brightness table so the
//! breathing looks linear to the eye rather than to the voltmeter.
//!
//! | Mode  | Behaviour                                   |
//! |-------|---------------------------------------------|
//! | Off   | dark                                        |
//! | On    | steady, full duty                           |
//! | Blink | square wave, 250 ms on / 250 ms off         |
//! | Pulse | triangle over the LUT, 2.8 s period         |
//!
//! Blink and Pulse may run a finite number of cycles (`count > 0`) and then
//! auto-return to Off; `count = 0` means run until re-commanded. A blink
//! cycle completes on the ON→OFF edge, a pulse cycle at the bottom of the
//! triangle.

use std::cell::RefCell;
use std::rc::Rc;

use crate::app::ports::LedHw;
use crate::devices::{DevState, Device, DeviceId};

/// Blink half-period: 250 ms on, 250 ms off.
const BLINK_PERIOD_MS: u32 = 250;
/// Full pulse (breathe) period.
const PULSE_PERIOD_MS: u32 = 2800;
/// Software-PWM carrier rate.
const PWM_TICKS_PER_MS: u32 = 128;

/// Presentation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedMode {
    Off,
    On,
    Blink,
    Pulse,
}

/// Channel selection; the driver's current direction picks the die.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedColor {
    Red,
    Green,
}

// Perceptual breathing envelopes. The two dies have different forward
// voltages, so each gets its own table.
static PULSE_LUT_GREEN: [u8; 48] = [
    1, 1, 2, 3, 5, 8, 12, 17, //
    23, 30, 38, 47, 57, 68, 80, 93, //
    107, 122, 138, 155, 173, 192, 212, 233, 255, //
    233, 212, 192, 173, 155, 138, 122, 107, //
    93, 80, 68, 57, 47, 38, 30, 23, //
    17, 12, 8, 5, 3, 2, 1,
];

static PULSE_LUT_RED: [u8; 47] = [
    1, 2, 4, 7, 11, 16, 22, 29, //
    37, 46, 56, 67, 79, 92, 106, 121, //
    137, 154, 172, 191, 211, 232, 248, 255, //
    248, 232, 211, 191, 172, 154, 137, 121, //
    106, 92, 79, 67, 56, 46, 37, 29, //
    22, 16, 11, 7, 4, 2, 1,
];

/// The LED state machine. Owned behind an `Rc<RefCell<_>>` handle shared
/// by the registered LED device and the door machine, which publishes
/// motion indication through it.
pub struct LedMachine {
    mode: LedMode,
    color: LedColor,

    /// 0 = infinite.
    cycles_remaining: u16,
    cycle_counter: u16,

    blink_t0_ms: u32,
    led_on: bool,

    // Pulse timing, in carrier ticks.
    pulse_last_ticks: u32,
    pulse_step: i32,
    pulse_dir: i32,
    pulse_err: u32,
    pwm_ticks: u32,
    pwm_last_ms: u32,

    hw: Box<dyn LedHw>,
}

impl LedMachine {
    pub fn new(hw: Box<dyn LedHw>) -> Self {
        Self {
            mode: LedMode::Off,
            color: LedColor::Green,
            cycles_remaining: 0,
            cycle_counter: 0,
            blink_t0_ms: 0,
            led_on: false,
            pulse_last_ticks: 0,
            pulse_step: 0,
            pulse_dir: -1,
            pulse_err: 0,
            pwm_ticks: 0,
            pwm_last_ms: 0,
            hw,
        }
    }

    pub fn init(&mut self) {
        self.mode = LedMode::Off;
        self.color = LedColor::Green;
        self.cycles_remaining = 0;
        self.cycle_counter = 0;
        self.blink_t0_ms = 0;
        self.led_on = false;
        self.pulse_last_ticks = 0;
        self.pulse_step = 0;
        self.pulse_err = 0;
        self.pwm_ticks = 0;
        self.hw.led_off();
    }

    /// Set mode and color, running until re-commanded.
    pub fn set(&mut self, mode: LedMode, color: LedColor) {
        self.set_cycles(mode, color, 0);
    }

    /// Set mode and color with a finite cycle count (0 = infinite).
    pub fn set_cycles(&mut self, mode: LedMode, color: LedColor, count: u16) {
        self.mode = mode;
        self.color = color;
        self.cycles_remaining = count;
        self.cycle_counter = 0;

        self.blink_t0_ms = 0;
        self.led_on = false;

        self.pulse_last_ticks = 0;
        self.pulse_step = 0;
        self.pulse_err = 0;
        self.pulse_dir = -1;

        match mode {
            LedMode::Off => self.hw.led_off(),
            LedMode::On => {
                self.led_on = true;
                self.apply(true, 255);
            }
            LedMode::Pulse => {
                // Start at the peak and decay.
                self.led_on = true;
                self.pulse_step = self.lut().len() as i32 - 1;
                self.pulse_last_ticks = self.pwm_ticks;
            }
            LedMode::Blink => {}
        }
    }

    pub fn mode(&self) -> LedMode {
        self.mode
    }

    pub fn is_on(&self) -> bool {
        self.led_on
    }

    /// Service the machine. Call every loop iteration.
    pub fn tick(&mut self, now_ms: u32) {
        self.pwm_service(now_ms);

        match self.mode {
            LedMode::Off => {
                self.led_on = false;
                self.apply(false, 0);
            }

            LedMode::On => {
                self.led_on = true;
                self.apply(true, 255);
            }

            LedMode::Blink => {
                if self.blink_t0_ms == 0 {
                    self.blink_t0_ms = now_ms;
                }

                if now_ms.wrapping_sub(self.blink_t0_ms) >= BLINK_PERIOD_MS {
                    self.led_on = !self.led_on;
                    self.blink_t0_ms = now_ms;

                    // Full cycle counted on the falling (ON→OFF) edge.
                    if !self.led_on && self.finish_cycle() {
                        return;
                    }
                }

                let on = self.led_on;
                self.apply(on, 255);
            }

            LedMode::Pulse => self.tick_pulse(),
        }
    }

    // ── Internals ─────────────────────────────────────────────

    /// Advance the software-PWM carrier by the elapsed wall time. Bounded
    /// so a long stall (blocking lock pulse, deep sleep) cannot make the
    /// loop spin for thousands of carrier ticks.
    fn pwm_service(&mut self, now_ms: u32) {
        let elapsed = now_ms.wrapping_sub(self.pwm_last_ms);
        if elapsed == 0 {
            return;
        }
        self.pwm_last_ms = now_ms;

        let ticks = (elapsed * PWM_TICKS_PER_MS).min(10 * PWM_TICKS_PER_MS);
        for _ in 0..ticks {
            self.hw.carrier_tick();
            self.pwm_ticks = self.pwm_ticks.wrapping_add(1);
        }
    }

    fn lut(&self) -> &'static [u8] {
        match self.color {
            LedColor::Green => &PULSE_LUT_GREEN,
            LedColor::Red => &PULSE_LUT_RED,
        }
    }

    fn tick_pulse(&mut self) {
        let lut = self.lut();
        let steps = lut.len() as u32;

        let period_ticks = PULSE_PERIOD_MS * PWM_TICKS_PER_MS;
        let base_step_ticks = period_ticks / steps;
        let rem_step_ticks = period_ticks % steps;

        if self.pulse_last_ticks == 0 {
            self.pulse_last_ticks = self.pwm_ticks;
            self.pulse_step = 0;
            self.pulse_err = 0;
            self.pulse_dir = 1;
        }

        loop {
            let elapsed = self.pwm_ticks.wrapping_sub(self.pulse_last_ticks);

            // Distribute the period remainder across steps so a full
            // triangle is exactly one period.
            let mut step_ticks = base_step_ticks;
            self.pulse_err += rem_step_ticks;
            if self.pulse_err >= steps {
                self.pulse_err -= steps;
                step_ticks += 1;
            }

            if elapsed < step_ticks {
                break;
            }

            self.pulse_last_ticks = self.pulse_last_ticks.wrapping_add(step_ticks);
            self.pulse_step += self.pulse_dir;

            // Bounce at the ends instead of wrapping.
            if self.pulse_step == 0 || self.pulse_step == steps as i32 - 1 {
                self.pulse_dir = -self.pulse_dir;

                // Full cycle counted at the bottom of the triangle.
                if self.pulse_step == 0 && self.finish_cycle() {
                    return;
                }
            }
        }

        self.led_on = true;
        let duty = lut[self.pulse_step as usize];
        self.apply(true, duty);
    }

    /// Count a completed cycle; returns true when the finite budget is
    /// exhausted and the machine has switched itself off.
    fn finish_cycle(&mut self) -> bool {
        if self.cycles_remaining == 0 {
            return false;
        }
        self.cycle_counter += 1;
        if self.cycle_counter >= self.cycles_remaining {
            self.mode = LedMode::Off;
            self.led_on = false;
            self.hw.led_off();
            return true;
        }
        false
    }

    fn apply(&mut self, on: bool, duty: u8) {
        if !on {
            self.hw.led_off();
            return;
        }
        match self.color {
            LedColor::Green => self.hw.led_green_pwm(duty),
            LedColor::Red => self.hw.led_red_pwm(duty),
        }
    }
}

// ---------------------------------------------------------------------------
// Device adapter
// ---------------------------------------------------------------------------

/// Registered LED device. Manual/scheduled commands map to steady on/off;
/// the richer modes are commanded by the door machine and the console
/// through the shared machine handle.
pub struct LedDevice {
    sm: Rc<RefCell<LedMachine>>,
}

impl LedDevice {
    pub fn new(sm: Rc<RefCell<LedMachine>>) -> Self {
        Self { sm }
    }
}

impl Device for LedDevice {
    fn id(&self) -> DeviceId {
        DeviceId::Led
    }

    fn name(&self) -> &'static str {
        "led"
    }

    fn init(&mut self) {
        self.sm.borrow_mut().init();
    }

    fn state(&self) -> DevState {
        if self.sm.borrow().is_on() {
            DevState::On
        } else {
            DevState::Off
        }
    }

    fn set_state(&mut self, state: DevState) {
        let mut sm = self.sm.borrow_mut();
        let color = sm.color;
        match state {
            DevState::On => sm.set(LedMode::On, color),
            DevState::Off => sm.set(LedMode::Off, color),
            DevState::Unknown => {}
        }
    }

    fn state_string(&self, state: DevState) -> &'static str {
        match state {
            DevState::On => "ON",
            DevState::Off => "OFF",
            DevState::Unknown => "UNKNOWN",
        }
    }

    fn tick(&mut self, now_ms: u32) {
        self.sm.borrow_mut().tick(now_ms);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Records the most recent output and counts carrier ticks.
    #[derive(Default)]
    pub(crate) struct MockLedHw {
        pub last: Rc<RefCell<Option<(LedColor, u8)>>>,
        pub carrier: Rc<RefCell<u64>>,
    }

    impl LedHw for MockLedHw {
        fn led_off(&mut self) {
            *self.last.borrow_mut() = None;
        }
        fn led_red_pwm(&mut self, duty: u8) {
            *self.last.borrow_mut() = Some((LedColor::Red, duty));
        }
        fn led_green_pwm(&mut self, duty: u8) {
            *self.last.borrow_mut() = Some((LedColor::Green, duty));
        }
        fn carrier_tick(&mut self) {
            *self.carrier.borrow_mut() += 1;
        }
    }

    fn machine() -> (LedMachine, Rc<RefCell<Option<(LedColor, u8)>>>) {
        let hw = MockLedHw::default();
        let last = Rc::clone(&hw.last);
        (LedMachine::new(Box::new(hw)), last)
    }

    #[test]
    fn steady_on_full_duty() {
        let (mut sm, last) = machine();
        sm.init();
        sm.set(LedMode::On, LedColor::Red);
        sm.tick(10);
        assert_eq!(*last.borrow(), Some((LedColor::Red, 255)));
    }

    #[test]
    fn off_goes_dark() {
        let (mut sm, last) = machine();
        sm.init();
        sm.set(LedMode::On, LedColor::Green);
        sm.tick(5);
        sm.set(LedMode::Off, LedColor::Green);
        sm.tick(10);
        assert_eq!(*last.borrow(), None);
        assert!(!sm.is_on());
    }

    #[test]
    fn blink_square_wave() {
        let (mut sm, _) = machine();
        sm.init();
        sm.set(LedMode::Blink, LedColor::Red);

        sm.tick(1); // arms t0
        assert!(!sm.is_on());
        sm.tick(1 + 250);
        assert!(sm.is_on());
        sm.tick(1 + 500);
        assert!(!sm.is_on());
        sm.tick(1 + 750);
        assert!(sm.is_on());
    }

    #[test]
    fn finite_blink_auto_returns_to_off() {
        let (mut sm, _) = machine();
        sm.init();
        sm.set_cycles(LedMode::Blink, LedColor::Green, 2);

        // Each cycle is one ON half plus one OFF half; walk enough edges.
        let mut t = 1;
        for _ in 0..12 {
            sm.tick(t);
            t += 250;
        }
        assert_eq!(sm.mode(), LedMode::Off);
        assert!(!sm.is_on());
    }

    #[test]
    fn pulse_walks_the_lut() {
        let (mut sm, last) = machine();
        sm.init();
        sm.set(LedMode::Pulse, LedColor::Green);

        let mut duties = Vec::new();
        let mut t = 1;
        // One full period of wall time in 10 ms slices (carrier clamp keeps
        // each slice within the service bound).
        for _ in 0..(PULSE_PERIOD_MS / 10) {
            sm.tick(t);
            if let Some((color, duty)) = *last.borrow() {
                assert_eq!(color, LedColor::Green);
                duties.push(duty);
            }
            t += 10;
        }

        let peak = duties.iter().copied().max().unwrap();
        let floor = duties.iter().copied().min().unwrap();
        assert_eq!(peak, 255);
        assert!(floor <= 2, "floor {floor}");
    }

    #[test]
    fn finite_pulse_auto_returns_to_off() {
        let (mut sm, _) = machine();
        sm.init();
        sm.set_cycles(LedMode::Pulse, LedColor::Red, 1);

        let mut t = 1;
        // A counted cycle is a full out-and-back over the table (two
        // periods); give it three to complete.
        for _ in 0..(3 * PULSE_PERIOD_MS / 10) {
            sm.tick(t);
            t += 10;
            if sm.mode() == LedMode::Off {
                break;
            }
        }
        assert_eq!(sm.mode(), LedMode::Off);
    }

    #[test]
    fn carrier_is_rate_limited() {
        let hw = MockLedHw::default();
        let carrier = Rc::clone(&hw.carrier);
        let mut sm = LedMachine::new(Box::new(hw));
        sm.init();
        sm.set(LedMode::On, LedColor::Green);

        // A huge stall advances at most 10 ms worth of carrier.
        sm.tick(1);
        let before = *carrier.borrow();
        sm.tick(100_000);
        let after = *carrier.borrow();
        assert!(after - before <= u64::from(10 * PWM_TICKS_PER_MS));
    }

    #[test]
    fn device_adapter_steady_commands() {
        let (sm, last) = machine();
        let sm = Rc::new(RefCell::new(sm));
        let mut dev = LedDevice::new(Rc::clone(&sm));
        dev.init();

        dev.set_state(DevState::On);
        dev.tick(10);
        assert_eq!(dev.state(), DevState::On);
        assert!(last.borrow().is_some());

        dev.set_state(DevState::Off);
        dev.tick(20);
        assert_eq!(dev.state(), DevState::Off);
    }
}
