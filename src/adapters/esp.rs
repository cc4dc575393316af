//! ESP-IDF hardware adapters.
//!
//! Raw `esp_idf_svc::sys` calls, rc-checked, one-shot init from `main()`
//! before the control loop starts. Everything in this module is gated to
//! the `espidf` target; the host build never compiles it.
//!
//! Wake wiring: the DS3231 INT line and the door switch are level
//! (active-low) GPIO wake sources. Their ISRs mask themselves and latch a
//! flag; the control loop clears flags and re-enables sources only while
//! the lines are de-asserted.

#![allow(clippy::missing_safety_doc)]

use core::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use esp_idf_svc::sys::*;
use log::{info, warn};

use crate::app::ports::{
    ConfigSwitchPort, ConsoleIo, DelayMs, DoorHw, LedHw, LockHw, RelayHw, SleepPort, UptimePort,
};
use crate::pins;

/// Latching relay coil pulse width.
const RELAY_COIL_PULSE_MS: u32 = 20;

/// ISR latch for the door switch. Written from interrupt context only
/// through [`door_switch_isr`]; consumed by the main loop.
static DOOR_EVENT: AtomicBool = AtomicBool::new(false);

// ───────────────────────────────────────────────────────────────
// GPIO primitives
// ───────────────────────────────────────────────────────────────

fn gpio_out(pin: i32, level: bool) {
    // SAFETY: pin numbers come from `pins` and were configured as outputs
    // during init; single-threaded main-loop access.
    let rc = unsafe { gpio_set_level(pin, u32::from(level)) };
    if rc != ESP_OK {
        warn!("gpio_set_level({pin}) rc={rc}");
    }
}

fn gpio_in(pin: i32) -> bool {
    // SAFETY: input pins configured during init.
    unsafe { gpio_get_level(pin) != 0 }
}

/// Configure every output low and every input with its pull. Called once
/// from `main()` before the loop starts.
pub fn init_gpio() -> bool {
    let outputs = [
        pins::DOOR_INA_GPIO,
        pins::DOOR_INB_GPIO,
        pins::DOOR_EN_GPIO,
        pins::LOCK_INA_GPIO,
        pins::LOCK_INB_GPIO,
        pins::LOCK_EN_GPIO,
        pins::RELAY1_SET_GPIO,
        pins::RELAY1_RESET_GPIO,
        pins::RELAY2_SET_GPIO,
        pins::RELAY2_RESET_GPIO,
        pins::LED_RED_GPIO,
        pins::LED_GREEN_GPIO,
    ];

    for pin in outputs {
        let cfg = gpio_config_t {
            pin_bit_mask: 1u64 << pin,
            mode: gpio_mode_t_GPIO_MODE_OUTPUT,
            pull_up_en: gpio_pullup_t_GPIO_PULLUP_DISABLE,
            pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_DISABLE,
            intr_type: gpio_int_type_t_GPIO_INTR_DISABLE,
        };
        // SAFETY: plain register configuration before the loop starts.
        if unsafe { gpio_config(&cfg) } != ESP_OK {
            return false;
        }
        gpio_out(pin, false);
    }

    let inputs = [
        // (pin, internal pull-up)
        (pins::RTC_INT_GPIO, false), // external pull-up on the open-drain line
        (pins::DOOR_SW_GPIO, true),
        (pins::CONFIG_SW_GPIO, true),
    ];

    for (pin, pull) in inputs {
        let cfg = gpio_config_t {
            pin_bit_mask: 1u64 << pin,
            mode: gpio_mode_t_GPIO_MODE_INPUT,
            pull_up_en: if pull {
                gpio_pullup_t_GPIO_PULLUP_ENABLE
            } else {
                gpio_pullup_t_GPIO_PULLUP_DISABLE
            },
            pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_DISABLE,
            intr_type: gpio_int_type_t_GPIO_INTR_DISABLE,
        };
        if unsafe { gpio_config(&cfg) } != ESP_OK {
            return false;
        }
    }

    info!("esp: gpio configured");
    true
}

/// Door switch ISR: mask the source, latch the event. Minimum work only;
/// all logic runs at main-loop priority.
///
/// # Safety
/// Registered on the door switch GPIO, falling edge, by `init_isr`.
unsafe extern "C" fn door_switch_isr(_arg: *mut core::ffi::c_void) {
    unsafe {
        gpio_intr_disable(pins::DOOR_SW_GPIO);
    }
    DOOR_EVENT.store(true, Ordering::Release);
}

pub fn init_isr() -> bool {
    // SAFETY: one-shot ISR service install plus handler registration.
    unsafe {
        if gpio_install_isr_service(0) != ESP_OK {
            return false;
        }
        if gpio_set_intr_type(pins::DOOR_SW_GPIO, gpio_int_type_t_GPIO_INTR_LOW_LEVEL) != ESP_OK {
            return false;
        }
        if gpio_isr_handler_add(pins::DOOR_SW_GPIO, Some(door_switch_isr), core::ptr::null_mut())
            != ESP_OK
        {
            return false;
        }
        gpio_intr_enable(pins::DOOR_SW_GPIO) == ESP_OK
    }
}

// ───────────────────────────────────────────────────────────────
// Port implementations
// ───────────────────────────────────────────────────────────────

pub struct EspDoorHw;

impl DoorHw for EspDoorHw {
    fn set_open_dir(&mut self) {
        gpio_out(pins::DOOR_INA_GPIO, true);
        gpio_out(pins::DOOR_INB_GPIO, false);
    }
    fn set_close_dir(&mut self) {
        gpio_out(pins::DOOR_INA_GPIO, false);
        gpio_out(pins::DOOR_INB_GPIO, true);
    }
    fn enable(&mut self) {
        gpio_out(pins::DOOR_EN_GPIO, true);
    }
    fn stop(&mut self) {
        // Power first, then neutralize direction.
        gpio_out(pins::DOOR_EN_GPIO, false);
        gpio_out(pins::DOOR_INA_GPIO, false);
        gpio_out(pins::DOOR_INB_GPIO, false);
    }
}

pub struct EspLockHw;

impl LockHw for EspLockHw {
    fn set_engage_dir(&mut self) {
        gpio_out(pins::LOCK_INA_GPIO, true);
        gpio_out(pins::LOCK_INB_GPIO, false);
    }
    fn set_release_dir(&mut self) {
        gpio_out(pins::LOCK_INA_GPIO, false);
        gpio_out(pins::LOCK_INB_GPIO, true);
    }
    fn enable(&mut self) {
        gpio_out(pins::LOCK_EN_GPIO, true);
    }
    fn stop(&mut self) {
        gpio_out(pins::LOCK_EN_GPIO, false);
        gpio_out(pins::LOCK_INA_GPIO, false);
        gpio_out(pins::LOCK_INB_GPIO, false);
    }
}

pub struct EspRelayHw {
    set_pin: i32,
    reset_pin: i32,
}

impl EspRelayHw {
    pub fn relay1() -> Self {
        Self { set_pin: pins::RELAY1_SET_GPIO, reset_pin: pins::RELAY1_RESET_GPIO }
    }

    pub fn relay2() -> Self {
        Self { set_pin: pins::RELAY2_SET_GPIO, reset_pin: pins::RELAY2_RESET_GPIO }
    }

    fn pulse(&self, pin: i32) {
        gpio_out(pin, true);
        std::thread::sleep(Duration::from_millis(u64::from(RELAY_COIL_PULSE_MS)));
        gpio_out(pin, false);
    }
}

impl RelayHw for EspRelayHw {
    fn pulse_set(&mut self) {
        self.pulse(self.set_pin);
    }
    fn pulse_reset(&mut self) {
        self.pulse(self.reset_pin);
    }
}

/// Software-PWM bi-color LED: the carrier tick compares a running phase
/// against the requested duty and drives the pair of direction pins.
pub struct EspLedHw {
    phase: u8,
    duty: u8,
    red: bool,
}

impl EspLedHw {
    pub fn new() -> Self {
        Self { phase: 0, duty: 0, red: false }
    }

    fn drive(&self, on: bool) {
        if !on {
            gpio_out(pins::LED_RED_GPIO, false);
            gpio_out(pins::LED_GREEN_GPIO, false);
        } else if self.red {
            gpio_out(pins::LED_RED_GPIO, true);
            gpio_out(pins::LED_GREEN_GPIO, false);
        } else {
            gpio_out(pins::LED_RED_GPIO, false);
            gpio_out(pins::LED_GREEN_GPIO, true);
        }
    }
}

impl Default for EspLedHw {
    fn default() -> Self {
        Self::new()
    }
}

impl LedHw for EspLedHw {
    fn led_off(&mut self) {
        self.duty = 0;
        self.drive(false);
    }

    fn led_red_pwm(&mut self, duty: u8) {
        self.red = true;
        self.duty = duty;
    }

    fn led_green_pwm(&mut self, duty: u8) {
        self.red = false;
        self.duty = duty;
    }

    fn carrier_tick(&mut self) {
        self.phase = self.phase.wrapping_add(1);
        self.drive(self.duty != 0 && self.phase <= self.duty);
    }
}

pub struct EspUptime;

impl UptimePort for EspUptime {
    fn now_ms(&mut self) -> u32 {
        // SAFETY: esp_timer is started by the runtime before main.
        (unsafe { esp_timer_get_time() } / 1000) as u32
    }
}

pub struct EspDelay;

impl DelayMs for EspDelay {
    fn delay_ms(&mut self, ms: u32) {
        std::thread::sleep(Duration::from_millis(u64::from(ms)));
    }
}

pub struct EspConfigSwitch;

impl ConfigSwitchPort for EspConfigSwitch {
    fn config_switch_on(&mut self) -> bool {
        // Active low.
        !gpio_in(pins::CONFIG_SW_GPIO)
    }
}

/// Light sleep keeps RAM and resumes the loop in place; both wake lines
/// are armed as low-level GPIO wake sources.
pub struct EspSleep;

impl SleepPort for EspSleep {
    fn enter_deep_sleep(&mut self) {
        // SAFETY: wake-source configuration followed by light sleep; the
        // call returns on wake.
        unsafe {
            gpio_wakeup_enable(pins::RTC_INT_GPIO, gpio_int_type_t_GPIO_INTR_LOW_LEVEL);
            gpio_wakeup_enable(pins::DOOR_SW_GPIO, gpio_int_type_t_GPIO_INTR_LOW_LEVEL);
            esp_sleep_enable_gpio_wakeup();
            esp_light_sleep_start();
        }
    }

    fn rtc_int_asserted(&mut self) -> bool {
        // Open-drain, active low.
        !gpio_in(pins::RTC_INT_GPIO)
    }

    fn door_switch_asserted(&mut self) -> bool {
        !gpio_in(pins::DOOR_SW_GPIO)
    }

    fn take_door_event(&mut self) -> bool {
        DOOR_EVENT.swap(false, Ordering::Acquire)
    }

    fn door_event_pending(&mut self) -> bool {
        DOOR_EVENT.load(Ordering::Acquire)
    }

    fn clear_wake_flags(&mut self) {}

    fn enable_rtc_interrupt(&mut self) {
        // The RTC line wakes via the sleep controller; nothing latches.
    }

    fn enable_door_interrupt(&mut self) {
        // SAFETY: re-arm the self-masked ISR source.
        unsafe {
            gpio_intr_enable(pins::DOOR_SW_GPIO);
        }
    }
}

/// UART0 console through the standard streams the ESP-IDF runtime wires
/// to it.
pub struct EspConsoleIo;

impl ConsoleIo for EspConsoleIo {
    fn read_byte(&mut self) -> Option<u8> {
        let mut byte = 0u8;
        // SAFETY: non-blocking read from the console file descriptor.
        let n = unsafe { read(0, &mut byte as *mut u8 as *mut core::ffi::c_void, 1) };
        if n == 1 {
            Some(byte)
        } else {
            None
        }
    }

    fn write(&mut self, s: &str) {
        print!("{s}");
    }
}

// ───────────────────────────────────────────────────────────────
// I²C bus to the DS3231
// ───────────────────────────────────────────────────────────────

const DS3231_ADDR7: u16 = 0x68;
const I2C_TIMEOUT_MS: i32 = 50;

/// Register transport over the I²C master driver. The register pointer
/// is the first written byte, per the DS3231 datasheet.
pub struct EspI2cBus {
    dev: i2c_master_dev_handle_t,
}

impl EspI2cBus {
    /// Bring up the master bus at 100 kHz and attach the RTC.
    pub fn new() -> Option<Self> {
        let bus_cfg = i2c_master_bus_config_t {
            i2c_port: -1,
            sda_io_num: pins::I2C_SDA_GPIO,
            scl_io_num: pins::I2C_SCL_GPIO,
            ..Default::default()
        };
        let mut bus: i2c_master_bus_handle_t = core::ptr::null_mut();
        // SAFETY: one-shot driver install before the loop starts.
        if unsafe { i2c_new_master_bus(&bus_cfg, &mut bus) } != ESP_OK {
            return None;
        }

        let dev_cfg = i2c_device_config_t {
            device_address: DS3231_ADDR7,
            scl_speed_hz: 100_000,
            ..Default::default()
        };
        let mut dev: i2c_master_dev_handle_t = core::ptr::null_mut();
        if unsafe { i2c_master_bus_add_device(bus, &dev_cfg, &mut dev) } != ESP_OK {
            return None;
        }

        Some(Self { dev })
    }
}

impl crate::adapters::ds3231::RegisterBus for EspI2cBus {
    fn read(&mut self, reg: u8, buf: &mut [u8]) -> bool {
        // SAFETY: handles valid for the life of the bus; main-loop only.
        unsafe {
            i2c_master_transmit_receive(
                self.dev,
                &reg,
                1,
                buf.as_mut_ptr(),
                buf.len(),
                I2C_TIMEOUT_MS,
            ) == ESP_OK
        }
    }

    fn write(&mut self, reg: u8, data: &[u8]) -> bool {
        let mut frame = [0u8; 8];
        if data.len() + 1 > frame.len() {
            return false;
        }
        frame[0] = reg;
        frame[1..=data.len()].copy_from_slice(data);
        // SAFETY: as above.
        unsafe { i2c_master_transmit(self.dev, frame.as_ptr(), data.len() + 1, I2C_TIMEOUT_MS) == ESP_OK }
    }
}

// ───────────────────────────────────────────────────────────────
// Platform bundle
// ───────────────────────────────────────────────────────────────

use crate::adapters::ds3231::Ds3231;
use crate::app::ports::RtcPort;
use crate::timeutil::DateTime;
use std::cell::RefCell;
use std::rc::Rc;

/// The firmware platform: all ports in one place, RTC shared with the
/// relay override stamping through its `Rc` handle.
pub struct EspPlatform {
    pub rtc: Rc<RefCell<Ds3231<EspI2cBus>>>,
    sleep: EspSleep,
    uptime: EspUptime,
    config_sw: EspConfigSwitch,
    console: EspConsoleIo,
}

impl EspPlatform {
    pub fn new(rtc: Rc<RefCell<Ds3231<EspI2cBus>>>) -> Self {
        Self {
            rtc,
            sleep: EspSleep,
            uptime: EspUptime,
            config_sw: EspConfigSwitch,
            console: EspConsoleIo,
        }
    }
}

impl UptimePort for EspPlatform {
    fn now_ms(&mut self) -> u32 {
        self.uptime.now_ms()
    }
}

impl DelayMs for EspPlatform {
    fn delay_ms(&mut self, ms: u32) {
        EspDelay.delay_ms(ms);
    }
}

impl ConfigSwitchPort for EspPlatform {
    fn config_switch_on(&mut self) -> bool {
        self.config_sw.config_switch_on()
    }
}

impl ConsoleIo for EspPlatform {
    fn read_byte(&mut self) -> Option<u8> {
        self.console.read_byte()
    }

    fn write(&mut self, s: &str) {
        self.console.write(s);
    }
}

impl RtcPort for EspPlatform {
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

impl SleepPort for EspPlatform {
    fn enter_deep_sleep(&mut self) {
        self.sleep.enter_deep_sleep();
    }

    fn rtc_int_asserted(&mut self) -> bool {
        self.sleep.rtc_int_asserted()
    }

    fn door_switch_asserted(&mut self) -> bool {
        self.sleep.door_switch_asserted()
    }

    fn take_door_event(&mut self) -> bool {
        self.sleep.take_door_event()
    }

    fn door_event_pending(&mut self) -> bool {
        self.sleep.door_event_pending()
    }

    fn clear_wake_flags(&mut self) {
        self.sleep.clear_wake_flags();
    }

    fn enable_rtc_interrupt(&mut self) {
        self.sleep.enable_rtc_interrupt();
    }

    fn enable_door_interrupt(&mut self) {
        self.sleep.enable_door_interrupt();
    }
}

/// NVS-backed blob store for the persisted configuration.
pub struct NvsConfigStore {
    handle: nvs_handle_t,
}

impl NvsConfigStore {
    const NAMESPACE: &'static [u8] = b"coopctl\0";
    const KEY: &'static [u8] = b"config\0";

    pub fn open() -> Option<Self> {
        let mut handle: nvs_handle_t = 0;
        // SAFETY: nvs_flash_init was called during boot.
        let rc = unsafe {
            nvs_open(
                Self::NAMESPACE.as_ptr() as *const core::ffi::c_char,
                nvs_open_mode_t_NVS_READWRITE,
                &mut handle,
            )
        };
        if rc != ESP_OK {
            return None;
        }
        Some(Self { handle })
    }
}

impl crate::app::ports::ConfigStore for NvsConfigStore {
    fn load_blob(&mut self, buf: &mut [u8]) -> Option<usize> {
        let mut len = buf.len();
        // SAFETY: handle opened in `open`.
        let rc = unsafe {
            nvs_get_blob(
                self.handle,
                Self::KEY.as_ptr() as *const core::ffi::c_char,
                buf.as_mut_ptr() as *mut core::ffi::c_void,
                &mut len,
            )
        };
        if rc == ESP_OK {
            Some(len)
        } else {
            None
        }
    }

    fn save_blob(&mut self, blob: &[u8]) -> bool {
        // SAFETY: handle opened in `open`; NVS commits atomically.
        unsafe {
            nvs_set_blob(
                self.handle,
                Self::KEY.as_ptr() as *const core::ffi::c_char,
                blob.as_ptr() as *const core::ffi::c_void,
                blob.len(),
            ) == ESP_OK
                && nvs_commit(self.handle) == ESP_OK
        }
    }
}
