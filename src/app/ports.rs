//! Port traits — the hexagonal boundary between the control core and the
//! outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ control core (service, devices, console)
//! ```
//!
//! Driven adapters (RTC, sleep controller, GPIO actuators, console I/O,
//! config storage) implement these traits. The core consumes them via
//! generics or boxed objects, so nothing inside the service or the device
//! state machines touches hardware directly. The host simulation in
//! `adapters::sim` implements every port, which is what makes the whole
//! control loop testable.

use crate::timeutil::DateTime;

// ───────────────────────────────────────────────────────────────
// Wall-clock time (RTC)
// ───────────────────────────────────────────────────────────────

/// The battery-backed wall clock. Stores UTC exclusively; any local-time
/// handling lives at the console boundary.
///
/// Register-level transients surface as `None`/`false`; callers leave
/// their own state unchanged and retry naturally on the next loop pass.
pub trait RtcPort {
    /// Whether the clock holds valid time (oscillator never stopped since
    /// the last set).
    fn time_is_set(&mut self) -> bool;

    /// Current UTC time, `None` on a bus transient.
    fn get_time(&mut self) -> Option<DateTime>;

    /// Write UTC time; also marks the clock valid.
    fn set_time(&mut self, t: &DateTime) -> bool;

    /// Arm the minute-match alarm at a UTC minute-of-day. Clears any
    /// pending alarm flag first.
    fn alarm_set_minute_of_day(&mut self, minute: u16) -> bool;

    fn alarm_disable(&mut self);

    /// Clear the latched alarm flag, releasing the interrupt line.
    fn alarm_clear_flag(&mut self);

    /// Minutes since UTC midnight, `[0, 1439]`. Clamps corrupt fields so
    /// bad reads cannot propagate into the scheduler.
    fn minutes_since_midnight(&mut self) -> u16 {
        match self.get_time() {
            Some(t) => t.minute_of_day().min(1439),
            None => 0,
        }
    }
}

/// Seconds since 2000-01-01 00:00:00 UTC, or 0 while the clock is unset.
/// Split from [`RtcPort`] so devices that only need "now" (relay override
/// stamping) can hold the narrowest possible handle.
pub trait EpochSource {
    fn current_epoch(&mut self) -> u32;
}

// ───────────────────────────────────────────────────────────────
// Sleep / wake
// ───────────────────────────────────────────────────────────────

/// Deep-sleep entry and the two level-triggered wake sources.
///
/// ISRs do the minimum: mask their own source and latch a flag. Everything
/// here is consumed from the main loop only.
pub trait SleepPort {
    /// Enter deep sleep. Returns when a wake source asserts.
    fn enter_deep_sleep(&mut self);

    /// RTC interrupt line level (active condition, not the mask).
    fn rtc_int_asserted(&mut self) -> bool;

    /// Door switch line level.
    fn door_switch_asserted(&mut self) -> bool;

    /// Consume the ISR-latched door event, if one is pending.
    fn take_door_event(&mut self) -> bool;

    /// Peek without consuming; part of the sleep gate.
    fn door_event_pending(&mut self) -> bool;

    /// Clear latched external interrupt flag bits.
    fn clear_wake_flags(&mut self);

    /// Unmask a wake source. Callers re-enable only while the line is
    /// de-asserted; a still-asserted level-triggered source would re-enter
    /// immediately.
    fn enable_rtc_interrupt(&mut self);
    fn enable_door_interrupt(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Miscellaneous inputs and timing
// ───────────────────────────────────────────────────────────────

/// The configuration slide switch selecting RUN vs CONFIG mode.
pub trait ConfigSwitchPort {
    fn config_switch_on(&mut self) -> bool;
}

/// Monotonic milliseconds since boot. Wraps at `u32::MAX`; all consumers
/// use wrapping subtraction.
pub trait UptimePort {
    fn now_ms(&mut self) -> u32;
}

/// Blocking millisecond delay.
///
/// The two intentionally blocking paths (lock pulse, door reversal
/// dead-time) stall through this; do not convert them to cooperative
/// waits — their safety argument needs the enclosing call to return only
/// after the wait completes.
pub trait DelayMs {
    fn delay_ms(&mut self, ms: u32);
}

// ───────────────────────────────────────────────────────────────
// Actuator hardware
// ───────────────────────────────────────────────────────────────

/// Door H-bridge: direction pair plus enable. Direction must never change
/// while power is enabled; the state machines own that discipline.
pub trait DoorHw {
    fn set_open_dir(&mut self);
    fn set_close_dir(&mut self);
    fn enable(&mut self);
    /// Kill power first, then neutralize direction.
    fn stop(&mut self);
}

/// Lock H-bridge, same shape as the door's.
pub trait LockHw {
    fn set_engage_dir(&mut self);
    fn set_release_dir(&mut self);
    fn enable(&mut self);
    fn stop(&mut self);
}

/// One latching relay: separate set/reset coils driven by short pulses.
/// The adapter owns the coil pulse width (~20 ms).
pub trait RelayHw {
    fn pulse_set(&mut self);
    fn pulse_reset(&mut self);
}

/// Bi-color LED driver. Duty is routed to one channel at a time; the
/// carrier tick advances the software PWM that the duty rides on.
pub trait LedHw {
    fn led_off(&mut self);
    fn led_red_pwm(&mut self, duty: u8);
    fn led_green_pwm(&mut self, duty: u8);
    fn carrier_tick(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Console and persistence
// ───────────────────────────────────────────────────────────────

/// Byte-oriented console transport (UART on hardware, stdin/stdout on the
/// host).
pub trait ConsoleIo {
    /// Non-blocking read of the next input byte.
    fn read_byte(&mut self) -> Option<u8>;
    fn write(&mut self, s: &str);
}

/// Raw blob transport for the persisted configuration. The codec (magic,
/// version, Fletcher-16) lives in `config`; adapters only move bytes.
pub trait ConfigStore {
    /// Read the stored blob into `buf`, returning its length.
    fn load_blob(&mut self, buf: &mut [u8]) -> Option<usize>;

    /// Atomically replace the stored blob.
    fn save_blob(&mut self, blob: &[u8]) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Platform bundle
// ───────────────────────────────────────────────────────────────

/// Everything the control loop needs from the outside world, as one
/// parameter. Blanket-implemented so any type satisfying the individual
/// ports is a platform.
pub trait Platform:
    RtcPort + SleepPort + ConfigSwitchPort + UptimePort + DelayMs + ConsoleIo
{
}

impl<T> Platform for T where
    T: RtcPort + SleepPort + ConfigSwitchPort + UptimePort + DelayMs + ConsoleIo
{
}
