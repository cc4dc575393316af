//! Latching relay devices with manual-override arbitration.
//!
//! Each relay is a latching part with separate set/reset coils; the
//! adapter drives them with short pulses, so "state" here is a cached
//! logical value and duplicate writes are filtered to avoid pointless
//! coil wear.
//!
//! ## Override model
//!
//! A manual command stamps `last_override_epoch` with the current UTC
//! epoch. A scheduled command carries the absolute epoch of its governing
//! event (the schedule phase identity); if that timestamp is not newer
//! than the last manual intervention, the command is stale and ignored.
//! The override therefore expires automatically the moment a *later*
//! schedule phase begins — no boolean flag, no explicit clearing, purely
//! time-based and monotonic.

use std::cell::RefCell;
use std::rc::Rc;

use log::info;

use crate::app::ports::{EpochSource, RelayHw};
use crate::devices::{DevState, Device, DeviceId};

pub struct RelayDevice {
    id: DeviceId,
    name: &'static str,
    state: DevState,
    last_override_epoch: u32,
    hw: Box<dyn RelayHw>,
    epoch: Rc<RefCell<dyn EpochSource>>,
}

impl RelayDevice {
    pub fn new(
        id: DeviceId,
        name: &'static str,
        hw: Box<dyn RelayHw>,
        epoch: Rc<RefCell<dyn EpochSource>>,
    ) -> Self {
        Self { id, name, state: DevState::Unknown, last_override_epoch: 0, hw, epoch }
    }

    /// Drive the coils on an actual transition; duplicate states are
    /// filtered. Does not touch the override timestamp.
    fn set_state_internal(&mut self, state: DevState) {
        if state == self.state {
            return;
        }
        self.state = state;

        match state {
            DevState::On => self.hw.pulse_set(),
            DevState::Off => self.hw.pulse_reset(),
            DevState::Unknown => {}
        }
    }
}

impl Device for RelayDevice {
    fn id(&self) -> DeviceId {
        self.id
    }

    fn name(&self) -> &'static str {
        self.name
    }

    fn init(&mut self) {
        // Known-safe baseline; also forces a real coil pulse since the
        // cached state starts Unknown.
        self.set_state(DevState::Off);
    }

    fn state(&self) -> DevState {
        self.state
    }

    /// Manual/immediate command: records the override timestamp.
    fn set_state(&mut self, state: DevState) {
        self.last_override_epoch = self.epoch.borrow_mut().current_epoch();
        self.set_state_internal(state);
    }

    /// Scheduled command: ignored while an override is newer than the
    /// governing event.
    fn scheduled_state(&mut self, state: DevState, when_epoch: u32) {
        if when_epoch <= self.last_override_epoch {
            info!("{}: schedule suppressed by override", self.name);
            return;
        }
        self.set_state_internal(state);
    }

    fn state_string(&self, state: DevState) -> &'static str {
        match state {
            DevState::On => "ON",
            DevState::Off => "OFF",
            DevState::Unknown => "UNKNOWN",
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    #[derive(Default)]
    pub(crate) struct FixedEpoch {
        pub now: u32,
    }

    impl EpochSource for FixedEpoch {
        fn current_epoch(&mut self) -> u32 {
            self.now
        }
    }

    #[derive(Default)]
    pub(crate) struct MockRelayHw {
        pub pulses: Rc<RefCell<Vec<&'static str>>>,
    }

    impl RelayHw for MockRelayHw {
        fn pulse_set(&mut self) {
            self.pulses.borrow_mut().push("set");
        }
        fn pulse_reset(&mut self) {
            self.pulses.borrow_mut().push("reset");
        }
    }

    fn fixture() -> (RelayDevice, Rc<RefCell<Vec<&'static str>>>, Rc<RefCell<FixedEpoch>>) {
        let hw = MockRelayHw::default();
        let pulses = Rc::clone(&hw.pulses);
        let epoch = Rc::new(RefCell::new(FixedEpoch::default()));
        let relay = RelayDevice::new(DeviceId::Relay1, "relay1", Box::new(hw), epoch.clone());
        (relay, pulses, epoch)
    }

    #[test]
    fn init_forces_off() {
        let (mut relay, pulses, _) = fixture();
        relay.init();
        assert_eq!(relay.state(), DevState::Off);
        assert_eq!(pulses.borrow().as_slice(), &["reset"]);
    }

    #[test]
    fn duplicate_states_do_not_pulse() {
        let (mut relay, pulses, _) = fixture();
        relay.init();
        relay.set_state(DevState::Off);
        relay.set_state(DevState::Off);
        assert_eq!(pulses.borrow().len(), 1); // only the init pulse

        relay.set_state(DevState::On);
        assert_eq!(pulses.borrow().as_slice(), &["reset", "set"]);
    }

    #[test]
    fn stale_schedule_is_ignored() {
        let (mut relay, _, epoch) = fixture();
        relay.init();

        // Operator turns the relay on at 08:00.
        epoch.borrow_mut().now = 800_000;
        relay.set_state(DevState::On);

        // A schedule phase that began at or before the override loses.
        relay.scheduled_state(DevState::Off, 800_000);
        assert_eq!(relay.state(), DevState::On);
        relay.scheduled_state(DevState::Off, 799_000);
        assert_eq!(relay.state(), DevState::On);
    }

    #[test]
    fn newer_schedule_phase_wins() {
        let (mut relay, _, epoch) = fixture();
        relay.init();

        epoch.borrow_mut().now = 800_000;
        relay.set_state(DevState::On);

        // The 09:00 phase postdates the override: override expires.
        relay.scheduled_state(DevState::Off, 803_600);
        assert_eq!(relay.state(), DevState::Off);
    }

    #[test]
    fn schedule_applies_freely_without_override() {
        let (mut relay, _, _) = fixture();
        relay.init();

        // init() stamped epoch 0; any real event time is newer.
        relay.scheduled_state(DevState::On, 60);
        assert_eq!(relay.state(), DevState::On);
    }
}
