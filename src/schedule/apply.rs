//! Schedule applier: the only place scheduled intent turns into device
//! actions.
//!
//! For every registered device with a governing event, compare the desired
//! state to the device's settled state and issue a scheduled command on
//! mismatch. Re-application is idempotent: matching state is a no-op, so
//! running the applier once per minute (or on every schedule mutation)
//! never produces duplicate hardware work.
//!
//! The applier never bypasses device state machines and never touches
//! hardware directly.

use log::debug;

use crate::devices::{DevState, DeviceId, DeviceRegistry, DEVICE_TABLE_SIZE};
use crate::schedule::events::Action;
use crate::schedule::reducer::ReducedState;

/// Apply reduced scheduler state to the registered devices.
pub fn apply(rs: &ReducedState, devices: &mut DeviceRegistry) {
    // Snapshot the id set first; commands below need the registry mutably.
    let mut ids = [None; DEVICE_TABLE_SIZE];
    for (slot, id) in ids.iter_mut().zip(devices.ids()) {
        *slot = Some(id);
    }

    for id in ids.into_iter().flatten() {
        apply_one(rs, devices, id);
    }
}

fn apply_one(rs: &ReducedState, devices: &mut DeviceRegistry, id: DeviceId) {
    let (action, when) = match rs.governing(id as u8) {
        Some(g) => g,
        None => return,
    };

    let want = match action {
        Action::On => DevState::On,
        Action::Off => DevState::Off,
    };

    let dev = match devices.get_mut(id) {
        Some(d) => d,
        None => return,
    };

    // No-op if already correct.
    if dev.state() == want {
        return;
    }

    debug!("apply: {} -> {} (when={when})", dev.name(), dev.state_string(want));
    dev.scheduled_state(want, when);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::Device;
    use crate::schedule::events::tests::CountingTouch;
    use crate::schedule::events::{Event, EventTable, TimeRef, When};
    use crate::schedule::reducer::reduce;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Device that records every command it receives.
    struct RecordingDevice {
        id: DeviceId,
        state: DevState,
        log: Rc<RefCell<Vec<(DeviceId, DevState, u32)>>>,
        honor_commands: bool,
    }

    impl Device for RecordingDevice {
        fn id(&self) -> DeviceId {
            self.id
        }
        fn name(&self) -> &'static str {
            "recording"
        }
        fn init(&mut self) {}
        fn state(&self) -> DevState {
            self.state
        }
        fn set_state(&mut self, state: DevState) {
            if self.honor_commands {
                self.state = state;
            }
        }
        fn scheduled_state(&mut self, state: DevState, when_epoch: u32) {
            self.log.borrow_mut().push((self.id, state, when_epoch));
            self.set_state(state);
        }
        fn state_string(&self, _state: DevState) -> &'static str {
            "?"
        }
    }

    fn fixture(ids: &[DeviceId]) -> (DeviceRegistry, Rc<RefCell<Vec<(DeviceId, DevState, u32)>>>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut reg = DeviceRegistry::new();
        for &id in ids {
            reg.register(Box::new(RecordingDevice {
                id,
                state: DevState::Unknown,
                log: Rc::clone(&log),
                honor_commands: true,
            }));
        }
        (reg, log)
    }

    fn governed(entries: &[(u8, Action, i16)], now_minute: u16) -> ReducedState {
        let mut table = EventTable::default();
        let mut touch = CountingTouch::default();
        for &(device_id, action, offset) in entries {
            table
                .add(
                    Event {
                        refnum: 0,
                        device_id,
                        action,
                        when: When { reference: TimeRef::Midnight, offset_minutes: offset },
                    },
                    &mut touch,
                )
                .unwrap();
        }
        reduce(&table, None, now_minute, 0)
    }

    #[test]
    fn commands_issue_on_mismatch() {
        let (mut reg, log) = fixture(&[DeviceId::Relay1]);
        let rs = governed(&[(4, Action::On, 100)], 200);

        apply(&rs, &mut reg);
        assert_eq!(log.borrow().as_slice(), &[(DeviceId::Relay1, DevState::On, 6000)]);
    }

    #[test]
    fn matching_state_is_a_no_op() {
        let (mut reg, log) = fixture(&[DeviceId::Relay1]);
        let rs = governed(&[(4, Action::On, 100)], 200);

        apply(&rs, &mut reg);
        apply(&rs, &mut reg); // second pass must not re-command
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn stubborn_device_is_recommanded() {
        // A device that refuses the command (override policy) keeps its
        // state, so the applier tries again next pass.
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut reg = DeviceRegistry::new();
        reg.register(Box::new(RecordingDevice {
            id: DeviceId::Relay1,
            state: DevState::Off,
            log: Rc::clone(&log),
            honor_commands: false,
        }));

        let rs = governed(&[(4, Action::On, 100)], 200);
        apply(&rs, &mut reg);
        apply(&rs, &mut reg);
        assert_eq!(log.borrow().len(), 2);
    }

    #[test]
    fn ungoverned_devices_untouched() {
        let (mut reg, log) = fixture(&[DeviceId::Relay1, DeviceId::Relay2]);
        let rs = governed(&[(4, Action::On, 100)], 200);

        apply(&rs, &mut reg);
        assert!(log.borrow().iter().all(|(id, ..)| *id == DeviceId::Relay1));
        assert_eq!(reg.get(DeviceId::Relay2).unwrap().state(), DevState::Unknown);
    }

    #[test]
    fn governed_but_unregistered_is_skipped() {
        let (mut reg, log) = fixture(&[DeviceId::Relay2]);
        let rs = governed(&[(4, Action::On, 100)], 200); // relay1 not registered

        apply(&rs, &mut reg);
        assert!(log.borrow().is_empty());
    }
}
