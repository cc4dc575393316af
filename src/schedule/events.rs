//! Declarative schedule events and the sparse event table.
//!
//! Events express intent only ("door ON at sunrise+10"). They are never
//! executed or replayed; expected state is derived from them by the reducer.
//!
//! ## Slot invariant
//!
//! The table is sparse and fixed-capacity. `refnum != 0` is the sole
//! indicator of an active slot, and an inactive slot is fully zeroed.
//! Readers scan the whole capacity and skip empty slots; the active count
//! is informational only and must never be used as a loop bound.
//!
//! ## Scheduler contract
//!
//! Every mutation notifies a [`ScheduleTouch`] hook so scheduler caches and
//! next-event reductions are invalidated. Read-only access never notifies.

use log::info;
use serde::{Deserialize, Serialize};

use crate::schedule::ScheduleTouch;

/// Event table capacity. `refnum = slot index + 1` must stay within `u8`,
/// so any capacity up to 255 is safe.
pub const MAX_EVENTS: usize = 16;

/// Wire size of one event in the persisted config blob.
pub const EVENT_WIRE_LEN: usize = 6;

/// Stable identity of an event slot; 0 marks an empty slot.
pub type RefNum = u8;

// ---------------------------------------------------------------------------
// Time expressions
// ---------------------------------------------------------------------------

/// Reference point a schedule event is anchored on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum TimeRef {
    /// Disabled rule; resolves to no minute.
    #[default]
    None = 0,
    /// 00:00 UTC.
    Midnight = 1,
    /// Sunrise at the standard horizon.
    Sunrise = 2,
    /// Sunset at the standard horizon.
    Sunset = 3,
    /// Civil dawn (sun at −6°).
    CivilDawn = 4,
    /// Civil dusk (sun at −6°).
    CivilDusk = 5,
}

impl TimeRef {
    pub fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::None),
            1 => Some(Self::Midnight),
            2 => Some(Self::Sunrise),
            3 => Some(Self::Sunset),
            4 => Some(Self::CivilDawn),
            5 => Some(Self::CivilDusk),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Midnight => "midnight",
            Self::Sunrise => "sunrise",
            Self::Sunset => "sunset",
            Self::CivilDawn => "dawn",
            Self::CivilDusk => "dusk",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "midnight" => Some(Self::Midnight),
            "sunrise" => Some(Self::Sunrise),
            "sunset" => Some(Self::Sunset),
            "dawn" => Some(Self::CivilDawn),
            "dusk" => Some(Self::CivilDusk),
            _ => None,
        }
    }
}

/// Declarative time expression: reference point plus signed minute offset.
/// The resolved minute wraps modulo 1440.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct When {
    pub reference: TimeRef,
    pub offset_minutes: i16,
}

// ---------------------------------------------------------------------------
// Actions and events
// ---------------------------------------------------------------------------

/// Declarative command on a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum Action {
    #[default]
    Off = 0,
    On = 1,
}

impl Action {
    pub fn name(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::On => "on",
        }
    }
}

/// One declarative scheduling event: `(device, action, when)` plus its
/// stable slot identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Event {
    /// Slot identity, 1–255; 0 marks an empty slot.
    pub refnum: RefNum,
    /// Raw device id as stored; validated against the registry at use.
    pub device_id: u8,
    pub action: Action,
    pub when: When,
}

impl Event {
    pub const EMPTY: Event = Event {
        refnum: 0,
        device_id: 0,
        action: Action::Off,
        when: When { reference: TimeRef::None, offset_minutes: 0 },
    };

    pub fn is_empty(&self) -> bool {
        self.refnum == 0
    }

    /// Encode into the fixed wire layout used by the config blob.
    pub fn encode_into(&self, out: &mut [u8; EVENT_WIRE_LEN]) {
        out[0] = self.refnum;
        out[1] = self.device_id;
        out[2] = self.action as u8;
        out[3] = self.when.reference as u8;
        out[4..6].copy_from_slice(&self.when.offset_minutes.to_le_bytes());
    }

    /// Decode from the wire layout. Unknown discriminants clear the slot;
    /// a corrupt slot must not masquerade as an active rule.
    pub fn decode(raw: &[u8; EVENT_WIRE_LEN]) -> Event {
        let reference = match TimeRef::from_u8(raw[3]) {
            Some(r) => r,
            None => return Event::EMPTY,
        };
        let action = match raw[2] {
            0 => Action::Off,
            1 => Action::On,
            _ => return Event::EMPTY,
        };
        Event {
            refnum: raw[0],
            device_id: raw[1],
            action,
            when: When {
                reference,
                offset_minutes: i16::from_le_bytes([raw[4], raw[5]]),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Sparse event table
// ---------------------------------------------------------------------------

/// The sparse fixed-capacity table of schedule intent. Owned by the
/// persistent configuration; mutated only through this API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventTable {
    slots: [Event; MAX_EVENTS],
}

impl Default for EventTable {
    fn default() -> Self {
        Self { slots: [Event::EMPTY; MAX_EVENTS] }
    }
}

impl EventTable {
    /// Rebuild a table from raw slots (config blob decode). Slot positions
    /// and refnums are preserved — identity must survive a power cycle —
    /// but any slot violating the invariants is fully zeroed.
    pub fn from_slots(mut slots: [Event; MAX_EVENTS]) -> Self {
        for (i, slot) in slots.iter_mut().enumerate() {
            if slot.is_empty() || usize::from(slot.refnum) != i + 1 {
                *slot = Event::EMPTY;
            }
        }
        Self { slots }
    }

    /// Read-only view of the full table plus the active count.
    ///
    /// The slice always has `MAX_EVENTS` entries including empty slots;
    /// the count is informational only.
    pub fn view(&self) -> (&[Event; MAX_EVENTS], usize) {
        let used = self.slots.iter().filter(|e| !e.is_empty()).count();
        (&self.slots, used)
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Event::is_empty)
    }

    /// Place an event into the first empty slot, assigning
    /// `refnum = slot index + 1`. Returns `None` when the table is full.
    pub fn add(&mut self, event: Event, touch: &mut impl ScheduleTouch) -> Option<RefNum> {
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if slot.is_empty() {
                *slot = event;
                slot.refnum = (i + 1) as RefNum;
                let refnum = slot.refnum;
                info!("event: added refnum {refnum} (device {})", event.device_id);
                touch.schedule_touch();
                return Some(refnum);
            }
        }
        None
    }

    /// Replace the event identified by `refnum`, preserving its identity.
    pub fn update_by_refnum(&mut self, refnum: RefNum, event: Event, touch: &mut impl ScheduleTouch) -> bool {
        if refnum == 0 {
            return false;
        }
        for slot in self.slots.iter_mut() {
            if slot.refnum == refnum {
                *slot = event;
                slot.refnum = refnum;
                touch.schedule_touch();
                return true;
            }
        }
        false
    }

    /// Delete the event identified by `refnum`. The slot is fully zeroed
    /// to preserve the inactive-slot invariant.
    pub fn delete_by_refnum(&mut self, refnum: RefNum, touch: &mut impl ScheduleTouch) -> bool {
        if refnum == 0 {
            return false;
        }
        for slot in self.slots.iter_mut() {
            if slot.refnum == refnum {
                *slot = Event::EMPTY;
                info!("event: deleted refnum {refnum}");
                touch.schedule_touch();
                return true;
            }
        }
        false
    }

    /// Zero the entire table; one notification.
    pub fn clear(&mut self, touch: &mut impl ScheduleTouch) {
        self.slots = [Event::EMPTY; MAX_EVENTS];
        touch.schedule_touch();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Test hook that counts notifications.
    #[derive(Default)]
    pub(crate) struct CountingTouch {
        pub count: u32,
    }

    impl ScheduleTouch for CountingTouch {
        fn schedule_touch(&mut self) {
            self.count += 1;
        }
    }

    fn sample_event(device_id: u8) -> Event {
        Event {
            refnum: 0,
            device_id,
            action: Action::On,
            when: When { reference: TimeRef::Sunrise, offset_minutes: 15 },
        }
    }

    #[test]
    fn add_assigns_slot_plus_one_refnum() {
        let mut table = EventTable::default();
        let mut touch = CountingTouch::default();

        assert_eq!(table.add(sample_event(1), &mut touch), Some(1));
        assert_eq!(table.add(sample_event(1), &mut touch), Some(2));
        assert_eq!(touch.count, 2);
    }

    #[test]
    fn add_fails_when_full() {
        let mut table = EventTable::default();
        let mut touch = CountingTouch::default();

        for _ in 0..MAX_EVENTS {
            assert!(table.add(sample_event(1), &mut touch).is_some());
        }
        assert_eq!(table.add(sample_event(1), &mut touch), None);
        // No notification for the failed insert.
        assert_eq!(touch.count, MAX_EVENTS as u32);
    }

    #[test]
    fn delete_zeroes_the_slot() {
        let mut table = EventTable::default();
        let mut touch = CountingTouch::default();

        let r = table.add(sample_event(4), &mut touch).unwrap();
        assert!(table.delete_by_refnum(r, &mut touch));

        let (slots, used) = table.view();
        assert_eq!(used, 0);
        assert_eq!(slots[usize::from(r) - 1], Event::EMPTY);
    }

    #[test]
    fn deleted_slot_is_reused() {
        let mut table = EventTable::default();
        let mut touch = CountingTouch::default();

        let a = table.add(sample_event(1), &mut touch).unwrap();
        let _b = table.add(sample_event(1), &mut touch).unwrap();
        table.delete_by_refnum(a, &mut touch);

        // First empty slot is slot 0 again.
        assert_eq!(table.add(sample_event(1), &mut touch), Some(a));
    }

    #[test]
    fn update_preserves_refnum() {
        let mut table = EventTable::default();
        let mut touch = CountingTouch::default();

        let r = table.add(sample_event(1), &mut touch).unwrap();
        let mut replacement = sample_event(5);
        replacement.refnum = 99; // must be ignored
        assert!(table.update_by_refnum(r, replacement, &mut touch));

        let (slots, _) = table.view();
        assert_eq!(slots[usize::from(r) - 1].refnum, r);
        assert_eq!(slots[usize::from(r) - 1].device_id, 5);
    }

    #[test]
    fn unknown_refnum_is_rejected() {
        let mut table = EventTable::default();
        let mut touch = CountingTouch::default();

        assert!(!table.delete_by_refnum(7, &mut touch));
        assert!(!table.update_by_refnum(0, sample_event(1), &mut touch));
        assert_eq!(touch.count, 0);
    }

    #[test]
    fn clear_notifies_once() {
        let mut table = EventTable::default();
        let mut touch = CountingTouch::default();

        table.add(sample_event(1), &mut touch);
        table.add(sample_event(2), &mut touch);
        let before = touch.count;
        table.clear(&mut touch);
        assert_eq!(touch.count, before + 1);
        assert!(table.is_empty());
    }

    #[test]
    fn view_does_not_notify() {
        let mut table = EventTable::default();
        let mut touch = CountingTouch::default();
        table.add(sample_event(1), &mut touch);

        let before = touch.count;
        let _ = table.view();
        let _ = table.is_empty();
        assert_eq!(touch.count, before);
    }

    #[test]
    fn event_wire_roundtrip() {
        let ev = Event {
            refnum: 3,
            device_id: 4,
            action: Action::On,
            when: When { reference: TimeRef::CivilDusk, offset_minutes: -45 },
        };
        let mut raw = [0u8; EVENT_WIRE_LEN];
        ev.encode_into(&mut raw);
        assert_eq!(Event::decode(&raw), ev);
    }

    #[test]
    fn corrupt_wire_slot_decodes_empty() {
        let raw = [3u8, 4, 1, 0xEE, 0, 0]; // bogus TimeRef discriminant
        assert!(Event::decode(&raw).is_empty());
    }
}
