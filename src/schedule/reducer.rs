//! Backward-looking state reducer.
//!
//! For each device, find the most recent schedule event whose resolved
//! minute is `<= now_minute`; that event governs the device. Future events
//! are ignored — the reducer never looks ahead.
//!
//! Pure function: inputs → facts. No globals, no hardware access, no
//! execution. Safe to run at boot, after RTC set, after crash/restart, over
//! sparse tables.
//!
//! ## Phase identity
//!
//! Each governed device's output carries the absolute UTC epoch of its
//! governing event:
//!
//! ```text
//! when = today_midnight_epoch + minute * 60
//! ```
//!
//! If `when` changes between reducer runs, the device has entered a new
//! schedule phase. Devices with manual-override arbitration compare this
//! value against their last override timestamp, which is how overrides
//! expire without any explicit clearing action.

use crate::devices::DEVICE_TABLE_SIZE;
use crate::schedule::events::{Action, EventTable};
use crate::schedule::resolve::resolve_when;
use crate::solar::SolarTimes;

/// Device-centric reduced scheduler intent, one slot per device id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReducedState {
    has_action: [bool; DEVICE_TABLE_SIZE],
    action: [Action; DEVICE_TABLE_SIZE],
    when: [u32; DEVICE_TABLE_SIZE],
}

impl Default for ReducedState {
    fn default() -> Self {
        Self {
            has_action: [false; DEVICE_TABLE_SIZE],
            action: [Action::Off; DEVICE_TABLE_SIZE],
            when: [0; DEVICE_TABLE_SIZE],
        }
    }
}

impl ReducedState {
    /// Governing `(action, when_epoch)` for a device id, if any event
    /// governs it right now.
    pub fn governing(&self, device_id: u8) -> Option<(Action, u32)> {
        let idx = usize::from(device_id);
        if idx >= DEVICE_TABLE_SIZE || !self.has_action[idx] {
            return None;
        }
        Some((self.action[idx], self.when[idx]))
    }
}

/// Reduce the event table into expected device state at `now_minute`.
///
/// Ties between events resolving to the same minute go to the later slot in
/// iteration order (ascending refnum), which is stable across runs.
pub fn reduce(
    events: &EventTable,
    sol: Option<&SolarTimes>,
    now_minute: u16,
    today_midnight_epoch: u32,
) -> ReducedState {
    let mut out = ReducedState::default();
    let mut best_minute = [0u16; DEVICE_TABLE_SIZE];

    let (slots, _) = events.view();
    for ev in slots.iter() {
        if ev.is_empty() {
            continue;
        }

        let idx = usize::from(ev.device_id);
        if idx >= DEVICE_TABLE_SIZE {
            continue;
        }

        let minute = match resolve_when(&ev.when, sol) {
            Some(m) => m,
            None => continue,
        };

        // Ignore future intent.
        if minute > now_minute {
            continue;
        }

        // Latest event <= now wins.
        if !out.has_action[idx] || minute >= best_minute[idx] {
            best_minute[idx] = minute;
            out.action[idx] = ev.action;
            out.has_action[idx] = true;
            out.when[idx] = today_midnight_epoch + u32::from(minute) * 60;
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::events::tests::CountingTouch;
    use crate::schedule::events::{Event, TimeRef, When};

    const EPOCH0: u32 = 828_230_400; // some midnight, day-aligned

    fn table(entries: &[(u8, Action, TimeRef, i16)]) -> EventTable {
        let mut t = EventTable::default();
        let mut touch = CountingTouch::default();
        for &(device_id, action, reference, offset_minutes) in entries {
            let ev = Event {
                refnum: 0,
                device_id,
                action,
                when: When { reference, offset_minutes },
            };
            t.add(ev, &mut touch).unwrap();
        }
        t
    }

    const SOL: SolarTimes = SolarTimes { sunrise: 745, sunset: 1151, civil_dawn: 719, civil_dusk: 1177 };

    #[test]
    fn empty_table_governs_nothing() {
        let rs = reduce(&EventTable::default(), Some(&SOL), 720, EPOCH0);
        for id in 0..DEVICE_TABLE_SIZE as u8 {
            assert_eq!(rs.governing(id), None);
        }
    }

    #[test]
    fn event_before_now_governs() {
        let t = table(&[(1, Action::On, TimeRef::Sunrise, 0)]);
        let rs = reduce(&t, Some(&SOL), 800, EPOCH0);
        assert_eq!(rs.governing(1), Some((Action::On, EPOCH0 + 745 * 60)));
    }

    #[test]
    fn event_at_now_is_inclusive() {
        let t = table(&[(1, Action::On, TimeRef::Sunrise, 0)]);
        let rs = reduce(&t, Some(&SOL), 745, EPOCH0);
        assert!(rs.governing(1).is_some());
    }

    #[test]
    fn future_event_is_ignored() {
        let t = table(&[(1, Action::On, TimeRef::Sunrise, 0)]);
        let rs = reduce(&t, Some(&SOL), 744, EPOCH0);
        assert_eq!(rs.governing(1), None);
    }

    #[test]
    fn latest_past_event_wins() {
        let t = table(&[
            (1, Action::On, TimeRef::Sunrise, 0),   // 745
            (1, Action::Off, TimeRef::Sunset, 0),   // 1151
        ]);

        let morning = reduce(&t, Some(&SOL), 900, EPOCH0);
        assert_eq!(morning.governing(1), Some((Action::On, EPOCH0 + 745 * 60)));

        let evening = reduce(&t, Some(&SOL), 1200, EPOCH0);
        assert_eq!(evening.governing(1), Some((Action::Off, EPOCH0 + 1151 * 60)));
    }

    #[test]
    fn tie_goes_to_later_slot() {
        let t = table(&[
            (4, Action::On, TimeRef::Midnight, 540),
            (4, Action::Off, TimeRef::Midnight, 540),
        ]);
        let rs = reduce(&t, None, 600, EPOCH0);
        assert_eq!(rs.governing(4), Some((Action::Off, EPOCH0 + 540 * 60)));
    }

    #[test]
    fn devices_reduce_independently() {
        let t = table(&[
            (1, Action::On, TimeRef::Midnight, 300),
            (4, Action::On, TimeRef::Midnight, 500),
            (5, Action::Off, TimeRef::Midnight, 900),
        ]);
        let rs = reduce(&t, None, 600, EPOCH0);
        assert_eq!(rs.governing(1), Some((Action::On, EPOCH0 + 300 * 60)));
        assert_eq!(rs.governing(4), Some((Action::On, EPOCH0 + 500 * 60)));
        assert_eq!(rs.governing(5), None); // still in the future
    }

    #[test]
    fn missing_solar_skips_solar_events_only() {
        let t = table(&[
            (1, Action::On, TimeRef::Sunrise, 0),
            (4, Action::On, TimeRef::Midnight, 100),
        ]);
        let rs = reduce(&t, None, 800, EPOCH0);
        assert_eq!(rs.governing(1), None);
        assert!(rs.governing(4).is_some());
    }

    #[test]
    fn out_of_range_device_id_is_skipped() {
        let t = table(&[(200, Action::On, TimeRef::Midnight, 0)]);
        let rs = reduce(&t, None, 600, EPOCH0);
        for id in 0..DEVICE_TABLE_SIZE as u8 {
            assert_eq!(rs.governing(id), None);
        }
    }

    #[test]
    fn phase_identity_tracks_governing_minute() {
        let t = table(&[
            (4, Action::On, TimeRef::Midnight, 480),  // 08:00
            (4, Action::Off, TimeRef::Midnight, 540), // 09:00
        ]);

        let at_0830 = reduce(&t, None, 510, EPOCH0).governing(4).unwrap();
        let at_0900 = reduce(&t, None, 540, EPOCH0).governing(4).unwrap();
        assert_ne!(at_0830.1, at_0900.1);
        assert_eq!(at_0900.1, EPOCH0 + 540 * 60);
    }
}
