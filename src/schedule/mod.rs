//! Scheduling pipeline: event store, resolver, reducer, applier, and the
//! scheduler facade.
//!
//! ```text
//! ┌────────────┐   touch    ┌───────────────────────────────┐
//! │ EventTable │──────────▶│  Scheduler (ETag, solar cache) │
//! └─────┬──────┘            └──────────────┬────────────────┘
//!       │ view                             │ snapshot
//!       ▼                                  ▼
//!   reducer ──── ReducedState ────▶ applier ────▶ DeviceRegistry
//! ```
//!
//! The facade caches today's solar snapshot (computed once per UTC calendar
//! day) and exposes a monotonic ETag the main loop compares to detect any
//! schedule mutation without rescanning the table.

pub mod apply;
pub mod events;
pub mod reducer;
pub mod resolve;

use log::info;

use crate::schedule::events::EventTable;
use crate::schedule::resolve::resolve_when;
use crate::solar::SolarTimes;

/// Notification hook every event-table mutator calls exactly once.
///
/// Decouples the store from the scheduler the same way the delegate traits
/// decouple drivers from the event system elsewhere in this crate: the
/// table knows nothing about caches or ETags.
pub trait ScheduleTouch {
    fn schedule_touch(&mut self);
}

/// Cached day of solar anchors. `times` is `None` when the location is
/// unset or the computation failed (polar day/night).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SolarDay {
    year: i32,
    month: u8,
    day: u8,
    times: Option<SolarTimes>,
}

/// Scheduler facade: change detection plus the daily solar snapshot.
#[derive(Debug, Default)]
pub struct Scheduler {
    etag: u32,
    today: Option<SolarDay>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Monotonic counter identifying the current schedule definition.
    /// The main loop re-runs the reducer whenever this moves.
    pub fn etag(&self) -> u32 {
        self.etag
    }

    /// Whether the cached snapshot is for the given UTC date.
    pub fn is_day_current(&self, year: i32, month: u8, day: u8) -> bool {
        matches!(self.today, Some(d) if d.year == year && d.month == month && d.day == day)
    }

    /// Store today's snapshot (or mark it absent for the day).
    pub fn update_day(&mut self, year: i32, month: u8, day: u8, times: Option<SolarTimes>) {
        match times {
            Some(t) => info!(
                "solar {year:04}-{month:02}-{day:02}: rise {} set {} dawn {} dusk {}",
                t.sunrise, t.sunset, t.civil_dawn, t.civil_dusk
            ),
            None => info!("solar {year:04}-{month:02}-{day:02}: unavailable"),
        }
        self.today = Some(SolarDay { year, month, day, times });
    }

    /// Today's anchors, if the day has been computed and the sun cooperates.
    pub fn solar(&self) -> Option<&SolarTimes> {
        self.today.as_ref().and_then(|d| d.times.as_ref())
    }

    /// Drop the cached day so the next loop pass recomputes it. Called on
    /// location change.
    pub fn invalidate_solar(&mut self) {
        self.today = None;
        self.schedule_touch();
    }

    /// Smallest resolved minute of today over the whole table, in
    /// `[0, 1439]`.
    ///
    /// "Next" is deliberately the lowest minute today, not the first minute
    /// strictly after now: the main loop is the only caller that needs
    /// strict-future ordering and applies its own wrap there.
    pub fn next_event_minute(&self, events: &EventTable) -> Option<u16> {
        let sol = self.solar();
        let (slots, _) = events.view();

        let mut best: Option<u16> = None;
        for ev in slots.iter() {
            if ev.is_empty() {
                continue;
            }
            if let Some(minute) = resolve_when(&ev.when, sol) {
                if best.is_none_or(|b| minute < b) {
                    best = Some(minute);
                }
            }
        }
        best
    }
}

impl ScheduleTouch for Scheduler {
    fn schedule_touch(&mut self) {
        self.etag = self.etag.wrapping_add(1);
    }
}
