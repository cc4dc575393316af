//! Resolve declarative time expressions to a UTC minute-of-day.
//!
//! Stateless, pure, no RTC access, no device state. Solar-anchored
//! expressions need today's snapshot; without one they resolve to nothing
//! and the caller skips the event.

use crate::schedule::events::{TimeRef, When};
use crate::solar::SolarTimes;

/// Resolve `when` against an optional solar snapshot.
///
/// The result is `(base + offset) mod 1440`, normalized non-negative.
/// `TimeRef::None` and solar references without a snapshot resolve to
/// `None`.
pub fn resolve_when(when: &When, sol: Option<&SolarTimes>) -> Option<u16> {
    let base: i32 = match when.reference {
        TimeRef::None => return None,
        TimeRef::Midnight => 0,
        TimeRef::Sunrise => i32::from(sol?.sunrise),
        TimeRef::Sunset => i32::from(sol?.sunset),
        TimeRef::CivilDawn => i32::from(sol?.civil_dawn),
        TimeRef::CivilDusk => i32::from(sol?.civil_dusk),
    };

    let minute = (base + i32::from(when.offset_minutes)).rem_euclid(1440);
    Some(minute as u16)
}
