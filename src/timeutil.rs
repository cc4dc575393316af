//! Calendar and epoch math, plus the US DST rule used by the console.
//!
//! The scheduler and RTC operate strictly in UTC. Everything in this module
//! is pure arithmetic: the only place the timezone offset and DST rule are
//! applied is the console boundary, which converts between local civil time
//! and UTC for display and input.
//!
//! Epoch base is 2000-01-01 00:00:00 UTC. Values are `u32` seconds, which
//! keeps the arithmetic 32-bit safe well past the life of the hardware.

/// A calendar timestamp as read from or written to the RTC. Always UTC
/// except while passing through the console's local-time conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateTime {
    pub year: i32,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl DateTime {
    /// Minute-of-day in `[0, 1439]`.
    pub fn minute_of_day(&self) -> u16 {
        u16::from(self.hour) * 60 + u16::from(self.minute)
    }
}

// ---------------------------------------------------------------------------
// Calendar primitives
// ---------------------------------------------------------------------------

pub fn is_leap_year(year: i32) -> bool {
    if year % 400 == 0 {
        return true;
    }
    if year % 100 == 0 {
        return false;
    }
    year % 4 == 0
}

pub fn days_in_month(year: i32, month: u8) -> u8 {
    const DPM: [u8; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

    if !(1..=12).contains(&month) {
        return 31;
    }
    if month == 2 && is_leap_year(year) {
        return 29;
    }
    DPM[usize::from(month) - 1]
}

/// Zeller's congruence, 0 = Sunday.
fn day_of_week(year: i32, month: u8, day: u8) -> u8 {
    let (mut y, mut m) = (year, i32::from(month));
    if m < 3 {
        m += 12;
        y -= 1;
    }
    let k = y % 100;
    let j = y / 100;
    let h = (i32::from(day) + 13 * (m + 1) / 5 + k + k / 4 + j / 4 + 5 * j) % 7;
    ((h + 6) % 7) as u8
}

/// Day-of-month of the n-th Sunday of a month.
fn nth_sunday(year: i32, month: u8, n: u8) -> u8 {
    let dow = day_of_week(year, month, 1);
    let first_sunday = if dow == 0 { 1 } else { 8 - dow };
    first_sunday + (n - 1) * 7
}

// ---------------------------------------------------------------------------
// Epoch conversion (2000-01-01 base, UTC)
// ---------------------------------------------------------------------------

/// Convert a UTC calendar timestamp to epoch seconds since
/// 2000-01-01 00:00:00 UTC.
///
/// Valid for years >= 2000; caller supplies sane calendar values.
pub fn epoch_from_ymdhms(year: i32, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> u32 {
    let mut days: u32 = 0;

    for y in 2000..year {
        days += if is_leap_year(y) { 366 } else { 365 };
    }
    for m in 1..month {
        days += u32::from(days_in_month(year, m));
    }
    days += u32::from(day) - 1;

    days * 86_400
        + u32::from(hour) * 3_600
        + u32::from(minute) * 60
        + u32::from(second)
}

/// Epoch seconds of 00:00:00 UTC on the given date. The reducer anchors
/// every event's absolute timestamp on this.
pub fn midnight_epoch(year: i32, month: u8, day: u8) -> u32 {
    epoch_from_ymdhms(year, month, day, 0, 0, 0)
}

/// Inverse of [`epoch_from_ymdhms`].
pub fn ymdhms_from_epoch(epoch: u32) -> DateTime {
    let mut days = epoch / 86_400;
    let secs = epoch % 86_400;

    let mut year = 2000;
    loop {
        let ydays = if is_leap_year(year) { 366 } else { 365 };
        if days < ydays {
            break;
        }
        days -= ydays;
        year += 1;
    }

    let mut month = 1u8;
    loop {
        let mdays = u32::from(days_in_month(year, month));
        if days < mdays {
            break;
        }
        days -= mdays;
        month += 1;
    }

    DateTime {
        year,
        month,
        day: (days + 1) as u8,
        hour: (secs / 3_600) as u8,
        minute: (secs / 60 % 60) as u8,
        second: (secs % 60) as u8,
    }
}

// ---------------------------------------------------------------------------
// US DST rule (console presentation only)
// ---------------------------------------------------------------------------

/// Whether US Daylight Saving Time is in effect at the given local time.
///
/// Rules since 2007: starts second Sunday in March at 02:00, ends first
/// Sunday in November at 02:00.
pub fn is_us_dst(year: i32, month: u8, day: u8, hour: u8) -> bool {
    if !(3..=11).contains(&month) {
        return false;
    }
    if month > 3 && month < 11 {
        return true;
    }

    if month == 3 {
        let start = nth_sunday(year, 3, 2);
        if day != start {
            return day > start;
        }
        return hour >= 2;
    }

    // November
    let end = nth_sunday(year, 11, 1);
    if day != end {
        return day < end;
    }
    hour < 2
}

/// Offset of local civil time from UTC in minutes, for a configured
/// timezone and DST policy. Used by the console only.
pub fn utc_offset_minutes(tz_hours: i32, honor_dst: bool, local: &DateTime) -> i32 {
    let dst = if honor_dst && is_us_dst(local.year, local.month, local.day, local.hour) {
        60
    } else {
        0
    };
    tz_hours * 60 + dst
}

/// Shift a timestamp by a signed number of minutes, rolling the date.
pub fn shift_minutes(t: &DateTime, minutes: i32) -> DateTime {
    let epoch = epoch_from_ymdhms(t.year, t.month, t.day, t.hour, t.minute, t.second);
    let shifted = (i64::from(epoch) + i64::from(minutes) * 60).max(0) as u32;
    ymdhms_from_epoch(shifted)
}

/// UTC → local civil time under the configured tz/DST policy.
///
/// DST membership is decided on the tentative local time (standard offset
/// applied first), matching how the console round-trips user input.
pub fn utc_to_local(tz_hours: i32, honor_dst: bool, utc: &DateTime) -> DateTime {
    let standard = shift_minutes(utc, tz_hours * 60);
    let offset = utc_offset_minutes(tz_hours, honor_dst, &standard);
    shift_minutes(utc, offset)
}

/// Local civil time → UTC under the configured tz/DST policy.
pub fn local_to_utc(tz_hours: i32, honor_dst: bool, local: &DateTime) -> DateTime {
    let offset = utc_offset_minutes(tz_hours, honor_dst, local);
    shift_minutes(local, -offset)
}
