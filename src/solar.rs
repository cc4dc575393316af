//! Daily solar event computation.
//!
//! Standard sunrise-equation (NOAA) computation of today's four scheduling
//! anchors: sunrise and sunset at the standard horizon (zenith 90.833°,
//! which folds in refraction and the solar radius) and civil dawn/dusk
//! (zenith 96°).
//!
//! All outputs are UTC minute-of-day. The scheduler is strictly UTC; no
//! timezone parameter exists here at all. Results are minutes within the
//! modular day, so an event that falls past midnight UTC simply wraps —
//! exactly what the minute-of-day schedule model expects.
//!
//! Pure function: no I/O, no globals, no hardware access.

use std::f64::consts::PI;

use crate::timeutil;

/// Zenith angle for standard sunrise/sunset, degrees.
const ZENITH_STANDARD_DEG: f64 = 90.833;
/// Zenith angle for civil twilight, degrees.
const ZENITH_CIVIL_DEG: f64 = 96.0;

/// Today's four solar anchors, UTC minute-of-day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SolarTimes {
    pub sunrise: u16,
    pub sunset: u16,
    pub civil_dawn: u16,
    pub civil_dusk: u16,
}

/// Compute the solar anchors for a calendar date and location.
///
/// `lat_deg` positive north, `lon_deg` positive east. Returns `None` when
/// the sun does not cross the requested zenith (polar day/night); callers
/// treat that day as having no solar anchors, and midnight-anchored events
/// keep working.
pub fn solar_compute(year: i32, month: u8, day: u8, lat_deg: f64, lon_deg: f64) -> Option<SolarTimes> {
    let doy = day_of_year(year, month, day);
    let year_len = if timeutil::is_leap_year(year) { 366.0 } else { 365.0 };

    // Fractional year at solar noon, radians.
    let gamma = 2.0 * PI / year_len * (f64::from(doy) - 1.0 + 0.5);

    // Equation of time (minutes) and solar declination (radians).
    let eqtime = 229.18
        * (0.000075 + 0.001868 * gamma.cos()
            - 0.032077 * gamma.sin()
            - 0.014615 * (2.0 * gamma).cos()
            - 0.040849 * (2.0 * gamma).sin());
    let decl = 0.006918 - 0.399912 * gamma.cos() + 0.070257 * gamma.sin()
        - 0.006758 * (2.0 * gamma).cos()
        + 0.000907 * (2.0 * gamma).sin()
        - 0.002697 * (3.0 * gamma).cos()
        + 0.00148 * (3.0 * gamma).sin();

    let (sunrise, sunset) = crossings(lat_deg, lon_deg, decl, eqtime, ZENITH_STANDARD_DEG)?;
    let (civil_dawn, civil_dusk) = crossings(lat_deg, lon_deg, decl, eqtime, ZENITH_CIVIL_DEG)?;

    Some(SolarTimes { sunrise, sunset, civil_dawn, civil_dusk })
}

/// UTC minute-of-day of the morning and evening crossings of one zenith.
fn crossings(lat_deg: f64, lon_deg: f64, decl: f64, eqtime: f64, zenith_deg: f64) -> Option<(u16, u16)> {
    let lat = lat_deg.to_radians();
    let zenith = zenith_deg.to_radians();

    let cos_ha = (zenith.cos() - lat.sin() * decl.sin()) / (lat.cos() * decl.cos());
    if !(-1.0..=1.0).contains(&cos_ha) {
        return None; // Sun never crosses this zenith today.
    }

    let ha_deg = cos_ha.acos().to_degrees();
    let morning = 720.0 - 4.0 * (lon_deg + ha_deg) - eqtime;
    let evening = 720.0 - 4.0 * (lon_deg - ha_deg) - eqtime;

    Some((wrap_minutes(morning), wrap_minutes(evening)))
}

fn wrap_minutes(m: f64) -> u16 {
    (m.round() as i32).rem_euclid(1440) as u16
}

fn day_of_year(year: i32, month: u8, day: u8) -> u16 {
    let mut doy = u16::from(day);
    for m in 1..month {
        doy += u16::from(timeutil::days_in_month(year, m));
    }
    doy
}

#[cfg(test)]
mod tests {
    use super::*;

    const LAT: f64 = 34.4653;
    const LON: f64 = -93.3628;

    #[test]
    fn day_of_year_boundaries() {
        assert_eq!(day_of_year(2026, 1, 1), 1);
        assert_eq!(day_of_year(2026, 12, 31), 365);
        assert_eq!(day_of_year(2024, 12, 31), 366);
        assert_eq!(day_of_year(2026, 3, 1), 60);
    }

    #[test]
    fn march_equinox_vicinity() {
        // Near the equinox the day is close to 12 hours and sunrise at this
        // longitude lands in the 12:00–13:00 UTC band (morning local).
        let sol = solar_compute(2026, 3, 15, LAT, LON).unwrap();
        assert!((730..790).contains(&sol.sunrise), "sunrise {}", sol.sunrise);

        // Sunset wraps past midnight UTC at this longitude in March.
        let set = i32::from(sol.sunset);
        let rise = i32::from(sol.sunrise);
        let daylen = (set - rise).rem_euclid(1440);
        assert!((660..780).contains(&daylen), "day length {daylen}");
    }

    #[test]
    fn civil_twilight_brackets_the_day() {
        let sol = solar_compute(2026, 6, 10, LAT, LON).unwrap();

        // Dawn precedes sunrise and dusk follows sunset in modular minutes.
        let dawn_to_rise = (i32::from(sol.sunrise) - i32::from(sol.civil_dawn)).rem_euclid(1440);
        let set_to_dusk = (i32::from(sol.civil_dusk) - i32::from(sol.sunset)).rem_euclid(1440);
        assert!((10..60).contains(&dawn_to_rise), "dawn gap {dawn_to_rise}");
        assert!((10..60).contains(&set_to_dusk), "dusk gap {set_to_dusk}");
    }

    #[test]
    fn summer_days_longer_than_winter() {
        let daylen = |mo: u8, d: u8| {
            let s = solar_compute(2026, mo, d, LAT, LON).unwrap();
            (i32::from(s.sunset) - i32::from(s.sunrise)).rem_euclid(1440)
        };
        assert!(daylen(6, 21) > daylen(12, 21) + 120);
    }

    #[test]
    fn polar_night_yields_none() {
        // Deep polar winter: sun never rises at 80°N.
        assert_eq!(solar_compute(2026, 12, 21, 80.0, 0.0), None);
    }

    #[test]
    fn outputs_in_minute_range() {
        for (mo, d) in [(1u8, 15u8), (4, 1), (7, 4), (10, 31)] {
            let sol = solar_compute(2026, mo, d, LAT, LON).unwrap();
            for m in [sol.sunrise, sol.sunset, sol.civil_dawn, sol.civil_dusk] {
                assert!(m < 1440);
            }
        }
    }
}
