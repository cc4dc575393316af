//! Console command implementations.
//!
//! Local time appears here and nowhere else: input is converted to UTC
//! before touching the RTC, display converts UTC back using the configured
//! timezone and DST policy.

use std::cell::RefCell;
use std::rc::Rc;

use crate::app::ports::Platform;
use crate::config::Config;
use crate::devices::door::DoorDevice;
use crate::devices::led::{LedColor, LedMachine, LedMode};
use crate::devices::{DevState, DeviceRegistry};
use crate::schedule::events::{Action, Event, TimeRef, When};
use crate::schedule::resolve::resolve_when;
use crate::schedule::Scheduler;
use crate::timeutil::{self, DateTime};

fn fmt_dt(t: &DateTime) -> String {
    format!(
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
        t.year, t.month, t.day, t.hour, t.minute, t.second
    )
}

fn fmt_hm(minute: u16) -> String {
    format!("{:02}:{:02}", minute / 60, minute % 60)
}

/// Render a UTC minute-of-day in local civil time for today's date.
fn fmt_local_minute(cfg: &Config, today: &DateTime, minute: u16) -> String {
    let utc = DateTime {
        hour: (minute / 60) as u8,
        minute: (minute % 60) as u8,
        second: 0,
        ..*today
    };
    let local = timeutil::utc_to_local(cfg.tz_hours, cfg.honor_dst, &utc);
    format!("{:02}:{:02}", local.hour, local.minute)
}

// ───────────────────────────────────────────────────────────────
// time / set / show / solar
// ───────────────────────────────────────────────────────────────

pub fn cmd_time(p: &mut impl Platform, cfg: &Rc<RefCell<Config>>) {
    if !p.time_is_set() {
        p.write("RTC: time not set\r\n");
        return;
    }
    let Some(utc) = p.get_time() else {
        p.write("ERROR: rtc read failed\r\n");
        return;
    };

    let cfg = cfg.borrow();
    let local = timeutil::utc_to_local(cfg.tz_hours, cfg.honor_dst, &utc);
    p.write(&format!("UTC   {}\r\n", fmt_dt(&utc)));
    p.write(&format!(
        "local {} (tz {:+}, dst {})\r\n",
        fmt_dt(&local),
        cfg.tz_hours,
        if cfg.honor_dst { "on" } else { "off" }
    ));

    if cfg.rtc_set_epoch != 0 {
        let now = timeutil::epoch_from_ymdhms(utc.year, utc.month, utc.day, utc.hour, utc.minute, utc.second);
        let held = now.saturating_sub(cfg.rtc_set_epoch);
        p.write(&format!("set   {} s ago\r\n", held));
    }
}

pub fn cmd_set(p: &mut impl Platform, argv: &[&str], cfg: &Rc<RefCell<Config>>, sched: &mut Scheduler) {
    let usage = "usage: set time YYYY-MM-DD HH:MM:SS (local)\r\n       set lat|lon <degrees>\r\n       set tz <hours> | set dst on|off\r\n       set door_travel_ms|lock_pulse_ms|door_settle_ms|lock_settle_ms <ms>\r\n";
    if argv.len() < 3 {
        p.write(usage);
        return;
    }

    match argv[1] {
        "time" => {
            if argv.len() != 4 {
                p.write(usage);
                return;
            }
            let Some(local) = parse_datetime(argv[2], argv[3]) else {
                p.write("ERROR: bad date/time\r\n");
                return;
            };
            let (tz, dst) = {
                let c = cfg.borrow();
                (c.tz_hours, c.honor_dst)
            };
            let utc = timeutil::local_to_utc(tz, dst, &local);
            if !p.set_time(&utc) {
                p.write("ERROR: rtc write failed\r\n");
                return;
            }
            cfg.borrow_mut().rtc_set_epoch =
                timeutil::epoch_from_ymdhms(utc.year, utc.month, utc.day, utc.hour, utc.minute, utc.second);
            p.write(&format!("OK (UTC {})\r\n", fmt_dt(&utc)));
        }

        "lat" | "lon" => {
            let Ok(deg) = argv[2].parse::<f64>() else {
                p.write("ERROR: bad degrees\r\n");
                return;
            };
            let limit = if argv[1] == "lat" { 90.0 } else { 180.0 };
            if !(-limit..=limit).contains(&deg) {
                p.write("ERROR: out of range\r\n");
                return;
            }
            let e4 = (deg * 10_000.0).round() as i32;
            if argv[1] == "lat" {
                cfg.borrow_mut().latitude_e4 = e4;
            } else {
                cfg.borrow_mut().longitude_e4 = e4;
            }
            // New location, new solar day.
            sched.invalidate_solar();
            p.write("OK\r\n");
        }

        "tz" => {
            let Ok(tz) = argv[2].parse::<i32>() else {
                p.write("ERROR: bad offset\r\n");
                return;
            };
            if !(-12..=14).contains(&tz) {
                p.write("ERROR: out of range\r\n");
                return;
            }
            cfg.borrow_mut().tz_hours = tz;
            p.write("OK\r\n");
        }

        "dst" => {
            match argv[2] {
                "on" => cfg.borrow_mut().honor_dst = true,
                "off" => cfg.borrow_mut().honor_dst = false,
                _ => {
                    p.write("ERROR: on|off\r\n");
                    return;
                }
            }
            p.write("OK\r\n");
        }

        key @ ("door_travel_ms" | "lock_pulse_ms" | "door_settle_ms" | "lock_settle_ms") => {
            let Ok(ms) = argv[2].parse::<u16>() else {
                p.write("ERROR: bad milliseconds\r\n");
                return;
            };
            let mut c = cfg.borrow_mut();
            match key {
                "door_travel_ms" => c.door_travel_ms = ms,
                "lock_pulse_ms" => c.lock_pulse_ms = ms,
                "door_settle_ms" => c.door_settle_ms = ms,
                _ => c.lock_settle_ms = ms,
            }
            p.write("OK\r\n");
        }

        _ => p.write(usage),
    }
}

pub fn cmd_show(p: &mut impl Platform, cfg: &Rc<RefCell<Config>>) {
    let c = cfg.borrow();
    p.write(&format!("lat            : {:.4}\r\n", c.latitude_deg()));
    p.write(&format!("lon            : {:.4}\r\n", c.longitude_deg()));
    p.write(&format!("tz             : {:+} h\r\n", c.tz_hours));
    p.write(&format!("dst            : {}\r\n", if c.honor_dst { "on" } else { "off" }));
    p.write(&format!("door_travel_ms : {}\r\n", c.door_travel_ms));
    p.write(&format!("lock_pulse_ms  : {}\r\n", c.lock_pulse_ms));
    p.write(&format!("door_settle_ms : {}\r\n", c.door_settle_ms));
    p.write(&format!("lock_settle_ms : {}\r\n", c.lock_settle_ms));
    let (_, used) = c.events.view();
    p.write(&format!("events         : {used} active\r\n"));
}

pub fn cmd_solar(p: &mut impl Platform, cfg: &Rc<RefCell<Config>>, sched: &Scheduler) {
    let Some(sol) = sched.solar() else {
        p.write("solar: unavailable (no location, polar day/night, or not computed yet)\r\n");
        return;
    };
    let Some(today) = p.get_time() else {
        p.write("ERROR: rtc read failed\r\n");
        return;
    };

    let c = cfg.borrow();
    for (name, minute) in [
        ("civil dawn", sol.civil_dawn),
        ("sunrise", sol.sunrise),
        ("sunset", sol.sunset),
        ("civil dusk", sol.civil_dusk),
    ] {
        p.write(&format!(
            "{name:<11} {} UTC  ({} local)\r\n",
            fmt_hm(minute),
            fmt_local_minute(&c, &today, minute)
        ));
    }
}

// ───────────────────────────────────────────────────────────────
// schedule / event
// ───────────────────────────────────────────────────────────────

pub fn cmd_schedule(
    p: &mut impl Platform,
    cfg: &Rc<RefCell<Config>>,
    sched: &Scheduler,
    devices: &DeviceRegistry,
) {
    let Some(today) = p.get_time() else {
        p.write("ERROR: rtc read failed\r\n");
        return;
    };

    let c = cfg.borrow();
    let (slots, used) = c.events.view();
    if used == 0 {
        p.write("schedule empty\r\n");
        return;
    }

    for ev in slots.iter().filter(|e| !e.is_empty()) {
        let device = crate::devices::DeviceId::from_u8(ev.device_id)
            .and_then(|id| devices.get(id))
            .map(|d| d.name())
            .unwrap_or("?");

        let when = match resolve_when(&ev.when, sched.solar()) {
            Some(minute) => format!(
                "{} UTC ({} local)",
                fmt_hm(minute),
                fmt_local_minute(&c, &today, minute)
            ),
            None => "unresolved".to_string(),
        };

        p.write(&format!(
            "[{:>2}] {:<7} {:<3} {}{:+} -> {}\r\n",
            ev.refnum,
            device,
            ev.action.name(),
            ev.when.reference.name(),
            ev.when.offset_minutes,
            when
        ));
    }
}

pub fn cmd_event(
    p: &mut impl Platform,
    argv: &[&str],
    cfg: &Rc<RefCell<Config>>,
    sched: &mut Scheduler,
    devices: &mut DeviceRegistry,
) {
    let usage = "usage: event add <device> <on|off> <midnight|sunrise|sunset|dawn|dusk> [offset_min]\r\n       event del <refnum> | event clear | event list\r\n";

    match argv.get(1).copied() {
        None | Some("list") => {
            let c = cfg.borrow();
            let (slots, used) = c.events.view();
            p.write(&format!("{used} events\r\n"));
            for ev in slots.iter().filter(|e| !e.is_empty()) {
                p.write(&format!(
                    "[{:>2}] device {} {} {}{:+}\r\n",
                    ev.refnum,
                    ev.device_id,
                    ev.action.name(),
                    ev.when.reference.name(),
                    ev.when.offset_minutes
                ));
            }
        }

        Some("add") => {
            if argv.len() < 5 {
                p.write(usage);
                return;
            }
            let Some(device) = devices.by_name_mut(argv[2]).map(|d| d.id()) else {
                p.write("ERROR: unknown device\r\n");
                return;
            };
            let action = match argv[3] {
                "on" => Action::On,
                "off" => Action::Off,
                _ => {
                    p.write("ERROR: on|off\r\n");
                    return;
                }
            };
            let Some(reference) = TimeRef::parse(argv[4]) else {
                p.write("ERROR: bad time reference\r\n");
                return;
            };
            let offset_minutes = match argv.get(5) {
                Some(raw) => match raw.parse::<i16>() {
                    Ok(v) => v,
                    Err(_) => {
                        p.write("ERROR: bad offset\r\n");
                        return;
                    }
                },
                None => 0,
            };

            let ev = Event {
                refnum: 0,
                device_id: device as u8,
                action,
                when: When { reference, offset_minutes },
            };
            match cfg.borrow_mut().events.add(ev, sched) {
                Some(refnum) => p.write(&format!("OK refnum {refnum}\r\n")),
                None => p.write("ERROR: table full\r\n"),
            }
        }

        Some("del") => {
            let Some(refnum) = argv.get(2).and_then(|s| s.parse::<u8>().ok()) else {
                p.write(usage);
                return;
            };
            if cfg.borrow_mut().events.delete_by_refnum(refnum, sched) {
                p.write("OK\r\n");
            } else {
                p.write("ERROR: refnum not found\r\n");
            }
        }

        Some("clear") => {
            cfg.borrow_mut().events.clear(sched);
            p.write("OK\r\n");
        }

        _ => p.write(usage),
    }
}

// ───────────────────────────────────────────────────────────────
// device control
// ───────────────────────────────────────────────────────────────

pub fn cmd_device(p: &mut impl Platform, argv: &[&str], devices: &mut DeviceRegistry) {
    match argv.len() {
        1 => {
            let ids: Vec<_> = devices.ids().collect();
            for id in ids {
                if let Some(dev) = devices.get(id) {
                    let state = dev.state();
                    p.write(&format!("{:<7} {}\r\n", dev.name(), dev.state_string(state)));
                }
            }
        }

        2 => match devices.by_name_mut(argv[1]) {
            Some(dev) => {
                let state = dev.state();
                p.write(&format!("{} {}\r\n", dev.name(), dev.state_string(state)));
            }
            None => p.write("ERROR: unknown device\r\n"),
        },

        3 => {
            let Some(id) = devices.by_name_mut(argv[1]).map(|d| d.id()) else {
                p.write("ERROR: unknown device\r\n");
                return;
            };
            let Some(state) = devices.parse_state(id, argv[2]) else {
                p.write("ERROR: bad state\r\n");
                return;
            };
            // Manual path: counts as an override for arbitrating devices.
            if let Some(dev) = devices.get_mut(id) {
                dev.set_state(state);
                p.write("OK\r\n");
            }
        }

        _ => p.write("usage: device [name] [state]\r\n"),
    }
}

pub fn cmd_door(p: &mut impl Platform, argv: &[&str], door: &Rc<RefCell<DoorDevice>>) {
    match argv.get(1).copied() {
        Some("open") => {
            door.borrow_mut().request(DevState::On);
            p.write("OK\r\n");
        }
        Some("close") => {
            door.borrow_mut().request(DevState::Off);
            p.write("OK\r\n");
        }
        Some("toggle") => {
            door.borrow_mut().toggle();
            p.write("OK\r\n");
        }
        _ => p.write("usage: door open|close|toggle\r\n"),
    }
}

pub fn cmd_lock(p: &mut impl Platform, argv: &[&str], devices: &mut DeviceRegistry) {
    let Some(lock) = devices.by_name_mut("lock") else {
        p.write("ERROR: no lock device\r\n");
        return;
    };
    match argv.get(1).copied() {
        Some("engage") => {
            lock.set_state(DevState::On);
            p.write("OK\r\n");
        }
        Some("release") => {
            lock.set_state(DevState::Off);
            p.write("OK\r\n");
        }
        _ => p.write("usage: lock engage|release\r\n"),
    }
}

pub fn cmd_led(p: &mut impl Platform, argv: &[&str], led: &Rc<RefCell<LedMachine>>) {
    let color = match argv.get(2).copied() {
        Some("red") => LedColor::Red,
        Some("green") | None => LedColor::Green,
        _ => {
            p.write("usage: led off|on|blink|pulse [red|green]\r\n");
            return;
        }
    };

    let mode = match argv.get(1).copied() {
        Some("off") => LedMode::Off,
        Some("on") => LedMode::On,
        Some("blink") => LedMode::Blink,
        Some("pulse") => LedMode::Pulse,
        _ => {
            p.write("usage: led off|on|blink|pulse [red|green]\r\n");
            return;
        }
    };

    led.borrow_mut().set(mode, color);
    p.write("OK\r\n");
}

fn parse_datetime(date: &str, time: &str) -> Option<DateTime> {
    let mut d = date.split('-');
    let year: i32 = d.next()?.parse().ok()?;
    let month: u8 = d.next()?.parse().ok()?;
    let day: u8 = d.next()?.parse().ok()?;
    if d.next().is_some() {
        return None;
    }

    let mut t = time.split(':');
    let hour: u8 = t.next()?.parse().ok()?;
    let minute: u8 = t.next()?.parse().ok()?;
    let second: u8 = t.next()?.parse().ok()?;
    if t.next().is_some() {
        return None;
    }

    if !(2000..=2099).contains(&year)
        || !(1..=12).contains(&month)
        || day == 0
        || day > timeutil::days_in_month(year, month)
        || hour > 23
        || minute > 59
        || second > 59
    {
        return None;
    }

    Some(DateTime { year, month, day, hour, minute, second })
}
