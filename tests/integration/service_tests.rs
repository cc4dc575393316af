//! End-to-end control-loop scenarios.

use coopctl::app::ports::RtcPort;
use coopctl::app::service::LoopStep;
use coopctl::config::Config;
use coopctl::schedule::ScheduleTouch;
use coopctl::devices::door::DoorMotion;
use coopctl::devices::led::LedMode;
use coopctl::devices::{DevState, Device, DeviceId};
use coopctl::schedule::events::{Action, Event, TimeRef, When};
use coopctl::solar;

use crate::support::boot;

// London-ish coordinates keep both solar anchors inside one UTC day,
// which makes the wake-at-anchor assertions direct.
const LAT: f64 = 51.5074;
const LON: f64 = -0.1278;

fn located_config(events: &[(u8, Action, TimeRef, i16)]) -> Config {
    struct NoTouch;
    impl coopctl::schedule::ScheduleTouch for NoTouch {
        fn schedule_touch(&mut self) {}
    }

    let mut cfg = Config {
        latitude_e4: (LAT * 10_000.0).round() as i32,
        longitude_e4: (LON * 10_000.0).round() as i32,
        ..Config::default()
    };
    for &(device_id, action, reference, offset_minutes) in events {
        cfg.events
            .add(
                Event {
                    refnum: 0,
                    device_id,
                    action,
                    when: When { reference, offset_minutes },
                },
                &mut NoTouch,
            )
            .unwrap();
    }
    cfg
}

#[test]
fn sunrise_opens_sunset_closes_and_locks() {
    let cfg = located_config(&[
        (DeviceId::Door as u8, Action::On, TimeRef::Sunrise, 0),
        (DeviceId::Door as u8, Action::Off, TimeRef::Sunset, 0),
    ]);
    let sol = solar::solar_compute(2026, 3, 15, LAT, LON).unwrap();
    assert!(sol.sunrise < sol.sunset, "fixture needs a non-wrapping day");

    let mut rig = boot(cfg, true);
    // Boot well before sunrise.
    rig.platform.set_wall_time(2026, 3, 15, 4, 0, 0);

    // Nothing governs the door yet; first sleep goes straight to the
    // earliest anchor of the day.
    let first_wake = rig.sleep_once();
    assert_eq!(first_wake, sol.sunrise);
    assert_eq!(rig.service.door().borrow().state(), DevState::Unknown);

    // Woken at sunrise: the door opens over its travel time.
    let step = rig.run_until_quiescent(20_000);
    assert!(matches!(step, LoopStep::Slept { .. }));
    assert_eq!(rig.service.door().borrow().state(), DevState::On);
    {
        let log = rig.call_log();
        let unlock = log.iter().position(|c| c == "lock.release_dir").unwrap();
        let open = log.iter().position(|c| c == "door.open_dir").unwrap();
        assert!(unlock < open, "unlock must precede motion: {log:?}");
    }

    // Sleep minute-by-minute until sunset; the close must settle and lock.
    let mut guard = 0;
    while rig.platform.rtc.borrow_mut().epoch() / 60 % 1440 < u32::from(sol.sunset) {
        rig.run_until_quiescent(30_000);
        guard += 1;
        assert!(guard < 2000, "never reached sunset");
    }
    rig.run_until_quiescent(30_000);

    let door = rig.service.door();
    assert_eq!(door.borrow().state(), DevState::Off);
    assert_eq!(door.borrow().motion(), DoorMotion::IdleClosed);
    assert_eq!(
        rig.service.devices_mut().get(DeviceId::Lock).unwrap().state(),
        DevState::On
    );
}

#[test]
fn relay_override_persists_then_expires() {
    // Scheduled: relay1 ON at 07:00, OFF at 09:00.
    let cfg = located_config(&[
        (DeviceId::Relay1 as u8, Action::On, TimeRef::Midnight, 7 * 60),
        (DeviceId::Relay1 as u8, Action::Off, TimeRef::Midnight, 9 * 60),
    ]);
    let mut rig = boot(cfg, true);
    rig.platform.set_wall_time(2026, 3, 15, 7, 30, 0);

    // 07:30: schedule applies the ON phase.
    rig.sleep_once();
    assert_eq!(
        rig.service.devices_mut().get(DeviceId::Relay1).unwrap().state(),
        DevState::On
    );

    // 08:00: the operator forces it OFF; that stamps an override.
    rig.service
        .devices_mut()
        .get_mut(DeviceId::Relay1)
        .unwrap()
        .set_state(DevState::Off);

    // Re-evaluations within the same phase must not fight the operator.
    rig.service.scheduler_mut().schedule_touch();
    rig.sleep_once();
    assert_eq!(
        rig.service.devices_mut().get(DeviceId::Relay1).unwrap().state(),
        DevState::Off
    );

    // Walk to 09:00: the new phase postdates the override and wins.
    let mut guard = 0;
    loop {
        rig.sleep_once();
        if rig.platform.minutes_since_midnight() > 9 * 60 {
            break;
        }
        guard += 1;
        assert!(guard < 200, "never reached 09:00");
    }
    assert_eq!(
        rig.service.devices_mut().get(DeviceId::Relay1).unwrap().state(),
        DevState::Off
    );

    // And a later ON phase the next morning applies again.
    let mut guard = 0;
    loop {
        rig.sleep_once();
        let now = rig.platform.minutes_since_midnight();
        let day = rig.platform.get_time().unwrap().day;
        if now > 7 * 60 && day == 16 {
            break;
        }
        guard += 1;
        assert!(guard < 3000, "never reached next 07:00");
    }
    assert_eq!(
        rig.service.devices_mut().get(DeviceId::Relay1).unwrap().state(),
        DevState::On
    );
}

#[test]
fn door_switch_reverses_mid_motion() {
    let cfg = located_config(&[(DeviceId::Door as u8, Action::On, TimeRef::Midnight, 6 * 60)]);
    let mut rig = boot(cfg, true);
    rig.platform.set_wall_time(2026, 3, 15, 6, 0, 30);

    // The 06:00 event governs: door starts opening.
    let step = rig.service.iterate(&mut rig.platform);
    assert_eq!(step, LoopStep::Awake);
    assert_eq!(rig.service.door().borrow().motion(), DoorMotion::MovingOpen);

    // 3 s into an 8 s travel, the coop keeper presses the switch.
    for _ in 0..60 {
        rig.platform.advance_ms(50);
        let _ = rig.service.iterate(&mut rig.platform);
    }
    rig.platform.press_door_switch();
    let _ = rig.service.iterate(&mut rig.platform);

    // Debounce window, then the toggle lands and reverses.
    rig.platform.advance_ms(25);
    let _ = rig.service.iterate(&mut rig.platform);
    assert_eq!(rig.service.door().borrow().motion(), DoorMotion::MovingClose);
    rig.platform.release_door_switch();

    // The reversal runs the full close travel, settles, and locks.
    rig.run_until_quiescent(30_000);
    assert_eq!(rig.service.door().borrow().state(), DevState::Off);
    assert_eq!(rig.service.door().borrow().motion(), DoorMotion::IdleClosed);
}

#[test]
fn alarm_wake_hits_next_event_minute() {
    let cfg = located_config(&[(DeviceId::Relay2 as u8, Action::On, TimeRef::Midnight, 22 * 60 + 15)]);
    let mut rig = boot(cfg, true);
    rig.platform.set_wall_time(2026, 3, 15, 22, 14, 0);

    let wake = rig.sleep_once();
    assert_eq!(wake, 22 * 60 + 15);
    assert_eq!(rig.platform.sleeps, vec![22 * 60 + 15]);
    // Interrupt sources were re-armed on the way out of sleep.
    assert!(rig.platform.rtc_int_enabled);
    assert!(rig.platform.door_int_enabled);

    // The next pass evaluates the woken minute and fires the event.
    assert_eq!(rig.sleep_once(), 22 * 60 + 16);
    assert_eq!(
        rig.service.devices_mut().get(DeviceId::Relay2).unwrap().state(),
        DevState::On
    );
}

#[test]
fn empty_schedule_wakes_next_minute() {
    let cfg = located_config(&[]);
    let mut rig = boot(cfg, true);
    rig.platform.set_wall_time(2026, 3, 15, 10, 0, 0);

    assert_eq!(rig.sleep_once(), 10 * 60 + 1);
    assert_eq!(rig.sleep_once(), 10 * 60 + 2);
}

#[test]
fn corrupt_config_boot_blinks_red() {
    let mut rig = boot(Config::default(), false);
    rig.platform.set_wall_time(2026, 3, 15, 10, 0, 0);

    assert_eq!(rig.service.led().borrow().mode(), LedMode::Blink);
    // The loop still runs and sleeps; the system stays responsive.
    rig.sleep_once();
}

#[test]
fn invalid_rtc_suppresses_scheduling() {
    let cfg = located_config(&[(DeviceId::Relay1 as u8, Action::On, TimeRef::Midnight, 0)]);
    let mut rig = boot(cfg, true);
    // No set_wall_time: the RTC reports invalid.

    let step = rig.service.iterate(&mut rig.platform);
    assert_eq!(step, LoopStep::RtcInvalid);
    assert_eq!(rig.service.led().borrow().mode(), LedMode::Blink);

    // The midnight event must NOT have been applied.
    assert_eq!(
        rig.service.devices_mut().get(DeviceId::Relay1).unwrap().state(),
        DevState::Off // init state, not the scheduled On
    );
}

#[test]
fn mid_minute_schedule_mutation_applies_immediately() {
    let cfg = located_config(&[]);
    let mut rig = boot(cfg, true);
    rig.platform.set_wall_time(2026, 3, 15, 14, 22, 10);

    // CONFIG mode keeps the loop awake so the minute never rolls.
    rig.platform.config_switch = true;
    let step = rig.service.iterate(&mut rig.platform);
    assert_eq!(step, LoopStep::ConfigMode);
    assert_eq!(rig.service.door().borrow().motion(), DoorMotion::IdleUnknown);

    // Mid-minute the operator adds a door-open rule that already governs.
    let now_minute = rig.platform.minutes_since_midnight();
    let cfg_handle = rig.service.config();
    cfg_handle
        .borrow_mut()
        .events
        .add(
            Event {
                refnum: 0,
                device_id: DeviceId::Door as u8,
                action: Action::On,
                when: When { reference: TimeRef::Midnight, offset_minutes: now_minute as i16 },
            },
            rig.service.scheduler_mut(),
        )
        .unwrap();

    // Same minute, but the ETag moved: the loop re-evaluates immediately.
    let step = rig.service.iterate(&mut rig.platform);
    assert_eq!(step, LoopStep::ConfigMode);
    assert_eq!(rig.service.door().borrow().motion(), DoorMotion::MovingOpen);
}
