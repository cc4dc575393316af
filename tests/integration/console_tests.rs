//! Console flow against the simulated platform.

use coopctl::app::service::LoopStep;
use coopctl::config::{Config, CONFIG_BLOB_LEN};
use coopctl::devices::door::DoorMotion;
use coopctl::devices::{DevState, DeviceId};

use crate::support::boot;

fn enter_config_mode(rig: &mut crate::support::Rig) {
    rig.platform.config_switch = true;
    rig.platform.set_wall_time(2026, 3, 15, 12, 0, 0);
    let step = rig.service.iterate(&mut rig.platform);
    assert_eq!(step, LoopStep::ConfigMode);
    assert!(rig.platform.console_out.contains("console"));
}

#[test]
fn event_lifecycle_through_console() {
    let mut rig = boot(Config::default(), true);
    enter_config_mode(&mut rig);

    rig.platform.type_line("event add door on sunrise -15");
    let _ = rig.service.iterate(&mut rig.platform);
    assert!(rig.platform.console_out.contains("OK refnum 1"), "{}", rig.platform.console_out);

    rig.platform.type_line("event list");
    let _ = rig.service.iterate(&mut rig.platform);
    assert!(rig.platform.console_out.contains("sunrise-15"));

    rig.platform.type_line("event del 1");
    let _ = rig.service.iterate(&mut rig.platform);
    assert!(rig.platform.console_out.contains("OK"));

    rig.platform.type_line("event del 1");
    let _ = rig.service.iterate(&mut rig.platform);
    assert!(rig.platform.console_out.contains("ERROR: refnum not found"));
}

#[test]
fn full_table_reports_error() {
    let mut rig = boot(Config::default(), true);
    enter_config_mode(&mut rig);

    for _ in 0..coopctl::schedule::events::MAX_EVENTS {
        rig.platform.type_line("event add relay1 on midnight 60");
        let _ = rig.service.iterate(&mut rig.platform);
    }
    rig.platform.type_line("event add relay1 on midnight 60");
    let _ = rig.service.iterate(&mut rig.platform);
    assert!(rig.platform.console_out.contains("ERROR: table full"));
}

#[test]
fn save_writes_loadable_blob() {
    let mut rig = boot(Config::default(), true);
    enter_config_mode(&mut rig);

    rig.platform.type_line("set tz -5");
    let _ = rig.service.iterate(&mut rig.platform);
    rig.platform.type_line("event add door on dusk 10");
    let _ = rig.service.iterate(&mut rig.platform);
    rig.platform.type_line("save");
    let _ = rig.service.iterate(&mut rig.platform);

    let blob = rig.store_blob.borrow().clone().expect("blob written");
    assert_eq!(blob.len(), CONFIG_BLOB_LEN);

    let restored = Config::decode(&blob).unwrap();
    assert_eq!(restored.tz_hours, -5);
    let (_, used) = restored.events.view();
    assert_eq!(used, 1);
}

#[test]
fn set_time_converts_local_to_utc() {
    let mut rig = boot(Config::default(), true);
    enter_config_mode(&mut rig);

    // Default config: tz -6, DST honored; July 4 is CDT (-5).
    rig.platform.type_line("set time 2026-07-04 07:00:00");
    let _ = rig.service.iterate(&mut rig.platform);
    assert!(rig.platform.console_out.contains("OK (UTC 2026-07-04 12:00:00)"), "{}", rig.platform.console_out);

    // The RTC now holds UTC; drift anchor recorded.
    use coopctl::app::ports::RtcPort;
    let t = rig.platform.get_time().unwrap();
    assert_eq!((t.hour, t.minute), (12, 0));
    assert_ne!(rig.service.config().borrow().rtc_set_epoch, 0);
}

#[test]
fn manual_device_control() {
    let mut rig = boot(Config::default(), true);
    enter_config_mode(&mut rig);

    rig.platform.type_line("device relay1 on");
    let _ = rig.service.iterate(&mut rig.platform);
    assert_eq!(
        rig.service.devices_mut().get(DeviceId::Relay1).unwrap().state(),
        DevState::On
    );

    rig.platform.type_line("door open");
    let _ = rig.service.iterate(&mut rig.platform);
    assert_eq!(rig.service.door().borrow().motion(), DoorMotion::MovingOpen);

    rig.platform.type_line("bogus");
    let _ = rig.service.iterate(&mut rig.platform);
    assert!(rig.platform.console_out.contains("unknown command"));
}

#[test]
fn location_change_invalidates_solar_cache() {
    let mut rig = boot(Config::default(), true);
    enter_config_mode(&mut rig);

    // First iteration computed today's snapshot.
    let etag_before = rig.service.scheduler_mut().etag();

    rig.platform.type_line("set lat 51.5074");
    let _ = rig.service.iterate(&mut rig.platform);
    assert!(rig.service.scheduler_mut().etag() > etag_before);
    assert!((rig.service.config().borrow().latitude_deg() - 51.5074).abs() < 1e-6);
}
