//! Coop controller entry point.
//!
//! Boot order mirrors the hardware bring-up: logging, configuration (with
//! defaults and a red blink on corruption), device graph, then the
//! control loop forever. The host build talks on stdin/stdout and logs
//! its actuators; the `espidf` build drives the real board.

#![deny(unused_must_use)]

use anyhow::Result;
use log::{info, warn};

use coopctl::app::service::{CoopService, HardwareBundle, LoopStep};
use coopctl::config::Config;

#[cfg(not(target_os = "espidf"))]
fn main() -> Result<()> {
    use std::cell::RefCell;
    use std::rc::Rc;

    use coopctl::adapters::host::{
        FileConfigStore, HostDelay, HostPlatform, HostRtc, LogDoorHw, LogLedHw, LogLockHw,
        LogRelayHw,
    };

    coopctl::logger::init();
    info!("coopctl v{} (host build)", env!("CARGO_PKG_VERSION"));

    let mut store = FileConfigStore::new("coopctl.cfg");
    let (config, config_ok) = match Config::load(&mut store) {
        Ok(cfg) => (cfg, true),
        Err(e) => {
            warn!("config load failed ({e}), using defaults");
            (Config::default(), false)
        }
    };

    let rtc = Rc::new(RefCell::new(HostRtc::new()));

    let hw = HardwareBundle {
        door: Box::new(LogDoorHw),
        lock: Box::new(LogLockHw),
        led: Box::new(LogLedHw::default()),
        relay1: Box::new(LogRelayHw("relay1")),
        relay2: Box::new(LogRelayHw("relay2")),
        door_delay: Box::new(HostDelay),
        epoch: rtc.clone(),
    };

    let mut service = CoopService::new(config, config_ok, hw, Box::new(store));
    let mut platform = HostPlatform::new(rtc);

    loop {
        let step = service.iterate(&mut platform);
        if let LoopStep::Slept { wake_minute } = step {
            info!("woke for minute {:02}:{:02}", wake_minute / 60, wake_minute % 60);
        }
        // The host console never sleeps; don't spin the CPU.
        std::thread::sleep(std::time::Duration::from_millis(10));
    }
}

#[cfg(target_os = "espidf")]
fn main() -> Result<()> {
    use std::cell::RefCell;
    use std::rc::Rc;

    use coopctl::adapters::ds3231::Ds3231;
    use coopctl::adapters::esp::{
        self, EspDoorHw, EspDelay, EspI2cBus, EspLedHw, EspLockHw, EspPlatform, EspRelayHw,
        NvsConfigStore,
    };

    esp_idf_svc::sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();
    info!("coopctl v{}", env!("CARGO_PKG_VERSION"));

    if !esp::init_gpio() {
        // Without working GPIO there is nothing to control; hold here and
        // let the watchdog decide.
        log::error!("gpio init failed - halting");
        loop {
            std::thread::sleep(std::time::Duration::from_secs(1));
        }
    }
    if !esp::init_isr() {
        log::error!("isr install failed - continuing without door switch");
    }

    let bus = EspI2cBus::new().ok_or_else(|| anyhow::anyhow!("i2c bus init failed"))?;
    let rtc = Rc::new(RefCell::new(Ds3231::new(bus)));
    rtc.borrow_mut().init();

    let mut store: Box<dyn coopctl::app::ports::ConfigStore> = match NvsConfigStore::open() {
        Some(s) => Box::new(s),
        None => {
            warn!("nvs open failed, config will not persist this session");
            Box::new(NullStore)
        }
    };
    let (config, config_ok) = match Config::load(store.as_mut()) {
        Ok(cfg) => (cfg, true),
        Err(e) => {
            warn!("config load failed ({e}), using defaults");
            (Config::default(), false)
        }
    };

    let hw = HardwareBundle {
        door: Box::new(EspDoorHw),
        lock: Box::new(EspLockHw),
        led: Box::new(EspLedHw::new()),
        relay1: Box::new(EspRelayHw::relay1()),
        relay2: Box::new(EspRelayHw::relay2()),
        door_delay: Box::new(EspDelay),
        epoch: rtc.clone(),
    };

    let mut service = CoopService::new(config, config_ok, hw, store);
    let mut platform = EspPlatform::new(rtc);

    loop {
        let _ = service.iterate(&mut platform);
    }
}

/// Stand-in store when NVS is unavailable; loads nothing, saves nowhere.
#[cfg(target_os = "espidf")]
struct NullStore;

#[cfg(target_os = "espidf")]
impl coopctl::app::ports::ConfigStore for NullStore {
    fn load_blob(&mut self, _buf: &mut [u8]) -> Option<usize> {
        None
    }

    fn save_blob(&mut self, _blob: &[u8]) -> bool {
        false
    }
}
