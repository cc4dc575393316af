//! Shared fixture: a booted service wired to recording hardware and the
//! simulated platform.

use std::cell::RefCell;
use std::rc::Rc;

use coopctl::adapters::sim::{
    CallLog, RecDoorHw, RecLedHw, RecLockHw, RecRelayHw, SimDelay, SimPlatform, SimStore,
};
use coopctl::app::service::{CoopService, HardwareBundle, LoopStep};
use coopctl::config::Config;

pub struct Rig {
    pub service: CoopService,
    pub platform: SimPlatform,
    pub calls: CallLog,
    pub store_blob: Rc<RefCell<Option<Vec<u8>>>>,
}

pub fn boot(config: Config, config_ok: bool) -> Rig {
    let platform = SimPlatform::new();
    let calls: CallLog = Rc::new(RefCell::new(Vec::new()));

    let store = SimStore::default();
    let store_blob = Rc::clone(&store.blob);

    let hw = HardwareBundle {
        door: Box::new(RecDoorHw::new(Rc::clone(&calls))),
        lock: Box::new(RecLockHw::new(Rc::clone(&calls))),
        led: Box::new(RecLedHw::default()),
        relay1: Box::new(RecRelayHw::new("relay1", Rc::clone(&calls))),
        relay2: Box::new(RecRelayHw::new("relay2", Rc::clone(&calls))),
        door_delay: Box::new(SimDelay::new(Rc::clone(&platform.clock))),
        epoch: Rc::clone(&platform.rtc) as Rc<RefCell<dyn coopctl::app::ports::EpochSource>>,
    };

    let service = CoopService::new(config, config_ok, hw, Box::new(store));
    Rig { service, platform, calls, store_blob }
}

impl Rig {
    /// Iterate with small time steps until the loop is willing to sleep
    /// (or gives up another way). Returns the last step.
    pub fn run_until_quiescent(&mut self, max_ms: u64) -> LoopStep {
        let mut spent = 0;
        loop {
            let step = self.service.iterate(&mut self.platform);
            if step != LoopStep::Awake {
                return step;
            }
            self.platform.advance_ms(50);
            spent += 50;
            assert!(spent <= max_ms, "loop never went quiescent within {max_ms} ms");
        }
    }

    /// One iteration; assert it slept and return the wake minute.
    pub fn sleep_once(&mut self) -> u16 {
        match self.service.iterate(&mut self.platform) {
            LoopStep::Slept { wake_minute } => wake_minute,
            other => panic!("expected sleep, got {other:?}"),
        }
    }

    pub fn call_log(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }
}
