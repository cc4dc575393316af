//! Interactive line console.
//!
//! Entered when the configuration slide switch is asserted; polled
//! non-blocking from the main loop. Commands view and edit wall time,
//! location, mechanical timings and the schedule, and drive devices by
//! hand.
//!
//! Two boundary rules hold throughout:
//!
//! - The console talks to the schedule ONLY through the event-store
//!   mutators, so every change bumps the scheduler ETag.
//! - All timezone/DST handling lives here. Input is accepted in local
//!   civil time and converted to UTC before it reaches the RTC; display
//!   converts back. Nothing below this layer sees local time.

mod cmds;

use std::cell::RefCell;
use std::rc::Rc;

use heapless::String as LineBuf;
use heapless::Vec as ArgVec;

use crate::app::ports::{ConfigStore, Platform};
use crate::config::Config;
use crate::devices::door::DoorDevice;
use crate::devices::led::LedMachine;
use crate::devices::DeviceRegistry;
use crate::schedule::Scheduler;

const LINE_CAP: usize = 96;
const MAX_ARGS: usize = 8;

const PROMPT: &str = "coop> ";

/// Command names and one-line summaries for `help`.
const COMMANDS: &[(&str, &str)] = &[
    ("help", "list commands"),
    ("version", "firmware version"),
    ("time", "show UTC and local time"),
    ("set", "set time/location/timezone/mechanical values"),
    ("show", "print configuration"),
    ("solar", "today's solar anchors"),
    ("schedule", "list events with resolved times"),
    ("event", "add/del/clear schedule events"),
    ("device", "show or drive a device"),
    ("door", "door open|close|toggle"),
    ("lock", "lock engage|release"),
    ("led", "led off|on|blink|pulse [red|green]"),
    ("save", "persist configuration"),
    ("defaults", "restore default configuration (RAM only)"),
];

/// Console state: one bounded line buffer plus handles to the two
/// machines whose rich commands (toggle, blink/pulse) are not part of the
/// generic device capability set.
pub struct Console {
    line: LineBuf<LINE_CAP>,
    prompted: bool,
    door: Rc<RefCell<DoorDevice>>,
    led: Rc<RefCell<LedMachine>>,
}

impl Console {
    pub fn new(door: Rc<RefCell<DoorDevice>>, led: Rc<RefCell<LedMachine>>) -> Self {
        Self { line: LineBuf::new(), prompted: false, door, led }
    }

    /// Greeting printed on entry to CONFIG mode.
    pub fn begin(&mut self, p: &mut impl Platform) {
        self.line.clear();
        self.prompted = false;
        p.write("\r\ncoop controller console ('help' for commands)\r\n");
    }

    /// Farewell printed when the switch drops back to RUN.
    pub fn end(&mut self, p: &mut impl Platform) {
        p.write("\r\nexiting console\r\n");
        self.line.clear();
        self.prompted = false;
    }

    /// Drain pending input; dispatch at most one command per completed
    /// line. Non-blocking.
    pub fn poll(
        &mut self,
        p: &mut impl Platform,
        cfg: &Rc<RefCell<Config>>,
        sched: &mut Scheduler,
        devices: &mut DeviceRegistry,
        store: &mut dyn ConfigStore,
    ) {
        if !self.prompted {
            p.write(PROMPT);
            self.prompted = true;
        }

        while let Some(byte) = p.read_byte() {
            match byte {
                b'\r' | b'\n' => {
                    p.write("\r\n");
                    if !self.line.is_empty() {
                        let line = self.line.clone();
                        self.line.clear();
                        self.dispatch(line.as_str(), p, cfg, sched, devices, store);
                    }
                    p.write(PROMPT);
                }

                // Backspace / delete.
                0x08 | 0x7F => {
                    if self.line.pop().is_some() {
                        p.write("\u{8} \u{8}");
                    }
                }

                b' '..=b'~' => {
                    if self.line.push(byte as char).is_ok() {
                        let mut echo = [0u8; 4];
                        p.write((byte as char).encode_utf8(&mut echo));
                    }
                }

                _ => {} // ignore other control bytes
            }
        }
    }

    fn dispatch(
        &mut self,
        line: &str,
        p: &mut impl Platform,
        cfg: &Rc<RefCell<Config>>,
        sched: &mut Scheduler,
        devices: &mut DeviceRegistry,
        store: &mut dyn ConfigStore,
    ) {
        let mut argv: ArgVec<&str, MAX_ARGS> = ArgVec::new();
        for word in line.split_whitespace() {
            if argv.push(word).is_err() {
                p.write("ERROR: too many arguments\r\n");
                return;
            }
        }
        let Some(&cmd) = argv.first() else { return };

        match cmd {
            "help" => {
                for (name, summary) in COMMANDS {
                    p.write(&format!("  {name:<10} {summary}\r\n"));
                }
            }
            "version" => {
                p.write(concat!("coopctl ", env!("CARGO_PKG_VERSION"), "\r\n"));
            }
            "time" => cmds::cmd_time(p, cfg),
            "set" => cmds::cmd_set(p, &argv, cfg, sched),
            "show" => cmds::cmd_show(p, cfg),
            "solar" => cmds::cmd_solar(p, cfg, sched),
            "schedule" => cmds::cmd_schedule(p, cfg, sched, devices),
            "event" => cmds::cmd_event(p, &argv, cfg, sched, devices),
            "device" => cmds::cmd_device(p, &argv, devices),
            "door" => cmds::cmd_door(p, &argv, &self.door),
            "lock" => cmds::cmd_lock(p, &argv, devices),
            "led" => cmds::cmd_led(p, &argv, &self.led),
            "save" => {
                if cfg.borrow().save(store) {
                    p.write("OK\r\n");
                } else {
                    p.write("ERROR\r\n");
                }
            }
            "defaults" => {
                *cfg.borrow_mut() = Config::default();
                sched.invalidate_solar();
                p.write("OK (in RAM; 'save' to persist)\r\n");
            }
            _ => p.write("ERROR: unknown command ('help')\r\n"),
        }
    }
}
