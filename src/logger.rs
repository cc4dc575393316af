//! Minimal logger for the host binary.
//!
//! Writes `LEVEL message` lines to stderr, keeping stdout clean for the
//! console. Level comes from `COOP_LOG` (`error|warn|info|debug|trace`),
//! defaulting to `info`.

use std::io::Write as _;

use log::{Level, LevelFilter, Log, Metadata, Record};

struct StderrLogger;

static LOGGER: StderrLogger = StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let tag = match record.level() {
            Level::Error => "E",
            Level::Warn => "W",
            Level::Info => "I",
            Level::Debug => "D",
            Level::Trace => "T",
        };
        let mut err = std::io::stderr();
        let _ = writeln!(err, "{tag} {}", record.args());
    }

    fn flush(&self) {}
}

/// Install the logger. Safe to call once, early in `main`.
pub fn init() {
    let level = match std::env::var("COOP_LOG").as_deref() {
        Ok("error") => LevelFilter::Error,
        Ok("warn") => LevelFilter::Warn,
        Ok("debug") => LevelFilter::Debug,
        Ok("trace") => LevelFilter::Trace,
        _ => LevelFilter::Info,
    };
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}
