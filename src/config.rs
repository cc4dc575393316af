//! Persistent configuration.
//!
//! Offline system, deterministic behavior, self-describing blob. The
//! stored layout is a contract shared with already-deployed hardware, so
//! the codec serializes field by field in the documented order rather than
//! relying on struct layout:
//!
//! ```text
//! offset size field
//!      0    4 magic            0x434F4F50 'COOP', little-endian
//!      4    1 version          2
//!      5    3 pad
//!      8    4 latitude_e4      i32, degrees × 10000
//!     12    4 longitude_e4     i32, degrees × 10000
//!     16    4 tz_hours         i32, console presentation only
//!     20    1 honor_dst        0/1, console presentation only
//!     21    3 pad
//!     24    4 rtc_set_epoch    u32, drift tracking only
//!     28    2 door_travel_ms
//!     30    2 lock_pulse_ms
//!     32    2 door_settle_ms
//!     34    2 lock_settle_ms
//!     36    2 pad
//!     38   96 events           16 × 6-byte wire events
//!    134    2 checksum         Fletcher-16 over bytes 0..134
//! ```
//!
//! `tz_hours` and `honor_dst` exist for the console's local-time display
//! and input only. They MUST NOT influence scheduling; the scheduler and
//! RTC are strictly UTC.

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::app::ports::ConfigStore;
use crate::error::ConfigError;
use crate::schedule::events::{EventTable, EVENT_WIRE_LEN, MAX_EVENTS};

pub const CONFIG_MAGIC: u32 = 0x434F_4F50; // 'COOP'
pub const CONFIG_VERSION: u8 = 2;

/// Total size of the persisted blob.
pub const CONFIG_BLOB_LEN: usize = 38 + MAX_EVENTS * EVENT_WIRE_LEN + 2;

const EVENTS_OFFSET: usize = 38;
const CHECKSUM_OFFSET: usize = CONFIG_BLOB_LEN - 2;

/// Runtime configuration. Shared across the console, the scheduler and
/// the device state machines through one `Rc<RefCell<_>>` handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Degrees × 10000, north positive.
    pub latitude_e4: i32,
    /// Degrees × 10000, east positive.
    pub longitude_e4: i32,

    /// Timezone offset from UTC in hours; console/UI conversion only.
    pub tz_hours: i32,
    /// Apply the US DST rule to console display/input only.
    pub honor_dst: bool,

    /// UTC epoch of the most recent manual time set; drift reporting only.
    pub rtc_set_epoch: u32,

    // Mechanical timing (physical constants of this build).
    /// Full open or close travel.
    pub door_travel_ms: u16,
    /// Solenoid energize duration.
    pub lock_pulse_ms: u16,
    /// Delay after close before locking.
    pub door_settle_ms: u16,
    /// Time after unlock before motion.
    pub lock_settle_ms: u16,

    /// Declarative scheduler intent.
    pub events: EventTable,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            // 34.4653°N, 93.3628°W
            latitude_e4: 344_653,
            longitude_e4: -933_628,

            tz_hours: -6, // CST
            honor_dst: true,
            rtc_set_epoch: 0,

            door_travel_ms: 8000,
            lock_pulse_ms: 500,
            door_settle_ms: 2000,
            lock_settle_ms: 500,

            events: EventTable::default(),
        }
    }
}

impl Config {
    pub fn latitude_deg(&self) -> f64 {
        f64::from(self.latitude_e4) / 10_000.0
    }

    pub fn longitude_deg(&self) -> f64 {
        f64::from(self.longitude_e4) / 10_000.0
    }

    /// Whether a location has been configured at all; (0, 0) means "never
    /// set" and suppresses solar computation.
    pub fn has_location(&self) -> bool {
        self.latitude_e4 != 0 || self.longitude_e4 != 0
    }

    // ── Blob codec ────────────────────────────────────────────

    pub fn encode(&self) -> [u8; CONFIG_BLOB_LEN] {
        let mut out = [0u8; CONFIG_BLOB_LEN];

        out[0..4].copy_from_slice(&CONFIG_MAGIC.to_le_bytes());
        out[4] = CONFIG_VERSION;
        out[8..12].copy_from_slice(&self.latitude_e4.to_le_bytes());
        out[12..16].copy_from_slice(&self.longitude_e4.to_le_bytes());
        out[16..20].copy_from_slice(&self.tz_hours.to_le_bytes());
        out[20] = u8::from(self.honor_dst);
        out[24..28].copy_from_slice(&self.rtc_set_epoch.to_le_bytes());
        out[28..30].copy_from_slice(&self.door_travel_ms.to_le_bytes());
        out[30..32].copy_from_slice(&self.lock_pulse_ms.to_le_bytes());
        out[32..34].copy_from_slice(&self.door_settle_ms.to_le_bytes());
        out[34..36].copy_from_slice(&self.lock_settle_ms.to_le_bytes());

        let (slots, _) = self.events.view();
        for (i, ev) in slots.iter().enumerate() {
            let off = EVENTS_OFFSET + i * EVENT_WIRE_LEN;
            let mut wire = [0u8; EVENT_WIRE_LEN];
            ev.encode_into(&mut wire);
            out[off..off + EVENT_WIRE_LEN].copy_from_slice(&wire);
        }

        let sum = fletcher16(&out[..CHECKSUM_OFFSET]);
        out[CHECKSUM_OFFSET..].copy_from_slice(&sum.to_le_bytes());
        out
    }

    pub fn decode(blob: &[u8]) -> Result<Config, ConfigError> {
        if blob.len() < CONFIG_BLOB_LEN {
            return Err(ConfigError::Truncated);
        }

        let magic = u32::from_le_bytes(blob[0..4].try_into().unwrap());
        if magic != CONFIG_MAGIC {
            return Err(ConfigError::BadMagic);
        }
        if blob[4] != CONFIG_VERSION {
            return Err(ConfigError::BadVersion);
        }

        let stored = u16::from_le_bytes(blob[CHECKSUM_OFFSET..CONFIG_BLOB_LEN].try_into().unwrap());
        if fletcher16(&blob[..CHECKSUM_OFFSET]) != stored {
            return Err(ConfigError::BadChecksum);
        }

        let mut cfg = Config {
            latitude_e4: i32::from_le_bytes(blob[8..12].try_into().unwrap()),
            longitude_e4: i32::from_le_bytes(blob[12..16].try_into().unwrap()),
            tz_hours: i32::from_le_bytes(blob[16..20].try_into().unwrap()),
            honor_dst: blob[20] != 0,
            rtc_set_epoch: u32::from_le_bytes(blob[24..28].try_into().unwrap()),
            door_travel_ms: u16::from_le_bytes(blob[28..30].try_into().unwrap()),
            lock_pulse_ms: u16::from_le_bytes(blob[30..32].try_into().unwrap()),
            door_settle_ms: u16::from_le_bytes(blob[32..34].try_into().unwrap()),
            lock_settle_ms: u16::from_le_bytes(blob[34..36].try_into().unwrap()),
            events: EventTable::default(),
        };

        cfg.events = decode_events(&blob[EVENTS_OFFSET..EVENTS_OFFSET + MAX_EVENTS * EVENT_WIRE_LEN]);
        Ok(cfg)
    }

    // ── Persistence ───────────────────────────────────────────

    /// Load from storage. On any mismatch the caller gets the error and is
    /// expected to fall back to defaults and flag the operator (blink-red).
    pub fn load(store: &mut dyn ConfigStore) -> Result<Config, ConfigError> {
        let mut buf = [0u8; CONFIG_BLOB_LEN];
        let n = store.load_blob(&mut buf).ok_or(ConfigError::NotFound)?;
        let cfg = Config::decode(&buf[..n])?;
        info!("config: loaded ({} bytes)", n);
        Ok(cfg)
    }

    /// Checksum and write the blob.
    pub fn save(&self, store: &mut dyn ConfigStore) -> bool {
        let blob = self.encode();
        let ok = store.save_blob(&blob);
        if ok {
            info!("config: saved ({} bytes)", blob.len());
        } else {
            warn!("config: save failed");
        }
        ok
    }
}

fn decode_events(raw: &[u8]) -> EventTable {
    use crate::schedule::events::Event;

    // Slot positions and refnums survive the power cycle; from_slots zeroes
    // anything that violates the table invariants.
    let mut slots = [Event::EMPTY; MAX_EVENTS];
    for (i, slot) in slots.iter_mut().enumerate() {
        let wire: [u8; EVENT_WIRE_LEN] =
            raw[i * EVENT_WIRE_LEN..(i + 1) * EVENT_WIRE_LEN].try_into().unwrap();
        *slot = Event::decode(&wire);
    }
    EventTable::from_slots(slots)
}

/// Fletcher-16 checksum, the integrity check shared with stored blobs.
pub fn fletcher16(data: &[u8]) -> u16 {
    let mut sum1: u16 = 0;
    let mut sum2: u16 = 0;
    for &b in data {
        sum1 = (sum1 + u16::from(b)) % 255;
        sum2 = (sum2 + sum1) % 255;
    }
    (sum2 << 8) | sum1
}
