use std::path::PathBuf;
use std::str::FromStr;

use tracing::warn;

use crate::model::{parse_clock, Minutes, WindowConfig};

#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub window: WindowConfig,
    /// Compact the WAL once it holds more records than this.
    pub compact_threshold: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            window: WindowConfig::default(),
            compact_threshold: 1000,
        }
    }
}

impl Config {
    /// Read `OTBOOK_*` variables, falling back to defaults for anything
    /// missing or unparseable.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Config::default();

        let clock = |key: &str, fallback: Minutes| match lookup(key) {
            Some(raw) => parse_clock(&raw).unwrap_or_else(|e| {
                warn!("ignoring {key}={raw:?}: {e}");
                fallback
            }),
            None => fallback,
        };

        Self {
            data_dir: lookup("OTBOOK_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            window: WindowConfig {
                day_start: clock("OTBOOK_DAY_START", defaults.window.day_start),
                day_end: clock("OTBOOK_DAY_END", defaults.window.day_end),
                slot_granularity: number(&lookup, "OTBOOK_SLOT_GRANULARITY_MINUTES", defaults.window.slot_granularity),
                slot_width: number(&lookup, "OTBOOK_SLOT_WIDTH_MINUTES", defaults.window.slot_width),
            },
            compact_threshold: number(&lookup, "OTBOOK_COMPACT_THRESHOLD", defaults.compact_threshold),
        }
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("bookings.wal")
    }
}

/// Parse a numeric variable, warning and falling back when it is malformed.
fn number<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, fallback: T) -> T {
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("ignoring {key}={raw:?}: not a valid number");
            fallback
        }),
        None => fallback,
    }
}
