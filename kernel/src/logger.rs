//! Host logger
//!
//! Writes `[LEVEL] target: message` lines to stderr. The level comes from
//! the `KERNEL_LOG` environment variable (`off`, `error`, `warn`, `info`,
//! `debug`, `trace`) and defaults to `warn`.

use conquer_once::spin::OnceCell;
use log::{LevelFilter, Log, Metadata, Record};
use std::io::Write;

pub static HOST_LOGGER: OnceCell<HostLogger> = OnceCell::uninit();

const LEVEL_VAR: &str = "KERNEL_LOG";

pub struct HostLogger {
    level: LevelFilter,
}

impl HostLogger {
    pub const fn new(level: LevelFilter) -> Self {
        HostLogger { level }
    }

    pub fn level(&self) -> LevelFilter {
        self.level
    }
}

impl Log for HostLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        // Hold the stderr lock so lines from concurrent kernel threads do
        // not interleave.
        let stderr = std::io::stderr();
        let mut out = stderr.lock();
        let _ = writeln!(out, "[{:>5}] {}: {}", record.level(), record.target(), record.args());
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

/// Parse a `KERNEL_LOG` value
pub fn parse_level(value: &str) -> Option<LevelFilter> {
    match value.trim().to_ascii_lowercase().as_str() {
        "off" => Some(LevelFilter::Off),
        "error" => Some(LevelFilter::Error),
        "warn" => Some(LevelFilter::Warn),
        "info" => Some(LevelFilter::Info),
        "debug" => Some(LevelFilter::Debug),
        "trace" => Some(LevelFilter::Trace),
        _ => None,
    }
}

/// Install the host logger; later calls are no-ops
pub fn init() {
    let logger = HOST_LOGGER.get_or_init(|| {
        let level = std::env::var(LEVEL_VAR)
            .ok()
            .and_then(|v| parse_level(&v))
            .unwrap_or(LevelFilter::Warn);
        HostLogger::new(level)
    });
    // Another logger may already be installed by the embedding program.
    if log::set_logger(logger).is_ok() {
        log::set_max_level(logger.level());
    }
}
