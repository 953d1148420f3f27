//! A `log::Log` implementation that routes to stderr, a file, or syslog
//! depending on the `log =` config directive, and serializes output with a
//! mutex so concurrent request workers never interleave partial lines.
//!
//! Grounded on `router-core/src/system/writer/logger.rs` (`TagBasedLogger`,
//! which also implements `log::Log` directly rather than using
//! `env_logger`, because the destination is config-driven) and on
//! `original_source/src/log.c` (`wlog()`'s mutex-guarded single write,
//! `syslog_facility()`'s `local0`..`local7` table).

use std::fs::OpenOptions;
use std::io::Write;

use chrono::Local;
use log::{Level, LevelFilter, Metadata, Record};
use parking_lot::Mutex;

use crate::config::LogTarget;

enum Sink {
    Stderr,
    File(std::fs::File),
    Syslog(Mutex<syslog::Logger<syslog::LoggerBackend, syslog::Formatter3164>>),
}

pub struct HelperLogger {
    sink: Mutex<Sink>,
    ident: String,
    level_filter: LevelFilter,
}

impl HelperLogger {
    pub fn install(target: &LogTarget, debug: u8) -> anyhow::Result<()> {
        let level_filter = debug_to_level_filter(debug);
        let (sink, ident) = match target {
            LogTarget::Stderr => (Sink::Stderr, "acl-helper".to_string()),
            LogTarget::File { ident, path } => {
                let file = OpenOptions::new().create(true).append(true).open(path)?;
                (Sink::File(file), ident.clone())
            }
            LogTarget::Syslog { ident, facility } => {
                let formatter = syslog::Formatter3164 {
                    facility: parse_facility(facility),
                    hostname: None,
                    process: ident.clone(),
                    pid: std::process::id() as i32,
                };
                let logger = syslog::unix(formatter)
                    .map_err(|e| anyhow::anyhow!("syslog connect failed: {e}"))?;
                (Sink::Syslog(Mutex::new(logger)), ident.clone())
            }
        };

        let logger = HelperLogger {
            sink: Mutex::new(sink),
            ident,
            level_filter,
        };
        log::set_max_level(level_filter);
        log::set_boxed_logger(Box::new(logger))
            .map_err(|e| anyhow::anyhow!("logger already installed: {e}"))?;
        Ok(())
    }
}

impl log::Log for HelperLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level_filter
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let mut sink = self.sink.lock();
        match &mut *sink {
            Sink::Stderr => {
                eprintln!(
                    "{} [{}] {}: {}",
                    Local::now().format("%Y-%m-%d %H:%M:%S"),
                    self.ident,
                    record.level(),
                    record.args()
                );
            }
            Sink::File(file) => {
                let _ = writeln!(
                    file,
                    "{} [{}] {}: {}",
                    Local::now().format("%Y-%m-%d %H:%M:%S"),
                    self.ident,
                    record.level(),
                    record.args()
                );
            }
            Sink::Syslog(logger) => {
                let mut logger = logger.lock();
                let message = record.args().to_string();
                let _ = match record.level() {
                    Level::Error => logger.err(message),
                    Level::Warn => logger.warning(message),
                    Level::Info => logger.info(message),
                    Level::Debug | Level::Trace => logger.debug(message),
                };
            }
        }
    }

    fn flush(&self) {
        if let Sink::File(file) = &mut *self.sink.lock() {
            let _ = file.flush();
        }
    }
}

/// `debug = 0..10` maps onto `log`'s five-level scheme: 0 keeps warnings
/// and errors only, 1-2 adds info, 3+ folds the original's fine-grained
/// `L_DEBUG0`..`L_DEBUG9` namespace into a single `Trace` level.
fn debug_to_level_filter(debug: u8) -> LevelFilter {
    match debug {
        0 => LevelFilter::Warn,
        1 | 2 => LevelFilter::Info,
        _ => LevelFilter::Trace,
    }
}

fn parse_facility(name: &str) -> syslog::Facility {
    match name {
        "local0" => syslog::Facility::LOG_LOCAL0,
        "local1" => syslog::Facility::LOG_LOCAL1,
        "local2" => syslog::Facility::LOG_LOCAL2,
        "local3" => syslog::Facility::LOG_LOCAL3,
        "local4" => syslog::Facility::LOG_LOCAL4,
        "local5" => syslog::Facility::LOG_LOCAL5,
        "local6" => syslog::Facility::LOG_LOCAL6,
        "local7" => syslog::Facility::LOG_LOCAL7,
        _ => syslog::Facility::LOG_LOCAL0,
    }
}
