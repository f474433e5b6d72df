use serde::{Deserialize, Serialize};
use std::{
    collections::VecDeque,
    str::FromStr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex, Once, OnceLock,
    },
    time::{SystemTime, UNIX_EPOCH},
};

const LOG_CAPACITY: usize = 500;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogEntry {
    pub level: String,
    pub target: String,
    pub message: String,
    pub timestamp_ms: u128,
}

impl LogEntry {
    fn new(level: log::Level, target: &str, message: String) -> Self {
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();

        Self {
            level: level.to_string(),
            target: target.to_string(),
            message,
            timestamp_ms,
        }
    }
}

struct LogStore {
    entries: VecDeque<LogEntry>,
    capacity: usize,
}

impl LogStore {
    fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn push(&mut self, entry: LogEntry) {
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    fn tail(&self, count: usize) -> Vec<LogEntry> {
        let skip = self.entries.len().saturating_sub(count);
        self.entries.iter().skip(skip).cloned().collect()
    }
}

/// Whether stdout currently ends in a meter line drawn with `\r` and no
/// newline. Anything else printed to the terminal must end it first.
pub struct MeterLine {
    open: AtomicBool,
}

impl MeterLine {
    pub const fn new() -> Self {
        Self {
            open: AtomicBool::new(false),
        }
    }

    pub fn mark_open(&self) {
        self.open.store(true, Ordering::SeqCst);
    }

    /// Returns `true` if a meter line was open; it counts as ended afterwards.
    pub fn take(&self) -> bool {
        self.open.swap(false, Ordering::SeqCst)
    }
}

pub static METER_LINE: MeterLine = MeterLine::new();

/// Terminates an open meter line so the next output starts on a fresh line.
pub fn end_meter_line() {
    if METER_LINE.take() {
        println!();
    }
}

/// Keeps recent records in memory and mirrors them to stderr.
pub struct ConsoleLogger {
    store: Mutex<LogStore>,
    level: log::LevelFilter,
}

impl ConsoleLogger {
    fn new(capacity: usize, level: log::LevelFilter) -> Self {
        Self {
            store: Mutex::new(LogStore::new(capacity)),
            level,
        }
    }

    pub fn recent(&self, count: usize) -> Vec<LogEntry> {
        self.store
            .lock()
            .map(|store| store.tail(count))
            .unwrap_or_default()
    }

    fn push_entry(&self, entry: LogEntry) {
        if let Ok(mut store) = self.store.lock() {
            store.push(entry);
        }
    }
}

impl log::Log for ConsoleLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let entry = LogEntry::new(
            record.level(),
            record.target(),
            format!("{}", record.args()),
        );
        end_meter_line();
        eprintln!("[{} {}] {}", entry.level, entry.target, entry.message);
        self.push_entry(entry);
    }

    fn flush(&self) {}
}

static LOGGER: OnceLock<&'static ConsoleLogger> = OnceLock::new();

fn level_from_env() -> log::LevelFilter {
    std::env::var("PTT_LOG")
        .ok()
        .and_then(|value| log::LevelFilter::from_str(value.trim()).ok())
        .unwrap_or(log::LevelFilter::Info)
}

pub fn init_logging() {
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let level = level_from_env();
        let logger: &'static ConsoleLogger =
            Box::leak(Box::new(ConsoleLogger::new(LOG_CAPACITY, level)));
        let _ = LOGGER.set(logger);
        let _ = log::set_logger(logger);
        log::set_max_level(level);
    });
}

pub fn recent_entries(count: usize) -> Vec<LogEntry> {
    LOGGER
        .get()
        .map(|logger| logger.recent(count))
        .unwrap_or_default()
}
