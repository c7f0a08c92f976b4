use log::{Level, LevelFilter, Log, Metadata, Record};

/// Writes log records to the Workers console.
struct ConsoleLogger;

static LOGGER: ConsoleLogger = ConsoleLogger;

impl Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        match record.level() {
            Level::Error => worker::console_error!("[{}] {}", record.target(), record.args()),
            Level::Warn => worker::console_warn!("[{}] {}", record.target(), record.args()),
            _ => worker::console_log!(
                "{} [{}] {}",
                record.level(),
                record.target(),
                record.args()
            ),
        }
    }

    fn flush(&self) {}
}

/// Install the console logger. Later calls in the same isolate are no-ops.
pub fn init_logger(level: LevelFilter) {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}
