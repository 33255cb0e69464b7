use log::{LevelFilter, Metadata, Record, SetLoggerError};

/// Writes `(LEVEL) target - message` lines to stderr, keeping stdout free for
/// the printed tables.
pub struct ConfigLogger;

impl ConfigLogger {
    pub fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        log::set_max_level(level);
        log::set_logger(&ConfigLogger)
    }

    fn format(record: &Record) -> String {
        format!(
            "({}) {} - {}",
            record.level(),
            record.target(),
            record.args()
        )
    }
}

impl log::Log for ConfigLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!("{}", Self::format(record));
        }
    }

    fn flush(&self) {}
}
