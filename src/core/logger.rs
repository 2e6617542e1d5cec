use anyhow::{anyhow, Result};
use log::{LevelFilter, Log, Metadata, Record};

/// Writes `time level target - message` lines to stderr.
pub struct Logger {
    level: LevelFilter,
}

impl Logger {
    pub fn new(level: LevelFilter) -> Self {
        Self { level }
    }

    /// Installs the logger as the global `log` backend.
    pub fn init(level: LevelFilter) -> Result<()> {
        log::set_boxed_logger(Box::new(Self::new(level)))
            .map_err(|e| anyhow!("Could not install logger: {}", e))?;
        log::set_max_level(level);
        Ok(())
    }

    fn format(record: &Record) -> String {
        format!(
            "{} {:<5} {} - {}",
            chrono::Local::now().format("%H:%M:%S%.3f"),
            record.level(),
            record.target(),
            record.args()
        )
    }
}

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!("{}", Self::format(record));
        }
    }

    fn flush(&self) {}
}
