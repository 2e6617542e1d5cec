/// Logs the time between its creation and drop at debug level.
pub struct ScopedTimer {
    name: String,
    start: std::time::Instant,
}

impl ScopedTimer {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            start: std::time::Instant::now(),
        }
    }

    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }
}

impl Drop for ScopedTimer {
    fn drop(&mut self) {
        log::debug!("{}: {:.2?}", self.name, self.start.elapsed());
    }
}
