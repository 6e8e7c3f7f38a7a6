use std::time::{Duration, Instant};

/// Scope timer. Logs the elapsed time at debug level when dropped.
pub struct Profile {
  start: Instant,
  name:  String
}

impl Profile {
  pub fn new(name: impl Into<String>) -> Self {
    Self { start: Instant::now(), name: name.into() }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn elapsed(&self) -> Duration {
    self.start.elapsed()
  }
}

impl Drop for Profile {
  fn drop(&mut self) {
    log::debug!(target: "diffset::profile", "{} took {:.2?}", self.name, self.elapsed());
  }
}
