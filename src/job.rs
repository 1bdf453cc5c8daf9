use std::{
  fmt,
  path::PathBuf,
  sync::atomic::{AtomicU64, Ordering},
};

use tracing::{debug, warn};

use crate::error::{Error, ErrorKind};

static JOB_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Unique per run: submission time plus a process-wide sequence number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(String);

impl JobId {
  pub fn generate() -> Self {
    let millis = chrono::Utc::now().timestamp_millis();
    let seq = JOB_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    Self(format!("{millis}-{seq}"))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for JobId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
  DirectCopy,
  DelegatedExtraction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
  Pending,
  Running,
  Succeeded,
  Failed,
}

#[derive(Debug)]
pub struct FetchJob {
  pub id: JobId,
  pub strategy: Strategy,
  status: Status,
  output_path: Option<PathBuf>,
  error: Option<ErrorKind>,
}

impl FetchJob {
  pub fn new(strategy: Strategy) -> Self {
    Self {
      id: JobId::generate(),
      strategy,
      status: Status::Pending,
      output_path: None,
      error: None,
    }
  }

  pub fn status(&self) -> Status {
    self.status
  }

  pub fn output_path(&self) -> Option<&PathBuf> {
    self.output_path.as_ref()
  }

  pub fn error(&self) -> Option<ErrorKind> {
    self.error
  }

  pub fn start(&mut self) {
    self.transition(Status::Pending, Status::Running);
  }

  pub fn succeed(&mut self, path: PathBuf) {
    if self.transition(Status::Running, Status::Succeeded) {
      self.output_path = Some(path);
    }
  }

  pub fn fail(&mut self, err: &Error) {
    if self.transition(Status::Running, Status::Failed) {
      self.error = Some(err.kind());
    }
  }

  fn transition(&mut self, from: Status, to: Status) -> bool {
    if self.status != from {
      warn!(job = %self.id, "ignoring transition {:?} -> {:?}", self.status, to);
      return false;
    }

    debug!(job = %self.id, strategy = ?self.strategy, "{:?} -> {:?}", from, to);
    self.status = to;
    true
  }
}
