use std::{path::PathBuf, time::Duration};

use axum::{
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use serde::Serialize;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
  #[error("invalid locator: {0}")]
  InvalidLocator(String),

  #[error("remote fetch of {url} failed: {source}")]
  RemoteUnreachable {
    url: String,
    #[source]
    source: reqwest::Error,
  },

  #[error("writing {path} failed: {source}")]
  WriteFailed {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to launch {program}: {reason}")]
  ProcessSpawnFailed { program: String, reason: String },

  #[error("extractor exited with {}: {stderr}", display_code(.code))]
  ProcessExitedNonZero { code: Option<i32>, stderr: String },

  #[error("extractor reported success but {} does not exist", .expected.display())]
  OutputMissing { expected: PathBuf },

  #[error("gave up after {0:?}")]
  Timeout(Duration),
}

fn display_code(code: &Option<i32>) -> String {
  match code {
    Some(code) => format!("code {code}"),
    None => "no exit code (killed by signal)".to_string(),
  }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  InvalidLocator,
  RemoteUnreachable,
  WriteFailed,
  ProcessSpawnFailed,
  ProcessExitedNonZero,
  OutputMissing,
  Timeout,
}

impl Error {
  pub fn kind(&self) -> ErrorKind {
    match self {
      Error::InvalidLocator(_) => ErrorKind::InvalidLocator,
      Error::RemoteUnreachable { .. } => ErrorKind::RemoteUnreachable,
      Error::WriteFailed { .. } => ErrorKind::WriteFailed,
      Error::ProcessSpawnFailed { .. } => ErrorKind::ProcessSpawnFailed,
      Error::ProcessExitedNonZero { .. } => ErrorKind::ProcessExitedNonZero,
      Error::OutputMissing { .. } => ErrorKind::OutputMissing,
      Error::Timeout(_) => ErrorKind::Timeout,
    }
  }

  pub fn status(&self) -> StatusCode {
    match self {
      Error::InvalidLocator(_) => StatusCode::BAD_REQUEST,
      Error::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
      _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }

  // What a client gets to see. Server-side detail (paths, stderr of the
  // extractor) stays in the log.
  pub fn public_message(&self) -> String {
    match self {
      Error::InvalidLocator(reason) => format!("invalid locator: {reason}"),
      Error::RemoteUnreachable { .. } => {
        "failed to download from the provided URL".to_string()
      }
      Error::WriteFailed { .. } => "failed to save the file".to_string(),
      Error::ProcessSpawnFailed { .. } => {
        "video extractor is not available".to_string()
      }
      Error::ProcessExitedNonZero { .. } => {
        "video extraction failed".to_string()
      }
      Error::OutputMissing { .. } => {
        "video extraction produced no file".to_string()
      }
      Error::Timeout(_) => "download took too long".to_string(),
    }
  }

  pub(crate) fn write_failed(
    path: impl Into<PathBuf>,
  ) -> impl FnOnce(std::io::Error) -> Error {
    let path = path.into();
    move |source| Error::WriteFailed { path, source }
  }
}

#[derive(Serialize)]
struct ErrorBody {
  error: String,
  kind: ErrorKind,
}

impl IntoResponse for Error {
  fn into_response(self) -> Response {
    let body = ErrorBody {
      error: self.public_message(),
      kind: self.kind(),
    };
    (self.status(), Json(body)).into_response()
  }
}
