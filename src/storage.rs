use std::{
  io::ErrorKind,
  path::{Path, PathBuf},
};

use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::Error;

/// Directory holding finished artifacts, served under `/downloads`.
#[derive(Debug, Clone)]
pub struct StorageArea {
  root: PathBuf,
}

/// A finished file inside the storage area.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
  pub filename: String,
  pub path: PathBuf,
  pub size: u64,
}

impl StorageArea {
  pub async fn init(dir: impl AsRef<Path>) -> std::io::Result<Self> {
    let dir = dir.as_ref();
    tokio::fs::create_dir_all(dir).await?;
    let root = tokio::fs::canonicalize(dir).await?;
    info!("storage area ready at {}", root.display());
    Ok(Self { root })
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn path_of(&self, filename: &str) -> PathBuf {
    self.root.join(filename)
  }

  pub async fn artifact(&self, filename: &str) -> std::io::Result<Artifact> {
    let path = self.path_of(filename);
    let meta = tokio::fs::metadata(&path).await?;
    Ok(Artifact {
      filename: filename.to_string(),
      path,
      size: meta.len(),
    })
  }

  /// Hidden scratch file; deleted on drop unless persisted.
  pub fn temp_file(&self, prefix: &str) -> Result<NamedTempFile, Error> {
    tempfile::Builder::new()
      .prefix(&format!(".{prefix}-"))
      .suffix(".part")
      .tempfile_in(&self.root)
      .map_err(Error::write_failed(&self.root))
  }

  /// Move `temp` to the first candidate name not yet taken. Existing
  /// files are never replaced.
  pub async fn persist(
    &self,
    temp: NamedTempFile,
    candidates: Vec<String>,
  ) -> Result<String, Error> {
    let root = self.root.clone();
    tokio::task::spawn_blocking(move || {
      persist_first_free(&root, temp, candidates)
    })
    .await
    .map_err(|e| Error::WriteFailed {
      path: self.root.clone(),
      source: std::io::Error::new(ErrorKind::Other, e),
    })?
  }

  /// Remove files named `<stem>.*`, e.g. `<stem>.f137.mp4.part`.
  pub async fn remove_leftovers(&self, stem: &str) -> usize {
    let mut removed = 0;
    let mut entries = match tokio::fs::read_dir(&self.root).await {
      Ok(entries) => entries,
      Err(e) => {
        warn!("failed to list {}: {}", self.root.display(), e);
        return 0;
      }
    };

    loop {
      let entry = match entries.next_entry().await {
        Ok(Some(entry)) => entry,
        Ok(None) => break,
        Err(e) => {
          warn!("failed to list {}: {}", self.root.display(), e);
          break;
        }
      };
      let name = entry.file_name();
      let Some(name) = name.to_str() else { continue };
      let owned = name
        .strip_prefix(stem)
        .is_some_and(|rest| rest.starts_with('.'));
      if !owned {
        continue;
      }

      match tokio::fs::remove_file(entry.path()).await {
        Ok(()) => {
          debug!("removed leftover {}", name);
          removed += 1;
        }
        Err(e) => warn!("failed to remove leftover {}: {}", name, e),
      }
    }

    removed
  }
}

fn persist_first_free(
  root: &Path,
  mut temp: NamedTempFile,
  candidates: Vec<String>,
) -> Result<String, Error> {
  for name in &candidates {
    let path = root.join(name);
    match temp.persist_noclobber(&path) {
      Ok(_) => return Ok(name.clone()),
      Err(e) if e.error.kind() == ErrorKind::AlreadyExists => {
        debug!("{} already taken", path.display());
        temp = e.file;
      }
      Err(e) => return Err(Error::write_failed(path)(e.error)),
    }
  }

  let last = candidates.last().map(String::as_str).unwrap_or_default();
  Err(Error::WriteFailed {
    path: root.join(last),
    source: ErrorKind::AlreadyExists.into(),
  })
}
