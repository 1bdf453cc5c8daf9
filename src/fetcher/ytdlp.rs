use std::{
  ffi::OsString,
  path::{Path, PathBuf},
  process::Stdio,
  time::Duration,
};

use async_trait::async_trait;
use tokio::{
  io::AsyncReadExt,
  process::{ChildStderr, Command},
  sync::Semaphore,
};
use tracing::{debug, info, warn};
use url::Url;

use crate::{
  config::Config,
  job::JobId,
  locator,
  storage::{Artifact, StorageArea},
  util::redact_credentials,
  Error, Result,
};

use super::Fetcher;

const PROGRAM: &str = "yt-dlp";

#[cfg(windows)]
const VENDORED_EXECUTABLE: &str = "yt-dlp.exe";
#[cfg(not(windows))]
const VENDORED_EXECUTABLE: &str = "yt-dlp";

// run yt-dlp to download and merge a video into the storage area.
pub struct YtdlpExtractor {
  storage: StorageArea,
  explicit_path: Option<PathBuf>,
  vendor_dir: PathBuf,
  max_height: u32,
  container: String,
  proxy: Option<String>,
  timeout: Duration,
  // ensure only a limited set of ytdlp processes at a time
  permits: Semaphore,
}

impl YtdlpExtractor {
  pub fn new(config: &Config, storage: StorageArea) -> Self {
    Self {
      storage,
      explicit_path: config.extractor_path.clone(),
      vendor_dir: config.vendor_dir.clone(),
      max_height: config.max_height,
      container: config.preferred_container.clone(),
      proxy: config.extractor_proxy.clone(),
      timeout: config.extract_timeout(),
      permits: Semaphore::new(config.max_concurrent_extractions as usize),
    }
  }

  /// Configured path, then the vendored copy, then whatever PATH has.
  pub fn resolve_binary(&self) -> Option<PathBuf> {
    if let Some(path) = &self.explicit_path {
      return Some(path.clone());
    }

    let vendored = self.vendor_dir.join(VENDORED_EXECUTABLE);
    if vendored.is_file() {
      return Some(vendored);
    }

    which::which(PROGRAM).ok()
  }

  fn format_selector(&self) -> String {
    let h = self.max_height;
    let c = &self.container;
    format!(
      "bv*[height<={h}][ext={c}]+ba/b[height<={h}][ext={c}]/bv*[height<={h}]+ba/b[height<={h}]"
    )
  }

  fn args(&self, template: &Path, url: &Url) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
      "--format".into(),
      self.format_selector().into(),
      "--merge-output-format".into(),
      self.container.clone().into(),
      "--no-playlist".into(),
      "--no-progress".into(),
      "--no-mtime".into(),
    ];

    if let Some(proxy) = &self.proxy {
      args.push("--proxy".into());
      args.push(proxy.into());
    }

    args.push("--output".into());
    args.push(template.into());
    // everything after this is a positional url, never an option
    args.push("--".into());
    args.push(url.as_str().into());
    args
  }

  async fn run(
    &self,
    program: &Path,
    url: &Url,
    stem: &str,
    job: &JobId,
  ) -> Result<Artifact> {
    let filename = format!("{stem}.{}", self.container);
    let template = self.storage.path_of(&format!("{stem}.%(ext)s"));

    let mut cmd = Command::new(program);
    cmd
      .args(self.args(&template, url))
      .stdin(Stdio::null())
      .stdout(Stdio::null())
      .stderr(Stdio::piped())
      .kill_on_drop(true);
    // yt-dlp forks ffmpeg; a group lets us take both down
    #[cfg(unix)]
    cmd.process_group(0);

    if let Some(proxy) = &self.proxy {
      debug!(job = %job, "using proxy: {}", redact_credentials(proxy));
    }

    let spawn_failed = |reason: String| Error::ProcessSpawnFailed {
      program: program.display().to_string(),
      reason,
    };

    let _guard = self
      .permits
      .acquire()
      .await
      .map_err(|_| spawn_failed("extractor pool is closed".into()))?;

    info!(
      job = %job,
      "extracting {} with {}",
      redact_credentials(url.as_str()),
      program.display()
    );
    let mut child = cmd.spawn().map_err(|e| spawn_failed(e.to_string()))?;
    let mut group = ProcessGroup(child.id());
    let stderr = tokio::spawn(read_all(child.stderr.take()));

    let status = tokio::time::timeout(self.timeout, child.wait()).await;
    // nothing the extractor started may keep writing after this point
    group.kill();
    let status = match status {
      Ok(status) => status.map_err(|e| spawn_failed(e.to_string()))?,
      Err(_) => {
        warn!(job = %job, "killing extractor after {:?}", self.timeout);
        if let Err(e) = child.kill().await {
          debug!(job = %job, "extractor already gone: {}", e);
        }
        return Err(Error::Timeout(self.timeout));
      }
    };

    let stderr = stderr.await.unwrap_or_default();
    let stderr = String::from_utf8_lossy(&stderr);
    if !status.success() {
      return Err(Error::ProcessExitedNonZero {
        code: status.code(),
        stderr: stderr.trim().to_string(),
      });
    }

    if detect_error(&stderr) {
      warn!(job = %job, "extractor exited cleanly but reported: {}", stderr);
    }

    // exit status alone says nothing about what got written
    match self.storage.artifact(&filename).await {
      Ok(artifact) => Ok(artifact),
      Err(e) => {
        debug!(job = %job, "expected output {}: {}", filename, e);
        Err(Error::OutputMissing {
          expected: self.storage.path_of(&filename),
        })
      }
    }
  }
}

// process group led by the extractor, SIGKILLed on drop
struct ProcessGroup(Option<u32>);

impl ProcessGroup {
  fn kill(&mut self) {
    if let Some(pid) = self.0.take() {
      kill_group(pid);
    }
  }
}

impl Drop for ProcessGroup {
  fn drop(&mut self) {
    self.kill();
  }
}

#[cfg(unix)]
fn kill_group(pid: u32) {
  // SAFETY: kill(2) takes no pointers; a negative pid targets the group
  let ret = unsafe { libc::kill(-(pid as libc::pid_t), libc::SIGKILL) };
  if ret != 0 {
    debug!("process group {} already gone", pid);
  }
}

#[cfg(not(unix))]
fn kill_group(_pid: u32) {}

async fn read_all(pipe: Option<ChildStderr>) -> Vec<u8> {
  let mut buf = Vec::new();
  if let Some(mut pipe) = pipe {
    if let Err(e) = pipe.read_to_end(&mut buf).await {
      debug!("failed to read extractor stderr: {}", e);
    }
  }
  buf
}

#[async_trait]
impl Fetcher for YtdlpExtractor {
  async fn fetch(&self, locator: &Url, job: &JobId) -> Result<Artifact> {
    if !locator::is_video_url(locator) {
      return Err(Error::InvalidLocator(format!(
        "{} is not a supported video URL",
        redact_credentials(locator.as_str())
      )));
    }

    let program = self.resolve_binary().ok_or_else(|| {
      Error::ProcessSpawnFailed {
        program: PROGRAM.to_string(),
        reason: format!(
          "not configured, not in {} and not in PATH",
          self.vendor_dir.display()
        ),
      }
    })?;

    let stem = format!("{}{job}", locator::EXTRACTED_PREFIX);
    // the process group is dead once run returns, so cleanup is final
    let res = self.run(&program, locator, &stem, job).await;
    match &res {
      Ok(artifact) => {
        info!(job = %job, "extracted {} ({} bytes)", artifact.filename, artifact.size)
      }
      Err(_) => {
        let removed = self.storage.remove_leftovers(&stem).await;
        if removed > 0 {
          debug!(job = %job, "removed {} leftover files", removed);
        }
      }
    }
    res
  }
}

fn detect_error(stderr: &str) -> bool {
  stderr.lines().any(|line| line.starts_with("ERROR:"))
}
