use std::{
  io::Write,
  net::{SocketAddr, TcpListener},
  sync::{Arc, Mutex},
};

use axum::Router;

use crate::{config::Config, storage::StorageArea};

pub fn reserve_port() -> (TcpListener, SocketAddr) {
  let listener = TcpListener::bind("127.0.0.1:0").unwrap();
  listener.set_nonblocking(true).unwrap();
  let addr = listener.local_addr().unwrap();
  (listener, addr)
}

pub fn serve_on(listener: TcpListener, app: Router) {
  let server = axum::Server::from_tcp(listener)
    .unwrap()
    .serve(app.into_make_service());
  tokio::spawn(server);
}

// serve `app` on an ephemeral local port
pub fn spawn_server(app: Router) -> SocketAddr {
  let (listener, addr) = reserve_port();
  serve_on(listener, app);
  addr
}

// tracing output collected in memory
#[derive(Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
  pub fn contents(&self) -> String {
    String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
  }
}

impl Write for LogBuffer {
  fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
    self.0.lock().unwrap().extend_from_slice(buf);
    Ok(buf.len())
  }

  fn flush(&mut self) -> std::io::Result<()> {
    Ok(())
  }
}

// capture logs from this thread, which runs every task of a
// current-thread test runtime
pub fn capture_logs() -> (LogBuffer, tracing::subscriber::DefaultGuard) {
  let logs = LogBuffer::default();
  let writer = logs.clone();
  let subscriber = tracing_subscriber::fmt()
    .with_writer(move || writer.clone())
    .with_ansi(false)
    .with_max_level(tracing::Level::DEBUG)
    .finish();
  (logs, tracing::subscriber::set_default(subscriber))
}

pub fn config(storage_dir: &std::path::Path, extra: &[&str]) -> Config {
  use clap::Parser;

  let mut args = vec![
    "media-fetch".to_string(),
    "--storage-dir".to_string(),
    storage_dir.display().to_string(),
  ];
  args.extend(extra.iter().map(|s| s.to_string()));
  Config::parse_from(args)
}

pub async fn storage() -> (tempfile::TempDir, StorageArea) {
  let dir = tempfile::tempdir().unwrap();
  let storage = StorageArea::init(dir.path().join("downloads"))
    .await
    .unwrap();
  (dir, storage)
}

pub fn files_in(storage: &StorageArea) -> Vec<String> {
  let mut names: Vec<_> = std::fs::read_dir(storage.root())
    .unwrap()
    .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
    .collect();
  names.sort();
  names
}

#[cfg(unix)]
pub fn fake_extractor(dir: &std::path::Path, body: &str) -> std::path::PathBuf {
  use std::os::unix::fs::PermissionsExt;

  let path = dir.join("fake-yt-dlp");
  std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
  let mut perms = std::fs::metadata(&path).unwrap().permissions();
  perms.set_mode(0o755);
  std::fs::set_permissions(&path, perms).unwrap();
  path
}

// writes a file named after the output template, like yt-dlp does after
// merging into mp4
#[cfg(unix)]
pub const WRITES_MP4: &str = r#"
while [ "$#" -gt 0 ]; do
  case "$1" in
    --output) out="$2"; shift ;;
  esac
  shift
done
printf 'fake video' > "$(printf '%s' "$out" | sed 's/%(ext)s/mp4/')"
"#;
