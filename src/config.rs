use std::{net::SocketAddr, path::PathBuf, time::Duration};

use clap::Parser;

/// Fetch remote files and videos and serve them back as download links.
#[derive(Parser, Debug, Clone)]
#[command(version, about)]
pub struct Config {
  /// Address the HTTP server binds to.
  #[arg(long, env = "LISTEN_ADDRESS", default_value = "0.0.0.0:3001")]
  pub listen_address: SocketAddr,

  /// Externally reachable base URL used to build download links.
  #[arg(long, env = "PUBLIC_BASE_URL", default_value = "http://localhost:3001")]
  pub public_base_url: String,

  /// Directory holding finished downloads.
  #[arg(long, env = "STORAGE_DIR", default_value = "downloads")]
  pub storage_dir: PathBuf,

  /// Explicit path to the yt-dlp executable.
  #[arg(long, env = "EXTRACTOR_PATH")]
  pub extractor_path: Option<PathBuf>,

  /// Directory searched for a vendored yt-dlp before falling back to PATH.
  #[arg(long, env = "VENDOR_DIR", default_value = "yt-dlp")]
  pub vendor_dir: PathBuf,

  #[arg(long, env = "MAX_HEIGHT", default_value_t = 1080)]
  pub max_height: u32,

  #[arg(long, env = "PREFERRED_CONTAINER", default_value = "mp4")]
  pub preferred_container: String,

  /// Upper bound of extractor processes running at the same time.
  #[arg(
    long,
    env = "YTDLP_CONCURRENCY",
    default_value_t = 2,
    value_parser = clap::value_parser!(u32).range(1..)
  )]
  pub max_concurrent_extractions: u32,

  /// Proxy handed to yt-dlp.
  #[arg(long, env = "YTDLP_PROXY")]
  pub extractor_proxy: Option<String>,

  #[arg(long, env = "FETCH_TIMEOUT_SECS", default_value_t = 600)]
  pub fetch_timeout_secs: u64,

  #[arg(long, env = "EXTRACT_TIMEOUT_SECS", default_value_t = 1800)]
  pub extract_timeout_secs: u64,

  /// Only accept video-host URLs (no direct file downloads).
  #[arg(long, env = "VIDEO_ONLY")]
  pub video_only: bool,
}

impl Config {
  pub fn fetch_timeout(&self) -> Duration {
    Duration::from_secs(self.fetch_timeout_secs)
  }

  pub fn extract_timeout(&self) -> Duration {
    Duration::from_secs(self.extract_timeout_secs)
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn test_defaults() {
    let config = Config::parse_from(["media-fetch"]);

    assert_eq!(config.listen_address.port(), 3001);
    assert_eq!(config.max_height, 1080);
    assert_eq!(config.preferred_container, "mp4");
    assert_eq!(config.storage_dir, PathBuf::from("downloads"));
    assert!(config.extractor_path.is_none());
    assert!(!config.video_only);
  }

  #[test]
  fn test_zero_concurrency_rejected() {
    let res = Config::try_parse_from([
      "media-fetch",
      "--max-concurrent-extractions",
      "0",
    ]);
    assert!(res.is_err());
  }
}
