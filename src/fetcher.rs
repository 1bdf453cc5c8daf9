mod direct;
mod ytdlp;

use async_trait::async_trait;
use url::Url;

use crate::{job::JobId, storage::Artifact, Result};

pub use direct::DirectFetcher;
pub use ytdlp::YtdlpExtractor;

/// One acquisition strategy. Implementations own their timeout and
/// clean up after themselves on failure.
#[async_trait]
pub trait Fetcher: Send + Sync {
  async fn fetch(&self, locator: &Url, job: &JobId) -> Result<Artifact>;
}
