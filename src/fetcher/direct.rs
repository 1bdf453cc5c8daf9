use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::info;
use url::Url;

use crate::{
  job::JobId,
  locator,
  storage::{Artifact, StorageArea},
  util::redact_credentials,
  Error, Result,
};

use super::Fetcher;

// stream a url's body straight into the storage area.
pub struct DirectFetcher {
  client: reqwest::Client,
  storage: StorageArea,
  timeout: Duration,
}

impl DirectFetcher {
  pub fn new(
    client: reqwest::Client,
    storage: StorageArea,
    timeout: Duration,
  ) -> Self {
    Self {
      client,
      storage,
      timeout,
    }
  }

  async fn download(&self, url: &Url, job: &JobId) -> Result<Artifact> {
    // reqwest errors carry the full url, userinfo included
    let remote = |source: reqwest::Error| Error::RemoteUnreachable {
      url: redact_credentials(url.as_str()),
      source: source.without_url(),
    };

    let resp = self
      .client
      .get(url.clone())
      .send()
      .await
      .and_then(|resp| resp.error_for_status())
      .map_err(remote)?;

    // the temp file goes away on any early return below
    let temp = self.storage.temp_file(job.as_str())?;
    let temp_path = temp.path().to_owned();
    let file = temp
      .as_file()
      .try_clone()
      .map_err(Error::write_failed(&temp_path))?;
    let mut file = tokio::fs::File::from_std(file);

    let mut size = 0u64;
    let mut body = resp.bytes_stream();
    while let Some(chunk) = body.next().await {
      let chunk = chunk.map_err(remote)?;
      file
        .write_all(&chunk)
        .await
        .map_err(Error::write_failed(&temp_path))?;
      size += chunk.len() as u64;
    }
    file.flush().await.map_err(Error::write_failed(&temp_path))?;
    drop(file);

    let preferred = locator::filename_from_url(url);
    let suffixed = locator::with_suffix(&preferred, job.as_str());
    let candidates = vec![
      locator::unreserved(preferred),
      locator::unreserved(suffixed),
    ];
    let filename = self.storage.persist(temp, candidates).await?;

    Ok(Artifact {
      path: self.storage.path_of(&filename),
      filename,
      size,
    })
  }
}

#[async_trait]
impl Fetcher for DirectFetcher {
  async fn fetch(&self, locator: &Url, job: &JobId) -> Result<Artifact> {
    info!(job = %job, "downloading {}", redact_credentials(locator.as_str()));

    let artifact =
      match tokio::time::timeout(self.timeout, self.download(locator, job))
        .await
      {
        Ok(res) => res?,
        Err(_) => return Err(Error::Timeout(self.timeout)),
      };

    info!(
      job = %job,
      "saved {} ({} bytes)", artifact.filename, artifact.size
    );
    Ok(artifact)
  }
}
