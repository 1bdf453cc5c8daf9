use serde::Serialize;

use crate::{storage::Artifact, util::human_size};

pub const DOWNLOADS_PREFIX: &str = "/downloads";

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PublishedLink {
  #[serde(rename = "downloadUrl")]
  pub url: String,
  pub filename: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub label: Option<String>,
}

/// Turns artifacts into links under the public base url.
#[derive(Debug, Clone)]
pub struct Publisher {
  base_url: String,
}

impl Publisher {
  pub fn new(public_base_url: &str) -> Self {
    Self {
      base_url: public_base_url.trim_end_matches('/').to_string(),
    }
  }

  pub fn publish(&self, artifact: &Artifact) -> PublishedLink {
    let url = format!(
      "{}{}/{}",
      self.base_url,
      DOWNLOADS_PREFIX,
      urlencoding::encode(&artifact.filename)
    );

    PublishedLink {
      url,
      filename: artifact.filename.clone(),
      label: Some(format!(
        "{} ({})",
        artifact.filename,
        human_size(artifact.size)
      )),
    }
  }
}

#[cfg(test)]
mod test {
  use super::*;

  fn artifact(filename: &str, size: u64) -> Artifact {
    Artifact {
      filename: filename.to_string(),
      path: format!("/srv/downloads/{filename}").into(),
      size,
    }
  }

  #[test]
  fn test_publish() {
    let publisher = Publisher::new("http://localhost:3001");
    let link = publisher.publish(&artifact("report.pdf", 2048));

    assert_eq!(link.url, "http://localhost:3001/downloads/report.pdf");
    assert_eq!(link.filename, "report.pdf");
    assert_eq!(link.label.as_deref(), Some("report.pdf (2.0 KiB)"));
  }

  #[test]
  fn test_trailing_slash_and_encoding() {
    let publisher = Publisher::new("https://files.example.org/");
    let link = publisher.publish(&artifact("my notes #1.txt", 10));

    assert_eq!(
      link.url,
      "https://files.example.org/downloads/my%20notes%20%231.txt"
    );
  }

  #[test]
  fn test_payload_shape() {
    let publisher = Publisher::new("http://localhost:3001");
    let link = publisher.publish(&artifact("a.bin", 1));
    let json = serde_json::to_value(link).unwrap();

    assert_eq!(json["downloadUrl"], "http://localhost:3001/downloads/a.bin");
    assert_eq!(json["filename"], "a.bin");
    assert_eq!(json["label"], "a.bin (1 B)");
  }
}
