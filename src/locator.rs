use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::{util::redact_credentials, Error, Result};

pub const DEFAULT_FILENAME: &str = "downloaded-file";

/// Names starting with this (in any case) belong to extractor output.
pub const EXTRACTED_PREFIX: &str = "video-";

// host + path shapes the extractor is trusted with.
static VIDEO_HOST_REGEX: Lazy<Regex> = Lazy::new(|| {
  Regex::new(
    r"(?x)^
    (?:
      (?:www\.|m\.|music\.)?youtube\.com/(?:watch\?(?:.*&)?v=|shorts/|embed/|live/)[\w-]{6,}
      | youtu\.be/[\w-]{6,}
      | (?:www\.)?vimeo\.com/\d+
      | (?:www\.)?dailymotion\.com/video/\w+
    )",
  )
  .expect("video host regex is hard-coded, thus must be valid")
});

/// Parse a user-supplied locator into an absolute URL with a host.
pub fn parse(locator: &str) -> Result<Url> {
  let locator = locator.trim();
  if locator.is_empty() {
    return Err(Error::InvalidLocator("URL is required".into()));
  }

  let shown = redact_credentials(locator);
  let url = Url::parse(locator)
    .map_err(|e| Error::InvalidLocator(format!("{shown:?}: {e}")))?;

  if !url.has_host() {
    return Err(Error::InvalidLocator(format!("{shown:?} has no host")));
  }

  Ok(url)
}

pub fn is_video_url(url: &Url) -> bool {
  if !matches!(url.scheme(), "http" | "https") {
    return false;
  }

  let Some(host) = url.host_str() else {
    return false;
  };

  let mut target = host.to_ascii_lowercase();
  target.push_str(url.path());
  if let Some(query) = url.query() {
    target.push('?');
    target.push_str(query);
  }

  VIDEO_HOST_REGEX.is_match(&target)
}

/// Filename derived from the last path segment of `url`.
pub fn filename_from_url(url: &Url) -> String {
  let segment = url
    .path_segments()
    .and_then(|mut segs| segs.next_back())
    .unwrap_or_default();

  let decoded = urlencoding::decode(segment)
    .map(|s| s.into_owned())
    .unwrap_or_else(|_| segment.to_string());

  let name = sanitize_filename::sanitize(decoded.trim());
  if name.is_empty() {
    DEFAULT_FILENAME.to_string()
  } else {
    name
  }
}

/// `report.pdf` -> `report-<suffix>.pdf`
pub fn with_suffix(filename: &str, suffix: &str) -> String {
  match filename.rsplit_once('.') {
    Some((stem, ext)) if !stem.is_empty() => format!("{stem}-{suffix}.{ext}"),
    _ => format!("{filename}-{suffix}"),
  }
}

/// Move a direct-download name out of the extractor's namespace.
pub fn unreserved(filename: String) -> String {
  let reserved = filename
    .get(..EXTRACTED_PREFIX.len())
    .is_some_and(|head| head.eq_ignore_ascii_case(EXTRACTED_PREFIX));
  if reserved {
    format!("_{filename}")
  } else {
    filename
  }
}

#[cfg(test)]
mod test {
  use super::*;

  fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
  }

  #[test]
  fn test_parse() {
    assert!(parse("https://example.com/files/report.pdf").is_ok());
    assert!(parse("  https://example.com/  ").is_ok());

    for bad in ["", "   ", "not-a-url", "/files/report.pdf", "mailto:a@b.c"] {
      let res = parse(bad);
      assert!(
        matches!(res, Err(Error::InvalidLocator(_))),
        "{bad:?} should be rejected"
      );
    }
  }

  #[test]
  fn test_video_urls() {
    let videos = [
      "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
      "https://youtube.com/watch?feature=share&v=dQw4w9WgXcQ",
      "https://m.youtube.com/watch?v=dQw4w9WgXcQ",
      "https://www.youtube.com/shorts/abcdefghijk",
      "https://youtu.be/dQw4w9WgXcQ",
      "https://vimeo.com/76979871",
      "https://www.dailymotion.com/video/x7tgad0",
    ];
    for v in videos {
      assert!(is_video_url(&url(v)), "{v} should be a video url");
    }

    let others = [
      "https://example.com/files/report.pdf",
      "https://www.youtube.com/",
      "https://www.youtube.com/channel/UC1yNl2E66ZzKApQdRuTQ4tw",
      "https://youtube.com.evil.example/watch?v=dQw4w9WgXcQ",
      "https://evil.example/youtube.com/watch?v=dQw4w9WgXcQ",
      "ftp://youtu.be/dQw4w9WgXcQ",
    ];
    for o in others {
      assert!(!is_video_url(&url(o)), "{o} should not be a video url");
    }
  }

  #[test]
  fn test_filename_from_url() {
    let cases = [
      ("https://example.com/files/report.pdf", "report.pdf"),
      ("https://example.com/files/report.pdf?x=1#top", "report.pdf"),
      ("https://example.com/my%20notes.txt", "my notes.txt"),
      ("https://example.com/a%2F..%2Fb.txt", "a..b.txt"),
      ("https://example.com/", DEFAULT_FILENAME),
      ("https://example.com", DEFAULT_FILENAME),
      ("https://example.com/dir/", DEFAULT_FILENAME),
      ("https://example.com/..", DEFAULT_FILENAME),
    ];
    for (input, expected) in cases {
      assert_eq!(filename_from_url(&url(input)), expected, "{input}");
    }
  }

  #[test]
  fn test_with_suffix() {
    assert_eq!(with_suffix("report.pdf", "7"), "report-7.pdf");
    assert_eq!(with_suffix("archive.tar.gz", "7"), "archive.tar-7.gz");
    assert_eq!(with_suffix("downloaded-file", "7"), "downloaded-file-7");
    assert_eq!(with_suffix(".bashrc", "7"), ".bashrc-7");
  }

  #[test]
  fn test_unreserved() {
    assert_eq!(unreserved("report.pdf".into()), "report.pdf");
    assert_eq!(unreserved("video-17-3.mp4".into()), "_video-17-3.mp4");
    assert_eq!(unreserved("VIDEO-17-3.mp4".into()), "_VIDEO-17-3.mp4");
    assert_eq!(unreserved("videos.zip".into()), "videos.zip");
    // a suffixed name can land in the reserved namespace too
    assert_eq!(
      unreserved(with_suffix("video.mp4", "17-3")),
      "_video-17-3.mp4"
    );
  }
}
