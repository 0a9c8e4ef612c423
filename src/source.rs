//! Source URL classification and canonicalization
//!
//! Incoming URLs are untrusted. Primary-platform URLs are reduced to their
//! 11-character video id and rewritten to a single watch form, so that
//! playlist/radio/position context does not produce distinct identities.
//! Secondary platforms are accepted by domain only.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;
use thiserror::Error;
use url::Url;

use crate::config::SourcesConfig;

static VIDEO_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{11}$").expect("valid video id pattern"));

/// Path prefixes that carry the video id as the next segment
const ID_PATH_PREFIXES: &[&str] = &["embed", "v", "shorts", "live", "e"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UrlError {
    #[error("URL is empty")]
    Empty,

    #[error("URL could not be parsed: {0}")]
    Malformed(String),

    #[error("unsupported source: {0}")]
    UnsupportedSource(String),

    #[error("no video id found in {0}")]
    MissingVideoId(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Primary,
    Secondary,
}

/// A validated source URL identifying exactly one video
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalUrl {
    pub kind: SourceKind,
    pub url: String,
    /// Present for primary-platform URLs only
    pub video_id: Option<String>,
}

impl CanonicalUrl {
    pub fn as_str(&self) -> &str {
        &self.url
    }
}

impl fmt::Display for CanonicalUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

/// Classifies and normalizes source URLs against the configured host lists
#[derive(Debug, Clone)]
pub struct Canonicalizer {
    primary_hosts: Vec<String>,
    canonical_host: String,
    secondary_hosts: Vec<String>,
}

impl Canonicalizer {
    pub fn new(config: &SourcesConfig) -> Self {
        let normalize = |hosts: &[String]| {
            hosts
                .iter()
                .map(|h| h.trim().trim_start_matches("www.").to_ascii_lowercase())
                .filter(|h| !h.is_empty())
                .collect::<Vec<_>>()
        };

        Self {
            primary_hosts: normalize(&config.primary_hosts),
            canonical_host: config.canonical_host.trim().to_ascii_lowercase(),
            secondary_hosts: normalize(&config.secondary_hosts),
        }
    }

    pub fn canonicalize(&self, raw: &str) -> Result<CanonicalUrl, UrlError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(UrlError::Empty);
        }

        // Pasted links frequently omit the scheme
        let with_scheme = if raw.contains("://") {
            raw.to_string()
        } else {
            format!("https://{raw}")
        };

        let parsed = Url::parse(&with_scheme).map_err(|e| UrlError::Malformed(e.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(UrlError::UnsupportedSource(raw.to_string()));
        }

        let host = parsed
            .host_str()
            .map(str::to_ascii_lowercase)
            .ok_or_else(|| UrlError::Malformed(raw.to_string()))?;

        if host_matches(&host, &self.primary_hosts) {
            let video_id = extract_video_id(&parsed)
                .ok_or_else(|| UrlError::MissingVideoId(raw.to_string()))?;

            return Ok(CanonicalUrl {
                kind: SourceKind::Primary,
                url: format!("https://{}/watch?v={}", self.canonical_host, video_id),
                video_id: Some(video_id),
            });
        }

        if host_matches(&host, &self.secondary_hosts) {
            return Ok(CanonicalUrl {
                kind: SourceKind::Secondary,
                url: parsed.to_string(),
                video_id: None,
            });
        }

        Err(UrlError::UnsupportedSource(host))
    }
}

fn host_matches(host: &str, allowed: &[String]) -> bool {
    allowed
        .iter()
        .any(|a| host == a || host.ends_with(&format!(".{a}")))
}

/// Finds the video id in `?v=`, short-link (`/ID`), or `/embed|v|shorts|live/ID` shapes
fn extract_video_id(url: &Url) -> Option<String> {
    let from_query = url
        .query_pairs()
        .find(|(k, _)| k == "v")
        .map(|(_, v)| v.into_owned());
    if let Some(id) = from_query.filter(|id| VIDEO_ID.is_match(id)) {
        return Some(id);
    }

    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();

    match segments.as_slice() {
        [id] if VIDEO_ID.is_match(id) => Some(id.to_string()),
        [prefix, id, ..] if ID_PATH_PREFIXES.contains(prefix) && VIDEO_ID.is_match(id) => {
            Some(id.to_string())
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn youtube() -> Canonicalizer {
        Canonicalizer::new(&SourcesConfig::default())
    }

    fn example_platform() -> Canonicalizer {
        Canonicalizer::new(&SourcesConfig {
            primary_hosts: vec!["example-video.com".to_string()],
            canonical_host: "example-video.com".to_string(),
            secondary_hosts: vec![],
        })
    }

    #[test]
    fn test_playlist_context_collapses() {
        let c = example_platform();
        let with_list = c
            .canonicalize("https://example-video.com/watch?v=ABCDEFGHIJK&list=XYZ&index=3")
            .unwrap();
        let plain = c
            .canonicalize("https://example-video.com/watch?v=ABCDEFGHIJK")
            .unwrap();

        assert_eq!(with_list, plain);
        assert_eq!(plain.as_str(), "https://example-video.com/watch?v=ABCDEFGHIJK");
    }

    #[test]
    fn test_accepted_path_shapes() {
        let c = youtube();
        let expected = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";

        for raw in [
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "https://youtube.com/watch?feature=share&v=dQw4w9WgXcQ&start_radio=1",
            "https://m.youtube.com/watch?v=dQw4w9WgXcQ&t=42",
            "https://music.youtube.com/watch?v=dQw4w9WgXcQ&list=RDAMVM",
            "https://youtu.be/dQw4w9WgXcQ?si=abc",
            "https://www.youtube.com/embed/dQw4w9WgXcQ",
            "https://www.youtube.com/shorts/dQw4w9WgXcQ",
            "youtube.com/watch?v=dQw4w9WgXcQ",
        ] {
            let canonical = c.canonicalize(raw).unwrap();
            assert_eq!(canonical.as_str(), expected, "input: {raw}");
            assert_eq!(canonical.kind, SourceKind::Primary);
            assert_eq!(canonical.video_id.as_deref(), Some("dQw4w9WgXcQ"));
        }
    }

    #[test]
    fn test_secondary_hosts_pass_through() {
        let canonical = youtube()
            .canonicalize("https://vimeo.com/76979871")
            .unwrap();
        assert_eq!(canonical.kind, SourceKind::Secondary);
        assert_eq!(canonical.as_str(), "https://vimeo.com/76979871");
        assert!(canonical.video_id.is_none());
    }

    #[test]
    fn test_rejects_invalid_input() {
        let c = youtube();
        assert_eq!(c.canonicalize("   "), Err(UrlError::Empty));
        assert!(matches!(
            c.canonicalize("https://example.com/video"),
            Err(UrlError::UnsupportedSource(_))
        ));
        assert!(matches!(
            c.canonicalize("https://www.youtube.com/watch?v=short"),
            Err(UrlError::MissingVideoId(_))
        ));
        assert!(matches!(
            c.canonicalize("ftp://youtube.com/watch?v=dQw4w9WgXcQ"),
            Err(UrlError::UnsupportedSource(_))
        ));
    }

    #[test]
    fn test_lookalike_domain_rejected() {
        assert!(youtube()
            .canonicalize("https://notyoutube.com/watch?v=dQw4w9WgXcQ")
            .is_err());
    }
}
