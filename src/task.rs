//! Fetch task descriptor and cache-key derivation

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::source::CanonicalUrl;

/// Characters that are unsafe in file names on at least one common platform
const INVALID_FILENAME_CHARS: &[char] = &['\\', '/', ':', '*', '?', '"', '<', '>', '|'];
const MAX_TITLE_CHARS: usize = 100;
const PLACEHOLDER_TITLE: &str = "DownloadedFile";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TaskError {
    #[error("unsupported format '{0}', expected 'audio' or 'video'")]
    UnsupportedFormat(String),

    #[error("invalid quality '{quality}' for {format} output")]
    InvalidQuality { format: MediaFormat, quality: String },

    #[error("invalid auth context '{0}'")]
    InvalidAuthContext(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaFormat {
    Audio,
    Video,
}

impl MediaFormat {
    /// Extension of the artifact this format produces
    pub fn extension(&self) -> &'static str {
        match self {
            MediaFormat::Audio => "mp3",
            MediaFormat::Video => "mp4",
        }
    }

    pub fn default_quality(&self) -> Quality {
        match self {
            MediaFormat::Audio => Quality::Bitrate(192),
            MediaFormat::Video => Quality::Best,
        }
    }
}

impl fmt::Display for MediaFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaFormat::Audio => f.write_str("audio"),
            MediaFormat::Video => f.write_str("video"),
        }
    }
}

impl FromStr for MediaFormat {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "audio" | "mp3" => Ok(MediaFormat::Audio),
            "video" | "mp4" => Ok(MediaFormat::Video),
            other => Err(TaskError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Quality selector: a bitrate for audio, a height ceiling for video
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    /// Audio bitrate in kbit/s
    Bitrate(u16),
    /// Video height ceiling in pixels
    MaxHeight(u32),
    /// Best available video
    Best,
}

impl Quality {
    /// Parses a quality token in the context of an output format
    pub fn parse(format: MediaFormat, token: &str) -> Result<Self, TaskError> {
        let token = token.trim();
        let invalid = || TaskError::InvalidQuality {
            format,
            quality: token.to_string(),
        };

        match format {
            MediaFormat::Audio => {
                let kbps: u16 = token
                    .trim_end_matches(['k', 'K'])
                    .parse()
                    .map_err(|_| invalid())?;
                if !(32..=320).contains(&kbps) {
                    return Err(invalid());
                }
                Ok(Quality::Bitrate(kbps))
            }
            MediaFormat::Video => {
                if token.eq_ignore_ascii_case("best") {
                    return Ok(Quality::Best);
                }
                let height: u32 = token
                    .strip_suffix(['p', 'P'])
                    .ok_or_else(invalid)?
                    .parse()
                    .map_err(|_| invalid())?;
                if !(144..=4320).contains(&height) {
                    return Err(invalid());
                }
                Ok(Quality::MaxHeight(height))
            }
        }
    }

    /// Token used in artifact names and tool options ("192", "720p", "best")
    pub fn token(&self) -> String {
        match self {
            Quality::Bitrate(kbps) => kbps.to_string(),
            Quality::MaxHeight(height) => format!("{height}p"),
            Quality::Best => "best".to_string(),
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.token())
    }
}

/// Immutable unit of work handed to the queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchTask {
    pub source: CanonicalUrl,
    pub format: MediaFormat,
    pub quality: Quality,
    /// Cookie bundle identifier, resolved by the worker
    pub auth_context: Option<String>,
}

impl FetchTask {
    pub fn new(
        source: CanonicalUrl,
        format: MediaFormat,
        quality: Quality,
        auth_context: Option<String>,
    ) -> Result<Self, TaskError> {
        let auth_context = auth_context
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty());

        if let Some(ref id) = auth_context {
            let valid = id.len() <= 64
                && id
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
            if !valid {
                return Err(TaskError::InvalidAuthContext(id.clone()));
            }
        }

        Ok(Self {
            source,
            format,
            quality,
            auth_context,
        })
    }

    /// Cache key for this task once the source's title and id are known
    pub fn cache_key(&self, title: &str, source_id: &str) -> CacheKey {
        CacheKey::new(title, source_id, self.quality, self.format)
    }
}

/// Deterministic artifact identity: `<title>-<id>-<quality>.<ext>`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    stem: String,
    extension: &'static str,
}

impl CacheKey {
    pub fn new(title: &str, source_id: &str, quality: Quality, format: MediaFormat) -> Self {
        let title = sanitize_filename(title).replace(' ', "_");
        let source_id = sanitize_filename(source_id).replace(' ', "_");
        Self {
            stem: format!("{}-{}-{}", title, source_id, quality.token()),
            extension: format.extension(),
        }
    }

    /// File name without extension; also the prefix tools write under
    pub fn stem(&self) -> &str {
        &self.stem
    }

    pub fn extension(&self) -> &'static str {
        self.extension
    }

    pub fn file_name(&self) -> String {
        format!("{}.{}", self.stem, self.extension)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.stem, self.extension)
    }
}

/// Strips filesystem-unsafe characters, collapses whitespace, and bounds the length
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !INVALID_FILENAME_CHARS.contains(c) && !c.is_control() || c.is_whitespace())
        .collect();

    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    let truncated: String = collapsed.chars().take(MAX_TITLE_CHARS).collect();
    let truncated = truncated.trim_end();

    // Leading dots would hide the artifact from directory listings
    let trimmed = truncated.trim_start_matches('.');
    if trimmed.is_empty() {
        PLACEHOLDER_TITLE.to_string()
    } else {
        trimmed.to_string()
    }
}
