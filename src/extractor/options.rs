//! Typed per-format option records for the extraction tool

use crate::task::{MediaFormat, Quality};

use super::ExtractError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioOptions {
    pub codec: &'static str,
    pub bitrate_kbps: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoOptions {
    /// `None` selects the best available stream
    pub max_height: Option<u32>,
    pub container: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatOptions {
    Audio(AudioOptions),
    Video(VideoOptions),
}

impl FormatOptions {
    /// Builds and validates the option record for a task
    pub fn for_task(format: MediaFormat, quality: Quality) -> Result<Self, ExtractError> {
        let options = match (format, quality) {
            (MediaFormat::Audio, Quality::Bitrate(kbps)) => FormatOptions::Audio(AudioOptions {
                codec: "mp3",
                bitrate_kbps: kbps,
            }),
            (MediaFormat::Video, Quality::MaxHeight(height)) => {
                FormatOptions::Video(VideoOptions {
                    max_height: Some(height),
                    container: "mp4",
                })
            }
            (MediaFormat::Video, Quality::Best) => FormatOptions::Video(VideoOptions {
                max_height: None,
                container: "mp4",
            }),
            (format, quality) => {
                return Err(ExtractError::InvalidOptions(format!(
                    "quality {quality} does not apply to {format}"
                )));
            }
        };
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<(), ExtractError> {
        match self {
            FormatOptions::Audio(audio) if !(32..=320).contains(&audio.bitrate_kbps) => Err(
                ExtractError::InvalidOptions(format!("bitrate {}k", audio.bitrate_kbps)),
            ),
            FormatOptions::Video(VideoOptions {
                max_height: Some(0),
                ..
            }) => Err(ExtractError::InvalidOptions("height ceiling 0".to_string())),
            _ => Ok(()),
        }
    }

    /// Audio extraction, stream merging and remuxing all run through the transcoder
    pub fn requires_transcoder(&self) -> bool {
        true
    }

    /// Command-line arguments selecting streams and post-processing
    pub fn to_args(&self) -> Vec<String> {
        match self {
            FormatOptions::Audio(audio) => vec![
                "--format".to_string(),
                "bestaudio/best".to_string(),
                "--extract-audio".to_string(),
                "--audio-format".to_string(),
                audio.codec.to_string(),
                "--audio-quality".to_string(),
                format!("{}K", audio.bitrate_kbps),
            ],
            FormatOptions::Video(video) => {
                let selector = match video.max_height {
                    Some(h) => format!("bv*[height<={h}]+ba/best[height<={h}]"),
                    None => "bestvideo+bestaudio/best".to_string(),
                };
                vec![
                    "--format".to_string(),
                    selector,
                    "--merge-output-format".to_string(),
                    video.container.to_string(),
                    "--remux-video".to_string(),
                    video.container.to_string(),
                ]
            }
        }
    }
}
