//! yt-dlp subprocess backend

use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

use super::{DownloadRequest, ExtractError, MediaExtractor, MediaInfo, TransferEvent};

const PROGRESS_MARKER: &str = "[progress]";
const PROGRESS_TEMPLATE: &str = "download:[progress] %(progress.status)s %(progress.downloaded_bytes)s %(progress.total_bytes)s %(progress.total_bytes_estimate)s";
const STDERR_TAIL_LINES: usize = 20;

/// Drives the `yt-dlp` binary
#[derive(Debug, Clone)]
pub struct YtDlp {
    binary: PathBuf,
}

impl YtDlp {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.stdin(Stdio::null()).kill_on_drop(true);
        cmd
    }

    fn tool_name(&self) -> String {
        self.binary.display().to_string()
    }

    fn download_args(request: &DownloadRequest) -> Vec<String> {
        let template = request
            .staging_dir
            .join(format!("{}.%(ext)s", request.stem));

        let mut args = vec![
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            "--newline".to_string(),
            // mtime must reflect when the artifact landed, not the upstream Last-Modified
            "--no-mtime".to_string(),
            "--progress-template".to_string(),
            PROGRESS_TEMPLATE.to_string(),
            "--output".to_string(),
            template.to_string_lossy().into_owned(),
        ];

        if let Some(ref transcoder) = request.transcoder {
            args.push("--ffmpeg-location".to_string());
            args.push(transcoder.to_string_lossy().into_owned());
        }
        if let Some(ref cookies) = request.cookies {
            args.push("--cookies".to_string());
            args.push(cookies.to_string_lossy().into_owned());
        }

        args.extend(request.options.to_args());
        args.push(request.url.clone());
        args
    }
}

#[async_trait]
impl MediaExtractor for YtDlp {
    async fn probe(&self, url: &str, cookies: Option<&Path>) -> Result<MediaInfo, ExtractError> {
        let mut cmd = self.command();
        cmd.args(["--dump-single-json", "--skip-download", "--no-playlist", "--no-warnings"]);
        if let Some(cookies) = cookies {
            cmd.arg("--cookies").arg(cookies);
        }
        cmd.arg(url);

        let output = cmd.output().await.map_err(|source| ExtractError::Spawn {
            tool: self.tool_name(),
            source,
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractError::ToolFailed {
                tool: self.tool_name(),
                status: output.status.to_string(),
                detail: stderr.lines().last().unwrap_or("no output").trim().to_string(),
            });
        }

        Ok(serde_json::from_slice(&output.stdout)?)
    }

    async fn download(
        &self,
        request: &DownloadRequest,
        on_event: &(dyn Fn(TransferEvent) + Send + Sync),
    ) -> Result<Option<PathBuf>, ExtractError> {
        let args = Self::download_args(request);
        debug!(tool = %self.tool_name(), ?args, "Starting download");

        let mut child = self
            .command()
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ExtractError::Spawn {
                tool: self.tool_name(),
                source,
            })?;

        let stdout = child.stdout.take().ok_or_else(|| {
            ExtractError::Io(std::io::Error::other("child stdout not captured"))
        })?;
        let stderr = child.stderr.take().ok_or_else(|| {
            ExtractError::Io(std::io::Error::other("child stderr not captured"))
        })?;

        let stderr_reader = tokio::spawn(async move {
            let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            tail
        });

        let mut reported = None;
        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines.next_line().await? {
            if let Some(event) = parse_progress_line(&line) {
                on_event(event);
            } else if let Some(path) = parse_output_line(&line) {
                debug!(path = %path.display(), "Tool reported output");
                reported = Some(path);
            }
        }

        let status = child.wait().await?;
        let tail = stderr_reader.await.unwrap_or_default();

        if !status.success() {
            for line in &tail {
                warn!(tool = %self.tool_name(), "{line}");
            }
            return Err(ExtractError::ToolFailed {
                tool: self.tool_name(),
                status: status.to_string(),
                detail: tail.back().cloned().unwrap_or_else(|| "no output".to_string()),
            });
        }

        Ok(reported)
    }
}

/// Parses lines produced by [`PROGRESS_TEMPLATE`]; unavailable fields render as `NA`
fn parse_progress_line(line: &str) -> Option<TransferEvent> {
    let rest = line.trim().strip_prefix(PROGRESS_MARKER)?;
    let mut fields = rest.split_whitespace();
    let status = fields.next()?;

    if status == "finished" {
        return Some(TransferEvent::Finished);
    }

    let number = |s: Option<&str>| s.and_then(|v| v.parse::<f64>().ok()).map(|v| v as u64);
    let downloaded = number(fields.next()).unwrap_or(0);
    let total = number(fields.next());
    let estimate = number(fields.next());

    Some(TransferEvent::Progress {
        downloaded,
        total: total.or(estimate).filter(|t| *t > 0),
    })
}

/// Extracts the file path from the tool's destination/merge/move messages
fn parse_output_line(line: &str) -> Option<PathBuf> {
    let line = line.trim();

    let path = if let Some(rest) = line.strip_prefix("[Merger] Merging formats into ") {
        rest.trim_matches('"')
    } else if let Some(rest) = line.strip_prefix("[MoveFiles] Moving file ") {
        rest.rsplit_once(" to ")?.1.trim_matches('"')
    } else if line.starts_with('[') {
        let (_, rest) = line.split_once("] ")?;
        if let Some(dest) = rest.strip_prefix("Destination: ") {
            dest
        } else {
            rest.strip_suffix(" has already been downloaded")?
        }
    } else {
        return None;
    };

    (!path.is_empty()).then(|| PathBuf::from(path))
}
