use crate::humanize::{ByteSize, HumanDuration};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    /// Root directory for the fjall keyspaces (queue and ledger)
    #[serde(default = "default_data_path")]
    pub data_path: PathBuf,
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: ByteSize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            data_path: default_data_path(),
            max_payload_bytes: default_max_payload_bytes(),
        }
    }
}

impl ServerConfig {
    pub fn queue_path(&self) -> PathBuf {
        self.data_path.join("queue")
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.data_path.join("ledger")
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_data_path() -> PathBuf {
    PathBuf::from("data")
}

fn default_max_payload_bytes() -> ByteSize {
    ByteSize(64 * 1024)
}

/// Artifact storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
        }
    }
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("uploads")
}

/// Accepted source platforms
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourcesConfig {
    /// Hosts of the primary platform; matched exactly or as a parent domain
    #[serde(default = "default_primary_hosts")]
    pub primary_hosts: Vec<String>,
    /// Host used when rewriting primary URLs into canonical watch form
    #[serde(default = "default_canonical_host")]
    pub canonical_host: String,
    #[serde(default = "default_secondary_hosts")]
    pub secondary_hosts: Vec<String>,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            primary_hosts: default_primary_hosts(),
            canonical_host: default_canonical_host(),
            secondary_hosts: default_secondary_hosts(),
        }
    }
}

fn default_primary_hosts() -> Vec<String> {
    vec!["youtube.com".to_string(), "youtu.be".to_string()]
}

fn default_canonical_host() -> String {
    "www.youtube.com".to_string()
}

fn default_secondary_hosts() -> Vec<String> {
    vec!["vimeo.com".to_string(), "soundcloud.com".to_string()]
}

/// Fetch worker pool configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkerConfig {
    #[serde(default = "default_worker_count")]
    pub count: usize,
    #[serde(default = "default_channel_size")]
    pub channel_size: usize,
    /// Longest source accepted; zero-length (live) sources are always rejected
    #[serde(default = "default_max_duration")]
    pub max_duration: HumanDuration,
    /// Share of the progress range (percent) attributed to the network transfer
    #[serde(default = "default_download_share")]
    pub download_share: u8,
    #[serde(default = "default_extractor_path")]
    pub extractor_path: PathBuf,
    /// Transcoder binary name or path, resolved through PATH at startup
    #[serde(default = "default_transcoder")]
    pub transcoder: String,
    #[serde(default = "default_cookies_dir")]
    pub cookies_dir: PathBuf,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            count: default_worker_count(),
            channel_size: default_channel_size(),
            max_duration: default_max_duration(),
            download_share: default_download_share(),
            extractor_path: default_extractor_path(),
            transcoder: default_transcoder(),
            cookies_dir: default_cookies_dir(),
        }
    }
}

fn default_worker_count() -> usize {
    4
}

fn default_channel_size() -> usize {
    100
}

fn default_max_duration() -> HumanDuration {
    HumanDuration::from_secs(2 * 60 * 60)
}

fn default_download_share() -> u8 {
    50
}

fn default_extractor_path() -> PathBuf {
    PathBuf::from("yt-dlp")
}

fn default_transcoder() -> String {
    "ffmpeg".to_string()
}

fn default_cookies_dir() -> PathBuf {
    PathBuf::from("data/cookies")
}

/// Retention configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetentionConfig {
    /// Artifacts (and stale progress entries) older than this are reclaimed
    #[serde(default = "default_artifact_ttl")]
    pub artifact_ttl: HumanDuration,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval: HumanDuration,
    /// How long an unclaimed download session stays valid
    #[serde(default = "default_session_ttl")]
    pub session_ttl: HumanDuration,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            artifact_ttl: default_artifact_ttl(),
            sweep_interval: default_sweep_interval(),
            session_ttl: default_session_ttl(),
        }
    }
}

fn default_artifact_ttl() -> HumanDuration {
    HumanDuration::from_secs(12 * 60 * 60)
}

fn default_sweep_interval() -> HumanDuration {
    HumanDuration::from_secs(10)
}

fn default_session_ttl() -> HumanDuration {
    HumanDuration::from_secs(60 * 60)
}
