use super::models::Config;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("worker.count must be at least 1")]
    NoWorkers,

    #[error("worker.channel_size must be at least 1")]
    InvalidChannelSize,

    #[error("worker.download_share must be between 1 and 99, got {0}")]
    InvalidDownloadShare(u8),

    #[error("worker.max_duration must be positive")]
    InvalidMaxDuration,

    #[error(
        "retention.artifact_ttl ({ttl}s) must exceed worker.max_duration ({max_duration}s)"
    )]
    RetentionTooShort { ttl: u64, max_duration: u64 },

    #[error("Retention interval must be positive: {field}")]
    InvalidInterval { field: String },

    #[error("sources.primary_hosts must name at least one host")]
    NoPrimaryHosts,

    #[error("sources.canonical_host must not be empty")]
    EmptyCanonicalHost,
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_worker(config)?;
    validate_retention(config)?;
    validate_sources(config)?;
    Ok(())
}

fn validate_worker(config: &Config) -> Result<(), ValidationError> {
    let worker = &config.worker;

    if worker.count == 0 {
        return Err(ValidationError::NoWorkers);
    }

    if worker.channel_size == 0 {
        return Err(ValidationError::InvalidChannelSize);
    }

    if !(1..=99).contains(&worker.download_share) {
        return Err(ValidationError::InvalidDownloadShare(worker.download_share));
    }

    if worker.max_duration.as_secs() == 0 {
        return Err(ValidationError::InvalidMaxDuration);
    }

    Ok(())
}

/// `artifact_ttl` must exceed the longest source a worker accepts.
fn validate_retention(config: &Config) -> Result<(), ValidationError> {
    let retention = &config.retention;
    let ttl = retention.artifact_ttl.as_secs();
    let max_duration = config.worker.max_duration.as_secs();

    if ttl <= max_duration {
        return Err(ValidationError::RetentionTooShort { ttl, max_duration });
    }

    if retention.sweep_interval.as_secs() == 0 {
        return Err(ValidationError::InvalidInterval {
            field: "sweep_interval".to_string(),
        });
    }

    if retention.session_ttl.as_secs() == 0 {
        return Err(ValidationError::InvalidInterval {
            field: "session_ttl".to_string(),
        });
    }

    Ok(())
}

fn validate_sources(config: &Config) -> Result<(), ValidationError> {
    if config.sources.primary_hosts.iter().all(|h| h.trim().is_empty()) {
        return Err(ValidationError::NoPrimaryHosts);
    }

    if config.sources.canonical_host.trim().is_empty() {
        return Err(ValidationError::EmptyCanonicalHost);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::humanize::HumanDuration;

    #[test]
    fn test_defaults_are_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_rejects_zero_workers() {
        let mut config = Config::default();
        config.worker.count = 0;
        assert!(matches!(validate(&config), Err(ValidationError::NoWorkers)));
    }

    #[test]
    fn test_rejects_degenerate_download_share() {
        let mut config = Config::default();
        config.worker.download_share = 100;
        assert!(matches!(
            validate(&config),
            Err(ValidationError::InvalidDownloadShare(100))
        ));

        config.worker.download_share = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_retention_must_outlive_longest_job() {
        let mut config = Config::default();
        config.worker.max_duration = HumanDuration::from_secs(3600);
        config.retention.artifact_ttl = HumanDuration::from_secs(3600);

        let err = validate(&config).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::RetentionTooShort {
                ttl: 3600,
                max_duration: 3600
            }
        ));

        config.retention.artifact_ttl = HumanDuration::from_secs(3601);
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_rejects_missing_primary_hosts() {
        let mut config = Config::default();
        config.sources.primary_hosts = vec![];
        assert!(matches!(validate(&config), Err(ValidationError::NoPrimaryHosts)));
    }
}
