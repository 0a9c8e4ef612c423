use std::path::PathBuf;
use tracing::{info, warn};

/// Resolves the transcoder binary through PATH (or as a literal path)
pub fn locate(name: &str) -> Option<PathBuf> {
    match which::which(name) {
        Ok(path) => {
            info!(path = %path.display(), "Transcoder found");
            Some(path)
        }
        Err(e) => {
            warn!(transcoder = name, error = %e, "Transcoder not found, audio jobs will fail");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_binary() {
        assert!(locate("definitely-not-a-real-transcoder-binary").is_none());
    }
}
