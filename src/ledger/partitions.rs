/// Key layout for the ledger partitions
///
/// - `progress`: progress:{job_id} -> ProgressEntry (JSON)
/// - `sessions`: session:{token} -> Session (JSON)
/// - `metadata`: meta:{key} -> value (string)

/// Encode a progress key: progress:{job_id}
pub fn encode_progress_key(job_id: &str) -> Vec<u8> {
    format!("progress:{}", job_id).into_bytes()
}

/// Decode a progress key: progress:{job_id} -> job_id
pub fn decode_progress_key(key: &[u8]) -> Option<String> {
    let key_str = std::str::from_utf8(key).ok()?;
    key_str.strip_prefix("progress:").map(String::from)
}

/// Encode a session key: session:{token}
pub fn encode_session_key(token: &str) -> Vec<u8> {
    format!("session:{}", token).into_bytes()
}

/// Encode a metadata key: meta:{key}
pub fn encode_meta_key(key: &str) -> Vec<u8> {
    format!("meta:{}", key).into_bytes()
}
