//! Pure helpers for request validation and response headers

use crate::api::error::ApiError;

/// Only `application/json` (with any parameters) is accepted for submissions
pub fn parse_content_type(content_type: &str) -> Result<mime::Mime, ApiError> {
    let media_type: mime::Mime = content_type
        .parse()
        .map_err(|_| ApiError::InvalidPayload(format!("invalid Content-Type: {content_type}")))?;

    if media_type.type_() == mime::APPLICATION && media_type.subtype() == mime::JSON {
        return Ok(media_type);
    }
    Err(ApiError::InvalidPayload(format!(
        "Content-Type must be application/json, got: {}",
        media_type.essence_str()
    )))
}

pub fn validate_body_size(data: &[u8], max_size: usize) -> Result<(), ApiError> {
    match data.len() {
        len if len > max_size => Err(ApiError::PayloadTooLarge(len)),
        _ => Ok(()),
    }
}

/// `Content-Disposition` for an artifact download.
///
/// Non-ASCII names get an ASCII fallback plus an RFC 5987 `filename*`.
pub fn content_disposition(filename: &str) -> String {
    let ascii: String = filename
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | ' ' | '(' | ')') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if ascii == filename {
        format!("attachment; filename=\"{ascii}\"")
    } else {
        format!(
            "attachment; filename=\"{ascii}\"; filename*=UTF-8''{}",
            urlencoding::encode(filename)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_content_type() {
        assert!(parse_content_type("application/json").is_ok());
        assert!(parse_content_type("application/json; charset=UTF-8").is_ok());

        for rejected in ["application/jsonp", "text/json", "multipart/form-data", "", "json"] {
            assert!(parse_content_type(rejected).is_err(), "{rejected} accepted");
        }
    }

    #[test]
    fn test_validate_body_size() {
        let body = vec![0u8; 64];
        assert!(validate_body_size(&body, 64).is_ok());
        assert!(matches!(
            validate_body_size(&body, 63),
            Err(ApiError::PayloadTooLarge(64))
        ));
    }

    #[test]
    fn test_content_disposition() {
        assert_eq!(
            content_disposition("Test_Clip-AAAAAAAAAAA-192.mp3"),
            "attachment; filename=\"Test_Clip-AAAAAAAAAAA-192.mp3\""
        );
        assert_eq!(
            content_disposition("노래-id-192.mp3"),
            "attachment; filename=\"__-id-192.mp3\"; filename*=UTF-8''%EB%85%B8%EB%9E%98-id-192.mp3"
        );
    }
}
