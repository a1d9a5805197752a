use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("Transport failure for {path}: {source}")]
    Transport {
        path: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Missing file: {field}")]
    MissingFile { field: String },

    #[error("Too few files in {field}: expected at least {min}, got {actual}")]
    TooFewFiles {
        field: String,
        min: usize,
        actual: usize,
    },

    #[error("Validation failed: {}", join_messages(.0))]
    Validation(Vec<MediaError>),

    #[error("Partial upload of {field}: items {failed:?} failed")]
    PartialUpload { field: String, failed: Vec<usize> },

    #[error("Payload Too Large: {0}")]
    PayloadTooLarge(String),

    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Internal Server Error: {0}")]
    Internal(String),
}

impl MediaError {
    pub fn transport(path: impl Into<String>, source: anyhow::Error) -> Self {
        MediaError::Transport {
            path: path.into(),
            source,
        }
    }

    /// Names of every field reported as missing, in order.
    pub fn missing_fields(&self) -> Vec<&str> {
        match self {
            MediaError::MissingFile { field } => vec![field.as_str()],
            MediaError::Validation(problems) => {
                problems.iter().flat_map(MediaError::missing_fields).collect()
            }
            _ => Vec::new(),
        }
    }
}

fn join_messages(errors: &[MediaError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl IntoResponse for MediaError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            MediaError::Transport { ref path, ref source } => {
                tracing::error!("Storage error for {}: {:?}", path, source);
                (StatusCode::BAD_GATEWAY, "Storage unavailable".to_string())
            }
            MediaError::MissingFile { .. }
            | MediaError::TooFewFiles { .. }
            | MediaError::Validation(_)
            | MediaError::PartialUpload { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, self.to_string())
            }
            MediaError::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg),
            MediaError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            MediaError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            MediaError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let cases = [
            (
                MediaError::transport("uploads/1_a.png", anyhow::anyhow!("connection reset")),
                StatusCode::BAD_GATEWAY,
            ),
            (
                MediaError::MissingFile {
                    field: "hero_image".to_string(),
                },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                MediaError::PayloadTooLarge("too big".to_string()),
                StatusCode::PAYLOAD_TOO_LARGE,
            ),
            (
                MediaError::NotFound("gone".to_string()),
                StatusCode::NOT_FOUND,
            ),
        ];

        for (error, status) in cases {
            assert_eq!(error.into_response().status(), status);
        }
    }

    #[test]
    fn test_partial_upload_message_names_indices() {
        let error = MediaError::PartialUpload {
            field: "partners".to_string(),
            failed: vec![1, 3],
        };
        assert_eq!(
            error.to_string(),
            "Partial upload of partners: items [1, 3] failed"
        );
    }

    #[test]
    fn test_validation_lists_every_problem() {
        let error = MediaError::Validation(vec![
            MediaError::MissingFile {
                field: "partners[0]".to_string(),
            },
            MediaError::MissingFile {
                field: "partners[2]".to_string(),
            },
        ]);
        assert_eq!(
            error.to_string(),
            "Validation failed: Missing file: partners[0]; Missing file: partners[2]"
        );
        assert_eq!(error.missing_fields(), vec!["partners[0]", "partners[2]"]);
        assert_eq!(
            error.into_response().status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }
}
