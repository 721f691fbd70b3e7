//! Error types shared across the format parsers and the materializer.
//!
//! Errors are serialized as tagged JSON objects so host applications can
//! forward them across process or language boundaries unchanged.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Library error types using the discriminated union pattern.
///
/// This enum uses internally-tagged serialization (`#[serde(tag = "name")]`)
/// so each variant serializes to a JSON object with a `name` field as the
/// discriminator.
///
/// # Examples
///
/// ```rust
/// use spicestream::error::StreamError;
///
/// let error = StreamError::Io {
///     message: "Failed to read file".to_string(),
/// };
///
/// // Serializes to: { "name": "Io", "message": "Failed to read file" }
/// ```
#[derive(Error, Debug, Serialize, Deserialize)]
#[serde(tag = "name")]
pub enum StreamError {
    /// I/O operation failed (file open, read, seek)
    #[error("IO error: {message}")]
    Io { message: String },

    /// A header or value could not be parsed as the format requires
    #[error("Parse error: {message}")]
    Parse { message: String },

    /// No format accepted the file, or an unknown format name was given
    #[error("Format error: {message}")]
    Format { message: String },

    /// Binary record framing is inconsistent (bad sentinel or trailer)
    #[error("Corrupt data: {message}")]
    Corrupt { message: String },

    /// Invalid argument or caller-supplied buffer
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// The independent variable decreased where the format disallows it
    #[error("Nonmonotonic data: {message}")]
    NotMonotonic { message: String },
}

/// Convert standard IO errors into the library error type.
impl From<std::io::Error> for StreamError {
    fn from(error: std::io::Error) -> Self {
        StreamError::Io {
            message: error.to_string(),
        }
    }
}

/// Convert StreamError into a JSON string for host-boundary results.
///
/// If serialization fails, fall back to the Display output.
impl From<StreamError> for String {
    fn from(error: StreamError) -> Self {
        serde_json::to_string(&error).unwrap_or_else(|_| error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_serialization() {
        let error = StreamError::Io {
            message: "test error".to_string(),
        };

        let json = serde_json::to_string(&error).unwrap();
        assert!(json.contains(r#""name":"Io"#));
        assert!(json.contains(r#""message":"test error"#));
    }

    #[test]
    fn test_error_deserialization() {
        let json = r#"{"name":"Parse","message":"invalid format"}"#;
        let error: StreamError = serde_json::from_str(json).unwrap();

        match error {
            StreamError::Parse { message } => {
                assert_eq!(message, "invalid format");
            }
            _ => panic!("Wrong error variant"),
        }
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let stream_error: StreamError = io_error.into();

        match stream_error {
            StreamError::Io { message } => {
                assert!(message.contains("file not found"));
            }
            _ => panic!("Wrong error variant"),
        }
    }
}
