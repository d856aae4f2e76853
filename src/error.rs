//! Error types for SDK operations

use thiserror::Error;

/// A single schema violation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaViolation {
    /// JSON pointer to the offending value in the document
    pub instance_path: String,
    /// JSON pointer to the schema keyword that rejected it
    pub schema_path: String,
    pub message: String,
}

impl std::fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let path = if self.instance_path.is_empty() {
            "/"
        } else {
            &self.instance_path
        };
        write!(f, "{} ({}): {}", path, self.schema_path, self.message)
    }
}

/// SDK error types
#[derive(Debug, Error)]
pub enum DlhubError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Remote call failed (HTTP {status}): {body}")]
    Remote { status: u16, body: String },

    #[error("Document does not match the {kind} schema: {}", format_violations(.errors))]
    Validation {
        kind: String,
        errors: Vec<SchemaViolation>,
    },

    #[error("Not implemented: {0}")]
    Unimplemented(String),

    #[error("Query matched {total} records, more than the {limit} a single page can return")]
    TooManyResults { total: u64, limit: usize },

    #[error("Could not detect installed version of '{package}': {reason}")]
    VersionDetection { package: String, reason: String },

    #[error("Failed to inspect artifact {path}: {reason}")]
    Introspection { path: String, reason: String },

    #[error("Task {task_id} failed: {reason}")]
    TaskFailed { task_id: String, reason: String },

    #[error("Task {0} was cancelled")]
    TaskCancelled(String),

    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

impl DlhubError {
    /// Whether retrying the same call later may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            DlhubError::Http(err) => err.is_connect() || err.is_timeout() || err.is_request(),
            DlhubError::Remote { status, .. } => *status >= 500 || *status == 429,
            DlhubError::Timeout(_) => true,
            _ => false,
        }
    }
}

fn format_violations(errors: &[SchemaViolation]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

pub type DlhubResult<T> = Result<T, DlhubError>;
