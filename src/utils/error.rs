use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Operation '{label}' timed out after {}ms", .elapsed.as_millis())]
    Timeout { label: String, elapsed: Duration },

    #[error("No matching row in '{table}'")]
    NotFound { table: String },

    #[error("Store transport error: {message}")]
    Transport { message: String },

    #[error("Operation '{label}' failed: {message}")]
    OperationFailed { label: String, message: String },

    #[error("Duplicate aggregate key: {key}")]
    DuplicateKey { key: String },

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration validation failed for '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },
}

pub type Result<T> = std::result::Result<T, SyncError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Timeout,
    NotFound,
    Transport,
    Configuration,
    Internal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl SyncError {
    pub fn timeout(label: impl Into<String>, elapsed: Duration) -> Self {
        SyncError::Timeout {
            label: label.into(),
            elapsed,
        }
    }

    pub fn not_found(table: impl Into<String>) -> Self {
        SyncError::NotFound {
            table: table.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        SyncError::Transport {
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            SyncError::Timeout { .. } => ErrorCategory::Timeout,
            SyncError::NotFound { .. } => ErrorCategory::NotFound,
            SyncError::HttpError(e) if e.is_timeout() => ErrorCategory::Timeout,
            SyncError::Transport { .. }
            | SyncError::HttpError(_)
            | SyncError::SerializationError(_) => ErrorCategory::Transport,
            SyncError::ConfigError { .. }
            | SyncError::ConfigValidationError { .. }
            | SyncError::InvalidConfigValueError { .. }
            | SyncError::MissingConfigError { .. } => ErrorCategory::Configuration,
            SyncError::OperationFailed { .. }
            | SyncError::DuplicateKey { .. }
            | SyncError::IoError(_) => ErrorCategory::Internal,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::NotFound => ErrorSeverity::Low,
            ErrorCategory::Timeout | ErrorCategory::Transport => ErrorSeverity::Medium,
            ErrorCategory::Internal => ErrorSeverity::High,
            ErrorCategory::Configuration => ErrorSeverity::Critical,
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.category() == ErrorCategory::Timeout
    }

    pub fn is_not_found(&self) -> bool {
        self.category() == ErrorCategory::NotFound
    }

    /// Store-facing failures that a later attempt may clear.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Timeout | ErrorCategory::NotFound | ErrorCategory::Transport
        )
    }

    /// 給終端使用者看的訊息，不含原始錯誤內容
    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Timeout => {
                "The dashboard took too long to load. Please try again.".to_string()
            }
            ErrorCategory::NotFound => {
                "Your data is still being created. Refresh in a moment.".to_string()
            }
            ErrorCategory::Transport => {
                "We couldn't reach the data service. Please try again.".to_string()
            }
            ErrorCategory::Configuration => format!("Configuration problem: {}", self),
            ErrorCategory::Internal => "Something went wrong. Please try again.".to_string(),
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Timeout => "Check store latency or raise the deadline in [deadlines]",
            ErrorCategory::NotFound => "Wait for the record to propagate, then reload",
            ErrorCategory::Transport => "Check the store endpoint, API key and network access",
            ErrorCategory::Configuration => "Fix the configuration file and restart",
            ErrorCategory::Internal => "Inspect the logs for the failing operation label",
        }
    }
}
