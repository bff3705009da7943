//! Error handling for airlift
//!
//! This module provides the error types and user-friendly error reporting for
//! the update coordination library. The error system is designed around two
//! core principles:
//! 1. **Strongly-typed errors** for precise handling at the library seams
//! 2. **User-friendly messages** with actionable suggestions for CLI users
//!
//! # Architecture
//!
//! The error system consists of two main types:
//! - [`UpdateError`] - Enumerated error types for all failure cases
//! - [`ErrorContext`] - Wrapper that adds user-friendly messages and suggestions
//!
//! # Error Categories
//!
//! Failures are organized by the phase of the update cycle they occur in:
//! - **Check phase**: [`UpdateError::NetworkUnavailable`], [`UpdateError::DecodeFailure`]
//! - **Download phase**: [`UpdateError::DownloadFailure`]
//! - **Worker lifecycle**: [`UpdateError::WorkerDisconnected`], [`UpdateError::DownloadInProgress`]
//! - **Configuration**: [`UpdateError::ConfigError`], [`UpdateError::TomlError`]
//!
//! Every check-phase failure is terminal for that check cycle and surfaces to
//! the host as `CheckFailed`; nothing is retried automatically.
//!
//! # Error Conversion and Context
//!
//! Common standard library errors are automatically converted:
//! - [`std::io::Error`] → [`UpdateError::IoError`]
//! - [`toml::de::Error`] → [`UpdateError::TomlError`]
//!
//! Use [`user_friendly_error`] to convert any error into a user-friendly
//! format with contextual suggestions.

use colored::Colorize;
use std::fmt;
use thiserror::Error;

/// The main error type for airlift operations
///
/// Each variant represents a specific failure mode with enough context to
/// decide how the update cycle should proceed. Check-phase and download-phase
/// failures are deliberately separate: the former terminate a cycle before
/// any artifact transfer begins, the latter after.
#[derive(Error, Debug, Clone)]
pub enum UpdateError {
    /// Transport-level failure while talking to the update endpoint
    ///
    /// Raised when the version check or artifact request cannot reach the
    /// server, times out, or the server answers with a non-success status.
    ///
    /// # Fields
    /// - `operation`: What was being attempted (e.g., "version check")
    /// - `reason`: The transport error description
    #[error("Network error during {operation}: {reason}")]
    NetworkUnavailable {
        /// The operation that failed (e.g., "version check", "artifact download")
        operation: String,
        /// Description of the transport failure
        reason: String,
    },

    /// The version metadata response could not be decoded
    ///
    /// The server answered with a success status but the body was not the
    /// expected JSON document. Treated exactly like a transport failure by
    /// the coordinator: the check cycle ends with `CheckFailed`.
    #[error("Failed to decode version metadata: {reason}")]
    DecodeFailure {
        /// Description of the decode problem
        reason: String,
    },

    /// The artifact transfer failed mid-download
    ///
    /// # Fields
    /// - `url`: The artifact URL being fetched
    /// - `reason`: The transport or file-system error description
    #[error("Download failed for {url}: {reason}")]
    DownloadFailure {
        /// The artifact URL that failed
        url: String,
        /// The reason for the failure
        reason: String,
    },

    /// The background worker is gone
    ///
    /// The command channel to the worker task is closed. This indicates the
    /// worker task panicked or the process is shutting down; the coordinator
    /// treats it as a forced disconnection.
    #[error("Update worker is no longer running")]
    WorkerDisconnected,

    /// A connection release was refused because a download is in flight
    ///
    /// The worker never allows itself to be released mid-download; callers
    /// receive this and must retry after the transfer reaches a terminal
    /// state.
    #[error("Cannot release the update worker while a download is in progress")]
    DownloadInProgress,

    /// A download was requested without a completed check
    ///
    /// `download` is only valid after a successful check has produced an
    /// update model for this connection.
    #[error("No update has been resolved yet; run a version check first")]
    NoPendingUpdate,

    /// Configuration error
    #[error("Configuration error: {message}")]
    ConfigError {
        /// Description of the configuration error
        message: String,
    },

    /// File system operation failed
    #[error("File system error during {operation}: {path}")]
    FileSystemError {
        /// The operation that failed (e.g., "create cache directory")
        operation: String,
        /// The path involved
        path: String,
    },

    /// IO error wrapper
    #[error("IO error: {0}")]
    IoError(String),

    /// TOML parsing error wrapper
    #[error("TOML parsing error: {0}")]
    TomlError(String),

    /// TOML serialization error wrapper
    #[error("TOML serialization error: {0}")]
    TomlSerError(String),

    /// Generic error for cases not covered by specific variants
    #[error("{message}")]
    Other {
        /// The error message
        message: String,
    },
}

impl From<std::io::Error> for UpdateError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}

impl From<toml::de::Error> for UpdateError {
    fn from(err: toml::de::Error) -> Self {
        Self::TomlError(err.to_string())
    }
}

impl From<toml::ser::Error> for UpdateError {
    fn from(err: toml::ser::Error) -> Self {
        Self::TomlSerError(err.to_string())
    }
}

/// Rich error context for user-friendly display
///
/// Wraps an [`UpdateError`] with an optional suggestion and details, displayed
/// with terminal colors by the CLI. Library code returns plain [`UpdateError`]
/// values; the context is attached at the presentation layer.
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying error
    pub error: UpdateError,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a new error context from an [`UpdateError`]
    #[must_use]
    pub const fn new(error: UpdateError) -> Self {
        Self {
            error,
            suggestion: None,
            details: None,
        }
    }

    /// Add a suggestion for resolving the error
    ///
    /// Suggestions should be actionable steps. They are displayed in green in
    /// the terminal to draw attention.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add additional details explaining the error
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Display the error context to stderr with terminal colors
    ///
    /// - Error message: red and bold
    /// - Details: yellow
    /// - Suggestion: green
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Map a typed error to a context with an appropriate suggestion
fn create_error_context(error: UpdateError) -> ErrorContext {
    match &error {
        UpdateError::NetworkUnavailable { .. } => ErrorContext::new(error)
            .with_suggestion("Check your network connection and try again")
            .with_details("The update endpoint could not be reached; nothing was changed"),
        UpdateError::DecodeFailure { .. } => ErrorContext::new(error)
            .with_suggestion("Verify the configured update endpoint returns version metadata")
            .with_details("The server response did not match the expected version document"),
        UpdateError::DownloadFailure { .. } => ErrorContext::new(error)
            .with_suggestion("Re-run the update to start a fresh download")
            .with_details("Partial downloads are discarded; transfers are not resumable"),
        UpdateError::DownloadInProgress => ErrorContext::new(error)
            .with_suggestion("Wait for the download to finish before stopping the updater"),
        UpdateError::ConfigError { .. } | UpdateError::TomlError(_) => ErrorContext::new(error)
            .with_suggestion("Check the syntax and values in your airlift.toml configuration"),
        _ => ErrorContext::new(error),
    }
}

/// Convert any error into a user-friendly [`ErrorContext`]
///
/// Downcasts known error types and attaches suggestions; unknown errors are
/// wrapped as [`UpdateError::Other`] with the full context chain preserved in
/// the message.
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    if let Some(update_error) = error.downcast_ref::<UpdateError>() {
        return create_error_context(update_error.clone());
    }

    if let Some(io_error) = error.downcast_ref::<std::io::Error>() {
        match io_error.kind() {
            std::io::ErrorKind::PermissionDenied => {
                return ErrorContext::new(UpdateError::FileSystemError {
                    operation: "file access".to_string(),
                    path: "unknown".to_string(),
                })
                .with_suggestion("Check permissions on the artifact cache directory");
            }
            std::io::ErrorKind::NotFound => {
                return ErrorContext::new(UpdateError::FileSystemError {
                    operation: "file access".to_string(),
                    path: "unknown".to_string(),
                })
                .with_suggestion("Check that the file or directory exists and the path is correct");
            }
            _ => {}
        }
    }

    if let Some(toml_error) = error.downcast_ref::<toml::de::Error>() {
        return create_error_context(UpdateError::TomlError(toml_error.to_string()));
    }

    // Preserve the anyhow context chain in the generic fallback
    let mut message = error.to_string();
    let chain: Vec<String> = error.chain().skip(1).map(ToString::to_string).collect();
    if !chain.is_empty() {
        message = format!("{}\nCaused by: {}", message, chain.join("\nCaused by: "));
    }

    ErrorContext::new(UpdateError::Other { message })
}
