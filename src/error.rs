//! Unified error types for chatvault.
//!
//! This module provides a single [`ChatvaultError`] enum that covers all error
//! cases in the library, following the single-error-enum pattern used by
//! popular crates like `reqwest`, `serde_json`, and `csv`.
//!
//! # Error Handling Philosophy
//!
//! A single file, message, or contact failing is never fatal to a run: those
//! failures are logged and counted (see [`crate::stats::RunStats`]). Errors
//! surfaced through this enum are the ones a caller must act on —
//! configuration problems, unreadable export directories, corrupt registry
//! documents.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// A specialized [`Result`] type for chatvault operations.
///
/// # Example
///
/// ```rust
/// use chatvault::error::Result;
///
/// fn my_function() -> Result<()> {
///     // ... operations that may fail
///     Ok(())
/// }
/// ```
pub type Result<T> = std::result::Result<T, ChatvaultError>;

/// The error type for all chatvault operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ChatvaultError {
    /// An I/O error occurred.
    ///
    /// This typically happens when:
    /// - An export file or media file cannot be read
    /// - Permission denied
    /// - Disk is full (when writing output)
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON parsing/serialization error.
    ///
    /// Raised when the registry document or a conversation cache cannot be
    /// read or written.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The settings file could not be parsed as TOML.
    #[error("Settings file error: {0}")]
    SettingsFile(#[from] toml::de::Error),

    /// Failed to parse an export file.
    ///
    /// Contains the format being parsed, a description of the problem, and
    /// optionally the file path.
    #[error("Failed to parse {format} export{}: {message}", path.as_ref().map(|p| format!(" (file: {})", p.display())).unwrap_or_default())]
    Parse {
        /// The format being parsed (e.g., "WhatsApp HTML")
        format: &'static str,
        /// Description of what's wrong
        message: String,
        /// The file path, if available
        path: Option<PathBuf>,
    },

    /// The configuration is incomplete or inconsistent.
    ///
    /// Configuration errors are the only run-fatal class of failure: a
    /// missing export directory or a missing API credential when
    /// transcription is requested aborts the run before any work starts.
    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        /// Description of what's wrong
        message: String,
    },

    /// An audio conversion produced no usable output.
    ///
    /// Either the encoder reported failure or the output file failed the
    /// minimum-size sanity check.
    #[error("Conversion failed for {}: {message}", path.display())]
    Conversion {
        /// The source audio file
        path: PathBuf,
        /// Description of the failure
        message: String,
    },

    /// The registry document on disk has a shape this version cannot read.
    #[error("Registry format error: {message}")]
    RegistryFormat {
        /// Description of what's wrong
        message: String,
    },
}

// ============================================================================
// Convenience constructors
// ============================================================================

impl ChatvaultError {
    /// Creates a parse error for the WhatsApp HTML export format.
    pub fn html_parse(message: impl Into<String>, path: Option<PathBuf>) -> Self {
        ChatvaultError::Parse {
            format: "WhatsApp HTML",
            message: message.into(),
            path,
        }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        ChatvaultError::InvalidConfig {
            message: message.into(),
        }
    }

    /// Creates a conversion error.
    pub fn conversion(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        ChatvaultError::Conversion {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a registry format error.
    pub fn registry_format(message: impl Into<String>) -> Self {
        ChatvaultError::RegistryFormat {
            message: message.into(),
        }
    }

    /// Returns `true` if this is an IO error.
    pub fn is_io(&self) -> bool {
        matches!(self, ChatvaultError::Io(_))
    }

    /// Returns `true` if this is a parse error.
    pub fn is_parse(&self) -> bool {
        matches!(self, ChatvaultError::Parse { .. })
    }

    /// Returns `true` if this is a configuration error.
    pub fn is_invalid_config(&self) -> bool {
        matches!(self, ChatvaultError::InvalidConfig { .. })
    }

    /// Returns `true` if this is a conversion error.
    pub fn is_conversion(&self) -> bool {
        matches!(self, ChatvaultError::Conversion { .. })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_display() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err = ChatvaultError::from(io_err);
        let display = err.to_string();
        assert!(display.contains("IO error"));
        assert!(display.contains("file not found"));
    }

    #[test]
    fn test_parse_error_with_path() {
        let err = ChatvaultError::html_parse(
            "no date markers found",
            Some(PathBuf::from("/exports/alice.html")),
        );
        let display = err.to_string();
        assert!(display.contains("WhatsApp HTML"));
        assert!(display.contains("/exports/alice.html"));
        assert!(display.contains("no date markers found"));
    }

    #[test]
    fn test_parse_error_without_path() {
        let err = ChatvaultError::html_parse("empty document", None);
        let display = err.to_string();
        assert!(display.contains("WhatsApp HTML"));
        assert!(!display.contains("file:"));
    }

    #[test]
    fn test_invalid_config_display() {
        let err = ChatvaultError::invalid_config("html_dir is not set");
        assert!(err.to_string().contains("html_dir is not set"));
    }

    #[test]
    fn test_conversion_display() {
        let err = ChatvaultError::conversion("/audio/a.opus", "output below 1000 bytes");
        let display = err.to_string();
        assert!(display.contains("a.opus"));
        assert!(display.contains("1000 bytes"));
    }

    #[test]
    fn test_error_source_chain() {
        use std::error::Error;
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let err = ChatvaultError::from(io_err);
        assert!(err.source().is_some());
    }

    #[test]
    fn test_is_methods() {
        let io_err = ChatvaultError::Io(io::Error::new(io::ErrorKind::NotFound, ""));
        assert!(io_err.is_io());
        assert!(!io_err.is_parse());
        assert!(!io_err.is_invalid_config());

        let cfg_err = ChatvaultError::invalid_config("bad");
        assert!(cfg_err.is_invalid_config());
        assert!(!cfg_err.is_io());

        let conv_err = ChatvaultError::conversion("/a.opus", "failed");
        assert!(conv_err.is_conversion());
        assert!(!conv_err.is_parse());
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid").unwrap_err();
        let err: ChatvaultError = json_err.into();
        assert!(err.to_string().contains("JSON error"));
    }

    #[test]
    fn test_registry_format_display() {
        let err = ChatvaultError::registry_format("missing 'files' map");
        assert!(err.to_string().contains("missing 'files' map"));
    }

    #[test]
    fn test_error_debug() {
        let err = ChatvaultError::invalid_config("bad");
        let debug = format!("{:?}", err);
        assert!(debug.contains("InvalidConfig"));
    }
}
