//! Speech-to-text capability boundary.
//!
//! The core never talks to a speech service itself. Callers provide a
//! [`Transcriber`] implementation; the core decides *whether* to call it
//! (per-direction config flags), enforces the upload ceiling, retries with
//! backoff, and validates/caches the result in the registry.
//!
//! Retry policy: a bounded budget with a fixed delay between attempts.
//! Rate-limit responses double the delay for subsequent attempts;
//! authentication failures short-circuit immediately since retrying cannot
//! help.

use std::path::Path;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use crate::config::Settings;
use crate::message::Direction;

/// Failures reported by a speech service.
#[derive(Debug, Error)]
pub enum TranscribeError {
    /// The service asked us to slow down.
    #[error("rate limited by transcription service")]
    RateLimited,

    /// Credentials rejected. Not retried.
    #[error("transcription authentication failed: {0}")]
    Auth(String),

    /// The file exceeds the service's upload ceiling.
    #[error("audio file too large: {size} bytes (limit {limit})")]
    TooLarge {
        /// Actual file size.
        size: u64,
        /// The enforced ceiling.
        limit: u64,
    },

    /// Any other service-side failure.
    #[error("transcription service error: {0}")]
    Api(String),
}

impl TranscribeError {
    /// Returns `true` when retrying the same request could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TranscribeError::RateLimited | TranscribeError::Api(_))
    }
}

/// An opaque speech-to-text provider.
///
/// One call per file; implementations may block. The core handles retries,
/// so implementations should report errors rather than retry internally.
pub trait Transcriber {
    /// Transcribes the audio file at `path` in the given language.
    fn transcribe(&mut self, path: &Path, language: &str) -> Result<String, TranscribeError>;
}

/// Returns `true` if the configured policy wants this direction transcribed.
pub fn should_transcribe(direction: Direction, settings: &Settings) -> bool {
    match direction {
        Direction::Received => settings.transcribe_received,
        Direction::Sent => settings.transcribe_sent,
        Direction::Unknown => false,
    }
}

/// Drives one file through the transcriber with the configured retry policy.
///
/// The upload ceiling is checked before the first attempt. Attempts are
/// bounded by `settings.max_retries`; rate limits double the inter-attempt
/// delay, auth failures return immediately.
pub fn transcribe_with_retries(
    transcriber: &mut dyn Transcriber,
    path: &Path,
    settings: &Settings,
) -> Result<String, TranscribeError> {
    let size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
    if size > settings.max_upload_bytes {
        return Err(TranscribeError::TooLarge {
            size,
            limit: settings.max_upload_bytes,
        });
    }

    let mut delay = settings.retry_delay;
    let mut last_error = TranscribeError::Api("no attempts made".to_string());

    for attempt in 1..=settings.max_retries.max(1) {
        match transcriber.transcribe(path, &settings.language) {
            Ok(text) => {
                debug!(path = %path.display(), attempt, "transcription succeeded");
                return Ok(text);
            }
            Err(err @ TranscribeError::Auth(_)) => {
                warn!(path = %path.display(), error = %err, "auth failure, not retrying");
                return Err(err);
            }
            Err(err) => {
                warn!(path = %path.display(), attempt, error = %err, "transcription attempt failed");
                let rate_limited = matches!(err, TranscribeError::RateLimited);
                last_error = err;
                if attempt < settings.max_retries.max(1) {
                    std::thread::sleep(delay);
                    if rate_limited {
                        delay *= 2;
                    }
                }
            }
        }
    }
    Err(last_error)
}
