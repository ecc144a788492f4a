//! Pipeline configuration.
//!
//! All tunables live in a single strongly-typed [`Settings`] struct, built
//! either programmatically (builder methods) or from a TOML file via
//! [`Settings::load`]. Historical settings files used inconsistent section
//! and key spellings (`[PATHS]`, `[Paths]`, `[paths]`; `html_dir` vs
//! `html_directory`); every legacy mapping is handled once, inside the
//! loader, so the rest of the crate only ever sees typed fields.
//!
//! # Example
//!
//! ```rust
//! use chatvault::config::Settings;
//!
//! let settings = Settings::new("/exports/html", "/exports/media", "/out")
//!     .with_transcribe_sent(true)
//!     .with_max_retries(3);
//! assert!(settings.validate().is_ok());
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ChatvaultError, Result};

/// Default bounded retry budget for external calls.
const DEFAULT_MAX_RETRIES: u32 = 5;
/// Default delay between retries, in seconds.
const DEFAULT_RETRY_DELAY_SECS: u64 = 10;
/// Upload ceiling enforced before calling the transcription service (25 MB).
const DEFAULT_MAX_UPLOAD_BYTES: u64 = 25 * 1024 * 1024;
/// Converted files below this size are treated as encoder failures.
const DEFAULT_MIN_AUDIO_BYTES: u64 = 1000;

/// Strongly-typed pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Directory containing the `.html` export files.
    pub html_dir: PathBuf,

    /// Root directory holding the media files referenced by the exports,
    /// optionally organized into type subdirectories.
    pub media_dir: PathBuf,

    /// Output root; the registry and per-contact trees live here.
    pub output_dir: PathBuf,

    /// Language hint passed to the transcription service (default: `"fr"`).
    pub language: String,

    /// Transcribe received voice notes (default: true).
    pub transcribe_received: bool,

    /// Transcribe sent voice notes (default: false).
    pub transcribe_sent: bool,

    /// Copy sent media into the contact tree (default: false — the export
    /// owner already has their own copies).
    pub organize_sent_media: bool,

    /// Reuse cached conversations for unchanged export files (default: true).
    pub incremental: bool,

    /// Bounded retry budget for external calls.
    pub max_retries: u32,

    /// Delay between retries; doubled on rate-limit responses.
    #[serde(with = "duration_secs")]
    pub retry_delay: Duration,

    /// Upload ceiling for the transcription service.
    pub max_upload_bytes: u64,

    /// Minimum plausible size of a converted audio file.
    pub min_audio_bytes: u64,
}

impl Settings {
    /// Creates settings for the three required directories, with defaults
    /// everywhere else.
    pub fn new(
        html_dir: impl Into<PathBuf>,
        media_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            html_dir: html_dir.into(),
            media_dir: media_dir.into(),
            output_dir: output_dir.into(),
            language: "fr".to_string(),
            transcribe_received: true,
            transcribe_sent: false,
            organize_sent_media: false,
            incremental: true,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: Duration::from_secs(DEFAULT_RETRY_DELAY_SECS),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            min_audio_bytes: DEFAULT_MIN_AUDIO_BYTES,
        }
    }

    /// Sets the transcription language hint.
    #[must_use]
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Enables or disables transcription of received voice notes.
    #[must_use]
    pub fn with_transcribe_received(mut self, enabled: bool) -> Self {
        self.transcribe_received = enabled;
        self
    }

    /// Enables or disables transcription of sent voice notes.
    #[must_use]
    pub fn with_transcribe_sent(mut self, enabled: bool) -> Self {
        self.transcribe_sent = enabled;
        self
    }

    /// Enables or disables organizing sent media.
    #[must_use]
    pub fn with_organize_sent_media(mut self, enabled: bool) -> Self {
        self.organize_sent_media = enabled;
        self
    }

    /// Enables or disables incremental parsing.
    #[must_use]
    pub fn with_incremental(mut self, enabled: bool) -> Self {
        self.incremental = enabled;
        self
    }

    /// Sets the retry budget.
    #[must_use]
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Sets the base retry delay.
    #[must_use]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Checks that the configuration is usable. This is the only run-fatal
    /// error class: everything downstream degrades per-item instead.
    pub fn validate(&self) -> Result<()> {
        if self.html_dir.as_os_str().is_empty() {
            return Err(ChatvaultError::invalid_config("html_dir is not set"));
        }
        if self.media_dir.as_os_str().is_empty() {
            return Err(ChatvaultError::invalid_config("media_dir is not set"));
        }
        if self.output_dir.as_os_str().is_empty() {
            return Err(ChatvaultError::invalid_config("output_dir is not set"));
        }
        Ok(())
    }

    /// Loads settings from a TOML file, resolving every legacy section and
    /// key spelling in one place.
    ///
    /// Accepted layouts:
    ///
    /// ```toml
    /// [paths]                     # also [Paths] / [PATHS]
    /// html_dir = "/exports/html"  # also html_directory, source_dir
    /// media_dir = "/exports/media"
    /// output_dir = "/out"         # also export_dir
    ///
    /// [processing]                # also [Processing]
    /// transcribe_received = true
    /// transcribe_sent = false
    /// organize_sent_media = false
    /// incremental = true
    ///
    /// [api]                       # also [API]
    /// language = "fr"
    /// max_retries = 5
    /// retry_delay = 10
    /// ```
    pub fn load(path: &Path) -> Result<Settings> {
        let raw = std::fs::read_to_string(path)?;
        let doc: toml::Value = toml::from_str(&raw)?;

        let paths = section(&doc, &["paths", "Paths", "PATHS"]);
        let html_dir = lookup_str(paths, &["html_dir", "html_directory", "source_dir"])
            .ok_or_else(|| ChatvaultError::invalid_config("missing paths.html_dir"))?;
        let media_dir = lookup_str(paths, &["media_dir", "media_directory"])
            .ok_or_else(|| ChatvaultError::invalid_config("missing paths.media_dir"))?;
        let output_dir = lookup_str(paths, &["output_dir", "export_dir", "output_directory"])
            .ok_or_else(|| ChatvaultError::invalid_config("missing paths.output_dir"))?;

        let mut settings = Settings::new(html_dir, media_dir, output_dir);

        let processing = section(&doc, &["processing", "Processing", "PROCESSING"]);
        if let Some(v) = lookup_bool(processing, &["transcribe_received"]) {
            settings.transcribe_received = v;
        }
        if let Some(v) = lookup_bool(processing, &["transcribe_sent"]) {
            settings.transcribe_sent = v;
        }
        if let Some(v) = lookup_bool(processing, &["organize_sent_media", "copy_sent_media"]) {
            settings.organize_sent_media = v;
        }
        if let Some(v) = lookup_bool(processing, &["incremental", "incremental_mode"]) {
            settings.incremental = v;
        }

        let api = section(&doc, &["api", "API", "Api"]);
        if let Some(v) = lookup_str(api, &["language", "lang"]) {
            settings.language = v;
        }
        if let Some(v) = lookup_int(api, &["max_retries", "retries"]) {
            settings.max_retries = u32::try_from(v).unwrap_or(DEFAULT_MAX_RETRIES);
        }
        if let Some(v) = lookup_int(api, &["retry_delay", "retry_delay_secs"]) {
            settings.retry_delay =
                Duration::from_secs(u64::try_from(v).unwrap_or(DEFAULT_RETRY_DELAY_SECS));
        }

        debug!(path = %path.display(), "settings loaded");
        settings.validate()?;
        Ok(settings)
    }

    /// Path of the registry document under the output directory.
    pub fn registry_path(&self) -> PathBuf {
        self.output_dir.join(".chatvault_registry.json")
    }
}

fn section<'a>(doc: &'a toml::Value, names: &[&str]) -> Option<&'a toml::Value> {
    names.iter().find_map(|name| doc.get(name))
}

fn lookup_str(section: Option<&toml::Value>, keys: &[&str]) -> Option<String> {
    let section = section?;
    keys.iter()
        .find_map(|k| section.get(k))
        .and_then(|v| v.as_str())
        .map(ToString::to_string)
}

fn lookup_bool(section: Option<&toml::Value>, keys: &[&str]) -> Option<bool> {
    let section = section?;
    keys.iter()
        .find_map(|k| section.get(k))
        .and_then(toml::Value::as_bool)
}

fn lookup_int(section: Option<&toml::Value>, keys: &[&str]) -> Option<i64> {
    let section = section?;
    keys.iter()
        .find_map(|k| section.get(k))
        .and_then(toml::Value::as_integer)
}

/// Serializes `retry_delay` as whole seconds.
mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let s = Settings::new("/h", "/m", "/o");
        assert!(s.transcribe_received);
        assert!(!s.transcribe_sent);
        assert!(!s.organize_sent_media);
        assert!(s.incremental);
        assert_eq!(s.max_retries, 5);
        assert_eq!(s.retry_delay, Duration::from_secs(10));
        assert_eq!(s.language, "fr");
    }

    #[test]
    fn test_builder() {
        let s = Settings::new("/h", "/m", "/o")
            .with_language("en")
            .with_transcribe_sent(true)
            .with_incremental(false)
            .with_max_retries(2)
            .with_retry_delay(Duration::from_secs(1));
        assert_eq!(s.language, "en");
        assert!(s.transcribe_sent);
        assert!(!s.incremental);
        assert_eq!(s.max_retries, 2);
    }

    #[test]
    fn test_validate_empty_path() {
        let s = Settings::new("", "/m", "/o");
        assert!(s.validate().unwrap_err().is_invalid_config());
    }

    #[test]
    fn test_load_modern_keys() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("settings.toml");
        std::fs::write(
            &file,
            r#"
[paths]
html_dir = "/exports/html"
media_dir = "/exports/media"
output_dir = "/out"

[processing]
transcribe_sent = true

[api]
language = "en"
retry_delay = 3
"#,
        )
        .unwrap();
        let s = Settings::load(&file).unwrap();
        assert_eq!(s.html_dir, PathBuf::from("/exports/html"));
        assert!(s.transcribe_sent);
        assert_eq!(s.language, "en");
        assert_eq!(s.retry_delay, Duration::from_secs(3));
    }

    #[test]
    fn test_load_legacy_section_and_keys() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("settings.toml");
        std::fs::write(
            &file,
            r#"
[PATHS]
html_directory = "/old/html"
media_dir = "/old/media"
export_dir = "/old/out"

[API]
retries = 2
"#,
        )
        .unwrap();
        let s = Settings::load(&file).unwrap();
        assert_eq!(s.html_dir, PathBuf::from("/old/html"));
        assert_eq!(s.output_dir, PathBuf::from("/old/out"));
        assert_eq!(s.max_retries, 2);
    }

    #[test]
    fn test_load_missing_required_key() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("settings.toml");
        std::fs::write(&file, "[paths]\nhtml_dir = \"/h\"\n").unwrap();
        let err = Settings::load(&file).unwrap_err();
        assert!(err.is_invalid_config());
    }

    #[test]
    fn test_registry_path() {
        let s = Settings::new("/h", "/m", "/o");
        assert_eq!(s.registry_path(), PathBuf::from("/o/.chatvault_registry.json"));
    }

    #[test]
    fn test_settings_serde_round_trip() {
        let s = Settings::new("/h", "/m", "/o").with_retry_delay(Duration::from_secs(7));
        let json = serde_json::to_string(&s).unwrap();
        let parsed: Settings = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.retry_delay, Duration::from_secs(7));
        assert_eq!(parsed.html_dir, s.html_dir);
    }
}
