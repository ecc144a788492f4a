//! Audio conversion and monthly consolidation.
//!
//! Voice notes arrive as `.opus`; the speech service and most players want
//! mp3. Conversion goes through the [`AudioEncoder`] capability one file at
//! a time (serial on purpose: external encoders contend badly), with the
//! output checked against a minimum plausible size before it is accepted.
//!
//! Converted files are additionally consolidated into one "super file" per
//! contact, direction and month, built by mp3 frame concatenation. The
//! registry remembers which source hashes went into each super file so
//! unchanged months are never rebuilt.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::error::{ChatvaultError, Result};
use crate::files::FileManager;
use crate::message::Direction;
use crate::registry::Registry;

/// An opaque audio encoder.
///
/// Implementations convert `source` to mp3 inside `dest_dir` and return the
/// output path. Exit-code handling is the implementation's concern; the
/// caller applies the output-size sanity check.
pub trait AudioEncoder {
    /// Converts one file, blocking until done.
    fn convert(&mut self, source: &Path, dest_dir: &Path) -> Result<PathBuf>;
}

/// Converts one file through the encoder with bounded retries and validates
/// the output.
///
/// An output smaller than `settings.min_audio_bytes` is treated as an
/// encoder failure even when the encoder reported success.
pub fn convert_with_checks(
    encoder: &mut dyn AudioEncoder,
    source: &Path,
    dest_dir: &Path,
    settings: &Settings,
) -> Result<PathBuf> {
    std::fs::create_dir_all(dest_dir)?;

    let attempts = settings.max_retries.max(1);
    let mut last_error =
        ChatvaultError::conversion(source, "no conversion attempts made");

    for attempt in 1..=attempts {
        match encoder.convert(source, dest_dir) {
            Ok(output) => {
                let size = std::fs::metadata(&output).map(|m| m.len()).unwrap_or(0);
                if size < settings.min_audio_bytes {
                    warn!(
                        source = %source.display(),
                        size,
                        "converted output below minimum size, discarding"
                    );
                    let _ = std::fs::remove_file(&output);
                    last_error = ChatvaultError::conversion(
                        source,
                        format!("output only {size} bytes (minimum {})", settings.min_audio_bytes),
                    );
                } else {
                    debug!(source = %source.display(), output = %output.display(), "conversion ok");
                    return Ok(output);
                }
            }
            Err(err) => {
                warn!(source = %source.display(), attempt, error = %err, "conversion attempt failed");
                last_error = err;
            }
        }
        if attempt < attempts {
            std::thread::sleep(settings.retry_delay);
        }
    }
    Err(last_error)
}

/// Extracts a `YYYY-MM` period from a filename, falling back to the file's
/// modification time.
///
/// Export filenames usually embed a date (`received_2025-04-13_voice.mp3`,
/// `PTT-20250413-WA0001.opus`); when they do not, the mtime is close enough
/// for monthly grouping.
pub fn extract_period(path: &Path) -> Option<String> {
    static PERIOD: OnceLock<Regex> = OnceLock::new();
    let pattern =
        PERIOD.get_or_init(|| Regex::new(r"(20\d{2})[-_]?(0[1-9]|1[0-2])").unwrap());

    if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
        if let Some(cap) = pattern.captures(name) {
            return Some(format!("{}-{}", &cap[1], &cap[2]));
        }
    }

    let modified = std::fs::metadata(path).and_then(|m| m.modified()).ok()?;
    let stamp: DateTime<Utc> = modified.into();
    Some(stamp.format("%Y-%m").to_string())
}

/// Groups files by their extracted period. Files with no derivable period
/// are dropped with a warning.
pub fn group_by_period(files: &[PathBuf]) -> BTreeMap<String, Vec<PathBuf>> {
    let mut groups: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    for file in files {
        match extract_period(file) {
            Some(period) => groups.entry(period).or_default().push(file.clone()),
            None => warn!(path = %file.display(), "no period derivable, excluded from grouping"),
        }
    }
    groups
}

/// Builds (or skips) the consolidated file for one contact/direction/period.
///
/// Returns the output path when a file was built, `None` when the recorded
/// super file already covers the same source set. mp3 streams concatenate
/// at frame boundaries, so plain byte concatenation in name order is valid.
pub fn build_super_file(
    registry: &mut Registry,
    files: &FileManager,
    contact: &str,
    direction: Direction,
    period: &str,
    sources: &[PathBuf],
) -> Result<Option<PathBuf>> {
    let hashes: Vec<String> = sources
        .iter()
        .filter_map(|source| registry.hash_of(source))
        .collect();
    if hashes.is_empty() {
        debug!(contact, period, "no hashable sources, nothing to consolidate");
        return Ok(None);
    }

    if !registry.needs_super_file_update(contact, direction, period, &hashes) {
        debug!(contact, period, "super file current, skipping");
        return Ok(None);
    }

    let dir = files.super_files_dir(contact);
    std::fs::create_dir_all(&dir)?;
    let dest = dir.join(format!("{}{period}.mp3", direction.file_prefix()));

    let mut out = std::fs::File::create(&dest)?;
    for source in sources {
        match std::fs::read(source) {
            Ok(bytes) => out.write_all(&bytes)?,
            Err(err) => {
                warn!(source = %source.display(), error = %err, "source unreadable, left out of super file");
            }
        }
    }
    out.flush()?;

    registry.register_super_file(contact, direction, period, &dest, hashes);
    info!(
        contact,
        period,
        sources = sources.len(),
        dest = %dest.display(),
        "super file built"
    );
    Ok(Some(dest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Fake encoder that writes a fixed payload, or fails on request.
    struct FakeEncoder {
        payload: Vec<u8>,
        failures_before_success: u32,
        calls: u32,
    }

    impl FakeEncoder {
        fn new(payload: Vec<u8>) -> Self {
            Self {
                payload,
                failures_before_success: 0,
                calls: 0,
            }
        }
    }

    impl AudioEncoder for FakeEncoder {
        fn convert(&mut self, source: &Path, dest_dir: &Path) -> Result<PathBuf> {
            self.calls += 1;
            if self.calls <= self.failures_before_success {
                return Err(ChatvaultError::conversion(source, "encoder exited non-zero"));
            }
            let stem = source.file_stem().and_then(|s| s.to_str()).unwrap_or("out");
            let dest = dest_dir.join(format!("{stem}.mp3"));
            std::fs::write(&dest, &self.payload)?;
            Ok(dest)
        }
    }

    fn settings(dir: &TempDir) -> Settings {
        Settings::new(dir.path(), dir.path(), dir.path())
            .with_max_retries(3)
            .with_retry_delay(std::time::Duration::ZERO)
    }

    #[test]
    fn test_convert_success() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("voice.opus");
        std::fs::write(&source, b"opus bytes").unwrap();

        let mut encoder = FakeEncoder::new(vec![0u8; 2000]);
        let out = convert_with_checks(&mut encoder, &source, &dir.path().join("mp3"), &settings(&dir))
            .unwrap();
        assert!(out.ends_with("voice.mp3"));
        assert_eq!(std::fs::metadata(&out).unwrap().len(), 2000);
    }

    #[test]
    fn test_convert_undersized_output_rejected() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("voice.opus");
        std::fs::write(&source, b"opus bytes").unwrap();

        // 12 bytes is well under the 1000-byte floor.
        let mut encoder = FakeEncoder::new(vec![0u8; 12]);
        let err = convert_with_checks(&mut encoder, &source, &dir.path().join("mp3"), &settings(&dir))
            .unwrap_err();
        assert!(err.is_conversion());
        assert_eq!(encoder.calls, 3);
        assert!(!dir.path().join("mp3/voice.mp3").exists());
    }

    #[test]
    fn test_convert_retries_encoder_failures() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("voice.opus");
        std::fs::write(&source, b"opus bytes").unwrap();

        let mut encoder = FakeEncoder::new(vec![0u8; 2000]);
        encoder.failures_before_success = 2;
        let out = convert_with_checks(&mut encoder, &source, &dir.path().join("mp3"), &settings(&dir));
        assert!(out.is_ok());
        assert_eq!(encoder.calls, 3);
    }

    #[test]
    fn test_extract_period_from_name() {
        assert_eq!(
            extract_period(Path::new("received_2025-04-13_voice.mp3")).as_deref(),
            Some("2025-04")
        );
        assert_eq!(
            extract_period(Path::new("PTT-20250413-WA0001.opus")).as_deref(),
            Some("2025-04")
        );
        assert_eq!(
            extract_period(Path::new("sent_2024_12_note.mp3")).as_deref(),
            Some("2024-12")
        );
    }

    #[test]
    fn test_extract_period_mtime_fallback() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("undated.mp3");
        std::fs::write(&path, b"bytes").unwrap();
        // A fresh file's mtime is now; just check the shape.
        let period = extract_period(&path).unwrap();
        assert_eq!(period.len(), 7);
        assert_eq!(&period[4..5], "-");
    }

    #[test]
    fn test_extract_period_none_for_missing_undated() {
        assert_eq!(extract_period(Path::new("/no/such/undated.mp3")), None);
    }

    #[test]
    fn test_group_by_period() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("received_2025-04-01.mp3");
        let b = dir.path().join("received_2025-04-20.mp3");
        let c = dir.path().join("received_2025-05-02.mp3");
        for p in [&a, &b, &c] {
            std::fs::write(p, b"x").unwrap();
        }

        let groups = group_by_period(&[a.clone(), b.clone(), c.clone()]);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups["2025-04"], vec![a, b]);
        assert_eq!(groups["2025-05"], vec![c]);
    }

    #[test]
    fn test_build_super_file_concatenates_and_skips_when_current() {
        let dir = TempDir::new().unwrap();
        let files = FileManager::new(dir.path().join("out"));
        let mut registry = Registry::new(dir.path().join("out/.chatvault_registry.json"));

        let a = dir.path().join("a.mp3");
        let b = dir.path().join("b.mp3");
        std::fs::write(&a, b"AAAA").unwrap();
        std::fs::write(&b, b"BBBB").unwrap();
        let sources = vec![a.clone(), b.clone()];

        let dest = build_super_file(&mut registry, &files, "Alice", Direction::Received, "2025-04", &sources)
            .unwrap()
            .unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"AAAABBBB");
        assert!(dest.ends_with("Alice/super_files/received_2025-04.mp3"));

        // Unchanged set: second build is a no-op.
        let again = build_super_file(&mut registry, &files, "Alice", Direction::Received, "2025-04", &sources)
            .unwrap();
        assert!(again.is_none());

        // Adding a source triggers a rebuild.
        let c = dir.path().join("c.mp3");
        std::fs::write(&c, b"CCCC").unwrap();
        let grown = vec![a, b, c];
        let rebuilt =
            build_super_file(&mut registry, &files, "Alice", Direction::Received, "2025-04", &grown)
                .unwrap();
        assert!(rebuilt.is_some());
        assert_eq!(std::fs::read(rebuilt.unwrap()).unwrap(), b"AAAABBBBCCCC");
    }
}
