//! Transcription lookup across the conversion boundary.
//!
//! Transcriptions are keyed by the content hash of whichever file was
//! actually submitted to the speech service. When an `.opus` voice note was
//! converted to `.mp3` first, the transcript hangs off the mp3's hash and a
//! direct lookup on the original misses. [`Reconciler`] layers three
//! strategies:
//!
//! 1. The original file's own hash (the original itself was transcribed).
//! 2. The registry's `converted_path` pointer: hash the converted file and
//!    look that up.
//! 3. Filename pattern matching against every recorded conversion — shared
//!    UUID-like token first, then a shared direction tag. This covers
//!    registry entries from runs that predate the `converted_path` pointer
//!    and is explicitly best-effort.
//!
//! Every result carries a [`MatchConfidence`] so that exporters can render a
//! guessed match differently from a certain one.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::{debug, warn};

use crate::message::MediaKind;
use crate::registry::Registry;

/// How sure the reconciler is that a transcript belongs to the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchConfidence {
    /// Resolved through a content hash, directly or via `converted_path`.
    Certain,
    /// Resolved through filename patterns only.
    Guessed,
}

/// A resolved transcript with its provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTranscript {
    /// The transcript text.
    pub text: String,
    /// How the match was made.
    pub confidence: MatchConfidence,
}

/// Resolves transcriptions for original audio files.
#[derive(Debug)]
pub struct Reconciler<'a> {
    registry: &'a Registry,
    uuid_token: Regex,
}

impl<'a> Reconciler<'a> {
    /// Creates a reconciler over the given registry.
    pub fn new(registry: &'a Registry) -> Self {
        Self {
            registry,
            uuid_token: Regex::new(
                r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}",
            )
            .unwrap(),
        }
    }

    /// Builds the original-path to converted-path map from the registry.
    pub fn original_to_converted_map(&self) -> BTreeMap<PathBuf, PathBuf> {
        self.registry
            .doc()
            .files
            .values()
            .filter_map(|record| {
                record
                    .converted_path
                    .as_ref()
                    .map(|converted| (record.path.clone(), converted.clone()))
            })
            .collect()
    }

    /// Resolves the transcription for `audio_path`, if any exists.
    pub fn resolve_transcription(&self, audio_path: &Path) -> Option<ResolvedTranscript> {
        // 1. The original's own hash.
        if let Some(hash) = self.registry.hash_of(audio_path) {
            if let Some(record) = self.registry.transcription(&hash) {
                debug!(path = %audio_path.display(), "transcript found by original hash");
                return Some(ResolvedTranscript {
                    text: record.text.clone(),
                    confidence: MatchConfidence::Certain,
                });
            }

            // 2. The recorded conversion's hash.
            if needs_conversion(audio_path) {
                if let Some(converted) = self.registry.conversion(&hash) {
                    if let Some(converted_hash) = self.registry.hash_of(converted) {
                        if let Some(record) = self.registry.transcription(&converted_hash) {
                            debug!(
                                path = %audio_path.display(),
                                converted = %converted.display(),
                                "transcript found via converted_path"
                            );
                            return Some(ResolvedTranscript {
                                text: record.text.clone(),
                                confidence: MatchConfidence::Certain,
                            });
                        }
                    }
                }
            }
        }

        // 3. Legacy recovery by filename patterns.
        self.resolve_by_pattern(audio_path)
    }

    /// Pattern fallback: shared UUID token, then shared direction tag.
    fn resolve_by_pattern(&self, audio_path: &Path) -> Option<ResolvedTranscript> {
        let name = audio_path.file_name()?.to_str()?;
        let token = self.uuid_token.find(name).map(|m| m.as_str().to_lowercase());
        let tag = direction_tag(name);

        for record in self.registry.doc().files.values() {
            let Some(converted) = record.converted_path.as_ref() else {
                continue;
            };
            let Some(converted_name) = converted.file_name().and_then(|n| n.to_str()) else {
                continue;
            };

            let matched = match &token {
                Some(token) => converted_name.to_lowercase().contains(token),
                None => tag.is_some() && direction_tag(converted_name) == tag,
            };
            if !matched {
                continue;
            }

            if let Some(hash) = self.registry.hash_of(converted) {
                if let Some(transcript) = self.registry.transcription(&hash) {
                    warn!(
                        path = %audio_path.display(),
                        matched = %converted.display(),
                        "transcript matched by filename pattern only"
                    );
                    return Some(ResolvedTranscript {
                        text: transcript.text.clone(),
                        confidence: MatchConfidence::Guessed,
                    });
                }
            }
        }
        None
    }
}

/// Formats that must be converted before the speech service accepts them.
pub fn needs_conversion(path: &Path) -> bool {
    if MediaKind::for_path(path) != MediaKind::Audio {
        return false;
    }
    !path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("mp3"))
}

fn direction_tag(name: &str) -> Option<&'static str> {
    let lower = name.to_lowercase();
    // "received" contains no "sent", so the order is safe.
    if lower.contains("received") {
        Some("received")
    } else if lower.contains("sent") {
        Some("sent")
    } else {
        None
    }
}
