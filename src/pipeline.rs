//! The end-to-end batch pipeline.
//!
//! One [`Pipeline::run`] performs, in order: export parsing with media
//! organization, audio conversion, transcription, super-file consolidation,
//! and conversation-text rendering, then saves the registry and reports
//! [`RunStats`]. Everything is single-threaded and blocking: one file, one
//! external call at a time.
//!
//! Failure policy: configuration problems abort before any work; everything
//! after that is per-item — logged, counted, and skipped.
//!
//! Incremental runs lean on the registry's content addressing: an export
//! file whose hash is already registered has not changed (same content,
//! same hash), so its conversation is served from the per-contact JSON
//! cache instead of being reparsed.

use std::collections::BTreeMap;
use std::path::PathBuf;

use tracing::{debug, error, info, warn};

use crate::audio::{build_super_file, convert_with_checks, group_by_period, AudioEncoder};
use crate::config::Settings;
use crate::error::Result;
use crate::export;
use crate::files::FileManager;
use crate::media::{MediaOrganizer, OrganizeOutcome};
use crate::message::{Direction, MediaKind, Message};
use crate::parser::ExportParser;
use crate::reconcile::{needs_conversion, Reconciler};
use crate::registry::Registry;
use crate::stats::RunStats;
use crate::transcribe::{should_transcribe, transcribe_with_retries, TranscribeError, Transcriber};

/// Owns the stages and the shared state of one processing run.
#[derive(Debug)]
pub struct Pipeline {
    settings: Settings,
    registry: Registry,
    files: FileManager,
    parser: ExportParser,
    organizer: MediaOrganizer,
}

impl Pipeline {
    /// Builds a pipeline from validated settings, loading (and migrating if
    /// needed) the registry under the output directory.
    pub fn new(settings: Settings) -> Result<Self> {
        settings.validate()?;
        let registry = Registry::load(&settings.registry_path());
        let files = FileManager::new(&settings.output_dir);
        let organizer = MediaOrganizer::new(&settings.media_dir, settings.organize_sent_media);
        Ok(Self {
            settings,
            registry,
            files,
            parser: ExportParser::new(),
            organizer,
        })
    }

    /// Read access to the registry, mainly for exporters and tests.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Runs every stage. Encoder and transcriber are optional capabilities;
    /// stages whose capability is absent are skipped.
    pub fn run(
        &mut self,
        encoder: Option<&mut dyn AudioEncoder>,
        transcriber: Option<&mut dyn Transcriber>,
    ) -> Result<RunStats> {
        let mut stats = RunStats::new();

        let conversations = self.extract_conversations(&mut stats)?;

        if let Some(encoder) = encoder {
            self.convert_audio(encoder, &mut stats);
        } else {
            debug!("no encoder provided, conversion stage skipped");
        }

        if let Some(transcriber) = transcriber {
            self.transcribe_audio(transcriber, &mut stats);
        } else {
            debug!("no transcriber provided, transcription stage skipped");
        }

        self.build_super_files(&mut stats);

        {
            let reconciler = Reconciler::new(&self.registry);
            for (contact, messages) in &conversations {
                if let Err(err) =
                    export::write_conversation_text(&self.files, contact, messages, Some(&reconciler))
                {
                    warn!(contact = %contact, error = %err, "conversation text not written");
                }
            }
        }

        self.registry.save();
        stats.log_summary();
        Ok(stats)
    }

    /// Stage 1: parse exports (or reuse caches), organize media, register
    /// everything.
    fn extract_conversations(&mut self, stats: &mut RunStats) -> Result<BTreeMap<String, Vec<Message>>> {
        let html_files = self.parser.list_export_files(&self.settings.html_dir)?;
        stats.exports_found = html_files.len();
        info!(
            count = html_files.len(),
            dir = %self.settings.html_dir.display(),
            "export files found"
        );

        let mut conversations = BTreeMap::new();
        for (i, file) in html_files.iter().enumerate() {
            if self.settings.incremental {
                if let Some(contact) = self.registry.record_for(file).map(|r| r.contact.clone()) {
                    if let Some(cached) = self.load_cached(&contact) {
                        debug!(contact = %contact, file = %file.display(), "export unchanged, cache reused");
                        conversations.insert(contact, cached);
                        stats.exports_cached += 1;
                        continue;
                    }
                }
            }

            info!(
                file = %file.display(),
                progress = %format!("{}/{}", i + 1, html_files.len()),
                "parsing export"
            );
            let parsed = match self.parser.parse_file(file) {
                Ok(parsed) => parsed,
                Err(err) => {
                    warn!(file = %file.display(), error = %err, "export skipped");
                    stats.exports_failed += 1;
                    continue;
                }
            };

            if let Err(err) = self.files.ensure_contact_tree(&parsed.contact) {
                warn!(contact = %parsed.contact, error = %err, "contact tree not created, export skipped");
                stats.exports_failed += 1;
                continue;
            }

            let mut messages = parsed.messages;
            for message in &mut messages {
                match self
                    .organizer
                    .organize(message, &parsed.contact, &self.files, &mut self.registry)
                {
                    Ok(OrganizeOutcome::Organized(dest)) => {
                        message.media_path = Some(dest);
                        stats.media_organized += 1;
                    }
                    Ok(OrganizeOutcome::Missing) => stats.media_missing += 1,
                    Ok(OrganizeOutcome::NoMedia | OrganizeOutcome::SkippedByPolicy) => {}
                    Err(err) => {
                        warn!(contact = %parsed.contact, error = %err, "media not organized");
                        stats.media_missing += 1;
                    }
                }
            }

            if let Some(hash) = self.registry.register_file(
                file,
                &parsed.contact,
                Direction::Unknown,
                Some(MediaKind::Html),
            ) {
                self.registry
                    .annotate(&hash, "message_count", messages.len().to_string());
            }

            self.save_cache(&parsed.contact, &messages);
            stats.exports_parsed += 1;
            conversations.insert(parsed.contact, messages);
        }
        Ok(conversations)
    }

    /// Stage 2: convert every registered audio file that still needs it.
    fn convert_audio(&mut self, encoder: &mut dyn AudioEncoder, stats: &mut RunStats) {
        let targets: Vec<(String, PathBuf, String)> = self
            .registry
            .doc()
            .files
            .iter()
            .filter(|(_, record)| {
                record.kind == MediaKind::Audio
                    && record.converted_path.is_none()
                    && needs_conversion(&record.path)
                    && record.path.exists()
            })
            .map(|(hash, record)| (hash.clone(), record.path.clone(), record.contact.clone()))
            .collect();

        info!(count = targets.len(), "audio files needing conversion");
        for (hash, path, contact) in targets {
            let dest_dir = self.files.mp3_dir(&contact);
            match convert_with_checks(encoder, &path, &dest_dir, &self.settings) {
                Ok(output) => {
                    self.registry.register_conversion(&hash, &output);
                    stats.conversions += 1;
                }
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "conversion abandoned");
                    stats.conversion_failures += 1;
                }
            }
        }
    }

    /// Stage 3: transcribe audio files matching the direction policy.
    ///
    /// Files in formats the service rejects are submitted through their
    /// converted rendition; without one they are skipped until a later run
    /// converts them. An authentication failure aborts the whole stage.
    fn transcribe_audio(&mut self, transcriber: &mut dyn Transcriber, stats: &mut RunStats) {
        let candidates: Vec<(String, PathBuf, Option<PathBuf>, String)> = self
            .registry
            .doc()
            .files
            .iter()
            .filter(|(_, record)| {
                record.kind == MediaKind::Audio && should_transcribe(record.direction, &self.settings)
            })
            .map(|(hash, record)| {
                (
                    hash.clone(),
                    record.path.clone(),
                    record.converted_path.clone(),
                    record.contact.clone(),
                )
            })
            .collect();

        info!(count = candidates.len(), "transcription candidates");
        for (hash, path, converted, contact) in candidates {
            let submit = if needs_conversion(&path) {
                match converted {
                    Some(converted) if converted.exists() => converted,
                    _ => {
                        debug!(path = %path.display(), "no converted rendition yet, deferred");
                        continue;
                    }
                }
            } else {
                path.clone()
            };

            let Some(submit_hash) = self.registry.hash_of(&submit) else {
                continue;
            };
            if self.registry.transcription(&submit_hash).is_some()
                || self.registry.transcription(&hash).is_some()
            {
                debug!(path = %path.display(), "already transcribed");
                continue;
            }

            match transcribe_with_retries(transcriber, &submit, &self.settings) {
                Ok(text) => {
                    self.registry.register_transcription(&submit_hash, &text);
                    if self.registry.transcription(&submit_hash).is_some() {
                        let name = submit
                            .file_name()
                            .and_then(|n| n.to_str())
                            .unwrap_or("transcript");
                        if let Err(err) = export::write_transcript_file(&self.files, &contact, name, &text) {
                            warn!(contact = %contact, error = %err, "transcript file not written");
                        }
                        stats.transcriptions += 1;
                    } else {
                        warn!(path = %submit.display(), "service returned unusable text, will retry next run");
                        stats.transcription_failures += 1;
                    }
                }
                Err(err @ TranscribeError::Auth(_)) => {
                    error!(error = %err, "credentials rejected, transcription stage aborted");
                    stats.transcription_failures += 1;
                    break;
                }
                Err(err) => {
                    warn!(path = %submit.display(), error = %err, "transcription abandoned");
                    stats.transcription_failures += 1;
                }
            }
        }
    }

    /// Stage 4: consolidate converted audio per contact, direction and month.
    fn build_super_files(&mut self, stats: &mut RunStats) {
        let contacts: Vec<String> = self.registry.doc().contacts.keys().cloned().collect();
        for contact in contacts {
            let entries: Vec<(Direction, PathBuf)> = self
                .registry
                .doc()
                .files
                .values()
                .filter(|record| record.contact == contact && record.kind == MediaKind::Audio)
                .filter_map(|record| {
                    record
                        .converted_path
                        .clone()
                        .map(|converted| (record.direction, converted))
                })
                .filter(|(_, converted)| converted.exists())
                .collect();

            for direction in [Direction::Received, Direction::Sent] {
                let mut paths: Vec<PathBuf> = entries
                    .iter()
                    .filter(|(d, _)| *d == direction)
                    .map(|(_, converted)| converted.clone())
                    .collect();
                paths.sort();

                for (period, group) in group_by_period(&paths) {
                    match build_super_file(
                        &mut self.registry,
                        &self.files,
                        &contact,
                        direction,
                        &period,
                        &group,
                    ) {
                        Ok(Some(_)) => stats.super_files_built += 1,
                        Ok(None) => {}
                        Err(err) => {
                            warn!(contact = %contact, period = %period, error = %err, "super file not built");
                        }
                    }
                }
            }
        }
    }

    fn cache_path(&self, contact: &str) -> PathBuf {
        self.files.contact_dir(contact).join("conversation.json")
    }

    fn load_cached(&self, contact: &str) -> Option<Vec<Message>> {
        let raw = std::fs::read_to_string(self.cache_path(contact)).ok()?;
        match serde_json::from_str(&raw) {
            Ok(messages) => Some(messages),
            Err(err) => {
                warn!(contact = %contact, error = %err, "conversation cache unreadable, reparsing");
                None
            }
        }
    }

    /// Cache write failures only cost a reparse next run.
    fn save_cache(&self, contact: &str, messages: &[Message]) {
        let path = self.cache_path(contact);
        let result = std::fs::create_dir_all(self.files.contact_dir(contact))
            .map_err(crate::error::ChatvaultError::from)
            .and_then(|()| Ok(serde_json::to_string_pretty(messages)?))
            .and_then(|json| Ok(std::fs::write(&path, json)?));
        if let Err(err) = result {
            warn!(contact = %contact, error = %err, "conversation cache not written");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    const EXPORT: &str = r##"<html><head><title>x</title></head><body>
<h3>Alice</h3>
<p class="date"><font color="#b4b4b4">2025/04/13 21:06</font></p>
<p class="triangle-isosceles"><font>Bonjour!</font></p>
<p class="date"><font color="#b4b4b4">2025/04/13 21:08</font></p>
<table class="triangle-isosceles"><tr><td><a href="media/voice.opus">audio</a></td></tr></table>
</body></html>"##;

    fn setup(dir: &TempDir) -> Settings {
        let html_dir = dir.path().join("html");
        let media_dir = dir.path().join("media");
        std::fs::create_dir_all(&html_dir).unwrap();
        std::fs::create_dir_all(media_dir.join("audio")).unwrap();
        std::fs::write(html_dir.join("alice.html"), EXPORT).unwrap();
        std::fs::write(media_dir.join("audio/voice.opus"), b"opus content").unwrap();
        Settings::new(html_dir, media_dir, dir.path().join("out"))
            .with_retry_delay(Duration::ZERO)
    }

    #[test]
    fn test_run_without_capabilities() {
        let dir = TempDir::new().unwrap();
        let mut pipeline = Pipeline::new(setup(&dir)).unwrap();
        let stats = pipeline.run(None, None).unwrap();

        assert_eq!(stats.exports_found, 1);
        assert_eq!(stats.exports_parsed, 1);
        assert_eq!(stats.media_organized, 1);
        assert_eq!(stats.conversions, 0);
        assert!(stats.is_healthy());

        let out = dir.path().join("out");
        assert!(out.join("Alice/media_received/audio/received_voice.opus").exists());
        assert!(out.join("Alice/conversation.json").exists());
        assert!(out.join("Alice/Alice_conversation.txt").exists());
        assert!(out.join(".chatvault_registry.json").exists());
    }

    #[test]
    fn test_second_run_uses_cache() {
        let dir = TempDir::new().unwrap();
        let settings = setup(&dir);

        let mut pipeline = Pipeline::new(settings.clone()).unwrap();
        pipeline.run(None, None).unwrap();

        // Fresh pipeline, same state on disk.
        let mut pipeline = Pipeline::new(settings).unwrap();
        let stats = pipeline.run(None, None).unwrap();
        assert_eq!(stats.exports_cached, 1);
        assert_eq!(stats.exports_parsed, 0);
        // No double counting in the registry.
        let stats = &pipeline.registry().doc().contacts["Alice"].stats;
        assert_eq!(stats.audio_files, 1);
    }

    #[test]
    fn test_modified_export_is_reparsed() {
        let dir = TempDir::new().unwrap();
        let settings = setup(&dir);

        let mut pipeline = Pipeline::new(settings.clone()).unwrap();
        pipeline.run(None, None).unwrap();

        // Append a message; the content hash changes.
        let html_file = settings.html_dir.join("alice.html");
        let updated = EXPORT.replace(
            "</body></html>",
            r##"<p class="date"><font color="#b4b4b4">2025/04/15 10:00</font></p>
<p class="triangle-isosceles2"><font>bis</font></p></body></html>"##,
        );
        std::fs::write(&html_file, updated).unwrap();

        let mut pipeline = Pipeline::new(settings).unwrap();
        let stats = pipeline.run(None, None).unwrap();
        assert_eq!(stats.exports_parsed, 1);
        assert_eq!(stats.exports_cached, 0);
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let err = Pipeline::new(Settings::new("", "/m", "/o")).unwrap_err();
        assert!(err.is_invalid_config());
    }

    #[test]
    fn test_unparseable_export_is_counted_not_fatal() {
        let dir = TempDir::new().unwrap();
        let settings = setup(&dir);
        std::fs::write(settings.html_dir.join("broken.html"), "<html></html>").unwrap();

        let mut pipeline = Pipeline::new(settings).unwrap();
        let stats = pipeline.run(None, None).unwrap();
        assert_eq!(stats.exports_found, 2);
        assert_eq!(stats.exports_parsed, 1);
        assert_eq!(stats.exports_failed, 1);
    }
}
