//! Media resolution and organization.
//!
//! The export markup references media by filename only; the files themselves
//! sit in a separate media directory, sometimes loose, sometimes pre-sorted
//! into type subdirectories. [`MediaOrganizer`] locates each referenced file,
//! copies it into the contact's tree via the [`FileManager`], and registers
//! the copy. References that cannot be resolved produce a `.missing`
//! placeholder instead of failing the message.
//!
//! Sent media is skipped by default (`organize_sent_media = false`): the
//! export owner already has those files. The flag exists for full-archive
//! runs.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::files::FileManager;
use crate::message::{Direction, Message};
use crate::registry::Registry;

/// Subdirectories of the media root that may hold referenced files.
const SEARCH_SUBDIRS: &[&str] = &["audio", "images", "videos", "documents"];

/// What happened to one media reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrganizeOutcome {
    /// The file was located and copied to this path.
    Organized(PathBuf),
    /// The message carries no media reference.
    NoMedia,
    /// Sent media skipped because `organize_sent_media` is off.
    SkippedByPolicy,
    /// The referenced file was not found; a placeholder was written.
    Missing,
}

/// Locates referenced media and files it into the contact tree.
#[derive(Debug)]
pub struct MediaOrganizer {
    media_dir: PathBuf,
    organize_sent: bool,
}

impl MediaOrganizer {
    /// Creates an organizer over the given media root.
    pub fn new(media_dir: impl Into<PathBuf>, organize_sent: bool) -> Self {
        Self {
            media_dir: media_dir.into(),
            organize_sent,
        }
    }

    /// Resolves and organizes the media referenced by `message`.
    ///
    /// A located file is copied into the contact tree and registered; an
    /// unresolvable reference gets a placeholder. Neither outcome is an
    /// error — only actual I/O failures during the copy are.
    pub fn organize(
        &self,
        message: &Message,
        contact: &str,
        files: &FileManager,
        registry: &mut Registry,
    ) -> Result<OrganizeOutcome> {
        let Some(original_name) = message.original_name.as_deref() else {
            return Ok(OrganizeOutcome::NoMedia);
        };

        if message.direction == Direction::Sent && !self.organize_sent {
            debug!(contact, original_name, "sent media skipped by policy");
            return Ok(OrganizeOutcome::SkippedByPolicy);
        }

        let Some(source) = self.find_media_file(original_name) else {
            warn!(contact, original_name, "referenced media not found");
            files.write_missing_placeholder(original_name, contact, message.direction, message.kind)?;
            return Ok(OrganizeOutcome::Missing);
        };

        let dest = files.copy_media(&source, contact, message.direction, message.kind)?;

        if let Some(hash) = registry.register_file(&dest, contact, message.direction, Some(message.kind)) {
            registry.annotate(&hash, "original_name", original_name);
            registry.annotate(&hash, "date", message.date.to_string());
        }

        info!(
            contact,
            original_name,
            dest = %dest.display(),
            "media organized"
        );
        Ok(OrganizeOutcome::Organized(dest))
    }

    /// Searches the media root and its type subdirectories for `filename`.
    fn find_media_file(&self, filename: &str) -> Option<PathBuf> {
        let direct = self.media_dir.join(filename);
        if direct.exists() {
            return Some(direct);
        }
        SEARCH_SUBDIRS
            .iter()
            .map(|subdir| self.media_dir.join(subdir).join(filename))
            .find(|candidate| candidate.exists())
    }

    /// The media root this organizer searches.
    pub fn media_dir(&self) -> &Path {
        &self.media_dir
    }
}
