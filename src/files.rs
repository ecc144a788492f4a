//! Output tree management.
//!
//! [`FileManager`] owns the per-contact directory layout under the output
//! root and every filename decision made when media is copied into it:
//!
//! ```text
//! <output>/<Contact>/
//!     media_received/{audio,images,videos,documents}/
//!     media_sent/{audio,images,videos,documents}/
//!     audio_mp3/
//!     super_files/
//!     transcripts/
//!     exports/
//! ```
//!
//! Copied media keeps its original name behind a direction prefix
//! (`received_voice.opus`); name collisions get a numeric suffix. Media the
//! export references but the media directory does not contain is recorded
//! as a `.missing` placeholder so the gap is visible in the tree.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

use crate::error::Result;
use crate::message::{Direction, MediaKind};

/// Maximum length of a sanitized name component.
const MAX_NAME_LEN: usize = 100;

/// The media-type subdirectories created under each direction folder.
const MEDIA_SUBDIRS: &[&str] = &["audio", "images", "videos", "documents"];

/// Reduces an arbitrary contact or file name to a safe path component.
///
/// Anything outside `[a-zA-Z0-9-_ ]` becomes `_`, the result is truncated
/// to 100 characters and trimmed. Names that sanitize to nothing get a
/// time-derived fallback so two anonymous contacts cannot collide on the
/// same run of underscores.
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | ' ') {
                ch
            } else {
                '_'
            }
        })
        .take(MAX_NAME_LEN)
        .collect();
    let trimmed = cleaned.trim();

    if trimmed.is_empty() || trimmed.chars().all(|ch| ch == '_') {
        let tag = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() % 10_000)
            .unwrap_or(0);
        return format!("contact_{tag}");
    }
    trimmed.to_string()
}

/// Creates and names everything under the output root.
#[derive(Debug)]
pub struct FileManager {
    output_dir: PathBuf,
}

impl FileManager {
    /// Creates a manager rooted at `output_dir`. The root itself is created
    /// lazily, on the first contact tree.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// The output root.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// The (sanitized) directory for `contact`, without creating it.
    pub fn contact_dir(&self, contact: &str) -> PathBuf {
        self.output_dir.join(sanitize_filename(contact))
    }

    /// Creates the full per-contact tree and returns its root.
    pub fn ensure_contact_tree(&self, contact: &str) -> Result<PathBuf> {
        let root = self.contact_dir(contact);
        for direction in ["media_received", "media_sent"] {
            for subdir in MEDIA_SUBDIRS {
                std::fs::create_dir_all(root.join(direction).join(subdir))?;
            }
        }
        for dir in ["audio_mp3", "super_files", "transcripts", "exports"] {
            std::fs::create_dir_all(root.join(dir))?;
        }
        debug!(contact, path = %root.display(), "contact tree ready");
        Ok(root)
    }

    /// The direction/kind media directory for a contact, without creating it.
    pub fn media_dir(&self, contact: &str, direction: Direction, kind: MediaKind) -> PathBuf {
        let direction_dir = match direction {
            Direction::Sent => "media_sent",
            // Unknown-direction media files in the tree as received.
            Direction::Received | Direction::Unknown => "media_received",
        };
        self.contact_dir(contact)
            .join(direction_dir)
            .join(kind.media_subdir())
    }

    /// The per-contact converted-audio directory.
    pub fn mp3_dir(&self, contact: &str) -> PathBuf {
        self.contact_dir(contact).join("audio_mp3")
    }

    /// The per-contact consolidated-audio directory.
    pub fn super_files_dir(&self, contact: &str) -> PathBuf {
        self.contact_dir(contact).join("super_files")
    }

    /// The per-contact transcript directory.
    pub fn transcripts_dir(&self, contact: &str) -> PathBuf {
        self.contact_dir(contact).join("transcripts")
    }

    /// The per-contact conversation-export directory.
    pub fn exports_dir(&self, contact: &str) -> PathBuf {
        self.contact_dir(contact).join("exports")
    }

    /// Copies `src` into the contact's tree under a direction-prefixed name
    /// and returns the destination path.
    ///
    /// Existing identical destinations are reused without copying; a name
    /// already taken by different content gets a `_1`, `_2`, ... suffix.
    pub fn copy_media(
        &self,
        src: &Path,
        contact: &str,
        direction: Direction,
        kind: MediaKind,
    ) -> Result<PathBuf> {
        let dir = self.media_dir(contact, direction, kind);
        std::fs::create_dir_all(&dir)?;

        // Sanitize the stem only; the extension must survive intact.
        let stem = src
            .file_stem()
            .and_then(|s| s.to_str())
            .map_or_else(|| "file".to_string(), sanitize_filename);
        let named = match src.extension().and_then(|e| e.to_str()) {
            Some(ext) => format!("{}{stem}.{ext}", direction.file_prefix()),
            None => format!("{}{stem}", direction.file_prefix()),
        };
        let dest = unique_path(&dir.join(named), src);

        if dest.exists() {
            debug!(dest = %dest.display(), "destination already current");
            return Ok(dest);
        }
        std::fs::copy(src, &dest)?;
        debug!(src = %src.display(), dest = %dest.display(), "media copied");
        Ok(dest)
    }

    /// Lists a contact's organized audio files, optionally filtered by
    /// direction. Placeholders are excluded.
    pub fn audio_files(&self, contact: &str, direction: Option<Direction>) -> Result<Vec<PathBuf>> {
        let dirs: Vec<PathBuf> = match direction {
            Some(d) => vec![self.media_dir(contact, d, MediaKind::Audio)],
            None => vec![
                self.media_dir(contact, Direction::Received, MediaKind::Audio),
                self.media_dir(contact, Direction::Sent, MediaKind::Audio),
            ],
        };

        let mut files = Vec::new();
        for dir in dirs {
            if !dir.exists() {
                continue;
            }
            for entry in std::fs::read_dir(&dir)? {
                let path = entry?.path();
                if path.is_file() && MediaKind::for_path(&path) == MediaKind::Audio {
                    files.push(path);
                }
            }
        }
        files.sort();
        Ok(files)
    }

    /// Lists a contact's converted mp3 files, sorted by name. Converted
    /// files keep their direction prefix, so an optional direction filter
    /// applies to the filename.
    pub fn mp3_files(&self, contact: &str, direction: Option<Direction>) -> Result<Vec<PathBuf>> {
        let dir = self.mp3_dir(contact);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut files: Vec<PathBuf> = std::fs::read_dir(&dir)?
            .filter_map(std::result::Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("mp3"))
            })
            .filter(|path| {
                direction.is_none_or(|d| {
                    path.file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|name| name.starts_with(d.file_prefix()))
                })
            })
            .collect();
        files.sort();
        Ok(files)
    }

    /// Records an unresolvable media reference as a `.missing` placeholder
    /// in the slot the real file would occupy.
    pub fn write_missing_placeholder(
        &self,
        original_name: &str,
        contact: &str,
        direction: Direction,
        kind: MediaKind,
    ) -> Result<PathBuf> {
        let dir = self.media_dir(contact, direction, kind);
        std::fs::create_dir_all(&dir)?;
        let named = format!(
            "{}{}.missing",
            direction.file_prefix(),
            sanitize_filename(original_name)
        );
        let dest = dir.join(named);
        if !dest.exists() {
            std::fs::write(&dest, original_name.as_bytes())?;
            warn!(contact, original_name, "media not found, placeholder written");
        }
        Ok(dest)
    }
}

/// Resolves name collisions against existing files with different content.
///
/// Returns `candidate` when it is free or already holds the same bytes as
/// `src`; otherwise appends `_1`, `_2`, ... to the stem.
fn unique_path(candidate: &Path, src: &Path) -> PathBuf {
    if !candidate.exists() || same_content(candidate, src) {
        return candidate.to_path_buf();
    }

    let stem = candidate
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("file");
    let ext = candidate.extension().and_then(|e| e.to_str());
    let parent = candidate.parent().unwrap_or_else(|| Path::new(""));

    for counter in 1u32.. {
        let name = match ext {
            Some(ext) => format!("{stem}_{counter}.{ext}"),
            None => format!("{stem}_{counter}"),
        };
        let next = parent.join(name);
        if !next.exists() || same_content(&next, src) {
            return next;
        }
    }
    unreachable!("counter space exhausted");
}

/// Byte equality, with a size check first so mismatched files are rejected
/// without reading either one.
fn same_content(a: &Path, b: &Path) -> bool {
    match (std::fs::metadata(a), std::fs::metadata(b)) {
        (Ok(ma), Ok(mb)) if ma.len() == mb.len() => {}
        _ => return false,
    }
    match (std::fs::read(a), std::fs::read(b)) {
        (Ok(bytes_a), Ok(bytes_b)) => bytes_a == bytes_b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sanitize_basic() {
        assert_eq!(sanitize_filename("Alice Dupont"), "Alice Dupont");
        assert_eq!(sanitize_filename("+33 6 12 34"), "_33 6 12 34");
        assert_eq!(sanitize_filename("a/b\\c:d"), "a_b_c_d");
        assert_eq!(sanitize_filename("  padded  "), "padded");
    }

    #[test]
    fn test_sanitize_truncates() {
        let long = "x".repeat(300);
        assert_eq!(sanitize_filename(&long).len(), MAX_NAME_LEN);
    }

    #[test]
    fn test_sanitize_empty_gets_fallback() {
        let name = sanitize_filename("///");
        assert!(name.starts_with("contact_"), "got {name}");
        let name = sanitize_filename("");
        assert!(name.starts_with("contact_"));
    }

    #[test]
    fn test_contact_tree_layout() {
        let dir = TempDir::new().unwrap();
        let manager = FileManager::new(dir.path());
        let root = manager.ensure_contact_tree("Alice").unwrap();

        assert!(root.join("media_received/audio").is_dir());
        assert!(root.join("media_received/images").is_dir());
        assert!(root.join("media_sent/videos").is_dir());
        assert!(root.join("media_sent/documents").is_dir());
        assert!(root.join("audio_mp3").is_dir());
        assert!(root.join("super_files").is_dir());
        assert!(root.join("transcripts").is_dir());
        assert!(root.join("exports").is_dir());
    }

    #[test]
    fn test_copy_media_prefixes_and_routes() {
        let dir = TempDir::new().unwrap();
        let manager = FileManager::new(dir.path().join("out"));
        let src = dir.path().join("voice.opus");
        std::fs::write(&src, b"opus bytes").unwrap();

        let dest = manager
            .copy_media(&src, "Alice", Direction::Received, MediaKind::Audio)
            .unwrap();
        assert!(dest.ends_with("Alice/media_received/audio/received_voice.opus"));
        assert_eq!(std::fs::read(&dest).unwrap(), b"opus bytes");
    }

    #[test]
    fn test_copy_media_collision_suffix() {
        let dir = TempDir::new().unwrap();
        let manager = FileManager::new(dir.path().join("out"));
        let first = dir.path().join("photo.jpg");
        std::fs::write(&first, b"first image bytes").unwrap();
        let other = dir.path().join("sub");
        std::fs::create_dir(&other).unwrap();
        let second = other.join("photo.jpg");
        std::fs::write(&second, b"different length content").unwrap();

        let d1 = manager
            .copy_media(&first, "Alice", Direction::Sent, MediaKind::Image)
            .unwrap();
        let d2 = manager
            .copy_media(&second, "Alice", Direction::Sent, MediaKind::Image)
            .unwrap();

        assert!(d1.ends_with("sent_photo.jpg"));
        assert!(d2.ends_with("sent_photo_1.jpg"));
        assert_eq!(std::fs::read(&d2).unwrap(), b"different length content");
    }

    #[test]
    fn test_copy_media_same_size_collision_gets_suffix() {
        let dir = TempDir::new().unwrap();
        let manager = FileManager::new(dir.path().join("out"));
        let first = dir.path().join("voice.opus");
        std::fs::write(&first, b"aaaaaaaaaa").unwrap();
        let other = dir.path().join("sub");
        std::fs::create_dir(&other).unwrap();
        let second = other.join("voice.opus");
        std::fs::write(&second, b"bbbbbbbbbb").unwrap();

        let d1 = manager
            .copy_media(&first, "Alice", Direction::Received, MediaKind::Audio)
            .unwrap();
        let d2 = manager
            .copy_media(&second, "Alice", Direction::Received, MediaKind::Audio)
            .unwrap();

        assert!(d1.ends_with("received_voice.opus"));
        assert!(d2.ends_with("received_voice_1.opus"));
        assert_eq!(std::fs::read(&d1).unwrap(), b"aaaaaaaaaa");
        assert_eq!(std::fs::read(&d2).unwrap(), b"bbbbbbbbbb");
    }

    #[test]
    fn test_copy_media_identical_is_reused() {
        let dir = TempDir::new().unwrap();
        let manager = FileManager::new(dir.path().join("out"));
        let src = dir.path().join("voice.opus");
        std::fs::write(&src, b"same bytes").unwrap();

        let d1 = manager
            .copy_media(&src, "Alice", Direction::Received, MediaKind::Audio)
            .unwrap();
        let d2 = manager
            .copy_media(&src, "Alice", Direction::Received, MediaKind::Audio)
            .unwrap();
        assert_eq!(d1, d2);
    }

    #[test]
    fn test_mp3_files_direction_filter() {
        let dir = TempDir::new().unwrap();
        let manager = FileManager::new(dir.path());
        let mp3_dir = manager.mp3_dir("Alice");
        std::fs::create_dir_all(&mp3_dir).unwrap();
        std::fs::write(mp3_dir.join("received_a.mp3"), b"x").unwrap();
        std::fs::write(mp3_dir.join("sent_b.mp3"), b"x").unwrap();
        std::fs::write(mp3_dir.join("notes.txt"), b"x").unwrap();

        assert_eq!(manager.mp3_files("Alice", None).unwrap().len(), 2);
        let received = manager.mp3_files("Alice", Some(Direction::Received)).unwrap();
        assert_eq!(received.len(), 1);
        assert!(received[0].ends_with("received_a.mp3"));
    }

    #[test]
    fn test_missing_placeholder() {
        let dir = TempDir::new().unwrap();
        let manager = FileManager::new(dir.path().join("out"));

        let dest = manager
            .write_missing_placeholder("voice note.opus", "Alice", Direction::Received, MediaKind::Audio)
            .unwrap();
        assert!(dest.ends_with("media_received/audio/received_voice note_opus.missing"));
        assert!(dest.exists());
    }

    #[test]
    fn test_unknown_direction_routes_to_received() {
        let dir = TempDir::new().unwrap();
        let manager = FileManager::new(dir.path().join("out"));
        let path = manager.media_dir("Alice", Direction::Unknown, MediaKind::Image);
        assert!(path.ends_with("Alice/media_received/images"));
    }
}
