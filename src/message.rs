//! Normalized message and media types.
//!
//! This module provides [`Message`], the normalized representation of one
//! chat entry extracted from an export file, along with the [`Direction`]
//! and [`MediaKind`] enums used throughout the pipeline.
//!
//! Messages are rebuilt on every parse of their owning export file; they are
//! not individually persisted. Only the media files they reference end up in
//! the registry. Per contact, messages are always consumed in `(date, time)`
//! ascending order — see [`sort_messages`].
//!
//! # Examples
//!
//! ```
//! use chatvault::message::{Direction, MediaKind, Message};
//! use chrono::{NaiveDate, NaiveTime};
//!
//! let msg = Message::text(
//!     NaiveDate::from_ymd_opt(2025, 4, 13).unwrap(),
//!     NaiveTime::from_hms_opt(21, 6, 0).unwrap(),
//!     Direction::Received,
//!     "Bonjour!",
//! );
//! assert_eq!(msg.kind, MediaKind::Text);
//! assert!(msg.media_path.is_none());
//! ```

use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

/// Direction of a message relative to the export owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Written by the export owner.
    Sent,
    /// Written by the contact.
    Received,
    /// Could not be determined; callers should treat as low confidence.
    Unknown,
}

impl Direction {
    /// Returns the lowercase wire representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Sent => "sent",
            Direction::Received => "received",
            Direction::Unknown => "unknown",
        }
    }

    /// Returns the filename prefix used when copying media for this
    /// direction (`sent_`, `received_`, `unknown_`).
    pub fn file_prefix(self) -> &'static str {
        match self {
            Direction::Sent => "sent_",
            Direction::Received => "received_",
            Direction::Unknown => "unknown_",
        }
    }

    /// Returns `true` for the two definite directions.
    pub fn is_definite(self) -> bool {
        matches!(self, Direction::Sent | Direction::Received)
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sent" => Ok(Direction::Sent),
            "received" => Ok(Direction::Received),
            "unknown" => Ok(Direction::Unknown),
            _ => Err(format!(
                "Unknown direction: '{}'. Expected sent, received or unknown",
                s
            )),
        }
    }
}

/// Logical kind of a registered file or message payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// A source export file.
    Html,
    /// Plain text message (no attached file).
    Text,
    /// Voice note or music file.
    Audio,
    /// Photo or sticker.
    Image,
    /// Video clip.
    Video,
    /// Anything else referenced by the export.
    Document,
}

impl MediaKind {
    /// Maps a file extension (with or without leading dot) to a media kind.
    ///
    /// Unrecognized extensions map to [`MediaKind::Document`], matching the
    /// export tool's catch-all behavior.
    pub fn for_extension(ext: &str) -> MediaKind {
        let ext = ext.trim_start_matches('.').to_lowercase();
        match ext.as_str() {
            "jpg" | "jpeg" | "png" | "gif" | "webp" | "bmp" | "tiff" => MediaKind::Image,
            "mp4" | "avi" | "mov" | "webm" | "mkv" | "3gp" | "flv" => MediaKind::Video,
            "opus" | "mp3" | "ogg" | "m4a" | "wav" | "aac" | "flac" => MediaKind::Audio,
            "html" | "htm" => MediaKind::Html,
            _ => MediaKind::Document,
        }
    }

    /// Maps a file path to a media kind via its extension.
    pub fn for_path(path: &Path) -> MediaKind {
        path.extension()
            .and_then(|e| e.to_str())
            .map_or(MediaKind::Document, MediaKind::for_extension)
    }

    /// Returns the lowercase wire representation.
    pub fn as_str(self) -> &'static str {
        match self {
            MediaKind::Html => "html",
            MediaKind::Text => "text",
            MediaKind::Audio => "audio",
            MediaKind::Image => "image",
            MediaKind::Video => "video",
            MediaKind::Document => "document",
        }
    }

    /// Returns the per-contact subdirectory name for this kind of media.
    pub fn media_subdir(self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Image => "images",
            MediaKind::Video => "videos",
            MediaKind::Html | MediaKind::Text | MediaKind::Document => "documents",
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One normalized chat entry.
///
/// Built fresh on every parse of the owning export file and cached per
/// contact as JSON for incremental runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Calendar date the message was sent.
    pub date: NaiveDate,

    /// Wall-clock time the message was sent (minute precision in exports).
    pub time: NaiveTime,

    /// Direction relative to the export owner.
    pub direction: Direction,

    /// Payload kind. `Text` for inline messages, otherwise the kind of the
    /// attached media file.
    pub kind: MediaKind,

    /// Text content. Empty for media messages without a caption.
    #[serde(default)]
    pub content: String,

    /// Resolved on-disk path of the attached media, once organized.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub media_path: Option<PathBuf>,

    /// Filename as referenced by the export markup, before organization.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub original_name: Option<String>,
}

impl Message {
    /// Creates a plain text message.
    pub fn text(
        date: NaiveDate,
        time: NaiveTime,
        direction: Direction,
        content: impl Into<String>,
    ) -> Self {
        Self {
            date,
            time,
            direction,
            kind: MediaKind::Text,
            content: content.into(),
            media_path: None,
            original_name: None,
        }
    }

    /// Creates a media message. The media path is attached later, once the
    /// referenced file has been located and organized.
    pub fn media(
        date: NaiveDate,
        time: NaiveTime,
        direction: Direction,
        kind: MediaKind,
        original_name: impl Into<String>,
    ) -> Self {
        Self {
            date,
            time,
            direction,
            kind,
            content: String::new(),
            media_path: None,
            original_name: Some(original_name.into()),
        }
    }

    /// Builder method to attach the resolved media path.
    #[must_use]
    pub fn with_media_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.media_path = Some(path.into());
        self
    }

    /// Builder method to set the caption/content.
    #[must_use]
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    /// Returns `true` if this message carries an attached file.
    pub fn has_media(&self) -> bool {
        self.kind != MediaKind::Text && self.media_path.is_some()
    }

    /// Returns `true` if this message's content is empty or whitespace-only.
    pub fn is_empty(&self) -> bool {
        self.content.trim().is_empty()
    }

    /// The chronological sort key: `(date, time)`.
    pub fn sort_key(&self) -> (NaiveDate, NaiveTime) {
        (self.date, self.time)
    }
}

/// Sorts messages by `(date, time)` ascending.
///
/// The sort is stable, so messages sharing a timestamp keep their encounter
/// order and re-sorting an already sorted list changes nothing.
pub fn sort_messages(messages: &mut [Message]) {
    messages.sort_by_key(Message::sort_key);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn t(h: u32, min: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, min, 0).unwrap()
    }

    #[test]
    fn test_direction_round_trip() {
        for dir in [Direction::Sent, Direction::Received, Direction::Unknown] {
            assert_eq!(dir.as_str().parse::<Direction>().unwrap(), dir);
        }
        assert!("sideways".parse::<Direction>().is_err());
    }

    #[test]
    fn test_direction_prefix() {
        assert_eq!(Direction::Sent.file_prefix(), "sent_");
        assert_eq!(Direction::Received.file_prefix(), "received_");
        assert_eq!(Direction::Unknown.file_prefix(), "unknown_");
    }

    #[test]
    fn test_media_kind_for_extension() {
        assert_eq!(MediaKind::for_extension(".jpg"), MediaKind::Image);
        assert_eq!(MediaKind::for_extension("OPUS"), MediaKind::Audio);
        assert_eq!(MediaKind::for_extension("mp4"), MediaKind::Video);
        assert_eq!(MediaKind::for_extension(".pdf"), MediaKind::Document);
        assert_eq!(MediaKind::for_extension("html"), MediaKind::Html);
    }

    #[test]
    fn test_media_kind_for_path() {
        assert_eq!(
            MediaKind::for_path(Path::new("/media/voice.opus")),
            MediaKind::Audio
        );
        assert_eq!(MediaKind::for_path(Path::new("no_extension")), MediaKind::Document);
    }

    #[test]
    fn test_message_builders() {
        let msg = Message::media(d(2025, 4, 13), t(21, 6), Direction::Received, MediaKind::Audio, "a.opus")
            .with_media_path("/out/Alice/media_received/audio/received_a.opus")
            .with_content("voice note");
        assert!(msg.has_media());
        assert_eq!(msg.original_name.as_deref(), Some("a.opus"));
        assert!(!msg.is_empty());
    }

    #[test]
    fn test_sort_is_stable_and_idempotent() {
        let a = Message::text(d(2025, 1, 2), t(8, 0), Direction::Sent, "a");
        let b = Message::text(d(2025, 1, 1), t(9, 0), Direction::Received, "b");
        let c = Message::text(d(2025, 1, 1), t(9, 0), Direction::Received, "c");

        let mut msgs = vec![a.clone(), b.clone(), c.clone()];
        sort_messages(&mut msgs);
        assert_eq!(msgs, vec![b.clone(), c.clone(), a.clone()]);

        // Same-timestamp pair keeps encounter order; a second sort is a no-op.
        let snapshot = msgs.clone();
        sort_messages(&mut msgs);
        assert_eq!(msgs, snapshot);
    }

    #[test]
    fn test_serde_round_trip() {
        let msg = Message::media(d(2025, 4, 13), t(21, 6), Direction::Sent, MediaKind::Image, "p.jpg");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"sent\""));
        assert!(json.contains("\"image\""));
        // Unset media_path is omitted.
        assert!(!json.contains("media_path"));
        let parsed: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, msg);
    }
}
