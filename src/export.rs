//! Plain-text conversation and transcript rendering.
//!
//! Alongside the JSON cache, each contact gets a human-readable
//! `<contact>_conversation.txt`: messages grouped under date separators,
//! with an arrow for direction and annotations for attached media and any
//! resolvable transcript. Guessed transcript matches (see
//! [`crate::reconcile`]) are marked so a reader knows not to trust them
//! blindly.

use std::fmt::Write as _;
use std::path::PathBuf;

use tracing::debug;

use crate::error::Result;
use crate::files::FileManager;
use crate::message::{Direction, MediaKind, Message};
use crate::reconcile::{MatchConfidence, Reconciler};

/// Renders a conversation as plain text.
///
/// Messages must already be sorted; the renderer groups consecutive
/// messages under their date.
pub fn render_conversation(
    contact: &str,
    messages: &[Message],
    reconciler: Option<&Reconciler<'_>>,
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "===== Conversation with {contact} =====");

    let mut current_date = None;
    for message in messages {
        if current_date != Some(message.date) {
            current_date = Some(message.date);
            let header = message.date.to_string();
            let _ = writeln!(out, "\n[{header}]\n{}", "=".repeat(header.len() + 2));
        }

        let arrow = match message.direction {
            Direction::Sent => "->",
            Direction::Received => "<-",
            Direction::Unknown => "??",
        };

        let mut line = message.content.clone();
        if message.kind != MediaKind::Text {
            match &message.media_path {
                Some(path) => {
                    let name = path
                        .file_name()
                        .and_then(|n| n.to_str())
                        .unwrap_or("media");
                    let _ = write!(line, " [media: {name}]");

                    if message.kind == MediaKind::Audio {
                        if let Some(resolved) =
                            reconciler.and_then(|r| r.resolve_transcription(path))
                        {
                            match resolved.confidence {
                                MatchConfidence::Certain => {
                                    let _ = write!(line, " [transcript: {}]", resolved.text);
                                }
                                MatchConfidence::Guessed => {
                                    let _ = write!(
                                        line,
                                        " [transcript, uncertain match: {}]",
                                        resolved.text
                                    );
                                }
                            }
                        }
                    }
                }
                None => {
                    let name = message.original_name.as_deref().unwrap_or("unknown");
                    let _ = write!(line, " [media missing: {name}]");
                }
            }
        }

        let _ = writeln!(out, "{} {arrow} {}", message.time.format("%H:%M"), line.trim());
    }
    out
}

/// Writes the conversation rendering into the contact's directory.
pub fn write_conversation_text(
    files: &FileManager,
    contact: &str,
    messages: &[Message],
    reconciler: Option<&Reconciler<'_>>,
) -> Result<PathBuf> {
    let dir = files.contact_dir(contact);
    std::fs::create_dir_all(&dir)?;
    let dest = dir.join(format!("{contact}_conversation.txt"));
    std::fs::write(&dest, render_conversation(contact, messages, reconciler))?;
    debug!(contact, path = %dest.display(), "conversation text written");
    Ok(dest)
}

/// Writes one transcript as a standalone text file next to the audio it
/// came from, named after the audio file's stem.
pub fn write_transcript_file(
    files: &FileManager,
    contact: &str,
    audio_name: &str,
    text: &str,
) -> Result<PathBuf> {
    let dir = files.transcripts_dir(contact);
    std::fs::create_dir_all(&dir)?;
    let stem = std::path::Path::new(audio_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(audio_name);
    let dest = dir.join(format!("{stem}.txt"));
    std::fs::write(&dest, text)?;
    Ok(dest)
}
