//! WhatsApp HTML export parsing.
//!
//! The export tool writes one HTML file per conversation with a flat
//! repeating structure: a `<p class="date">` marker carrying the timestamp
//! in a grey `<font>` tag, followed by either a `<p>` bubble (text message)
//! or a `<table>` block (media message with an `<a href>` to the file and an
//! optional `<td width="150">` caption). The contact name lives in the
//! page's `<h3>`, with the `<title>` as a fallback.
//!
//! There is no schema, so parsing is anchored scanning: find every date
//! marker, slice the document between consecutive markers, and pull the
//! first message element out of each slice. Malformed slices are skipped
//! with a warning; a document without a recognizable contact is a parse
//! error, which the pipeline treats as a per-file failure.
//!
//! # Example
//!
//! ```
//! use chatvault::parser::ExportParser;
//!
//! let html = r##"
//!     <html><body><h3>Alice</h3>
//!     <p class="date"><font color="#b4b4b4">2025/04/13 21:06</font></p>
//!     <p class="triangle-isosceles"><font>Bonjour!</font></p>
//!     </body></html>"##;
//!
//! let parser = ExportParser::new();
//! let conversation = parser.parse_str(html, None).unwrap();
//! assert_eq!(conversation.contact, "Alice");
//! assert_eq!(conversation.messages.len(), 1);
//! ```

use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveTime};
use regex::Regex;
use tracing::{debug, warn};

use crate::classifier;
use crate::error::{ChatvaultError, Result};
use crate::files::sanitize_filename;
use crate::message::{sort_messages, MediaKind, Message};

/// One parsed export file: the contact plus their messages in
/// chronological order.
#[derive(Debug, Clone)]
pub struct ParsedConversation {
    /// Sanitized contact name.
    pub contact: String,
    /// Messages sorted by `(date, time)`.
    pub messages: Vec<Message>,
}

/// Regex-based export parser. Compile once, parse many files.
#[derive(Debug)]
pub struct ExportParser {
    date_marker: Regex,
    timestamp: Regex,
    element: Regex,
    css_class: Regex,
    h3: Regex,
    title: Regex,
    font: Regex,
    href: Regex,
    caption: Regex,
    tag: Regex,
}

impl Default for ExportParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ExportParser {
    /// Compiles the export grammar. The built-in patterns are static, so
    /// compilation cannot fail.
    pub fn new() -> Self {
        Self {
            date_marker: Regex::new(r##"(?s)<p[^>]*class="date"[^>]*>.*?</p>"##).unwrap(),
            timestamp: Regex::new(r"(\d{4}/\d{2}/\d{2})\s+(\d{2}:\d{2})").unwrap(),
            element: Regex::new(r"(?s)<(p|table)\b[^>]*>.*?</(?:p|table)>").unwrap(),
            css_class: Regex::new(r##"class="([^"]*)""##).unwrap(),
            h3: Regex::new(r"(?s)<h3[^>]*>(.*?)</h3>").unwrap(),
            title: Regex::new(r"(?s)<title[^>]*>(.*?)</title>").unwrap(),
            font: Regex::new(r"(?s)<font[^>]*>(.*?)</font>").unwrap(),
            href: Regex::new(r##"href="([^"]+)""##).unwrap(),
            caption: Regex::new(r##"(?s)<td[^>]*width="150"[^>]*>(.*?)</td>"##).unwrap(),
            tag: Regex::new(r"<[^>]+>").unwrap(),
        }
    }

    /// Lists the `.html` export files under `html_dir`, sorted by name.
    pub fn list_export_files(&self, html_dir: &Path) -> Result<Vec<PathBuf>> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(html_dir)?
            .filter_map(std::result::Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("html"))
            })
            .collect();
        files.sort();
        Ok(files)
    }

    /// Parses one export file from disk.
    pub fn parse_file(&self, path: &Path) -> Result<ParsedConversation> {
        let html = std::fs::read_to_string(path)?;
        self.parse_str(&html, Some(path))
    }

    /// Parses export markup. `path` is only used for error context.
    pub fn parse_str(&self, html: &str, path: Option<&Path>) -> Result<ParsedConversation> {
        let contact = self.extract_contact(html).ok_or_else(|| {
            ChatvaultError::html_parse("no contact name found", path.map(Path::to_path_buf))
        })?;

        let markers: Vec<regex::Match> = self.date_marker.find_iter(html).collect();
        if markers.is_empty() {
            warn!(contact = %contact, "export contains no date markers");
        }

        let mut messages = Vec::with_capacity(markers.len());
        for (i, marker) in markers.iter().enumerate() {
            let Some((date, time)) = self.parse_timestamp(marker.as_str()) else {
                warn!(contact = %contact, marker = marker.as_str(), "unreadable date marker skipped");
                continue;
            };

            // The message element lives between this marker and the next.
            let block_end = markers.get(i + 1).map_or(html.len(), regex::Match::start);
            let block = &html[marker.end()..block_end];

            match self.extract_message(block, date, time) {
                Some(message) => messages.push(message),
                None => debug!(contact = %contact, %date, "date marker without message element"),
            }
        }

        sort_messages(&mut messages);
        debug!(contact = %contact, count = messages.len(), "export parsed");
        Ok(ParsedConversation { contact, messages })
    }

    /// Pulls the contact name from `<h3>`, falling back to `<title>` with
    /// the WhatsApp suffix stripped.
    fn extract_contact(&self, html: &str) -> Option<String> {
        if let Some(cap) = self.h3.captures(html) {
            let name = self.clean_text(&cap[1]);
            if !name.is_empty() {
                return Some(sanitize_filename(&name));
            }
        }
        if let Some(cap) = self.title.captures(html) {
            let name = self
                .clean_text(&cap[1])
                .replace("'s WhatsApp Business", "")
                .replace("'s WhatsApp", "");
            let name = name.trim();
            if !name.is_empty() {
                return Some(sanitize_filename(name));
            }
        }
        None
    }

    fn parse_timestamp(&self, marker: &str) -> Option<(NaiveDate, NaiveTime)> {
        let cap = self.timestamp.captures(marker)?;
        let date = NaiveDate::parse_from_str(&cap[1], "%Y/%m/%d").ok()?;
        let time = NaiveTime::parse_from_str(&cap[2], "%H:%M").ok()?;
        Some((date, time))
    }

    /// Extracts the first message element from a marker-to-marker slice.
    fn extract_message(&self, block: &str, date: NaiveDate, time: NaiveTime) -> Option<Message> {
        let element = self.element.find(block)?;
        let markup = element.as_str();
        let css = self
            .css_class
            .captures(markup)
            .map(|cap| cap[1].to_string());

        let classification =
            classifier::classify(css.as_deref(), Some(markup), None);

        if markup.starts_with("<p") {
            // Text bubble: content is in the first font tag, or the whole
            // element when the export skipped the tag.
            let content = self
                .font
                .captures(markup)
                .map_or_else(|| self.clean_text(markup), |cap| self.clean_text(&cap[1]));
            Some(Message::text(date, time, classification.direction, content))
        } else {
            let href = self.href.captures(markup)?;
            let original_name = Path::new(&href[1])
                .file_name()
                .and_then(|n| n.to_str())?
                .to_string();
            let kind = MediaKind::for_extension(
                Path::new(&original_name)
                    .extension()
                    .and_then(|e| e.to_str())
                    .unwrap_or(""),
            );

            let mut message = Message::media(
                date,
                time,
                classification.direction,
                kind,
                original_name,
            );
            if let Some(cap) = self.caption.captures(markup) {
                message = message.with_content(self.clean_text(&cap[1]));
            }
            Some(message)
        }
    }

    /// Strips tags and unescapes the entities the export tool emits.
    fn clean_text(&self, fragment: &str) -> String {
        let without_tags = self.tag.replace_all(fragment, "");
        without_tags
            .replace("&amp;", "&")
            .replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&quot;", "\"")
            .replace("&#39;", "'")
            .replace("&nbsp;", " ")
            .trim()
            .to_string()
    }
}
