//! Message direction classification.
//!
//! The export tool's markup is not a documented contract, so direction
//! detection is layered: a CSS-class table first, then filename and path
//! conventions, then a layout-position heuristic, and finally a `received`
//! default. Every classification records which method produced it so that
//! low-confidence results can be audited later.
//!
//! # Resolution order
//!
//! 1. CSS class ([`classify_css`]) — the export uses one class family for
//!    received bubbles and a numerically-suffixed family for sent bubbles.
//! 2. Filename prefix (`sent_*` / `received_*`).
//! 3. Path substring (direction-named media folders).
//! 4. Layout position — sent bubbles render at specific horizontal offsets.
//! 5. Default: `received`, flagged as such.
//!
//! ```
//! use chatvault::classifier::{classify, Method};
//! use chatvault::message::Direction;
//!
//! let c = classify(Some("triangle-isosceles2"), None, None);
//! assert_eq!(c.direction, Direction::Sent);
//! assert_eq!(c.method, Method::Css);
//! ```

use std::path::Path;

use tracing::{debug, warn};

use crate::message::Direction;

/// Which detection strategy produced a classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// Known (or suffix-guessed) CSS bubble class.
    Css,
    /// `sent_` / `received_` filename prefix.
    Filename,
    /// Direction-named folder in the file path.
    PathHint,
    /// Horizontal pixel offset in inline styles.
    Position,
    /// Nothing matched; `received` assumed.
    Default,
}

impl Method {
    /// Returns `true` for the two lowest-confidence strategies.
    pub fn is_low_confidence(self) -> bool {
        matches!(self, Method::Position | Method::Default)
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Method::Css => "css",
            Method::Filename => "filename",
            Method::PathHint => "path",
            Method::Position => "position",
            Method::Default => "default",
        };
        f.write_str(s)
    }
}

/// A direction together with the strategy that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    /// The resolved direction. Never `Unknown`: classification is total.
    pub direction: Direction,
    /// The strategy that fired.
    pub method: Method,
}

/// CSS bubble classes with a known direction.
///
/// Received bubbles use the base class family; sent bubbles carry a `2` or
/// `3` suffix (plain and map variants).
const CSS_TABLE: &[(&str, Direction)] = &[
    ("triangle-isosceles", Direction::Received),
    ("triangle-isosceles-map", Direction::Received),
    ("triangle-isosceles2", Direction::Sent),
    ("triangle-isosceles3", Direction::Sent),
    ("triangle-isosceles-map2", Direction::Sent),
    ("triangle-isosceles-map3", Direction::Sent),
];

/// Horizontal offsets at which the export renders sent bubbles.
const SENT_OFFSETS: &[&str] = &["left:170px", "left:208px"];

/// Classifies a message by its CSS bubble class.
///
/// Unknown classes carrying a `2` or `3` are assumed sent; anything else
/// defaults to received. Both guesses log a warning.
pub fn classify_css(css_class: &str) -> Direction {
    if let Some((_, direction)) = CSS_TABLE.iter().find(|(name, _)| *name == css_class) {
        debug!(css_class, direction = %direction, "classified by css table");
        return *direction;
    }

    if css_class.contains('2') || css_class.contains('3') {
        warn!(css_class, "unknown css class, assuming sent");
        return Direction::Sent;
    }

    warn!(css_class, "unknown css class, assuming received");
    Direction::Received
}

/// Classifies by `sent_` / `received_` filename prefix, if present.
pub fn classify_filename(filename: &str) -> Option<Direction> {
    let lower = filename.to_lowercase();
    if lower.starts_with("received_") {
        Some(Direction::Received)
    } else if lower.starts_with("sent_") {
        Some(Direction::Sent)
    } else {
        None
    }
}

/// Classifies by direction-named folders in the file path, if any.
pub fn classify_path(path: &Path) -> Option<Direction> {
    let lower = path.to_string_lossy().to_lowercase();
    if lower.contains("media_received") || lower.contains("received") {
        Some(Direction::Received)
    } else if lower.contains("media_sent") || lower.contains("sent") {
        Some(Direction::Sent)
    } else {
        None
    }
}

/// Fallback classification from an element's rendered position.
///
/// Sent bubbles are offset to the right at fixed pixel positions; everything
/// else is treated as received.
pub fn classify_position(element_markup: &str) -> Direction {
    if SENT_OFFSETS.iter().any(|off| element_markup.contains(off)) {
        debug!("classified by position: sent (right offset)");
        Direction::Sent
    } else {
        debug!("classified by position: received (left aligned)");
        Direction::Received
    }
}

/// Main classification entry point, layering all strategies.
///
/// Always returns a definite direction — even with all arguments absent the
/// result is `received` with [`Method::Default`].
pub fn classify(
    css_class: Option<&str>,
    element_markup: Option<&str>,
    file_path: Option<&Path>,
) -> Classification {
    // CSS class is the most reliable signal when present.
    if let Some(css) = css_class {
        if !css.is_empty() {
            return Classification {
                direction: classify_css(css),
                method: Method::Css,
            };
        }
    }

    if let Some(path) = file_path {
        if let Some(direction) = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(classify_filename)
        {
            return Classification {
                direction,
                method: Method::Filename,
            };
        }
        if let Some(direction) = classify_path(path) {
            return Classification {
                direction,
                method: Method::PathHint,
            };
        }
    }

    if let Some(markup) = element_markup {
        return Classification {
            direction: classify_position(markup),
            method: Method::Position,
        };
    }

    warn!("no classification strategy applied, defaulting to received");
    Classification {
        direction: Direction::Received,
        method: Method::Default,
    }
}
