//! # chatvault
//!
//! A Rust library for turning WhatsApp HTML exports into an organized,
//! incremental, per-contact archive.
//!
//! ## Overview
//!
//! Phone-to-PC transfer tools dump WhatsApp conversations as one HTML file
//! per contact plus a loose directory of media files. chatvault parses those
//! exports, classifies each message's direction, copies referenced media
//! into a clean per-contact tree, coordinates voice-note conversion and
//! transcription through pluggable capabilities, and tracks everything in a
//! content-addressed registry so that re-running is cheap and idempotent.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chatvault::prelude::*;
//!
//! fn main() -> Result<()> {
//!     let settings = Settings::new("/exports/html", "/exports/media", "/archive");
//!     let mut pipeline = Pipeline::new(settings)?;
//!
//!     // No encoder or transcriber wired: parsing, media organization and
//!     // conversation rendering still run.
//!     let stats = pipeline.run(None, None)?;
//!     println!("{stats}");
//!     Ok(())
//! }
//! ```
//!
//! Voice-note processing plugs in through two traits:
//!
//! ```rust,ignore
//! let stats = pipeline.run(Some(&mut my_encoder), Some(&mut my_transcriber))?;
//! ```
//!
//! ## Module Structure
//!
//! - [`pipeline`] — the batch run: parse, organize, convert, transcribe,
//!   consolidate ([`Pipeline`], [`RunStats`])
//! - [`parser`] — WhatsApp HTML export parsing ([`parser::ExportParser`])
//! - [`classifier`] — layered message-direction detection
//! - [`registry`] — the content-addressed registry ([`registry::Registry`])
//! - [`reconcile`] — transcription lookup across the conversion boundary
//! - [`media`] — media location and organization
//! - [`files`] — output tree layout and filename sanitization
//! - [`audio`] — conversion driver and monthly super files
//!   ([`audio::AudioEncoder`])
//! - [`transcribe`] — the speech-service boundary
//!   ([`transcribe::Transcriber`])
//! - [`export`] — plain-text conversation and transcript rendering
//! - [`message`] — [`Message`], [`Direction`], [`MediaKind`]
//! - [`config`] — typed [`Settings`] plus the TOML loader
//! - [`error`] — [`ChatvaultError`] and the crate [`Result`]
//! - [`stats`] — per-run counters and the success-rate warning
//! - [`cli`] — argument types for the `chatvault` binary

pub mod audio;
pub mod classifier;
pub mod cli;
pub mod config;
pub mod error;
pub mod export;
pub mod files;
pub mod media;
pub mod message;
pub mod parser;
pub mod pipeline;
pub mod reconcile;
pub mod registry;
pub mod stats;
pub mod transcribe;

pub use config::Settings;
pub use error::{ChatvaultError, Result};
pub use message::{Direction, MediaKind, Message};
pub use pipeline::Pipeline;
pub use stats::RunStats;

/// Convenient re-exports for typical usage.
pub mod prelude {
    pub use crate::audio::AudioEncoder;
    pub use crate::config::Settings;
    pub use crate::error::{ChatvaultError, Result};
    pub use crate::message::{Direction, MediaKind, Message};
    pub use crate::pipeline::Pipeline;
    pub use crate::registry::Registry;
    pub use crate::stats::RunStats;
    pub use crate::transcribe::Transcriber;
}
