//! Content-addressed file registry.
//!
//! The registry is the pipeline's single source of truth for what has
//! already been done. Every media file is identified by the SHA-256 of its
//! content, so renames and moves never cause double work: a voice note
//! transcribed last month is recognized by hash even if the export tool
//! gave it a new name this month.
//!
//! The document is persisted as one JSON file under the output directory
//! (`.chatvault_registry.json`) and written atomically: serialize to a
//! sibling `.tmp` file, then rename over the previous version. Persistence
//! failures are logged, never raised — an unsaved registry costs redundant
//! work on the next run, not correctness.
//!
//! # Example
//!
//! ```no_run
//! use chatvault::message::{Direction, MediaKind};
//! use chatvault::registry::Registry;
//! use std::path::Path;
//!
//! let mut registry = Registry::load(Path::new("/out/.chatvault_registry.json"));
//! let hash = registry.register_file(
//!     Path::new("/media/audio/voice.opus"),
//!     "Alice",
//!     Direction::Received,
//!     Some(MediaKind::Audio),
//! );
//! assert!(hash.is_some());
//! registry.save();
//! ```

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::classifier;
use crate::error::{ChatvaultError, Result};
use crate::message::{Direction, MediaKind};

/// Current on-disk document version.
const REGISTRY_VERSION: &str = "2.0";

/// Streaming hash block size.
const HASH_BLOCK_SIZE: usize = 64 * 1024;

/// Minimum trimmed length for a transcription to count as usable.
const MIN_TRANSCRIPT_LEN: usize = 10;

/// Substrings that mark a stored transcription as a service error echo.
const TRANSCRIPT_ERROR_MARKERS: &[&str] = &[
    "error",
    "erreur",
    "failed",
    "api",
    "quota",
    "limit",
    "insufficient",
];

/// Which stage of processing to query in [`Registry::is_processed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessKind {
    /// The file's hash is known to the registry.
    Registered,
    /// The file has a recorded audio conversion.
    Converted,
    /// The file has a usable transcription.
    Transcribed,
}

/// One registered file, keyed by content hash in [`RegistryDoc::files`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    /// Last known on-disk path.
    pub path: PathBuf,
    /// Logical kind.
    pub kind: MediaKind,
    /// Direction relative to the export owner.
    pub direction: Direction,
    /// Owning contact.
    pub contact: String,
    /// Size in bytes at registration time.
    pub size: u64,
    /// RFC 3339 registration timestamp.
    pub registered_at: String,
    /// Free-form string metadata (e.g. migration markers).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
    /// Path of the converted (mp3) rendition, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub converted_path: Option<PathBuf>,
    /// RFC 3339 conversion timestamp, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub converted_at: Option<String>,
}

/// A cached transcription, keyed by the source file's content hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptRecord {
    /// The transcript text as returned by the service.
    pub text: String,
    /// Character length at storage time.
    pub length: usize,
    /// RFC 3339 transcription timestamp.
    pub transcribed_at: String,
}

impl TranscriptRecord {
    /// Returns `true` if the stored text looks like a real transcript
    /// rather than an error echo or placeholder.
    ///
    /// Invalid records stay in the document for inspection but are treated
    /// as absent by lookups, so the file is retried on the next run.
    pub fn is_valid(&self) -> bool {
        let trimmed = self.text.trim();
        if trimmed.len() < MIN_TRANSCRIPT_LEN {
            return false;
        }
        if trimmed.starts_with('[') {
            return false;
        }
        let lower = trimmed.to_lowercase();
        !TRANSCRIPT_ERROR_MARKERS.iter().any(|m| lower.contains(m))
    }
}

/// One consolidated per-period audio file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuperFileRecord {
    /// Output path of the consolidated file.
    pub path: PathBuf,
    /// Content hashes of the source files, in concatenation order.
    pub source_hashes: Vec<String>,
    /// RFC 3339 build timestamp.
    pub created_at: String,
}

/// Aggregate per-contact counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContactStats {
    /// Files registered for this contact, any kind.
    pub total_messages: u64,
    /// Files registered with direction `received`.
    pub received_messages: u64,
    /// Files registered with direction `sent`.
    pub sent_messages: u64,
    /// Audio files registered.
    pub audio_files: u64,
    /// Files with a stored transcription.
    pub transcribed_files: u64,
}

/// Per-contact entry: the contact's file hashes plus counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContactEntry {
    /// Content hashes of this contact's files, in registration order.
    pub files: Vec<String>,
    /// Aggregate counters.
    pub stats: ContactStats,
}

/// Global run counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessingStats {
    /// Distinct files ever registered.
    pub total_files: u64,
    /// Transcriptions ever stored.
    pub total_transcriptions: u64,
    /// RFC 3339 timestamp of the last save.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run: Option<String>,
}

/// The serialized registry document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryDoc {
    /// Document format version.
    pub version: String,
    /// RFC 3339 creation timestamp of the document.
    #[serde(default)]
    pub created: String,
    /// Per-contact entries, keyed by contact name.
    #[serde(default)]
    pub contacts: BTreeMap<String, ContactEntry>,
    /// File records, keyed by content hash.
    #[serde(default)]
    pub files: BTreeMap<String, FileRecord>,
    /// Transcriptions, keyed by content hash.
    #[serde(default)]
    pub transcriptions: BTreeMap<String, TranscriptRecord>,
    /// Consolidated audio files, keyed by `{contact}_{direction}_{period}`.
    #[serde(default)]
    pub super_files: BTreeMap<String, SuperFileRecord>,
    /// Global counters.
    #[serde(default)]
    pub processing_stats: ProcessingStats,
}

impl Default for RegistryDoc {
    fn default() -> Self {
        Self {
            version: REGISTRY_VERSION.to_string(),
            created: now(),
            contacts: BTreeMap::new(),
            files: BTreeMap::new(),
            transcriptions: BTreeMap::new(),
            super_files: BTreeMap::new(),
            processing_stats: ProcessingStats::default(),
        }
    }
}

/// Legacy (v1) document shape, read only during migration.
#[derive(Debug, Deserialize)]
struct LegacyDoc {
    #[serde(default)]
    processed_files: BTreeMap<String, String>,
    #[serde(default)]
    conversions: BTreeMap<String, String>,
    #[serde(default)]
    transcriptions: BTreeMap<String, String>,
}

/// The in-memory registry: document plus hash memoization.
#[derive(Debug)]
pub struct Registry {
    doc: RegistryDoc,
    path: PathBuf,
    // Memoizes path -> hash for the lifetime of one run. RefCell so that
    // read-only lookups can still populate the cache through &self.
    hash_cache: RefCell<HashMap<PathBuf, String>>,
}

impl Registry {
    /// Creates an empty registry that will persist to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            doc: RegistryDoc::default(),
            path: path.into(),
            hash_cache: RefCell::new(HashMap::new()),
        }
    }

    /// Loads the registry from `path`, migrating v1 documents in place.
    ///
    /// A missing file yields an empty registry; a corrupt one is logged and
    /// replaced by an empty registry rather than aborting the run.
    pub fn load(path: &Path) -> Self {
        match Self::try_load(path) {
            Ok(registry) => registry,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "registry unreadable, starting fresh");
                Self::new(path)
            }
        }
    }

    fn try_load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no registry on disk, starting empty");
            return Ok(Self::new(path));
        }

        let raw = std::fs::read_to_string(path)?;
        let value: serde_json::Value = serde_json::from_str(&raw)?;

        let version = value
            .get("version")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("1.0");

        let doc = if version == REGISTRY_VERSION {
            serde_json::from_value(value)?
        } else if version.starts_with('1') {
            info!(path = %path.display(), "migrating v1 registry");
            let legacy: LegacyDoc = serde_json::from_value(value)?;
            migrate_v1(legacy)
        } else {
            return Err(ChatvaultError::registry_format(format!(
                "unsupported registry version '{version}'"
            )));
        };

        Ok(Self {
            doc,
            path: path.to_path_buf(),
            hash_cache: RefCell::new(HashMap::new()),
        })
    }

    /// Read access to the underlying document.
    pub fn doc(&self) -> &RegistryDoc {
        &self.doc
    }

    /// Computes (or recalls) the SHA-256 content hash of `path`.
    ///
    /// Unreadable files are logged and yield `None`; hashing the same path
    /// twice within a run reads the file only once.
    pub fn hash_of(&self, path: &Path) -> Option<String> {
        if let Some(hash) = self.hash_cache.borrow().get(path) {
            return Some(hash.clone());
        }

        let hash = match hash_file(path) {
            Ok(hash) => hash,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "cannot hash file");
                return None;
            }
        };

        self.hash_cache
            .borrow_mut()
            .insert(path.to_path_buf(), hash.clone());
        Some(hash)
    }

    /// Registers a file under `contact`, returning its content hash.
    ///
    /// Registering the same content twice is idempotent for counters: the
    /// existing record is refreshed (path may have changed) but nothing is
    /// counted again. `kind` defaults to the extension-derived kind.
    pub fn register_file(
        &mut self,
        path: &Path,
        contact: &str,
        direction: Direction,
        kind: Option<MediaKind>,
    ) -> Option<String> {
        let hash = self.hash_of(path)?;
        let kind = kind.unwrap_or_else(|| MediaKind::for_path(path));

        if let Some(existing) = self.doc.files.get_mut(&hash) {
            // Seen before: refresh the location, keep counters untouched.
            existing.path = path.to_path_buf();
            debug!(hash = %short(&hash), path = %path.display(), "file already registered");
            return Some(hash);
        }

        let size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        self.doc.files.insert(
            hash.clone(),
            FileRecord {
                path: path.to_path_buf(),
                kind,
                direction,
                contact: contact.to_string(),
                size,
                registered_at: now(),
                metadata: BTreeMap::new(),
                converted_path: None,
                converted_at: None,
            },
        );

        let entry = self.doc.contacts.entry(contact.to_string()).or_default();
        if !entry.files.contains(&hash) {
            entry.files.push(hash.clone());
        }
        entry.stats.total_messages += 1;
        match direction {
            Direction::Received => entry.stats.received_messages += 1,
            Direction::Sent => entry.stats.sent_messages += 1,
            Direction::Unknown => {}
        }
        if kind == MediaKind::Audio {
            entry.stats.audio_files += 1;
        }
        self.doc.processing_stats.total_files += 1;

        debug!(hash = %short(&hash), contact, direction = %direction, kind = %kind, "file registered");
        Some(hash)
    }

    /// The file record for `path`, if its content is registered.
    pub fn record_for(&self, path: &Path) -> Option<&FileRecord> {
        let hash = self.hash_of(path)?;
        self.doc.files.get(&hash)
    }

    /// Attaches a metadata key to an existing file record.
    pub fn annotate(&mut self, hash: &str, key: impl Into<String>, value: impl Into<String>) {
        if let Some(record) = self.doc.files.get_mut(hash) {
            record.metadata.insert(key.into(), value.into());
        }
    }

    /// Checks whether `path` has reached the given processing stage.
    ///
    /// An unreadable file reports `false` for every stage.
    pub fn is_processed(&self, path: &Path, stage: ProcessKind) -> bool {
        let Some(hash) = self.hash_of(path) else {
            return false;
        };
        match stage {
            ProcessKind::Registered => self.doc.files.contains_key(&hash),
            ProcessKind::Converted => self
                .doc
                .files
                .get(&hash)
                .is_some_and(|record| record.converted_path.is_some()),
            ProcessKind::Transcribed => self
                .doc
                .transcriptions
                .get(&hash)
                .is_some_and(TranscriptRecord::is_valid),
        }
    }

    /// Records a converted rendition of the file with content hash `hash`.
    ///
    /// Unknown hashes are logged and ignored.
    pub fn register_conversion(&mut self, hash: &str, converted_path: &Path) {
        match self.doc.files.get_mut(hash) {
            Some(record) => {
                record.converted_path = Some(converted_path.to_path_buf());
                record.converted_at = Some(now());
                debug!(hash = %short(hash), path = %converted_path.display(), "conversion recorded");
            }
            None => warn!(hash = %short(hash), "conversion for unregistered hash ignored"),
        }
    }

    /// The recorded conversion path for `hash`, if any.
    pub fn conversion(&self, hash: &str) -> Option<&Path> {
        self.doc
            .files
            .get(hash)
            .and_then(|record| record.converted_path.as_deref())
    }

    /// Stores a transcription for `hash` and bumps counters.
    ///
    /// The text is stored verbatim, valid or not; lookups filter. Counters
    /// are only bumped for first-time valid transcripts, and an invalid
    /// text never replaces a stored valid one.
    pub fn register_transcription(&mut self, hash: &str, text: impl Into<String>) {
        let text = text.into();
        let record = TranscriptRecord {
            length: text.chars().count(),
            text,
            transcribed_at: now(),
        };

        let existing_valid = self.doc.transcriptions.get(hash).is_some_and(TranscriptRecord::is_valid);
        if !record.is_valid() && existing_valid {
            debug!(hash = %short(hash), "invalid transcription ignored, valid record kept");
            return;
        }

        let newly_valid = record.is_valid() && !existing_valid;

        if newly_valid {
            self.doc.processing_stats.total_transcriptions += 1;
            if let Some(contact) = self.contact_for_hash(hash) {
                if let Some(entry) = self.doc.contacts.get_mut(&contact) {
                    entry.stats.transcribed_files += 1;
                }
            }
        }

        self.doc.transcriptions.insert(hash.to_string(), record);
    }

    /// Finds the contact owning `hash`, following `converted_path` pointers:
    /// a transcription keyed by a converted file's hash still credits the
    /// original file's contact.
    fn contact_for_hash(&self, hash: &str) -> Option<String> {
        if let Some(record) = self.doc.files.get(hash) {
            return Some(record.contact.clone());
        }
        self.doc
            .files
            .values()
            .find(|record| {
                record
                    .converted_path
                    .as_deref()
                    .and_then(|path| self.hash_of(path))
                    .is_some_and(|converted_hash| converted_hash == hash)
            })
            .map(|record| record.contact.clone())
    }

    /// The stored transcription for `hash`, if present and usable.
    pub fn transcription(&self, hash: &str) -> Option<&TranscriptRecord> {
        self.doc
            .transcriptions
            .get(hash)
            .filter(|record| record.is_valid())
    }

    /// Records a consolidated audio file for `contact`/`direction`/`period`.
    pub fn register_super_file(
        &mut self,
        contact: &str,
        direction: Direction,
        period: &str,
        path: &Path,
        source_hashes: Vec<String>,
    ) {
        let key = super_file_key(contact, direction, period);
        self.doc.super_files.insert(
            key,
            SuperFileRecord {
                path: path.to_path_buf(),
                source_hashes,
                created_at: now(),
            },
        );
    }

    /// Returns `true` if the consolidated file for the key is missing or was
    /// built from a different set of sources.
    ///
    /// Comparison is by set: concatenation order does not trigger a rebuild,
    /// only membership changes do.
    pub fn needs_super_file_update(
        &self,
        contact: &str,
        direction: Direction,
        period: &str,
        source_hashes: &[String],
    ) -> bool {
        let key = super_file_key(contact, direction, period);
        let Some(record) = self.doc.super_files.get(&key) else {
            return true;
        };
        let recorded: HashSet<&str> = record.source_hashes.iter().map(String::as_str).collect();
        let wanted: HashSet<&str> = source_hashes.iter().map(String::as_str).collect();
        recorded != wanted
    }

    /// Iterates file records matching the given filters, with their hashes.
    ///
    /// `None` filters match everything.
    pub fn files_by_criteria<'a>(
        &'a self,
        contact: Option<&'a str>,
        direction: Option<Direction>,
        kind: Option<MediaKind>,
    ) -> impl Iterator<Item = (&'a str, &'a FileRecord)> + 'a {
        self.doc.files.iter().filter_map(move |(hash, record)| {
            if contact.is_some_and(|c| record.contact != c) {
                return None;
            }
            if direction.is_some_and(|d| record.direction != d) {
                return None;
            }
            if kind.is_some_and(|k| record.kind != k) {
                return None;
            }
            Some((hash.as_str(), record))
        })
    }

    /// Persists the document atomically.
    ///
    /// Failures are logged and swallowed; the temp file is removed on a
    /// failed rename.
    pub fn save(&mut self) {
        self.doc.processing_stats.last_run = Some(now());

        let tmp = self.path.with_extension("json.tmp");
        let result = (|| -> Result<()> {
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let json = serde_json::to_string_pretty(&self.doc)?;
            std::fs::write(&tmp, json)?;
            std::fs::rename(&tmp, &self.path)?;
            Ok(())
        })();

        match result {
            Ok(()) => debug!(path = %self.path.display(), "registry saved"),
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "registry save failed");
                let _ = std::fs::remove_file(&tmp);
            }
        }
    }
}

/// Builds the `{contact}_{direction}_{period}` super-file key.
pub fn super_file_key(contact: &str, direction: Direction, period: &str) -> String {
    format!("{contact}_{}_{period}", direction.as_str())
}

/// Streams `path` through SHA-256 and returns the lowercase hex digest.
fn hash_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; HASH_BLOCK_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Rebuilds a v2 document from the legacy v1 shape.
///
/// v1 stored three flat maps and no contact attribution, so migrated records
/// land under the synthetic contact `_migrated` with direction and kind
/// recovered from path conventions. Counters are not inflated: migrated
/// files only bump the global totals.
fn migrate_v1(legacy: LegacyDoc) -> RegistryDoc {
    let mut doc = RegistryDoc::default();

    for (path_str, hash) in legacy.processed_files {
        let path = PathBuf::from(&path_str);
        let direction = classifier::classify_path(&path).unwrap_or(Direction::Unknown);
        let mut metadata = BTreeMap::new();
        metadata.insert("migrated".to_string(), "v1".to_string());
        doc.files.insert(
            hash.clone(),
            FileRecord {
                kind: MediaKind::for_path(&path),
                path,
                direction,
                contact: "_migrated".to_string(),
                size: 0,
                registered_at: now(),
                metadata,
                converted_path: None,
                converted_at: None,
            },
        );
        doc.processing_stats.total_files += 1;
    }

    for (hash, converted_path) in legacy.conversions {
        if let Some(record) = doc.files.get_mut(&hash) {
            record.converted_path = Some(PathBuf::from(converted_path));
            record.converted_at = Some(now());
        } else {
            warn!(hash = %short(&hash), "v1 conversion without file record dropped");
        }
    }

    for (hash, text) in legacy.transcriptions {
        let record = TranscriptRecord {
            length: text.chars().count(),
            text,
            transcribed_at: now(),
        };
        if record.is_valid() {
            doc.processing_stats.total_transcriptions += 1;
        }
        doc.transcriptions.insert(hash, record);
    }

    info!(
        files = doc.files.len(),
        transcriptions = doc.transcriptions.len(),
        "v1 registry migrated"
    );
    doc
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Truncates a hash for log output.
fn short(hash: &str) -> &str {
    &hash[..hash.len().min(12)]
}
