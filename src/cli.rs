//! Command-line interface definition using clap.
//!
//! The binary stays thin: arguments either point at a settings file or
//! override individual paths and flags; everything else is [`Settings`]
//! defaults. [`Args::into_settings`] performs the merge.

use std::path::PathBuf;

use clap::Parser;

use crate::config::Settings;
use crate::error::{ChatvaultError, Result};

/// Organize WhatsApp HTML exports into a per-contact archive with media,
/// transcripts and conversation text files.
#[derive(Parser, Debug, Clone)]
#[command(name = "chatvault")]
#[command(version, about, long_about = None)]
#[command(after_help = "EXAMPLES:
    chatvault --config chatvault.toml
    chatvault --html-dir ./exports --media-dir ./media --output-dir ./archive
    chatvault -c chatvault.toml --no-incremental -v")]
pub struct Args {
    /// Path to a TOML settings file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory containing the .html export files
    #[arg(long, value_name = "DIR")]
    pub html_dir: Option<PathBuf>,

    /// Directory containing the referenced media files
    #[arg(long, value_name = "DIR")]
    pub media_dir: Option<PathBuf>,

    /// Output directory for the archive and registry
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Reparse every export even if unchanged
    #[arg(long)]
    pub no_incremental: bool,

    /// Also copy sent media into the archive
    #[arg(long)]
    pub organize_sent: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    /// Resolves the final settings: the config file (when given) provides
    /// the base, CLI flags override it, and bare directory flags are enough
    /// to run without any file.
    pub fn into_settings(self) -> Result<Settings> {
        let mut settings = match &self.config {
            Some(path) => Settings::load(path)?,
            None => {
                let (Some(html_dir), Some(media_dir), Some(output_dir)) =
                    (self.html_dir.clone(), self.media_dir.clone(), self.output_dir.clone())
                else {
                    return Err(ChatvaultError::invalid_config(
                        "provide --config or all of --html-dir, --media-dir, --output-dir",
                    ));
                };
                Settings::new(html_dir, media_dir, output_dir)
            }
        };

        if let Some(dir) = self.html_dir {
            settings.html_dir = dir;
        }
        if let Some(dir) = self.media_dir {
            settings.media_dir = dir;
        }
        if let Some(dir) = self.output_dir {
            settings.output_dir = dir;
        }
        if self.no_incremental {
            settings.incremental = false;
        }
        if self.organize_sent {
            settings.organize_sent_media = true;
        }

        settings.validate()?;
        Ok(settings)
    }
}
