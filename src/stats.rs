//! Per-run statistics.
//!
//! Every run completes and reports counts; nothing is silently dropped. A
//! success rate below 95% is flagged as a warning for the operator to judge,
//! never a hard failure.

use tracing::{info, warn};

/// The warning threshold, in percent.
const HEALTHY_RATE: f64 = 95.0;

/// Counters aggregated over one pipeline run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Export files discovered under the HTML directory.
    pub exports_found: usize,
    /// Export files parsed this run.
    pub exports_parsed: usize,
    /// Export files served from the conversation cache.
    pub exports_cached: usize,
    /// Export files that failed to parse.
    pub exports_failed: usize,
    /// Media files located and copied.
    pub media_organized: usize,
    /// Media references with no file found (placeholder written).
    pub media_missing: usize,
    /// Audio conversions performed.
    pub conversions: usize,
    /// Audio conversions that exhausted their retries.
    pub conversion_failures: usize,
    /// Transcriptions stored.
    pub transcriptions: usize,
    /// Transcriptions that failed permanently.
    pub transcription_failures: usize,
    /// Consolidated audio files built.
    pub super_files_built: usize,
}

impl RunStats {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total operations attempted.
    pub fn attempted(&self) -> usize {
        self.exports_parsed
            + self.exports_cached
            + self.exports_failed
            + self.media_organized
            + self.media_missing
            + self.conversions
            + self.conversion_failures
            + self.transcriptions
            + self.transcription_failures
    }

    /// Total per-item failures.
    pub fn failures(&self) -> usize {
        self.exports_failed + self.media_missing + self.conversion_failures + self.transcription_failures
    }

    /// Percentage of attempted operations that succeeded. A run that
    /// attempted nothing is fully successful.
    pub fn success_rate(&self) -> f64 {
        let attempted = self.attempted();
        if attempted == 0 {
            return 100.0;
        }
        #[allow(clippy::cast_precision_loss)]
        {
            100.0 * (attempted - self.failures()) as f64 / attempted as f64
        }
    }

    /// Returns `true` when the success rate meets the warning threshold.
    pub fn is_healthy(&self) -> bool {
        self.success_rate() >= HEALTHY_RATE
    }

    /// Logs the end-of-run summary, warning when below the threshold.
    pub fn log_summary(&self) {
        info!(
            exports_found = self.exports_found,
            exports_parsed = self.exports_parsed,
            exports_cached = self.exports_cached,
            exports_failed = self.exports_failed,
            media_organized = self.media_organized,
            media_missing = self.media_missing,
            conversions = self.conversions,
            conversion_failures = self.conversion_failures,
            transcriptions = self.transcriptions,
            transcription_failures = self.transcription_failures,
            super_files_built = self.super_files_built,
            success_rate = %format!("{:.1}%", self.success_rate()),
            "run complete"
        );
        if !self.is_healthy() {
            warn!(
                success_rate = %format!("{:.1}%", self.success_rate()),
                threshold = %format!("{HEALTHY_RATE:.0}%"),
                "success rate below threshold, inspect the failures above"
            );
        }
    }
}

impl std::fmt::Display for RunStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Exports:        {} found, {} parsed, {} cached, {} failed",
            self.exports_found, self.exports_parsed, self.exports_cached, self.exports_failed)?;
        writeln!(f, "Media:          {} organized, {} missing",
            self.media_organized, self.media_missing)?;
        writeln!(f, "Conversions:    {} done, {} failed",
            self.conversions, self.conversion_failures)?;
        writeln!(f, "Transcriptions: {} done, {} failed",
            self.transcriptions, self.transcription_failures)?;
        writeln!(f, "Super files:    {} built", self.super_files_built)?;
        write!(f, "Success rate:   {:.1}%", self.success_rate())
    }
}
