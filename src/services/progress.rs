//! Progress reporting service
//!
//! This module separates progress reporting concerns from business logic,
//! allowing the batch driver and the interactive front-end to present
//! progress their own way.

use serde::{Deserialize, Serialize};

/// Stages of the per-image pipeline, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStage {
    /// Loading and decoding the input image
    Load,
    /// Running the background remover
    BackgroundRemoval,
    /// Trimming transparent margins
    Crop,
    /// Aspect-preserving resize
    Resize,
    /// Centering on the target canvas
    Padding,
    /// Flattening onto the background color or image
    Composite,
    /// Encoding and writing the output file
    Save,
}

impl ProcessingStage {
    /// All stages in their fixed execution order
    pub const ORDER: [ProcessingStage; 7] = [
        ProcessingStage::Load,
        ProcessingStage::BackgroundRemoval,
        ProcessingStage::Crop,
        ProcessingStage::Resize,
        ProcessingStage::Padding,
        ProcessingStage::Composite,
        ProcessingStage::Save,
    ];

    /// Short stage name used in logs and reports
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            ProcessingStage::Load => "load",
            ProcessingStage::BackgroundRemoval => "background removal",
            ProcessingStage::Crop => "crop",
            ProcessingStage::Resize => "resize",
            ProcessingStage::Padding => "padding",
            ProcessingStage::Composite => "background composite",
            ProcessingStage::Save => "save",
        }
    }

    /// Get a human-readable description of the processing stage
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            ProcessingStage::Load => "Loading input image",
            ProcessingStage::BackgroundRemoval => "Removing background",
            ProcessingStage::Crop => "Cropping to content",
            ProcessingStage::Resize => "Resizing to fit",
            ProcessingStage::Padding => "Padding to canvas",
            ProcessingStage::Composite => "Compositing onto background",
            ProcessingStage::Save => "Saving result",
        }
    }
}

impl std::fmt::Display for ProcessingStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Statistics for batch processing operations
#[derive(Debug, Clone)]
pub struct BatchProcessingStats {
    /// Number of items completed
    pub items_completed: usize,
    /// Total number of items to process
    pub items_total: usize,
    /// Number of items that failed processing
    pub items_failed: usize,
    /// Name/path of the current item being processed
    pub current_item_name: String,
    /// Processing rate in items per second
    pub processing_rate: f64,
    /// Estimated time remaining in seconds
    pub eta_seconds: Option<u64>,
}

impl BatchProcessingStats {
    /// Items neither completed nor failed yet
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.items_total
            .saturating_sub(self.items_completed + self.items_failed)
    }
}

/// Trait for reporting progress during image processing
pub trait ProgressReporter: Send + Sync {
    /// A stage is about to run for `item`
    fn report_stage(&self, item: &str, stage: ProcessingStage);

    /// `item` finished successfully
    fn report_item_completed(&self, item: &str, elapsed_ms: u64);

    /// `item` failed, optionally at a known stage
    fn report_error(&self, item: &str, stage: Option<ProcessingStage>, error: &str);

    /// Report batch-level progress before each item
    fn report_batch_progress(&self, _stats: &BatchProcessingStats) {}
}

/// No-op progress reporter that discards all progress updates
pub struct NoOpProgressReporter;

impl ProgressReporter for NoOpProgressReporter {
    fn report_stage(&self, _item: &str, _stage: ProcessingStage) {}

    fn report_item_completed(&self, _item: &str, _elapsed_ms: u64) {}

    fn report_error(&self, _item: &str, _stage: Option<ProcessingStage>, _error: &str) {}
}

/// Progress reporter that emits tracing events
pub struct ConsoleProgressReporter {
    verbose: bool,
}

impl ConsoleProgressReporter {
    /// Create a new console progress reporter
    ///
    /// # Arguments
    /// * `verbose` - Whether to log every stage transition
    #[must_use]
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// Format ETA in seconds to human-readable string
    pub(crate) fn format_eta(eta_seconds: Option<u64>) -> String {
        match eta_seconds {
            Some(seconds) if seconds < 60 => format!("{}s", seconds),
            Some(seconds) => format!("{}m {}s", seconds / 60, seconds % 60),
            None => "calculating...".to_string(),
        }
    }
}

impl ProgressReporter for ConsoleProgressReporter {
    fn report_stage(&self, item: &str, stage: ProcessingStage) {
        if self.verbose {
            tracing::debug!(item = %item, stage = %stage, "{}", stage.description());
        }
    }

    fn report_item_completed(&self, item: &str, elapsed_ms: u64) {
        tracing::info!(item = %item, elapsed_ms, "✅ Processed {}", item);
    }

    fn report_error(&self, item: &str, stage: Option<ProcessingStage>, error: &str) {
        match stage {
            Some(stage) => tracing::error!(item = %item, stage = %stage, "❌ {}: {}", item, error),
            None => tracing::error!(item = %item, "❌ {}: {}", item, error),
        }
    }

    fn report_batch_progress(&self, stats: &BatchProcessingStats) {
        tracing::info!(
            "📁 {}/{} files ({:.1} files/sec, {} failed) - ETA: {} - {}",
            stats.items_completed + stats.items_failed + 1,
            stats.items_total,
            stats.processing_rate,
            stats.items_failed,
            Self::format_eta(stats.eta_seconds),
            stats.current_item_name
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order_is_fixed() {
        let names: Vec<&str> = ProcessingStage::ORDER.iter().map(ProcessingStage::name).collect();
        assert_eq!(
            names,
            vec![
                "load",
                "background removal",
                "crop",
                "resize",
                "padding",
                "background composite",
                "save"
            ]
        );
    }

    #[test]
    fn test_stage_display_and_serde() {
        assert_eq!(ProcessingStage::Composite.to_string(), "background composite");
        let json = serde_json::to_string(&ProcessingStage::BackgroundRemoval).unwrap();
        assert_eq!(json, "\"background_removal\"");
    }

    #[test]
    fn test_format_eta() {
        assert_eq!(ConsoleProgressReporter::format_eta(Some(42)), "42s");
        assert_eq!(ConsoleProgressReporter::format_eta(Some(125)), "2m 5s");
        assert_eq!(ConsoleProgressReporter::format_eta(None), "calculating...");
    }

    #[test]
    fn test_remaining_items() {
        let stats = BatchProcessingStats {
            items_completed: 3,
            items_total: 10,
            items_failed: 2,
            current_item_name: "a.png".to_string(),
            processing_rate: 1.0,
            eta_seconds: None,
        };
        assert_eq!(stats.remaining(), 5);
    }

    #[test]
    fn test_reporters_accept_all_events() {
        let reporters: Vec<Box<dyn ProgressReporter>> = vec![
            Box::new(NoOpProgressReporter),
            Box::new(ConsoleProgressReporter::new(true)),
        ];
        for reporter in reporters {
            reporter.report_stage("a.png", ProcessingStage::Crop);
            reporter.report_item_completed("a.png", 12);
            reporter.report_error("b.png", Some(ProcessingStage::Load), "bad header");
        }
    }
}
