//! Batch driver: run one pipeline over every image in a directory
//!
//! Files are processed one at a time in sorted order. A failing file is
//! recorded and the batch moves on; only setup problems (missing input
//! directory, uncreatable output directory) abort the whole run.

use crate::{
    config::PipelineConfig,
    error::{ImagerError, Result},
    pipeline::Pipeline,
    services::{
        BatchProcessingStats, ConsoleProgressReporter, ImageIOService, ProcessingStage,
        ProgressReporter, PROCESSED_DIR_NAME,
    },
};
use instant::Instant;
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Exit code when every file succeeded or there was nothing to do
pub const EXIT_SUCCESS: i32 = 0;
/// Exit code for setup errors that stop the batch before it starts
pub const EXIT_FATAL: i32 = 1;
/// Exit code when at least one file failed
pub const EXIT_PARTIAL_FAILURE: i32 = 2;

/// Where to read from and write to
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Descend into subdirectories (except `processed/`)
    pub recursive: bool,
    /// Glob matched against file names, e.g. `*.jpg`
    pub pattern: Option<String>,
    /// Move each successfully processed input into `<input>/processed/`
    pub move_processed: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("./input"),
            output_dir: PathBuf::from("./output"),
            recursive: false,
            pattern: None,
            move_processed: false,
        }
    }
}

/// A file that went through every stage
#[derive(Debug, Clone, Serialize)]
pub struct ProcessedFile {
    pub input: PathBuf,
    pub output: PathBuf,
    pub width: u32,
    pub height: u32,
    pub stages: Vec<ProcessingStage>,
    pub elapsed_ms: u64,
    /// New location of the input when `move_processed` is on
    #[serde(skip_serializing_if = "Option::is_none")]
    pub moved_to: Option<PathBuf>,
}

/// A file that failed, with the stage that failed
#[derive(Debug, Clone, Serialize)]
pub struct FailedFile {
    pub input: PathBuf,
    pub stage: Option<ProcessingStage>,
    pub error: String,
}

/// Outcome of a batch run
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub config: PipelineConfig,
    pub processed: Vec<ProcessedFile>,
    pub failed: Vec<FailedFile>,
    pub total_ms: u64,
}

impl BatchReport {
    #[must_use]
    pub fn total(&self) -> usize {
        self.processed.len() + self.failed.len()
    }

    /// 0 when nothing failed, 2 when at least one file failed
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        if self.failed.is_empty() {
            EXIT_SUCCESS
        } else {
            EXIT_PARTIAL_FAILURE
        }
    }

    /// Write the report as pretty-printed JSON
    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| ImagerError::invalid_config(format!("cannot serialize report: {}", e)))?;
        std::fs::write(path, json).map_err(|e| ImagerError::file_io_error("write report", path, &e))
    }
}

/// Find image files under `dir`, sorted for a deterministic order
///
/// The `processed/` subdirectory is never scanned.
pub fn discover_images(dir: &Path, recursive: bool, pattern: Option<&str>) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(ImagerError::file_io_error(
            "read input directory",
            dir,
            &std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
        ));
    }

    let pattern = pattern
        .map(glob::Pattern::new)
        .transpose()
        .map_err(|e| ImagerError::invalid_config(format!("invalid --pattern: {}", e)))?;

    let mut files = Vec::new();
    if recursive {
        let walker = walkdir::WalkDir::new(dir)
            .into_iter()
            .filter_entry(|entry| {
                !(entry.depth() > 0
                    && entry.file_type().is_dir()
                    && entry.file_name() == PROCESSED_DIR_NAME)
            });
        for entry in walker {
            let entry = entry.map_err(std::io::Error::from)?;
            if entry.file_type().is_file() && is_candidate(entry.path(), pattern.as_ref()) {
                files.push(entry.into_path());
            }
        }
    } else {
        let entries = std::fs::read_dir(dir)
            .map_err(|e| ImagerError::file_io_error("read input directory", dir, &e))?;
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type()?.is_file() && is_candidate(&path, pattern.as_ref()) {
                files.push(path);
            }
        }
    }

    files.sort();
    Ok(files)
}

fn is_candidate(path: &Path, pattern: Option<&glob::Pattern>) -> bool {
    ImageIOService::is_supported_format(path) && matches_pattern(path, pattern)
}

/// Check if the file name matches the given pattern
fn matches_pattern(path: &Path, pattern: Option<&glob::Pattern>) -> bool {
    match pattern {
        Some(pattern) => path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| pattern.matches(name)),
        None => true,
    }
}

/// Runs a [`Pipeline`] over a directory
pub struct BatchProcessor<'a> {
    pipeline: &'a Pipeline,
    options: BatchOptions,
    reporter: Arc<dyn ProgressReporter>,
}

impl<'a> BatchProcessor<'a> {
    #[must_use]
    pub fn new(pipeline: &'a Pipeline, options: BatchOptions) -> Self {
        Self {
            pipeline,
            options,
            reporter: Arc::new(ConsoleProgressReporter::new(false)),
        }
    }

    /// Replace the per-file reporter; failures are logged through it
    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Files this batch would process
    pub fn discover(&self) -> Result<Vec<PathBuf>> {
        discover_images(
            &self.options.input_dir,
            self.options.recursive,
            self.options.pattern.as_deref(),
        )
    }

    /// Process every discovered file
    ///
    /// # Errors
    /// Only setup failures; per-file failures land in [`BatchReport::failed`].
    pub async fn run(&self) -> Result<BatchReport> {
        let files = self.discover()?;
        self.run_files(&files).await
    }

    /// Process an explicit list of files
    pub async fn run_files(&self, files: &[PathBuf]) -> Result<BatchReport> {
        let batch_start = Instant::now();
        let mut report = BatchReport {
            config: self.pipeline.config().clone(),
            processed: Vec::new(),
            failed: Vec::new(),
            total_ms: 0,
        };

        if files.is_empty() {
            warn!(
                "No supported images found in {}",
                self.options.input_dir.display()
            );
            return Ok(report);
        }

        std::fs::create_dir_all(&self.options.output_dir).map_err(|e| {
            ImagerError::file_io_error("create output directory", &self.options.output_dir, &e)
        })?;

        info!("Found {} image(s) to process", files.len());

        let mut output_names = HashSet::new();
        for input in files {
            self.reporter
                .report_batch_progress(&self.stats(&report, files.len(), input, batch_start));

            let file_start = Instant::now();
            let label = input.display().to_string();

            match self.process_one(input).await {
                Ok(mut processed) => {
                    if !output_names.insert(processed.output.clone()) {
                        warn!(
                            "{} overwrote an output written earlier in this batch: {}",
                            label,
                            processed.output.display()
                        );
                    }
                    processed.elapsed_ms = elapsed_ms(file_start);
                    debug!("{} -> {}", label, processed.output.display());
                    self.reporter.report_item_completed(&label, processed.elapsed_ms);
                    report.processed.push(processed);
                },
                Err(e) => {
                    let stage = e.stage().copied();
                    self.reporter.report_error(&label, stage, &e.to_string());
                    report.failed.push(FailedFile {
                        input: input.clone(),
                        stage,
                        error: e.to_string(),
                    });
                },
            }
        }

        report.total_ms = elapsed_ms(batch_start);
        log_summary(&report);
        Ok(report)
    }

    async fn process_one(&self, input: &Path) -> Result<ProcessedFile> {
        let result = self.pipeline.process_file(input).await?;
        let output = self.pipeline.save_result(&result, &self.options.output_dir)?;

        let moved_to = if self.options.move_processed {
            match ImageIOService::move_to_processed(input) {
                Ok(destination) => Some(destination),
                Err(e) => {
                    warn!("Processed {} but could not move it: {}", input.display(), e);
                    None
                },
            }
        } else {
            None
        };

        let (width, height) = result.dimensions();
        Ok(ProcessedFile {
            input: input.to_path_buf(),
            output,
            width,
            height,
            stages: result.stages(),
            elapsed_ms: 0,
            moved_to,
        })
    }

    fn stats(
        &self,
        report: &BatchReport,
        total: usize,
        current: &Path,
        batch_start: Instant,
    ) -> BatchProcessingStats {
        let done = report.total();
        let elapsed_seconds = batch_start.elapsed().as_secs_f64();
        let processing_rate = if elapsed_seconds > 0.0 && done > 0 {
            done as f64 / elapsed_seconds
        } else {
            0.0
        };
        let eta_seconds = (processing_rate > 0.0)
            .then(|| (total.saturating_sub(done) as f64 / processing_rate) as u64);

        BatchProcessingStats {
            items_completed: report.processed.len(),
            items_total: total,
            items_failed: report.failed.len(),
            current_item_name: current.display().to_string(),
            processing_rate,
            eta_seconds,
        }
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn log_summary(report: &BatchReport) {
    let total_seconds = report.total_ms as f64 / 1000.0;
    info!("📊 Batch processing summary:");
    info!("  ├─ Files processed: {}", report.processed.len());
    info!("  ├─ Files failed: {}", report.failed.len());
    info!("  ├─ Total time: {:.2}s", total_seconds);
    info!(
        "  └─ Average per file: {:.2}s",
        if report.total() > 0 {
            total_seconds / report.total() as f64
        } else {
            0.0
        }
    );
    if !report.failed.is_empty() {
        warn!(
            "Some files failed to process. Processed: {}, Failed: {}",
            report.processed.len(),
            report.failed.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, b"").unwrap();
    }

    #[test]
    fn test_discover_sorted_and_filtered() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        for name in ["b.png", "a.JPG", "c.txt", "d.webp", "nested/e.png", "processed/f.png"] {
            touch(&dir.join(name));
        }

        let files = discover_images(dir, false, None).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.JPG", "b.png", "d.webp"]);
    }

    #[test]
    fn test_discover_recursive_skips_processed() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        for name in ["a.png", "nested/e.png", "processed/f.png", "nested/processed/g.png"] {
            touch(&dir.join(name));
        }

        let files = discover_images(dir, true, None).unwrap();
        assert_eq!(files, vec![dir.join("a.png"), dir.join("nested/e.png")]);
    }

    #[test]
    fn test_discover_pattern() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        for name in ["shoe_1.png", "shoe_2.jpg", "bag.png"] {
            touch(&dir.join(name));
        }

        let files = discover_images(dir, false, Some("shoe_*")).unwrap();
        assert_eq!(files.len(), 2);

        let err = discover_images(dir, false, Some("[")).unwrap_err();
        assert!(matches!(err, ImagerError::InvalidConfig(_)));
    }

    #[test]
    fn test_discover_missing_dir() {
        let err = discover_images(Path::new("/no/such/input"), false, None).unwrap_err();
        assert!(matches!(err, ImagerError::Io(_)));
    }

    #[test]
    fn test_exit_codes() {
        let mut report = BatchReport {
            config: PipelineConfig::default(),
            processed: Vec::new(),
            failed: Vec::new(),
            total_ms: 0,
        };
        assert_eq!(report.exit_code(), EXIT_SUCCESS);

        report.failed.push(FailedFile {
            input: PathBuf::from("x.png"),
            stage: Some(ProcessingStage::Load),
            error: "bad".to_string(),
        });
        assert_eq!(report.exit_code(), EXIT_PARTIAL_FAILURE);
    }

    #[test]
    fn test_report_json() {
        let temp_dir = TempDir::new().unwrap();
        let report = BatchReport {
            config: PipelineConfig::default(),
            processed: Vec::new(),
            failed: vec![FailedFile {
                input: PathBuf::from("x.png"),
                stage: Some(ProcessingStage::Crop),
                error: "crop failed".to_string(),
            }],
            total_ms: 5,
        };
        let path = temp_dir.path().join("report.json");
        report.write_json(&path).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["failed"][0]["stage"], "crop");
        assert_eq!(value["total_ms"], 5);
    }
}
