//! Services that keep I/O, format conversion and progress reporting out of
//! the transform pipeline

pub mod format;
pub mod io;
pub mod progress;

pub use format::OutputFormatHandler;
pub use io::{ImageIOService, PROCESSED_DIR_NAME};
pub use progress::{
    BatchProcessingStats, ConsoleProgressReporter, NoOpProgressReporter, ProcessingStage,
    ProgressReporter,
};
