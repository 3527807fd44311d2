//! imager batch CLI
//!
//! Processes every image in an input directory: background removal,
//! autocrop, resize, padding and background fill.

#[cfg(feature = "cli")]
use imager::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> std::process::ExitCode {
    match cli::main().await {
        Ok(code) => std::process::ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::ExitCode::from(1)
        },
    }
}

#[cfg(not(feature = "cli"))]
fn main() {
    panic!("CLI feature not enabled. Please rebuild with --features cli");
}
