//! imager interactive front-end
//!
//! Prompts for one image at a time and the settings to apply to it.

#[cfg(feature = "cli")]
use imager::cli::interactive;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> std::process::ExitCode {
    match interactive::main().await {
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
