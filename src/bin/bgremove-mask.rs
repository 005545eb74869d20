//! bgremove-mask command-line tool
//!
//! Removes the background of each input image and writes the result as PNG.

#[cfg(feature = "cli")]
use bgremove_mask::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<std::process::ExitCode> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature not enabled. Please rebuild with --features cli");
    std::process::exit(2);
}
