//! Skyflat Background Extraction CLI Tool
//!
//! Command-line interface for removing background gradients from
//! astronomical images with the skyflat library.

#[cfg(feature = "cli")]
use skyflat::cli;

#[cfg(feature = "cli")]
fn main() -> anyhow::Result<()> {
    cli::main()
}

#[cfg(not(feature = "cli"))]
fn main() {
    panic!("CLI feature not enabled. Please rebuild with --features cli");
}
