//! quill CLI binary.

use anyhow::Result;
use quill::cli::Cli;
use tracing_subscriber::EnvFilter;

/// Main entry point for the quill CLI.
///
/// A current_thread runtime is enough: commands are sequential and I/O bound,
/// and the watch loop is a single task.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // RUST_LOG overrides, e.g. RUST_LOG=quill=debug,quill_doc=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("quill=info,quill_doc=info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!("Starting quill CLI");

    let cli = Cli::parse_args();
    cli.execute().await?;

    tracing::debug!("quill CLI completed successfully");
    Ok(())
}
