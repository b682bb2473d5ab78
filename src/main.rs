//! Main entry point for the dirzip CLI application.

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::debug;

use dirzip::{Archiver, Cli, Progress};

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_tracing(&cli);
    debug!("Parsed CLI arguments: {cli:?}");

    let Some(options) = cli.archive_options()? else {
        bail!("nothing to archive: pass a SOURCE directory or --platform <PLATFORM>");
    };

    let source = options.source.clone();
    let quiet = cli.quiet;

    Archiver::new(options)
        .on_progress(|event| print_progress(event, quiet))
        .run()
        .with_context(|| format!("failed to archive {}", source.display()))?;

    Ok(())
}

fn setup_tracing(cli: &Cli) {
    if let Some(level) = cli.log_level.to_tracing_level() {
        tracing_subscriber::fmt()
            .with_max_level(level)
            .with_writer(std::io::stderr)
            .without_time()
            .compact()
            .init();
    }
}

fn print_progress(event: Progress<'_>, quiet: bool) {
    match event {
        Progress::Started {
            source,
            destination,
        } => {
            println!("Source: {}", source.display());
            println!("Destination: {}", destination.display());
        }
        Progress::Entry { name, .. } => {
            if !quiet {
                println!("Zipping: {}", name);
            }
        }
        Progress::Finished(summary) => {
            println!(
                "Zip created successfully. ({} files, {})",
                summary.entries,
                format_size(summary.total_bytes)
            );
        }
    }
}

/// Format a byte size into a human-readable string.
fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{} bytes", size)
    }
}
