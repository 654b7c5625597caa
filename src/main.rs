//! Main entry point for the walkpipe CLI application.
//!
//! Builds one pipeline from the command line:
//! patterns → glob → open → N × (walk → mask → dedup) → list → count.

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use walkpipe::pipeline::{
    Counter, DedupIndex, Deduplicate, FileMask, Flow, Glob, Item, Lister, OpenContainers, Operator,
    ParallelFlow, Shutdown, Walk, source,
};
use walkpipe::wildcard::Mask;
use walkpipe::{Cli, Entry, Registry, Walker};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(&cli);

    let mask = cli.mask.as_deref().map(Mask::new).transpose()?;
    let dedup = cli.dedup.then(|| Arc::new(DedupIndex::new()));
    let walker = Walker::new(Arc::new(Registry::with_defaults()));

    let per_worker = Flow::new()
        .then(Walk)
        .stage(mask.map(|mask| Arc::new(FileMask::new(mask)) as Arc<dyn Operator>))
        .stage(
            dedup
                .clone()
                .map(|index| Arc::new(Deduplicate::new(index)) as Arc<dyn Operator>),
        );
    let flow = Flow::new()
        .then(Glob)
        .then(OpenContainers::new(walker))
        .then(ParallelFlow::new(per_worker, cli.jobs as usize))
        .stage(
            cli.is_listing()
                .then(|| Arc::new(Lister::stdout()) as Arc<dyn Operator>),
        )
        .stage(cli.count.then(|| Arc::new(Counter) as Arc<dyn Operator>));

    let shutdown = Shutdown::new();
    let results = flow.spawn(source(cli.patterns.clone(), &shutdown));
    while let Some(item) = results.next().await {
        match item {
            Item::Count(count) => println!("{}", count),
            Item::Entry(mut entry) if cli.text => {
                if let Err(err) = print_text(&mut entry).await {
                    warn!(entry = %entry, error = %err, "can't read");
                }
            }
            _ => {}
        }
    }

    if let Some(index) = dedup {
        info!(names = index.len(), duplicates = index.duplicates(), "deduplicated");
    }
    Ok(())
}

/// Copy an entry's decoded text to stdout, then release it.
async fn print_text(entry: &mut Entry) -> Result<()> {
    let reader = entry.open_text().await?;
    let mut stdout = tokio::io::stdout();
    tokio::io::copy(reader, &mut stdout).await?;
    stdout.flush().await?;
    entry.close();
    Ok(())
}

/// Logs go to stderr so listings can be piped. `RUST_LOG` wins over flags.
fn setup_logging(cli: &Cli) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_filter()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
