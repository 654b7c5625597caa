//! Stock operators.
//!
//! None of them ever fails the pipeline: an item that can't be processed is
//! logged at `warn` and skipped. Entries an operator decides not to forward
//! are closed on the spot so their container can be released.

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, trace, warn};

use super::Item;
use super::flow::Operator;
use super::queue::{Inbox, Outbox};
use crate::walker::Walker;
use crate::wildcard::{self, Mask};

fn unexpected(operator: &str, item: &Item) {
    warn!(operator, kind = item.kind(), item = %item, "unexpected item dropped");
}

/// Swallows everything, then emits the number of items seen.
#[derive(Debug, Default)]
pub struct Counter;

#[async_trait]
impl Operator for Counter {
    async fn run(&self, input: Inbox, output: Outbox) {
        let mut count = 0usize;
        while let Some(item) = input.next().await {
            drop(item);
            count += 1;
        }
        output.send(Item::Count(count)).await;
    }
}

/// Expands wildcard patterns into the paths they match.
#[derive(Debug, Default)]
pub struct Glob;

#[async_trait]
impl Operator for Glob {
    async fn run(&self, input: Inbox, output: Outbox) {
        while let Some(item) = input.next().await {
            let pattern = match item {
                Item::Path(pattern) => pattern,
                other => {
                    unexpected("glob", &other);
                    continue;
                }
            };

            let expanded = {
                let pattern = pattern.clone();
                tokio::task::spawn_blocking(move || wildcard::expand(&pattern)).await
            };
            let paths = match expanded {
                Ok(Ok(paths)) => paths,
                Ok(Err(err)) => {
                    warn!(pattern = %pattern, error = %err, "skipping pattern");
                    continue;
                }
                Err(err) => {
                    warn!(pattern = %pattern, error = %err, "pattern expansion aborted");
                    continue;
                }
            };
            if paths.is_empty() {
                debug!(pattern = %pattern, "no match");
            }
            for path in paths {
                if !output.send(Item::Path(path.to_string_lossy().into_owned())).await {
                    return;
                }
            }
        }
    }
}

/// Opens each path as a container through the [`Walker`].
#[derive(Debug, Clone, Default)]
pub struct OpenContainers {
    walker: Walker,
}

impl OpenContainers {
    pub fn new(walker: Walker) -> Self {
        Self { walker }
    }
}

#[async_trait]
impl Operator for OpenContainers {
    async fn run(&self, input: Inbox, output: Outbox) {
        while let Some(item) = input.next().await {
            let path = match item {
                Item::Path(path) => path,
                other => {
                    unexpected("open", &other);
                    continue;
                }
            };
            match self.walker.open(Path::new(&path)).await {
                Ok(container) => {
                    if !output.send(Item::Container(container)).await {
                        return;
                    }
                }
                Err(err) => warn!(path = %path, error = %err, "can't open"),
            }
        }
    }
}

/// Streams every entry of each container, closing the container once its
/// entries have all been handed on.
#[derive(Debug, Default)]
pub struct Walk;

#[async_trait]
impl Operator for Walk {
    async fn run(&self, input: Inbox, output: Outbox) {
        while let Some(item) = input.next().await {
            let container = match item {
                Item::Container(container) => container,
                other => {
                    unexpected("walk", &other);
                    continue;
                }
            };

            let mut entries = container.items();
            let mut forwarded = 0usize;
            let mut delivered = true;
            while let Some(entry) = entries.next().await {
                match entry {
                    Ok(entry) => {
                        if !output.send(Item::Entry(entry)).await {
                            delivered = false;
                            break;
                        }
                        forwarded += 1;
                    }
                    Err(err) => warn!(container = %container, error = %err, "traversal error"),
                }
            }
            drop(entries);
            container.close();
            debug!(container = %container, entries = forwarded, "walked");

            if !delivered {
                return;
            }
        }
    }
}

/// Forwards entries whose base name matches a mask and closes the rest.
#[derive(Debug, Clone)]
pub struct FileMask {
    mask: Mask,
}

impl FileMask {
    pub fn new(mask: Mask) -> Self {
        Self { mask }
    }
}

#[async_trait]
impl Operator for FileMask {
    async fn run(&self, input: Inbox, output: Outbox) {
        while let Some(item) = input.next().await {
            let mut entry = match item {
                Item::Entry(entry) => entry,
                other => {
                    unexpected("mask", &other);
                    continue;
                }
            };
            if self.mask.matches(entry.name()) {
                if !output.send(Item::Entry(entry)).await {
                    return;
                }
            } else {
                trace!(entry = %entry, mask = self.mask.as_str(), "masked out");
                entry.close();
            }
        }
    }
}

/// Occurrence counts per entry name, shared by every [`Deduplicate`]
/// copy of one run.
#[derive(Debug, Default)]
pub struct DedupIndex {
    seen: Mutex<HashMap<String, usize>>,
}

impl DedupIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one occurrence of `name`; returns how many times it has now
    /// been seen.
    pub fn observe(&self, name: &str) -> usize {
        let mut seen = self.seen.lock();
        let count = seen.entry(name.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    pub fn count(&self, name: &str) -> usize {
        self.seen.lock().get(name).copied().unwrap_or(0)
    }

    /// Distinct names seen.
    pub fn len(&self) -> usize {
        self.seen.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Occurrences dropped as duplicates.
    pub fn duplicates(&self) -> usize {
        self.seen.lock().values().map(|n| n - 1).sum()
    }
}

/// Forwards the first entry of each base name; later ones are counted and
/// closed.
#[derive(Debug, Clone)]
pub struct Deduplicate {
    index: Arc<DedupIndex>,
}

impl Deduplicate {
    pub fn new(index: Arc<DedupIndex>) -> Self {
        Self { index }
    }

    pub fn index(&self) -> &Arc<DedupIndex> {
        &self.index
    }
}

#[async_trait]
impl Operator for Deduplicate {
    async fn run(&self, input: Inbox, output: Outbox) {
        while let Some(item) = input.next().await {
            let mut entry = match item {
                Item::Entry(entry) => entry,
                other => {
                    unexpected("dedup", &other);
                    continue;
                }
            };
            let seen = self.index.observe(entry.name());
            if seen == 1 {
                if !output.send(Item::Entry(entry)).await {
                    return;
                }
            } else {
                debug!(entry = %entry, seen, "duplicate dropped");
                entry.close();
            }
        }
    }
}

#[derive(Debug, Clone)]
enum Sink {
    Stdout,
    Lines(Arc<Mutex<Vec<String>>>),
}

/// Prints every item and passes it on unchanged.
#[derive(Debug, Clone)]
pub struct Lister {
    sink: Sink,
}

impl Lister {
    pub fn stdout() -> Self {
        Self { sink: Sink::Stdout }
    }

    /// Record lines in `lines` instead of printing them.
    pub fn collecting(lines: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            sink: Sink::Lines(lines),
        }
    }
}

impl Default for Lister {
    fn default() -> Self {
        Self::stdout()
    }
}

#[async_trait]
impl Operator for Lister {
    async fn run(&self, input: Inbox, output: Outbox) {
        while let Some(item) = input.next().await {
            match &self.sink {
                Sink::Stdout => println!("{}", item),
                Sink::Lines(lines) => lines.lock().push(item.to_string()),
            }
            if !output.send(item).await {
                return;
            }
        }
    }
}
