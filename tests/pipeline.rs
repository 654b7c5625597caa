mod common;

use async_trait::async_trait;
use common::{TarBuilder, ZipBuilder};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use walkpipe::pipeline::{
    Counter, DedupIndex, Deduplicate, FileMask, Flow, Glob, Inbox, Item, Lister, OpenContainers,
    Operator, Outbox, ParallelFlow, Shutdown, Walk, source, spawn,
};
use walkpipe::wildcard::Mask;

/// Emits counts forever for each input, flags its own exit.
struct Endless {
    exited: Arc<AtomicBool>,
}

#[async_trait]
impl Operator for Endless {
    async fn run(&self, input: Inbox, output: Outbox) {
        'outer: while input.next().await.is_some() {
            let mut n = 0;
            loop {
                if !output.send(Item::Count(n)).await {
                    break 'outer;
                }
                n += 1;
                tokio::task::yield_now().await;
            }
        }
        self.exited.store(true, Ordering::SeqCst);
    }
}

async fn wait_for(flag: &AtomicBool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !flag.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("producer never stopped");
}

fn tree() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    std::fs::create_dir_all(root.join("a")).unwrap();
    std::fs::create_dir_all(root.join("b")).unwrap();
    std::fs::write(root.join("a/notes.txt"), "a").unwrap();
    std::fs::write(root.join("a/image.png"), "png").unwrap();
    std::fs::write(root.join("b/notes.txt"), "b").unwrap();
    ZipBuilder::new()
        .stored("notes.txt", b"zipped")
        .stored("extra.txt", b"extra")
        .stored("data.csv", b"1,2")
        .write(&root.join("b/bundle.zip"));
    TarBuilder::new()
        .file("logs/run.txt", b"run")
        .write(&root.join("logs.tar"));
    dir
}

fn pattern(dir: &tempfile::TempDir, suffix: &str) -> String {
    dir.path().join(suffix).to_string_lossy().into_owned()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn counts_every_entry_across_containers() {
    let dir = tree();
    let shutdown = Shutdown::new();
    let flow = Flow::new()
        .then(Glob)
        .then(OpenContainers::default())
        .then(ParallelFlow::new(Flow::new().then(Walk), 4))
        .then(Counter);

    let out = flow
        .spawn(source([pattern(&dir, "*")], &shutdown))
        .collect()
        .await;
    // a/ (2 files), b/ (1 file + 3 zipped), logs.tar (1)
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].as_count(), Some(7));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn mask_dedup_and_list() {
    let dir = tree();
    let shutdown = Shutdown::new();
    let index = Arc::new(DedupIndex::new());
    let lines = Arc::new(Mutex::new(Vec::new()));

    let per_worker = Flow::new()
        .then(Walk)
        .then(FileMask::new(Mask::new("*.txt").unwrap()))
        .then(Deduplicate::new(index.clone()));
    let flow = Flow::new()
        .then(OpenContainers::default())
        .then(ParallelFlow::new(per_worker, 3))
        .then(Lister::collecting(lines.clone()))
        .then(Counter);

    let out = flow
        .spawn(source([dir.path().to_string_lossy().into_owned()], &shutdown))
        .collect()
        .await;

    // notes.txt (three copies), extra.txt, run.txt
    assert_eq!(out[0].as_count(), Some(3));
    let listed: BTreeSet<String> = lines
        .lock()
        .iter()
        .map(|line| line.rsplit(['/', '\\']).next().unwrap().to_string())
        .collect();
    let want: BTreeSet<String> = ["notes.txt", "extra.txt", "run.txt"].map(String::from).into();
    assert_eq!(listed, want);
    assert_eq!(index.count("notes.txt"), 3);
    assert_eq!(index.duplicates(), 2);
}

#[tokio::test]
async fn unknown_patterns_and_paths_are_skipped() {
    let dir = tree();
    let shutdown = Shutdown::new();
    let flow = Flow::new()
        .then(Glob)
        .then(OpenContainers::default())
        .then(Walk)
        .then(Counter);

    let inputs = [
        pattern(&dir, "nothing-*"),
        pattern(&dir, "[unclosed"),
        pattern(&dir, "logs.tar"),
    ];
    let out = flow.spawn(source(inputs, &shutdown)).collect().await;
    assert_eq!(out[0].as_count(), Some(1));
}

#[tokio::test]
async fn shutdown_stops_an_endless_producer() {
    let exited = Arc::new(AtomicBool::new(false));
    let shutdown = Shutdown::new();
    let flow = Flow::new()
        .then(Endless {
            exited: exited.clone(),
        })
        .then(Lister::collecting(Arc::new(Mutex::new(Vec::new()))));

    let out = flow.spawn(source([Item::Count(0)], &shutdown));
    for _ in 0..10 {
        assert!(out.next().await.is_some());
    }
    shutdown.trigger();
    assert!(out.next().await.is_none());
    wait_for(&exited).await;
}

#[tokio::test]
async fn dropping_the_output_stops_upstream() {
    let exited = Arc::new(AtomicBool::new(false));
    let shutdown = Shutdown::new();
    let endless: Arc<dyn Operator> = Arc::new(Endless {
        exited: exited.clone(),
    });

    let out = spawn(endless, source([Item::Count(0)], &shutdown));
    assert!(out.next().await.is_some());
    drop(out);
    wait_for(&exited).await;
}
