//! Concurrent stream processing over typed queues.
//!
//! An [`Operator`] reads an [`Inbox`] and writes an [`Outbox`]. [`spawn`]
//! runs one as a task and hands back its output queue; a [`Flow`] chains
//! operators that way, and a [`ParallelFlow`] runs several copies of a flow
//! against one shared input.
//!
//! Queues are unbounded. A [`Shutdown`] shared by every queue of a pipeline
//! lets a consumer that stops early unblock every stage upstream of it.
//! Items dropped along the way are dropped for real: an [`Item::Entry`]
//! releases its container claim, an [`Item::Container`] requests its close.
//!
//! Operators never pass errors downstream. Whatever fails is logged and
//! skipped, which keeps the pipeline alive at the price of silently missing
//! items.
//!
//! ```no_run
//! use walkpipe::pipeline::{Counter, Flow, Glob, OpenContainers, ParallelFlow, Shutdown, Walk, source};
//!
//! # async fn demo() {
//! let shutdown = Shutdown::new();
//! let flow = Flow::new()
//!     .then(Glob)
//!     .then(OpenContainers::default())
//!     .then(ParallelFlow::new(Flow::new().then(Walk), 4))
//!     .then(Counter);
//! let total = flow.spawn(source(["data/*.zip"], &shutdown)).collect().await;
//! println!("{}", total[0]);
//! # }
//! ```

mod flow;
mod item;
mod operators;
mod queue;

pub use flow::{Flow, Operator, ParallelFlow, spawn};
pub use item::Item;
pub use operators::{
    Counter, DedupIndex, Deduplicate, FileMask, Glob, Lister, OpenContainers, Walk,
};
pub use queue::{Inbox, Outbox, Shutdown, channel, source};
