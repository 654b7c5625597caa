use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error};

use super::queue::{Inbox, Outbox, channel};

/// One stage of a pipeline.
///
/// `run` reads `input` until it is exhausted and writes to `output`. The
/// output queue closes once `run` returns and `output` is dropped. An
/// operator must return promptly when [`Outbox::send`] reports `false`.
#[async_trait]
pub trait Operator: Send + Sync {
    async fn run(&self, input: Inbox, output: Outbox);
}

/// Run `operator` as its own task and return the queue it writes to.
pub fn spawn(operator: Arc<dyn Operator>, input: Inbox) -> Inbox {
    let (output, next) = channel(input.shutdown());
    tokio::spawn(async move {
        operator.run(input, output).await;
    });
    next
}

/// Stages run in sequence, each one a task of its own.
#[derive(Clone, Default)]
pub struct Flow {
    stages: Vec<Option<Arc<dyn Operator>>>,
}

impl Flow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then<O: Operator + 'static>(self, operator: O) -> Self {
        self.stage(Some(Arc::new(operator)))
    }

    /// Append a stage; `None` passes items through untouched.
    pub fn stage(mut self, operator: Option<Arc<dyn Operator>>) -> Self {
        self.stages.push(operator);
        self
    }

    /// Number of stages that actually run.
    pub fn len(&self) -> usize {
        self.stages.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wire every stage and return the last stage's output.
    pub fn spawn(&self, input: Inbox) -> Inbox {
        self.stages
            .iter()
            .flatten()
            .fold(input, |queue, operator| spawn(operator.clone(), queue))
    }
}

#[async_trait]
impl Operator for Flow {
    async fn run(&self, input: Inbox, output: Outbox) {
        let results = self.spawn(input);
        while let Some(item) = results.next().await {
            if !output.send(item).await {
                return;
            }
        }
    }
}

impl std::fmt::Debug for Flow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Flow")
            .field("stages", &self.stages.len())
            .field("running", &self.len())
            .finish()
    }
}

/// `workers` copies of a flow draining one input into one output.
///
/// Items go to whichever worker asks first; order is kept only among the
/// items a single worker handled.
#[derive(Debug, Clone)]
pub struct ParallelFlow {
    flow: Flow,
    workers: usize,
}

impl ParallelFlow {
    pub fn new(flow: Flow, workers: usize) -> Self {
        Self {
            flow,
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }
}

#[async_trait]
impl Operator for ParallelFlow {
    async fn run(&self, input: Inbox, output: Outbox) {
        let handles: Vec<_> = (0..self.workers)
            .map(|worker| {
                let flow = self.flow.clone();
                let input = input.clone();
                let output = output.clone();
                tokio::spawn(async move {
                    Operator::run(&flow, input, output).await;
                    debug!(worker, "worker done");
                })
            })
            .collect();
        drop(input);
        drop(output);

        for result in futures::future::join_all(handles).await {
            if let Err(err) = result {
                error!(error = %err, "pipeline worker failed");
            }
        }
    }
}
