//! Schedulable units of work and the queue that runs them.
//!
//! Visiting an artifact set never blocks on slow I/O directly. Artifacts that
//! need a download or a transform are turned into [`RunnableOperation`]s and
//! handed to an [`OperationScheduler`]. The provided [`OperationQueue`] runs
//! queued operations on a rayon thread pool once
//! [`wait_for_completion`](OperationQueue::wait_for_completion) is called.

mod report;

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::LazyLock;
use std::time::Instant;

use indicatif::ProgressStyle;
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use serde::Deserialize;
use tracing::Span;
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::core::panic_message;
use crate::error::SchedulerError;

pub use report::{OperationOutcome, OperationRecord, QueueReport};

static STYLE_QUEUE: LazyLock<ProgressStyle> = LazyLock::new(|| {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
        .expect("invalid progress bar template")
        .progress_chars("=>-")
});

static STYLE_OPERATION: LazyLock<ProgressStyle> = LazyLock::new(|| {
    ProgressStyle::default_spinner()
        .template("{spinner:.blue} {msg}")
        .expect("invalid progress bar template")
});

/// Human readable description of an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationDescriptor {
    display_name: String,
    details: Option<String>,
}

impl OperationDescriptor {
    pub fn display_name(name: impl Into<String>) -> Self {
        Self {
            display_name: name.into(),
            details: None,
        }
    }

    pub fn details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.display_name
    }

    pub fn get_details(&self) -> Option<&str> {
        self.details.as_deref()
    }
}

impl fmt::Display for OperationDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_name)
    }
}

/// Passed to a running operation so it can report how it went.
#[derive(Debug, Default)]
pub struct OperationContext {
    failure: Option<String>,
}

impl OperationContext {
    /// Mark the operation as failed. The failure is informational: the
    /// result of the work itself is published by the operation.
    pub fn set_failure(&mut self, failure: impl fmt::Display) {
        self.failure = Some(failure.to_string());
    }

    fn into_outcome(self) -> OperationOutcome {
        match self.failure {
            Some(failure) => OperationOutcome::Failed(failure),
            None => OperationOutcome::Succeeded,
        }
    }
}

/// An independent unit of work which may run in parallel with other units.
pub trait RunnableOperation: Send {
    fn description(&self) -> OperationDescriptor;

    fn run(&self, context: &mut OperationContext);
}

/// Accepts operations for later execution.
pub trait OperationScheduler {
    fn add(&mut self, operation: Box<dyn RunnableOperation>);
}

/// Collecting operations into a vector defers running them to the caller.
impl OperationScheduler for Vec<Box<dyn RunnableOperation>> {
    fn add(&mut self, operation: Box<dyn RunnableOperation>) {
        self.push(operation);
    }
}

/// Settings of an [`OperationQueue`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Number of worker threads, `None` picks one per CPU.
    pub threads: Option<usize>,
    /// Prefix of worker thread names.
    pub thread_name: String,
    /// Decorate the queue span with a progress bar.
    pub progress: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            threads: None,
            thread_name: String::from("tsumiki-worker"),
            progress: true,
        }
    }
}

/// Runs queued operations in parallel on a rayon thread pool.
pub struct OperationQueue {
    pending: Vec<Box<dyn RunnableOperation>>,
    pool: Option<rayon::ThreadPool>,
    progress: bool,
}

impl OperationQueue {
    /// A queue running on the global rayon pool.
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
            pool: None,
            progress: true,
        }
    }

    /// A queue running on a dedicated pool built from `config`.
    pub fn with_config(config: &SchedulerConfig) -> Result<Self, SchedulerError> {
        let prefix = config.thread_name.clone();
        let mut builder =
            rayon::ThreadPoolBuilder::new().thread_name(move |i| format!("{prefix}-{i}"));

        if let Some(threads) = config.threads {
            builder = builder.num_threads(threads);
        }

        Ok(Self {
            pending: Vec::new(),
            pool: Some(builder.build()?),
            progress: config.progress,
        })
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Descriptions of the operations waiting to run.
    pub fn pending(&self) -> Vec<OperationDescriptor> {
        self.pending.iter().map(|op| op.description()).collect()
    }

    /// Run every queued operation and block until all of them finished.
    ///
    /// Operations run in no particular order. A panicking operation is
    /// recorded in the report and does not affect the others.
    pub fn wait_for_completion(&mut self) -> QueueReport {
        let operations = std::mem::take(&mut self.pending);
        if operations.is_empty() {
            return QueueReport::default();
        }

        let start = Instant::now();
        let root_span = tracing::info_span!("resolving_artifacts", count = operations.len());
        if self.progress {
            root_span.pb_set_style(&STYLE_QUEUE);
            root_span.pb_set_length(operations.len() as u64);
            root_span.pb_set_message("Resolving artifacts...");
        }
        let _enter = root_span.enter();

        let progress = self.progress;
        let run = || {
            operations
                .into_par_iter()
                .map(|operation| run_operation(operation.as_ref(), &root_span, progress))
                .collect::<Vec<_>>()
        };

        let records = match &self.pool {
            Some(pool) => pool.install(run),
            None => run(),
        };

        let report = QueueReport::new(records, start.elapsed());
        tracing::info!("{report}");
        report
    }
}

impl Default for OperationQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationScheduler for OperationQueue {
    fn add(&mut self, operation: Box<dyn RunnableOperation>) {
        tracing::debug!("queued {}", operation.description());
        self.pending.push(operation);
    }
}

fn run_operation(
    operation: &dyn RunnableOperation,
    parent: &Span,
    progress: bool,
) -> OperationRecord {
    let description = operation.description();

    let span = tracing::info_span!(parent: parent, "operation", name = %description);
    if progress {
        span.pb_set_style(&STYLE_OPERATION);
        span.pb_set_message(description.name());
    }
    let _enter = span.enter();

    let start = Instant::now();
    let mut context = OperationContext::default();

    let outcome = match catch_unwind(AssertUnwindSafe(|| operation.run(&mut context))) {
        Ok(()) => context.into_outcome(),
        Err(panic) => OperationOutcome::Panicked(panic_message(panic)),
    };

    if progress {
        parent.pb_inc(1);
    }

    OperationRecord {
        description,
        duration: start.elapsed(),
        outcome,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Count(Arc<AtomicUsize>, &'static str);

    impl RunnableOperation for Count {
        fn description(&self) -> OperationDescriptor {
            OperationDescriptor::display_name(self.1)
        }

        fn run(&self, context: &mut OperationContext) {
            self.0.fetch_add(1, Ordering::SeqCst);
            match self.1 {
                "fail" => context.set_failure("nope"),
                "panic" => panic!("worker exploded"),
                _ => {}
            }
        }
    }

    #[test]
    fn test_queue_runs_every_operation_once() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut queue = OperationQueue::with_config(&SchedulerConfig {
            threads: Some(4),
            progress: false,
            ..Default::default()
        })
        .unwrap();

        for _ in 0..32 {
            queue.add(Box::new(Count(counter.clone(), "ok")));
        }
        assert_eq!(queue.len(), 32);

        let report = queue.wait_for_completion();
        assert_eq!(counter.load(Ordering::SeqCst), 32);
        assert_eq!(report.len(), 32);
        assert!(queue.is_empty());
        assert_eq!(report.failures().count(), 0);
    }

    #[test]
    fn test_failures_and_panics_are_isolated() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut queue = OperationQueue::new();
        queue.add(Box::new(Count(counter.clone(), "ok")));
        queue.add(Box::new(Count(counter.clone(), "fail")));
        queue.add(Box::new(Count(counter.clone(), "panic")));

        let report = queue.wait_for_completion();
        assert_eq!(counter.load(Ordering::SeqCst), 3);

        let mut outcomes: Vec<_> = report
            .records()
            .iter()
            .map(|r| (r.description.name().to_string(), r.outcome.clone()))
            .collect();
        outcomes.sort_by(|a, b| a.0.cmp(&b.0));

        assert_eq!(
            outcomes[0],
            (String::from("fail"), OperationOutcome::Failed(String::from("nope")))
        );
        assert_eq!(outcomes[1], (String::from("ok"), OperationOutcome::Succeeded));
        assert!(matches!(&outcomes[2].1, OperationOutcome::Panicked(msg) if msg.contains("worker exploded")));
    }

    #[test]
    fn test_empty_queue() {
        let mut queue = OperationQueue::new();
        let report = queue.wait_for_completion();
        assert!(report.is_empty());
    }

    #[test]
    fn test_config_from_json() {
        let config: SchedulerConfig = serde_json::from_str(r#"{"threads": 2}"#).unwrap();
        assert_eq!(config.threads, Some(2));
        assert_eq!(config.thread_name, "tsumiki-worker");
        assert!(config.progress);
    }
}
