use std::fmt::{self, Display, Formatter};
use std::time::Duration;

use console::Style;

use crate::scheduler::OperationDescriptor;

const ANSI_BLUE: Style = Style::new().blue();
const ANSI_RED: Style = Style::new().red();

/// How a single operation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationOutcome {
    Succeeded,
    /// The operation reported a failure through its context.
    Failed(String),
    /// The operation panicked.
    Panicked(String),
}

impl OperationOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

#[derive(Debug, Clone)]
pub struct OperationRecord {
    pub description: OperationDescriptor,
    pub duration: Duration,
    pub outcome: OperationOutcome,
}

/// What happened while draining an [`OperationQueue`](crate::OperationQueue).
#[derive(Debug, Clone, Default)]
pub struct QueueReport {
    records: Vec<OperationRecord>,
    elapsed: Duration,
}

impl QueueReport {
    pub(crate) fn new(records: Vec<OperationRecord>, elapsed: Duration) -> Self {
        Self { records, elapsed }
    }

    pub fn records(&self) -> &[OperationRecord] {
        &self.records
    }

    pub fn failures(&self) -> impl Iterator<Item = &OperationRecord> {
        self.records.iter().filter(|r| !r.outcome.is_success())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Wall-clock time spent draining the queue.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// The slowest operation, if any ran.
    pub fn slowest(&self) -> Option<&OperationRecord> {
        self.records.iter().max_by_key(|r| r.duration)
    }
}

impl Display for QueueReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let overhead = format!("(+{}ms)", self.elapsed.as_millis());
        write!(
            f,
            "Finished {} operation(s) {}",
            self.records.len(),
            ANSI_BLUE.apply_to(overhead)
        )?;

        let failed = self.failures().count();
        if failed > 0 {
            let failed = format!("{failed} failed");
            write!(f, ", {}", ANSI_RED.apply_to(failed))?;
        }

        Ok(())
    }
}
