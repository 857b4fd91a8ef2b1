use std::fmt;
use std::sync::Arc;

use camino::Utf8PathBuf;
use thiserror::Error;

use crate::tasks::TaskId;

/// Failure to produce the file of a single artifact.
///
/// The error is captured inside the artifact's file source and shared by
/// every visitor that reads it, so it is cheap to clone.
#[derive(Debug, Error, Clone)]
#[error(transparent)]
pub struct ResolveError(#[from] pub(crate) Arc<anyhow::Error>);

impl ResolveError {
    pub fn new(err: impl Into<anyhow::Error>) -> Self {
        Self(Arc::new(err.into()))
    }

    pub fn msg(message: impl fmt::Display + fmt::Debug + Send + Sync + 'static) -> Self {
        Self(Arc::new(anyhow::Error::msg(message)))
    }

    /// The underlying error.
    pub fn inner(&self) -> &anyhow::Error {
        &self.0
    }
}

impl From<anyhow::Error> for ResolveError {
    fn from(e: anyhow::Error) -> Self {
        ResolveError(Arc::new(e))
    }
}

impl From<TransformError> for ResolveError {
    fn from(e: TransformError) -> Self {
        match e {
            TransformError::Input(inner) => inner,
            other => ResolveError::new(other),
        }
    }
}

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("Transform step '{step}' failed on {input}:\n{source}")]
    Step {
        step: String,
        input: Utf8PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("Couldn't prepare transform workspace.\n{0}")]
    Workspace(#[from] std::io::Error),

    #[error(transparent)]
    Input(ResolveError),
}

/// Invalid component or artifact coordinates.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("Component coordinate '{0}' must not be empty")]
    EmptyCoordinate(&'static str),

    #[error("Artifact name must not be empty")]
    EmptyName,
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Failed to build worker pool")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TaskGraphError {
    #[error("Cycle detected in task graph at '{0}'")]
    Cycle(TaskId),
}

/// Every failure collected while visiting a set whose files were required.
#[derive(Debug, Error)]
pub struct ResolutionFailures(pub Vec<ResolveError>);

impl fmt::Display for ResolutionFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Could not resolve {} artifact(s):", self.0.len())?;
        for failure in &self.0 {
            writeln!(f, "  - {failure}")?;
        }
        Ok(())
    }
}

#[cfg(feature = "logging")]
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Invalid log filter:\n{0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),

    #[error(transparent)]
    Init(#[from] tracing_subscriber::util::TryInitError),
}
