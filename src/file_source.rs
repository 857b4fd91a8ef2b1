use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock, PoisonError};

use camino::{Utf8Path, Utf8PathBuf};

use crate::core::panic_message;
use crate::error::ResolveError;

/// Computes the file of an artifact, e.g. by downloading it.
pub type Resolver = Box<dyn FnOnce() -> anyhow::Result<Utf8PathBuf> + Send>;

/// Observable lifecycle of a [`LazyFileSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    Unresolved,
    Resolving,
    Resolved,
    Failed,
}

/// Terminal value of a [`LazyFileSource`].
#[derive(Debug, Clone)]
pub struct ResolveResult(Result<Utf8PathBuf, ResolveError>);

impl ResolveResult {
    pub fn is_successful(&self) -> bool {
        self.0.is_ok()
    }

    pub fn file(&self) -> Option<&Utf8Path> {
        self.0.as_deref().ok()
    }

    pub fn failure(&self) -> Option<&ResolveError> {
        self.0.as_ref().err()
    }

    pub fn as_result(&self) -> Result<&Utf8Path, &ResolveError> {
        self.0.as_deref()
    }
}

/// A memoized, thread-safe "resolve this artifact's file" cell.
///
/// The resolver runs at most once. Concurrent callers of
/// [`finalize_if_not_already`](Self::finalize_if_not_already) block until the
/// first caller is done and then all observe the same terminal value.
/// Failures (including panics in the resolver) are captured, never thrown.
pub struct LazyFileSource {
    resolver: Mutex<Option<Resolver>>,
    started: AtomicBool,
    value: OnceLock<ResolveResult>,
}

impl LazyFileSource {
    pub fn new<F>(resolver: F) -> Self
    where
        F: FnOnce() -> anyhow::Result<Utf8PathBuf> + Send + 'static,
    {
        Self {
            resolver: Mutex::new(Some(Box::new(resolver))),
            started: AtomicBool::new(false),
            value: OnceLock::new(),
        }
    }

    /// A source that is already in the `Resolved` state.
    pub fn resolved(file: impl Into<Utf8PathBuf>) -> Self {
        Self::terminal(ResolveResult(Ok(file.into())))
    }

    /// A source that is already in the `Failed` state.
    pub fn failed(error: ResolveError) -> Self {
        Self::terminal(ResolveResult(Err(error)))
    }

    fn terminal(result: ResolveResult) -> Self {
        Self {
            resolver: Mutex::new(None),
            started: AtomicBool::new(true),
            value: OnceLock::from(result),
        }
    }

    /// Run the resolver unless it already ran, and return the terminal value.
    pub fn finalize_if_not_already(&self) -> &ResolveResult {
        self.value.get_or_init(|| {
            self.started.store(true, Ordering::Release);

            let resolver = self
                .resolver
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();

            let result = match resolver {
                Some(resolver) => match catch_unwind(AssertUnwindSafe(resolver)) {
                    Ok(result) => result.map_err(ResolveError::from),
                    Err(panic) => Err(ResolveError::msg(panic_message(panic))),
                },
                None => Err(ResolveError::msg("file source has no resolver")),
            };

            if let Err(err) = &result {
                tracing::warn!("artifact resolution failed: {err}");
            }

            ResolveResult(result)
        })
    }

    /// The terminal value.
    ///
    /// # Panics
    ///
    /// Panics when the source was not finalized yet. Callers must finalize it
    /// first, either inline or through a scheduled operation.
    #[track_caller]
    pub fn value(&self) -> &ResolveResult {
        match self.value.get() {
            Some(value) => value,
            None => panic!("file source was read before it was finalized"),
        }
    }

    /// The terminal value, if the source has been finalized.
    pub fn try_value(&self) -> Option<&ResolveResult> {
        self.value.get()
    }

    pub fn state(&self) -> SourceState {
        match self.value.get() {
            Some(value) if value.is_successful() => SourceState::Resolved,
            Some(_) => SourceState::Failed,
            None if self.started.load(Ordering::Acquire) => SourceState::Resolving,
            None => SourceState::Unresolved,
        }
    }
}

impl fmt::Debug for LazyFileSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyFileSource")
            .field("state", &self.state())
            .finish()
    }
}
