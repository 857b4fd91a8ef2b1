use std::fmt;
use std::sync::Arc;

use camino::Utf8PathBuf;

use crate::component::{ArtifactId, ComponentId};
use crate::error::ResolveError;
use crate::file_source::LazyFileSource;
use crate::tasks::{TaskDependencyContainer, TaskDependencyContext, TaskId};

/// A single artifact of a resolved variant, along with a lazily resolved file.
///
/// Cloning is cheap and clones share the same [`LazyFileSource`], so the file
/// is resolved at most once however many sets and visitors reference it.
#[derive(Clone)]
pub struct ResolvableArtifact(Arc<ArtifactInner>);

#[derive(Clone)]
struct ArtifactInner {
    id: ArtifactId,
    source: Arc<LazyFileSource>,
    synchronous: bool,
    built_by: Vec<TaskId>,
}

impl ResolvableArtifact {
    /// Create an artifact from a file source.
    ///
    /// `synchronous` artifacts are cheap to resolve and are resolved inline
    /// when visited, the rest is resolved through scheduled operations.
    pub fn new(id: ArtifactId, source: LazyFileSource, synchronous: bool) -> Self {
        Self(Arc::new(ArtifactInner {
            id,
            source: Arc::new(source),
            synchronous,
            built_by: Vec::new(),
        }))
    }

    /// An artifact of a component from the current build. Its file is
    /// produced by `producer`, which the artifact reports as its dependency.
    pub fn local(id: ArtifactId, file: impl Into<Utf8PathBuf>, producer: TaskId) -> Self {
        let file = file.into();
        Self::new(id, LazyFileSource::new(move || Ok(file)), true).built_by(producer)
    }

    /// An artifact that has to be fetched by `resolver`, e.g. downloaded.
    pub fn external<F>(id: ArtifactId, resolver: F) -> Self
    where
        F: FnOnce() -> anyhow::Result<Utf8PathBuf> + Send + 'static,
    {
        Self::new(id, LazyFileSource::new(resolver), false)
    }

    /// Add a task that has to run before the file of this artifact exists.
    pub fn built_by(mut self, task: TaskId) -> Self {
        Arc::make_mut(&mut self.0).built_by.push(task);
        self
    }

    pub fn id(&self) -> &ArtifactId {
        &self.0.id
    }

    pub fn component(&self) -> &ComponentId {
        self.0.id.component()
    }

    /// Whether the owning component is built by the current build.
    pub fn is_local(&self) -> bool {
        self.component().is_local()
    }

    pub fn file_source(&self) -> &LazyFileSource {
        &self.0.source
    }

    pub fn is_resolve_synchronously(&self) -> bool {
        self.0.synchronous
    }

    /// Tasks producing the file of this artifact.
    pub fn build_dependencies(&self) -> &[TaskId] {
        &self.0.built_by
    }

    /// Block until the file is known.
    ///
    /// Synchronous artifacts are resolved inline. Asynchronous artifacts must
    /// have been finalized by a scheduled operation beforehand.
    ///
    /// # Panics
    ///
    /// Panics if the artifact is asynchronous and was never resolved.
    #[track_caller]
    pub fn resolve_as_file(&self) -> Result<Utf8PathBuf, ResolveError> {
        let result = if self.0.synchronous {
            self.0.source.finalize_if_not_already()
        } else {
            match self.0.source.try_value() {
                Some(result) => result,
                None => panic!("{self} was read before its resolution was scheduled"),
            }
        };

        result
            .as_result()
            .map(|file| file.to_path_buf())
            .map_err(Clone::clone)
    }

    /// A new artifact with the same identity whose file is `file`.
    ///
    /// The returned artifact is already resolved, `self` is left untouched.
    pub fn transformed_to(&self, file: impl Into<Utf8PathBuf>) -> Self {
        Self(Arc::new(ArtifactInner {
            id: self.0.id.clone(),
            source: Arc::new(LazyFileSource::resolved(file)),
            synchronous: true,
            built_by: self.0.built_by.clone(),
        }))
    }

    /// Whether both handles point at the same artifact instance.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl TaskDependencyContainer for ResolvableArtifact {
    fn visit_dependencies(&self, context: &mut dyn TaskDependencyContext) {
        self.0.built_by.visit_dependencies(context);
    }
}

impl fmt::Display for ResolvableArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0.id, f)
    }
}

impl fmt::Debug for ResolvableArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvableArtifact")
            .field("id", &self.0.id.display_name())
            .field("synchronous", &self.0.synchronous)
            .field("source", &self.0.source)
            .finish()
    }
}
