use camino::Utf8PathBuf;

use crate::artifact::ResolvableArtifact;
use crate::component::ArtifactId;
use crate::error::ResolveError;
use crate::set::SingleArtifactSet;
use crate::tasks::{TaskDependencyContainer, TaskDependencyContext, TaskId};
use crate::transform::TransformSubject;

/// An artifact of a component built by the current build.
///
/// The producing task guarantees the file exists by the time anything
/// consumes it, so a transform resolves it inline through the artifact's
/// file source instead of scheduling a download first.
#[derive(Debug, Clone)]
pub struct LocalArtifactSet {
    set: SingleArtifactSet,
}

impl LocalArtifactSet {
    pub(crate) fn new(set: SingleArtifactSet) -> Self {
        Self { set }
    }

    pub fn id(&self) -> &ArtifactId {
        self.set.artifact().id()
    }

    pub fn display_name(&self) -> String {
        self.id().display_name()
    }

    pub fn artifact(&self) -> &ResolvableArtifact {
        self.set.artifact()
    }

    /// Tasks producing the file of this artifact.
    pub fn task_dependencies(&self) -> &[TaskId] {
        self.set.artifact().build_dependencies()
    }

    /// The input of a transform chain applied to this artifact.
    ///
    /// The file source is finalized here unless something already did, so
    /// this works for artifacts resolved asynchronously too.
    pub fn calculate_subject(&self) -> Result<TransformSubject, ResolveError> {
        let artifact = self.set.artifact();
        let file = artifact
            .file_source()
            .finalize_if_not_already()
            .as_result()
            .map_err(Clone::clone)?
            .to_path_buf();
        Ok(TransformSubject::initial(artifact.clone(), file))
    }

    pub fn transformed_to(&self, file: impl Into<Utf8PathBuf>) -> ResolvableArtifact {
        self.set.artifact().transformed_to(file)
    }
}

impl TaskDependencyContainer for LocalArtifactSet {
    fn visit_dependencies(&self, context: &mut dyn TaskDependencyContext) {
        self.task_dependencies().visit_dependencies(context);
    }
}
