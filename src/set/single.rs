use std::fmt;
use std::sync::Arc;

use crate::artifact::ResolvableArtifact;
use crate::attributes::Attributes;
use crate::core::DisplayName;
use crate::scheduler::{OperationContext, OperationDescriptor, OperationScheduler, RunnableOperation};
use crate::set::visitor::{
    ArtifactVisitor, CollectionSource, LocalArtifactVisitor, ResolvedArtifactVisitor,
};
use crate::set::{Artifacts, LocalArtifactSet};
use crate::tasks::{TaskDependencyContainer, TaskDependencyContext};

/// A set holding exactly one artifact, along with the name and attributes of
/// the variant it belongs to.
#[derive(Debug, Clone)]
pub struct SingleArtifactSet(Arc<SingleInner>);

#[derive(Debug)]
struct SingleInner {
    variant: DisplayName,
    attributes: Attributes,
    artifact: ResolvableArtifact,
}

impl SingleArtifactSet {
    pub fn new(variant: DisplayName, attributes: Attributes, artifact: ResolvableArtifact) -> Self {
        Self(Arc::new(SingleInner {
            variant,
            attributes,
            artifact,
        }))
    }

    pub fn variant_name(&self) -> &DisplayName {
        &self.0.variant
    }

    pub fn attributes(&self) -> &Attributes {
        &self.0.attributes
    }

    pub fn artifact(&self) -> &ResolvableArtifact {
        &self.0.artifact
    }

    pub(crate) fn visit(
        &self,
        scheduler: &mut dyn OperationScheduler,
        visitor: &mut dyn ResolvedArtifactVisitor,
    ) {
        if visitor.require_artifact_files() {
            let artifact = &self.0.artifact;
            let source = artifact.file_source();

            if artifact.is_resolve_synchronously() {
                source.finalize_if_not_already();
            } else if source.try_value().is_none() {
                scheduler.add(Box::new(DownloadArtifactFile(artifact.clone())));
            }
        }

        visitor.visit_artifacts(Artifacts::Single(self.clone()));
    }

    pub(crate) fn visit_resolved(&self, visitor: &mut dyn ArtifactVisitor) {
        if visitor.require_artifact_files()
            && let Err(failure) = self.0.artifact.resolve_as_file()
        {
            visitor.visit_failure(&failure);
            return;
        }

        visitor.visit_artifact(&self.0.variant, &self.0.attributes, &self.0.artifact);
        visitor.end_visit_collection(CollectionSource::Artifact);
    }

    pub(crate) fn visit_local_artifacts(&self, visitor: &mut dyn LocalArtifactVisitor) {
        if self.0.artifact.is_local() {
            visitor.visit_local_artifact(LocalArtifactSet::new(self.clone()));
        }
    }

    pub(crate) fn visit_external_artifacts(&self, visitor: &mut dyn FnMut(&ResolvableArtifact)) {
        if !self.0.artifact.is_local() {
            visitor(&self.0.artifact);
        }
    }
}

impl TaskDependencyContainer for SingleArtifactSet {
    fn visit_dependencies(&self, context: &mut dyn TaskDependencyContext) {
        self.0.artifact.visit_dependencies(context);
    }
}

impl fmt::Display for SingleArtifactSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0.artifact, f)
    }
}

/// Finalizes the file source of one asynchronous artifact.
struct DownloadArtifactFile(ResolvableArtifact);

impl RunnableOperation for DownloadArtifactFile {
    fn description(&self) -> OperationDescriptor {
        OperationDescriptor::display_name(format!("Resolve {}", self.0))
            .details(self.0.id().display_name())
    }

    fn run(&self, context: &mut OperationContext) {
        tracing::debug!("resolving {}", self.0);

        let result = self.0.file_source().finalize_if_not_already();
        if let Some(failure) = result.failure() {
            context.set_failure(failure);
        }
    }
}
