//! Composable, lazily resolved sets of artifacts.
//!
//! A [`ResolvedArtifactSet`] is an immutable tree. Leaves hold a single
//! artifact, inner nodes either concatenate children or run a delegate set
//! through a transformation chain. Consumers walk the tree with visitors:
//!
//! * [`ResolvedArtifactSet::visit`] is the scheduling visit. It resolves
//!   cheap artifacts inline, queues downloads and transforms on an
//!   [`OperationScheduler`], and hands every node to a
//!   [`ResolvedArtifactVisitor`] for later reading.
//! * [`ResolvedArtifactSet::visit_resolved`] is the direct visit. It reports
//!   every leaf to an [`ArtifactVisitor`], assuming scheduled work is done.
//! * [`TaskDependencyContainer::visit_dependencies`] reports the tasks that
//!   must run before the artifacts are usable, without resolving anything.
//!
//! Failures are reported per leaf. A failed leaf never prevents its siblings
//! from being visited.

mod local;
mod single;
mod transformed;
mod visitor;

use std::fmt;
use std::sync::Arc;

use crate::artifact::ResolvableArtifact;
use crate::scheduler::{OperationQueue, OperationScheduler};
use crate::tasks::{TaskDependencyContainer, TaskDependencyContext};

pub use local::LocalArtifactSet;
pub use single::SingleArtifactSet;
pub use transformed::TransformedArtifactSet;
pub use visitor::{
    ArtifactVisitor, CollectionSource, FileCollector, LocalArtifactVisitor, ResolvedArtifactVisitor,
    ResolvedEntry, ResolvedFiles,
};

#[derive(Debug, Clone, Default)]
pub enum ResolvedArtifactSet {
    #[default]
    Empty,
    Single(SingleArtifactSet),
    Composite(CompositeArtifactSet),
    Transformed(TransformedArtifactSet),
}

impl ResolvedArtifactSet {
    /// Scheduling visit.
    ///
    /// When the visitor requires files, synchronous artifacts are resolved
    /// now and everything else is queued on `scheduler`. The visitor receives
    /// each node in order either way.
    pub fn visit(
        &self,
        scheduler: &mut dyn OperationScheduler,
        visitor: &mut dyn ResolvedArtifactVisitor,
    ) {
        match self {
            Self::Empty => {}
            Self::Single(single) => single.visit(scheduler, visitor),
            Self::Composite(composite) => {
                for child in composite.children() {
                    child.visit(scheduler, visitor);
                }
            }
            Self::Transformed(transformed) => transformed.visit(scheduler, visitor),
        }
    }

    /// Direct visit of every leaf, in order.
    ///
    /// # Panics
    ///
    /// Panics when files are required and an asynchronous leaf was never
    /// resolved, i.e. the scheduling visit was skipped or its work not run.
    pub fn visit_resolved(&self, visitor: &mut dyn ArtifactVisitor) {
        match self {
            Self::Empty => {}
            Self::Single(single) => single.visit_resolved(visitor),
            Self::Composite(composite) => {
                for child in composite.children() {
                    child.visit_resolved(visitor);
                }
            }
            Self::Transformed(transformed) => transformed.visit_resolved(visitor),
        }
    }

    /// Visit the artifacts of components built by the current build.
    pub fn visit_local_artifacts(&self, visitor: &mut dyn LocalArtifactVisitor) {
        match self {
            Self::Single(single) => single.visit_local_artifacts(visitor),
            Self::Composite(composite) => {
                for child in composite.children() {
                    child.visit_local_artifacts(visitor);
                }
            }
            Self::Empty | Self::Transformed(_) => {}
        }
    }

    /// Visit the artifacts that come from outside the current build.
    pub fn visit_external_artifacts(&self, visitor: &mut dyn FnMut(&ResolvableArtifact)) {
        match self {
            Self::Single(single) => single.visit_external_artifacts(visitor),
            Self::Composite(composite) => {
                for child in composite.children() {
                    child.visit_external_artifacts(visitor);
                }
            }
            Self::Empty | Self::Transformed(_) => {}
        }
    }

    /// Schedule, drain `queue`, and read back every file.
    pub fn resolve_files(&self, queue: &mut OperationQueue) -> ResolvedFiles {
        let mut collector = FileCollector::new();
        self.visit(queue, &mut collector);
        queue.wait_for_completion();
        collector.finish()
    }
}

impl TaskDependencyContainer for ResolvedArtifactSet {
    fn visit_dependencies(&self, context: &mut dyn TaskDependencyContext) {
        match self {
            Self::Empty => {}
            Self::Single(single) => single.visit_dependencies(context),
            Self::Composite(composite) => {
                for child in composite.children() {
                    child.visit_dependencies(context);
                }
            }
            Self::Transformed(transformed) => transformed.visit_dependencies(context),
        }
    }
}

impl fmt::Display for ResolvedArtifactSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("empty"),
            Self::Single(single) => fmt::Display::fmt(single, f),
            Self::Composite(composite) => {
                f.write_str("[")?;
                for (i, child) in composite.children().iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    fmt::Display::fmt(child, f)?;
                }
                f.write_str("]")
            }
            Self::Transformed(transformed) => fmt::Display::fmt(transformed, f),
        }
    }
}

impl From<SingleArtifactSet> for ResolvedArtifactSet {
    fn from(value: SingleArtifactSet) -> Self {
        Self::Single(value)
    }
}

impl From<TransformedArtifactSet> for ResolvedArtifactSet {
    fn from(value: TransformedArtifactSet) -> Self {
        Self::Transformed(value)
    }
}

/// Ordered children, visited in insertion order.
#[derive(Debug, Clone)]
pub struct CompositeArtifactSet(Arc<[ResolvedArtifactSet]>);

impl CompositeArtifactSet {
    /// Combine `children`, dropping empty ones. Zero remaining children give
    /// an empty set and a single one is returned as is.
    pub fn of(children: impl IntoIterator<Item = ResolvedArtifactSet>) -> ResolvedArtifactSet {
        let mut children: Vec<_> = children
            .into_iter()
            .filter(|child| !matches!(child, ResolvedArtifactSet::Empty))
            .collect();

        match children.len() {
            0 => ResolvedArtifactSet::Empty,
            1 => children.remove(0),
            _ => ResolvedArtifactSet::Composite(Self(children.into())),
        }
    }

    pub fn children(&self) -> &[ResolvedArtifactSet] {
        &self.0
    }
}

/// A node handed out by a scheduling visit.
#[derive(Debug, Clone)]
pub enum Artifacts {
    Single(SingleArtifactSet),
    Transformed(TransformedArtifactSet),
}

impl Artifacts {
    /// Direct visit of this node.
    pub fn visit(&self, visitor: &mut dyn ArtifactVisitor) {
        match self {
            Self::Single(single) => single.visit_resolved(visitor),
            Self::Transformed(transformed) => transformed.visit_resolved(visitor),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::Attributes;
    use crate::component::{ArtifactId, ArtifactName, ComponentId};
    use crate::core::DisplayName;
    use crate::error::ResolveError;
    use crate::file_source::SourceState;
    use crate::scheduler::RunnableOperation;
    use crate::tasks::{DependencyCollector, TaskId};
    use crate::transform::{
        BoundTransformationStep, StepDependencies, TransformWorkspace, TransformationStep,
    };
    use camino::Utf8PathBuf;

    fn external(name: &str, outcome: Result<&str, &str>) -> ResolvableArtifact {
        let id = ArtifactId::new(
            ComponentId::module("org", name, "1.0").unwrap(),
            ArtifactName::new(name, Some("jar")).unwrap(),
        );
        let outcome = outcome.map(Utf8PathBuf::from).map_err(String::from);
        ResolvableArtifact::external(id, move || outcome.map_err(anyhow::Error::msg))
    }

    fn local(name: &str) -> ResolvableArtifact {
        let id = ArtifactId::new(
            ComponentId::project(":", &format!(":{name}")).unwrap(),
            ArtifactName::new(name, Some("jar")).unwrap(),
        );
        ResolvableArtifact::local(id, format!("{name}/build/{name}.jar"), TaskId::new(format!(":{name}:jar")))
    }

    fn single(artifact: ResolvableArtifact) -> ResolvedArtifactSet {
        SingleArtifactSet::new(DisplayName::from("runtime"), Attributes::empty(), artifact).into()
    }

    #[derive(Default)]
    struct Recorder {
        no_files: bool,
        events: Vec<String>,
    }

    impl ArtifactVisitor for Recorder {
        fn require_artifact_files(&self) -> bool {
            !self.no_files
        }

        fn visit_artifact(&mut self, _: &DisplayName, _: &Attributes, artifact: &ResolvableArtifact) {
            self.events.push(format!("artifact {}", artifact.id().name()));
        }

        fn visit_failure(&mut self, failure: &ResolveError) {
            self.events.push(format!("failure {failure}"));
        }

        fn end_visit_collection(&mut self, _: CollectionSource) {
            self.events.push(String::from("end"));
        }
    }

    #[test]
    fn test_of_flattens() {
        assert!(matches!(CompositeArtifactSet::of(Vec::new()), ResolvedArtifactSet::Empty));

        let one = CompositeArtifactSet::of([ResolvedArtifactSet::Empty, single(local("a"))]);
        assert!(matches!(one, ResolvedArtifactSet::Single(_)));

        let two = CompositeArtifactSet::of([single(local("a")), single(local("b"))]);
        assert!(matches!(two, ResolvedArtifactSet::Composite(_)));
        assert_eq!(two.to_string(), "[a.jar (project :a), b.jar (project :b)]");
    }

    #[test]
    fn test_scheduling_visit_queues_only_async_artifacts() {
        let set = CompositeArtifactSet::of([
            single(local("a")),
            single(external("b", Ok("cache/b.jar"))),
        ]);

        let mut scheduled: Vec<Box<dyn RunnableOperation>> = Vec::new();
        let mut collector = FileCollector::new();
        set.visit(&mut scheduled, &mut collector);

        assert_eq!(scheduled.len(), 1);
        assert_eq!(scheduled[0].description().name(), "Resolve b.jar (org:b:1.0)");

        let mut context = crate::scheduler::OperationContext::default();
        scheduled[0].run(&mut context);

        let files = collector.finish().into_files().unwrap();
        assert_eq!(files, ["a/build/a.jar", "cache/b.jar"]);
    }

    #[test]
    fn test_direct_visit_isolates_failures() {
        let ok = external("ok", Ok("cache/ok.jar"));
        let bad = external("bad", Err("404"));
        for artifact in [&ok, &bad] {
            artifact.file_source().finalize_if_not_already();
        }

        let set = CompositeArtifactSet::of([single(bad), single(ok), single(local("c"))]);
        let mut recorder = Recorder::default();
        set.visit_resolved(&mut recorder);

        assert_eq!(
            recorder.events,
            ["failure 404", "artifact ok.jar", "end", "artifact c.jar", "end"]
        );
    }

    #[test]
    fn test_no_files_visit_resolves_nothing() {
        let remote = external("r", Ok("cache/r.jar"));
        let set = CompositeArtifactSet::of([single(local("a")), single(remote.clone())]);

        let mut recorder = Recorder {
            no_files: true,
            ..Default::default()
        };
        set.visit_resolved(&mut recorder);

        assert_eq!(recorder.events, ["artifact a.jar", "end", "artifact r.jar", "end"]);
        assert_eq!(remote.file_source().state(), SourceState::Unresolved);
    }

    #[test]
    fn test_local_external_split() {
        let set = CompositeArtifactSet::of([
            single(local("a")),
            single(external("b", Ok("b.jar"))),
            single(local("c")),
        ]);

        let mut locals = Vec::new();
        set.visit_local_artifacts(&mut |local: LocalArtifactSet| locals.push(local.display_name()));
        assert_eq!(locals, ["a.jar (project :a)", "c.jar (project :c)"]);

        let mut externals = Vec::new();
        set.visit_external_artifacts(&mut |artifact| externals.push(artifact.to_string()));
        assert_eq!(externals, ["b.jar (org:b:1.0)"]);
    }

    #[test]
    fn test_transformed_dependencies_follow_delegate() {
        let ws = TransformWorkspace::new("unused");
        let step = |name: &str, task: &str| {
            BoundTransformationStep::new(
                TransformationStep::new(name, ws.clone(), |_, _| Ok(Vec::new())),
                StepDependencies::new().with_task(TaskId::from(task)),
            )
        };

        let delegate = CompositeArtifactSet::of([single(local("a")), single(local("b"))]);
        let set: ResolvedArtifactSet = TransformedArtifactSet::from_steps(
            ComponentId::project(":", ":app").unwrap(),
            delegate,
            Attributes::empty().with("type", "classes"),
            vec![step("unzip", ":tools:unzip"), step("dex", ":tools:dex")],
        )
        .into();

        let deps = DependencyCollector::collect(&set);
        let names: Vec<_> = deps.tasks().iter().map(TaskId::as_str).collect();
        assert_eq!(names, [":a:jar", ":b:jar", ":tools:unzip", ":tools:dex"]);

        let mut locals = 0;
        set.visit_local_artifacts(&mut |_: LocalArtifactSet| locals += 1);
        assert_eq!(locals, 0);
    }
}
