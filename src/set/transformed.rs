use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, OnceLock};

use crate::artifact::ResolvableArtifact;
use crate::attributes::Attributes;
use crate::component::ComponentId;
use crate::core::{DisplayName, panic_message};
use crate::error::{ResolveError, TransformError};
use crate::scheduler::{OperationContext, OperationDescriptor, OperationScheduler, RunnableOperation};
use crate::set::visitor::{ArtifactVisitor, CollectionSource, ResolvedArtifactVisitor};
use crate::set::{Artifacts, LocalArtifactSet, ResolvedArtifactSet};
use crate::tasks::{TaskDependencyContainer, TaskDependencyContext};
use crate::transform::{
    BoundTransformationStep, DependenciesResolverFactory, Transformation, TransformationChain,
    TransformSubject,
};

type TransformResult = Result<Vec<ResolvableArtifact>, ResolveError>;

/// The artifacts of a delegate set, run through a transformation chain.
///
/// Nothing is transformed eagerly. Each leaf of the delegate becomes one
/// transform node whose outputs are computed at most once, by an operation
/// queued during a scheduling visit.
#[derive(Clone)]
pub struct TransformedArtifactSet(Arc<TransformedInner>);

struct TransformedInner {
    owner: ComponentId,
    delegate: ResolvedArtifactSet,
    target: Attributes,
    chain: TransformationChain,
    display_name: DisplayName,
    nodes: OnceLock<Vec<TransformNode>>,
}

impl TransformedArtifactSet {
    /// Transform the artifacts of `delegate`, binding every step's upstream
    /// dependencies through `factory`.
    pub fn new(
        owner: ComponentId,
        delegate: ResolvedArtifactSet,
        target: Attributes,
        transformation: &Transformation,
        factory: &dyn DependenciesResolverFactory,
    ) -> Self {
        let chain = TransformationChain::bind(transformation, &owner, factory);
        Self::with_chain(owner, delegate, target, chain)
    }

    /// Transform the artifacts of `delegate` with already bound steps.
    pub fn from_steps(
        owner: ComponentId,
        delegate: ResolvedArtifactSet,
        target: Attributes,
        steps: Vec<BoundTransformationStep>,
    ) -> Self {
        Self::with_chain(owner, delegate, target, TransformationChain::new(steps))
    }

    pub fn with_chain(
        owner: ComponentId,
        delegate: ResolvedArtifactSet,
        target: Attributes,
        chain: TransformationChain,
    ) -> Self {
        let display_name = DisplayName::new(format!("{owner} {target}"));

        Self(Arc::new(TransformedInner {
            owner,
            delegate,
            target,
            chain,
            display_name,
            nodes: OnceLock::new(),
        }))
    }

    /// The component whose artifacts are transformed.
    pub fn owner(&self) -> &ComponentId {
        &self.0.owner
    }

    pub fn delegate(&self) -> &ResolvedArtifactSet {
        &self.0.delegate
    }

    /// Attributes of the produced artifacts.
    pub fn target(&self) -> &Attributes {
        &self.0.target
    }

    pub fn chain(&self) -> &TransformationChain {
        &self.0.chain
    }

    pub fn display_name(&self) -> &DisplayName {
        &self.0.display_name
    }

    /// Visit the external artifacts this set transforms.
    pub fn visit_source_artifacts(&self, visitor: &mut dyn FnMut(&ResolvableArtifact)) {
        self.0.delegate.visit_external_artifacts(visitor);
    }

    fn nodes(&self) -> &[TransformNode] {
        self.0.nodes.get_or_init(|| {
            let mut inputs = Vec::new();
            collect_inputs(&self.0.delegate, &mut inputs);
            inputs.into_iter().map(TransformNode::new).collect()
        })
    }

    /// Run the chain on node `index` unless it already ran.
    fn finalize(&self, index: usize) -> &TransformResult {
        let node = &self.nodes()[index];
        node.result.get_or_init(|| {
            let result = catch_unwind(AssertUnwindSafe(|| node.run(&self.0.chain)))
                .unwrap_or_else(|panic| Err(ResolveError::msg(panic_message(panic))));
            if let Err(err) = &result {
                tracing::warn!("transform of {} failed: {err}", node.input);
            }
            result
        })
    }

    pub(crate) fn visit(
        &self,
        scheduler: &mut dyn OperationScheduler,
        visitor: &mut dyn ResolvedArtifactVisitor,
    ) {
        if visitor.require_artifact_files() {
            for (index, node) in self.nodes().iter().enumerate() {
                if node.result.get().is_none() {
                    scheduler.add(Box::new(TransformOperation {
                        set: self.clone(),
                        index,
                    }));
                }
            }
        }

        visitor.visit_artifacts(Artifacts::Transformed(self.clone()));
    }

    /// # Panics
    ///
    /// Panics when files are required and a node was never transformed.
    pub(crate) fn visit_resolved(&self, visitor: &mut dyn ArtifactVisitor) {
        let name = &self.0.display_name;
        let target = &self.0.target;

        if !visitor.require_artifact_files() {
            for node in self.nodes() {
                visitor.visit_artifact(name, target, &node.input.artifact());
                visitor.end_visit_collection(CollectionSource::Transformed);
            }
            return;
        }

        for node in self.nodes() {
            match node.result.get() {
                None => panic!("{} was read before its transform ran", node.input),
                Some(Err(failure)) => visitor.visit_failure(failure),
                Some(Ok(outputs)) => {
                    for output in outputs {
                        visitor.visit_artifact(name, target, output);
                    }
                    visitor.end_visit_collection(CollectionSource::Transformed);
                }
            }
        }
    }
}

impl TaskDependencyContainer for TransformedArtifactSet {
    fn visit_dependencies(&self, context: &mut dyn TaskDependencyContext) {
        self.0.delegate.visit_dependencies(context);
        self.0.chain.visit_dependencies(context);
    }
}

impl fmt::Display for TransformedArtifactSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} via {}", self.0.delegate, self.0.chain)
    }
}

impl fmt::Debug for TransformedArtifactSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformedArtifactSet")
            .field("owner", &self.0.owner)
            .field("target", &self.0.target)
            .field("chain", &self.0.chain.to_string())
            .finish_non_exhaustive()
    }
}

fn collect_inputs(set: &ResolvedArtifactSet, inputs: &mut Vec<TransformInput>) {
    match set {
        ResolvedArtifactSet::Empty => {}
        ResolvedArtifactSet::Single(single) => {
            let artifact = single.artifact();
            inputs.push(if artifact.is_local() {
                TransformInput::Local(LocalArtifactSet::new(single.clone()))
            } else {
                TransformInput::External(artifact.clone())
            });
        }
        ResolvedArtifactSet::Composite(composite) => {
            for child in composite.children() {
                collect_inputs(child, inputs);
            }
        }
        ResolvedArtifactSet::Transformed(upstream) => {
            for index in 0..upstream.nodes().len() {
                inputs.push(TransformInput::Upstream(upstream.clone(), index));
            }
        }
    }
}

/// Where the input of a transform node comes from.
enum TransformInput {
    /// Read straight from the producing task's output.
    Local(LocalArtifactSet),
    /// Resolved through its file source first.
    External(ResolvableArtifact),
    /// The outputs of a node of another transformed set.
    Upstream(TransformedArtifactSet, usize),
}

impl TransformInput {
    /// The artifact this input originally stems from.
    fn artifact(&self) -> ResolvableArtifact {
        match self {
            Self::Local(local) => local.artifact().clone(),
            Self::External(artifact) => artifact.clone(),
            Self::Upstream(set, index) => set.nodes()[*index].input.artifact(),
        }
    }

    fn subject(&self) -> Result<TransformSubject, TransformError> {
        match self {
            Self::Local(local) => local.calculate_subject().map_err(TransformError::Input),
            Self::External(artifact) => {
                let file = artifact
                    .file_source()
                    .finalize_if_not_already()
                    .as_result()
                    .map_err(|err| TransformError::Input(err.clone()))?;
                Ok(TransformSubject::initial(artifact.clone(), file))
            }
            Self::Upstream(set, index) => {
                let outputs = set
                    .finalize(*index)
                    .as_ref()
                    .map_err(|err| TransformError::Input(err.clone()))?;
                let files = outputs
                    .iter()
                    .map(ResolvableArtifact::resolve_as_file)
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(TransformError::Input)?;
                Ok(TransformSubject::from_files(self.artifact(), files))
            }
        }
    }
}

impl fmt::Display for TransformInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(local) => fmt::Display::fmt(local.artifact(), f),
            Self::External(artifact) => fmt::Display::fmt(artifact, f),
            Self::Upstream(set, index) => fmt::Display::fmt(&set.nodes()[*index].input, f),
        }
    }
}

struct TransformNode {
    input: TransformInput,
    result: OnceLock<TransformResult>,
}

impl TransformNode {
    fn new(input: TransformInput) -> Self {
        Self {
            input,
            result: OnceLock::new(),
        }
    }

    fn run(&self, chain: &TransformationChain) -> TransformResult {
        tracing::debug!("transforming {} with {}", self.input, chain);

        let subject = chain.apply(self.input.subject()?)?;
        Ok(subject
            .files()
            .iter()
            .map(|file| subject.artifact().transformed_to(file))
            .collect())
    }
}

/// Runs the chain on one node of a transformed set.
struct TransformOperation {
    set: TransformedArtifactSet,
    index: usize,
}

impl RunnableOperation for TransformOperation {
    fn description(&self) -> OperationDescriptor {
        let input = &self.set.nodes()[self.index].input;
        OperationDescriptor::display_name(format!("Transform {input} with {}", self.set.chain()))
            .details(self.set.owner().to_string())
    }

    fn run(&self, context: &mut OperationContext) {
        if let Err(failure) = self.set.finalize(self.index) {
            context.set_failure(failure);
        }
    }
}
