//! Transformation chains.
//!
//! A [`Transformation`] is an ordered list of [`TransformationStep`]s. Binding
//! it to the component that owns the input artifacts yields a
//! [`TransformationChain`] whose steps know their own upstream dependencies.
//! The chain is applied lazily, one input artifact at a time, by
//! [`TransformedArtifactSet`](crate::TransformedArtifactSet).

mod workspace;

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, PoisonError};

use camino::{Utf8Path, Utf8PathBuf};

use crate::artifact::ResolvableArtifact;
use crate::component::ComponentId;
use crate::core::{ArcStr, panic_message};
use crate::error::TransformError;
use crate::tasks::{TaskDependencyContainer, TaskDependencyContext, TaskId};

pub use workspace::TransformWorkspace;

/// Everything a transform action can see while it runs.
pub struct TransformContext<'a> {
    /// Name of the running step.
    pub step: &'a str,
    /// A directory reserved for the outputs of this step on this input.
    pub output_dir: &'a Utf8Path,
    /// Extra files the step declared as its inputs.
    pub dependencies: &'a [Utf8PathBuf],
    pub workspace: &'a TransformWorkspace,
}

/// The logic of a single transform step: from one input file to zero or more
/// output files.
pub trait TransformAction: Send + Sync {
    fn transform(
        &self,
        input: &Utf8Path,
        context: &TransformContext<'_>,
    ) -> anyhow::Result<Vec<Utf8PathBuf>>;
}

impl<F> TransformAction for F
where
    F: Fn(&Utf8Path, &TransformContext<'_>) -> anyhow::Result<Vec<Utf8PathBuf>> + Send + Sync,
{
    fn transform(
        &self,
        input: &Utf8Path,
        context: &TransformContext<'_>,
    ) -> anyhow::Result<Vec<Utf8PathBuf>> {
        self(input, context)
    }
}

/// A named transform action together with the workspace it writes to.
#[derive(Clone)]
pub struct TransformationStep {
    name: ArcStr,
    action: Arc<dyn TransformAction>,
    workspace: TransformWorkspace,
}

impl TransformationStep {
    pub fn new<F>(name: &str, workspace: TransformWorkspace, action: F) -> Self
    where
        F: Fn(&Utf8Path, &TransformContext<'_>) -> anyhow::Result<Vec<Utf8PathBuf>>
            + Send
            + Sync
            + 'static,
    {
        Self::from_action(name, workspace, Arc::new(action))
    }

    pub fn from_action(
        name: &str,
        workspace: TransformWorkspace,
        action: Arc<dyn TransformAction>,
    ) -> Self {
        Self {
            name: Arc::from(name),
            action,
            workspace,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn workspace(&self) -> &TransformWorkspace {
        &self.workspace
    }

    /// Run the action on every file of `subject`.
    fn apply(
        &self,
        subject: &TransformSubject,
        dependencies: &StepDependencies,
    ) -> Result<TransformSubject, TransformError> {
        let mut outputs = Vec::new();

        for input in subject.files() {
            let output_dir = self.workspace.dir_for(&self.name, input)?;
            let lock = self.workspace.dir_lock(&output_dir);
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            let context = TransformContext {
                step: &self.name,
                output_dir: &output_dir,
                dependencies: dependencies.files(),
                workspace: &self.workspace,
            };

            tracing::debug!("running {} on {}", self.name, input);

            let produced = catch_unwind(AssertUnwindSafe(|| self.action.transform(input, &context)))
                .unwrap_or_else(|panic| Err(anyhow::anyhow!(panic_message(panic))))
                .map_err(|source| TransformError::Step {
                    step: self.name.to_string(),
                    input: input.clone(),
                    source,
                })?;

            outputs.extend(produced);
        }

        Ok(subject.create_subject_from_result(self.name.clone(), outputs))
    }
}

impl fmt::Debug for TransformationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TransformationStep({})", self.name)
    }
}

/// An ordered list of steps, not yet bound to an owner.
#[derive(Debug, Clone, Default)]
pub struct Transformation {
    steps: Vec<TransformationStep>,
}

impl Transformation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step consuming the output of the previous one.
    pub fn then(mut self, step: TransformationStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn steps(&self) -> &[TransformationStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Upstream requirements of a bound step besides its input artifact: tasks
/// to run first and the files those tasks make available to the action.
#[derive(Debug, Clone, Default)]
pub struct StepDependencies {
    tasks: Vec<TaskId>,
    files: Vec<Utf8PathBuf>,
}

impl StepDependencies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_task(mut self, task: TaskId) -> Self {
        self.tasks.push(task);
        self
    }

    pub fn with_file(mut self, file: impl Into<Utf8PathBuf>) -> Self {
        self.files.push(file.into());
        self
    }

    pub fn tasks(&self) -> &[TaskId] {
        &self.tasks
    }

    pub fn files(&self) -> &[Utf8PathBuf] {
        &self.files
    }
}

impl TaskDependencyContainer for StepDependencies {
    fn visit_dependencies(&self, context: &mut dyn TaskDependencyContext) {
        self.tasks.visit_dependencies(context);
    }
}

/// Resolves the extra inputs of a step for a given owner component.
pub trait DependenciesResolverFactory: Send + Sync {
    fn create(&self, owner: &ComponentId, step: &TransformationStep) -> StepDependencies;
}

impl<F> DependenciesResolverFactory for F
where
    F: Fn(&ComponentId, &TransformationStep) -> StepDependencies + Send + Sync,
{
    fn create(&self, owner: &ComponentId, step: &TransformationStep) -> StepDependencies {
        self(owner, step)
    }
}

/// A step bound to its upstream dependencies.
#[derive(Debug, Clone)]
pub struct BoundTransformationStep {
    step: TransformationStep,
    dependencies: StepDependencies,
}

impl BoundTransformationStep {
    pub fn new(step: TransformationStep, dependencies: StepDependencies) -> Self {
        Self { step, dependencies }
    }

    pub fn step(&self) -> &TransformationStep {
        &self.step
    }

    pub fn upstream_dependencies(&self) -> &StepDependencies {
        &self.dependencies
    }
}

/// Ordered bound steps; step `i` consumes the output of step `i - 1`.
#[derive(Debug, Clone)]
pub struct TransformationChain {
    steps: Arc<[BoundTransformationStep]>,
}

impl TransformationChain {
    /// Chain of pre-bound steps.
    pub fn new(steps: Vec<BoundTransformationStep>) -> Self {
        Self {
            steps: steps.into(),
        }
    }

    /// Bind every step of `transformation` with dependencies produced by
    /// `factory` for `owner`.
    pub fn bind(
        transformation: &Transformation,
        owner: &ComponentId,
        factory: &dyn DependenciesResolverFactory,
    ) -> Self {
        let steps = transformation
            .steps()
            .iter()
            .map(|step| BoundTransformationStep::new(step.clone(), factory.create(owner, step)))
            .collect();

        Self::new(steps)
    }

    pub fn steps(&self) -> &[BoundTransformationStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Run every step in order, the first one on `subject`.
    pub fn apply(&self, subject: TransformSubject) -> Result<TransformSubject, TransformError> {
        self.steps.iter().try_fold(subject, |subject, bound| {
            bound.step.apply(&subject, &bound.dependencies)
        })
    }
}

impl TaskDependencyContainer for TransformationChain {
    fn visit_dependencies(&self, context: &mut dyn TaskDependencyContext) {
        for step in self.steps.iter() {
            step.dependencies.visit_dependencies(context);
        }
    }
}

impl fmt::Display for TransformationChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, bound) in self.steps.iter().enumerate() {
            if i > 0 {
                f.write_str(" -> ")?;
            }
            f.write_str(bound.step.name())?;
        }
        Ok(())
    }
}

/// The artifact being transformed together with the files the chain has
/// produced for it so far.
#[derive(Debug, Clone)]
pub struct TransformSubject {
    artifact: ResolvableArtifact,
    files: Vec<Utf8PathBuf>,
    applied: Vec<ArcStr>,
}

impl TransformSubject {
    /// The untransformed artifact and its file.
    pub fn initial(artifact: ResolvableArtifact, file: impl Into<Utf8PathBuf>) -> Self {
        Self {
            artifact,
            files: vec![file.into()],
            applied: Vec::new(),
        }
    }

    /// Files already derived from `artifact` by an upstream chain.
    pub(crate) fn from_files(artifact: ResolvableArtifact, files: Vec<Utf8PathBuf>) -> Self {
        Self {
            artifact,
            files,
            applied: Vec::new(),
        }
    }

    fn create_subject_from_result(&self, step: ArcStr, files: Vec<Utf8PathBuf>) -> Self {
        let mut applied = self.applied.clone();
        applied.push(step);

        Self {
            artifact: self.artifact.clone(),
            files,
            applied,
        }
    }

    pub fn artifact(&self) -> &ResolvableArtifact {
        &self.artifact
    }

    pub fn files(&self) -> &[Utf8PathBuf] {
        &self.files
    }

    /// Names of the steps applied so far.
    pub fn applied_steps(&self) -> impl Iterator<Item = &str> {
        self.applied.iter().map(|s| &**s)
    }
}

impl fmt::Display for TransformSubject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.artifact)?;
        if !self.applied.is_empty() {
            write!(f, " ({})", self.applied.join(" -> "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{ArtifactId, ArtifactName};
    use crate::tasks::DependencyCollector;
    use std::fs;

    fn artifact() -> ResolvableArtifact {
        let id = ArtifactId::new(
            ComponentId::module("org", "lib", "1.0").unwrap(),
            ArtifactName::new("lib", Some("txt")).unwrap(),
        );
        ResolvableArtifact::external(id, || anyhow::bail!("not used"))
    }

    fn workspace() -> (tempfile::TempDir, TransformWorkspace) {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        (dir, TransformWorkspace::new(root))
    }

    fn upper(ws: &TransformWorkspace) -> TransformationStep {
        TransformationStep::new("upper", ws.clone(), |input, ctx| {
            let text = fs::read_to_string(input)?;
            let out = ctx.output_dir.join("upper.txt");
            fs::write(&out, text.to_uppercase())?;
            Ok(vec![out])
        })
    }

    fn split(ws: &TransformWorkspace) -> TransformationStep {
        TransformationStep::new("split", ws.clone(), |input, ctx| {
            let text = fs::read_to_string(input)?;
            text.split_whitespace()
                .enumerate()
                .map(|(i, word)| {
                    let out = ctx.output_dir.join(format!("{i}.txt"));
                    fs::write(&out, word)?;
                    Ok::<_, anyhow::Error>(out)
                })
                .collect()
        })
    }

    #[test]
    fn test_steps_run_in_order() {
        let (_guard, ws) = workspace();
        let input = ws.root().join("in.txt");
        fs::write(&input, "hello world").unwrap();

        let transformation = Transformation::new().then(upper(&ws)).then(split(&ws));
        let owner = ComponentId::module("org", "lib", "1.0").unwrap();
        let chain = TransformationChain::bind(&transformation, &owner, &|_: &ComponentId, _: &TransformationStep| {
            StepDependencies::new()
        });

        let result = chain
            .apply(TransformSubject::initial(artifact(), input))
            .unwrap();

        let words: Vec<_> = result
            .files()
            .iter()
            .map(|f| fs::read_to_string(f).unwrap())
            .collect();
        assert_eq!(words, ["HELLO", "WORLD"]);
        assert_eq!(result.applied_steps().collect::<Vec<_>>(), ["upper", "split"]);
        assert_eq!(chain.to_string(), "upper -> split");
    }

    #[test]
    fn test_failing_step_names_step_and_input() {
        let (_guard, ws) = workspace();
        let failing = TransformationStep::new("explode", ws.clone(), |_, _| {
            anyhow::bail!("corrupt archive")
        });
        let chain = TransformationChain::new(vec![BoundTransformationStep::new(
            failing,
            StepDependencies::new(),
        )]);

        let err = chain
            .apply(TransformSubject::initial(artifact(), "in.zip"))
            .unwrap_err();

        match err {
            TransformError::Step { step, input, source } => {
                assert_eq!(step, "explode");
                assert_eq!(input, "in.zip");
                assert_eq!(source.to_string(), "corrupt archive");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_panicking_step_is_a_failure() {
        let (_guard, ws) = workspace();
        let step = TransformationStep::new("panics", ws.clone(), |_, _| panic!("bad input"));
        let chain = TransformationChain::new(vec![BoundTransformationStep::new(
            step,
            StepDependencies::new(),
        )]);

        let err = chain
            .apply(TransformSubject::initial(artifact(), "in.zip"))
            .unwrap_err();
        assert!(err.to_string().contains("bad input"));
    }

    #[test]
    fn test_bind_uses_factory_per_step() {
        let (_guard, ws) = workspace();
        let transformation = Transformation::new().then(upper(&ws)).then(split(&ws));
        let owner = ComponentId::module("org", "lib", "1.0").unwrap();

        let factory = |owner: &ComponentId, step: &TransformationStep| {
            StepDependencies::new()
                .with_task(TaskId::new(format!(":{}:{}", step.name(), owner)))
                .with_file(format!("deps/{}.jar", step.name()))
        };
        let chain = TransformationChain::bind(&transformation, &owner, &factory);

        let deps = DependencyCollector::collect(&chain);
        let names: Vec<_> = deps.tasks().iter().map(TaskId::as_str).collect();
        assert_eq!(names, [":upper:org:lib:1.0", ":split:org:lib:1.0"]);
        assert_eq!(chain.steps()[1].upstream_dependencies().files(), ["deps/split.jar"]);
    }

    #[test]
    fn test_dependencies_are_passed_to_action() {
        let (_guard, ws) = workspace();
        let step = TransformationStep::new("deps", ws.clone(), |_, ctx| {
            Ok(ctx.dependencies.to_vec())
        });
        let chain = TransformationChain::new(vec![BoundTransformationStep::new(
            step,
            StepDependencies::new().with_file("a.jar").with_file("b.jar"),
        )]);

        let result = chain
            .apply(TransformSubject::initial(artifact(), "in"))
            .unwrap();
        assert_eq!(result.files(), ["a.jar", "b.jar"]);
    }
}
