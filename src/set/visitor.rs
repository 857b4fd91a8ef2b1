use camino::Utf8PathBuf;

use crate::artifact::ResolvableArtifact;
use crate::attributes::Attributes;
use crate::core::DisplayName;
use crate::error::{ResolutionFailures, ResolveError};
use crate::set::{Artifacts, LocalArtifactSet};

/// Marks the end of a logical group of visited artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum CollectionSource {
    /// A single artifact of a variant.
    Artifact,
    /// Every output produced by transforming one input artifact.
    Transformed,
}

/// Receives the resolved artifacts of a set during a direct visit.
pub trait ArtifactVisitor {
    /// Whether the visitor needs the files of the artifacts. When `false`,
    /// only identities and attributes are reported and nothing is resolved.
    fn require_artifact_files(&self) -> bool {
        true
    }

    fn visit_artifact(
        &mut self,
        variant: &DisplayName,
        attributes: &Attributes,
        artifact: &ResolvableArtifact,
    );

    /// Called instead of [`visit_artifact`](Self::visit_artifact) when the
    /// file of a leaf could not be produced.
    fn visit_failure(&mut self, failure: &ResolveError);

    fn end_visit_collection(&mut self, _source: CollectionSource) {}
}

/// Receives the nodes of a set during a scheduling visit, to read them once
/// the scheduled work has drained.
pub trait ResolvedArtifactVisitor {
    fn require_artifact_files(&self) -> bool {
        true
    }

    fn visit_artifacts(&mut self, artifacts: Artifacts);
}

/// Receives artifacts of components built by the current build.
pub trait LocalArtifactVisitor {
    fn visit_local_artifact(&mut self, artifact: LocalArtifactSet);
}

impl<F> LocalArtifactVisitor for F
where
    F: FnMut(LocalArtifactSet),
{
    fn visit_local_artifact(&mut self, artifact: LocalArtifactSet) {
        self(artifact)
    }
}

/// Standard consumer of the scheduling visit.
///
/// Remembers every node it is handed, then [`finish`](Self::finish) walks
/// them again in the original order after the scheduler has drained.
#[derive(Debug)]
pub struct FileCollector {
    require_files: bool,
    nodes: Vec<Artifacts>,
}

impl FileCollector {
    pub fn new() -> Self {
        Self {
            require_files: true,
            nodes: Vec::new(),
        }
    }

    /// A collector that only enumerates artifacts and never triggers I/O.
    pub fn without_files() -> Self {
        Self {
            require_files: false,
            nodes: Vec::new(),
        }
    }

    /// Read the visited nodes. Scheduled work must have completed.
    pub fn finish(self) -> ResolvedFiles {
        let mut files = ResolvedFiles::new(self.require_files);
        for node in &self.nodes {
            node.visit(&mut files);
        }
        files
    }
}

impl Default for FileCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl ResolvedArtifactVisitor for FileCollector {
    fn require_artifact_files(&self) -> bool {
        self.require_files
    }

    fn visit_artifacts(&mut self, artifacts: Artifacts) {
        self.nodes.push(artifacts);
    }
}

/// One visited artifact.
#[derive(Debug, Clone)]
pub struct ResolvedEntry {
    pub variant: DisplayName,
    pub attributes: Attributes,
    pub artifact: ResolvableArtifact,
    /// `None` when files were not requested and the artifact is unresolved.
    pub file: Option<Utf8PathBuf>,
}

/// Everything a direct visit reported, in visit order.
#[derive(Debug, Clone)]
pub struct ResolvedFiles {
    require_files: bool,
    entries: Vec<ResolvedEntry>,
    failures: Vec<ResolveError>,
    groups: usize,
}

impl ResolvedFiles {
    fn new(require_files: bool) -> Self {
        Self {
            require_files,
            entries: Vec::new(),
            failures: Vec::new(),
            groups: 0,
        }
    }

    pub fn entries(&self) -> &[ResolvedEntry] {
        &self.entries
    }

    pub fn failures(&self) -> &[ResolveError] {
        &self.failures
    }

    /// Number of groups closed by `end_visit_collection`.
    pub fn groups(&self) -> usize {
        self.groups
    }

    pub fn files(&self) -> impl Iterator<Item = &Utf8PathBuf> {
        self.entries.iter().filter_map(|e| e.file.as_ref())
    }

    /// All files in order, or every failure if any leaf failed.
    pub fn into_files(self) -> Result<Vec<Utf8PathBuf>, ResolutionFailures> {
        if !self.failures.is_empty() {
            return Err(ResolutionFailures(self.failures));
        }

        Ok(self.entries.into_iter().filter_map(|e| e.file).collect())
    }
}

impl ArtifactVisitor for ResolvedFiles {
    fn require_artifact_files(&self) -> bool {
        self.require_files
    }

    fn visit_artifact(
        &mut self,
        variant: &DisplayName,
        attributes: &Attributes,
        artifact: &ResolvableArtifact,
    ) {
        let file = artifact
            .file_source()
            .try_value()
            .and_then(|result| result.file())
            .map(|file| file.to_path_buf());

        self.entries.push(ResolvedEntry {
            variant: variant.clone(),
            attributes: attributes.clone(),
            artifact: artifact.clone(),
            file,
        });
    }

    fn visit_failure(&mut self, failure: &ResolveError) {
        self.failures.push(failure.clone());
    }

    fn end_visit_collection(&mut self, _source: CollectionSource) {
        self.groups += 1;
    }
}
