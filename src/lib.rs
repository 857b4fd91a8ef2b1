#![forbid(unsafe_code)]
#![doc = include_str!("../README.md")]

mod artifact;
mod attributes;
mod component;
mod core;
mod error;
mod file_source;
#[cfg(feature = "logging")]
pub mod logging;
pub mod scheduler;
pub mod set;
pub mod tasks;
pub mod transform;
mod variant;

pub use crate::artifact::ResolvableArtifact;
pub use crate::attributes::Attributes;
pub use crate::component::{ArtifactId, ArtifactName, ComponentId};
pub use crate::core::DisplayName;
pub use crate::error::*;
pub use crate::file_source::{LazyFileSource, ResolveResult, Resolver, SourceState};
pub use crate::scheduler::{
    OperationQueue, OperationScheduler, QueueReport, RunnableOperation, SchedulerConfig,
};
pub use crate::set::{
    ArtifactVisitor, CompositeArtifactSet, FileCollector, LocalArtifactSet, ResolvedArtifactSet,
    ResolvedFiles, SingleArtifactSet, TransformedArtifactSet,
};
pub use crate::tasks::{DependencyCollector, TaskGraph, TaskId};
pub use crate::transform::{Transformation, TransformationChain, TransformationStep};
pub use crate::variant::{ResolvedVariant, VariantId};
