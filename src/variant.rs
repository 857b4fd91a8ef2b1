use std::fmt;

use crate::artifact::ResolvableArtifact;
use crate::attributes::Attributes;
use crate::component::ComponentId;
use crate::core::{ArcStr, DisplayName};
use crate::set::{CompositeArtifactSet, ResolvedArtifactSet, SingleArtifactSet, TransformedArtifactSet};
use crate::transform::TransformationChain;

/// Identifier of a variant declared by a component.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VariantId {
    component: ComponentId,
    name: ArcStr,
}

impl VariantId {
    pub fn new(component: ComponentId, name: &str) -> Self {
        Self {
            component,
            name: name.into(),
        }
    }

    pub fn component(&self) -> &ComponentId {
        &self.component
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for VariantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} of {}", self.name, self.component)
    }
}

/// A named, attributed group of artifacts handed to consumers by dependency
/// resolution.
#[derive(Debug, Clone)]
pub struct ResolvedVariant {
    identifier: Option<VariantId>,
    display_name: DisplayName,
    attributes: Attributes,
    artifacts: ResolvedArtifactSet,
}

impl ResolvedVariant {
    /// Wrap `artifacts` into a variant.
    ///
    /// The shape of the underlying set depends on how many artifacts there
    /// are, but visiting it behaves the same in every case.
    pub fn create(
        identifier: Option<VariantId>,
        display_name: DisplayName,
        attributes: Attributes,
        artifacts: impl IntoIterator<Item = ResolvableArtifact>,
    ) -> Self {
        let set = CompositeArtifactSet::of(artifacts.into_iter().map(|artifact| {
            ResolvedArtifactSet::from(SingleArtifactSet::new(
                display_name.clone(),
                attributes.clone(),
                artifact,
            ))
        }));

        Self {
            identifier,
            display_name,
            attributes,
            artifacts: set,
        }
    }

    /// A synthetic variant holding the artifacts of this one run through
    /// `chain`. Its attributes are the current ones overridden by `target`.
    pub fn transformed(
        &self,
        owner: ComponentId,
        target: &Attributes,
        chain: TransformationChain,
    ) -> Self {
        let attributes = self.attributes.concat(target);
        let display_name = DisplayName::new(format!("{} transformed to {target}", self.display_name));
        let set = TransformedArtifactSet::with_chain(
            owner,
            self.artifacts.clone(),
            attributes.clone(),
            chain,
        );

        Self {
            identifier: None,
            display_name,
            attributes,
            artifacts: set.into(),
        }
    }

    /// `None` for ad hoc variants.
    pub fn identifier(&self) -> Option<&VariantId> {
        self.identifier.as_ref()
    }

    pub fn display_name(&self) -> &DisplayName {
        &self.display_name
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn artifacts(&self) -> &ResolvedArtifactSet {
        &self.artifacts
    }
}

impl fmt::Display for ResolvedVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.display_name, self.attributes)
    }
}
