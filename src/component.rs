use std::fmt;
use std::sync::Arc;

use crate::core::ArcStr;
use crate::error::IdentityError;

/// The component that owns an artifact.
///
/// Project components are built by the current build, so their artifacts are
/// produced by tasks of the task graph and never downloaded. Module
/// components live outside of the build and have to be fetched.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ComponentId {
    /// A component built by the current build, e.g. project `:app`.
    Project { build: ArcStr, path: ArcStr },
    /// An external module identified by its coordinates.
    Module {
        group: ArcStr,
        module: ArcStr,
        version: ArcStr,
    },
}

impl ComponentId {
    pub fn project(build: &str, path: &str) -> Result<Self, IdentityError> {
        non_empty("build", build)?;
        non_empty("path", path)?;

        Ok(Self::Project {
            build: Arc::from(build),
            path: Arc::from(path),
        })
    }

    pub fn module(group: &str, module: &str, version: &str) -> Result<Self, IdentityError> {
        non_empty("group", group)?;
        non_empty("module", module)?;
        non_empty("version", version)?;

        Ok(Self::Module {
            group: Arc::from(group),
            module: Arc::from(module),
            version: Arc::from(version),
        })
    }

    /// Whether the component is built by the current build.
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Project { .. })
    }
}

fn non_empty(field: &'static str, value: &str) -> Result<(), IdentityError> {
    if value.trim().is_empty() {
        return Err(IdentityError::EmptyCoordinate(field));
    }
    Ok(())
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Project { build, path } if &**build == ":" => write!(f, "project {path}"),
            Self::Project { build, path } => write!(f, "project {build}{path}"),
            Self::Module {
                group,
                module,
                version,
            } => write!(f, "{group}:{module}:{version}"),
        }
    }
}

/// The file-level coordinates of an artifact within its component.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ArtifactName {
    name: ArcStr,
    extension: Option<ArcStr>,
    classifier: Option<ArcStr>,
}

impl ArtifactName {
    pub fn new(name: &str, extension: Option<&str>) -> Result<Self, IdentityError> {
        if name.trim().is_empty() {
            return Err(IdentityError::EmptyName);
        }

        Ok(Self {
            name: Arc::from(name),
            extension: extension.filter(|ext| !ext.is_empty()).map(Arc::from),
            classifier: None,
        })
    }

    pub fn with_classifier(mut self, classifier: &str) -> Self {
        self.classifier = (!classifier.is_empty()).then(|| Arc::from(classifier));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn extension(&self) -> Option<&str> {
        self.extension.as_deref()
    }

    pub fn classifier(&self) -> Option<&str> {
        self.classifier.as_deref()
    }
}

impl fmt::Display for ArtifactName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if let Some(classifier) = &self.classifier {
            write!(f, "-{classifier}")?;
        }
        if let Some(extension) = &self.extension {
            write!(f, ".{extension}")?;
        }
        Ok(())
    }
}

/// Identity of a single artifact: its owning component plus its name.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ArtifactId {
    component: ComponentId,
    name: ArtifactName,
}

impl ArtifactId {
    pub fn new(component: ComponentId, name: ArtifactName) -> Self {
        Self { component, name }
    }

    pub fn component(&self) -> &ComponentId {
        &self.component
    }

    pub fn name(&self) -> &ArtifactName {
        &self.name
    }

    pub fn display_name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.component)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_display() {
        let id = ComponentId::module("org.example", "lib", "1.0").unwrap();
        assert_eq!(id.to_string(), "org.example:lib:1.0");
        assert!(!id.is_local());
    }

    #[test]
    fn test_project_display() {
        let root = ComponentId::project(":", ":app").unwrap();
        assert_eq!(root.to_string(), "project :app");
        assert!(root.is_local());

        let included = ComponentId::project(":tools", ":cli").unwrap();
        assert_eq!(included.to_string(), "project :tools:cli");
    }

    #[test]
    fn test_empty_coordinates_are_rejected() {
        assert_eq!(
            ComponentId::module("org", "", "1.0"),
            Err(IdentityError::EmptyCoordinate("module"))
        );
        assert_eq!(
            ArtifactName::new("  ", Some("jar")),
            Err(IdentityError::EmptyName)
        );
    }

    #[test]
    fn test_artifact_display_name() {
        let component = ComponentId::module("org", "lib", "2.1").unwrap();
        let name = ArtifactName::new("lib-2.1", Some("jar"))
            .unwrap()
            .with_classifier("sources");
        let id = ArtifactId::new(component, name);

        assert_eq!(id.display_name(), "lib-2.1-sources.jar (org:lib:2.1)");
    }
}
