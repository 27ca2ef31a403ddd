//! Error types for plugin resolution

use std::path::PathBuf;

/// Errors while locating, loading or validating a plugin artifact
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    /// Plugin directory missing or not a directory
    #[error("plugin directory not found: {}", .0.display())]
    DirectoryNotFound(PathBuf),

    /// IO error while scanning or reading
    #[error("io error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Plugin id is empty or unusable in a file name
    #[error("invalid plugin id: '{0}'")]
    InvalidId(String),

    /// Version string could not be parsed
    #[error("invalid version: '{0}'")]
    InvalidVersion(String),

    /// No artifact for the id falls into the requested range
    #[error("no artifact for plugin '{id}' in {}: version range {range}", directory.display())]
    NoMatchingArtifact {
        directory: PathBuf,
        id: String,
        range: String,
    },

    /// Artifact content could not be interpreted by the loader
    #[error("malformed plugin artifact {}: {message}", path.display())]
    MalformedArtifact { path: PathBuf, message: String },

    /// Artifact declares no implementation of the service interface
    #[error("plugin '{artifact}' declares no provider for service '{spi}'")]
    NoProvider { artifact: String, spi: String },

    /// Artifact declares more than one implementation of the service interface
    #[error("plugin '{artifact}' declares {} providers for service '{spi}': {}", providers.len(), providers.join(", "))]
    AmbiguousProvider {
        artifact: String,
        spi: String,
        providers: Vec<String>,
    },

    /// Declared implementation has no linked handle in the loader
    #[error("plugin '{artifact}' implementation '{implementation}' is not linked")]
    NotLinked {
        artifact: String,
        implementation: String,
    },
}

impl PluginError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create malformed artifact error
    pub fn malformed(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::MalformedArtifact {
            path: path.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ambiguous_provider_display() {
        let err = PluginError::AmbiguousProvider {
            artifact: "greeter_v1.jar".into(),
            spi: "Greeter".into(),
            providers: vec!["a.Hello".into(), "a.Hi".into()],
        };
        assert_eq!(
            err.to_string(),
            "plugin 'greeter_v1.jar' declares 2 providers for service 'Greeter': a.Hello, a.Hi"
        );
    }
}
