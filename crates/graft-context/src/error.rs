//! Error types for context lookups
//!
//! - [`ResolvingError`]: property required-but-absent or present-but-non-matching
//! - [`MappingError`]: alias insertion that would close a cycle

/// Errors during property resolution
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolvingError {
    /// Forced property has no value and no default
    #[error("property '{key}' is required but not set")]
    Missing {
        /// Property key
        key: String,
    },

    /// Property value does not match the declared matcher
    #[error("property '{key}' value '{value}' does not match '{matcher}'")]
    Mismatch {
        /// Property key
        key: String,
        /// Rejected value
        value: String,
        /// Pattern the value had to match
        matcher: String,
    },
}

impl ResolvingError {
    /// Create missing property error
    pub fn missing(key: impl Into<String>) -> Self {
        Self::Missing { key: key.into() }
    }

    /// Property key the error refers to
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Missing { key } | Self::Mismatch { key, .. } => key,
        }
    }
}

/// Errors during qualifier alias registration
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MappingError {
    /// Alias would close a cycle
    #[error("qualifier alias cycle: {}", chain.join(" -> "))]
    Cycle {
        /// Qualifiers along the cycle, starting and ending with the same one
        chain: Vec<String>,
    },

    /// Empty qualifier on either side of an alias
    #[error("alias qualifiers must not be empty")]
    EmptyQualifier,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolving_error_display() {
        let err = ResolvingError::missing("db.url");
        assert_eq!(err.to_string(), "property 'db.url' is required but not set");
        assert_eq!(err.key(), "db.url");
    }

    #[test]
    fn mapping_cycle_display() {
        let err = MappingError::Cycle {
            chain: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "qualifier alias cycle: a -> b -> a");
    }
}
