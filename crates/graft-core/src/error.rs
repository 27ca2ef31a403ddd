//! Error types for graft Core
//!
//! Provides error handling for:
//! - Graph errors (cycles, illegal nesting, singleton type mismatches)
//! - Aggregation cardinality violations
//! - Lifecycle processor and teardown failures
//! - Descriptor contract violations
//! - Configuration loading
//!
//! [`Error`] is the umbrella type every public operation returns; context and
//! plugin errors convert into it through `#[from]`.

use crate::lock::TreeToken;
use graft_context::{MappingError, ResolvingError, TypeKey};
use graft_plugin::PluginError;
use std::fmt::{self, Display, Formatter};
use std::path::PathBuf;

/// Error type user callbacks (constructors, setters, processors, providers) return
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result alias for graft operations
pub type Result<T> = std::result::Result<T, Error>;

/// Umbrella error
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Object graph error
    #[error("injection failed: {0}")]
    Injection(#[from] InjectionError),

    /// Property resolution error
    #[error("property resolution failed: {0}")]
    Resolving(#[from] ResolvingError),

    /// Alias registration error
    #[error("alias mapping failed: {0}")]
    Mapping(#[from] MappingError),

    /// Aggregation cardinality error
    #[error("aggregation failed: {0}")]
    Aggregation(#[from] AggregationError),

    /// Lifecycle processor error
    #[error("processor failed: {0}")]
    Processor(#[from] ProcessorError),

    /// Descriptor contract violation
    #[error("invalid descriptor: {0}")]
    Descriptor(#[from] DescriptorError),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Plugin resolution error
    #[error("plugin resolution failed: {0}")]
    Plugin(#[from] PluginError),
}

impl Error {
    /// Check if this is a constructor cycle
    #[inline]
    #[must_use]
    pub fn is_cycle(&self) -> bool {
        matches!(
            self,
            Self::Injection(InjectionError::Cycle { .. } | InjectionError::AllocationCycle { .. })
        )
    }

    /// Primary failure behind a teardown error, or `self`
    #[must_use]
    pub fn root_cause(&self) -> &Error {
        match self {
            Self::Processor(ProcessorError::Teardown { cause, .. }) => cause.root_cause(),
            other => other,
        }
    }
}

/// Kind of key an allocation is registered under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationKind {
    /// Independent-bean override keyed by type
    Type,
    /// Scoped singleton keyed by qualifier
    Singleton,
    /// Property value
    Property,
    /// Qualifier alias
    Alias,
}

impl Display for AllocationKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Type => "type",
            Self::Singleton => "singleton",
            Self::Property => "property",
            Self::Alias => "alias",
        })
    }
}

/// Errors in the object graph
#[derive(Debug, thiserror::Error)]
pub enum InjectionError {
    /// A constructor (transitively) requires itself
    #[error("constructor cycle: {}", trace.join(" -> "))]
    Cycle {
        /// Types along the cycle, starting and ending with the same one
        trace: Vec<String>,
    },

    /// A singleton allocator (transitively) requests its own qualifier
    #[error("singleton allocation cycle: {}", trace.iter().map(|q| format!("'{q}'")).collect::<Vec<_>>().join(" -> "))]
    AllocationCycle {
        /// Qualifiers along the cycle, starting and ending with the same one
        trace: Vec<String>,
    },

    /// A bean that must not outlive its sequence was requested by a global singleton
    #[error("{requested} cannot be injected while building a global singleton")]
    IllegalNesting {
        /// The offending dependency
        requested: TypeKey,
    },

    /// On-demand singleton requested with a different type
    #[error("singleton '{qualifier}' is registered as {registered} but requested as {requested}")]
    TypeMismatch {
        /// Resolved qualifier
        qualifier: String,
        /// Type of the registered instance
        registered: TypeKey,
        /// Requested type
        requested: TypeKey,
    },

    /// Value of one type cannot be viewed as another
    #[error("{from} is not assignable to {to}")]
    NotAssignable {
        /// Concrete type
        from: TypeKey,
        /// Requested type
        to: TypeKey,
    },

    /// No descriptor registered for a type that must be constructed
    #[error("no descriptor registered for {0}")]
    UnknownType(TypeKey),

    /// Context-sensitive types are supplied ready-made, never constructed
    #[error("{0} is context-sensitive and cannot be constructed")]
    ContextSensitive(TypeKey),

    /// The constructor returned an error
    #[error("construction of {type_key} failed: {source}")]
    ConstructionFailed {
        /// Type being constructed
        type_key: TypeKey,
        /// Cause
        source: BoxError,
    },

    /// A field setter returned an error
    #[error("setting field '{field}' of {type_key} failed: {source}")]
    FieldFailed {
        /// Owning type
        type_key: TypeKey,
        /// Field name
        field: String,
        /// Cause
        source: BoxError,
    },

    /// A provider allocation returned an error
    #[error("provider for {type_key} failed: {source}")]
    ProviderFailed {
        /// Provided type
        type_key: TypeKey,
        /// Cause
        source: BoxError,
    },

    /// Two allocations share a key
    #[error("duplicate {kind} allocation '{key}'")]
    DuplicateAllocation {
        /// Key kind
        kind: AllocationKind,
        /// Offending key
        key: String,
    },

    /// A blueprint failed to produce its allocations
    #[error("blueprint failed: {0}")]
    Blueprint(#[source] BoxError),

    /// A qualifier was registered twice within one sequence
    #[error("singleton '{0}' is already registered")]
    DuplicateSingleton(String),

    /// Nothing could be resolved for a required target
    #[error("no instance of {0} could be resolved")]
    Unresolved(TypeKey),

    /// A sequence is already running on this tree from the current call stack
    #[error("a build sequence is already active on tree {0}")]
    SequenceActive(TreeToken),
}

impl InjectionError {
    /// Cycle error from the constructor stack and the re-entered type
    #[must_use]
    pub fn cycle<'a>(stack: impl IntoIterator<Item = &'a TypeKey>, reentered: TypeKey) -> Self {
        let mut trace: Vec<String> = stack
            .into_iter()
            .skip_while(|key| **key != reentered)
            .map(|key| key.short_name().to_string())
            .collect();
        trace.push(reentered.short_name().to_string());
        Self::Cycle { trace }
    }

    /// Cycle error from the allocation stack and the re-entered qualifier
    #[must_use]
    pub fn qualifier_cycle<'a>(
        stack: impl IntoIterator<Item = &'a String>,
        reentered: &str,
    ) -> Self {
        let mut trace: Vec<String> = stack
            .into_iter()
            .skip_while(|qualifier| qualifier.as_str() != reentered)
            .cloned()
            .collect();
        trace.push(reentered.to_string());
        Self::AllocationCycle { trace }
    }
}

/// Aggregation cardinality errors
#[derive(Debug, thiserror::Error)]
pub enum AggregationError {
    /// Non-optional single-value field found no match
    #[error("no singleton of {element} matches aggregate field '{field}' of {owner}")]
    NoMatch {
        /// Owning type
        owner: TypeKey,
        /// Field name
        field: String,
        /// Element type
        element: TypeKey,
    },

    /// Non-distinct single-value field found several matches
    #[error("{count} singletons of {element} match aggregate field '{field}' of {owner}")]
    Ambiguous {
        /// Owning type
        owner: TypeKey,
        /// Field name
        field: String,
        /// Element type
        element: TypeKey,
        /// Number of matches
        count: usize,
    },

    /// A predicate dependency did not resolve to a `SingletonPredicate`
    #[error("predicate {predicate} of aggregate field '{field}' of {owner} is not a singleton predicate")]
    InvalidPredicate {
        /// Owning type
        owner: TypeKey,
        /// Field name
        field: String,
        /// Requested predicate type
        predicate: TypeKey,
    },
}

/// Lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Before constructor parameters are resolved
    PreConstruct,
    /// After construction, before fields are set
    PostInject,
    /// After the whole sequence succeeded
    PostConstruct,
    /// First teardown phase
    PreDestroy,
    /// Second teardown phase
    PostDestroy,
}

impl Display for Phase {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::PreConstruct => "pre-construct",
            Self::PostInject => "post-inject",
            Self::PostConstruct => "post-construct",
            Self::PreDestroy => "pre-destroy",
            Self::PostDestroy => "post-destroy",
        })
    }
}

/// Lifecycle processor errors
#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    /// A processor returned an error
    #[error("{phase} processor of {type_key} failed: {source}")]
    Failed {
        /// Bean type
        type_key: TypeKey,
        /// Phase the processor ran in
        phase: Phase,
        /// Cause
        source: BoxError,
    },

    /// A sequence failed and its teardown failed as well
    #[error("{failures} teardown failure(s) after: {cause}")]
    Teardown {
        /// Number of destroy processors that failed
        failures: usize,
        /// The failure that triggered the teardown
        #[source]
        cause: Box<Error>,
    },

    /// Explicit destruction had failing processors
    #[error("{failures} destroy processor(s) failed")]
    DestroyFailed {
        /// Number of destroy processors that failed
        failures: usize,
    },
}

/// Descriptor contract violations, reported when a descriptor is built
#[derive(Debug, thiserror::Error)]
pub enum DescriptorError {
    /// Constructible type without a constructor
    #[error("{0} has no constructor")]
    MissingConstructor(TypeKey),

    /// Parameter role requires settings that were not given
    #[error("parameter '{param}' of {type_key} is missing its {missing} settings")]
    MissingSettings {
        /// Owning type
        type_key: TypeKey,
        /// Parameter name
        param: String,
        /// `resolving` or `injection`
        missing: &'static str,
    },

    /// Empty qualifier or property key
    #[error("'{name}' of {type_key} has an empty {what}")]
    EmptyKey {
        /// Owning type
        type_key: TypeKey,
        /// Parameter or field name
        name: String,
        /// `qualifier` or `property key`
        what: &'static str,
    },

    /// Matcher or qualifier pattern does not compile
    #[error("'{name}' of {type_key} has an invalid pattern: {source}")]
    InvalidPattern {
        /// Owning type
        type_key: TypeKey,
        /// Parameter or field name
        name: String,
        /// Cause
        source: regex::Error,
    },

    /// `distinct` only applies to single-value aggregate fields
    #[error("aggregate field '{field}' of {type_key} is a collection but marked distinct")]
    ShapeConflict {
        /// Owning type
        type_key: TypeKey,
        /// Field name
        field: String,
    },

    /// Type already has a descriptor
    #[error("descriptor for {0} is already registered")]
    Duplicate(TypeKey),
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML could not be parsed
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// Configuration file could not be read
    #[error("failed to read {}: {source}", path.display())]
    Io {
        /// File path
        path: PathBuf,
        /// Cause
        source: std::io::Error,
    },

    /// Value out of range
    #[error("invalid value for '{field}': {reason}")]
    Invalid {
        /// Field name
        field: &'static str,
        /// What is wrong
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    struct A;
    struct B;

    #[test]
    fn cycle_trace_starts_at_reentered_type() {
        let stack = [TypeKey::of::<String>(), TypeKey::of::<A>(), TypeKey::of::<B>()];
        let err = InjectionError::cycle(&stack, TypeKey::of::<A>());
        assert_eq!(err.to_string(), "constructor cycle: A -> B -> A");
    }

    #[test]
    fn self_cycle_trace() {
        let stack = [TypeKey::of::<A>()];
        let err = InjectionError::cycle(&stack, TypeKey::of::<A>());
        assert_eq!(err.to_string(), "constructor cycle: A -> A");
    }

    #[test]
    fn teardown_keeps_primary_cause() {
        let primary = Error::from(InjectionError::Unresolved(TypeKey::of::<A>()));
        let err = Error::from(ProcessorError::Teardown {
            failures: 2,
            cause: Box::new(primary),
        });

        assert!(matches!(
            err.root_cause(),
            Error::Injection(InjectionError::Unresolved(_))
        ));
        let source = std::error::Error::source(&err).and_then(|inner| inner.source());
        assert!(source.is_some());
    }

    #[test]
    fn phase_display() {
        assert_eq!(Phase::PostConstruct.to_string(), "post-construct");
    }
}
