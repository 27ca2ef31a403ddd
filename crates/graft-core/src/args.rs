//! Resolved constructor arguments

use graft_context::{downcast, Bean, TypeKey};
use std::any::Any;
use std::fmt::{self, Debug, Display, Formatter};
use std::str::FromStr;
use std::sync::Arc;

/// Errors reading constructor arguments or field values
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArgumentError {
    /// Index past the declared parameters
    #[error("argument index {index} out of range ({len} parameters)")]
    OutOfRange {
        /// Requested index
        index: usize,
        /// Number of parameters
        len: usize,
    },

    /// Required argument resolved to nothing
    #[error("argument '{name}' is absent")]
    Missing {
        /// Parameter name
        name: String,
    },

    /// Argument is not of the requested type
    #[error("argument '{name}' is not a {expected}")]
    TypeMismatch {
        /// Parameter name
        name: String,
        /// Requested type
        expected: TypeKey,
    },

    /// Property value does not parse
    #[error("argument '{name}' value '{value}' does not parse: {message}")]
    Parse {
        /// Parameter name
        name: String,
        /// Raw value
        value: String,
        /// Parser message
        message: String,
    },
}

/// Value of one constructor parameter
#[derive(Clone)]
pub(crate) enum ArgValue {
    Absent,
    Property(String),
    Bean(Bean),
}

/// Constructor arguments in parameter order
///
/// `Plain` parameters are always absent.
#[derive(Clone)]
pub struct Args {
    names: Vec<String>,
    values: Vec<ArgValue>,
}

impl Args {
    pub(crate) fn new(names: Vec<String>, values: Vec<ArgValue>) -> Self {
        debug_assert_eq!(names.len(), values.len());
        Self { names, values }
    }

    /// Number of parameters
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if there are no parameters
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Check if parameter `index` resolved to a value
    #[must_use]
    pub fn is_present(&self, index: usize) -> bool {
        matches!(
            self.values.get(index),
            Some(ArgValue::Property(_) | ArgValue::Bean(_))
        )
    }

    /// Injected bean at `index`
    ///
    /// # Errors
    /// - `ArgumentError::Missing` if nothing was injected
    /// - `ArgumentError::TypeMismatch` if the bean is not a `T`
    pub fn bean<T: Any + Send + Sync>(&self, index: usize) -> Result<Arc<T>, ArgumentError> {
        self.optional_bean(index)?.ok_or_else(|| ArgumentError::Missing {
            name: self.names[index].clone(),
        })
    }

    /// Injected bean at `index`, if any
    ///
    /// # Errors
    /// `ArgumentError::TypeMismatch` if the bean is not a `T`
    pub fn optional_bean<T: Any + Send + Sync>(
        &self,
        index: usize,
    ) -> Result<Option<Arc<T>>, ArgumentError> {
        match self.value(index)? {
            ArgValue::Bean(bean) => downcast::<T>(bean).map(Some).ok_or_else(|| {
                ArgumentError::TypeMismatch {
                    name: self.names[index].clone(),
                    expected: TypeKey::of::<T>(),
                }
            }),
            ArgValue::Absent | ArgValue::Property(_) => Ok(None),
        }
    }

    /// Raw property value at `index`
    #[must_use]
    pub fn property(&self, index: usize) -> Option<&str> {
        match self.values.get(index) {
            Some(ArgValue::Property(value)) => Some(value.as_str()),
            _ => None,
        }
    }

    /// Property value at `index` parsed as `T`
    ///
    /// # Errors
    /// `ArgumentError::Parse` if the value does not parse
    pub fn parse<T>(&self, index: usize) -> Result<Option<T>, ArgumentError>
    where
        T: FromStr,
        T::Err: Display,
    {
        let Some(value) = self.property(index) else {
            return Ok(None);
        };
        value.parse().map(Some).map_err(|e: T::Err| ArgumentError::Parse {
            name: self.names[index].clone(),
            value: value.to_string(),
            message: e.to_string(),
        })
    }

    /// Required property value at `index` parsed as `T`
    ///
    /// # Errors
    /// `ArgumentError::Missing` if absent, `ArgumentError::Parse` if malformed
    pub fn require<T>(&self, index: usize) -> Result<T, ArgumentError>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.value(index)?;
        self.parse(index)?.ok_or_else(|| ArgumentError::Missing {
            name: self.names[index].clone(),
        })
    }

    fn value(&self, index: usize) -> Result<&ArgValue, ArgumentError> {
        self.values.get(index).ok_or(ArgumentError::OutOfRange {
            index,
            len: self.values.len(),
        })
    }
}

impl Debug for Args {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_map();
        for (name, value) in self.names.iter().zip(&self.values) {
            match value {
                ArgValue::Absent => list.entry(name, &"<absent>"),
                ArgValue::Property(value) => list.entry(name, value),
                ArgValue::Bean(_) => list.entry(name, &"<bean>"),
            };
        }
        list.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graft_context::bean;

    fn args() -> Args {
        Args::new(
            vec!["port".into(), "repo".into(), "plain".into()],
            vec![
                ArgValue::Property("8080".into()),
                ArgValue::Bean(bean(String::from("repo"))),
                ArgValue::Absent,
            ],
        )
    }

    #[test]
    fn typed_access() {
        let args = args();
        assert_eq!(args.len(), 3);
        assert_eq!(args.require::<u16>(0).unwrap(), 8080);
        assert_eq!(args.bean::<String>(1).unwrap().as_str(), "repo");
        assert!(args.optional_bean::<String>(2).unwrap().is_none());
        assert!(!args.is_present(2));
    }

    #[test]
    fn access_errors() {
        let args = args();
        assert!(matches!(
            args.bean::<u32>(1),
            Err(ArgumentError::TypeMismatch { .. })
        ));
        assert!(matches!(args.bean::<String>(2), Err(ArgumentError::Missing { .. })));
        assert!(matches!(args.parse::<u8>(0), Err(ArgumentError::Parse { .. })));
        assert!(matches!(
            args.bean::<String>(7),
            Err(ArgumentError::OutOfRange { index: 7, len: 3 })
        ));
    }
}
