//! Property resolution context
//!
//! Provides [`ResolvingContext`], the layered `key -> value` map injection
//! points read properties from.

use crate::error::ResolvingError;
use regex::Regex;

/// Compile `pattern` so that it must match a whole value
///
/// # Errors
/// Returns the regex compile error for invalid patterns
pub fn full_match(pattern: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!("^(?:{pattern})$"))
}

/// Layered property map
///
/// Backed by a persistent map: a child layer shares structure with its
/// parent, and merging never touches the parent.
#[derive(Debug, Clone, Default)]
pub struct ResolvingContext {
    properties: im::HashMap<String, String>,
}

impl ResolvingContext {
    /// Create empty context
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create context from properties
    #[must_use]
    pub fn with_properties<K, V>(properties: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self::new().merge(properties)
    }

    /// Layer `overrides` on top of this context
    #[must_use]
    pub fn merge<K, V>(&self, overrides: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let mut properties = self.properties.clone();
        properties.extend(overrides.into_iter().map(|(k, v)| (k.into(), v.into())));
        Self { properties }
    }

    /// Raw lookup
    #[inline]
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Check if property is set
    #[inline]
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.properties.contains_key(key)
    }

    /// Resolve property with validation
    ///
    /// # Errors
    /// - `ResolvingError::Missing` if `forced` and the key is absent
    /// - `ResolvingError::Mismatch` if the value does not match `matcher`
    pub fn resolve(
        &self,
        key: &str,
        matcher: Option<&Regex>,
        forced: bool,
    ) -> Result<Option<&str>, ResolvingError> {
        self.resolve_or(key, matcher, None, forced)
    }

    /// Resolve property, falling back to `default` when absent
    ///
    /// The matcher applies to the default as well.
    ///
    /// # Errors
    /// Same as [`ResolvingContext::resolve`]; a default satisfies `forced`.
    pub fn resolve_or<'a>(
        &'a self,
        key: &str,
        matcher: Option<&Regex>,
        default: Option<&'a str>,
        forced: bool,
    ) -> Result<Option<&'a str>, ResolvingError> {
        let value = self.get(key).or(default);
        tracing::trace!(key, found = value.is_some(), "resolving property");

        match value {
            None if forced => Err(ResolvingError::missing(key)),
            None => Ok(None),
            Some(value) => match matcher {
                Some(matcher) if !matcher.is_match(value) => Err(ResolvingError::Mismatch {
                    key: key.to_string(),
                    value: value.to_string(),
                    matcher: matcher.as_str().to_string(),
                }),
                _ => Ok(Some(value)),
            },
        }
    }

    /// Number of visible properties
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    /// Check if no property is set
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}
