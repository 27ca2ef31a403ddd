//! Plugin version tuples
//!
//! Provides [`Version`], a dotted tuple of numeric components compared
//! component-wise, and [`VersionRange`], a half-open `[from, until)` range.

use crate::error::PluginError;
use std::cmp::Ordering;
use std::fmt::{self, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Dotted numeric version, e.g. `1.2.3`
///
/// Missing trailing components compare as zero, so `1` == `1.0` == `1.0.0`.
#[derive(Debug, Clone)]
pub struct Version(Vec<u64>);

impl Version {
    /// Version of unversioned artifacts
    #[inline]
    #[must_use]
    pub fn zero() -> Self {
        Self(vec![0])
    }

    /// Create version from components
    ///
    /// An empty component list is treated as [`Version::zero`].
    #[must_use]
    pub fn new(components: impl Into<Vec<u64>>) -> Self {
        let components = components.into();
        if components.is_empty() {
            Self::zero()
        } else {
            Self(components)
        }
    }

    /// Version components as written
    #[inline]
    #[must_use]
    pub fn components(&self) -> &[u64] {
        &self.0
    }

    /// Components without trailing zeros (canonical form)
    fn significant(&self) -> &[u64] {
        let len = self.0.iter().rposition(|&c| c != 0).map_or(0, |i| i + 1);
        &self.0[..len]
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.significant() == other.significant()
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.significant().hash(state);
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.0.len().max(other.0.len());
        for i in 0..len {
            let left = self.0.get(i).copied().unwrap_or(0);
            let right = other.0.get(i).copied().unwrap_or(0);
            match left.cmp(&right) {
                Ordering::Equal => {}
                unequal => return unequal,
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl FromStr for Version {
    type Err = PluginError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let components = s
            .split('.')
            .map(str::parse::<u64>)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| PluginError::InvalidVersion(s.to_string()))?;
        Ok(Self::new(components))
    }
}

impl Display for Version {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for component in &self.0 {
            if !first {
                f.write_str(".")?;
            }
            write!(f, "{component}")?;
            first = false;
        }
        Ok(())
    }
}

impl From<u64> for Version {
    fn from(major: u64) -> Self {
        Self(vec![major])
    }
}

/// Half-open version range `[from, until)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRange {
    /// Inclusive lower bound
    pub from: Version,
    /// Exclusive upper bound; `None` means unbounded
    pub until: Option<Version>,
}

impl VersionRange {
    /// Range accepting every version
    #[inline]
    #[must_use]
    pub fn any() -> Self {
        Self {
            from: Version::zero(),
            until: None,
        }
    }

    /// Range `[from, until)`
    #[inline]
    #[must_use]
    pub fn between(from: impl Into<Version>, until: impl Into<Version>) -> Self {
        Self {
            from: from.into(),
            until: Some(until.into()),
        }
    }

    /// Range `[from, ∞)`
    #[inline]
    #[must_use]
    pub fn at_least(from: impl Into<Version>) -> Self {
        Self {
            from: from.into(),
            until: None,
        }
    }

    /// Check if `version` lies within the range
    #[inline]
    #[must_use]
    pub fn contains(&self, version: &Version) -> bool {
        *version >= self.from && self.until.as_ref().map_or(true, |until| version < until)
    }
}

impl Default for VersionRange {
    fn default() -> Self {
        Self::any()
    }
}

impl Display for VersionRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.until {
            Some(until) => write!(f, "[{}, {})", self.from, until),
            None => write!(f, "[{}, MAX)", self.from),
        }
    }
}
