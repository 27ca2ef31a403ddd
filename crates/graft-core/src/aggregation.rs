//! Singleton aggregation
//!
//! An aggregate field collects every singleton of the sequence's pool that
//! can be viewed as the element type, whose qualifier matches the field's
//! pattern and that every predicate bean accepts. Entries handed in from a
//! parent tree are never collected. Large pools are filtered on the rayon
//! pool; the result keeps registration order either way.

use crate::error::AggregationError;
use crate::settings::{AggregateSettings, AggregateShape, SingletonPredicate};
use graft_context::{downcast, Bean, SingletonEntry, TypeKey};
use rayon::prelude::*;
use regex::Regex;
use std::any::Any;
use std::collections::HashSet;
use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

/// Value handed to an aggregate field setter
#[derive(Clone)]
pub enum Aggregate {
    /// Single-value field
    Single(Option<Bean>),
    /// Every match in registration order
    List(Vec<Bean>),
    /// Every distinct instance in registration order
    Set(Vec<Bean>),
}

impl Aggregate {
    /// Collected beans
    #[must_use]
    pub fn beans(&self) -> &[Bean] {
        match self {
            Self::Single(bean) => bean.as_slice(),
            Self::List(beans) | Self::Set(beans) => beans,
        }
    }

    /// Number of collected beans
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.beans().len()
    }

    /// Check if nothing was collected
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.beans().is_empty()
    }

    /// First collected bean as `E`
    #[must_use]
    pub fn single<E: Any + Send + Sync>(&self) -> Option<Arc<E>> {
        self.beans().first().and_then(downcast::<E>)
    }

    /// Every collected bean as `E`
    #[must_use]
    pub fn collect<E: Any + Send + Sync>(&self) -> Vec<Arc<E>> {
        self.beans().iter().filter_map(downcast::<E>).collect()
    }
}

impl Debug for Aggregate {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single(bean) => write!(f, "Single({})", usize::from(bean.is_some())),
            Self::List(beans) => write!(f, "List({})", beans.len()),
            Self::Set(beans) => write!(f, "Set({})", beans.len()),
        }
    }
}

/// One aggregate field being filled
pub(crate) struct AggregateRequest<'a> {
    pub(crate) owner: TypeKey,
    pub(crate) field: &'a str,
    pub(crate) settings: &'a AggregateSettings,
    pub(crate) qualifier: Option<&'a Regex>,
    pub(crate) predicates: &'a [Arc<dyn SingletonPredicate>],
}

impl AggregateRequest<'_> {
    /// Filter `entries` and shape the result
    ///
    /// `view` turns a pool entry into a bean of the element type, or `None`
    /// if the entry is not assignable.
    pub(crate) fn collect<V>(
        &self,
        entries: &[(String, SingletonEntry)],
        view: V,
        parallel_threshold: usize,
    ) -> Result<Aggregate, AggregationError>
    where
        V: Fn(&SingletonEntry) -> Option<Bean> + Sync,
    {
        let matches = |(qualifier, entry): &(String, SingletonEntry)| -> Option<(Bean, Bean)> {
            if entry.is_environment {
                return None;
            }
            if self
                .qualifier
                .is_some_and(|pattern| !pattern.is_match(qualifier))
            {
                return None;
            }
            let viewed = view(entry)?;
            self.predicates
                .iter()
                .all(|predicate| predicate.test(qualifier, &viewed))
                .then(|| (Arc::clone(&entry.bean), viewed))
        };

        let matched: Vec<(Bean, Bean)> = if entries.len() > parallel_threshold {
            entries.par_iter().filter_map(&matches).collect()
        } else {
            entries.iter().filter_map(&matches).collect()
        };

        tracing::debug!(
            owner = %self.owner,
            field = self.field,
            element = %self.settings.type_key,
            candidates = entries.len(),
            matched = matched.len(),
            "aggregate collected"
        );

        match self.settings.shape {
            AggregateShape::Single => self.single(matched),
            AggregateShape::List => Ok(Aggregate::List(
                matched.into_iter().map(|(_, view)| view).collect(),
            )),
            AggregateShape::Set => {
                let mut seen = HashSet::new();
                Ok(Aggregate::Set(
                    matched
                        .into_iter()
                        .filter(|(identity, _)| seen.insert(Arc::as_ptr(identity).cast::<()>()))
                        .map(|(_, view)| view)
                        .collect(),
                ))
            }
        }
    }

    fn single(&self, matched: Vec<(Bean, Bean)>) -> Result<Aggregate, AggregationError> {
        let count = matched.len();
        let mut views = matched.into_iter().map(|(_, view)| view);
        match count {
            0 if self.settings.optional => Ok(Aggregate::Single(None)),
            0 => Err(AggregationError::NoMatch {
                owner: self.owner,
                field: self.field.to_string(),
                element: self.settings.type_key,
            }),
            1 => Ok(Aggregate::Single(views.next())),
            _ if self.settings.distinct => Ok(Aggregate::Single(views.next())),
            _ => Err(AggregationError::Ambiguous {
                owner: self.owner,
                field: self.field.to_string(),
                element: self.settings.type_key,
                count,
            }),
        }
    }
}
