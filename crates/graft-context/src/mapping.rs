//! Qualifier alias context
//!
//! Provides [`MappingContext`], the layered `qualifier -> qualifier` map.
//! Aliases are followed to a fixed point on lookup. A merge is checked against
//! the map it would produce, overlay entries shadowing the parent, and is
//! rejected only if that map contains a cycle, so lookups always terminate.

use crate::error::MappingError;

/// Layered qualifier alias map
#[derive(Debug, Clone, Default)]
pub struct MappingContext {
    aliases: im::HashMap<String, String>,
}

impl MappingContext {
    /// Create empty context
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Layer `aliases` on top of this context
    ///
    /// Later entries win over earlier ones and over this context. Every
    /// overlay entry is then walked in the merged map; the first walk that
    /// closes a loop aborts the merge.
    ///
    /// # Errors
    /// - `MappingError::Cycle` with the offending chain
    /// - `MappingError::EmptyQualifier` for empty qualifiers
    pub fn merge<K, V>(
        &self,
        aliases: impl IntoIterator<Item = (K, V)>,
    ) -> Result<Self, MappingError>
    where
        K: Into<String>,
        V: Into<String>,
    {
        let mut merged = self.aliases.clone();
        let mut overlay = Vec::new();
        for (qualifier, target) in aliases {
            let (qualifier, target): (String, String) = (qualifier.into(), target.into());
            if qualifier.is_empty() || target.is_empty() {
                return Err(MappingError::EmptyQualifier);
            }
            overlay.push(qualifier.clone());
            merged.insert(qualifier, target);
        }
        for qualifier in &overlay {
            check(&merged, qualifier)?;
        }
        Ok(Self { aliases: merged })
    }

    /// Layer every alias of `other` on top of this context
    ///
    /// # Errors
    /// Same as [`MappingContext::merge`]
    pub fn merge_context(&self, other: &Self) -> Result<Self, MappingError> {
        // walk in a stable order so the reported chain does not vary
        let mut entries: Vec<_> = other.aliases.iter().collect();
        entries.sort_unstable();
        self.merge(entries.into_iter().map(|(q, t)| (q.clone(), t.clone())))
    }

    /// Insert a single alias
    ///
    /// # Errors
    /// Same as [`MappingContext::merge`]; nothing is inserted on error.
    pub fn insert(
        &mut self,
        qualifier: impl Into<String>,
        target: impl Into<String>,
    ) -> Result<(), MappingError> {
        *self = self.merge([(qualifier.into(), target.into())])?;
        Ok(())
    }

    /// Follow the alias chain of `qualifier` to its fixed point
    #[must_use]
    pub fn resolve<'a>(&'a self, qualifier: &'a str) -> &'a str {
        let mut current = qualifier;
        while let Some(next) = self.aliases.get(current) {
            current = next.as_str();
        }
        if current != qualifier {
            tracing::trace!(qualifier, resolved = current, "qualifier alias resolved");
        }
        current
    }

    /// Check if `qualifier` is aliased
    #[inline]
    #[must_use]
    pub fn is_aliased(&self, qualifier: &str) -> bool {
        self.aliases.contains_key(qualifier)
    }

    /// Number of aliases
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    /// Check if there are no aliases
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }
}

/// Walk the chain from `qualifier`; revisiting any qualifier means a cycle
fn check(aliases: &im::HashMap<String, String>, qualifier: &str) -> Result<(), MappingError> {
    let mut chain = vec![qualifier.to_string()];
    let mut current = qualifier;
    while let Some(next) = aliases.get(current) {
        if let Some(start) = chain.iter().position(|seen| seen == next) {
            let mut cycle = chain.split_off(start);
            cycle.push(next.clone());
            return Err(MappingError::Cycle { chain: cycle });
        }
        chain.push(next.clone());
        current = next.as_str();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn resolve_follows_chain() {
        let ctx = MappingContext::new().merge([("a", "b"), ("b", "c")]).unwrap();
        assert_eq!(ctx.resolve("a"), "c");
        assert_eq!(ctx.resolve("b"), "c");
        assert_eq!(ctx.resolve("c"), "c");
        assert_eq!(ctx.resolve("x"), "x");
    }

    #[test]
    fn three_cycle_rejected_on_insert() {
        let mut ctx = MappingContext::new();
        ctx.insert("a", "b").unwrap();
        ctx.insert("b", "c").unwrap();

        let err = ctx.insert("c", "a").unwrap_err();
        assert_eq!(
            err,
            MappingError::Cycle {
                chain: vec!["c".into(), "a".into(), "b".into(), "c".into()],
            }
        );
        // nothing committed
        assert!(!ctx.is_aliased("c"));
    }

    #[test]
    fn self_alias_rejected() {
        let err = MappingContext::new().merge([("a", "a")]).unwrap_err();
        assert!(matches!(err, MappingError::Cycle { .. }));
    }

    #[test]
    fn cycle_within_one_merge_rejected() {
        let err = MappingContext::new()
            .merge([("a", "b"), ("b", "a")])
            .unwrap_err();
        assert!(matches!(err, MappingError::Cycle { .. }));
    }

    #[test]
    fn cycle_across_layers_rejected() {
        let parent = MappingContext::new().merge([("a", "b")]).unwrap();
        assert!(parent.merge([("b", "a")]).is_err());
        // parent untouched by failed merge
        assert_eq!(parent.resolve("b"), "b");
    }

    #[test]
    fn overlay_shadows_parent_alias() {
        let parent = MappingContext::new().merge([("a", "b")]).unwrap();

        // "b -> a" would close a cycle with "a -> b", but "a" is redirected first
        for overlay in [[("a", "c"), ("b", "a")], [("b", "a"), ("a", "c")]] {
            let merged = parent.merge(overlay).unwrap();
            assert_eq!(merged.resolve("b"), "c");
            assert_eq!(merged.resolve("a"), "c");
        }
        assert_eq!(parent.resolve("a"), "b");
    }

    #[test]
    fn merge_context_is_order_independent() {
        let parent = MappingContext::new().merge([("a", "b")]).unwrap();
        let overlay = MappingContext::new().merge([("a", "c"), ("b", "a")]).unwrap();
        for _ in 0..32 {
            assert_eq!(parent.merge_context(&overlay).unwrap().resolve("b"), "c");
        }
    }

    #[test]
    fn cycle_between_overlay_entries_reported_once() {
        let parent = MappingContext::new().merge([("x", "a")]).unwrap();
        let err = parent.merge([("a", "b"), ("b", "a")]).unwrap_err();
        assert_eq!(
            err,
            MappingError::Cycle {
                chain: vec!["a".into(), "b".into(), "a".into()],
            }
        );
    }

    #[test]
    fn empty_qualifier_rejected() {
        let err = MappingContext::new().merge([("", "a")]).unwrap_err();
        assert_eq!(err, MappingError::EmptyQualifier);
    }

    proptest! {
        #[test]
        fn accepted_aliases_always_terminate(edges in proptest::collection::vec((0u8..8, 0u8..8), 0..32)) {
            let mut ctx = MappingContext::new();
            for (from, to) in edges {
                let _ = ctx.insert(from.to_string(), to.to_string());
            }
            for q in 0u8..8 {
                let resolved = ctx.resolve(&q.to_string()).to_string();
                prop_assert!(!ctx.is_aliased(&resolved));
            }
        }

        #[test]
        fn merge_accepts_exactly_the_acyclic_results(
            base in proptest::collection::vec((0u8..6, 0u8..6), 0..8),
            overlay in proptest::collection::vec((0u8..6, 0u8..6), 0..8),
        ) {
            let mut parent = MappingContext::new();
            for (from, to) in base {
                let _ = parent.insert(from.to_string(), to.to_string());
            }

            let mut expected: std::collections::HashMap<String, String> = parent
                .aliases
                .iter()
                .map(|(q, t)| (q.clone(), t.clone()))
                .collect();
            for (from, to) in &overlay {
                expected.insert(from.to_string(), to.to_string());
            }
            let acyclic = expected.keys().all(|start| {
                let mut current = start;
                for _ in 0..=expected.len() {
                    match expected.get(current) {
                        Some(next) => current = next,
                        None => return true,
                    }
                }
                false
            });

            let merged = parent.merge(overlay.iter().map(|(f, t)| (f.to_string(), t.to_string())));
            prop_assert_eq!(merged.is_ok(), acyclic);
        }
    }
}
