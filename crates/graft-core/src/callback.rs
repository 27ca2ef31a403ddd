//! Scoped callback
//!
//! Providers and lifecycle processors receive a [`Callback`] bound to the
//! sequence that invoked them. It borrows the sequence state, so it cannot
//! outlive the invocation, and everything built through it joins the running
//! sequence: same singleton pool, same constructor stack, same teardown.

use crate::chain::{ChainLayer, SequenceState};
use crate::error::{DescriptorError, Result};
use crate::injector::{require, Injector};
use crate::lock::TreeToken;
use crate::settings::{InjectionSettings, ResolvingSettings};
use graft_context::{Bean, TypeKey};
use std::any::Any;
use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

/// Handle for nested construction inside a running sequence
pub struct Callback<'a> {
    injector: &'a Injector,
    state: &'a mut SequenceState,
    layer: &'a ChainLayer,
    owner: TypeKey,
}

impl<'a> Callback<'a> {
    pub(crate) fn new(
        injector: &'a Injector,
        state: &'a mut SequenceState,
        layer: &'a ChainLayer,
        owner: TypeKey,
    ) -> Self {
        Self {
            injector,
            state,
            layer,
            owner,
        }
    }

    /// Type whose provider or processor received this callback
    #[inline]
    #[must_use]
    pub fn owner(&self) -> TypeKey {
        self.owner
    }

    /// Token of the tree the sequence runs on
    #[inline]
    #[must_use]
    pub fn tree_token(&self) -> TreeToken {
        self.injector.tree_token()
    }

    /// Independent bean of type `T`
    ///
    /// # Errors
    /// Any error of the nested resolution, or `InjectionError::Unresolved`
    pub fn instantiate<T: Any + Send + Sync>(&mut self) -> Result<Arc<T>> {
        let target = InjectionSettings::of::<T>();
        let resolved = self.instantiate_target(&target)?;
        require(resolved, target.type_key)
    }

    /// Singleton of type `T` under `qualifier`
    ///
    /// # Errors
    /// Any error of the nested resolution, or `InjectionError::Unresolved`
    pub fn instantiate_qualified<T: Any + Send + Sync>(
        &mut self,
        qualifier: impl Into<String>,
    ) -> Result<Arc<T>> {
        let target = InjectionSettings::qualified::<T>(qualifier);
        let resolved = self.instantiate_target(&target)?;
        require(resolved, target.type_key)
    }

    /// Resolve `target` inside the running sequence
    ///
    /// # Errors
    /// Any error of the nested resolution
    pub fn instantiate_target(&mut self, target: &InjectionSettings) -> Result<Option<Bean>> {
        self.injector.resolve(&mut *self.state, self.layer, target)
    }

    /// Look a property up in the current resolving layer
    ///
    /// # Errors
    /// - `DescriptorError::InvalidPattern` if the matcher does not compile
    /// - `ResolvingError` if forced and absent, or present and non-matching
    pub fn resolve_property(&self, settings: &ResolvingSettings) -> Result<Option<String>> {
        let matcher = settings
            .compile()
            .map_err(|source| DescriptorError::InvalidPattern {
                type_key: self.owner,
                name: settings.key.clone(),
                source,
            })?;
        Ok(settings.resolve(&self.layer.resolving, matcher.as_ref())?)
    }
}

impl Debug for Callback<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback")
            .field("owner", &self.owner)
            .field("tree", &self.tree_token())
            .finish_non_exhaustive()
    }
}
