//! Lifecycle processors
//!
//! A bean passes through five phases in fixed order:
//! `pre-construct -> post-inject -> post-construct -> pre-destroy -> post-destroy`.
//! [`Lifecycle`] holds the ordered processors of every phase, either from a
//! descriptor or attached to a type/plugin allocation.

use crate::callback::Callback;
use crate::error::{BoxError, Phase};
use graft_context::{Bean, TypeKey};
use std::any::Any;
use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

/// Runs before constructor parameters are resolved
pub type PreConstruct = Arc<dyn Fn(&mut Callback<'_>) -> Result<(), BoxError> + Send + Sync>;

/// Runs with the constructed bean (post-inject, post-construct)
pub type PostProcessor =
    Arc<dyn Fn(&Bean, &mut Callback<'_>) -> Result<(), BoxError> + Send + Sync>;

/// Runs during teardown (pre-destroy, post-destroy)
pub type DestroyProcessor = Arc<dyn Fn(&Bean) -> Result<(), BoxError> + Send + Sync>;

/// Bean handed to a processor is not of the type the processor was written for
#[derive(Debug, thiserror::Error)]
#[error("processor expects {expected}")]
pub struct ProcessorTypeMismatch {
    /// Type the processor was registered for
    pub expected: TypeKey,
}

fn pre_construct<F>(f: F) -> PreConstruct
where
    F: Fn(&mut Callback<'_>) -> Result<(), BoxError> + Send + Sync + 'static,
{
    Arc::new(f)
}

fn post_processor<F>(f: F) -> PostProcessor
where
    F: Fn(&Bean, &mut Callback<'_>) -> Result<(), BoxError> + Send + Sync + 'static,
{
    Arc::new(f)
}

fn destroy_processor<F>(f: F) -> DestroyProcessor
where
    F: Fn(&Bean) -> Result<(), BoxError> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Borrow the concrete value behind `bean`
pub(crate) fn concrete<T: Any + Send + Sync>(bean: &Bean) -> Result<&T, BoxError> {
    (**bean).downcast_ref::<T>().ok_or_else(|| {
        Box::new(ProcessorTypeMismatch {
            expected: TypeKey::of::<T>(),
        }) as BoxError
    })
}

/// Ordered processors per phase
#[derive(Clone, Default)]
pub struct Lifecycle {
    pub(crate) pre_construct: Vec<PreConstruct>,
    pub(crate) post_inject: Vec<PostProcessor>,
    pub(crate) post_construct: Vec<PostProcessor>,
    pub(crate) pre_destroy: Vec<DestroyProcessor>,
    pub(crate) post_destroy: Vec<DestroyProcessor>,
}

impl Lifecycle {
    /// Create empty lifecycle
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pre-construct processor
    #[must_use]
    pub fn on_pre_construct(
        mut self,
        f: impl Fn(&mut Callback<'_>) -> Result<(), BoxError> + Send + Sync + 'static,
    ) -> Self {
        self.pre_construct.push(pre_construct(f));
        self
    }

    /// Add a post-inject processor for beans of type `T`
    #[must_use]
    pub fn on_post_inject<T: Any + Send + Sync>(
        mut self,
        f: impl Fn(&T, &mut Callback<'_>) -> Result<(), BoxError> + Send + Sync + 'static,
    ) -> Self {
        self.post_inject
            .push(post_processor(move |bean, callback| f(concrete::<T>(bean)?, callback)));
        self
    }

    /// Add a post-construct processor for beans of type `T`
    #[must_use]
    pub fn on_post_construct<T: Any + Send + Sync>(
        mut self,
        f: impl Fn(&T, &mut Callback<'_>) -> Result<(), BoxError> + Send + Sync + 'static,
    ) -> Self {
        self.post_construct
            .push(post_processor(move |bean, callback| f(concrete::<T>(bean)?, callback)));
        self
    }

    /// Add a pre-destroy processor for beans of type `T`
    #[must_use]
    pub fn on_pre_destroy<T: Any + Send + Sync>(
        mut self,
        f: impl Fn(&T) -> Result<(), BoxError> + Send + Sync + 'static,
    ) -> Self {
        self.pre_destroy
            .push(destroy_processor(move |bean| f(concrete::<T>(bean)?)));
        self
    }

    /// Add a post-destroy processor for beans of type `T`
    #[must_use]
    pub fn on_post_destroy<T: Any + Send + Sync>(
        mut self,
        f: impl Fn(&T) -> Result<(), BoxError> + Send + Sync + 'static,
    ) -> Self {
        self.post_destroy
            .push(destroy_processor(move |bean| f(concrete::<T>(bean)?)));
        self
    }

    /// This lifecycle's processors followed by `other`'s, per phase
    #[must_use]
    pub fn chain(&self, other: &Self) -> Self {
        fn joined<P: Clone>(a: &[P], b: &[P]) -> Vec<P> {
            a.iter().chain(b).cloned().collect()
        }
        Self {
            pre_construct: joined(&self.pre_construct, &other.pre_construct),
            post_inject: joined(&self.post_inject, &other.post_inject),
            post_construct: joined(&self.post_construct, &other.post_construct),
            pre_destroy: joined(&self.pre_destroy, &other.pre_destroy),
            post_destroy: joined(&self.post_destroy, &other.post_destroy),
        }
    }

    /// Number of processors in `phase`
    #[must_use]
    pub fn count(&self, phase: Phase) -> usize {
        match phase {
            Phase::PreConstruct => self.pre_construct.len(),
            Phase::PostInject => self.post_inject.len(),
            Phase::PostConstruct => self.post_construct.len(),
            Phase::PreDestroy => self.pre_destroy.len(),
            Phase::PostDestroy => self.post_destroy.len(),
        }
    }

    /// Check if any teardown processor is present
    #[inline]
    #[must_use]
    pub fn has_destroyers(&self) -> bool {
        !self.pre_destroy.is_empty() || !self.post_destroy.is_empty()
    }

    /// Check if no processor is present
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pre_construct.is_empty()
            && self.post_inject.is_empty()
            && self.post_construct.is_empty()
            && !self.has_destroyers()
    }
}

impl Debug for Lifecycle {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifecycle")
            .field("pre_construct", &self.pre_construct.len())
            .field("post_inject", &self.post_inject.len())
            .field("post_construct", &self.post_construct.len())
            .field("pre_destroy", &self.pre_destroy.len())
            .field("post_destroy", &self.post_destroy.len())
            .finish()
    }
}

/// Teardown processors of one constructed bean
#[derive(Clone)]
pub(crate) struct Destroyable {
    pub(crate) type_key: TypeKey,
    pub(crate) bean: Bean,
    pub(crate) pre_destroy: Vec<DestroyProcessor>,
    pub(crate) post_destroy: Vec<DestroyProcessor>,
    /// Belongs to a global singleton, which outlives its sequence
    pub(crate) global: bool,
}

/// Run every pre-destroy processor, then every post-destroy processor
///
/// Both passes walk `destroyables` in reverse registration order. Failures do
/// not stop the teardown; they are logged and counted.
pub(crate) fn teardown(destroyables: &[Destroyable]) -> usize {
    let mut failures = 0;
    for destroyable in destroyables.iter().rev() {
        failures += destroyable.run(Phase::PreDestroy, &destroyable.pre_destroy);
    }
    for destroyable in destroyables.iter().rev() {
        failures += destroyable.run(Phase::PostDestroy, &destroyable.post_destroy);
    }
    if !destroyables.is_empty() {
        tracing::debug!(beans = destroyables.len(), failures, "teardown finished");
    }
    failures
}

impl Destroyable {
    fn run(&self, phase: Phase, processors: &[DestroyProcessor]) -> usize {
        let mut failures = 0;
        for processor in processors {
            if let Err(error) = processor(&self.bean) {
                failures += 1;
                tracing::warn!(
                    type_key = %self.type_key,
                    %phase,
                    %error,
                    "teardown processor failed"
                );
            }
        }
        failures
    }
}
