//! Type identity and type-erased bean handles
//!
//! Provides [`TypeKey`], the identity every context is keyed by, and [`Bean`],
//! the shared, type-erased instance handle the engine passes around.

use std::any::{Any, TypeId};
use std::fmt::{self, Debug, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A type-erased, shareable bean instance
///
/// Identity comparisons must go through [`same_bean`]; two beans are the same
/// singleton iff they point at the same allocation.
pub type Bean = Arc<dyn Any + Send + Sync>;

/// Wrap a value into a [`Bean`]
#[inline]
#[must_use]
pub fn bean<T: Any + Send + Sync>(value: T) -> Bean {
    Arc::new(value)
}

/// Reference equality for beans (ignores vtable metadata)
#[inline]
#[must_use]
pub fn same_bean(a: &Bean, b: &Bean) -> bool {
    Arc::as_ptr(a).cast::<()>() == Arc::as_ptr(b).cast::<()>()
}

/// Downcast a bean to a concrete shared type
///
/// Returns `None` if the bean's concrete type is not `T`.
#[inline]
#[must_use]
pub fn downcast<T: Any + Send + Sync>(bean: &Bean) -> Option<Arc<T>> {
    Arc::clone(bean).downcast::<T>().ok()
}

/// Identity of a bean type
///
/// Equality and hashing use the [`TypeId`] only; the name is carried for
/// diagnostics (cycle traces, mismatch errors, log events).
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    /// Key for type `T`
    #[inline]
    #[must_use]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// Underlying type id
    #[inline]
    #[must_use]
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Fully qualified type name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Type name without its module path
    ///
    /// Generic arguments are kept as written, only the leading path of the
    /// outermost type is stripped.
    #[must_use]
    pub fn short_name(&self) -> &'static str {
        let head = self.name.split('<').next().unwrap_or(self.name);
        match head.rfind("::") {
            Some(idx) => &self.name[idx + 2..],
            None => self.name,
        }
    }

    /// Whether `bean` is an instance of this type
    #[inline]
    #[must_use]
    pub fn is_instance(&self, bean: &Bean) -> bool {
        (**bean).type_id() == self.id
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl Debug for TypeKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "TypeKey({})", self.name)
    }
}

impl Display for TypeKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Repository;

    #[test]
    fn type_key_equality_by_type_id() {
        assert_eq!(TypeKey::of::<Repository>(), TypeKey::of::<Repository>());
        assert_ne!(TypeKey::of::<Repository>(), TypeKey::of::<String>());
    }

    #[test]
    fn short_name_strips_path() {
        assert_eq!(TypeKey::of::<Repository>().short_name(), "Repository");
        assert_eq!(TypeKey::of::<u32>().short_name(), "u32");
        assert_eq!(TypeKey::of::<Vec<String>>().short_name(), "Vec<alloc::string::String>");
    }

    #[test]
    fn bean_identity() {
        let a = bean(String::from("a"));
        let b = Arc::clone(&a);
        let c = bean(String::from("a"));

        assert!(same_bean(&a, &b));
        assert!(!same_bean(&a, &c));
    }

    #[test]
    fn bean_downcast() {
        let a = bean(42_u32);
        assert_eq!(downcast::<u32>(&a).as_deref(), Some(&42));
        assert!(downcast::<String>(&a).is_none());
        assert!(TypeKey::of::<u32>().is_instance(&a));
        assert!(!TypeKey::of::<u64>().is_instance(&a));
    }
}
