//! Evaluation-time and compile-time scopes.
//!
//! A [`Scope`] carries the value stack the VM works on, optional host state
//! callbacks may downcast, and, while an evaluation runs, a handle to the
//! expression's [`CtStore`]. The compiler drives a scope of its own during
//! constant folding; such a scope reports [`Scope::is_compile_time`] and
//! plug-in callbacks branch on that to decide where precomputed state goes.

use std::{
    any::Any,
    fmt,
    sync::{Arc, RwLock},
};

use ahash::AHashMap;

use crate::value::Value;

/// A named compile-time resource stashed by a plug-in.
///
/// Typical use: a wildcard matcher compiled from a constant pattern at
/// compile time and reused by every evaluation. Resources are shared across
/// concurrently evaluating threads, hence `Send + Sync`.
pub trait NamedResource: Any + fmt::Debug + Send + Sync {
    /// Upcast enabling `downcast_ref` on the concrete resource type.
    fn as_any(&self) -> &dyn Any;
}

/// Per-expression compile-time storage.
///
/// Owned by the compiled expression; dropped together with the program.
/// Plug-ins write named resources here during compilation and read them
/// (concurrently) at evaluation time.
#[derive(Debug, Default)]
pub struct CtStore {
    resources: RwLock<AHashMap<String, Arc<dyn NamedResource>>>,
}

impl CtStore {
    /// Fetches a named resource.
    #[must_use]
    pub fn resource(&self, key: &str) -> Option<Arc<dyn NamedResource>> {
        self.resources.read().expect("resource map poisoned").get(key).cloned()
    }

    /// Stores a named resource, replacing any previous entry of the same key.
    pub fn insert_resource(&self, key: impl Into<String>, resource: Arc<dyn NamedResource>) {
        self.resources
            .write()
            .expect("resource map poisoned")
            .insert(key.into(), resource);
    }

    /// Number of stored resources.
    #[must_use]
    pub fn resource_count(&self) -> usize {
        self.resources.read().expect("resource map poisoned").len()
    }
}

/// The per-evaluation context handed to every callback.
///
/// Construct one with [`Scope::new`] and reuse it across evaluations; the
/// stack and the nested-evaluation state are cleared when an evaluation
/// begins. For concurrent evaluation of one expression, give each thread its
/// own scope.
#[derive(Default)]
pub struct Scope {
    /// The value stack the program executes against.
    pub(crate) stack: Vec<Value>,
    /// The compile-time store of the expression currently compiling or
    /// evaluating in this scope.
    store: Option<Arc<CtStore>>,
    /// True while the compiler drives this scope for constant folding.
    compile_time: bool,
    /// Names of nested expressions currently being evaluated, innermost last.
    /// Re-entering a name on this list is a circular reference.
    pub(crate) active_nested: Vec<String>,
    /// Host state for custom callbacks.
    context: Option<Box<dyn Any + Send>>,
}

impl Scope {
    /// Creates an evaluation scope without host context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an evaluation scope carrying host state for custom callbacks.
    #[must_use]
    pub fn with_context(context: impl Any + Send) -> Self {
        Self {
            context: Some(Box::new(context)),
            ..Self::default()
        }
    }

    /// Creates the scope the compiler folds constants in.
    #[must_use]
    pub(crate) fn compile_time(store: Arc<CtStore>) -> Self {
        Self {
            store: Some(store),
            compile_time: true,
            ..Self::default()
        }
    }

    /// Whether this scope is the compile-time scope. Plug-in callbacks use
    /// this to decide whether precomputed state may be stored for reuse.
    #[must_use]
    pub fn is_compile_time(&self) -> bool {
        self.compile_time
    }

    /// The compile-time store of the expression this scope currently serves.
    #[must_use]
    pub fn store(&self) -> Option<&Arc<CtStore>> {
        self.store.as_ref()
    }

    /// Downcasts the host context.
    #[must_use]
    pub fn context<T: Any>(&self) -> Option<&T> {
        self.context.as_deref().and_then(|context| context.downcast_ref())
    }

    /// Downcasts the host context mutably.
    #[must_use]
    pub fn context_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.context.as_deref_mut().and_then(|context| context.downcast_mut())
    }

    /// Resets per-evaluation state and attaches the expression's store.
    /// Values observed from a prior evaluation stay valid (they are
    /// reference-counted), but the stack starts empty.
    pub(crate) fn begin(&mut self, store: Arc<CtStore>) {
        self.stack.clear();
        self.active_nested.clear();
        self.store = Some(store);
    }

    /// Swaps in a nested expression's store for the duration of its
    /// subroutine call; returns the outer store.
    pub(crate) fn swap_store(&mut self, store: Arc<CtStore>) -> Option<Arc<CtStore>> {
        self.store.replace(store)
    }

    /// Restores the outer store after a subroutine call.
    pub(crate) fn restore_store(&mut self, store: Option<Arc<CtStore>>) {
        self.store = store;
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("stack", &self.stack)
            .field("compile_time", &self.compile_time)
            .field("active_nested", &self.active_nested)
            .field("has_context", &self.context.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Counter(usize);

    impl NamedResource for Counter {
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn resources_round_trip_through_store() {
        let store = CtStore::default();
        store.insert_resource("k", Arc::new(Counter(7)));
        let fetched = store.resource("k").unwrap();
        assert_eq!(fetched.as_any().downcast_ref::<Counter>().unwrap().0, 7);
        assert!(store.resource("other").is_none());
    }

    #[test]
    fn context_downcasts() {
        let mut scope = Scope::with_context(42usize);
        assert_eq!(scope.context::<usize>(), Some(&42));
        assert_eq!(scope.context::<String>(), None);
        *scope.context_mut::<usize>().unwrap() = 7;
        assert_eq!(scope.context::<usize>(), Some(&7));
    }

    #[test]
    fn begin_clears_evaluation_state() {
        let mut scope = Scope::new();
        scope.stack.push(Value::from(1i64));
        scope.active_nested.push("foo".to_owned());
        scope.begin(Arc::new(CtStore::default()));
        assert!(scope.stack.is_empty());
        assert!(scope.active_nested.is_empty());
        assert!(!scope.is_compile_time());
        assert!(scope.store().is_some());
    }
}
