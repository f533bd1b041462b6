//! Resource lifecycle policies.
//!
//! The pool never looks inside a resource. Everything it knows about creating,
//! checking, preparing, cleaning and closing one comes from a [`Policy`].

use std::fmt;

/// Lifecycle hooks the pool calls for its resources.
///
/// All hooks may be invoked while the pool's lock is held, so they must not
/// call back into the same pool. Panics are not caught by the pool; they
/// unwind to whoever called `borrow()` or constructed the pool.
pub trait Policy: Send + Sync {
    /// The pooled resource type.
    type Resource: Send;

    /// Create a fresh resource, or `None` if creation failed.
    fn create(&self) -> Option<Self::Resource>;

    /// Check whether a resource is fit to be handed out.
    fn validate(&self, resource: &mut Self::Resource) -> bool;

    /// Prepare a resource that is leaving the idle queue for a caller.
    fn activate(&self, _resource: &mut Self::Resource) {}

    /// Restore a returned resource to a clean baseline before it re-enters
    /// the idle queue.
    fn passivate(&self, _resource: &mut Self::Resource) {}

    /// Close a resource. Called exactly once per resource the pool discards.
    fn destroy(&self, resource: Self::Resource) {
        drop(resource);
    }
}

type CreateFn<R> = Box<dyn Fn() -> Option<R> + Send + Sync>;
type ValidateFn<R> = Box<dyn Fn(&mut R) -> bool + Send + Sync>;
type HookFn<R> = Box<dyn Fn(&mut R) + Send + Sync>;
type DestroyFn<R> = Box<dyn Fn(R) + Send + Sync>;

/// A [`Policy`] assembled from closures.
///
/// Only creation is required. By default every resource is valid, activation
/// and passivation do nothing, and destruction drops the resource.
///
/// ```rust
/// use respool::FnPolicy;
///
/// let policy = FnPolicy::new(|| Some(String::from("conn")))
///     .with_validate(|conn: &mut String| !conn.is_empty())
///     .on_passivate(|conn: &mut String| conn.truncate(4));
/// ```
pub struct FnPolicy<R> {
    create: CreateFn<R>,
    validate: ValidateFn<R>,
    activate: HookFn<R>,
    passivate: HookFn<R>,
    destroy: DestroyFn<R>,
}

impl<R: Send + 'static> FnPolicy<R> {
    /// Build a policy around a creation closure.
    pub fn new(create: impl Fn() -> Option<R> + Send + Sync + 'static) -> Self {
        Self {
            create: Box::new(create),
            validate: Box::new(|_| true),
            activate: Box::new(|_| {}),
            passivate: Box::new(|_| {}),
            destroy: Box::new(drop),
        }
    }

    /// Set the validation closure.
    #[must_use]
    pub fn with_validate(mut self, f: impl Fn(&mut R) -> bool + Send + Sync + 'static) -> Self {
        self.validate = Box::new(f);
        self
    }

    /// Set the activation closure.
    #[must_use]
    pub fn on_activate(mut self, f: impl Fn(&mut R) + Send + Sync + 'static) -> Self {
        self.activate = Box::new(f);
        self
    }

    /// Set the passivation closure.
    #[must_use]
    pub fn on_passivate(mut self, f: impl Fn(&mut R) + Send + Sync + 'static) -> Self {
        self.passivate = Box::new(f);
        self
    }

    /// Set the destruction closure.
    #[must_use]
    pub fn on_destroy(mut self, f: impl Fn(R) + Send + Sync + 'static) -> Self {
        self.destroy = Box::new(f);
        self
    }
}

impl<R: Send> Policy for FnPolicy<R> {
    type Resource = R;

    fn create(&self) -> Option<R> {
        (self.create)()
    }

    fn validate(&self, resource: &mut R) -> bool {
        (self.validate)(resource)
    }

    fn activate(&self, resource: &mut R) {
        (self.activate)(resource);
    }

    fn passivate(&self, resource: &mut R) {
        (self.passivate)(resource);
    }

    fn destroy(&self, resource: R) {
        (self.destroy)(resource);
    }
}

impl<R> fmt::Debug for FnPolicy<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnPolicy").finish_non_exhaustive()
    }
}
