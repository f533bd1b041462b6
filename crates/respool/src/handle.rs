//! Move-only resource handles with a one-shot release action.
//!
//! A [`Handle`] owns exactly one resource. When the handle is dropped (or
//! [`Handle::release`] is called) its [`Release`] action receives the
//! resource, exactly once. Moving a handle moves ownership; the moved-from
//! binding can no longer be used, so a resource can never be released twice.
//!
//! ```rust
//! use respool::handle::{FnRelease, Handle};
//!
//! let mut closed = Vec::new();
//! {
//!     let handle = Handle::new(7, FnRelease::new(|r: i32| closed.push(r)));
//!     assert_eq!(*handle, 7);
//! }
//! assert_eq!(closed, vec![7]);
//! ```

use std::fmt;
use std::ops::{Deref, DerefMut};

/// Action run once when a [`Handle`] gives up its resource.
pub trait Release<R> {
    /// Take back the resource at the end of the handle's life.
    fn release(&mut self, resource: R);

    /// Called instead of [`release`](Release::release) when the resource is
    /// taken out of the handle with [`Handle::into_inner`].
    fn forget(&mut self) {}
}

/// Release by dropping the resource, which destroys it.
#[derive(Debug, Clone, Copy, Default)]
pub struct DropRelease;

impl<R> Release<R> for DropRelease {
    fn release(&mut self, resource: R) {
        drop(resource);
    }
}

/// Release by passing the resource to a closure.
pub struct FnRelease<F>(F);

impl<F> FnRelease<F> {
    /// Wrap a closure as a release action.
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<R, F: FnMut(R)> Release<R> for FnRelease<F> {
    fn release(&mut self, resource: R) {
        (self.0)(resource);
    }
}

impl<F> fmt::Debug for FnRelease<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnRelease")
    }
}

/// Exclusive owner of a resource plus the action that releases it.
#[must_use = "dropping a handle releases its resource immediately"]
pub struct Handle<R, A: Release<R> = DropRelease> {
    // Always `Some` while the handle is alive; emptied only by `Drop` and
    // by consuming methods.
    resource: Option<R>,
    action: A,
}

impl<R, A: Release<R>> Handle<R, A> {
    /// Take ownership of `resource`, to be released through `action`.
    pub fn new(resource: R, action: A) -> Self {
        Self {
            resource: Some(resource),
            action,
        }
    }

    /// Release the resource now.
    pub fn release(self) {
        drop(self);
    }

    /// Take the resource out without running the release action.
    pub fn into_inner(mut self) -> R {
        self.action.forget();
        self.take()
    }

    /// The release action bound to this handle.
    pub fn action(&self) -> &A {
        &self.action
    }

    #[allow(clippy::expect_used)]
    fn slot(&self) -> &R {
        self.resource.as_ref().expect("live handle owns its resource")
    }

    #[allow(clippy::expect_used)]
    fn slot_mut(&mut self) -> &mut R {
        self.resource.as_mut().expect("live handle owns its resource")
    }

    #[allow(clippy::expect_used)]
    fn take(&mut self) -> R {
        self.resource.take().expect("live handle owns its resource")
    }
}

impl<R> Handle<R, DropRelease> {
    /// A handle that destroys the resource by dropping it.
    pub fn owned(resource: R) -> Self {
        Self::new(resource, DropRelease)
    }
}

impl<R, A: Release<R>> Deref for Handle<R, A> {
    type Target = R;

    fn deref(&self) -> &R {
        self.slot()
    }
}

impl<R, A: Release<R>> DerefMut for Handle<R, A> {
    fn deref_mut(&mut self) -> &mut R {
        self.slot_mut()
    }
}

impl<R, A: Release<R>> AsRef<R> for Handle<R, A> {
    fn as_ref(&self) -> &R {
        self.slot()
    }
}

impl<R, A: Release<R>> AsMut<R> for Handle<R, A> {
    fn as_mut(&mut self) -> &mut R {
        self.slot_mut()
    }
}

impl<R: fmt::Debug, A: Release<R>> fmt::Debug for Handle<R, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("resource", &self.resource)
            .finish_non_exhaustive()
    }
}

impl<R, A: Release<R>> Drop for Handle<R, A> {
    fn drop(&mut self) {
        if let Some(resource) = self.resource.take() {
            self.action.release(resource);
        }
    }
}
