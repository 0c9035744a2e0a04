//! One guest instance shared between callers.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::runtime::GuestInstance;

/// A [`GuestInstance`] behind one exclusive lock.
///
/// Linear memory and the error channel are shared mutable state with no
/// call correlation, so every call holds the lock from allocation to the
/// final free. Cloning shares the same instance.
#[derive(Clone)]
pub struct SharedGuest {
    inner: Arc<Mutex<GuestInstance>>,
}

impl SharedGuest {
    /// Wrap an instance.
    pub fn new(guest: GuestInstance) -> Self {
        Self {
            inner: Arc::new(Mutex::new(guest)),
        }
    }

    /// Run `f` with exclusive access to the instance.
    pub fn with<R>(&self, f: impl FnOnce(&mut GuestInstance) -> R) -> R {
        let mut guest = self.inner.lock();
        f(&mut guest)
    }

    /// Take the instance back if this is the last reference.
    pub fn into_inner(self) -> Option<GuestInstance> {
        Arc::try_unwrap(self.inner).ok().map(Mutex::into_inner)
    }
}

impl From<GuestInstance> for SharedGuest {
    fn from(guest: GuestInstance) -> Self {
        Self::new(guest)
    }
}
