//! Exclusion domains.
//!
//! Every piece of shared state in the data path sits behind a [`Lock`] picked
//! by an [`ExclusionDomain`]. [`SpinDomain`] never sleeps and may be taken from
//! completion and timer callbacks. [`MutexDomain`] parks the waiting thread and
//! is meant for hosts where every caller is an ordinary thread.

pub trait Lock<T>: Send + Sync {
    fn new(value: T) -> Self;

    /// Runs `f` with exclusive access to the guarded value.
    fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R;
}

pub trait ExclusionDomain: 'static {
    type Guarded<T: Send>: Lock<T>;
}

pub struct SpinDomain;

impl ExclusionDomain for SpinDomain {
    type Guarded<T: Send> = SpinLock<T>;
}

pub struct MutexDomain;

impl ExclusionDomain for MutexDomain {
    type Guarded<T: Send> = MutexLock<T>;
}

pub struct SpinLock<T> {
    inner: spin::Mutex<T>,
}

impl<T: Send> Lock<T> for SpinLock<T> {
    fn new(value: T) -> Self {
        SpinLock {
            inner: spin::Mutex::new(value),
        }
    }

    #[inline]
    fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.inner.lock();
        f(&mut guard)
    }
}

pub struct MutexLock<T> {
    inner: parking_lot::Mutex<T>,
}

impl<T: Send> Lock<T> for MutexLock<T> {
    fn new(value: T) -> Self {
        MutexLock {
            inner: parking_lot::Mutex::new(value),
        }
    }

    #[inline]
    fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.inner.lock();
        f(&mut guard)
    }
}
