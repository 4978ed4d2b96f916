//! Mutex-protected FIFO container shared between the daemon and callers

use std::collections::VecDeque;
use tokio::sync::{Mutex, MutexGuard};

/// Ordered collection guarded by a single mutex.
///
/// Every method takes the lock for its own duration only. Compound
/// operations that must not interleave with other callers go through
/// [`LockedQueue::lock`], whose guard exposes the same operations on the
/// already-locked contents. Nothing here waits for content to appear:
/// `pop_front` on an empty queue returns `None` at once.
#[derive(Debug)]
pub struct LockedQueue<T> {
    inner: Mutex<VecDeque<T>>,
}

impl<T> Default for LockedQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> LockedQueue<T> {
    /// Create an empty queue
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
        }
    }

    /// Append at the back
    pub async fn push_back(&self, value: T) {
        self.inner.lock().await.push_back(value);
    }

    /// Remove and return the oldest element
    pub async fn pop_front(&self) -> Option<T> {
        self.inner.lock().await.pop_front()
    }

    /// Replace the element at `index`, returning the previous one
    pub async fn set(&self, index: usize, value: T) -> Option<T> {
        let mut inner = self.inner.lock().await;
        inner
            .get_mut(index)
            .map(|slot| std::mem::replace(slot, value))
    }

    /// Remove the element at `index`
    pub async fn remove(&self, index: usize) -> Option<T> {
        self.inner.lock().await.remove(index)
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }

    /// Hold the lock across several operations. Dropping the guard unlocks.
    pub async fn lock(&self) -> LockedQueueGuard<'_, T> {
        LockedQueueGuard {
            inner: self.inner.lock().await,
        }
    }
}

impl<T: Clone> LockedQueue<T> {
    /// Clone of the element at `index`
    pub async fn get(&self, index: usize) -> Option<T> {
        self.inner.lock().await.get(index).cloned()
    }

    /// Ordered copy of the current contents
    pub async fn snapshot(&self) -> Vec<T> {
        self.inner.lock().await.iter().cloned().collect()
    }
}

impl<T> FromIterator<T> for LockedQueue<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            inner: Mutex::new(iter.into_iter().collect()),
        }
    }
}

/// Lock-held view of a [`LockedQueue`]
pub struct LockedQueueGuard<'a, T> {
    inner: MutexGuard<'a, VecDeque<T>>,
}

impl<T> LockedQueueGuard<'_, T> {
    pub fn push_back(&mut self, value: T) {
        self.inner.push_back(value);
    }

    pub fn pop_front(&mut self) -> Option<T> {
        self.inner.pop_front()
    }

    pub fn remove(&mut self, index: usize) -> Option<T> {
        self.inner.remove(index)
    }

    /// Index of the first element matching `predicate`
    pub fn position<P>(&self, predicate: P) -> Option<usize>
    where
        P: FnMut(&T) -> bool,
    {
        self.inner.iter().position(predicate)
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.inner.iter()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl<T: Clone> LockedQueueGuard<'_, T> {
    /// Ordered copy of the contents, without re-locking
    pub fn snapshot(&self) -> Vec<T> {
        self.inner.iter().cloned().collect()
    }
}
