use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::batch::service::BatchService;

/// Accounting record of one granted lease. Surfaced to callers only inside
/// [`ServiceLease`], which returns it to the pool on drop.
#[derive(Debug)]
pub struct AccessToken {
    key: String,
}

struct PoolEntry<S: ?Sized> {
    service: Arc<S>,
    leases: u32,
    last_used: u64,
}

/// Bounded, usage-counted collection of homogeneous services.
///
/// The pool never grows past its eviction threshold: inserting into a full
/// pool evicts the least-recently-used entry that has no live lease. Inserts
/// are idempotent by service name.
pub struct ServicePool<S: BatchService + ?Sized> {
    entries: Vec<PoolEntry<S>>,
    eviction_threshold: usize,
    clock: u64,
}

impl<S: BatchService + ?Sized> ServicePool<S> {
    pub fn new(eviction_threshold: usize) -> Self {
        ServicePool {
            entries: Vec::new(),
            eviction_threshold,
            clock: 0,
        }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.service.name() == name)
    }

    /// Returns false when the service was already pooled or had to be dropped
    /// because the pool is full of leased entries.
    pub fn insert(&mut self, service: Arc<S>) -> bool {
        if self.position(service.name()).is_some() {
            return false;
        }
        if self.entries.len() >= self.eviction_threshold {
            let evictable = self
                .entries
                .iter()
                .enumerate()
                .filter(|(_, e)| e.leases == 0)
                .min_by_key(|(_, e)| e.last_used)
                .map(|(index, _)| index);
            match evictable {
                Some(index) => {
                    let evicted = self.entries.swap_remove(index);
                    log::debug!("Evicting service {} from the pool", evicted.service.name());
                }
                None => {
                    log::warn!(
                        "Dropping service {}, the pool is full and every entry is leased",
                        service.name()
                    );
                    return false;
                }
            }
        }
        self.clock += 1;
        self.entries.push(PoolEntry {
            service,
            leases: 0,
            last_used: self.clock,
        });
        true
    }

    /// Leases the least-loaded service; ties are broken towards the least
    /// recently used one.
    pub fn lease(&mut self) -> Option<(Arc<S>, AccessToken)> {
        self.clock += 1;
        let clock = self.clock;
        let entry = self
            .entries
            .iter_mut()
            .min_by_key(|e| (e.leases, e.last_used))?;
        entry.leases += 1;
        entry.last_used = clock;
        let token = AccessToken {
            key: entry.service.name().to_string(),
        };
        Some((entry.service.clone(), token))
    }

    pub fn release(&mut self, token: AccessToken) {
        match self.position(&token.key) {
            Some(index) => {
                let entry = &mut self.entries[index];
                entry.leases = entry.leases.saturating_sub(1);
            }
            // The service may have been evicted while the lease was out.
            None => log::debug!("Released a token of {}, which is no longer pooled", token.key),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn service_names(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|e| e.service.name().to_string())
            .collect()
    }
}

/// Shared handle to a [`ServicePool`]. Pool-shape mutation is linearized by a
/// single lock per pool; the critical sections never touch I/O.
pub struct SharedServicePool<S: BatchService + ?Sized> {
    inner: Arc<Mutex<ServicePool<S>>>,
}

impl<S: BatchService + ?Sized> Clone for SharedServicePool<S> {
    fn clone(&self) -> Self {
        SharedServicePool {
            inner: self.inner.clone(),
        }
    }
}

impl<S: BatchService + ?Sized> SharedServicePool<S> {
    pub fn new(eviction_threshold: usize) -> Self {
        SharedServicePool {
            inner: Arc::new(Mutex::new(ServicePool::new(eviction_threshold))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ServicePool<S>> {
        self.inner.lock().expect("service pool lock poisoned")
    }

    pub fn insert(&self, service: Arc<S>) -> bool {
        self.lock().insert(service)
    }

    pub fn lease(&self) -> Option<ServiceLease<S>> {
        let (service, token) = self.lock().lease()?;
        Some(ServiceLease {
            service,
            token: Some(token),
            pool: self.clone(),
        })
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lock().contains(name)
    }

    pub fn service_names(&self) -> Vec<String> {
        self.lock().service_names()
    }

    #[cfg(test)]
    pub(crate) fn lease_count(&self, name: &str) -> Option<u32> {
        let pool = self.lock();
        pool.entries
            .iter()
            .find(|e| e.service.name() == name)
            .map(|e| e.leases)
    }

    #[cfg(test)]
    pub(crate) fn clear(&self) {
        self.lock().entries.clear();
    }
}

/// Scoped lease of one pooled service; the access token is returned to the
/// pool when the lease is dropped.
pub struct ServiceLease<S: BatchService + ?Sized> {
    service: Arc<S>,
    token: Option<AccessToken>,
    pool: SharedServicePool<S>,
}

impl<S: BatchService + ?Sized> ServiceLease<S> {
    pub fn service(&self) -> &Arc<S> {
        &self.service
    }
}

impl<S: BatchService + ?Sized> std::fmt::Debug for ServiceLease<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceLease")
            .field("service", &self.service.name())
            .finish_non_exhaustive()
    }
}

impl<S: BatchService + ?Sized> Deref for ServiceLease<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.service
    }
}

impl<S: BatchService + ?Sized> Drop for ServiceLease<S> {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            self.pool.lock().release(token);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::batch::pool::SharedServicePool;
    use crate::batch::service::JobService;
    use crate::tests::utils::TestService;

    fn pool_of(threshold: usize, names: &[&str]) -> SharedServicePool<dyn JobService> {
        let pool = SharedServicePool::new(threshold);
        for name in names {
            pool.insert(TestService::alive(name) as Arc<dyn JobService>);
        }
        pool
    }

    #[test]
    fn test_insert_is_idempotent() {
        let pool = pool_of(4, &["a", "b"]);
        assert!(!pool.insert(TestService::alive("a")));
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_pool_bound_evicts_lru() {
        let pool = pool_of(2, &["a", "b"]);
        pool.insert(TestService::alive("c"));
        assert_eq!(pool.len(), 2);
        // "a" was the least recently used entry
        assert!(!pool.contains("a"));
        assert!(pool.contains("b"));
        assert!(pool.contains("c"));
    }

    #[test]
    fn test_eviction_skips_leased_entries() {
        let pool = pool_of(2, &["a", "b"]);
        let lease = pool.lease().unwrap();
        let leased = lease.name().to_string();
        pool.insert(TestService::alive("c"));
        assert_eq!(pool.len(), 2);
        assert!(pool.contains(&leased));
        assert!(pool.contains("c"));
    }

    #[test]
    fn test_insert_dropped_when_everything_is_leased() {
        let pool = pool_of(1, &["a"]);
        let _lease = pool.lease().unwrap();
        assert!(!pool.insert(TestService::alive("b")));
        assert_eq!(pool.service_names(), vec!["a".to_string()]);
    }

    #[test]
    fn test_lease_picks_least_loaded() {
        let pool = pool_of(2, &["a", "b"]);
        let first = pool.lease().unwrap();
        let second = pool.lease().unwrap();
        assert_ne!(first.name(), second.name());
    }

    #[test]
    fn test_lease_released_on_drop() {
        let pool = pool_of(2, &["a"]);
        {
            let lease = pool.lease().unwrap();
            assert_eq!(pool.lease_count(lease.name()), Some(1));
        }
        assert_eq!(pool.lease_count("a"), Some(0));
    }

    #[test]
    fn test_lease_on_empty_pool() {
        let pool: SharedServicePool<dyn JobService> = SharedServicePool::new(2);
        assert!(pool.lease().is_none());
    }
}
