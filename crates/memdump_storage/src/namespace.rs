//! Named shared-region namespace.

use crate::error::{StorageError, StorageResult};
use crate::ring::{ReaderHandle, Region, WriterHandle};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// A namespace of named regions with POSIX shared-memory semantics.
///
/// - `create` fails if the name is already linked
/// - `open_read` attaches a read-only handle to a linked region
/// - closing the writer unlinks the name; handles already attached keep
///   the region alive until they are dropped
///
/// Cloning a namespace yields another handle to the same set of names.
///
/// # Example
///
/// ```rust
/// use memdump_storage::ShmNamespace;
///
/// let ns = ShmNamespace::new();
/// let writer = ns.create("/buf-0", 4096).unwrap();
/// writer.append(b"event");
/// writer.flush();
///
/// let reader = ns.open_read("/buf-0").unwrap();
/// let frame = reader.read_from(0).next().unwrap().unwrap();
/// assert_eq!(frame.payload, b"event");
/// ```
#[derive(Debug, Clone, Default)]
pub struct ShmNamespace {
    inner: Arc<NamespaceInner>,
}

#[derive(Debug, Default)]
struct NamespaceInner {
    regions: Mutex<HashMap<String, Arc<Region>>>,
    /// Upper bound on the summed capacity of linked regions.
    limit: Option<u64>,
}

impl ShmNamespace {
    /// Creates an empty namespace with no size limit.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty namespace whose linked regions may not exceed
    /// `limit` bytes in total.
    #[must_use]
    pub fn with_limit(limit: u64) -> Self {
        Self {
            inner: Arc::new(NamespaceInner {
                regions: Mutex::new(HashMap::new()),
                limit: Some(limit),
            }),
        }
    }

    /// Creates and links a new region, returning its only writer.
    ///
    /// # Errors
    ///
    /// - [`StorageError::AlreadyExists`] if the name is linked
    /// - [`StorageError::ResourceExhausted`] if the namespace limit would be
    ///   exceeded or memory cannot be reserved
    /// - [`StorageError::InvalidCapacity`] if the capacity cannot hold a frame
    pub fn create(&self, name: &str, capacity: usize) -> StorageResult<WriterHandle> {
        let mut regions = self.inner.regions.lock();

        if regions.contains_key(name) {
            return Err(StorageError::AlreadyExists {
                name: name.to_string(),
            });
        }

        if let Some(limit) = self.inner.limit {
            let linked: u64 = regions.values().map(|r| r.capacity()).sum();
            if linked + capacity as u64 > limit {
                return Err(StorageError::ResourceExhausted {
                    name: name.to_string(),
                    requested: capacity as u64,
                });
            }
        }

        let region = Arc::new(Region::allocate(name, capacity)?);
        regions.insert(name.to_string(), Arc::clone(&region));
        Ok(WriterHandle::new(region, self.clone()))
    }

    /// Attaches a read-only handle to a linked region.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if no region is linked under `name`.
    pub fn open_read(&self, name: &str) -> StorageResult<ReaderHandle> {
        self.inner
            .regions
            .lock()
            .get(name)
            .map(|region| ReaderHandle::new(Arc::clone(region)))
            .ok_or_else(|| StorageError::NotFound {
                name: name.to_string(),
            })
    }

    /// Returns whether a region is linked under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.inner.regions.lock().contains_key(name)
    }

    /// Returns the number of linked regions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.regions.lock().len()
    }

    /// Returns whether no region is linked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Unlinks `region` if it is still the one linked under its name.
    pub(crate) fn unlink_region(&self, region: &Arc<Region>) {
        let mut regions = self.inner.regions.lock();
        let linked = regions
            .iter()
            .find(|(_, r)| Arc::ptr_eq(r, region))
            .map(|(name, _)| name.clone());
        if let Some(name) = linked {
            regions.remove(&name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_rejects_name_collision() {
        let ns = ShmNamespace::new();
        let _writer = ns.create("/a", 64).unwrap();
        assert!(matches!(
            ns.create("/a", 64),
            Err(StorageError::AlreadyExists { .. })
        ));
    }

    #[test]
    fn name_is_reusable_after_close() {
        let ns = ShmNamespace::new();
        let writer = ns.create("/a", 64).unwrap();
        writer.close();
        assert!(!ns.contains("/a"));
        assert!(ns.create("/a", 64).is_ok());
    }

    #[test]
    fn stale_close_does_not_unlink_replacement() {
        let ns = ShmNamespace::new();
        let old = ns.create("/a", 64).unwrap();
        old.close();
        let _new = ns.create("/a", 64).unwrap();
        old.close();
        assert!(ns.contains("/a"));
    }

    #[test]
    fn limit_is_enforced() {
        let ns = ShmNamespace::with_limit(100);
        let _a = ns.create("/a", 60).unwrap();
        let err = ns.create("/b", 60).unwrap_err();
        assert!(err.is_allocation_failure());
    }

    #[test]
    fn open_missing_fails() {
        let ns = ShmNamespace::new();
        assert!(matches!(
            ns.open_read("/missing"),
            Err(StorageError::NotFound { .. })
        ));
    }

    #[test]
    fn clones_share_names() {
        let ns = ShmNamespace::new();
        let other = ns.clone();
        let _writer = ns.create("/a", 64).unwrap();
        assert!(other.open_read("/a").is_ok());
        assert_eq!(other.len(), 1);
    }
}
