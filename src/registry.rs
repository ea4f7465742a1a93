//! Identity-keyed registry of assembled volumes.
//!
//! Repeated requests for the same series return the same
//! [`VolumeHandle`] instead of assembling it again. The registry is an
//! ordinary value: create one per application (or per test), share it
//! behind an `Arc`, and drop or [`clear`](VolumeRegistry::clear) it to
//! release the volumes it holds. Handles already handed out stay valid
//! after removal.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::volume::VolumeHandle;

#[derive(Debug, Default)]
pub struct VolumeRegistry {
    volumes: RwLock<HashMap<String, Arc<VolumeHandle>>>,
}

impl VolumeRegistry {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn get(&self, series: &str) -> Option<Arc<VolumeHandle>> {
        self.volumes.read().get(series).cloned()
    }

    /// Register `handle` for `series`, returning the handle it replaces.
    pub fn set(
        &self,
        series: impl Into<String>,
        handle: Arc<VolumeHandle>,
    ) -> Option<Arc<VolumeHandle>> {
        self.volumes.write().insert(series.into(), handle)
    }

    /// Return the registered handle, building and registering it first if
    /// `series` is unknown. `build` runs at most once per key.
    pub fn get_or_try_insert_with<E>(
        &self,
        series: &str,
        build: impl FnOnce() -> Result<VolumeHandle, E>,
    ) -> Result<Arc<VolumeHandle>, E> {
        if let Some(handle) = self.get(series) {
            return Ok(handle);
        }

        let mut volumes = self.volumes.write();
        if let Some(handle) = volumes.get(series) {
            return Ok(Arc::clone(handle));
        }
        debug!(series, "assembling new volume");
        let handle = Arc::new(build()?);
        volumes.insert(series.to_string(), Arc::clone(&handle));
        Ok(handle)
    }

    pub fn remove(&self, series: &str) -> Option<Arc<VolumeHandle>> {
        self.volumes.write().remove(series)
    }

    pub fn clear(&self) {
        self.volumes.write().clear();
    }

    pub fn len(&self) -> usize {
        self.volumes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.volumes.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VolumeConfig;
    use crate::error::VolumeError;
    use crate::metadata::{SliceEntry, SliceMetadata};

    fn build() -> Result<VolumeHandle, VolumeError> {
        let slices = vec![SliceEntry::new("only", SliceMetadata::new(2, 2))];
        VolumeHandle::build(&slices, &VolumeConfig::default())
    }

    #[test]
    fn returns_same_handle_for_same_series() {
        let registry = VolumeRegistry::new();
        let mut builds = 0;

        let first = registry
            .get_or_try_insert_with("series-1", || {
                builds += 1;
                build()
            })
            .unwrap();
        let second = registry
            .get_or_try_insert_with("series-1", || {
                builds += 1;
                build()
            })
            .unwrap();

        assert_eq!(builds, 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(&first, &registry.get("series-1").unwrap()));
    }

    #[test]
    fn failed_build_is_not_registered() {
        let registry = VolumeRegistry::new();
        let result = registry.get_or_try_insert_with("broken", || {
            VolumeHandle::build(&[], &VolumeConfig::default())
        });
        assert!(matches!(result, Err(VolumeError::NoSlices)));
        assert!(registry.is_empty());
    }

    #[test]
    fn set_remove_and_clear() {
        let registry = VolumeRegistry::new();
        let a = Arc::new(build().unwrap());
        let b = Arc::new(build().unwrap());

        assert!(registry.set("a", Arc::clone(&a)).is_none());
        let replaced = registry.set("a", Arc::clone(&b)).unwrap();
        assert!(Arc::ptr_eq(&replaced, &a));
        registry.set("b", Arc::clone(&b));
        assert_eq!(registry.len(), 2);

        assert!(registry.remove("a").is_some());
        assert!(registry.get("a").is_none());

        registry.clear();
        assert!(registry.is_empty());
        // handles handed out before clearing stay usable
        assert_eq!(b.slice_count(), 1);
    }

    #[test]
    fn registries_are_isolated() {
        let one = VolumeRegistry::new();
        let two = VolumeRegistry::new();
        one.set("series", Arc::new(build().unwrap()));
        assert!(two.get("series").is_none());
    }
}
