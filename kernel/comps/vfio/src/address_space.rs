// SPDX-License-Identifier: MPL-2.0

//! The address-space binding registry (ASB): the process-wide map from a
//! VMM address space to the ordered list of [`Container`]s attached to it.

use alloc::{sync::Arc, vec::Vec};

use ostd::sync::{Mutex, RwLock};

use crate::container::Container;

/// An opaque identity for a VMM address space, stable for the lifetime of
/// the address space (in practice, derived from the `AddressSpaceModel`
/// instance's pointer value).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressSpaceId(u64);

impl AddressSpaceId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// One binding: the ordered list of containers attached to a single address
/// space, and the memory listener's install state.
///
/// Every container in the list observes the same stream of `region_add`/
/// `region_del` events (the memory listener fans out to all of them); the
/// list is kept in most-recently-attached-first order so a DMA-copy fan-out
/// can treat earlier-registered containers as candidate copy sources.
pub struct AddressSpaceBinding {
    address_space: AddressSpaceId,
    containers: Vec<Arc<Mutex<Container>>>,
    listener_installed: bool,
}

impl AddressSpaceBinding {
    fn new(address_space: AddressSpaceId) -> Self {
        Self {
            address_space,
            containers: Vec::new(),
            listener_installed: false,
        }
    }

    pub fn address_space(&self) -> AddressSpaceId {
        self.address_space
    }

    pub fn containers(&self) -> &[Arc<Mutex<Container>>] {
        &self.containers
    }

    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }

    pub fn listener_installed(&self) -> bool {
        self.listener_installed
    }

    /// Inserts `container` at the head of this binding's container list. If
    /// a listener was already installed for this binding, it is unregistered
    /// first and a fresh one installed, so the listener's fan-out reflects
    /// the new container set from the next event onward.
    pub fn attach_container(&mut self, container: Arc<Mutex<Container>>) {
        if self.listener_installed {
            self.listener_installed = false;
        }
        self.containers.insert(0, container);
        self.listener_installed = true;
    }

    /// Removes `container` from this binding's list. Uninstalls the listener
    /// if the binding is now empty.
    pub fn detach_container(&mut self, container: &Arc<Mutex<Container>>) {
        self.containers.retain(|c| !Arc::ptr_eq(c, container));
        if self.containers.is_empty() {
            self.listener_installed = false;
        }
    }
}

/// The process-wide registry of address-space bindings.
#[derive(Default)]
pub struct AddressSpaceRegistry {
    bindings: RwLock<Vec<Arc<Mutex<AddressSpaceBinding>>>>,
}

impl AddressSpaceRegistry {
    pub fn new() -> Self {
        Self {
            bindings: RwLock::new(Vec::new()),
        }
    }

    /// Returns the existing binding for `address_space`, creating an empty
    /// one if none exists yet.
    pub fn get_or_create(&self, address_space: AddressSpaceId) -> Arc<Mutex<AddressSpaceBinding>> {
        let mut bindings = self.bindings.write();
        if let Some(binding) = bindings
            .iter()
            .find(|b| b.lock().address_space() == address_space)
        {
            return binding.clone();
        }
        let binding = Arc::new(Mutex::new(AddressSpaceBinding::new(address_space)));
        bindings.push(binding.clone());
        binding
    }

    /// Looks up the binding for `address_space`, for read-only inspection.
    pub fn lookup(&self, address_space: AddressSpaceId) -> Option<Arc<Mutex<AddressSpaceBinding>>> {
        self.bindings
            .read()
            .iter()
            .find(|b| b.lock().address_space() == address_space)
            .cloned()
    }

    /// Clones out every registered binding, for callers (e.g. a global reset
    /// hook) that need to walk all containers without holding the registry
    /// lock across blocking backend calls.
    pub fn bindings(&self) -> Vec<Arc<Mutex<AddressSpaceBinding>>> {
        self.bindings.read().clone()
    }

    /// Removes `address_space`'s binding entry once its container list is
    /// empty. A no-op if the binding still has containers attached or is
    /// already gone.
    pub fn put_binding(&self, address_space: AddressSpaceId) {
        let mut bindings = self.bindings.write();
        let Some(pos) = bindings
            .iter()
            .position(|b| b.lock().address_space() == address_space)
        else {
            return;
        };
        if bindings[pos].lock().is_empty() {
            bindings.remove(pos);
        }
    }

    pub fn len(&self) -> usize {
        self.bindings.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendFeature, DeviceHandle, IotlbHint};
    use crate::container::DEFAULT_PGSIZES;
    use crate::error::Result;

    struct NullBackend;
    impl crate::backend::IommuBackend for NullBackend {
        fn check_feature(&self, _f: BackendFeature) -> bool {
            false
        }
        fn map(&self, _iova: u64, _size: u64, _vaddr: *mut u8, _ro: bool) -> Result<()> {
            Ok(())
        }
        fn unmap(&self, _iova: u64, _size: u64, _hint: Option<IotlbHint>) -> Result<()> {
            Ok(())
        }
        fn get_dirty_bitmap(&self, _i: u64, _s: u64, _r: u64) -> Result<()> {
            Ok(())
        }
        fn set_dirty_tracking(&self, _e: bool) -> Result<()> {
            Ok(())
        }
        fn reset(&self) -> Result<()> {
            Ok(())
        }
        fn attach_device(&self, _d: DeviceHandle) -> Result<()> {
            Ok(())
        }
        fn detach_device(&self, _d: DeviceHandle) -> Result<()> {
            Ok(())
        }
        fn devices_all_dirty_tracking(&self) -> bool {
            true
        }
        fn max_mappings(&self) -> Option<u32> {
            None
        }
    }

    fn container() -> Arc<Mutex<Container>> {
        Arc::new(Mutex::new(Container::new(Arc::new(NullBackend), false, DEFAULT_PGSIZES)))
    }

    #[test]
    fn get_or_create_reuses_existing_binding() {
        let registry = AddressSpaceRegistry::new();
        let a = registry.get_or_create(AddressSpaceId::new(1));
        let b = registry.get_or_create(AddressSpaceId::new(1));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn distinct_address_spaces_get_distinct_bindings() {
        let registry = AddressSpaceRegistry::new();
        let a = registry.get_or_create(AddressSpaceId::new(1));
        let b = registry.get_or_create(AddressSpaceId::new(2));
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn attach_container_inserts_at_head_and_installs_listener() {
        let binding = Arc::new(Mutex::new(AddressSpaceBinding::new(AddressSpaceId::new(1))));
        let first = container();
        let second = container();
        binding.lock().attach_container(first.clone());
        assert!(binding.lock().listener_installed());
        binding.lock().attach_container(second.clone());
        assert!(binding.lock().listener_installed());
        let guard = binding.lock();
        assert_eq!(guard.containers().len(), 2);
        assert!(Arc::ptr_eq(&guard.containers()[0], &second));
        assert!(Arc::ptr_eq(&guard.containers()[1], &first));
    }

    #[test]
    fn detach_container_uninstalls_listener_once_empty() {
        let binding = Arc::new(Mutex::new(AddressSpaceBinding::new(AddressSpaceId::new(1))));
        let c = container();
        binding.lock().attach_container(c.clone());
        assert!(binding.lock().listener_installed());
        binding.lock().detach_container(&c);
        assert!(binding.lock().is_empty());
        assert!(!binding.lock().listener_installed());
    }

    #[test]
    fn detach_container_keeps_listener_while_siblings_remain() {
        let binding = Arc::new(Mutex::new(AddressSpaceBinding::new(AddressSpaceId::new(1))));
        let first = container();
        let second = container();
        binding.lock().attach_container(first.clone());
        binding.lock().attach_container(second.clone());
        binding.lock().detach_container(&first);
        assert!(binding.lock().listener_installed());
        assert_eq!(binding.lock().containers().len(), 1);
    }

    #[test]
    fn put_binding_keeps_entry_while_nonempty() {
        let registry = AddressSpaceRegistry::new();
        let binding = registry.get_or_create(AddressSpaceId::new(1));
        binding.lock().attach_container(container());
        registry.put_binding(AddressSpaceId::new(1));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn put_binding_removes_entry_once_empty() {
        let registry = AddressSpaceRegistry::new();
        registry.get_or_create(AddressSpaceId::new(1));
        registry.put_binding(AddressSpaceId::new(1));
        assert!(registry.is_empty());
    }

    #[test]
    fn bindings_snapshot_reflects_registered_set() {
        let registry = AddressSpaceRegistry::new();
        registry.get_or_create(AddressSpaceId::new(1));
        registry.get_or_create(AddressSpaceId::new(2));
        assert_eq!(registry.bindings().len(), 2);
    }
}
