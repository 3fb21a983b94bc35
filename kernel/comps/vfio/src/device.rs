// SPDX-License-Identifier: MPL-2.0

//! The device attach/detach controller (DAC): resolves a device to its
//! address space's binding, selects or reuses a [`Container`], and binds or
//! unbinds the device against that container's backend.

use alloc::sync::Arc;

use ostd::sync::Mutex;

use crate::{
    address_space::{AddressSpaceId, AddressSpaceRegistry},
    backend::{DeviceHandle, IommuBackend},
    container::Container,
    context,
    error::Result,
};

/// Attaches `device` to `address_space`'s binding in `registry`.
///
/// A container is reused if one already attached to this binding was built
/// from a backend of the same class as the one `wants_fd_based` asks for
/// (determined by `fd_token().is_some()`, since a legacy backend never
/// reports one); otherwise `make_backend` is called to build a fresh
/// backend and a new container is attached to the binding. On first
/// successful attach into a newly-created nested container, the
/// nested-mode pre-registration listener is installed.
///
/// Disables uncoordinated RAM discard for the process for as long as any
/// device remains attached anywhere (see
/// [`crate::context::disable_uncoordinated_discard`]).
pub fn attach_device(
    registry: &AddressSpaceRegistry,
    address_space: AddressSpaceId,
    device: DeviceHandle,
    wants_fd_based: bool,
    nested: bool,
    pgsizes: u64,
    make_backend: impl FnOnce() -> Arc<dyn IommuBackend>,
) -> Result<Arc<Mutex<Container>>> {
    let binding = registry.get_or_create(address_space);

    let existing = binding
        .lock()
        .containers()
        .iter()
        .find(|c| c.lock().backend().fd_token().is_some() == wants_fd_based)
        .cloned();

    let (container, newly_created) = match existing {
        Some(container) => (container, false),
        None => {
            let container = Arc::new(Mutex::new(Container::new(make_backend(), nested, pgsizes)));
            binding.lock().attach_container(container.clone());
            (container, true)
        }
    };

    if newly_created && nested {
        container.lock().install_pre_registration_listener();
    }

    {
        let mut guard = container.lock();
        guard.check_not_broken()?;
        if let Err(e) = guard.backend().attach_device(device) {
            guard.latch_error(e.kind());
            if newly_created {
                drop(guard);
                binding.lock().detach_container(&container);
                registry.put_binding(address_space);
            }
            return Err(e);
        }
        guard.inc_device_count();
    }

    context::disable_uncoordinated_discard();
    Ok(container)
}

/// Detaches `device` from `container`'s backend. Unlike attach, detach is
/// attempted even on a latched-broken container: a broken backend should
/// still release whatever resources it can.
///
/// Once `container`'s device count reaches zero it is reset, detached from
/// `address_space`'s binding, and the binding itself is dropped from
/// `registry` if it is now empty.
pub fn detach_device(
    registry: &AddressSpaceRegistry,
    address_space: AddressSpaceId,
    container: &Arc<Mutex<Container>>,
    device: DeviceHandle,
) -> Result<()> {
    let result = container.lock().backend().detach_device(device);

    let remaining = container.lock().dec_device_count();
    context::enable_uncoordinated_discard();

    if remaining == 0 {
        let _ = reset_container(&container.lock());
        if let Some(binding) = registry.lookup(address_space) {
            binding.lock().detach_container(container);
            registry.put_binding(address_space);
        }
    }

    result
}

/// Resets every device on `container`, continuing past individual device
/// failures and returning the last observed error (mirrors
/// [`crate::backend::IommuBackend::reset`]'s own contract, since the backend
/// itself owns the device list).
pub fn reset_container(container: &Container) -> Result<()> {
    container.backend().reset()
}

/// Resets every container attached to any binding in `registry`, continuing
/// past individual container failures and returning the last observed
/// error.
pub fn reset_all(registry: &AddressSpaceRegistry) -> Result<()> {
    let mut last_err = Ok(());
    for binding in registry.bindings() {
        let containers = binding.lock().containers().to_vec();
        for container in containers {
            if let Err(e) = reset_container(&container.lock()) {
                last_err = Err(e);
            }
        }
    }
    last_err
}

#[cfg(test)]
mod tests {
    use alloc::sync::Arc;

    use super::*;
    use crate::backend::{BackendFeature, IotlbHint};
    use crate::container::DEFAULT_PGSIZES;
    use crate::error::{Error, ErrorKind};

    struct FlakyBackend {
        fail_attach: bool,
        fd_token: Option<u64>,
    }
    impl IommuBackend for FlakyBackend {
        fn check_feature(&self, _f: BackendFeature) -> bool {
            false
        }
        fn map(&self, _iova: u64, _size: u64, _vaddr: *mut u8, _ro: bool) -> Result<()> {
            Ok(())
        }
        fn fd_token(&self) -> Option<u64> {
            self.fd_token
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
            if self.fail_attach {
                Err(Error::new(ErrorKind::Internal))
            } else {
                Ok(())
            }
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

    fn legacy(fail_attach: bool) -> Arc<dyn IommuBackend> {
        Arc::new(FlakyBackend {
            fail_attach,
            fd_token: None,
        })
    }

    fn fd_based(fail_attach: bool, token: u64) -> Arc<dyn IommuBackend> {
        Arc::new(FlakyBackend {
            fail_attach,
            fd_token: Some(token),
        })
    }

    #[test]
    fn failed_attach_latches_container_and_tears_it_down() {
        let registry = AddressSpaceRegistry::new();
        let address_space = AddressSpaceId::new(1);
        let err = attach_device(&registry, address_space, DeviceHandle(1), false, false, DEFAULT_PGSIZES, || {
            legacy(true)
        })
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(registry.is_empty(), "a container that never attached a device is torn back down");
    }

    #[test]
    fn successful_attach_creates_a_container_and_counts_the_device() {
        let registry = AddressSpaceRegistry::new();
        let address_space = AddressSpaceId::new(1);
        let container = attach_device(&registry, address_space, DeviceHandle(1), false, false, DEFAULT_PGSIZES, || {
            legacy(false)
        })
        .unwrap();
        assert_eq!(container.lock().device_count(), 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn second_device_of_the_same_backend_class_reuses_the_container() {
        let registry = AddressSpaceRegistry::new();
        let address_space = AddressSpaceId::new(1);
        let first = attach_device(&registry, address_space, DeviceHandle(1), true, false, DEFAULT_PGSIZES, || {
            fd_based(false, 7)
        })
        .unwrap();
        let second = attach_device(&registry, address_space, DeviceHandle(2), true, false, DEFAULT_PGSIZES, || {
            fd_based(false, 8)
        })
        .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.lock().device_count(), 2);
    }

    #[test]
    fn mismatched_backend_class_gets_its_own_container() {
        let registry = AddressSpaceRegistry::new();
        let address_space = AddressSpaceId::new(1);
        let fd = attach_device(&registry, address_space, DeviceHandle(1), true, false, DEFAULT_PGSIZES, || {
            fd_based(false, 7)
        })
        .unwrap();
        let legacy_container = attach_device(&registry, address_space, DeviceHandle(2), false, false, DEFAULT_PGSIZES, || {
            legacy(false)
        })
        .unwrap();
        assert!(!Arc::ptr_eq(&fd, &legacy_container));
    }

    #[test]
    fn nested_attach_installs_pre_registration_listener_once() {
        let registry = AddressSpaceRegistry::new();
        let address_space = AddressSpaceId::new(1);
        let container = attach_device(&registry, address_space, DeviceHandle(1), false, true, DEFAULT_PGSIZES, || {
            legacy(false)
        })
        .unwrap();
        assert!(container.lock().pre_registration_listener().unwrap().installed());
    }

    #[test]
    fn detach_last_device_tears_down_container_and_binding() {
        let registry = AddressSpaceRegistry::new();
        let address_space = AddressSpaceId::new(1);
        let container = attach_device(&registry, address_space, DeviceHandle(1), false, false, DEFAULT_PGSIZES, || {
            legacy(false)
        })
        .unwrap();
        detach_device(&registry, address_space, &container, DeviceHandle(1)).unwrap();
        assert_eq!(container.lock().device_count(), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn detach_with_siblings_keeps_the_container() {
        let registry = AddressSpaceRegistry::new();
        let address_space = AddressSpaceId::new(1);
        let container = attach_device(&registry, address_space, DeviceHandle(1), true, false, DEFAULT_PGSIZES, || {
            fd_based(false, 1)
        })
        .unwrap();
        attach_device(&registry, address_space, DeviceHandle(2), true, false, DEFAULT_PGSIZES, || {
            fd_based(false, 1)
        })
        .unwrap();
        detach_device(&registry, address_space, &container, DeviceHandle(1)).unwrap();
        assert_eq!(container.lock().device_count(), 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn detach_is_attempted_even_when_broken() {
        let registry = AddressSpaceRegistry::new();
        let address_space = AddressSpaceId::new(1);
        let result = attach_device(&registry, address_space, DeviceHandle(1), false, false, DEFAULT_PGSIZES, || {
            legacy(true)
        });
        assert!(result.is_err());
        // Even though attach failed and the container was torn down, a
        // caller that still holds the backend directly should be able to
        // detach without panicking.
        let container = Arc::new(Mutex::new(Container::new(legacy(true), false, DEFAULT_PGSIZES)));
        assert!(detach_device(&registry, address_space, &container, DeviceHandle(1)).is_ok());
    }

    #[test]
    fn reset_all_walks_every_binding() {
        let registry = AddressSpaceRegistry::new();
        attach_device(&registry, AddressSpaceId::new(1), DeviceHandle(1), false, false, DEFAULT_PGSIZES, || {
            legacy(false)
        })
        .unwrap();
        attach_device(&registry, AddressSpaceId::new(2), DeviceHandle(2), false, false, DEFAULT_PGSIZES, || {
            legacy(false)
        })
        .unwrap();
        assert!(reset_all(&registry).is_ok());
    }
}
