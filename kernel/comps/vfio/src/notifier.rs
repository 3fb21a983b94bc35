// SPDX-License-Identifier: MPL-2.0

//! The guest-IOMMU notifier (GIN): translates guest IOTLB invalidations into
//! backend `map`/`unmap` calls on its owning container.

use alloc::sync::Arc;

use bitflags::bitflags;
use log::{error, warn};

use crate::{
    backend::IommuBackend,
    section::{AddressSpaceModel, IotlbEntry, IotlbPerm, MemoryRegion, RegionId},
};

bitflags! {
    /// Which half of the MAP/UNMAP pair a notifier reacts to.
    #[derive(Default)]
    pub struct NotifierFlags: u32 {
        const MAP = 1 << 0;
        const UNMAP = 1 << 1;
    }
}

/// A registered guest-IOMMU notifier subscription.
pub struct GuestIommuNotifier {
    region: Arc<dyn MemoryRegion>,
    /// `section.offset_within_address_space - section.offset_within_region`.
    iommu_offset: u64,
    start: u64,
    end: u64,
    flags: NotifierFlags,
    nested: bool,
}

impl GuestIommuNotifier {
    /// Creates a notifier for `region`, covering `[start, end]` within the
    /// region, with flags derived from whether the owning container is in
    /// nested mode: nested containers get UNMAP-only
    /// (cache-invalidate propagation); non-nested containers get MAP+UNMAP
    /// (resolve-and-map / unmap).
    pub fn new(
        region: Arc<dyn MemoryRegion>,
        iommu_offset: u64,
        start: u64,
        end: u64,
        nested: bool,
    ) -> Self {
        let flags = if nested {
            NotifierFlags::UNMAP
        } else {
            NotifierFlags::MAP | NotifierFlags::UNMAP
        };
        Self {
            region,
            iommu_offset,
            start,
            end,
            flags,
            nested,
        }
    }

    /// Creates a transient MAP-only notifier used by `log_sync`'s replay
    /// its lifetime must end strictly inside the sync call.
    pub fn transient_map_only(region: Arc<dyn MemoryRegion>, iommu_offset: u64) -> Self {
        Self {
            region,
            iommu_offset,
            start: 0,
            end: u64::MAX,
            flags: NotifierFlags::MAP,
            nested: false,
        }
    }

    /// The identity half used for removal lookups: `(region id, start)`.
    pub fn identity(&self) -> (RegionId, u64) {
        (self.region.id(), self.start)
    }

    pub fn region(&self) -> &Arc<dyn MemoryRegion> {
        &self.region
    }

    pub fn flags(&self) -> NotifierFlags {
        self.flags
    }

    /// Dispatches a single IOTLB entry to `backend`, either resolving and
    /// mapping it (non-nested) or forwarding a cache invalidation (nested).
    /// Errors are logged and swallowed: the notifier
    /// itself never fails the enclosing event.
    pub fn handle_entry(&self, entry: IotlbEntry, model: &dyn AddressSpaceModel, backend: &dyn IommuBackend) {
        if !entry.target_as_is_system {
            return;
        }
        if self.nested {
            self.handle_nested(entry);
            return;
        }
        let iova = entry.iova.wrapping_add(self.iommu_offset);
        let size = entry.addr_mask.wrapping_add(1);
        if entry.perm.intersects(IotlbPerm::READ | IotlbPerm::WRITE) {
            let Some(result) = model.translate(entry.iova, entry.addr_mask) else {
                return;
            };
            if result.has_discard_manager {
                warn_once_pinned_memory();
            }
            let readonly = result.readonly || !entry.perm.contains(IotlbPerm::WRITE);
            if let Err(e) = backend.map(iova, size, result.vaddr, readonly) {
                error!("GIN: map({iova:#x}, {size:#x}) failed: {e}");
            }
        } else if let Err(e) = backend.unmap(iova, size, None) {
            error!("GIN: unmap({iova:#x}, {size:#x}) failed: {e}");
        }
    }

    /// Resolves a single IOTLB entry and queries its dirty state during a
    /// `log_sync` pass, instead of mapping or unmapping it. Used only by a
    /// transient notifier installed for the duration of one sync call.
    pub fn handle_entry_for_dirty_sync(&self, entry: IotlbEntry, model: &dyn AddressSpaceModel, backend: &dyn IommuBackend) {
        if !entry.target_as_is_system || !entry.perm.intersects(IotlbPerm::READ | IotlbPerm::WRITE) {
            return;
        }
        let iova = entry.iova.wrapping_add(self.iommu_offset);
        let size = entry.addr_mask.wrapping_add(1);
        let Some(result) = model.translate(entry.iova, entry.addr_mask) else {
            return;
        };
        if let Err(e) = backend.get_dirty_bitmap(iova, size, result.ram_addr) {
            warn!("log_sync: get_dirty_bitmap({iova:#x}, {size:#x}) failed: {e}");
        }
    }

    /// Nested mode propagates the invalidation as a cache-invalidate
    /// down-call instead of an unmap — the host IOMMU walks the guest page
    /// table in hardware, so the VMM only forwards the invalidation.
    fn handle_nested(&self, entry: IotlbEntry) {
        self.region.invalidate_iommu_cache(entry.iova, entry.addr_mask);
    }
}

/// A one-shot guard so the pinned-memory warning fires at most once per
/// process rather than once per mapping.
fn warn_once_pinned_memory() {
    use core::sync::atomic::{AtomicBool, Ordering};
    static WARNED: AtomicBool = AtomicBool::new(false);
    if WARNED
        .compare_exchange(false, true, Ordering::Relaxed, Ordering::Relaxed)
        .is_ok()
    {
        warn!(
            "mapping a RAM-discard-managed region for DMA pins its guest pages; \
             a malicious guest may inflate pinned-memory accounting. Raise the \
             process' memory-lock limit if device assignment requires it."
        );
    }
}

#[cfg(test)]
mod tests {
    use alloc::sync::Arc;

    use super::*;
    use crate::section::{RegionId, TranslateResult};

    struct Region;
    impl MemoryRegion for Region {
        fn id(&self) -> RegionId {
            1
        }
        fn take_ref(&self) {}
        fn unref(&self) {}
        fn host_ptr(&self) -> Option<*mut u8> {
            None
        }
        fn ram_addr(&self) -> Option<u64> {
            None
        }
    }

    struct Model {
        resolves: bool,
    }
    impl AddressSpaceModel for Model {
        fn translate(&self, _iova: u64, _addr_mask: u64) -> Option<TranslateResult> {
            self.resolves.then_some(TranslateResult {
                vaddr: core::ptr::null_mut(),
                ram_addr: 0,
                readonly: false,
                has_discard_manager: false,
            })
        }
        fn replay(&self, _region: &dyn MemoryRegion, _notify: &mut dyn FnMut(IotlbEntry)) {}
    }

    struct RecordingBackend {
        maps: spin::Mutex<alloc::vec::Vec<(u64, u64)>>,
        unmaps: spin::Mutex<alloc::vec::Vec<(u64, u64)>>,
        dirty_queries: spin::Mutex<alloc::vec::Vec<(u64, u64, u64)>>,
    }
    impl RecordingBackend {
        fn new() -> Self {
            Self {
                maps: spin::Mutex::new(alloc::vec::Vec::new()),
                unmaps: spin::Mutex::new(alloc::vec::Vec::new()),
                dirty_queries: spin::Mutex::new(alloc::vec::Vec::new()),
            }
        }
    }
    impl IommuBackend for RecordingBackend {
        fn check_feature(&self, _f: crate::backend::BackendFeature) -> bool {
            false
        }
        fn map(&self, iova: u64, size: u64, _vaddr: *mut u8, _ro: bool) -> crate::error::Result<()> {
            self.maps.lock().push((iova, size));
            Ok(())
        }
        fn unmap(&self, iova: u64, size: u64, _hint: Option<crate::backend::IotlbHint>) -> crate::error::Result<()> {
            self.unmaps.lock().push((iova, size));
            Ok(())
        }
        fn get_dirty_bitmap(&self, iova: u64, size: u64, ram_addr: u64) -> crate::error::Result<()> {
            self.dirty_queries.lock().push((iova, size, ram_addr));
            Ok(())
        }
        fn set_dirty_tracking(&self, _e: bool) -> crate::error::Result<()> {
            Ok(())
        }
        fn reset(&self) -> crate::error::Result<()> {
            Ok(())
        }
        fn attach_device(&self, _d: crate::backend::DeviceHandle) -> crate::error::Result<()> {
            Ok(())
        }
        fn detach_device(&self, _d: crate::backend::DeviceHandle) -> crate::error::Result<()> {
            Ok(())
        }
        fn devices_all_dirty_tracking(&self) -> bool {
            true
        }
        fn max_mappings(&self) -> Option<u32> {
            None
        }
    }

    #[test]
    fn non_nested_map_perm_maps() {
        let gin = GuestIommuNotifier::new(Arc::new(Region), 0, 0, 0xffff, false);
        let model = Model { resolves: true };
        let backend = RecordingBackend::new();
        let entry = IotlbEntry {
            iova: 0x1000,
            addr_mask: 0xfff,
            perm: IotlbPerm::READ,
            target_as_is_system: true,
        };
        gin.handle_entry(entry, &model, &backend);
        assert_eq!(backend.maps.lock().as_slice(), &[(0x1000, 0x1000)]);
        assert!(backend.unmaps.lock().is_empty());
    }

    #[test]
    fn non_nested_no_perm_unmaps() {
        let gin = GuestIommuNotifier::new(Arc::new(Region), 0, 0, 0xffff, false);
        let model = Model { resolves: true };
        let backend = RecordingBackend::new();
        let entry = IotlbEntry {
            iova: 0x1000,
            addr_mask: 0xfff,
            perm: IotlbPerm::empty(),
            target_as_is_system: true,
        };
        gin.handle_entry(entry, &model, &backend);
        assert_eq!(backend.unmaps.lock().as_slice(), &[(0x1000, 0x1000)]);
        assert!(backend.maps.lock().is_empty());
    }

    #[test]
    fn foreign_address_space_is_ignored() {
        let gin = GuestIommuNotifier::new(Arc::new(Region), 0, 0, 0xffff, false);
        let model = Model { resolves: true };
        let backend = RecordingBackend::new();
        let entry = IotlbEntry {
            iova: 0x1000,
            addr_mask: 0xfff,
            perm: IotlbPerm::READ,
            target_as_is_system: false,
        };
        gin.handle_entry(entry, &model, &backend);
        assert!(backend.maps.lock().is_empty());
    }

    #[test]
    fn dirty_sync_queries_bitmap_instead_of_mapping() {
        let gin = GuestIommuNotifier::transient_map_only(Arc::new(Region), 0);
        let model = Model { resolves: true };
        let backend = RecordingBackend::new();
        let entry = IotlbEntry {
            iova: 0x1000,
            addr_mask: 0xfff,
            perm: IotlbPerm::READ,
            target_as_is_system: true,
        };
        gin.handle_entry_for_dirty_sync(entry, &model, &backend);
        assert_eq!(backend.dirty_queries.lock().as_slice(), &[(0x1000, 0x1000, 0)]);
        assert!(backend.maps.lock().is_empty());
    }

    #[test]
    fn unresolvable_translation_is_ignored() {
        let gin = GuestIommuNotifier::new(Arc::new(Region), 0, 0, 0xffff, false);
        let model = Model { resolves: false };
        let backend = RecordingBackend::new();
        let entry = IotlbEntry {
            iova: 0x1000,
            addr_mask: 0xfff,
            perm: IotlbPerm::READ,
            target_as_is_system: true,
        };
        gin.handle_entry(entry, &model, &backend);
        assert!(backend.maps.lock().is_empty());
    }
}
