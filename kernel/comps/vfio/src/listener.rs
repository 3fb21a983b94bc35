// SPDX-License-Identifier: MPL-2.0

//! The memory listener pipeline (MLP): `region_add`, `region_del`,
//! `log_global_start`/`log_global_stop`, and `log_sync` — the entry points
//! the VMM's address-space model calls into on every topology change.

use alloc::{sync::Arc, vec::Vec};

use log::{error, warn};

use crate::{
    address_space::AddressSpaceBinding,
    backend::{BackendFeature, IommuBackend},
    container::Container,
    discard::RamDiscardListener,
    error::{Error, ErrorKind, Result},
    notifier::GuestIommuNotifier,
    section::{AddressSpaceModel, IotlbEntry, RamDiscardManager, Section, SectionFlags},
};

/// Runs the `region_add` algorithm against a single `container`.
///
/// Scenario coverage: a plain RAM section installs a host DMA window and
/// maps it (or, if an earlier container in the same fan-out already mapped
/// it and both backends share a kernel fd, DMA-copies it instead); a vIOMMU
/// region installs a [`GuestIommuNotifier`] instead of mapping anything
/// directly; a RAM-discard-managed region installs a [`RamDiscardListener`]
/// and populates only its currently-resident sub-ranges; a misaligned,
/// non-allow-listed section is rejected; a section outside every host
/// window established for this container is rejected with
/// [`ErrorKind::NoWindow`].
///
/// `copy_sources` accumulates every backend that has fully `map`-ped this
/// exact section earlier in the same `region_add` fan-out (see
/// [`region_add_fan_out`]); pass an empty `Vec` when calling this directly
/// against one container.
pub fn region_add(
    container: &mut Container,
    section: &Section,
    model: &dyn AddressSpaceModel,
    discard_manager: Option<&dyn RamDiscardManager>,
    copy_sources: &mut Vec<Arc<dyn IommuBackend>>,
) -> Result<()> {
    container.check_not_broken()?;

    if section.should_skip() {
        return Ok(());
    }

    let page_size = container.pgsizes();
    if section.is_misaligned(page_size) {
        let err = Error::with_message(
            ErrorKind::Alignment,
            "section offset is misaligned relative to the region and is not \
             on the known-safe-misalignment allow-list",
        );
        container.latch_error(err.kind());
        return Err(err);
    }

    let Some((iova, end)) = section.aligned_range(page_size) else {
        // Sub-page-sized after alignment: nothing to map.
        return Ok(());
    };
    let size = end - iova;

    if let Err(e) = container.backend().add_section_window(section) {
        container.latch_error(e.kind());
        return Err(e);
    }

    if container.windows().lookup(iova, end - 1).is_none() {
        let err = Error::with_message(
            ErrorKind::NoWindow,
            "no host DMA window covers this section's aligned IOVA range",
        );
        container.latch_error(err.kind());
        return Err(err);
    }

    section.region.take_ref();

    if section.flags.contains(SectionFlags::IS_IOMMU) {
        return add_iommu_notifier(container, section, model);
    }

    if section.flags.contains(SectionFlags::HAS_RAM_DISCARD_MANAGER) {
        let Some(manager) = discard_manager else {
            return Err(Error::with_message(
                ErrorKind::DiscardIncompatible,
                "section declares a RAM discard manager but none was supplied",
            ));
        };
        let listener = RamDiscardListener::new(section, manager);
        container.warn_if_discard_estimate_exceeds_limit(&listener);
        let backend = container.backend().clone();
        listener.populate(section, backend.as_ref(), |offset| {
            let section_iova = iova + (offset - section.offset_within_region);
            (section_iova, core::ptr::null_mut())
        })?;
        container.add_discard_listener(listener);
        return Ok(());
    }

    let vaddr = section.region.host_ptr().ok_or_else(|| {
        Error::with_message(ErrorKind::Internal, "RAM section has no host pointer")
    })?;
    let readonly = section.flags.contains(SectionFlags::READONLY);

    let mut copied = false;
    if container.backend().check_feature(BackendFeature::DmaCopy) {
        for src in copy_sources.iter() {
            if container.backend().shares_fd_with(src.as_ref())
                && container.backend().copy(src.as_ref(), iova, size, readonly).is_ok()
            {
                copied = true;
                break;
            }
        }
    }

    if !copied {
        if let Err(e) = container.backend().map(iova, size, vaddr, readonly) {
            error!("region_add: map({iova:#x}, {size:#x}) failed: {e}");
            container.latch_error(e.kind());
            return Err(e);
        }
        copy_sources.push(container.backend().clone());
    }
    Ok(())
}

fn add_iommu_notifier(
    container: &mut Container,
    section: &Section,
    model: &dyn AddressSpaceModel,
) -> Result<()> {
    if !section.region.set_iommu_page_size_mask(container.pgsizes()) {
        let err = Error::with_message(
            ErrorKind::FeatureUnsupported,
            "region rejected this container's page-size mask",
        );
        container.latch_error(err.kind());
        return Err(err);
    }

    let iommu_offset = section
        .offset_within_address_space
        .wrapping_sub(section.offset_within_region);
    let start = section.offset_within_region;
    let end = if section.is_full_address_space() {
        u64::MAX
    } else {
        start + section.size.min(u64::MAX as u128) as u64 - 1
    };

    let notifier = GuestIommuNotifier::new(
        section.region.clone(),
        iommu_offset,
        start,
        end,
        container.nested(),
    );

    // A newly-installed notifier must observe every mapping that
    // already exists in its region, so migration or a late-attaching
    // notifier doesn't miss entries established before it registered.
    let backend = container.backend().clone();
    model.replay(section.region.as_ref(), &mut |entry: IotlbEntry| {
        notifier.handle_entry(entry, model, backend.as_ref());
    });

    container.add_notifier(notifier);
    Ok(())
}

/// Runs the `region_del` algorithm: the mirror-image teardown
/// of [`region_add`].
pub fn region_del(
    container: &mut Container,
    section: &Section,
    discard_manager: Option<&dyn RamDiscardManager>,
) -> Result<()> {
    if section.should_skip() {
        return Ok(());
    }

    if section.flags.contains(SectionFlags::IS_IOMMU) {
        let start = section.offset_within_region;
        if let Some(notifier) = container.remove_notifier((section.region.id(), start)) {
            drop(notifier);
        }
        section.region.unref();
        return Ok(());
    }

    let page_size = container.pgsizes();
    let Some((iova, end)) = section.aligned_range(page_size) else {
        section.region.unref();
        return Ok(());
    };

    if section.flags.contains(SectionFlags::HAS_RAM_DISCARD_MANAGER) {
        if let Some(listener) = container
            .remove_discard_listener((section.region.id(), section.offset_within_address_space))
        {
            listener.discard(section, container.backend().as_ref());
            if let Some(manager) = discard_manager {
                manager.unregister_listener(listener.token());
            }
        }
    } else if section.is_full_address_space() {
        // A single 2^64-byte unmap can't be expressed; split at the midpoint
        // (a documented special case).
        let mid = 1u64 << 63;
        unmap_range(container, iova, mid);
        unmap_range(container, mid, 0);
    } else {
        unmap_range(container, iova, end);
    }

    container.backend().del_section_window(section)?;
    section.region.unref();
    Ok(())
}

fn unmap_range(container: &Container, iova: u64, end: u64) {
    let size = end.wrapping_sub(iova);
    if size == 0 {
        return;
    }
    if let Err(e) = container.backend().unmap(iova, size, None) {
        warn!("region_del: unmap({iova:#x}, {size:#x}) failed: {e}");
    }
}

/// Fans a `region_add` event out to every container attached to `binding`,
/// in registration order, threading one shared set of already-mapped
/// backends through the whole fan-out so a later container can attempt
/// [`IommuBackend::copy`] against an earlier one before falling back to a
/// full `map` (spec scenario: two containers sharing a backend fd in the
/// same address space).
pub fn region_add_fan_out(
    binding: &AddressSpaceBinding,
    section: &Section,
    model: &dyn AddressSpaceModel,
    discard_manager: Option<&dyn RamDiscardManager>,
) -> Result<()> {
    let mut copy_sources: Vec<Arc<dyn IommuBackend>> = Vec::new();
    for container in binding.containers() {
        let mut guard = container.lock();
        region_add(&mut guard, section, model, discard_manager, &mut copy_sources)?;
    }
    Ok(())
}

/// The mirror-image fan-out of [`region_add_fan_out`].
pub fn region_del_fan_out(
    binding: &AddressSpaceBinding,
    section: &Section,
    discard_manager: Option<&dyn RamDiscardManager>,
) -> Result<()> {
    for container in binding.containers() {
        let mut guard = container.lock();
        region_del(&mut guard, section, discard_manager)?;
    }
    Ok(())
}

/// Enables dirty-page tracking on every device attached to
/// `container`, if not already started.
pub fn log_global_start(container: &mut Container) -> Result<()> {
    if container.dirty_tracking_started() {
        return Ok(());
    }
    container.backend().set_dirty_tracking(true)?;
    container.set_dirty_tracking_started(true);
    Ok(())
}

/// The inverse of [`log_global_start`].
pub fn log_global_stop(container: &mut Container) -> Result<()> {
    if !container.dirty_tracking_started() {
        return Ok(());
    }
    container.backend().set_dirty_tracking(false)?;
    container.set_dirty_tracking_started(false);
    Ok(())
}

/// Queries dirty pages for `section`. The query runs only when every device
/// on the container already reports continuous dirty tracking
/// (`devices_all_dirty_tracking`); a container with any device that lacks
/// tracking cannot produce a trustworthy bitmap, so the sync is skipped
/// entirely rather than partially performed.
pub fn log_sync(
    container: &Container,
    section: &Section,
    model: &dyn AddressSpaceModel,
    discard_manager: Option<&dyn RamDiscardManager>,
) -> Result<()> {
    if section.should_skip() {
        return Ok(());
    }
    if !container.backend().devices_all_dirty_tracking() {
        return Ok(());
    }

    let page_size = container.pgsizes();

    if section.flags.contains(SectionFlags::IS_IOMMU) {
        let iommu_offset = section
            .offset_within_address_space
            .wrapping_sub(section.offset_within_region);
        sync_dirty_for_iommu_region(section.region.clone(), iommu_offset, model, container.backend().as_ref());
        return Ok(());
    }

    if section.flags.contains(SectionFlags::HAS_RAM_DISCARD_MANAGER) {
        return match discard_manager {
            Some(manager) => sync_discard_managed(section, manager, container.backend().as_ref(), page_size),
            None => Ok(()),
        };
    }

    if !section.flags.contains(SectionFlags::IS_RAM) {
        return Ok(());
    }
    let Some((iova, end)) = section.aligned_range(page_size) else {
        return Ok(());
    };
    let Some(ram_addr) = section.region.ram_addr() else {
        return Ok(());
    };
    container.backend().get_dirty_bitmap(iova, end - iova, ram_addr)
}

/// Installs a transient MAP-only notifier over `region`, replays its
/// currently-populated mappings through a dirty-bitmap query instead of a
/// `map`, then tears the notifier back down.
fn sync_dirty_for_iommu_region(
    region: Arc<dyn crate::section::MemoryRegion>,
    iommu_offset: u64,
    model: &dyn AddressSpaceModel,
    backend: &dyn IommuBackend,
) {
    let notifier = GuestIommuNotifier::transient_map_only(region.clone(), iommu_offset);
    model.replay(region.as_ref(), &mut |entry: IotlbEntry| {
        notifier.handle_entry_for_dirty_sync(entry, model, backend);
    });
}

/// Queries dirty pages once per populated sub-range of a RAM-discard-managed
/// section, via the discard manager's own replay.
fn sync_discard_managed(
    section: &Section,
    manager: &dyn RamDiscardManager,
    backend: &dyn IommuBackend,
    page_size: u64,
) -> Result<()> {
    manager.replay_populated(section, &mut |populated: &Section| {
        let Some((iova, end)) = populated.aligned_range(page_size) else {
            return Ok(());
        };
        let Some(ram_addr) = populated.region.ram_addr() else {
            return Ok(());
        };
        backend.get_dirty_bitmap(iova, end - iova, ram_addr)
    })
}

#[cfg(test)]
mod tests {
    use alloc::vec::Vec;

    use ostd::sync::Mutex;

    use super::*;
    use crate::{
        address_space::AddressSpaceId,
        backend::{BackendFeature, DeviceHandle, IotlbHint},
        container::DEFAULT_PGSIZES,
        section::{RegionId, TranslateResult},
    };

    struct Region(RegionId, Option<usize>);
    impl crate::section::MemoryRegion for Region {
        fn id(&self) -> RegionId {
            self.0
        }
        fn take_ref(&self) {}
        fn unref(&self) {}
        fn host_ptr(&self) -> Option<*mut u8> {
            self.1.map(|addr| addr as *mut u8)
        }
        fn ram_addr(&self) -> Option<u64> {
            Some(0)
        }
    }

    struct NullModel;
    impl AddressSpaceModel for NullModel {
        fn translate(&self, _iova: u64, _addr_mask: u64) -> Option<TranslateResult> {
            None
        }
        fn replay(&self, _region: &dyn crate::section::MemoryRegion, _notify: &mut dyn FnMut(IotlbEntry)) {}
    }

    struct RecordingBackend {
        maps: spin::Mutex<Vec<(u64, u64)>>,
        unmaps: spin::Mutex<Vec<(u64, u64)>>,
        copies: spin::Mutex<Vec<(u64, u64)>>,
        dirty_enabled: spin::Mutex<bool>,
        all_dirty: bool,
        dma_copy: bool,
        fd_token: Option<u64>,
    }
    impl RecordingBackend {
        fn new(all_dirty: bool) -> Self {
            Self {
                maps: spin::Mutex::new(Vec::new()),
                unmaps: spin::Mutex::new(Vec::new()),
                copies: spin::Mutex::new(Vec::new()),
                dirty_enabled: spin::Mutex::new(false),
                all_dirty,
                dma_copy: false,
                fd_token: None,
            }
        }

        fn fd_based(all_dirty: bool, fd_token: u64) -> Self {
            Self {
                dma_copy: true,
                fd_token: Some(fd_token),
                ..Self::new(all_dirty)
            }
        }
    }
    impl IommuBackend for RecordingBackend {
        fn check_feature(&self, f: BackendFeature) -> bool {
            matches!(f, BackendFeature::DmaCopy) && self.dma_copy
        }
        fn map(&self, iova: u64, size: u64, _vaddr: *mut u8, _ro: bool) -> Result<()> {
            self.maps.lock().push((iova, size));
            Ok(())
        }
        fn copy(&self, src: &dyn IommuBackend, iova: u64, size: u64, _ro: bool) -> Result<()> {
            if !self.shares_fd_with(src) {
                return Err(Error::new(ErrorKind::FeatureUnsupported));
            }
            self.copies.lock().push((iova, size));
            Ok(())
        }
        fn fd_token(&self) -> Option<u64> {
            self.fd_token
        }
        fn unmap(&self, iova: u64, size: u64, _hint: Option<IotlbHint>) -> Result<()> {
            self.unmaps.lock().push((iova, size));
            Ok(())
        }
        fn get_dirty_bitmap(&self, _i: u64, _s: u64, _r: u64) -> Result<()> {
            Ok(())
        }
        fn set_dirty_tracking(&self, enabled: bool) -> Result<()> {
            *self.dirty_enabled.lock() = enabled;
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
            self.all_dirty
        }
        fn max_mappings(&self) -> Option<u32> {
            None
        }
    }

    fn ram_section(oas: u64, size: u128, host_ptr: usize) -> Section {
        Section {
            region: Arc::new(Region(1, Some(host_ptr))),
            offset_within_address_space: oas,
            offset_within_region: oas,
            size,
            flags: SectionFlags::IS_RAM,
        }
    }

    fn universe_container(backend: Arc<dyn IommuBackend>, nested: bool) -> Container {
        let mut c = Container::new(backend, nested, DEFAULT_PGSIZES);
        c.windows_mut().add(0, u64::MAX, DEFAULT_PGSIZES).unwrap();
        c
    }

    #[test]
    fn region_add_maps_plain_ram() {
        let backend = Arc::new(RecordingBackend::new(true));
        let mut container = universe_container(backend.clone(), false);
        let section = ram_section(0x1000, 0x1000, 0);
        let mut sources = Vec::new();
        region_add(&mut container, &section, &NullModel, None, &mut sources).unwrap();
        assert_eq!(backend.maps.lock().as_slice(), &[(0x1000, 0x1000)]);
    }

    #[test]
    fn region_add_without_host_window_fails_no_window() {
        let backend = Arc::new(RecordingBackend::new(true));
        let mut container = Container::new(backend, false, DEFAULT_PGSIZES);
        let section = ram_section(0x1000, 0x1000, 0);
        let mut sources = Vec::new();
        let err = region_add(&mut container, &section, &NullModel, None, &mut sources).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoWindow);
    }

    #[test]
    fn region_del_unmaps_plain_ram() {
        let backend = Arc::new(RecordingBackend::new(true));
        let mut container = universe_container(backend.clone(), false);
        let section = ram_section(0x1000, 0x1000, 0);
        let mut sources = Vec::new();
        region_add(&mut container, &section, &NullModel, None, &mut sources).unwrap();
        region_del(&mut container, &section, None).unwrap();
        assert_eq!(backend.unmaps.lock().as_slice(), &[(0x1000, 0x1000)]);
    }

    #[test]
    fn region_add_iommu_installs_notifier_not_map() {
        let backend = Arc::new(RecordingBackend::new(true));
        let mut container = universe_container(backend.clone(), false);
        let section = Section {
            region: Arc::new(Region(2, None)),
            offset_within_address_space: 0,
            offset_within_region: 0,
            size: 0x1000,
            flags: SectionFlags::IS_IOMMU,
        };
        let mut sources = Vec::new();
        region_add(&mut container, &section, &NullModel, None, &mut sources).unwrap();
        assert_eq!(container.notifiers().len(), 1);
        assert!(backend.maps.lock().is_empty());
    }

    #[test]
    fn region_del_iommu_removes_notifier() {
        let backend = Arc::new(RecordingBackend::new(true));
        let mut container = universe_container(backend, false);
        let section = Section {
            region: Arc::new(Region(2, None)),
            offset_within_address_space: 0,
            offset_within_region: 0,
            size: 0x1000,
            flags: SectionFlags::IS_IOMMU,
        };
        let mut sources = Vec::new();
        region_add(&mut container, &section, &NullModel, None, &mut sources).unwrap();
        region_del(&mut container, &section, None).unwrap();
        assert!(container.notifiers().is_empty());
    }

    #[test]
    fn protected_section_is_skipped_entirely() {
        let backend = Arc::new(RecordingBackend::new(true));
        let mut container = universe_container(backend.clone(), false);
        let mut section = ram_section(0x1000, 0x1000, 0);
        section.flags |= SectionFlags::IS_PROTECTED;
        let mut sources = Vec::new();
        region_add(&mut container, &section, &NullModel, None, &mut sources).unwrap();
        assert!(backend.maps.lock().is_empty());
    }

    #[test]
    fn discard_managed_region_requires_manager() {
        let backend = Arc::new(RecordingBackend::new(true));
        let mut container = universe_container(backend, false);
        let mut section = ram_section(0x1000, 0x400000, 0);
        section.flags |= SectionFlags::HAS_RAM_DISCARD_MANAGER;
        let mut sources = Vec::new();
        let err = region_add(&mut container, &section, &NullModel, None, &mut sources).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DiscardIncompatible);
    }

    struct Manager(u64);
    impl RamDiscardManager for Manager {
        fn min_granularity(&self) -> u64 {
            self.0
        }
        fn register_listener(&self, _section: &Section) -> u64 {
            0
        }
        fn unregister_listener(&self, _token: u64) {}
        fn replay_populated(
            &self,
            _section: &Section,
            _populate: &mut dyn FnMut(&Section) -> Result<()>,
        ) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn discard_managed_region_populates_at_granularity() {
        let backend = Arc::new(RecordingBackend::new(true));
        let mut container = universe_container(backend.clone(), false);
        let mut section = ram_section(0, 0x400000, 0);
        section.flags |= SectionFlags::HAS_RAM_DISCARD_MANAGER;
        let manager = Manager(0x200000);
        let mut sources = Vec::new();
        region_add(&mut container, &section, &NullModel, Some(&manager), &mut sources).unwrap();
        assert_eq!(backend.maps.lock().len(), 2);
        assert_eq!(container.discard_listeners().len(), 1);
    }

    #[test]
    fn log_global_start_stop_are_idempotent() {
        let backend = Arc::new(RecordingBackend::new(false));
        let mut container = Container::new(backend.clone(), false, DEFAULT_PGSIZES);
        log_global_start(&mut container).unwrap();
        log_global_start(&mut container).unwrap();
        assert!(*backend.dirty_enabled.lock());
        log_global_stop(&mut container).unwrap();
        log_global_stop(&mut container).unwrap();
        assert!(!*backend.dirty_enabled.lock());
    }

    #[test]
    fn log_sync_skips_when_not_all_devices_dirty_tracked() {
        let backend = Arc::new(RecordingBackend::new(false));
        let container = Container::new(backend.clone(), false, DEFAULT_PGSIZES);
        let section = ram_section(0x1000, 0x1000, 0);
        log_sync(&container, &section, &NullModel, None).unwrap();
    }

    #[test]
    fn log_sync_queries_whole_ram_range_when_all_devices_dirty_tracked() {
        let backend = Arc::new(RecordingBackend::new(true));
        let container = Container::new(backend, false, DEFAULT_PGSIZES);
        let section = ram_section(0x1000, 0x1000, 0);
        log_sync(&container, &section, &NullModel, None).unwrap();
    }

    #[test]
    fn misaligned_non_allowlisted_section_is_rejected() {
        let backend = Arc::new(RecordingBackend::new(true));
        let mut container = universe_container(backend, false);
        let section = Section {
            region: Arc::new(Region(3, Some(0))),
            offset_within_address_space: 0x1001,
            offset_within_region: 0x2001,
            size: 0x1000,
            flags: SectionFlags::IS_RAM,
        };
        let mut sources = Vec::new();
        let err = region_add(&mut container, &section, &NullModel, None, &mut sources).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Alignment);
    }

    #[test]
    fn fan_out_dma_copies_into_second_container_sharing_a_fd() {
        let registry = crate::address_space::AddressSpaceRegistry::new();
        let binding = registry.get_or_create(AddressSpaceId::new(1));

        let backend_a = Arc::new(RecordingBackend::fd_based(true, 42));
        let backend_b = Arc::new(RecordingBackend::fd_based(true, 42));
        let container_a = Arc::new(Mutex::new(universe_container(backend_a.clone(), false)));
        let container_b = Arc::new(Mutex::new(universe_container(backend_b.clone(), false)));
        // attach_container inserts at the head, so attach b then a to get
        // a's region_add running first (matching "b attached earlier").
        binding.lock().attach_container(container_b.clone());
        binding.lock().attach_container(container_a.clone());

        let section = ram_section(0x1000, 0x1000, 0);
        region_add_fan_out(&binding.lock(), &section, &NullModel, None).unwrap();

        // Fan-out order follows the container list (a first, then b): a maps
        // directly; b, sharing a's fd and advertising DMA_COPY, copies.
        assert_eq!(backend_a.maps.lock().as_slice(), &[(0x1000, 0x1000)]);
        assert!(backend_a.copies.lock().is_empty());
        assert_eq!(backend_b.copies.lock().as_slice(), &[(0x1000, 0x1000)]);
        assert!(backend_b.maps.lock().is_empty());
    }

    #[test]
    fn fan_out_falls_back_to_map_without_shared_fd() {
        let registry = crate::address_space::AddressSpaceRegistry::new();
        let binding = registry.get_or_create(AddressSpaceId::new(2));

        let backend_a = Arc::new(RecordingBackend::fd_based(true, 1));
        let backend_b = Arc::new(RecordingBackend::fd_based(true, 2));
        let container_a = Arc::new(Mutex::new(universe_container(backend_a.clone(), false)));
        let container_b = Arc::new(Mutex::new(universe_container(backend_b.clone(), false)));
        binding.lock().attach_container(container_b.clone());
        binding.lock().attach_container(container_a.clone());

        let section = ram_section(0x1000, 0x1000, 0);
        region_add_fan_out(&binding.lock(), &section, &NullModel, None).unwrap();

        assert_eq!(backend_a.maps.lock().as_slice(), &[(0x1000, 0x1000)]);
        assert_eq!(backend_b.maps.lock().as_slice(), &[(0x1000, 0x1000)]);
        assert!(backend_b.copies.lock().is_empty());
    }
}
