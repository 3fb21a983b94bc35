// SPDX-License-Identifier: MPL-2.0

//! The RAM-discard listener (RDL): maps only currently-populated sub-ranges
//! of a coordinated-discard (ballooning-style) region, at discard
//! granularity.

use alloc::sync::Arc;

use crate::{
    backend::IommuBackend,
    error::Result,
    section::{MemoryRegion, RamDiscardManager, RegionId, Section},
};

/// A registered RAM-discard listener.
pub struct RamDiscardListener {
    region: Arc<dyn MemoryRegion>,
    offset_within_address_space: u64,
    size: u128,
    granularity: u64,
    token: u64,
}

impl RamDiscardListener {
    /// Registers a listener for `section`, querying `manager` for its
    /// minimum granularity and subscribing to future populate/discard
    /// events via [`RamDiscardManager::register_listener`].
    pub fn new(section: &Section, manager: &dyn RamDiscardManager) -> Self {
        Self {
            region: section.region.clone(),
            offset_within_address_space: section.offset_within_address_space,
            size: section.size,
            granularity: manager.min_granularity(),
            token: manager.register_listener(section),
        }
    }

    pub fn identity(&self) -> (RegionId, u64) {
        (self.region.id(), self.offset_within_address_space)
    }

    /// The token returned by [`RamDiscardManager::register_listener`], used
    /// to cancel the subscription via
    /// [`RamDiscardManager::unregister_listener`] on teardown.
    pub fn token(&self) -> u64 {
        self.token
    }

    pub fn granularity(&self) -> u64 {
        self.granularity
    }

    /// An upper-bound estimate of how many DMA mappings this listener may
    /// produce: `ceil(size / granularity)`, used by the registration sanity check.
    pub fn max_mapping_estimate(&self) -> u64 {
        let slices = self.size.div_ceil(self.granularity as u128);
        slices.min(u64::MAX as u128) as u64
    }

    /// Iterates populated sub-ranges of `section` at
    /// `granularity` and maps each one. If any slice fails, rolls back by
    /// discarding the whole section and propagates the error.
    pub fn populate(
        &self,
        section: &Section,
        backend: &dyn IommuBackend,
        translate: impl Fn(u64) -> (u64, *mut u8),
    ) -> Result<()> {
        let result = self.populate_inner(section, backend, &translate);
        if result.is_err() {
            self.discard(section, backend);
        }
        result
    }

    fn populate_inner(
        &self,
        section: &Section,
        backend: &dyn IommuBackend,
        translate: &impl Fn(u64) -> (u64, *mut u8),
    ) -> Result<()> {
        let region_start = section.offset_within_region;
        let region_end = region_start + section.size.min(u64::MAX as u128) as u64;
        let mut start = region_start;
        while start < region_end {
            let next = next_slice_end(start, self.granularity, region_end);
            let (iova, vaddr) = translate(start);
            let size = next - start;
            backend.map(iova, size, vaddr, section.flags.contains(crate::section::SectionFlags::READONLY))?;
            start = next;
        }
        Ok(())
    }

    /// A single unmap covering the whole section.
    pub fn discard(&self, section: &Section, backend: &dyn IommuBackend) {
        let size = section.size.min(u64::MAX as u128) as u64;
        if let Err(e) = backend.unmap(section.offset_within_address_space, size, None) {
            log::warn!("RDL: discard unmap failed: {e}");
        }
    }
}

fn next_slice_end(start: u64, granularity: u64, region_end: u64) -> u64 {
    let rounded = align_up(start.saturating_add(1), granularity);
    rounded.min(region_end)
}

fn align_up(value: u64, align: u64) -> u64 {
    let mask = align - 1;
    value.checked_add(mask).map_or(u64::MAX, |v| v & !mask)
}

#[cfg(test)]
mod tests {
    use alloc::{sync::Arc, vec::Vec};
    use core::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::section::{RegionId, SectionFlags};

    struct Region;
    impl MemoryRegion for Region {
        fn id(&self) -> RegionId {
            7
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

    struct CountingBackend {
        maps: AtomicU32,
    }
    impl IommuBackend for CountingBackend {
        fn check_feature(&self, _f: crate::backend::BackendFeature) -> bool {
            false
        }
        fn map(&self, _iova: u64, _size: u64, _vaddr: *mut u8, _ro: bool) -> Result<()> {
            self.maps.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
        fn unmap(&self, _iova: u64, _size: u64, _hint: Option<crate::backend::IotlbHint>) -> Result<()> {
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
        fn attach_device(&self, _d: crate::backend::DeviceHandle) -> Result<()> {
            Ok(())
        }
        fn detach_device(&self, _d: crate::backend::DeviceHandle) -> Result<()> {
            Ok(())
        }
        fn devices_all_dirty_tracking(&self) -> bool {
            true
        }
        fn max_mappings(&self) -> Option<u32> {
            None
        }
    }

    fn section(size: u128, flags: SectionFlags) -> Section {
        Section {
            region: Arc::new(Region),
            offset_within_address_space: 0,
            offset_within_region: 0,
            size,
            flags: flags | SectionFlags::HAS_RAM_DISCARD_MANAGER,
        }
    }

    #[test]
    fn new_registers_with_the_manager() {
        struct CountingManager(AtomicU32);
        impl RamDiscardManager for CountingManager {
            fn min_granularity(&self) -> u64 {
                0x1000
            }
            fn register_listener(&self, _section: &Section) -> u64 {
                self.0.fetch_add(1, Ordering::Relaxed) as u64 + 1
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

        let manager = CountingManager(AtomicU32::new(0));
        let s = section(0x1000, SectionFlags::IS_RAM);
        let rdl = RamDiscardListener::new(&s, &manager);
        assert_eq!(rdl.token(), 1);
        assert_eq!(manager.0.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn two_slices_at_granularity() {
        let s = section(0x400000, SectionFlags::IS_RAM);
        let manager = Manager(0x200000);
        let rdl = RamDiscardListener::new(&s, &manager);
        assert_eq!(rdl.granularity(), 0x200000);

        let backend = CountingBackend {
            maps: AtomicU32::new(0),
        };
        rdl.populate(&s, &backend, |off| (off, core::ptr::null_mut()))
            .unwrap();
        assert_eq!(backend.maps.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn max_mapping_estimate_rounds_up() {
        let s = section(0x300001, SectionFlags::IS_RAM);
        let manager = Manager(0x100000);
        let rdl = RamDiscardListener::new(&s, &manager);
        assert_eq!(rdl.max_mapping_estimate(), 4);
    }

    #[test]
    fn failed_slice_rolls_back_via_discard() {
        struct FailingOnSecond(AtomicU32);
        impl IommuBackend for FailingOnSecond {
            fn check_feature(&self, _f: crate::backend::BackendFeature) -> bool {
                false
            }
            fn map(&self, _iova: u64, _size: u64, _vaddr: *mut u8, _ro: bool) -> Result<()> {
                let n = self.0.fetch_add(1, Ordering::Relaxed);
                if n == 1 {
                    Err(crate::error::Error::new(crate::error::ErrorKind::BackendMapFail))
                } else {
                    Ok(())
                }
            }
            fn unmap(&self, _iova: u64, _size: u64, _hint: Option<crate::backend::IotlbHint>) -> Result<()> {
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
            fn attach_device(&self, _d: crate::backend::DeviceHandle) -> Result<()> {
                Ok(())
            }
            fn detach_device(&self, _d: crate::backend::DeviceHandle) -> Result<()> {
                Ok(())
            }
            fn devices_all_dirty_tracking(&self) -> bool {
                true
            }
            fn max_mappings(&self) -> Option<u32> {
                None
            }
        }

        let s = section(0x400000, SectionFlags::IS_RAM);
        let manager = Manager(0x200000);
        let rdl = RamDiscardListener::new(&s, &manager);
        let backend = FailingOnSecond(AtomicU32::new(0));
        let err = rdl
            .populate(&s, &backend, |off| (off, core::ptr::null_mut()))
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::BackendMapFail);
        let _ = Vec::<u8>::new();
    }
}
