// SPDX-License-Identifier: MPL-2.0

//! [`Container`]: the per-backend bookkeeping unit — host window table,
//! registered notifiers and RAM-discard listeners, and the feature/nested
//! flags that gate the memory listener pipeline's behavior.

use alloc::{sync::Arc, vec::Vec};

use crate::{
    backend::IommuBackend,
    discard::RamDiscardListener,
    error::{ErrorKind, Result},
    notifier::GuestIommuNotifier,
    section::RegionId,
    window::HostWindowTable,
};

/// A single DMA-capable container: one backend, one host window table, and
/// the notifiers/listeners registered against it.
///
/// The init-error latch: once a container observes a fatal backend error
/// during setup it is marked permanently broken, and every subsequent
/// operation against it fails fast with that same error instead of
/// re-attempting a doomed backend call.
pub struct Container {
    backend: Arc<dyn IommuBackend>,
    windows: HostWindowTable,
    notifiers: Vec<GuestIommuNotifier>,
    discard_listeners: Vec<RamDiscardListener>,
    nested: bool,
    dirty_tracking_started: bool,
    init_error: Option<ErrorKind>,
    pgsizes: u64,
    device_count: usize,
    pre_registration_listener: Option<PreRegistrationListener>,
}

/// The default page-size mask (4 KiB pages only), used where a container's
/// backend does not report a different one.
pub const DEFAULT_PGSIZES: u64 = 0x1000;

/// The nested-mode pre-registration listener: eagerly maps host RAM into the
/// backend before the guest's IOMMU activates, so mappings the guest later
/// installs through its own page tables only need metadata changes on top of
/// an already-pinned page.
#[derive(Debug, Default)]
pub struct PreRegistrationListener {
    installed: bool,
}

impl PreRegistrationListener {
    pub fn installed(&self) -> bool {
        self.installed
    }
}

impl Container {
    pub fn new(backend: Arc<dyn IommuBackend>, nested: bool, pgsizes: u64) -> Self {
        Self {
            backend,
            windows: HostWindowTable::new(),
            notifiers: Vec::new(),
            discard_listeners: Vec::new(),
            nested,
            dirty_tracking_started: false,
            init_error: None,
            pgsizes,
            device_count: 0,
            pre_registration_listener: None,
        }
    }

    pub fn backend(&self) -> &Arc<dyn IommuBackend> {
        &self.backend
    }

    pub fn nested(&self) -> bool {
        self.nested
    }

    /// The bitmap of page sizes (powers of two) this container's backend
    /// supports mapping at.
    pub fn pgsizes(&self) -> u64 {
        self.pgsizes
    }

    /// The number of devices currently attached to this container.
    pub fn device_count(&self) -> usize {
        self.device_count
    }

    pub fn inc_device_count(&mut self) {
        self.device_count += 1;
    }

    /// Decrements the device count and returns the new value.
    pub fn dec_device_count(&mut self) -> usize {
        self.device_count = self.device_count.saturating_sub(1);
        self.device_count
    }

    /// Installs the nested-mode pre-registration listener. Idempotent.
    pub fn install_pre_registration_listener(&mut self) {
        self.pre_registration_listener = Some(PreRegistrationListener { installed: true });
    }

    pub fn pre_registration_listener(&self) -> Option<&PreRegistrationListener> {
        self.pre_registration_listener.as_ref()
    }

    pub fn windows(&self) -> &HostWindowTable {
        &self.windows
    }

    pub fn windows_mut(&mut self) -> &mut HostWindowTable {
        &mut self.windows
    }

    /// Returns the latched init error, if this container is permanently
    /// broken.
    pub fn init_error(&self) -> Option<ErrorKind> {
        self.init_error
    }

    /// Checks the latch before performing an operation: `Err` if broken,
    /// `Ok(())` otherwise.
    pub fn check_not_broken(&self) -> Result<()> {
        match self.init_error {
            Some(kind) => Err(crate::error::Error::with_message(
                kind,
                "container is latched broken by a prior fatal error",
            )),
            None => Ok(()),
        }
    }

    /// Latches `kind` as this container's permanent error, if not already
    /// latched. The first fatal error wins.
    pub fn latch_error(&mut self, kind: ErrorKind) {
        if self.init_error.is_none() {
            self.init_error = Some(kind);
        }
    }

    pub fn add_notifier(&mut self, notifier: GuestIommuNotifier) {
        self.notifiers.push(notifier);
    }

    /// Removes and returns the notifier registered at `identity`, if any
    /// (the matching `region_del` teardown).
    pub fn remove_notifier(&mut self, identity: (RegionId, u64)) -> Option<GuestIommuNotifier> {
        let pos = self.notifiers.iter().position(|n| n.identity() == identity)?;
        Some(self.notifiers.remove(pos))
    }

    pub fn notifiers(&self) -> &[GuestIommuNotifier] {
        &self.notifiers
    }

    pub fn add_discard_listener(&mut self, listener: RamDiscardListener) {
        self.discard_listeners.push(listener);
    }

    pub fn remove_discard_listener(&mut self, identity: (RegionId, u64)) -> Option<RamDiscardListener> {
        let pos = self
            .discard_listeners
            .iter()
            .position(|l| l.identity() == identity)?;
        Some(self.discard_listeners.remove(pos))
    }

    pub fn discard_listeners(&self) -> &[RamDiscardListener] {
        &self.discard_listeners
    }

    pub fn dirty_tracking_started(&self) -> bool {
        self.dirty_tracking_started
    }

    pub fn set_dirty_tracking_started(&mut self, started: bool) {
        self.dirty_tracking_started = started;
    }

    /// A sanity check: warns (but does not fail) if registering
    /// `listener` would push the container's total estimated mapping count
    /// past the backend's reported `max_mappings`.
    pub fn warn_if_discard_estimate_exceeds_limit(&self, listener: &RamDiscardListener) {
        let Some(limit) = self.backend.max_mappings() else {
            return;
        };
        let existing: u64 = self
            .discard_listeners
            .iter()
            .map(RamDiscardListener::max_mapping_estimate)
            .sum();
        let total = existing.saturating_add(listener.max_mapping_estimate());
        if total > limit as u64 {
            log::warn!(
                "RAM-discard-managed region may produce up to {total} DMA \
                 mappings, exceeding this backend's limit of {limit}; \
                 device assignment may fail under memory pressure"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendFeature, DeviceHandle, IotlbHint};

    struct NullBackend;
    impl IommuBackend for NullBackend {
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
            Some(4)
        }
    }

    #[test]
    fn latch_keeps_first_error() {
        let mut c = Container::new(Arc::new(NullBackend), false, DEFAULT_PGSIZES);
        assert!(c.check_not_broken().is_ok());
        c.latch_error(ErrorKind::BackendMapFail);
        c.latch_error(ErrorKind::Internal);
        assert_eq!(c.init_error(), Some(ErrorKind::BackendMapFail));
        assert!(c.check_not_broken().is_err());
    }

    #[test]
    fn notifier_round_trip() {
        let mut c = Container::new(Arc::new(NullBackend), false, DEFAULT_PGSIZES);
        let region: Arc<dyn crate::section::MemoryRegion> = Arc::new(DummyRegion);
        let gin = GuestIommuNotifier::new(region, 0, 0, 0xfff, false);
        let identity = gin.identity();
        c.add_notifier(gin);
        assert_eq!(c.notifiers().len(), 1);
        assert!(c.remove_notifier(identity).is_some());
        assert!(c.notifiers().is_empty());
    }

    #[test]
    fn device_count_tracks_attach_detach() {
        let mut c = Container::new(Arc::new(NullBackend), false, DEFAULT_PGSIZES);
        assert_eq!(c.device_count(), 0);
        c.inc_device_count();
        c.inc_device_count();
        assert_eq!(c.device_count(), 2);
        assert_eq!(c.dec_device_count(), 1);
        assert_eq!(c.dec_device_count(), 0);
        assert_eq!(c.dec_device_count(), 0, "never underflows below zero");
    }

    #[test]
    fn pre_registration_listener_starts_absent() {
        let mut c = Container::new(Arc::new(NullBackend), true, DEFAULT_PGSIZES);
        assert!(c.pre_registration_listener().is_none());
        c.install_pre_registration_listener();
        assert!(c.pre_registration_listener().unwrap().installed());
    }

    struct DummyRegion;
    impl crate::section::MemoryRegion for DummyRegion {
        fn id(&self) -> RegionId {
            9
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
}
