// SPDX-License-Identifier: MPL-2.0

//! The legacy group/container backend: one kernel container per group, no
//! cross-container DMA copy, a bounded `max_mappings`.

use alloc::sync::Arc;

use log::debug;

use super::{BackendFeature, DeviceHandle, IommuBackend, IotlbHint};
use crate::{
    error::{ErrorKind, Result},
    section::Section,
};

/// The out-of-scope ioctl channel a concrete backend drives: the concrete
/// ioctl byte layout is an external collaborator, and this trait is the
/// seam at which a real VFIO group/container fd implementation plugs in.
pub trait KernelIommuChannel: Send + Sync {
    fn map(&self, iova: u64, size: u64, vaddr: *mut u8, readonly: bool) -> Result<()>;
    fn unmap(&self, iova: u64, size: u64, iotlb_hint: Option<IotlbHint>) -> Result<()>;
    fn get_dirty_bitmap(&self, iova: u64, size: u64, ram_addr: u64) -> Result<()>;
    fn set_dirty_tracking(&self, enabled: bool) -> Result<()>;
    fn reset_devices(&self) -> Result<()>;
    fn attach_device(&self, device: DeviceHandle) -> Result<()>;
    fn detach_device(&self, device: DeviceHandle) -> Result<()>;
    fn all_devices_dirty_tracking(&self) -> bool;
    /// A value identifying the underlying kernel fd, used only to test
    /// whether two backends could share pinned pages (fd-based backend
    /// only; legacy backends never share an fd).
    fn fd_token(&self) -> u64;
}

/// The legacy VFIO-style backend: one kernel container per device group, no
/// `DMA_COPY` support, and a conservative, hard-coded `max_mappings` bound.
pub struct LegacyBackend {
    channel: Arc<dyn KernelIommuChannel>,
    max_mappings: u32,
}

/// The legacy kernel interface's typical mapping ceiling (historically the
/// VFIO default `dma_entry_limit`).
const LEGACY_DEFAULT_MAX_MAPPINGS: u32 = 0xffff;

impl LegacyBackend {
    /// Wraps `channel` as a legacy backend with the default mapping ceiling.
    pub fn new(channel: Arc<dyn KernelIommuChannel>) -> Self {
        Self {
            channel,
            max_mappings: LEGACY_DEFAULT_MAX_MAPPINGS,
        }
    }

    /// Wraps `channel` with an explicit mapping ceiling, for kernels that
    /// report a different `dma_entry_limit`.
    pub fn with_max_mappings(channel: Arc<dyn KernelIommuChannel>, max_mappings: u32) -> Self {
        Self {
            channel,
            max_mappings,
        }
    }
}

impl IommuBackend for LegacyBackend {
    fn check_feature(&self, feature: BackendFeature) -> bool {
        match feature {
            BackendFeature::DmaCopy => false,
            BackendFeature::DirtyTracking => true,
        }
    }

    fn map(&self, iova: u64, size: u64, vaddr: *mut u8, readonly: bool) -> Result<()> {
        self.channel.map(iova, size, vaddr, readonly).map_err(|e| {
            debug!("legacy backend: map({iova:#x}, {size:#x}) failed: {e}");
            crate::error::Error::new(ErrorKind::BackendMapFail)
        })
    }

    fn unmap(&self, iova: u64, size: u64, iotlb_hint: Option<IotlbHint>) -> Result<()> {
        self.channel.unmap(iova, size, iotlb_hint).map_err(|e| {
            debug!("legacy backend: unmap({iova:#x}, {size:#x}) failed: {e}");
            crate::error::Error::new(ErrorKind::BackendUnmapFail)
        })
    }

    fn get_dirty_bitmap(&self, iova: u64, size: u64, ram_addr: u64) -> Result<()> {
        self.channel.get_dirty_bitmap(iova, size, ram_addr)
    }

    fn set_dirty_tracking(&self, enabled: bool) -> Result<()> {
        self.channel.set_dirty_tracking(enabled)
    }

    fn reset(&self) -> Result<()> {
        self.channel.reset_devices()
    }

    fn attach_device(&self, device: DeviceHandle) -> Result<()> {
        self.channel.attach_device(device)
    }

    fn detach_device(&self, device: DeviceHandle) -> Result<()> {
        self.channel.detach_device(device)
    }

    fn add_section_window(&self, _section: &Section) -> Result<()> {
        // Legacy windows are provisioned up front by the group/container;
        // there is nothing dynamic to extend.
        Ok(())
    }

    fn devices_all_dirty_tracking(&self) -> bool {
        self.channel.all_devices_dirty_tracking()
    }

    fn max_mappings(&self) -> Option<u32> {
        Some(self.max_mappings)
    }
}
