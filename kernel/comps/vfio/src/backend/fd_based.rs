// SPDX-License-Identifier: MPL-2.0

//! The fd-based (`iommufd`-style) backend: supports cross-container DMA
//! copy when source and destination share an underlying kernel fd, and is
//! practically unbounded in the number of mappings it can hold.

use alloc::sync::Arc;

use log::debug;

use super::{legacy::KernelIommuChannel, BackendFeature, DeviceHandle, IommuBackend, IotlbHint};
use crate::error::{Error, ErrorKind, Result};

/// The `iommufd`-specific extension of [`KernelIommuChannel`]: an `ioas`
/// (I/O address space) must be allocated and a device's page table attached
/// to it before mappings can be installed.
pub trait IommufdChannel: KernelIommuChannel {
    /// Allocates a fresh `ioas` in the kernel and returns its id.
    fn alloc_ioas(&self) -> Result<u32>;

    /// Frees an `ioas` previously returned by [`Self::alloc_ioas`].
    fn free_ioas(&self, ioas: u32);

    /// Attaches `device`'s page table to `ioas`.
    fn attach_pt(&self, device: DeviceHandle, ioas: u32) -> Result<()>;

    /// Detaches `device`'s page table from `ioas`.
    fn detach_pt(&self, device: DeviceHandle, ioas: u32) -> Result<()>;
}

/// The fd-based backend. Two instances that report the same
/// [`KernelIommuChannel::fd_token`] share pinned pages and can use
/// [`IommuBackend::copy`] to avoid re-pinning.
pub struct FdBasedBackend {
    channel: Arc<dyn IommufdChannel>,
    ioas: spin::Mutex<Option<u32>>,
}

impl FdBasedBackend {
    /// Wraps `channel` as an fd-based backend. The `ioas` is allocated
    /// lazily, on first [`IommuBackend::attach_device`].
    pub fn new(channel: Arc<dyn IommufdChannel>) -> Self {
        Self {
            channel,
            ioas: spin::Mutex::new(None),
        }
    }
}

impl IommuBackend for FdBasedBackend {
    fn check_feature(&self, feature: BackendFeature) -> bool {
        match feature {
            BackendFeature::DmaCopy => true,
            BackendFeature::DirtyTracking => true,
        }
    }

    fn map(&self, iova: u64, size: u64, vaddr: *mut u8, readonly: bool) -> Result<()> {
        self.channel.map(iova, size, vaddr, readonly).map_err(|e| {
            debug!("fd-based backend: map({iova:#x}, {size:#x}) failed: {e}");
            Error::new(ErrorKind::BackendMapFail)
        })
    }

    fn copy(&self, src: &dyn IommuBackend, iova: u64, size: u64, readonly: bool) -> Result<()> {
        if !self.shares_fd_with(src) {
            return Err(Error::with_message(
                ErrorKind::FeatureUnsupported,
                "DMA copy requires source and destination to share an underlying fd",
            ));
        }
        // The real iommufd copy ioctl is out of scope; it is modeled here
        // as a map performed against the shared fd, which is the correct
        // observable effect (dst sees src's pinned pages at `iova`).
        self.channel.map(iova, size, core::ptr::null_mut(), readonly)
    }

    fn fd_token(&self) -> Option<u64> {
        Some(self.channel.fd_token())
    }

    fn unmap(&self, iova: u64, size: u64, iotlb_hint: Option<IotlbHint>) -> Result<()> {
        self.channel.unmap(iova, size, iotlb_hint).map_err(|e| {
            debug!("fd-based backend: unmap({iova:#x}, {size:#x}) failed: {e}");
            Error::new(ErrorKind::BackendUnmapFail)
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
        let mut guard = self.ioas.lock();
        let ioas = match *guard {
            Some(ioas) => ioas,
            None => {
                let ioas = self.channel.alloc_ioas()?;
                *guard = Some(ioas);
                ioas
            }
        };
        if let Err(e) = self.channel.attach_pt(device, ioas) {
            if guard.is_some() {
                self.channel.free_ioas(ioas);
                *guard = None;
            }
            return Err(e);
        }
        Ok(())
    }

    fn detach_device(&self, device: DeviceHandle) -> Result<()> {
        let ioas = { *self.ioas.lock() };
        if let Some(ioas) = ioas {
            self.channel.detach_pt(device, ioas)?;
        }
        Ok(())
    }

    fn devices_all_dirty_tracking(&self) -> bool {
        self.channel.all_devices_dirty_tracking()
    }

    fn max_mappings(&self) -> Option<u32> {
        // Backed by a kernel page table rather than a fixed-size DMA entry
        // array; unbounded in practice.
        None
    }
}

impl Drop for FdBasedBackend {
    fn drop(&mut self) {
        if let Some(ioas) = self.ioas.lock().take() {
            self.channel.free_ioas(ioas);
        }
    }
}
