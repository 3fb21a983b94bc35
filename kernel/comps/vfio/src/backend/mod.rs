// SPDX-License-Identifier: MPL-2.0

//! The abstract IOMMU backend operation table.
//!
//! `IommuBackend` is the stable ABI the rest of the crate depends on; it has
//! two concrete implementations, [`legacy::LegacyBackend`] and
//! [`fd_based::FdBasedBackend`].

pub mod fd_based;
pub mod legacy;

use crate::{error::Result, section::Section};

/// A feature an [`IommuBackend`] may or may not support.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendFeature {
    /// Cross-container DMA copy (see [`IommuBackend::copy`]).
    DmaCopy,
    /// Per-container dirty-page tracking.
    DirtyTracking,
}

/// An opaque handle identifying a device bound to a backend. The concrete
/// device/PCI metadata lives outside this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceHandle(pub u64);

/// An opaque hint passed to `unmap`, letting a bitmap-bearing unmap
/// (used by live-migration teardown) ride along with the unmap call
/// instead of requiring a second round trip. `None` means no hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IotlbHint(pub u64);

/// The abstract IOMMU backend operations.
///
/// All operations are synchronous and report success or an [`crate::error::Error`]
/// whose [`crate::error::ErrorKind`] is one of `BackendMapFail`, `BackendUnmapFail`,
/// or `FeatureUnsupported` — never a raw transport detail.
pub trait IommuBackend: Send + Sync {
    /// Probes whether this backend (and the kernel facility behind it)
    /// supports `feature`.
    fn check_feature(&self, feature: BackendFeature) -> bool;

    /// Maps `[iova, iova + size)` to host virtual address `vaddr`.
    fn map(&self, iova: u64, size: u64, vaddr: *mut u8, readonly: bool) -> Result<()>;

    /// Cross-container DMA copy: makes `self` (the destination) see the same
    /// pinned host pages at `iova` that `src` already maps there, without
    /// re-pinning. Only meaningful when `self` and `src` share an underlying
    /// kernel fd; callers must check that precondition themselves or
    /// via [`Self::shares_fd_with`].
    ///
    /// The default implementation reports the feature as unsupported, which
    /// is correct for any backend that never advertises `DmaCopy`.
    fn copy(&self, _src: &dyn IommuBackend, _iova: u64, _size: u64, _readonly: bool) -> Result<()> {
        Err(crate::error::Error::new(
            crate::error::ErrorKind::FeatureUnsupported,
        ))
    }

    /// A token identifying the underlying kernel fd this backend is built
    /// on, or `None` if this backend variant never shares pinned pages
    /// with another container (the legacy backend). Two backends whose
    /// tokens are both `Some` and equal satisfy [`Self::copy`]'s
    /// same-fd precondition.
    fn fd_token(&self) -> Option<u64> {
        None
    }

    /// Whether `self` and `other` are backed by the same underlying kernel
    /// fd, the precondition [`Self::copy`] requires.
    fn shares_fd_with(&self, other: &dyn IommuBackend) -> bool {
        matches!((self.fd_token(), other.fd_token()), (Some(a), Some(b)) if a == b)
    }

    /// Unmaps `[iova, iova + size)`. `iotlb_hint` may ride a bitmap-bearing
    /// unmap for live-migration teardown; `None` if not applicable.
    fn unmap(&self, iova: u64, size: u64, iotlb_hint: Option<IotlbHint>) -> Result<()>;

    /// Asks the backend to report dirty pages covering `[iova, iova + size)`,
    /// attributed to host RAM offset `ram_addr`.
    fn get_dirty_bitmap(&self, iova: u64, size: u64, ram_addr: u64) -> Result<()>;

    /// Toggles dirty-page tracking for every device bound to this backend.
    fn set_dirty_tracking(&self, enabled: bool) -> Result<()>;

    /// Resets every device bound to this backend. Continues past individual
    /// device failures and returns the last observed error.
    fn reset(&self) -> Result<()>;

    /// Binds `device` to this backend.
    fn attach_device(&self, device: DeviceHandle) -> Result<()>;

    /// Unbinds `device` from this backend.
    fn detach_device(&self, device: DeviceHandle) -> Result<()>;

    /// Extends the backend's host window list for `section`, for backends
    /// whose IOMMU has dynamically-sized windows. The default is a no-op,
    /// correct for backends with statically-provisioned windows.
    fn add_section_window(&self, _section: &Section) -> Result<()> {
        Ok(())
    }

    /// The inverse of [`Self::add_section_window`].
    fn del_section_window(&self, _section: &Section) -> Result<()> {
        Ok(())
    }

    /// `true` if every device currently bound to this backend has dirty
    /// tracking enabled; gates whether `log_sync` needs to perform per-entry
    /// dirty queries at all.
    fn devices_all_dirty_tracking(&self) -> bool;

    /// The maximum number of outstanding mappings this backend can hold, or
    /// `None` if unbounded (or simply unknown).
    fn max_mappings(&self) -> Option<u32>;
}
