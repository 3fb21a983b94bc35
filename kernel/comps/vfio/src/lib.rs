// SPDX-License-Identifier: MPL-2.0

//! The guest-to-host DMA address-space translator: the component that
//! keeps a device's host IOMMU mappings in lockstep with a VMM's guest
//! address space as it is built up and torn down, assigns passthrough
//! devices to backends, and reports dirty pages during live migration.
#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

extern crate alloc;

use component::{init_component, ComponentInitError};

pub mod address_space;
pub mod backend;
pub mod container;
pub mod context;
pub mod device;
pub mod discard;
pub mod error;
pub mod listener;
pub mod notifier;
pub mod section;
pub mod window;

pub use address_space::{AddressSpaceBinding, AddressSpaceId, AddressSpaceRegistry};
pub use backend::{BackendFeature, DeviceHandle, IommuBackend, IotlbHint};
pub use container::Container;
pub use error::{Error, ErrorKind, Result};
pub use section::{AddressSpaceModel, IotlbEntry, MemoryRegion, RamDiscardManager, Section, SectionFlags};

#[init_component]
fn vfio_component_init() -> Result<(), ComponentInitError> {
    context::registry();
    Ok(())
}
