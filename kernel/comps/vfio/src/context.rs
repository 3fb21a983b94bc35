// SPDX-License-Identifier: MPL-2.0

//! The process-wide singleton tying the [`AddressSpaceRegistry`] to the
//! component framework's init lifecycle, the way other `aster-*` components
//! expose a `GLOBAL`-style accessor behind a [`spin::Once`].

use core::sync::atomic::{AtomicUsize, Ordering};

use spin::Once;

use crate::address_space::AddressSpaceRegistry;

static REGISTRY: Once<AddressSpaceRegistry> = Once::new();

/// Returns the process-wide address-space registry, initializing it on
/// first access. Called from this component's `#[init_component]` entry
/// point and from every public crate entry point that needs the registry.
pub fn registry() -> &'static AddressSpaceRegistry {
    REGISTRY.call_once(AddressSpaceRegistry::new)
}

/// The process-wide count of attached devices that require coordinated RAM
/// discard (i.e. a RAM-discard manager's populate/discard events, not a
/// guest-invisible balloon). While this is nonzero, uncoordinated discard
/// (e.g. `madvise(MADV_DONTNEED)` from an unrelated subsystem) would silently
/// unmap pages a device still has pinned, so it must stay disabled
/// process-wide.
static UNCOORDINATED_DISCARD_DISABLE_COUNT: AtomicUsize = AtomicUsize::new(0);

/// Disables uncoordinated RAM discard process-wide; returns `true` if this
/// call is the one that transitioned the count from zero.
pub fn disable_uncoordinated_discard() -> bool {
    UNCOORDINATED_DISCARD_DISABLE_COUNT.fetch_add(1, Ordering::SeqCst) == 0
}

/// The inverse of [`disable_uncoordinated_discard`]; returns `true` if this
/// call is the one that transitioned the count back to zero.
pub fn enable_uncoordinated_discard() -> bool {
    UNCOORDINATED_DISCARD_DISABLE_COUNT.fetch_sub(1, Ordering::SeqCst) == 1
}

/// `true` if any attached device currently requires uncoordinated discard to
/// stay disabled.
pub fn uncoordinated_discard_disabled() -> bool {
    UNCOORDINATED_DISCARD_DISABLE_COUNT.load(Ordering::SeqCst) != 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_is_a_stable_singleton() {
        let a = registry() as *const AddressSpaceRegistry;
        let b = registry() as *const AddressSpaceRegistry;
        assert_eq!(a, b);
    }

    #[test]
    fn discard_disable_count_is_balanced_by_enable() {
        let before = uncoordinated_discard_disabled();
        disable_uncoordinated_discard();
        assert!(uncoordinated_discard_disabled());
        enable_uncoordinated_discard();
        assert_eq!(uncoordinated_discard_disabled(), before);
    }

    #[test]
    fn second_nested_disable_is_not_a_fresh_transition() {
        disable_uncoordinated_discard();
        let second = disable_uncoordinated_discard();
        assert!(!second);
        enable_uncoordinated_discard();
        enable_uncoordinated_discard();
    }
}
