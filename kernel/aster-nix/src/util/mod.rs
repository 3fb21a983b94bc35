// SPDX-License-Identifier: MPL-2.0

mod iovec;
pub mod net;
pub mod random;

pub use iovec::{copy_iovs_from_user, IoVec};
