// SPDX-License-Identifier: MPL-2.0

mod condvar;

#[allow(unused_imports)]
pub use self::condvar::{Condvar, LockErr};
