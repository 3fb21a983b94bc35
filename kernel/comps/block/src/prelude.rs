// SPDX-License-Identifier: MPL-2.0

pub(crate) use alloc::{
    collections::{BTreeMap, VecDeque},
    string::String,
    sync::Arc,
    vec,
    vec::Vec,
};
pub(crate) use core::{
    any::Any,
    fmt::Debug,
    ops::Range,
    sync::atomic::{AtomicU32, AtomicUsize, Ordering},
};
