// SPDX-License-Identifier: MPL-2.0

pub(super) use core::{
    ops::{Deref, DerefMut, Range},
    time::Duration,
};

pub(super) use align_ext::AlignExt;
pub(super) use aster_block::{
    bio::{BioDirection, BioSegment, BioStatus, BioWaiter},
    id::Bid,
    BlockDevice, BLOCK_SIZE,
};
pub(super) use aster_rights::Full;
pub(super) use ostd::{
    mm::{Frame, FrameAllocOptions, Segment, USegment, VmIo},
    sync::{RwMutex, RwMutexReadGuard, RwMutexWriteGuard},
};

pub(super) use super::utils::{Dirty, IsPowerOf};
pub(super) use crate::{
    fs::utils::{
        CStr256, CachePage, DirentVisitor, InodeType, PageCache, PageCacheBackend, Str16, Str64,
    },
    prelude::*,
    time::UnixTime,
    vm::vmo::Vmo,
};
