// SPDX-License-Identifier: MPL-2.0

pub(super) use core::{
    ops::{Deref, DerefMut, Range},
    time::Duration,
};

pub(super) use align_ext::AlignExt;
pub(super) use aster_block::{
    BLOCK_SIZE, BlockDevice, SECTOR_SIZE,
    bio::{BioDirection, BioSegment, BioStatus, BioWaiter},
    id::Bid,
};
pub(super) use ostd::{
    mm::{Frame, FrameAllocOptions, Segment, USegment, VmIo},
    sync::{RwMutex, RwMutexReadGuard, RwMutexWriteGuard},
};

pub(super) use super::utils::{Dirty, IsPowerOf};
pub(super) use crate::{
    fs::{
        file::InodeType,
        utils::{CStr256, DirentVisitor, Str16, Str64},
        vfs::page_cache::{CachePage, PageCache, PageCacheBackend},
    },
    prelude::*,
    time::UnixTime,
    vm::vmo::Vmo,
};
