// SPDX-License-Identifier: MPL-2.0

pub(crate) use crate::{
    error::{Errno::*, Error},
    layers::bio::{BLOCK_SIZE, BlockId},
    os::{Arc, Box, String, ToString, Vec, Weak},
    return_errno, return_errno_with_msg,
    util::{Aead as _, RandomInit, Rng as _, Skcipher as _, align_down, align_up},
};

pub(crate) type Result<T> = core::result::Result<T, Error>;

pub(crate) use core::fmt::{self, Debug};

pub(crate) use log::{debug, error, info, trace, warn};
