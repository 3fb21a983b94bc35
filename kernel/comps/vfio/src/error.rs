// SPDX-License-Identifier: MPL-2.0

//! The error kinds reported by the guest-to-host DMA translator.

use alloc::string::String;
use core::fmt;

/// The kind of failure reported by a VFIO operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A [`crate::window::HostWindowTable::add`] call overlapped an existing window.
    ///
    /// This is a fatal programmer error; callers that hit it should treat it
    /// as a bug rather than a recoverable condition.
    OverlapWindow,
    /// No host window covers the requested IOVA range.
    NoWindow,
    /// A section was misaligned and is not on the known-safe-misalignment list.
    Alignment,
    /// The backend rejected a `map` request.
    BackendMapFail,
    /// The backend rejected an `unmap` request.
    BackendUnmapFail,
    /// A requested feature (DMA copy, dirty tracking, ...) is not supported.
    FeatureUnsupported,
    /// The projected mapping count for a RAM-discard region exceeds
    /// `dma_max_mappings`. Warning-only; never returned to a caller that
    /// would abort on it.
    DiscardIncompatible,
    /// The first error latched during container initialization.
    InitLatched,
    /// An invariant the caller is expected to uphold was violated.
    Internal,
}

/// An error produced by the guest-to-host DMA translator.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    msg: Option<String>,
}

impl Error {
    /// Creates a new error of `kind` with no message.
    pub const fn new(kind: ErrorKind) -> Self {
        Self { kind, msg: None }
    }

    /// Creates a new error of `kind` carrying a human-readable `message`.
    pub fn with_message(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            msg: Some(message.into()),
        }
    }

    /// Returns the error kind.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the attached message, if any.
    pub fn message(&self) -> Option<&str> {
        self.msg.as_deref()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.msg {
            Some(msg) => write!(f, "{:?}: {}", self.kind, msg),
            None => write!(f, "{:?}", self.kind),
        }
    }
}

/// The result type used throughout this crate.
pub type Result<T> = core::result::Result<T, Error>;

/// Returns early with an [`Error`] of the given kind.
macro_rules! bail {
    ($kind:expr) => {
        return Err($crate::error::Error::new($kind))
    };
    ($kind:expr, $($arg:tt)*) => {
        return Err($crate::error::Error::with_message($kind, alloc::format!($($arg)*)))
    };
}

pub(crate) use bail;
