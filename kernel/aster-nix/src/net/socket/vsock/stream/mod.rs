// SPDX-License-Identifier: MPL-2.0

pub mod connected;
pub mod init;
pub mod listen;

pub mod socket;
pub use socket::VsockStreamSocket;
