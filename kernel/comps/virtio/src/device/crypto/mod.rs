// SPDX-License-Identifier: MPL-2.0

pub mod device;
pub mod config;
pub mod session;

pub static DEVICE_NAME: &str = "Virtio-Crypto";