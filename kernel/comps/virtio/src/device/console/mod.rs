// SPDX-License-Identifier: MPL-2.0

pub mod config;
pub mod device;

pub const DEVICE_NAME: &str = "Virtio-Console";
