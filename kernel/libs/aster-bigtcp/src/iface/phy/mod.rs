// SPDX-License-Identifier: MPL-2.0

mod ether;
mod ip;

pub use ether::EtherIface;
pub use ip::IpIface;
