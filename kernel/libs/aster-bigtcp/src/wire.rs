// SPDX-License-Identifier: MPL-2.0

pub use smoltcp::wire::{
    EthernetAddress, IpAddress, IpCidr, IpEndpoint, IpProtocol, IpRepr, Ipv4Address, Ipv4Cidr,
    Ipv4Packet,
};

pub type PortNum = u16;
