// SPDX-License-Identifier: MPL-2.0

pub use family::{
    read_socket_addr_from_user, write_socket_addr_to_user, write_socket_addr_with_max_len,
    CSocketAddrFamily,
};

mod family;
mod ip;
mod unix;
mod vsock;
