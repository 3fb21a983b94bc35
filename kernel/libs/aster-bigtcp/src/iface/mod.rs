// SPDX-License-Identifier: MPL-2.0

mod common;
#[allow(clippy::module_inception)]
mod iface;
mod phy;
mod poll;
mod port;
mod sched;
mod time;

pub use common::BoundPort;
pub use iface::Iface;
pub use phy::{EtherIface, IpIface};
pub use port::BindPortConfig;
pub use sched::ScheduleNextPoll;
