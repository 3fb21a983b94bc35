// SPDX-License-Identifier: MPL-2.0

#[expect(clippy::module_inception)]
mod events;
mod io_events;
mod observer;
mod subject;

pub use io_events::IoEvents;

pub use self::{
    events::{Events, EventsFilter},
    observer::Observer,
    subject::Subject,
};
