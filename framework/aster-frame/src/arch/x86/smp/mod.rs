// SPDX-License-Identifier: MPL-2.0

mod boot;

pub(crate) use boot::{get_processor_info, init_boot_stack_array, send_boot_ipis};
