// SPDX-License-Identifier: MPL-2.0

//! This module contains the demos in OSDK section in the Asterinas Book.

mod create_os_projects;
mod test_and_run_projects;
mod work_in_workspace;
mod write_a_kernel_in_100_lines;
