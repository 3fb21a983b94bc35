// SPDX-License-Identifier: MPL-2.0

mod aux_vec;
mod elf_file;
mod init_stack;
mod load_elf;

pub use init_stack::INIT_STACK_SIZE;
pub use load_elf::{load_elf_to_vm, ElfLoadInfo};
