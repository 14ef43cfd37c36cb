// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg(target_os = "linux")]

mod clone;
mod errors;
mod file_ops;
mod page_allocator;
mod process;
mod signal_safe_log;

pub use clone::{clone_with_stack, CloneEntry, MIN_CLONE_STACK_SIZE};
pub use errors::{CloneError, MapError};
pub use file_ops::{close_fd, read_exact_fd, write_all_fd};
pub use page_allocator::PageBuffer;
pub use process::{
    exited_successfully, send_signal_to_current_thread, terminate, wait_for_child_exit,
};
pub use signal_safe_log::{signal_safe_log, signal_safe_log_errno};
