// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Logging for code running in a compromised context (signal handlers, freshly cloned
//! processes). Messages go straight to stderr with `write(2)`: no formatting, no locking of the
//! std handles, no allocation.

use super::file_ops::write_all_fd;
use nix::errno::Errno;
use std::os::fd::RawFd;

const STDERR: RawFd = 2;

/// Writes `message` followed by a newline to stderr.
pub fn signal_safe_log(message: &str) {
    let _ = write_all_fd(STDERR, message.as_bytes());
    let _ = write_all_fd(STDERR, b"\n");
}

/// Writes `message: <errno description>` followed by a newline to stderr.
pub fn signal_safe_log_errno(message: &str, errno: Errno) {
    let _ = write_all_fd(STDERR, message.as_bytes());
    let _ = write_all_fd(STDERR, b": ");
    let _ = write_all_fd(STDERR, errno.desc().as_bytes());
    let _ = write_all_fd(STDERR, b"\n");
}
