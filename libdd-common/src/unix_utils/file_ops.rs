// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Raw descriptor I/O for code that may run inside a signal handler.
//! These only call `read(2)`, `write(2)` and `close(2)`, which are async-signal safe, and never
//! allocate.

use nix::errno::Errno;
use std::os::fd::RawFd;

/// Writes the whole buffer, retrying on `EINTR` and partial writes.
pub fn write_all_fd(fd: RawFd, mut buf: &[u8]) -> nix::Result<()> {
    while !buf.is_empty() {
        // SAFETY: the pointer and length come from a live slice.
        let res = unsafe { libc::write(fd, buf.as_ptr().cast(), buf.len()) };
        match Errno::result(res) {
            Ok(0) => return Err(Errno::EIO),
            Ok(n) => buf = &buf[n as usize..],
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Fills the whole buffer, retrying on `EINTR` and partial reads.
/// Hitting end-of-file before the buffer is full is reported as `EIO`.
pub fn read_exact_fd(fd: RawFd, mut buf: &mut [u8]) -> nix::Result<()> {
    while !buf.is_empty() {
        // SAFETY: the pointer and length come from a live slice.
        let res = unsafe { libc::read(fd, buf.as_mut_ptr().cast(), buf.len()) };
        match Errno::result(res) {
            Ok(0) => return Err(Errno::EIO),
            Ok(n) => buf = &mut buf[n as usize..],
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Closes a descriptor, ignoring negative (never opened) values.
pub fn close_fd(fd: RawFd) {
    if fd >= 0 {
        // SAFETY: closing a descriptor has no memory safety preconditions.
        let _ = unsafe { libc::close(fd) };
    }
}
