// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::shared::constants::CONTINUE_MESSAGE;
use libc::O_CLOEXEC;
use libdd_common::unix_utils::{close_fd, read_exact_fd, signal_safe_log_errno, write_all_fd};
use nix::errno::Errno;
use std::os::fd::RawFd;

/// One-shot channel telling the inspector it may start reading the crashing process.
///
/// Both ends live in the descriptor table shared by the crashing process and the inspector
/// (`CLONE_FILES`). If the pipe cannot be created the channel degrades to a no-op: the inspector
/// starts right away and may race the ptrace permission grant, which is still better than no
/// artifact at all.
pub(crate) struct RendezvousPipe {
    read_fd: RawFd,
    write_fd: RawFd,
}

impl RendezvousPipe {
    pub(crate) fn new() -> Self {
        let mut fds: [RawFd; 2] = [-1, -1];
        // SAFETY: `fds` has room for the two descriptors.
        let rval = unsafe { libc::pipe2(fds.as_mut_ptr(), O_CLOEXEC) };
        if let Err(errno) = Errno::result(rval) {
            signal_safe_log_errno("Failed to create the rendezvous pipe", errno);
            return Self::degraded();
        }
        Self {
            read_fd: fds[0],
            write_fd: fds[1],
        }
    }

    fn degraded() -> Self {
        Self {
            read_fd: -1,
            write_fd: -1,
        }
    }

    pub(crate) fn is_degraded(&self) -> bool {
        self.read_fd < 0 || self.write_fd < 0
    }

    /// Crashing process side. Returns false if nothing could be sent.
    pub(crate) fn signal_continue(&self) -> bool {
        if self.is_degraded() {
            return false;
        }
        match write_all_fd(self.write_fd, &[CONTINUE_MESSAGE]) {
            Ok(()) => true,
            Err(errno) => {
                signal_safe_log_errno("Failed to signal the inspector", errno);
                false
            }
        }
    }

    /// Inspector side. Blocks until the crashing process has signalled.
    pub(crate) fn wait_for_continue(&self) -> bool {
        if self.is_degraded() {
            return false;
        }
        let mut message = [0u8; 1];
        match read_exact_fd(self.read_fd, &mut message) {
            Ok(()) => message[0] == CONTINUE_MESSAGE,
            Err(errno) => {
                signal_safe_log_errno("Failed to wait for the crashing process", errno);
                false
            }
        }
    }

    pub(crate) fn close(&mut self) {
        close_fd(self.read_fd);
        close_fd(self.write_fd);
        self.read_fd = -1;
        self.write_fd = -1;
    }
}

impl Drop for RendezvousPipe {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_continue_is_received() {
        let mut pipe = RendezvousPipe::new();
        assert!(!pipe.is_degraded());
        assert!(pipe.signal_continue());
        assert!(pipe.wait_for_continue());
        pipe.close();
        assert!(pipe.is_degraded());
    }

    #[test]
    fn test_wait_across_threads() {
        let pipe = std::sync::Arc::new(RendezvousPipe::new());
        let waiter = {
            let pipe = pipe.clone();
            std::thread::spawn(move || pipe.wait_for_continue())
        };
        assert!(pipe.signal_continue());
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn test_degraded_pipe_does_not_block() {
        let mut pipe = RendezvousPipe::degraded();
        assert!(pipe.is_degraded());
        assert!(!pipe.signal_continue());
        assert!(!pipe.wait_for_continue());
        // Closing a degraded pipe is harmless, as is closing twice.
        pipe.close();
        pipe.close();
    }
}
