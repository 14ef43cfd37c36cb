// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Service side of the delegation channel: reads the snapshot a crashing process forwarded and
//! tells it whether an artifact was produced. Runs in a healthy process, in normal context.

use crate::shared::constants::{DUMP_REQUEST_MAGIC, DUMP_REQUEST_VERSION};
use crate::shared::dump_request::DumpRequestHeader;
use crate::snapshot::ContextSnapshot;
use libc::pid_t;
use libdd_common::unix_utils::{read_exact_fd, write_all_fd};
use std::mem::size_of;
use std::os::fd::RawFd;

#[derive(Debug, thiserror::Error)]
pub enum ReceiveError {
    #[error("Failed to read the dump request: {0}")]
    Io(#[from] nix::Error),
    #[error("Unexpected dump request magic {0:#x}")]
    BadMagic(u32),
    #[error("Unsupported dump request version {0}")]
    UnsupportedVersion(u32),
    #[error("Snapshot is {actual} bytes, expected {expected}")]
    SizeMismatch { expected: usize, actual: usize },
}

#[derive(Debug)]
pub struct DumpRequest {
    fd: RawFd,
    pid: pid_t,
    snapshot: ContextSnapshot,
}

impl DumpRequest {
    /// Blocks until a full request has been read from `fd`.
    pub fn receive(fd: RawFd) -> Result<Self, ReceiveError> {
        let mut header = [0u8; DumpRequestHeader::LEN];
        read_exact_fd(fd, &mut header)?;
        let header = DumpRequestHeader::from_bytes(&header);
        if header.magic != DUMP_REQUEST_MAGIC {
            return Err(ReceiveError::BadMagic(header.magic));
        }
        if header.version != DUMP_REQUEST_VERSION {
            return Err(ReceiveError::UnsupportedVersion(header.version));
        }
        let expected = size_of::<ContextSnapshot>();
        if header.size as usize != expected {
            return Err(ReceiveError::SizeMismatch {
                expected,
                actual: header.size as usize,
            });
        }
        let mut payload = vec![0u8; expected];
        read_exact_fd(fd, &mut payload)?;
        let snapshot = ContextSnapshot::from_bytes(&payload).ok_or(ReceiveError::SizeMismatch {
            expected,
            actual: payload.len(),
        })?;
        tracing::debug!(pid = header.pid, "Received dump request");
        Ok(Self {
            fd,
            pid: header.pid,
            snapshot,
        })
    }

    /// The crashing process. It stays blocked until [`DumpRequest::acknowledge`] is called.
    pub fn pid(&self) -> pid_t {
        self.pid
    }

    pub fn snapshot(&self) -> &ContextSnapshot {
        &self.snapshot
    }

    /// Unblocks the crashing process, telling it whether the artifact was produced.
    pub fn acknowledge(&self, success: bool) -> nix::Result<()> {
        write_all_fd(self.fd, &[success as u8])
    }
}
