// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::inspector::Inspector;
use crate::artifact::ArtifactRequest;
use crate::shared::dump_request::DumpRequestHeader;
use libdd_common::unix_utils::{read_exact_fd, signal_safe_log_errno, write_all_fd};
use std::os::fd::RawFd;

/// Forwards snapshots to a long-lived dump service over a connected descriptor (usually one end
/// of a socket pair) and reports the service's answer. No process is cloned: the service does
/// the inspection and owns the artifact's destination.
pub struct RemoteInspector {
    fd: RawFd,
}

impl RemoteInspector {
    /// The descriptor stays owned by the caller.
    pub fn new(fd: RawFd) -> Self {
        Self { fd }
    }

    fn forward(&self, request: &ArtifactRequest<'_>) -> nix::Result<bool> {
        let payload = request.snapshot.as_bytes();
        let header = DumpRequestHeader::new(request.crashing_pid, payload.len() as u32);
        write_all_fd(self.fd, &header.to_bytes())?;
        write_all_fd(self.fd, payload)?;
        let mut answer = [0u8; 1];
        read_exact_fd(self.fd, &mut answer)?;
        Ok(answer[0] == 1)
    }
}

impl Inspector for RemoteInspector {
    fn request_inspection(&self, request: &ArtifactRequest<'_>) -> bool {
        match self.forward(request) {
            Ok(success) => success,
            Err(errno) => {
                signal_safe_log_errno("Failed to forward the dump request", errno);
                false
            }
        }
    }

    fn is_out_of_process(&self) -> bool {
        true
    }
}
