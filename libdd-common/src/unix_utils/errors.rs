// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#[derive(Debug, Eq, PartialEq, thiserror::Error)]
pub enum CloneError {
    #[error("Stack of {0} bytes is too small to run a cloned process")]
    StackTooSmall(usize),
    #[error("clone() failed: {0}")]
    CloneFailed(nix::Error),
}

#[derive(Debug, Eq, PartialEq, thiserror::Error)]
pub enum MapError {
    #[error("Cannot map an empty region")]
    EmptyRegion,
    #[error("mmap of {size} bytes failed: {errno}")]
    MapFailed { size: usize, errno: nix::Error },
    #[error("Failed to protect guard page: {0}")]
    ProtectFailed(nix::Error),
}
