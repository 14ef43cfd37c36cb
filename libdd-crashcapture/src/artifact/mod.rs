// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The contract between the crash capture core and whatever produces the crash artifact.
//!
//! The writer runs inside the inspector process: a clone of the crashing process with its own
//! address space, a fresh stack, and permission to ptrace the crashing process. It may use the
//! heap and do regular I/O. What it reads from the crashing process and how it lays out the
//! artifact is up to the implementation.

mod json_writer;

pub use json_writer::JsonArtifactWriter;

use crate::snapshot::ContextSnapshot;
use libc::pid_t;
use serde::{Deserialize, Serialize};
use std::os::fd::RawFd;
use std::path::Path;

/// Extra information about a module mapped in the crashing process, for modules the
/// artifact writer could not discover on its own (e.g. code loaded from memory).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingInfo {
    pub name: String,
    /// Build identifier of the module.
    pub identifier: [u8; 16],
    pub start_address: usize,
    pub size: usize,
    pub file_offset: usize,
}

/// Where the artifact must be written.
#[derive(Debug, Clone, Copy)]
pub enum ArtifactOutput<'a> {
    Path(&'a Path),
    /// The writer must not close this descriptor.
    Descriptor(RawFd),
}

pub struct ArtifactRequest<'a> {
    /// The crashing process, which the caller of the writer may ptrace.
    pub crashing_pid: pid_t,
    pub snapshot: &'a ContextSnapshot,
    pub mappings: &'a [MappingInfo],
    pub output: ArtifactOutput<'a>,
}

pub trait ArtifactWriter: Send + Sync {
    fn write_artifact(&self, request: &ArtifactRequest<'_>) -> anyhow::Result<()>;
}

impl<F> ArtifactWriter for F
where
    F: Fn(&ArtifactRequest<'_>) -> anyhow::Result<()> + Send + Sync,
{
    fn write_artifact(&self, request: &ArtifactRequest<'_>) -> anyhow::Result<()> {
        (self)(request)
    }
}
