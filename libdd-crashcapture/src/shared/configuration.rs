// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};
use std::os::fd::RawFd;
use std::path::PathBuf;

/// Where crash artifacts go.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DumpTarget {
    /// Each artifact is written to `<dir>/<artifact id>.dmp`.
    Directory(PathBuf),
    /// Artifacts are written to an already open descriptor owned by the caller.
    Descriptor(RawFd),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrashCaptureConfig {
    target: DumpTarget,
    // Register the OS signal handlers as soon as the handler is created
    install_handler: bool,
    create_alt_stack: bool,
    // Descriptor connected to a long-lived dump service, if dumps are delegated
    dump_server_fd: Option<RawFd>,
}

impl CrashCaptureConfig {
    pub fn new(
        target: DumpTarget,
        install_handler: bool,
        create_alt_stack: bool,
        dump_server_fd: Option<RawFd>,
    ) -> anyhow::Result<Self> {
        match &target {
            DumpTarget::Directory(dir) => anyhow::ensure!(
                !dir.as_os_str().is_empty(),
                "Dump directory must not be empty"
            ),
            DumpTarget::Descriptor(fd) => {
                anyhow::ensure!(*fd >= 0, "Invalid dump descriptor {fd}")
            }
        }
        if let Some(fd) = dump_server_fd {
            anyhow::ensure!(fd >= 0, "Invalid dump server descriptor {fd}");
        }
        // The altstack only matters to the signal handlers.
        anyhow::ensure!(
            !create_alt_stack || install_handler,
            "Cannot create an altstack without installing the signal handlers"
        );
        Ok(Self {
            target,
            install_handler,
            create_alt_stack,
            dump_server_fd,
        })
    }

    /// Installs the signal handlers and an altstack, writing artifacts into `dir`.
    pub fn for_directory(dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        Self::new(DumpTarget::Directory(dir.into()), true, true, None)
    }

    /// Installs the signal handlers and an altstack, writing artifacts to `fd`.
    pub fn for_descriptor(fd: RawFd) -> anyhow::Result<Self> {
        Self::new(DumpTarget::Descriptor(fd), true, true, None)
    }

    pub fn target(&self) -> &DumpTarget {
        &self.target
    }

    pub fn install_handler(&self) -> bool {
        self.install_handler
    }

    pub fn create_alt_stack(&self) -> bool {
        self.create_alt_stack
    }

    pub fn dump_server_fd(&self) -> Option<RawFd> {
        self.dump_server_fd
    }

    pub fn set_install_handler(&mut self, install_handler: bool) -> anyhow::Result<()> {
        anyhow::ensure!(
            install_handler || !self.create_alt_stack,
            "Cannot create an altstack without installing the signal handlers"
        );
        self.install_handler = install_handler;
        Ok(())
    }

    pub fn set_create_alt_stack(&mut self, create_alt_stack: bool) -> anyhow::Result<()> {
        anyhow::ensure!(
            !create_alt_stack || self.install_handler,
            "Cannot create an altstack without installing the signal handlers"
        );
        self.create_alt_stack = create_alt_stack;
        Ok(())
    }
}
