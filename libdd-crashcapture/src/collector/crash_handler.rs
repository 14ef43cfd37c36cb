// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::altstack::ensure_alternate_stack;
use super::dump_orchestrator::{Callbacks, DumpOrchestrator, DumpOutcome};
use super::handler_stack::HandlerStack;
use super::inspector::{CloneInspector, Inspector};
use super::remote::RemoteInspector;
use crate::artifact::{ArtifactWriter, JsonArtifactWriter, MappingInfo};
use crate::shared::configuration::{CrashCaptureConfig, DumpTarget};
use crate::snapshot::ContextSnapshot;
use nix::sys::signal::Signal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

/// Captures crashes of this process into artifacts.
///
/// Any number of handlers may be alive at once. Faults are offered to them from the most recently
/// created to the oldest, until one of them handles it. A handler configured without
/// `install_handler` does not register the signal handlers itself, but still sees faults once
/// another handler has. Dropping the last handler gives the exception signals back to whatever
/// handled them before.
///
/// ```no_run
/// use libdd_crashcapture::{CrashCaptureConfig, CrashHandler};
///
/// # fn main() -> anyhow::Result<()> {
/// let config = CrashCaptureConfig::for_directory("/tmp/crashes")?;
/// let _handler = CrashHandler::builder(config)
///     .on_completion(|outcome| {
///         eprintln!("crash artifact {} written: {}", outcome.artifact_id, outcome.success);
///         outcome.success
///     })
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct CrashHandler {
    orchestrator: Arc<DumpOrchestrator>,
    installed: bool,
}

pub struct CrashHandlerBuilder {
    config: CrashCaptureConfig,
    callbacks: Callbacks,
    writer: Option<Arc<dyn ArtifactWriter>>,
    inspector: Option<Box<dyn Inspector>>,
}

impl CrashHandlerBuilder {
    /// Declines faults for which `filter` returns false, letting older handlers try.
    pub fn filter(mut self, filter: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        self.callbacks.filter = Some(Box::new(filter));
        self
    }

    /// The callback's return value decides whether the fault counts as handled. Without one,
    /// a fault is handled when the artifact was written.
    pub fn on_completion(
        mut self,
        completion: impl Fn(&DumpOutcome<'_>) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.callbacks.completion = Some(Box::new(completion));
        self
    }

    /// Runs in the crashing process, inside the signal handler, before any inspector is spawned.
    pub fn fast_path(
        mut self,
        fast_path: impl Fn(&ContextSnapshot) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.callbacks.fast_path = Some(Box::new(fast_path));
        self
    }

    /// Defaults to [`JsonArtifactWriter`]. Ignored when dumps are delegated or an inspector is
    /// set.
    pub fn artifact_writer(mut self, writer: impl ArtifactWriter + 'static) -> Self {
        self.writer = Some(Arc::new(writer));
        self
    }

    /// Replaces the clone-based (or delegating) inspector.
    pub fn inspector(mut self, inspector: impl Inspector + 'static) -> Self {
        self.inspector = Some(Box::new(inspector));
        self
    }

    pub fn build(self) -> anyhow::Result<CrashHandler> {
        let inspector: Box<dyn Inspector> = match (self.inspector, self.config.dump_server_fd()) {
            (Some(inspector), _) => inspector,
            (None, Some(fd)) => Box::new(RemoteInspector::new(fd)),
            (None, None) => Box::new(CloneInspector::new(
                self.writer.unwrap_or_else(|| Arc::new(JsonArtifactWriter)),
            )),
        };
        let orchestrator = Arc::new(DumpOrchestrator::new(
            self.config.target().clone(),
            self.callbacks,
            inspector,
        )?);

        let installed = self.config.install_handler();
        if installed && self.config.create_alt_stack() {
            // Without an altstack everything but stack overflows is still caught.
            if let Err(e) = ensure_alternate_stack() {
                tracing::warn!("Continuing without an alternate signal stack: {e}");
            }
        }
        HandlerStack::global().install(orchestrator.clone(), installed)?;
        Ok(CrashHandler {
            orchestrator,
            installed,
        })
    }
}

impl CrashHandler {
    pub fn builder(config: CrashCaptureConfig) -> CrashHandlerBuilder {
        CrashHandlerBuilder {
            config,
            callbacks: Callbacks::default(),
            writer: None,
            inspector: None,
        }
    }

    /// A handler without callbacks, writing artifacts with [`JsonArtifactWriter`].
    pub fn new(config: CrashCaptureConfig) -> anyhow::Result<Self> {
        Self::builder(config).build()
    }

    /// Writes an artifact for the calling thread right now, without a fault. Does not involve
    /// the signal handlers. Returns whether the dump was handled.
    pub fn write_dump(&self) -> bool {
        self.orchestrator.write_dump()
    }

    /// One-off dump of the calling thread into `dir`, reported to `completion`.
    pub fn write_dump_to_directory(
        dir: impl Into<PathBuf>,
        completion: impl Fn(&DumpOutcome<'_>) -> bool + Send + Sync + 'static,
    ) -> anyhow::Result<bool> {
        let config =
            CrashCaptureConfig::new(DumpTarget::Directory(dir.into()), false, false, None)?;
        let handler = Self::builder(config).on_completion(completion).build()?;
        Ok(handler.write_dump())
    }

    /// Describes a module the artifact writer cannot find by itself, e.g. code mapped from
    /// memory.
    pub fn add_mapping_info(
        &self,
        name: impl Into<String>,
        identifier: [u8; 16],
        start_address: usize,
        size: usize,
        file_offset: usize,
    ) {
        self.orchestrator.add_mapping_info(MappingInfo {
            name: name.into(),
            identifier,
            start_address,
            size,
            file_offset,
        });
    }

    /// Handles `signal` as if this process had sent it to itself, from the calling thread. The
    /// signal dispositions are left untouched.
    pub fn simulate_signal(&self, signal: Signal) -> bool {
        self.orchestrator.simulate_signal(signal as libc::c_int)
    }

    /// Identifier of the next artifact.
    pub fn artifact_id(&self) -> Uuid {
        self.orchestrator.artifact_id()
    }

    /// Where the next artifact goes, for directory targets.
    pub fn artifact_path(&self) -> Option<PathBuf> {
        self.orchestrator.artifact_path()
    }

    pub fn target(&self) -> &DumpTarget {
        self.orchestrator.target()
    }

    /// Whether this handler registered the signal handlers.
    pub fn is_installed(&self) -> bool {
        self.installed
    }

    /// Directory artifacts are written to, if any.
    pub fn directory(&self) -> Option<&Path> {
        match self.target() {
            DumpTarget::Directory(dir) => Some(dir.as_path()),
            DumpTarget::Descriptor(_) => None,
        }
    }
}

impl Drop for CrashHandler {
    fn drop(&mut self) {
        HandlerStack::global().uninstall(&self.orchestrator);
    }
}
