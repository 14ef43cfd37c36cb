// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

// Functions called from the signal handler in this file must stay async-signal safe until the
// work is handed to the inspector: memory copies, and the following syscalls.
// <https://man7.org/linux/man-pages/man7/signal-safety.7.html>
// - clone
// - close
// - getpid / gettid
// - mmap / munmap
// - pipe2
// - prctl
// - read / write
// - sched_yield
// - waitpid

use super::dumpable::{is_trusted_signal, mark_dumpable};
use super::inspector::Inspector;
use crate::artifact::{ArtifactOutput, ArtifactRequest, MappingInfo};
use crate::shared::configuration::DumpTarget;
use crate::shared::constants::{ARTIFACT_EXTENSION, SI_USER};
use crate::snapshot::{capture_current_context, synthetic_siginfo, ContextSnapshot};
use anyhow::Context;
use libc::{c_int, c_void, siginfo_t, ucontext_t};
use libdd_common::unix_utils::{signal_safe_log, signal_safe_log_errno};
use libdd_common::MutexExt;
use nix::unistd::getpid;
use std::mem::MaybeUninit;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// Called before anything else when a fault is offered to a handler. Returning false declines the
/// fault, which is then offered to the handler installed before this one.
pub type FilterCallback = Box<dyn Fn() -> bool + Send + Sync>;

/// Called once the inspector is done. Its return value tells whether the fault was handled.
/// When called for a fault, it must not call back into the handler: its state is locked.
pub type CompletionCallback = Box<dyn Fn(&DumpOutcome<'_>) -> bool + Send + Sync>;

/// Called in the crashing process with the snapshot, before any inspector is spawned. Returning
/// true marks the fault as handled and skips the inspector.
pub type FastPathCallback = Box<dyn Fn(&ContextSnapshot) -> bool + Send + Sync>;

/// What the completion callback learns about a dump.
#[derive(Debug, Clone, Copy)]
pub struct DumpOutcome<'a> {
    /// For descriptor targets, a duplicate that stays valid even if the writer closed its copy.
    pub target: &'a DumpTarget,
    pub artifact_id: Uuid,
    /// Only set for directory targets.
    pub artifact_path: Option<&'a Path>,
    pub success: bool,
}

#[derive(Default)]
pub(crate) struct Callbacks {
    pub filter: Option<FilterCallback>,
    pub completion: Option<CompletionCallback>,
    pub fast_path: Option<FastPathCallback>,
}

pub(crate) struct DumpState {
    artifact_id: Uuid,
    // Computed ahead of time: the crash path cannot format.
    artifact_path: Option<PathBuf>,
    mappings: Vec<MappingInfo>,
}

impl DumpState {
    fn new(target: &DumpTarget) -> Self {
        let mut state = Self {
            artifact_id: Uuid::nil(),
            artifact_path: None,
            mappings: Vec::new(),
        };
        state.rotate(target);
        state
    }

    fn rotate(&mut self, target: &DumpTarget) {
        self.artifact_id = Uuid::new_v4();
        self.artifact_path = match target {
            DumpTarget::Directory(dir) => {
                Some(dir.join(format!("{}.{ARTIFACT_EXTENSION}", self.artifact_id)))
            }
            DumpTarget::Descriptor(_) => None,
        };
    }
}

// Bounds the wait for a normal-context caller (e.g. `add_mapping_info` on another thread) to
// release the per-handler state.
const STATE_LOCK_ATTEMPTS: usize = 1000;

/// Per-handler crash logic: decides whether to take a fault, snapshots it and drives the
/// inspector.
pub(crate) struct DumpOrchestrator {
    target: DumpTarget,
    completion_target: DumpTarget,
    _completion_fd: Option<OwnedFd>,
    callbacks: Callbacks,
    inspector: Box<dyn Inspector>,
    state: Mutex<DumpState>,
}

impl DumpOrchestrator {
    pub(crate) fn new(
        target: DumpTarget,
        callbacks: Callbacks,
        inspector: Box<dyn Inspector>,
    ) -> anyhow::Result<Self> {
        let (completion_target, completion_fd) = match &target {
            DumpTarget::Directory(dir) => (DumpTarget::Directory(dir.clone()), None),
            DumpTarget::Descriptor(fd) => {
                let fd = duplicate_fd(*fd)?;
                (DumpTarget::Descriptor(fd.as_raw_fd()), Some(fd))
            }
        };
        Ok(Self {
            state: Mutex::new(DumpState::new(&target)),
            target,
            completion_target,
            _completion_fd: completion_fd,
            callbacks,
            inspector,
        })
    }

    /// Offers a fault to this handler. Returns true if it was handled.
    ///
    /// # Safety
    /// `info` and `uc` must be null or the arguments of an `SA_SIGINFO` signal handler.
    pub(crate) unsafe fn handle_signal(
        &self,
        info: *const siginfo_t,
        uc: *const c_void,
    ) -> bool {
        if info.is_null() || uc.is_null() {
            return false;
        }
        if let Some(filter) = &self.callbacks.filter {
            if !filter() {
                return false;
            }
        }

        // SAFETY: upheld by the caller.
        let (code, sender) = unsafe { ((*info).si_code, (*info).si_pid()) };
        if is_trusted_signal(code, sender, getpid().as_raw()) {
            if let Err(errno) = mark_dumpable() {
                signal_safe_log_errno("Failed to mark the process dumpable", errno);
            }
        }

        // SAFETY: upheld by the caller.
        let snapshot = unsafe { ContextSnapshot::from_signal(info, uc) };
        if let Some(fast_path) = &self.callbacks.fast_path {
            if fast_path(&snapshot) {
                return true;
            }
        }
        self.generate_dump(&snapshot)
    }

    /// Runs the inspector and the completion callback for `snapshot`. The handler's state stays
    /// locked throughout, as nothing can be copied out of it on the crash path.
    pub(crate) fn generate_dump(&self, snapshot: &ContextSnapshot) -> bool {
        let Some(state) = self.lock_state_for_crash() else {
            signal_safe_log("Crash handler state is busy, skipping the dump");
            return false;
        };
        let success = self.inspect(&state, snapshot);
        self.complete(state.artifact_id, state.artifact_path.as_deref(), success)
    }

    fn inspect(&self, state: &DumpState, snapshot: &ContextSnapshot) -> bool {
        let output = match (&self.target, &state.artifact_path) {
            (DumpTarget::Directory(_), Some(path)) => ArtifactOutput::Path(path),
            (DumpTarget::Descriptor(fd), _) => ArtifactOutput::Descriptor(*fd),
            (DumpTarget::Directory(_), None) => return false,
        };
        let request = ArtifactRequest {
            crashing_pid: snapshot.pid(),
            snapshot,
            mappings: &state.mappings,
            output,
        };
        self.inspector.request_inspection(&request)
    }

    fn complete(&self, artifact_id: Uuid, artifact_path: Option<&Path>, success: bool) -> bool {
        // A dump service owns the artifact, its answer is final.
        if self.inspector.is_out_of_process() {
            return success;
        }
        match &self.callbacks.completion {
            Some(completion) => completion(&DumpOutcome {
                target: &self.completion_target,
                artifact_id,
                artifact_path,
                success,
            }),
            None => success,
        }
    }

    /// Dumps the calling thread without a fault; the next artifact gets a new identifier. The
    /// completion callback runs with the state unlocked, so it may query this handler.
    pub(crate) fn write_dump(&self) -> bool {
        if let Err(errno) = mark_dumpable() {
            tracing::warn!("Failed to mark the process dumpable: {errno}");
        }
        let Some(snapshot) = ContextSnapshot::from_current_thread() else {
            tracing::warn!("Cannot capture the current thread's context on this platform");
            return false;
        };
        let (success, artifact_id, artifact_path) = {
            let state = self.state.lock_or_recover();
            let success = self.inspect(&state, &snapshot);
            (success, state.artifact_id, state.artifact_path.clone())
        };
        let handled = self.complete(artifact_id, artifact_path.as_deref(), success);
        tracing::debug!(%artifact_id, handled, "Wrote dump");
        self.state.lock_or_recover().rotate(&self.target);
        handled
    }

    /// Runs [`DumpOrchestrator::handle_signal`] as if this process had sent itself `signum`.
    #[inline(never)]
    pub(crate) fn simulate_signal(&self, signum: c_int) -> bool {
        let info = synthetic_siginfo(signum, SI_USER, getpid().as_raw());
        // SAFETY: all-zero is a valid ucontext_t.
        let mut uc: ucontext_t = unsafe { MaybeUninit::zeroed().assume_init() };
        // The float state pointer is only valid while `uc` stays in this frame.
        // SAFETY: `uc` is writable.
        if !unsafe { capture_current_context(&mut uc) } {
            tracing::warn!("Cannot capture the current thread's context on this platform");
            return false;
        }
        // SAFETY: both point to valid, initialized values.
        let handled =
            unsafe { self.handle_signal(&info, (&uc as *const ucontext_t).cast::<c_void>()) };
        if handled {
            self.state.lock_or_recover().rotate(&self.target);
        }
        handled
    }

    pub(crate) fn add_mapping_info(&self, mapping: MappingInfo) {
        self.state.lock_or_recover().mappings.push(mapping);
    }

    pub(crate) fn artifact_id(&self) -> Uuid {
        self.state.lock_or_recover().artifact_id
    }

    pub(crate) fn artifact_path(&self) -> Option<PathBuf> {
        self.state.lock_or_recover().artifact_path.clone()
    }

    pub(crate) fn target(&self) -> &DumpTarget {
        &self.target
    }

    fn lock_state_for_crash(&self) -> Option<MutexGuard<'_, DumpState>> {
        for _ in 0..STATE_LOCK_ATTEMPTS {
            if let Some(state) = self.state.try_lock_or_recover() {
                return Some(state);
            }
            std::thread::yield_now();
        }
        None
    }
}

fn duplicate_fd(fd: RawFd) -> anyhow::Result<OwnedFd> {
    // SAFETY: dup has no memory safety preconditions.
    let dup = nix::errno::Errno::result(unsafe { libc::dup(fd) })
        .with_context(|| format!("Failed to duplicate dump descriptor {fd}"))?;
    // SAFETY: `dup` is a freshly created descriptor owned by nobody else.
    Ok(unsafe { OwnedFd::from_raw_fd(dup) })
}
