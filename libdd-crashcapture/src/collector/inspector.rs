// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::rendezvous::RendezvousPipe;
use crate::artifact::{ArtifactRequest, ArtifactWriter};
use crate::shared::constants::INSPECTOR_STACK_SIZE;
use libc::{c_int, c_void, PR_SET_PTRACER};
use libdd_common::unix_utils::{
    clone_with_stack, exited_successfully, signal_safe_log, signal_safe_log_errno,
    wait_for_child_exit, CloneError, MapError, PageBuffer,
};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Produces the artifact for a snapshot taken in this process.
///
/// Implementations are called from the signal handler, with the crash lock held: they must not
/// allocate or take locks they do not own until the work is handed to another process.
pub trait Inspector: Send + Sync {
    /// Returns true if the artifact was produced.
    fn request_inspection(&self, request: &ArtifactRequest<'_>) -> bool;

    /// Out-of-process inspectors report their own outcome; the completion callback is skipped.
    fn is_out_of_process(&self) -> bool {
        false
    }
}

/// Clones an inspector process, lets it ptrace this one, and runs the artifact writer in it.
pub struct CloneInspector {
    writer: Arc<dyn ArtifactWriter>,
}

impl CloneInspector {
    pub fn new(writer: Arc<dyn ArtifactWriter>) -> Self {
        Self { writer }
    }
}

// Handed to the inspector through `clone`; lives on the crashing thread's stack, which the
// inspector sees in its own copy of the address space.
struct InspectorArgs<'a> {
    writer: &'a dyn ArtifactWriter,
    request: &'a ArtifactRequest<'a>,
    rendezvous: &'a RendezvousPipe,
}

extern "C" fn inspector_entry(arg: *mut c_void) -> c_int {
    // SAFETY: `arg` is the `InspectorArgs` passed by `request_inspection`, copied along with the
    // rest of the address space.
    let args = unsafe { &*arg.cast::<InspectorArgs<'_>>() };
    // Degraded mode: go ahead without the permission grant.
    let _ = args.rendezvous.wait_for_continue();

    // This is a separate process with a fresh stack: the heap and formatting are usable again.
    let result = catch_unwind(AssertUnwindSafe(|| args.writer.write_artifact(args.request)));
    match result {
        Ok(Ok(())) => 0,
        Ok(Err(e)) => {
            signal_safe_log(&format!("Failed to write the crash artifact: {e:#}"));
            1
        }
        Err(_) => {
            signal_safe_log("Artifact writer panicked");
            1
        }
    }
}

fn log_map_error(error: &MapError) {
    match error {
        MapError::MapFailed { errno, .. } => {
            signal_safe_log_errno("Failed to map the inspector stack", *errno)
        }
        MapError::ProtectFailed(errno) => {
            signal_safe_log_errno("Failed to protect the inspector stack", *errno)
        }
        MapError::EmptyRegion => signal_safe_log("Failed to map the inspector stack"),
    }
}

impl Inspector for CloneInspector {
    fn request_inspection(&self, request: &ArtifactRequest<'_>) -> bool {
        // The heap may be corrupted: the inspector's stack comes straight from mmap.
        let mut stack = match PageBuffer::new(INSPECTOR_STACK_SIZE) {
            Ok(stack) => stack,
            Err(e) => {
                log_map_error(&e);
                return false;
            }
        };
        let mut rendezvous = RendezvousPipe::new();
        let mut args = InspectorArgs {
            writer: &*self.writer,
            request,
            rendezvous: &rendezvous,
        };

        // SAFETY: `args` and `stack` outlive the child, which is waited for below.
        let spawned = unsafe {
            clone_with_stack(
                inspector_entry,
                stack.as_mut_slice(),
                (&mut args as *mut InspectorArgs<'_>).cast(),
            )
        };
        let child = match spawned {
            Ok(child) => child,
            Err(CloneError::CloneFailed(errno)) => {
                signal_safe_log_errno("Failed to clone the inspector", errno);
                rendezvous.close();
                return false;
            }
            Err(CloneError::StackTooSmall(_)) => {
                signal_safe_log("Inspector stack is too small");
                rendezvous.close();
                return false;
            }
        };

        // Yama may restrict ptrace to ancestors; EINVAL when it is not enabled, which is fine.
        // SAFETY: no pointers involved.
        let _ = unsafe { libc::prctl(PR_SET_PTRACER, child.as_raw() as libc::c_ulong, 0, 0, 0) };
        rendezvous.signal_continue();

        let success = match wait_for_child_exit(child) {
            Ok(status) => exited_successfully(&status),
            Err(errno) => {
                signal_safe_log_errno("Failed to wait for the inspector", errno);
                false
            }
        };
        rendezvous.close();
        success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{ArtifactOutput, JsonArtifactWriter};
    use crate::snapshot::ContextSnapshot;
    use std::io::{Read, Seek, SeekFrom};
    use std::os::fd::AsRawFd;

    fn inspect(writer: Arc<dyn ArtifactWriter>, output: ArtifactOutput<'_>) -> bool {
        let snapshot = ContextSnapshot::from_current_thread().unwrap_or_else(|| {
            ContextSnapshot::from_bytes(&vec![0u8; std::mem::size_of::<ContextSnapshot>()])
                .unwrap()
        });
        CloneInspector::new(writer).request_inspection(&ArtifactRequest {
            crashing_pid: std::process::id() as i32,
            snapshot: &snapshot,
            mappings: &[],
            output,
        })
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn test_writer_runs_in_inspector() {
        let mut file = tempfile::tempfile().unwrap();
        assert!(inspect(
            Arc::new(JsonArtifactWriter),
            ArtifactOutput::Descriptor(file.as_raw_fd())
        ));
        // The inspector shares the open file description, offset included.
        file.seek(SeekFrom::Start(0)).unwrap();
        let mut contents = String::new();
        file.read_to_string(&mut contents).unwrap();
        let payload: serde_json::Value = serde_json::from_str(&contents).unwrap();
        assert_eq!(payload["pid"], std::process::id());
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn test_failing_writer_reports_failure() {
        let writer = |_: &ArtifactRequest<'_>| -> anyhow::Result<()> { anyhow::bail!("broken") };
        assert!(!inspect(Arc::new(writer), ArtifactOutput::Descriptor(-1)));
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn test_writer_state_stays_in_inspector() {
        use std::sync::atomic::{AtomicBool, Ordering};
        let called = Arc::new(AtomicBool::new(false));
        let writer = {
            let called = called.clone();
            move |_: &ArtifactRequest<'_>| -> anyhow::Result<()> {
                called.store(true, Ordering::SeqCst);
                Ok(())
            }
        };
        assert!(inspect(Arc::new(writer), ArtifactOutput::Descriptor(-1)));
        // The inspector has its own address space.
        assert!(!called.load(Ordering::SeqCst));
    }
}
