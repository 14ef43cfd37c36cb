// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::{ArtifactOutput, ArtifactRequest, ArtifactWriter, MappingInfo};
use anyhow::Context;
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::mem::ManuallyDrop;
use std::os::fd::FromRawFd;

/// Writes a JSON summary of the snapshot: signal, registers and the extra mappings.
/// It does not read the crashing process's memory.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonArtifactWriter;

#[derive(Debug, Serialize)]
struct SignalSummary {
    signo: i32,
    code: i32,
    sender_pid: i32,
    fault_address: String,
}

#[derive(Debug, Serialize)]
struct RegisterSummary {
    instruction_pointer: String,
    stack_pointer: String,
    general: Vec<u64>,
    has_float_state: bool,
}

#[derive(Debug, Serialize)]
struct ArtifactSummary<'a> {
    pid: i32,
    tid: i32,
    signal: SignalSummary,
    registers: RegisterSummary,
    mappings: &'a [MappingInfo],
}

impl<'a> ArtifactSummary<'a> {
    fn from_request(request: &'a ArtifactRequest<'a>) -> Self {
        let snapshot = request.snapshot;
        Self {
            pid: request.crashing_pid,
            tid: snapshot.tid(),
            signal: SignalSummary {
                signo: snapshot.signal_number(),
                code: snapshot.signal_code(),
                sender_pid: if snapshot.signal_code() <= 0 {
                    snapshot.sender_pid()
                } else {
                    0
                },
                fault_address: format!("{:#018x}", snapshot.fault_address()),
            },
            registers: RegisterSummary {
                instruction_pointer: format!("{:#018x}", snapshot.instruction_pointer()),
                stack_pointer: format!("{:#018x}", snapshot.stack_pointer()),
                general: snapshot.general_registers(),
                has_float_state: snapshot.float_state().is_some(),
            },
            mappings: request.mappings,
        }
    }
}

impl ArtifactWriter for JsonArtifactWriter {
    fn write_artifact(&self, request: &ArtifactRequest<'_>) -> anyhow::Result<()> {
        let summary = ArtifactSummary::from_request(request);
        match request.output {
            ArtifactOutput::Path(path) => {
                let mut file = File::create(path)
                    .with_context(|| format!("Failed to create {}", path.display()))?;
                serde_json::to_writer(&mut file, &summary)?;
                file.flush()?;
            }
            ArtifactOutput::Descriptor(fd) => {
                anyhow::ensure!(fd >= 0, "Invalid artifact descriptor {fd}");
                // The descriptor belongs to the caller: never close it.
                // SAFETY: the fd is open for the duration of the write.
                let mut file = ManuallyDrop::new(unsafe { File::from_raw_fd(fd) });
                serde_json::to_writer(&mut *file, &summary)?;
                file.flush()?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::constants::SI_USER;
    use crate::snapshot::{synthetic_siginfo, ContextSnapshot};
    use std::mem::MaybeUninit;
    use std::os::fd::AsRawFd;

    fn snapshot() -> ContextSnapshot {
        let info = synthetic_siginfo(libc::SIGSEGV, SI_USER, 99);
        let uc: libc::ucontext_t = unsafe { MaybeUninit::zeroed().assume_init() };
        unsafe { ContextSnapshot::from_signal(&info, (&uc as *const libc::ucontext_t).cast()) }
    }

    #[test]
    fn test_writes_summary_to_path() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("artifact.dmp");
        let snapshot = snapshot();
        let mappings = [MappingInfo {
            name: "libfoo.so".to_string(),
            identifier: [0xab; 16],
            start_address: 0x1000,
            size: 0x2000,
            file_offset: 0,
        }];
        JsonArtifactWriter.write_artifact(&ArtifactRequest {
            crashing_pid: 1234,
            snapshot: &snapshot,
            mappings: &mappings,
            output: ArtifactOutput::Path(&path),
        })?;

        let payload: serde_json::Value = serde_json::from_slice(&std::fs::read(&path)?)?;
        assert_eq!(payload["pid"], 1234);
        assert_eq!(payload["signal"]["signo"], libc::SIGSEGV);
        assert_eq!(payload["signal"]["sender_pid"], 99);
        assert_eq!(payload["mappings"][0]["name"], "libfoo.so");
        assert_eq!(payload["mappings"][0]["start_address"], 0x1000);
        Ok(())
    }

    #[test]
    fn test_writes_summary_to_descriptor_without_closing_it() -> anyhow::Result<()> {
        let file = tempfile::tempfile()?;
        let snapshot = snapshot();
        JsonArtifactWriter.write_artifact(&ArtifactRequest {
            crashing_pid: 1,
            snapshot: &snapshot,
            mappings: &[],
            output: ArtifactOutput::Descriptor(file.as_raw_fd()),
        })?;
        // Still open: metadata on the descriptor works.
        assert!(file.metadata()?.len() > 0);
        Ok(())
    }

    #[test]
    fn test_closure_writer() {
        let failing = |_: &ArtifactRequest<'_>| -> anyhow::Result<()> { anyhow::bail!("nope") };
        let snapshot = snapshot();
        let res = failing.write_artifact(&ArtifactRequest {
            crashing_pid: 1,
            snapshot: &snapshot,
            mappings: &[],
            output: ArtifactOutput::Descriptor(-1),
        });
        assert!(res.is_err());
    }
}
