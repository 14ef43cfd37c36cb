// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg(target_os = "linux")]

use std::collections::HashMap;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::{Path, PathBuf};
use std::{fs, process};

use anyhow::Context;
use bin_tests::test_types::{CrashType, TestMode};
use bin_tests::{build_artifacts, ArtifactsBuild, BuildProfile};

#[test]
#[cfg_attr(miri, ignore)]
fn test_record_null_deref() {
    let run = run_crashing_bin(TestMode::Record, CrashType::NullDeref);
    let artifact = run.single_successful_artifact();
    assert_eq!(artifact["signal"]["signo"], libc::SIGSEGV);
    // SEGV_MAPERR at address 0.
    assert_eq!(artifact["signal"]["code"], 1);
    assert_eq!(artifact["signal"]["fault_address"], "0x0000000000000000");
    assert_eq!(artifact["pid"], run.pid);
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_record_sent_signals() {
    for crash_type in CrashType::all().iter().filter(|c| c.is_sent()) {
        let run = run_crashing_bin(TestMode::Record, *crash_type);
        let artifact = run.single_successful_artifact();
        assert_eq!(
            artifact["signal"]["signo"],
            crash_type.signal_number(),
            "{crash_type}"
        );
        assert!(
            artifact["signal"]["code"].as_i64().unwrap() <= 0,
            "{crash_type}"
        );
        assert_eq!(artifact["signal"]["sender_pid"], run.pid, "{crash_type}");
    }
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_record_stack_overflow() {
    for crash_type in [CrashType::StackOverflow, CrashType::StackOverflowThread] {
        let run = run_crashing_bin(TestMode::Record, crash_type);
        let artifact = run.single_successful_artifact();
        assert_eq!(artifact["signal"]["signo"], libc::SIGSEGV, "{crash_type}");
        // Raised by the guard page, not sent.
        assert!(
            artifact["signal"]["code"].as_i64().unwrap() > 0,
            "{crash_type}"
        );
        assert_eq!(artifact["signal"]["sender_pid"], 0, "{crash_type}");
        let on_main_thread = artifact["tid"] == artifact["pid"];
        assert_eq!(
            on_main_thread,
            crash_type == CrashType::StackOverflow,
            "{crash_type}"
        );
    }
}

#[test]
#[ignore] // This test is slow, only run it if explicitly opted in
fn test_record_null_deref_release() {
    let run = run_crashing_bin_with_profile(
        BuildProfile::Release,
        TestMode::Record,
        CrashType::NullDeref,
    );
    run.single_successful_artifact();
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_failing_writer_still_crashes() {
    for crash_type in [CrashType::NullDeref, CrashType::RaiseSigAbrt] {
        let run = run_crashing_bin(TestMode::FailingWriter, crash_type);
        let records = run.records();
        assert_eq!(records.len(), 1, "{records:?}");
        assert_eq!(records[0]["event"], "completion");
        assert_eq!(records[0]["success"], false);
        assert!(run.artifact_files().is_empty());
    }
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_declining_handler_falls_through() {
    let run = run_crashing_bin(TestMode::StackedDecline, CrashType::NullDeref);
    let records = run.records();
    let events: Vec<_> = records.iter().map(|r| r["event"].as_str().unwrap()).collect();
    assert_eq!(events, ["declined", "completion"]);
    assert_eq!(records[1]["success"], true);
    assert_eq!(run.artifact_files().len(), 1);
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_fast_path_skips_inspector() {
    let run = run_crashing_bin(TestMode::FastPath, CrashType::RaiseSigSegv);
    let records = run.records();
    assert_eq!(records.len(), 1, "{records:?}");
    assert_eq!(records[0]["event"], "fast_path");
    assert_eq!(records[0]["signo"], libc::SIGSEGV);
    assert!(run.artifact_files().is_empty());
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_all_modes_die_from_the_signal() {
    for mode in TestMode::all() {
        let run = run_crashing_bin(*mode, CrashType::KillSigAbrt);
        assert_eq!(mode.writes_artifact(), !run.artifact_files().is_empty(), "{mode}");
    }
}

struct CrashRun {
    // Keeps the output alive until the assertions are done.
    _tmpdir: tempfile::TempDir,
    output_dir: PathBuf,
    record_path: PathBuf,
    pid: u32,
}

impl CrashRun {
    fn records(&self) -> Vec<serde_json::Value> {
        let contents = fs::read_to_string(&self.record_path).unwrap_or_default();
        contents
            .lines()
            .map(|line| {
                serde_json::from_str(line)
                    .context("deserializing a callback record")
                    .unwrap()
            })
            .collect()
    }

    fn artifact_files(&self) -> Vec<PathBuf> {
        fs::read_dir(&self.output_dir)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect()
    }

    /// Checks that exactly one successful completion was recorded and returns its artifact.
    fn single_successful_artifact(&self) -> serde_json::Value {
        let records = self.records();
        assert_eq!(records.len(), 1, "{records:?}");
        let record = &records[0];
        assert_eq!(record["event"], "completion");
        assert_eq!(record["success"], true);

        let id = record["artifact_id"].as_str().unwrap();
        assert!(!id.is_empty());
        let id = uuid::Uuid::parse_str(id).unwrap();
        assert!(!id.is_nil());

        let path = PathBuf::from(record["artifact_path"].as_str().unwrap());
        assert_eq!(path, self.output_dir.join(format!("{id}.dmp")));
        assert_eq!(self.artifact_files(), vec![path.clone()]);

        let artifact = fs::read(&path)
            .context("reading crash artifact")
            .unwrap();
        serde_json::from_slice::<serde_json::Value>(&artifact)
            .context("deserializing crash artifact to json")
            .unwrap()
    }
}

fn run_crashing_bin(mode: TestMode, crash_type: CrashType) -> CrashRun {
    run_crashing_bin_with_profile(BuildProfile::Debug, mode, crash_type)
}

fn run_crashing_bin_with_profile(
    profile: BuildProfile,
    mode: TestMode,
    crash_type: CrashType,
) -> CrashRun {
    let crashcapture_bin = ArtifactsBuild::crashcapture_bin_test(profile);
    let artifacts: HashMap<_, _> = build_artifacts(&[&crashcapture_bin]).unwrap();

    let tmpdir = tempfile::TempDir::new().unwrap();
    let output_dir = extend_path(tmpdir.path(), "artifacts");
    fs::create_dir(&output_dir).unwrap();
    let record_path = extend_path(tmpdir.path(), "record.jsonl");

    let mut command = process::Command::new(&artifacts[&crashcapture_bin]);
    command
        .arg(mode.as_str())
        .arg(crash_type.as_str())
        .arg(&output_dir)
        .arg(&record_path);
    // SAFETY: setrlimit is async-signal safe. No core files for expected crashes.
    unsafe {
        command.pre_exec(|| {
            let no_core = libc::rlimit {
                rlim_cur: 0,
                rlim_max: 0,
            };
            libc::setrlimit(libc::RLIMIT_CORE, &no_core);
            Ok(())
        });
    }
    let mut p = command.spawn().unwrap();
    let pid = p.id();
    let exit_status = bin_tests::timeit!("exit after signal", {
        eprintln!("Waiting for exit");
        p.wait().unwrap()
    });
    assert_eq!(
        exit_status.signal(),
        Some(crash_type.signal_number()),
        "{mode} {crash_type}: {exit_status:?}"
    );

    CrashRun {
        _tmpdir: tmpdir,
        output_dir,
        record_path,
        pid,
    }
}

fn extend_path<T: AsRef<Path>>(parent: &Path, path: T) -> PathBuf {
    let mut parent = parent.to_path_buf();
    parent.push(path);
    parent
}
