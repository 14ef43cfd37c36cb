// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use libc::{_exit, c_int, EXIT_FAILURE};
use nix::errno::Errno;
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{getpid, gettid, Pid};

/// Kills the program without raising an abort or calling at_exit
pub fn terminate() -> ! {
    // Safety: No preconditions
    unsafe { _exit(EXIT_FAILURE) }
}

/// Blocks until `pid` terminates, retrying when interrupted by an unrelated signal.
/// Uses `__WALL` so that children created without an exit signal (see
/// [`super::clone_with_stack`]) are waited for as well.
// `waitpid` is async-signal safe, and there is no timeout: the caller decides how long a child
// may take by choosing what it runs.
pub fn wait_for_child_exit(pid: Pid) -> nix::Result<WaitStatus> {
    loop {
        match waitpid(pid, Some(WaitPidFlag::__WALL)) {
            Err(Errno::EINTR) => continue,
            result => return result,
        }
    }
}

/// True if the child ran to completion and exited with status 0.
pub fn exited_successfully(status: &WaitStatus) -> bool {
    matches!(status, WaitStatus::Exited(_, 0))
}

/// Queues `signum` for the calling thread (not just the process) with `tgkill`.
pub fn send_signal_to_current_thread(signum: c_int) -> nix::Result<()> {
    let pid = getpid();
    let tid = gettid();
    // SAFETY: tgkill has no memory safety preconditions.
    let res = unsafe {
        libc::syscall(
            libc::SYS_tgkill,
            pid.as_raw() as libc::c_long,
            tid.as_raw() as libc::c_long,
            signum as libc::c_long,
        )
    };
    Errno::result(res).map(drop)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::sys::signal::{self, SigSet, SigmaskHow, Signal};
    use std::process::Command;

    #[test]
    #[cfg_attr(miri, ignore)]
    fn test_wait_for_successful_child() {
        let child = Command::new("true").spawn().unwrap();
        let pid = Pid::from_raw(child.id() as i32);
        let status = wait_for_child_exit(pid).unwrap();
        assert!(exited_successfully(&status));
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn test_wait_for_failing_child() {
        let child = Command::new("sh").args(["-c", "exit 3"]).spawn().unwrap();
        let pid = Pid::from_raw(child.id() as i32);
        let status = wait_for_child_exit(pid).unwrap();
        assert_eq!(status, WaitStatus::Exited(pid, 3));
        assert!(!exited_successfully(&status));
    }

    #[test]
    fn test_wait_for_unknown_child() {
        assert_eq!(wait_for_child_exit(Pid::from_raw(999_999)), Err(Errno::ECHILD));
    }

    #[test]
    fn test_signal_current_thread() {
        // Block the signal on this thread so the send can be observed as pending.
        let mut mask = SigSet::empty();
        mask.add(Signal::SIGUSR2);
        let mut old = SigSet::empty();
        signal::pthread_sigmask(SigmaskHow::SIG_BLOCK, Some(&mask), Some(&mut old)).unwrap();

        send_signal_to_current_thread(libc::SIGUSR2).unwrap();
        let mut pending: libc::sigset_t = unsafe { std::mem::zeroed() };
        assert_eq!(unsafe { libc::sigpending(&mut pending) }, 0);
        assert_eq!(unsafe { libc::sigismember(&pending, libc::SIGUSR2) }, 1);

        // Consume the pending signal before unblocking.
        assert_eq!(mask.wait().unwrap(), Signal::SIGUSR2);
        signal::pthread_sigmask(SigmaskHow::SIG_SETMASK, Some(&old), None).unwrap();
    }
}
