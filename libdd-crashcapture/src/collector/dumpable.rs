// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::shared::constants::{SI_TKILL, SI_USER};
use libc::{c_int, pid_t, PR_SET_DUMPABLE};
use nix::errno::Errno;

/// Decides whether a signal may have come from inside this process.
///
/// Signals raised by the kernel (`code > 0`) are trusted. Signals sent with `kill`/`tgkill` are
/// only trusted when this process sent them: the inspector gets to ptrace us, and another process
/// must not be able to trigger that just by sending a signal.
pub(crate) fn is_trusted_signal(code: c_int, sender: pid_t, self_pid: pid_t) -> bool {
    if code > 0 {
        return true;
    }
    (code == SI_USER || code == SI_TKILL) && sender == self_pid
}

/// Allows the inspector to attach to this process, which setuid or `prctl` may have forbidden.
/// A single syscall, usable from the signal handler.
pub(crate) fn mark_dumpable() -> nix::Result<()> {
    // SAFETY: no pointers involved.
    Errno::result(unsafe { libc::prctl(PR_SET_DUMPABLE, 1, 0, 0, 0) }).map(drop)
}
