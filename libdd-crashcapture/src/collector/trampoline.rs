// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::handler_stack::{
    current_disposition, register_trampoline, reset_to_default, HandlerStack,
};
use libc::{c_int, c_void, siginfo_t, SA_SIGINFO};
use libdd_common::unix_utils::{send_signal_to_current_thread, signal_safe_log, terminate};

/// The entry point the kernel calls for every exception signal.
///
/// Another library may have replaced the disposition with a plain `sa_handler` registration that
/// still ends up calling us (e.g. by chaining to the handler it found). The arguments are then
/// garbage: the trampoline re-registers itself and returns, and the fault is delivered again
/// with proper arguments.
pub(crate) extern "C" fn signal_trampoline(signum: c_int, info: *mut siginfo_t, uc: *mut c_void) {
    if repair_disposition(signum) {
        return;
    }

    let stack = HandlerStack::global();
    if info.is_null() || uc.is_null() {
        signal_safe_log("Crash handler called without signal information");
        stack.restore_previous();
        return;
    }

    // SAFETY: the kernel hands valid arguments to SA_SIGINFO handlers.
    let code = unsafe { (*info).si_code };
    // SAFETY: as above.
    unsafe { stack.handle_fault(signum, info, uc) };

    // Faults raised by an instruction happen again when we return. Signals sent with kill, tgkill
    // or sigqueue (si_code <= 0) do not, and would be lost.
    if code <= 0 && send_signal_to_current_thread(signum).is_err() {
        terminate();
    }
}

/// Returns true if the disposition for `signum` lacked `SA_SIGINFO` and was re-registered.
fn repair_disposition(signum: c_int) -> bool {
    let Ok(current) = current_disposition(signum) else {
        return false;
    };
    if current.sa_flags & SA_SIGINFO != 0 {
        return false;
    }
    if register_trampoline(signum).is_err() {
        reset_to_default(signum);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::SIGNAL_TEST_LOCK;
    use libdd_common::MutexExt;
    use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};

    extern "C" fn plain_handler(_: c_int) {}

    #[test]
    fn test_replaced_disposition_is_repaired() {
        let _guard = SIGNAL_TEST_LOCK.lock_or_recover();
        let plain = SigAction::new(
            SigHandler::Handler(plain_handler),
            SaFlags::empty(),
            SigSet::empty(),
        );
        unsafe { signal::sigaction(Signal::SIGUSR1, &plain) }.unwrap();

        signal_trampoline(libc::SIGUSR1, std::ptr::null_mut(), std::ptr::null_mut());

        let repaired = current_disposition(libc::SIGUSR1).unwrap();
        assert_ne!(repaired.sa_flags & SA_SIGINFO, 0);
        assert_ne!(repaired.sa_flags & libc::SA_ONSTACK, 0);
        assert_eq!(repaired.sa_sigaction, signal_trampoline as libc::sighandler_t);

        reset_to_default(libc::SIGUSR1);
    }

    #[test]
    fn test_intact_disposition_is_left_alone() {
        let _guard = SIGNAL_TEST_LOCK.lock_or_recover();
        register_trampoline(libc::SIGUSR1).unwrap();
        assert!(!repair_disposition(libc::SIGUSR1));
        reset_to_default(libc::SIGUSR1);
    }

    #[test]
    fn test_default_disposition_is_repaired() {
        let _guard = SIGNAL_TEST_LOCK.lock_or_recover();
        reset_to_default(libc::SIGUSR1);
        // SIG_DFL carries no SA_SIGINFO either.
        assert!(repair_disposition(libc::SIGUSR1));
        assert_eq!(
            current_disposition(libc::SIGUSR1).unwrap().sa_sigaction,
            signal_trampoline as libc::sighandler_t
        );
        reset_to_default(libc::SIGUSR1);
    }
}
