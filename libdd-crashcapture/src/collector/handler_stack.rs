// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::dump_orchestrator::DumpOrchestrator;
use super::trampoline::signal_trampoline;
use crate::shared::constants::EXCEPTION_SIGNALS;
use anyhow::Context;
use libc::{c_int, c_void, siginfo_t};
use libdd_common::MutexExt;
use nix::errno::Errno;
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};
use std::mem::MaybeUninit;
use std::ptr;
use std::sync::{Arc, Mutex};

const SIGNAL_COUNT: usize = EXCEPTION_SIGNALS.len();

struct StackState {
    // Most recently installed last.
    handlers: Vec<Arc<DumpOrchestrator>>,
    // Dispositions found when the trampoline was registered, indexed like `EXCEPTION_SIGNALS`.
    saved: [Option<libc::sigaction>; SIGNAL_COUNT],
    // Whether the trampoline currently owns the dispositions.
    installed: bool,
}

/// Process-wide list of crash handlers, shared by every [`crate::CrashHandler`].
///
/// The trampoline is registered for all exception signals when the first handler asking for it is
/// pushed and the previous dispositions come back when the last handler is removed. Every mutation, and every
/// dispatch of a fault, happens under a single lock.
pub(crate) struct HandlerStack {
    state: Mutex<StackState>,
}

static HANDLER_STACK: HandlerStack = HandlerStack::new();

impl HandlerStack {
    const fn new() -> Self {
        Self {
            state: Mutex::new(StackState {
                handlers: Vec::new(),
                saved: [None; SIGNAL_COUNT],
                installed: false,
            }),
        }
    }

    pub(crate) fn global() -> &'static Self {
        &HANDLER_STACK
    }

    /// Pushes `handler`. The trampoline is only registered when `register_signals` is set; a
    /// handler pushed without it still sees faults once another handler has registered it.
    pub(crate) fn install(
        &self,
        handler: Arc<DumpOrchestrator>,
        register_signals: bool,
    ) -> anyhow::Result<()> {
        let mut state = self.state.lock_or_recover();
        if register_signals && !state.installed {
            register_trampolines(&mut state)?;
        }
        state.handlers.push(handler);
        tracing::debug!(handlers = state.handlers.len(), "Installed crash handler");
        Ok(())
    }

    /// Returns false if `handler` was not on the stack.
    pub(crate) fn uninstall(&self, handler: &Arc<DumpOrchestrator>) -> bool {
        let mut state = self.state.lock_or_recover();
        let Some(index) = state
            .handlers
            .iter()
            .position(|installed| Arc::ptr_eq(installed, handler))
        else {
            return false;
        };
        state.handlers.remove(index);
        if state.handlers.is_empty() && state.installed {
            restore_saved(&mut state);
            tracing::debug!("Restored previous signal dispositions");
        }
        true
    }

    /// Offers a fault to the handlers, most recent first, then points the dispositions at
    /// whatever should see the fault next: the default action if it was handled, the previous
    /// dispositions otherwise. Returns true if a handler took the fault.
    ///
    /// # Safety
    /// `info` and `uc` must be the arguments of an `SA_SIGINFO` signal handler.
    pub(crate) unsafe fn handle_fault(
        &self,
        signum: c_int,
        info: *const siginfo_t,
        uc: *const c_void,
    ) -> bool {
        let mut state = self.state.lock_or_recover();
        let handled = state
            .handlers
            .iter()
            .rev()
            // SAFETY: upheld by the caller.
            .any(|handler| unsafe { handler.handle_signal(info, uc) });
        if handled {
            reset_to_default(signum);
        } else if state.installed {
            restore_saved(&mut state);
        }
        handled
    }

    /// Gives the faults back to whoever had them before, without touching the handlers.
    pub(crate) fn restore_previous(&self) {
        let mut state = self.state.lock_or_recover();
        if state.installed {
            restore_saved(&mut state);
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.state.lock_or_recover().handlers.len()
    }
}

pub(crate) fn trampoline_action() -> SigAction {
    let mut mask = SigSet::empty();
    for signal in EXCEPTION_SIGNALS {
        mask.add(signal);
    }
    // SigHandler::SigAction implies SA_SIGINFO.
    SigAction::new(
        SigHandler::SigAction(signal_trampoline),
        SaFlags::SA_ONSTACK,
        mask,
    )
}

/// Registers the trampoline for `signum`. Usable from a signal handler.
pub(crate) fn register_trampoline(signum: c_int) -> nix::Result<()> {
    let signal = Signal::try_from(signum)?;
    // SAFETY: the trampoline only uses async-signal-safe functions before dispatch.
    unsafe { signal::sigaction(signal, &trampoline_action()) }.map(drop)
}

pub(crate) fn reset_to_default(signum: c_int) {
    let Ok(signal) = Signal::try_from(signum) else {
        return;
    };
    let default = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
    // SAFETY: restoring the default action has no preconditions.
    let _ = unsafe { signal::sigaction(signal, &default) };
}

/// The disposition currently registered for `signum`.
pub(crate) fn current_disposition(signum: c_int) -> nix::Result<libc::sigaction> {
    let mut current = MaybeUninit::<libc::sigaction>::zeroed();
    // SAFETY: a null new action only queries the current one.
    let rval = unsafe { libc::sigaction(signum, ptr::null(), current.as_mut_ptr()) };
    Errno::result(rval)?;
    // SAFETY: initialized by the kernel on success.
    Ok(unsafe { current.assume_init() })
}

fn register_trampolines(state: &mut StackState) -> anyhow::Result<()> {
    // Everything is saved first: once a signal points at the trampoline, losing its previous
    // disposition would leave nothing to restore.
    let mut saved = [None; SIGNAL_COUNT];
    for (slot, signal) in saved.iter_mut().zip(EXCEPTION_SIGNALS) {
        let current = current_disposition(signal as c_int)
            .with_context(|| format!("Failed to save the disposition of {signal}"))?;
        *slot = Some(current);
    }
    state.saved = saved;

    for signal in EXCEPTION_SIGNALS {
        // Partial coverage beats none.
        if let Err(e) = register_trampoline(signal as c_int) {
            tracing::warn!("Failed to register the crash handler for {signal}: {e}");
        }
    }
    state.installed = true;
    Ok(())
}

fn restore_saved(state: &mut StackState) {
    for (saved, signal) in state.saved.iter().zip(EXCEPTION_SIGNALS) {
        let restored = match saved {
            Some(action) => {
                // SAFETY: the action was read back from the kernel.
                unsafe { libc::sigaction(signal as c_int, action, ptr::null_mut()) == 0 }
            }
            None => false,
        };
        if !restored {
            reset_to_default(signal as c_int);
        }
    }
    state.installed = false;
}
