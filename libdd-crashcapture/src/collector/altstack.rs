// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::shared::constants::{ALT_STACK_PAGES, MIN_ALT_STACK_SIZE};
use libc::{sigaltstack, stack_t, SIGSTKSZ, SS_DISABLE};
use libdd_common::unix_utils::{MapError, PageBuffer};
use nix::errno::Errno;
use std::cmp::max;
use std::mem::MaybeUninit;
use std::ptr;

#[derive(Debug, thiserror::Error)]
pub enum AltStackError {
    #[error("Failed to query the alternate signal stack: {0}")]
    QueryFailed(nix::Error),
    #[error("Failed to allocate an alternate signal stack: {0}")]
    AllocationFailed(#[from] MapError),
    #[error("Failed to register the alternate signal stack: {0}")]
    RegisterFailed(nix::Error),
}

/// Makes sure the calling thread has a usable alternate signal stack, so that a stack overflow
/// can still be handled. Returns `true` if a new stack was installed.
///
/// An existing stack is kept as long as it is enabled and at least `max(8 KiB, SIGSTKSZ)` large:
/// some runtimes check that their own handlers run on the stack they configured. A new stack is
/// the greater of 16 pages or `SIGSTKSZ`, with a guard page at its low end. It is never freed, as
/// the thread may keep using it for as long as it lives.
pub fn ensure_alternate_stack() -> Result<bool, AltStackError> {
    // SAFETY: all-zero is a valid stack_t.
    let mut current: stack_t = unsafe { MaybeUninit::zeroed().assume_init() };
    // SAFETY: a null new stack only queries the current one.
    let rval = unsafe { sigaltstack(ptr::null(), &mut current) };
    Errno::result(rval).map_err(AltStackError::QueryFailed)?;

    if is_usable(&current) {
        tracing::debug!(size = current.ss_size, "Keeping existing alternate signal stack");
        return Ok(false);
    }

    let size = max(SIGSTKSZ, ALT_STACK_PAGES * page_size::get());
    let mut buffer = PageBuffer::with_guard_page(size)?;
    let stack = stack_t {
        ss_sp: buffer.as_mut_ptr().cast(),
        ss_flags: 0,
        ss_size: buffer.len(),
    };
    // SAFETY: the region is mapped read/write; it is leaked below once the kernel uses it.
    let rval = unsafe { sigaltstack(&stack, ptr::null_mut()) };
    Errno::result(rval).map_err(AltStackError::RegisterFailed)?;
    let (_, len) = buffer.leak();
    tracing::debug!(size = len, "Installed alternate signal stack");
    Ok(true)
}

fn is_usable(stack: &stack_t) -> bool {
    stack.ss_flags & SS_DISABLE == 0
        && !stack.ss_sp.is_null()
        && stack.ss_size >= max(MIN_ALT_STACK_SIZE, SIGSTKSZ)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn current_stack() -> stack_t {
        let mut current: stack_t = unsafe { MaybeUninit::zeroed().assume_init() };
        assert_eq!(unsafe { sigaltstack(ptr::null(), &mut current) }, 0);
        current
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn test_second_call_keeps_stack() {
        // Run on a fresh thread: the alternate stack is per thread.
        std::thread::spawn(|| {
            ensure_alternate_stack().unwrap();
            let first = current_stack();
            assert!(is_usable(&first));

            assert!(!ensure_alternate_stack().unwrap());
            let second = current_stack();
            assert_eq!(first.ss_sp, second.ss_sp);
            assert_eq!(first.ss_size, second.ss_size);
        })
        .join()
        .unwrap();
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn test_replaces_small_stack() {
        std::thread::spawn(|| {
            // Too small to be kept, leaked for the lifetime of the thread.
            let small = PageBuffer::new(page_size::get()).unwrap();
            let (sp, len) = small.leak();
            if len >= max(MIN_ALT_STACK_SIZE, SIGSTKSZ) {
                // Huge pages: nothing to check.
                return;
            }
            let stack = stack_t {
                ss_sp: sp.cast(),
                ss_flags: 0,
                ss_size: len,
            };
            assert_eq!(unsafe { sigaltstack(&stack, ptr::null_mut()) }, 0);

            assert!(ensure_alternate_stack().unwrap());
            let current = current_stack();
            assert_ne!(current.ss_sp, sp.cast());
            assert!(current.ss_size >= ALT_STACK_PAGES * page_size::get());
        })
        .join()
        .unwrap();
    }

    #[test]
    fn test_disabled_stack_is_not_usable() {
        let mut stack: stack_t = unsafe { MaybeUninit::zeroed().assume_init() };
        stack.ss_flags = SS_DISABLE;
        stack.ss_size = 1 << 20;
        assert!(!is_usable(&stack));
    }
}
