// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::errors::CloneError;
use libc::{c_int, c_void, CLONE_FILES, CLONE_FS, CLONE_UNTRACED};
use nix::errno::Errno;
use nix::unistd::Pid;

/// Entry point of a process created by [`clone_with_stack`]. Its return value is the exit status.
pub type CloneEntry = extern "C" fn(*mut c_void) -> c_int;

/// Anything smaller cannot reasonably hold the entry frame plus a few calls.
pub const MIN_CLONE_STACK_SIZE: usize = 4096;

/// Creates a process that shares the file descriptor table and filesystem information (cwd, root,
/// umask) with the caller, but gets its own copy of the address space. The child starts executing
/// `entry(arg)` on `stack`.
///
/// Unlike `fork()`, no atfork handlers run, so this is usable while the caller is crashing. No exit
/// signal is requested: the caller must reap the child with `__WALL` (see
/// [`super::wait_for_child_exit`]). `CLONE_UNTRACED` keeps a tracer attached to the caller from
/// also grabbing the child.
///
/// # Safety
/// `arg` must point to memory that is still valid in the child's copy of the address space (e.g. a
/// local of the caller). `stack` must not be used by anything else until the child has exited.
pub unsafe fn clone_with_stack(
    entry: CloneEntry,
    stack: &mut [u8],
    arg: *mut c_void,
) -> Result<Pid, CloneError> {
    if stack.len() < MIN_CLONE_STACK_SIZE {
        return Err(CloneError::StackTooSmall(stack.len()));
    }
    // clone() needs the top-most address, 16 byte aligned. Scrub the top just to be safe.
    let top = stack.as_mut_ptr() as usize + stack.len();
    let top = top & !0xf;
    let scrub_start = top - 16 - stack.as_ptr() as usize;
    stack[scrub_start..scrub_start + 16].fill(0);

    let flags = CLONE_FILES | CLONE_FS | CLONE_UNTRACED;
    // SAFETY: the stack top lies within `stack`, upheld by the caller for the child's lifetime.
    let res = unsafe { libc::clone(entry, top as *mut c_void, flags, arg) };
    match Errno::result(res) {
        Ok(pid) => Ok(Pid::from_raw(pid)),
        Err(errno) => Err(CloneError::CloneFailed(errno)),
    }
}
