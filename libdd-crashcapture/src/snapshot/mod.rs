// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The state of a crashing thread, captured from inside the signal handler.
//!
//! Everything the snapshot holds is plain data laid out inline: no heap memory, no references into
//! the crashing process (the `fpregs` pointer inside the raw context is kept as-is but never
//! followed once the snapshot is taken). It is built exclusively through memory copies, because
//! the context it comes from may be unsafe to walk with anything more elaborate.

mod registers;

pub(crate) use registers::capture_current_context;
pub use registers::FloatState;

use libc::{c_int, c_void, pid_t, siginfo_t, ucontext_t};
use nix::unistd::{getpid, gettid};
use std::fmt;
use std::mem::{size_of, MaybeUninit};
use std::ptr;

#[repr(C)]
#[derive(Clone, Copy)]
pub struct ContextSnapshot {
    siginfo: siginfo_t,
    context: ucontext_t,
    float_state: FloatState,
    has_float_state: u32,
    pid: pid_t,
    tid: pid_t,
    _reserved: u32,
}

// SAFETY: the snapshot is plain data; the raw pointers it contains are never dereferenced.
unsafe impl Send for ContextSnapshot {}
unsafe impl Sync for ContextSnapshot {}

impl ContextSnapshot {
    fn zeroed() -> Self {
        // SAFETY: every field is plain old data (integers, arrays and raw pointers), for which
        // all-zero is a valid value.
        unsafe { MaybeUninit::<Self>::zeroed().assume_init() }
    }

    /// Copies the arguments received by an `SA_SIGINFO` signal handler.
    /// Only `memcpy`-style copies are performed; this does not allocate.
    ///
    /// # Safety
    /// `info` must point to a valid `siginfo_t` and `uc` to a valid `ucontext_t`, as handed to a
    /// signal handler by the kernel.
    pub unsafe fn from_signal(info: *const siginfo_t, uc: *const c_void) -> Self {
        let mut snapshot = Self::zeroed();
        let uc = uc.cast::<ucontext_t>();
        // SAFETY: upheld by the caller.
        unsafe {
            ptr::copy_nonoverlapping(info, &mut snapshot.siginfo, 1);
            ptr::copy_nonoverlapping(uc, &mut snapshot.context, 1);
            snapshot.copy_float_state(registers::float_state_ptr(&*uc));
        }
        snapshot.pid = getpid().as_raw();
        snapshot.tid = gettid().as_raw();
        snapshot
    }

    /// Captures the calling thread's current registers, for dumps taken without a fault.
    /// The signal information is left zeroed. Returns `None` if the platform cannot capture the
    /// current context.
    #[inline(never)]
    pub fn from_current_thread() -> Option<Self> {
        // SAFETY: all-zero is a valid ucontext_t.
        let mut uc: ucontext_t = unsafe { MaybeUninit::zeroed().assume_init() };
        // SAFETY: `uc` is a valid, writable `ucontext_t`.
        if !unsafe { registers::capture_current_context(&mut uc) } {
            return None;
        }
        let mut snapshot = Self::zeroed();
        // Copied bytewise so the context's padding keeps the zeroes `as_bytes` relies on.
        // SAFETY: both are valid, distinct `ucontext_t`s.
        unsafe { ptr::copy_nonoverlapping(&uc, &mut snapshot.context, 1) };
        // SAFETY: getcontext points fpregs (if anywhere) into `uc`, which is still alive.
        unsafe { snapshot.copy_float_state(registers::float_state_ptr(&uc)) };
        snapshot.pid = getpid().as_raw();
        snapshot.tid = gettid().as_raw();
        Some(snapshot)
    }

    /// # Safety
    /// `float_state`, if non-null, must be valid for reads and must not point into `self`.
    unsafe fn copy_float_state(&mut self, float_state: *const FloatState) {
        if !float_state.is_null() && size_of::<FloatState>() > 0 {
            // SAFETY: upheld by the caller.
            unsafe { ptr::copy_nonoverlapping(float_state, &mut self.float_state, 1) };
            self.has_float_state = 1;
        }
    }

    pub fn signal_number(&self) -> c_int {
        self.siginfo.si_signo
    }

    pub fn signal_code(&self) -> c_int {
        self.siginfo.si_code
    }

    /// Pid of the process that sent the signal. Only meaningful for signals sent with `kill` and
    /// friends (`signal_code() <= 0`); for hardware faults this union member overlaps the fault
    /// address.
    pub fn sender_pid(&self) -> pid_t {
        // SAFETY: reading an integer out of the copied union is always defined.
        unsafe { self.siginfo.si_pid() }
    }

    /// Faulting address for SIGSEGV, SIGBUS, SIGILL and SIGFPE raised by the kernel.
    pub fn fault_address(&self) -> usize {
        // SAFETY: reading a pointer value out of the copied union is always defined.
        unsafe { self.siginfo.si_addr() as usize }
    }

    /// Pid of the process the snapshot was taken in.
    pub fn pid(&self) -> pid_t {
        self.pid
    }

    /// Id of the thread the snapshot was taken on.
    pub fn tid(&self) -> pid_t {
        self.tid
    }

    pub fn instruction_pointer(&self) -> usize {
        registers::instruction_pointer(&self.context)
    }

    pub fn stack_pointer(&self) -> usize {
        registers::stack_pointer(&self.context)
    }

    /// General purpose registers in the platform's `mcontext_t` order.
    /// This allocates and must not be called from the crash path.
    pub fn general_registers(&self) -> Vec<u64> {
        registers::general_registers(&self.context)
    }

    pub fn float_state(&self) -> Option<&FloatState> {
        (self.has_float_state != 0).then_some(&self.float_state)
    }

    pub fn raw_siginfo(&self) -> &siginfo_t {
        &self.siginfo
    }

    pub fn raw_context(&self) -> &ucontext_t {
        &self.context
    }

    pub fn as_bytes(&self) -> &[u8] {
        // SAFETY: the snapshot is a `repr(C)` block of plain data, readable as bytes. It starts
        // out zeroed and its nested structs are only ever filled with bytewise copies.
        unsafe { std::slice::from_raw_parts((self as *const Self).cast::<u8>(), size_of::<Self>()) }
    }

    /// Rebuilds a snapshot from [`ContextSnapshot::as_bytes`] output; the length must match
    /// exactly.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != size_of::<Self>() {
            return None;
        }
        // SAFETY: the length matches and every field accepts any bit pattern.
        let snapshot = unsafe { ptr::read_unaligned(bytes.as_ptr().cast::<Self>()) };
        Some(snapshot)
    }
}

impl fmt::Debug for ContextSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextSnapshot")
            .field("signal_number", &self.signal_number())
            .field("signal_code", &self.signal_code())
            .field("pid", &self.pid)
            .field("tid", &self.tid)
            .field("instruction_pointer", &self.instruction_pointer())
            .field("stack_pointer", &self.stack_pointer())
            .field("has_float_state", &(self.has_float_state != 0))
            .finish()
    }
}

// Layout of the `kill()` flavour of `siginfo_t`, used to fill in synthetic signals.
#[repr(C)]
struct KillSigInfo {
    si_signo: c_int,
    si_errno: c_int,
    si_code: c_int,
    #[cfg(target_pointer_width = "64")]
    _pad: c_int,
    si_pid: pid_t,
    si_uid: libc::uid_t,
}

/// Builds the `siginfo_t` the kernel would deliver for a signal sent by `sender` with `code`.
pub(crate) fn synthetic_siginfo(signo: c_int, code: c_int, sender: pid_t) -> siginfo_t {
    // SAFETY: all-zero is a valid siginfo_t.
    let mut info: siginfo_t = unsafe { MaybeUninit::zeroed().assume_init() };
    let fields = KillSigInfo {
        si_signo: signo,
        si_errno: 0,
        si_code: code,
        #[cfg(target_pointer_width = "64")]
        _pad: 0,
        si_pid: sender,
        // SAFETY: getuid has no preconditions.
        si_uid: unsafe { libc::getuid() },
    };
    const _: () = assert!(size_of::<KillSigInfo>() <= size_of::<siginfo_t>());
    // SAFETY: `KillSigInfo` mirrors the head of `siginfo_t` and is smaller than it.
    unsafe { ptr::write((&mut info as *mut siginfo_t).cast::<KillSigInfo>(), fields) };
    info
}
