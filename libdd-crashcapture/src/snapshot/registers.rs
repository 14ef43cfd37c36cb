// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Architecture specific views of the machine context captured in a [`super::ContextSnapshot`].

use libc::ucontext_t;

#[cfg(all(target_arch = "x86_64", target_env = "gnu"))]
mod arch {
    use libc::{ucontext_t, REG_RIP, REG_RSP};

    /// The FPU/SSE state lives outside `mcontext_t` on x86_64 and is reached through a pointer,
    /// so it has to be copied separately.
    pub type FloatState = libc::_libc_fpstate;

    pub fn instruction_pointer(uc: &ucontext_t) -> usize {
        uc.uc_mcontext.gregs[REG_RIP as usize] as usize
    }

    pub fn stack_pointer(uc: &ucontext_t) -> usize {
        uc.uc_mcontext.gregs[REG_RSP as usize] as usize
    }

    pub fn general_registers(uc: &ucontext_t) -> Vec<u64> {
        uc.uc_mcontext.gregs.iter().map(|r| *r as u64).collect()
    }

    pub fn float_state_ptr(uc: &ucontext_t) -> *const FloatState {
        uc.uc_mcontext.fpregs
    }
}

#[cfg(all(target_arch = "aarch64", target_env = "gnu"))]
mod arch {
    use libc::ucontext_t;

    /// FP/SIMD registers are part of `mcontext_t::__reserved` on aarch64 and are copied along
    /// with the rest of the context.
    pub type FloatState = ();

    pub fn instruction_pointer(uc: &ucontext_t) -> usize {
        uc.uc_mcontext.pc as usize
    }

    pub fn stack_pointer(uc: &ucontext_t) -> usize {
        uc.uc_mcontext.sp as usize
    }

    pub fn general_registers(uc: &ucontext_t) -> Vec<u64> {
        uc.uc_mcontext.regs.to_vec()
    }

    pub fn float_state_ptr(_uc: &ucontext_t) -> *const FloatState {
        std::ptr::null()
    }
}

#[cfg(not(any(
    all(target_arch = "x86_64", target_env = "gnu"),
    all(target_arch = "aarch64", target_env = "gnu")
)))]
mod arch {
    use libc::ucontext_t;

    // The raw context is still captured, but nothing here knows how to decode it.
    pub type FloatState = ();

    pub fn instruction_pointer(_uc: &ucontext_t) -> usize {
        0
    }

    pub fn stack_pointer(_uc: &ucontext_t) -> usize {
        0
    }

    pub fn general_registers(_uc: &ucontext_t) -> Vec<u64> {
        Vec::new()
    }

    pub fn float_state_ptr(_uc: &ucontext_t) -> *const FloatState {
        std::ptr::null()
    }
}

pub use arch::FloatState;

pub(crate) fn instruction_pointer(uc: &ucontext_t) -> usize {
    arch::instruction_pointer(uc)
}

pub(crate) fn stack_pointer(uc: &ucontext_t) -> usize {
    arch::stack_pointer(uc)
}

pub(crate) fn general_registers(uc: &ucontext_t) -> Vec<u64> {
    arch::general_registers(uc)
}

pub(crate) fn float_state_ptr(uc: &ucontext_t) -> *const FloatState {
    arch::float_state_ptr(uc)
}

#[cfg(target_env = "gnu")]
extern "C" {
    fn getcontext(ucp: *mut ucontext_t) -> libc::c_int;
}

/// Captures the calling thread's registers. Returns false where `getcontext` is unavailable.
///
/// # Safety
/// `uc` must be valid for writes.
#[inline(always)]
pub(crate) unsafe fn capture_current_context(uc: *mut ucontext_t) -> bool {
    #[cfg(target_env = "gnu")]
    {
        // SAFETY: upheld by the caller.
        unsafe { getcontext(uc) == 0 }
    }
    #[cfg(not(target_env = "gnu"))]
    {
        let _ = uc;
        false
    }
}
