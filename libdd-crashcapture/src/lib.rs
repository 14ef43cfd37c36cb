// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

//! Crash capture for Linux processes.
//!
//! A [`CrashHandler`] registers a trampoline for the exception signals (see
//! [`EXCEPTION_SIGNALS`]). When one of them is raised, the trampoline offers the fault to the
//! installed handlers, most recent first. The handler that accepts it copies the faulting
//! thread's state into a [`ContextSnapshot`] and hands it to an [`Inspector`]: by default a
//! process cloned from the crashing one, allowed to ptrace it, which runs an [`ArtifactWriter`].
//! The fault is then delivered again and terminates the process with its usual default action.
//!
//! Nothing between the fault and the hand-off uses the heap or locks outside of this crate: the
//! crashing process may have been holding them.
//!
//! Dumps may also be delegated to another process over a descriptor (see
//! [`CrashCaptureConfig::dump_server_fd`]); [`DumpRequest`] implements the receiving side.

#[cfg(not(target_os = "linux"))]
compile_error!("libdd-crashcapture only supports Linux");

mod artifact;
mod collector;
mod receiver;
mod shared;
mod snapshot;
#[cfg(test)]
mod test_utils;

pub use artifact::{
    ArtifactOutput, ArtifactRequest, ArtifactWriter, JsonArtifactWriter, MappingInfo,
};
pub use collector::*;
pub use receiver::{DumpRequest, ReceiveError};
pub use shared::configuration::{CrashCaptureConfig, DumpTarget};
pub use shared::constants::EXCEPTION_SIGNALS;
pub use snapshot::{ContextSnapshot, FloatState};
