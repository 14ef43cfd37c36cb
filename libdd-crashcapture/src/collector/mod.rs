// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0
mod altstack;
mod crash_handler;
mod dump_orchestrator;
mod dumpable;
mod handler_stack;
mod inspector;
mod remote;
mod rendezvous;
mod trampoline;

pub use altstack::{ensure_alternate_stack, AltStackError};
pub use crash_handler::{CrashHandler, CrashHandlerBuilder};
pub use dump_orchestrator::{CompletionCallback, DumpOutcome, FastPathCallback, FilterCallback};
pub use inspector::{CloneInspector, Inspector};
pub use remote::RemoteInspector;
