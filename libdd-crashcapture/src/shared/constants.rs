// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use nix::sys::signal::Signal;

/// The signals considered to be crashes. The default action for each of these must be to
/// terminate the process (see `man 7 signal`): once a fault has been handled it is re-delivered
/// and is expected to be fatal.
pub const EXCEPTION_SIGNALS: [Signal; 5] = [
    Signal::SIGSEGV,
    Signal::SIGABRT,
    Signal::SIGFPE,
    Signal::SIGILL,
    Signal::SIGBUS,
];

/// Smallest alternate signal stack accepted as-is. `SIGSTKSZ` wins if it is larger.
pub const MIN_ALT_STACK_SIZE: usize = 8192;

/// Pages allocated when a new alternate signal stack is needed (or `SIGSTKSZ`, if larger).
pub const ALT_STACK_PAGES: usize = 16;

/// Stack handed to the inspector process. It runs the artifact writer, which may format and do
/// file I/O, so this is well above what the crash path itself needs.
pub const INSPECTOR_STACK_SIZE: usize = 128 * 1024;

/// Byte sent over the rendezvous pipe once the inspector may attach to the crashing process.
pub const CONTINUE_MESSAGE: u8 = b'a';

/// `si_code` values of signals sent with `kill(2)` and `tgkill(2)`.
pub const SI_USER: i32 = 0;
pub const SI_TKILL: i32 = -6;

/// Header magic and version of a dump request sent to an out-of-process dump service.
pub const DUMP_REQUEST_MAGIC: u32 = 0x4444_4343;
pub const DUMP_REQUEST_VERSION: u32 = 1;

/// Extension of artifacts written to a directory target.
pub const ARTIFACT_EXTENSION: &str = "dmp";
