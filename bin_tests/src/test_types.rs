// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Represents the different test modes (behaviors) of `crashcapture_bin_test`.
/// Each mode corresponds to a specific handler setup in the crashing process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TestMode {
    /// One handler writing JSON artifacts, recording each completion.
    Record,
    /// One handler whose artifact writer always fails.
    FailingWriter,
    /// An accepting handler, then a declining one installed on top of it.
    StackedDecline,
    /// A fast-path callback that takes every fault in process.
    FastPath,
}

impl TestMode {
    /// Returns the string representation used in command-line arguments.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Record => "record",
            Self::FailingWriter => "failing_writer",
            Self::StackedDecline => "stacked_decline",
            Self::FastPath => "fast_path",
        }
    }

    /// Returns all available test modes.
    pub const fn all() -> &'static [Self] {
        &[
            Self::Record,
            Self::FailingWriter,
            Self::StackedDecline,
            Self::FastPath,
        ]
    }

    /// Whether an artifact is expected in the output directory.
    pub const fn writes_artifact(self) -> bool {
        matches!(self, Self::Record | Self::StackedDecline)
    }
}

impl std::fmt::Display for TestMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TestMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "record" => Ok(Self::Record),
            "failing_writer" => Ok(Self::FailingWriter),
            "stacked_decline" => Ok(Self::StackedDecline),
            "fast_path" => Ok(Self::FastPath),
            _ => Err(format!("Unknown test mode: {}", s)),
        }
    }
}

/// Represents the different types of crashes that can be triggered in tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrashType {
    /// Null pointer dereference (SIGSEGV raised by the faulting instruction)
    NullDeref,
    /// Unbounded recursion on the main thread, handled on the alternate signal stack
    StackOverflow,
    /// Unbounded recursion on a spawned thread
    StackOverflowThread,
    /// Send SIGABRT to the process with kill()
    KillSigAbrt,
    /// Send SIGSEGV to the process with kill()
    KillSigSegv,
    /// Raise SIGABRT
    RaiseSigAbrt,
    /// Raise SIGILL
    RaiseSigIll,
    /// Raise SIGBUS
    RaiseSigBus,
    /// Raise SIGFPE
    RaiseSigFpe,
    /// Raise SIGSEGV
    RaiseSigSegv,
}

impl CrashType {
    /// Returns the string representation used in command-line arguments.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NullDeref => "null_deref",
            Self::StackOverflow => "stack_overflow",
            Self::StackOverflowThread => "stack_overflow_thread",
            Self::KillSigAbrt => "kill_sigabrt",
            Self::KillSigSegv => "kill_sigsegv",
            Self::RaiseSigAbrt => "raise_sigabrt",
            Self::RaiseSigIll => "raise_sigill",
            Self::RaiseSigBus => "raise_sigbus",
            Self::RaiseSigFpe => "raise_sigfpe",
            Self::RaiseSigSegv => "raise_sigsegv",
        }
    }

    pub const fn all() -> &'static [Self] {
        &[
            Self::NullDeref,
            Self::StackOverflow,
            Self::StackOverflowThread,
            Self::KillSigAbrt,
            Self::KillSigSegv,
            Self::RaiseSigAbrt,
            Self::RaiseSigIll,
            Self::RaiseSigBus,
            Self::RaiseSigFpe,
            Self::RaiseSigSegv,
        ]
    }

    /// Returns the signal number the process is expected to die from.
    pub const fn signal_number(self) -> i32 {
        match self {
            Self::NullDeref
            | Self::StackOverflow
            | Self::StackOverflowThread
            | Self::KillSigSegv
            | Self::RaiseSigSegv => libc::SIGSEGV,
            Self::KillSigAbrt | Self::RaiseSigAbrt => libc::SIGABRT,
            Self::RaiseSigIll => libc::SIGILL,
            Self::RaiseSigBus => libc::SIGBUS,
            Self::RaiseSigFpe => libc::SIGFPE,
        }
    }

    /// True if the signal is sent explicitly rather than raised by a faulting instruction.
    pub const fn is_sent(self) -> bool {
        !matches!(
            self,
            Self::NullDeref | Self::StackOverflow | Self::StackOverflowThread
        )
    }
}

impl std::fmt::Display for CrashType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CrashType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "null_deref" => Ok(Self::NullDeref),
            "stack_overflow" => Ok(Self::StackOverflow),
            "stack_overflow_thread" => Ok(Self::StackOverflowThread),
            "kill_sigabrt" => Ok(Self::KillSigAbrt),
            "kill_sigsegv" => Ok(Self::KillSigSegv),
            "raise_sigabrt" => Ok(Self::RaiseSigAbrt),
            "raise_sigill" => Ok(Self::RaiseSigIll),
            "raise_sigbus" => Ok(Self::RaiseSigBus),
            "raise_sigfpe" => Ok(Self::RaiseSigFpe),
            "raise_sigsegv" => Ok(Self::RaiseSigSegv),
            _ => Err(format!("Unknown crash type: {}", s)),
        }
    }
}
