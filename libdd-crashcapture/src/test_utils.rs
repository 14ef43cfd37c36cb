// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::artifact::ArtifactRequest;
use crate::collector::Inspector;
use crate::snapshot::ContextSnapshot;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Serializes tests that change signal dispositions, the handler stack or dumpability.
pub(crate) static SIGNAL_TEST_LOCK: Mutex<()> = Mutex::new(());

/// Records inspection requests instead of spawning anything.
#[derive(Clone)]
pub(crate) struct CountingInspector {
    calls: Arc<AtomicUsize>,
    last: Arc<Mutex<Option<ContextSnapshot>>>,
    result: bool,
    out_of_process: bool,
}

impl CountingInspector {
    pub(crate) fn new(result: bool) -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            last: Arc::new(Mutex::new(None)),
            result,
            out_of_process: false,
        }
    }

    pub(crate) fn out_of_process(mut self) -> Self {
        self.out_of_process = true;
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn last_snapshot(&self) -> Option<ContextSnapshot> {
        *self.last.lock().unwrap()
    }
}

impl Inspector for CountingInspector {
    fn request_inspection(&self, request: &ArtifactRequest<'_>) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last.lock().unwrap() = Some(*request.snapshot);
        self.result
    }

    fn is_out_of_process(&self) -> bool {
        self.out_of_process
    }
}
