// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::constants::{DUMP_REQUEST_MAGIC, DUMP_REQUEST_VERSION};
use libc::pid_t;

/// Fixed header preceding the raw snapshot bytes on the delegation channel.
/// Native endianness: both ends run on the same machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DumpRequestHeader {
    pub magic: u32,
    pub version: u32,
    pub pid: pid_t,
    pub size: u32,
}

impl DumpRequestHeader {
    pub const LEN: usize = 16;

    pub fn new(pid: pid_t, size: u32) -> Self {
        Self {
            magic: DUMP_REQUEST_MAGIC,
            version: DUMP_REQUEST_VERSION,
            pid,
            size,
        }
    }

    pub fn to_bytes(self) -> [u8; Self::LEN] {
        let mut bytes = [0u8; Self::LEN];
        bytes[0..4].copy_from_slice(&self.magic.to_ne_bytes());
        bytes[4..8].copy_from_slice(&self.version.to_ne_bytes());
        bytes[8..12].copy_from_slice(&self.pid.to_ne_bytes());
        bytes[12..16].copy_from_slice(&self.size.to_ne_bytes());
        bytes
    }

    pub fn from_bytes(bytes: &[u8; Self::LEN]) -> Self {
        let word = |i: usize| [bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]];
        Self {
            magic: u32::from_ne_bytes(word(0)),
            version: u32::from_ne_bytes(word(4)),
            pid: pid_t::from_ne_bytes(word(8)),
            size: u32::from_ne_bytes(word(12)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let header = DumpRequestHeader::new(1234, 99);
        let bytes = header.to_bytes();
        assert_eq!(&bytes[0..4], &DUMP_REQUEST_MAGIC.to_ne_bytes());
        assert_eq!(&bytes[8..12], &1234i32.to_ne_bytes());
        assert_eq!(DumpRequestHeader::from_bytes(&bytes), header);
    }
}
