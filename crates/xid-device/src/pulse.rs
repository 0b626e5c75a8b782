//! Host-side copy of a device's pulse table

use serde::{Deserialize, Serialize};

/// One step of a pulse table: set `lines` at `offset_ms` after the start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PulseTableEntry {
    pub offset_ms: u32,
    pub lines: u16,
}

impl PulseTableEntry {
    /// The `(0, 0)` entry that ends a table on the wire
    pub const TERMINATOR: PulseTableEntry = PulseTableEntry {
        offset_ms: 0,
        lines: 0,
    };

    pub fn new(offset_ms: u32, lines: u16) -> Self {
        Self { offset_ms, lines }
    }

    pub fn is_terminator(&self) -> bool {
        *self == Self::TERMINATOR
    }
}

/// Entries in insertion order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PulseTable {
    entries: Vec<PulseTableEntry>,
}

impl PulseTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry; returns false for the terminator, which is not stored
    pub fn push(&mut self, entry: PulseTableEntry) -> bool {
        if entry.is_terminator() {
            return false;
        }
        self.entries.push(entry);
        true
    }

    pub fn entries(&self) -> &[PulseTableEntry] {
        &self.entries
    }

    /// Entries in the order the device plays them
    ///
    /// Stable: entries sharing an offset keep their insertion order.
    pub fn sorted(&self) -> Vec<PulseTableEntry> {
        let mut sorted = self.entries.clone();
        sorted.sort_by_key(|e| e.offset_ms);
        sorted
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
