use std::collections::VecDeque;
use std::time::SystemTime;

use crate::canvas::{LayerId, PixelBuffer};

/// Default number of snapshots kept before the oldest is evicted.
pub const DEFAULT_MAX_HISTORY: usize = 50;

// ============================================================================
// HISTORY ENTRY — one layer's pixels at one point in time
// ============================================================================

/// A snapshot of a single layer's buffer.  Undo/redo is layer-local: an entry
/// never carries more than the one layer it names.
#[derive(Clone, Debug)]
pub struct HistoryEntry {
    pub layer_id: LayerId,
    pub snapshot: PixelBuffer,
    pub timestamp: SystemTime,
}

impl HistoryEntry {
    pub fn memory_size(&self) -> usize {
        self.snapshot.memory_bytes()
    }
}

// ============================================================================
// HISTORY STORE — linear snapshot list with a cursor
// ============================================================================

/// Linear snapshot history.
///
/// `cursor` names the currently-applied entry (`None` when empty).  Saving
/// while the cursor is behind the newest entry discards everything after it,
/// so there is never more than one redo branch.
#[derive(Debug)]
pub struct HistoryStore {
    entries: VecDeque<HistoryEntry>,
    cursor: Option<usize>,
    max_size: usize,
    /// Running total of snapshot bytes.
    total_memory: usize,
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HISTORY)
    }
}

impl HistoryStore {
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            cursor: None,
            max_size: max_size.max(1),
            total_memory: 0,
        }
    }

    /// Copy `buffer` into a new entry at the cursor, dropping any redo branch.
    pub fn save_state(&mut self, layer_id: LayerId, buffer: &PixelBuffer) {
        let keep = self.cursor.map_or(0, |c| c + 1);
        for dropped in self.entries.drain(keep..) {
            self.total_memory = self.total_memory.saturating_sub(dropped.memory_size());
        }

        let entry = HistoryEntry {
            layer_id,
            snapshot: buffer.clone(),
            timestamp: SystemTime::now(),
        };
        self.total_memory += entry.memory_size();
        self.entries.push_back(entry);
        self.cursor = Some(self.entries.len() - 1);

        self.prune();
    }

    /// Step the cursor back and return the entry now under it.
    pub fn undo(&mut self) -> Option<&HistoryEntry> {
        match self.cursor {
            Some(c) if c > 0 => {
                self.cursor = Some(c - 1);
                self.entries.get(c - 1)
            }
            _ => None,
        }
    }

    /// Step the cursor forward and return the entry now under it.
    pub fn redo(&mut self) -> Option<&HistoryEntry> {
        let next = self.cursor.map_or(0, |c| c + 1);
        if self.cursor.is_none() || next >= self.entries.len() {
            return None;
        }
        self.cursor = Some(next);
        self.entries.get(next)
    }

    pub fn can_undo(&self) -> bool {
        self.cursor.is_some_and(|c| c > 0)
    }

    pub fn can_redo(&self) -> bool {
        self.cursor.is_some_and(|c| c + 1 < self.entries.len())
    }

    /// Drop every entry and reset the cursor.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.cursor = None;
        self.total_memory = 0;
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    /// Steps available to `undo` from here.
    pub fn undo_count(&self) -> usize {
        self.cursor.unwrap_or(0)
    }

    /// Steps available to `redo` from here.
    pub fn redo_count(&self) -> usize {
        match self.cursor {
            Some(c) => self.entries.len() - c - 1,
            None => 0,
        }
    }

    /// Bytes held by snapshots (O(1) via cached total).
    pub fn memory_usage(&self) -> usize {
        self.total_memory
    }

    fn prune(&mut self) {
        while self.entries.len() > self.max_size {
            if let Some(removed) = self.entries.pop_front() {
                self.total_memory = self.total_memory.saturating_sub(removed.memory_size());
                self.cursor = self.cursor.and_then(|c| c.checked_sub(1));
                crate::log_info!(
                    "history full ({} entries), evicted oldest snapshot of layer {}",
                    self.max_size,
                    removed.layer_id
                );
            }
        }
    }
}
