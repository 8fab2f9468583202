use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Per-recording index of which chunk sequences have arrived, plus the
/// terminal marker delivered by the final chunk message. Completeness is
/// never inferred from silence or timeouts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkIndex {
    pub received: BTreeSet<u64>,
    pub final_count: Option<u64>,
}

/// Outcome of recording the terminal marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalMark {
    Recorded,
    /// A terminal marker was already present; the new one is ignored.
    Duplicate,
}

impl ChunkIndex {
    /// Adds a sequence to the received set. Returns false when the
    /// sequence was already present (duplicate delivery).
    pub fn insert(&mut self, sequence: u64) -> bool {
        self.received.insert(sequence)
    }

    /// Records `final_count` exactly once. Later markers are ignored,
    /// even if they carry a conflicting count.
    pub fn mark_final(&mut self, final_count: u64) -> FinalMark {
        if self.final_count.is_some() {
            return FinalMark::Duplicate;
        }
        self.final_count = Some(final_count);
        FinalMark::Recorded
    }

    /// True iff the terminal marker has been observed and the received
    /// set equals `{0..final_count-1}` with no gaps.
    pub fn is_complete(&self) -> bool {
        let Some(count) = self.final_count else {
            return false;
        };
        if count == 0 {
            return self.received.is_empty();
        }
        // A set of u64 with `count` members whose max is `count - 1`
        // must be exactly {0..count-1}.
        self.received.len() as u64 == count
            && self.received.last().copied() == Some(count - 1)
    }

    /// Sequences still missing relative to the terminal marker. Empty
    /// when no marker has arrived yet.
    pub fn missing(&self) -> Vec<u64> {
        match self.final_count {
            Some(count) => (0..count).filter(|s| !self.received.contains(s)).collect(),
            None => Vec::new(),
        }
    }
}
