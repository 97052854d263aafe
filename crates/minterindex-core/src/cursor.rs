//! Ingestion cursor: the next height to ingest and the last known head.

use serde::{Deserialize, Serialize};

/// The loop's position in the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    /// Next height to ingest.
    pub height: u64,
    /// Last head height reported by the node.
    pub head: u64,
}

impl Cursor {
    pub fn new(height: u64, head: u64) -> Self {
        Self { height, head }
    }

    /// Resume point after crash recovery.
    ///
    /// A non-empty store resumes at its highest height (which the caller has
    /// just deleted); an empty one starts at `from_height`, never below 1.
    pub fn resume(last_stored: u64, from_height: u64, head: u64) -> Self {
        let height = if last_stored > 0 {
            last_stored
        } else {
            from_height.max(1)
        };
        Self { height, head }
    }

    /// Returns `true` while there are known heights left to ingest.
    pub fn has_pending(&self) -> bool {
        self.height <= self.head
    }

    /// Move to the next height after a successful ingest.
    pub fn advance(&mut self) {
        self.height += 1;
    }

    /// Record a freshly queried head. Returns `true` if the head moved forward.
    ///
    /// A head lower than the one already seen is ignored.
    pub fn update_head(&mut self, head: u64) -> bool {
        if head > self.head {
            self.head = head;
            true
        } else {
            false
        }
    }

    /// Number of known heights not yet ingested.
    pub fn lag(&self) -> u64 {
        (self.head + 1).saturating_sub(self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resume_redoes_last_stored_height() {
        assert_eq!(Cursor::resume(42, 1, 100).height, 42);
    }

    #[test]
    fn resume_empty_store() {
        assert_eq!(Cursor::resume(0, 0, 100).height, 1);
        assert_eq!(Cursor::resume(0, 500, 1000).height, 500);
    }

    #[test]
    fn pending_and_advance() {
        let mut cursor = Cursor::new(9, 10);
        assert!(cursor.has_pending());
        assert_eq!(cursor.lag(), 2);
        cursor.advance();
        cursor.advance();
        assert!(!cursor.has_pending());
        assert_eq!(cursor.lag(), 0);
    }

    #[test]
    fn head_never_moves_backwards() {
        let mut cursor = Cursor::new(1, 10);
        assert!(!cursor.update_head(8));
        assert_eq!(cursor.head, 10);
        assert!(cursor.update_head(12));
        assert_eq!(cursor.head, 12);
    }
}
