//! Batches of pending articles and the watermark over their completion
//!
//! Workers finish articles out of order. The crawl state may only move
//! forward over a gap-free prefix of finished articles, otherwise a crash
//! could record a position past an article that was never stored.

use crate::state::ProgressCursor;

/// Which walk produced a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchKind {
    /// New articles, processed oldest first
    CatchUp,
    /// Older articles, processed in listing order
    Backlog,
}

/// One identifier waiting for a worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingArticle {
    pub identifier: String,
    /// Listing page the identifier was found on
    pub page: u32,
    /// Already in the store; counts as finished without a worker
    pub already_stored: bool,
}

/// Ordered identifiers drained by one worker-pool run
#[derive(Debug, Clone)]
pub struct Batch {
    kind: BatchKind,
    items: Vec<PendingArticle>,
    moves_markers: bool,
}

impl Batch {
    /// Builds a catch-up batch from identifiers in listing order (newest first)
    ///
    /// The batch itself runs oldest first, so that the most recent marker
    /// only ever moves towards newer articles.
    pub fn catch_up(newest_first: Vec<String>) -> Self {
        let items = newest_first
            .into_iter()
            .rev()
            .map(|identifier| PendingArticle {
                identifier,
                page: 1,
                already_stored: false,
            })
            .collect();
        Self {
            kind: BatchKind::CatchUp,
            items,
            moves_markers: true,
        }
    }

    /// Builds a backlog batch from `(page, identifier)` pairs in listing order
    pub fn backlog(entries: impl IntoIterator<Item = (u32, String)>) -> Self {
        let items = entries
            .into_iter()
            .map(|(page, identifier)| PendingArticle {
                identifier,
                page,
                already_stored: false,
            })
            .collect();
        Self {
            kind: BatchKind::Backlog,
            items,
            moves_markers: true,
        }
    }

    /// Commits of this batch leave the progress markers where they are
    ///
    /// Used once an earlier batch left an unfinished identifier behind the
    /// marker; moving past it would hide it from the next run.
    pub fn holding_markers(mut self) -> Self {
        self.moves_markers = false;
        self
    }

    /// False if finishing this batch must not move the progress markers
    pub fn moves_markers(&self) -> bool {
        self.moves_markers
    }

    /// Flags the identifiers the store already holds
    pub fn mark_stored(&mut self, is_stored: impl Fn(&str) -> bool) -> usize {
        let mut count = 0;
        for item in &mut self.items {
            if is_stored(&item.identifier) {
                item.already_stored = true;
                count += 1;
            }
        }
        count
    }

    pub fn kind(&self) -> BatchKind {
        self.kind
    }

    pub fn items(&self) -> &[PendingArticle] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Position recorded once the item at `slot` and everything before it is finished
    pub fn cursor(&self, slot: usize) -> ProgressCursor {
        let item = &self.items[slot];
        match self.kind {
            BatchKind::CatchUp => ProgressCursor::CatchUp {
                identifier: item.identifier.clone(),
            },
            BatchKind::Backlog => ProgressCursor::Backlog {
                page: item.page,
                identifier: item.identifier.clone(),
            },
        }
    }
}

/// Tracks the gap-free prefix of finished slots in a batch
#[derive(Debug, Clone)]
pub struct Watermark {
    cursors: Vec<ProgressCursor>,
    done: Vec<bool>,
    next: usize,
}

impl Watermark {
    /// Starts a watermark for `batch`; already stored items count as finished
    pub fn new(batch: &Batch) -> Self {
        Self {
            cursors: (0..batch.len()).map(|slot| batch.cursor(slot)).collect(),
            done: batch.items().iter().map(|item| item.already_stored).collect(),
            next: 0,
        }
    }

    /// Marks `slot` finished and returns the new cursor if the prefix grew
    pub fn complete(&mut self, slot: usize) -> Option<ProgressCursor> {
        if let Some(done) = self.done.get_mut(slot) {
            *done = true;
        }
        self.advance()
    }

    /// Cursor that `complete(slot)` would return, without recording anything
    pub fn peek_complete(&self, slot: usize) -> Option<ProgressCursor> {
        if slot != self.next || slot >= self.done.len() {
            return None;
        }

        let mut end = slot + 1;
        while end < self.done.len() && self.done[end] {
            end += 1;
        }
        Some(self.cursors[end - 1].clone())
    }

    /// Moves over every finished slot at the front of the batch
    pub fn advance(&mut self) -> Option<ProgressCursor> {
        let start = self.next;
        while self.next < self.done.len() && self.done[self.next] {
            self.next += 1;
        }

        if self.next > start {
            Some(self.cursors[self.next - 1].clone())
        } else {
            None
        }
    }

    /// Number of slots in the finished prefix
    pub fn position(&self) -> usize {
        self.next
    }

    pub fn is_finished(&self) -> bool {
        self.next == self.done.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_catch_up_batch_runs_oldest_first() {
        let batch = Batch::catch_up(ids(&["c", "b", "a"]));
        let order: Vec<_> = batch.items().iter().map(|i| i.identifier.as_str()).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
        assert_eq!(
            batch.cursor(2),
            ProgressCursor::CatchUp {
                identifier: "c".to_string()
            }
        );
    }

    #[test]
    fn test_backlog_cursor_carries_page() {
        let batch = Batch::backlog(vec![(3, "x".to_string()), (4, "y".to_string())]);
        assert_eq!(
            batch.cursor(1),
            ProgressCursor::Backlog {
                page: 4,
                identifier: "y".to_string()
            }
        );
    }

    #[test]
    fn test_watermark_waits_for_gaps() {
        let batch = Batch::backlog(vec![
            (1, "a".to_string()),
            (1, "b".to_string()),
            (1, "c".to_string()),
        ]);
        let mut watermark = Watermark::new(&batch);

        assert_eq!(watermark.complete(2), None);
        assert_eq!(watermark.complete(1), None);
        assert_eq!(
            watermark.complete(0),
            Some(ProgressCursor::Backlog {
                page: 1,
                identifier: "c".to_string()
            })
        );
        assert!(watermark.is_finished());
    }

    #[test]
    fn test_watermark_skips_already_stored_prefix() {
        let mut batch = Batch::catch_up(ids(&["c", "b", "a"]));
        assert_eq!(batch.mark_stored(|id| id == "a" || id == "b"), 2);

        let mut watermark = Watermark::new(&batch);
        assert_eq!(
            watermark.advance(),
            Some(ProgressCursor::CatchUp {
                identifier: "b".to_string()
            })
        );
        assert_eq!(watermark.position(), 2);
        assert!(!watermark.is_finished());
    }

    #[test]
    fn test_peek_complete_does_not_record() {
        let batch = Batch::backlog(vec![(1, "a".to_string()), (2, "b".to_string())]);
        let mut watermark = Watermark::new(&batch);
        watermark.complete(1);

        assert_eq!(watermark.peek_complete(1), None);
        assert_eq!(
            watermark.peek_complete(0),
            Some(ProgressCursor::Backlog {
                page: 2,
                identifier: "b".to_string()
            })
        );
        assert_eq!(watermark.position(), 0);
    }

    #[test]
    fn test_holding_markers() {
        let batch = Batch::backlog(vec![(1, "a".to_string())]);
        assert!(batch.moves_markers());
        assert!(!batch.holding_markers().moves_markers());
    }

    #[test]
    fn test_completing_twice_is_harmless() {
        let batch = Batch::catch_up(ids(&["b", "a"]));
        let mut watermark = Watermark::new(&batch);
        assert!(watermark.complete(0).is_some());
        assert_eq!(watermark.complete(0), None);
        assert_eq!(watermark.complete(9), None);
    }
}
