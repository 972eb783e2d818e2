use std::{cmp::Ordering, collections::BinaryHeap};

use super::types::MergeBatchResult;

struct QueuedResult(MergeBatchResult);

impl PartialEq for QueuedResult {
    fn eq(&self, other: &Self) -> bool {
        self.0.index == other.0.index
    }
}

impl Eq for QueuedResult {}

impl PartialOrd for QueuedResult {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedResult {
    // Min-heap on batch index.
    fn cmp(&self, other: &Self) -> Ordering {
        other.0.index.cmp(&self.0.index)
    }
}

/// Restores batch submission order over results arriving from the worker
/// pool in completion order. Results are held until every earlier index
/// has been released.
#[derive(Default)]
pub struct ReorderBuffer {
    pending: BinaryHeap<QueuedResult>,
    next_index: usize,
}

impl ReorderBuffer {
    pub fn push(&mut self, result: MergeBatchResult) {
        self.pending.push(QueuedResult(result));
    }

    pub fn pop_ready(&mut self) -> Option<MergeBatchResult> {
        match self.pending.peek() {
            Some(queued) if queued.0.index == self.next_index => {
                self.next_index += 1;
                self.pending.pop().map(|queued| queued.0)
            }
            _ => None,
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
