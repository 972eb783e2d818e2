use crate::{
    constants::{MAX_BATCH_SIZE, MIN_BATCH_SIZE},
    core::{block_split::split_block, record::Record},
    io::gvcf_reader::StreamCursor,
    utils::util::Result,
};
use std::{collections::VecDeque, time::Duration};

/// One position-bounded, single-chromosome unit of merge work.
///
/// `bound` is the exclusive upper position bound; `None` means the batch
/// runs to the end of the chromosome. Each stream's records are sorted by
/// position.
#[derive(Debug)]
pub struct Batch {
    pub index: usize,
    pub chrom: String,
    pub bound: Option<i64>,
    pub streams: Vec<VecDeque<Record>>,
}

impl Batch {
    pub fn record_count(&self) -> usize {
        self.streams.iter().map(VecDeque::len).sum()
    }
}

/// Inserts a record into a position-sorted stream queue. The insertion
/// point is at most a few records deep (a block continuation re-queued at
/// the position after a split), so a linear scan from the front suffices.
pub fn push_sorted(queue: &mut VecDeque<Record>, record: Record) {
    let at = queue
        .iter()
        .position(|r| r.pos > record.pos)
        .unwrap_or(queue.len());
    queue.insert(at, record);
}

/// Carves successive batches out of N jointly sorted stream cursors.
///
/// Stream 0 drives: its current record names the chromosome and its
/// position run bounds the batch. Every other stream contributes its
/// records below the bound, with blocks straddling the bound truncated and
/// their continuations re-queued on the cursor.
pub struct Batcher {
    cursors: Vec<StreamCursor>,
    target_size: usize,
    next_index: usize,
}

impl Batcher {
    pub fn new(cursors: Vec<StreamCursor>, target_size: usize) -> Self {
        Self {
            cursors,
            target_size,
            next_index: 0,
        }
    }

    pub fn target_size(&self) -> usize {
        self.target_size
    }

    /// Adjusts the target batch size toward `target_wall` of merge time
    /// per batch, damped to at most halving or doubling per step.
    pub fn retune(&mut self, elapsed: Duration, batches: usize, target_wall: Duration) {
        if batches == 0 || elapsed.is_zero() {
            return;
        }
        let per_batch = elapsed.as_secs_f64() / batches as f64;
        let ratio = (target_wall.as_secs_f64() / per_batch).clamp(0.5, 2.0);
        let retuned = ((self.target_size as f64 * ratio) as usize)
            .clamp(MIN_BATCH_SIZE, MAX_BATCH_SIZE);
        if retuned != self.target_size {
            log::debug!(
                "Batcher: retuned target batch size {} -> {} ({:.0} ms/batch observed)",
                self.target_size,
                retuned,
                per_batch * 1e3
            );
            self.target_size = retuned;
        }
    }

    pub fn next_batch(&mut self) -> Result<Option<Batch>> {
        let Some(first) = self.cursors[0].peek()? else {
            // Stream 0 is the chromosome authority: anything left on a
            // later stream is a chromosome it never covered.
            for (i, cursor) in self.cursors.iter_mut().enumerate().skip(1) {
                if let Some(record) = cursor.peek()? {
                    return Err(crate::gvx_error!(
                        "Stream {i} has records for chromosome {} that stream 0 does not cover; \
                         inputs must be jointly sorted over the same chromosome set",
                        record.chrom
                    ));
                }
            }
            return Ok(None);
        };
        let chrom = first.chrom.clone();

        let mut streams: Vec<VecDeque<Record>> = (0..self.cursors.len())
            .map(|_| VecDeque::new())
            .collect();

        while streams[0].len() < self.target_size {
            match self.cursors[0].peek()? {
                Some(record) if record.chrom == chrom => {
                    let record = self.cursors[0]
                        .take()?
                        .ok_or_else(|| crate::gvx_error!("Cursor lost its peeked record"))?;
                    streams[0].push_back(record);
                }
                _ => break,
            }
        }
        let bound = match self.cursors[0].peek()? {
            Some(record) if record.chrom == chrom => Some(record.pos),
            _ => None,
        };

        for (i, cursor) in self.cursors.iter_mut().enumerate().skip(1) {
            loop {
                match cursor.peek()? {
                    Some(record)
                        if record.chrom == chrom
                            && bound.map_or(true, |bound| record.pos < bound) =>
                    {
                        let mut record = cursor
                            .take()?
                            .ok_or_else(|| crate::gvx_error!("Cursor lost its peeked record"))?;
                        if let Some(bound) = bound {
                            if let Some(rest) = split_block(&mut record, bound - 1)? {
                                cursor.push_back(rest);
                            }
                        }
                        streams[i].push_back(record);
                    }
                    _ => break,
                }
            }
        }

        let batch = Batch {
            index: self.next_index,
            chrom,
            bound,
            streams,
        };
        self.next_index += 1;
        Ok(Some(batch))
    }
}
