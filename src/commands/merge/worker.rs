use crate::{
    core::{
        block_split::split_block,
        record::Record,
        site::{is_pure_block_group, merge_site, SiteGroup},
    },
    io::batcher::{push_sorted, Batch},
    utils::util::Result,
};
use crossbeam_channel::Sender;
use std::{collections::VecDeque, thread, time::Instant};

use super::{metrics::PipelineQueueMetrics, types::MergeBatchResult};

/// Earliest pending position across the batch's stream queues.
fn next_site_pos(streams: &[VecDeque<Record>]) -> Option<i64> {
    streams
        .iter()
        .filter_map(|queue| queue.front())
        .map(|record| record.pos)
        .min()
}

/// Pops the record at `pos` from each stream that has one, keeping one
/// slot per stream.
fn pop_site(streams: &mut [VecDeque<Record>], pos: i64) -> Vec<Option<Record>> {
    streams
        .iter_mut()
        .map(|queue| match queue.front() {
            Some(record) if record.pos == pos => queue.pop_front(),
            _ => None,
        })
        .collect()
}

/// Merges every site in the batch into `lines`, walking the streams in
/// position order.
///
/// Contributing block runs are cut twice: a group of pure blocks is
/// truncated to the shortest contributor and to just before the next
/// pending record, and a block overlapping a variant site is reduced to
/// that single position. Either way the remainder re-enters its stream
/// queue as a continuation and is merged again at its new start.
pub fn merge_batch_sites(batch: &mut Batch, roster: &[usize], lines: &mut String) -> Result<usize> {
    let mut sites = 0usize;
    while let Some(pos) = next_site_pos(&batch.streams) {
        let mut slots = pop_site(&mut batch.streams, pos);

        if is_pure_block_group(&slots) {
            let shortest_end = slots
                .iter()
                .flatten()
                .filter_map(|record| record.end)
                .min()
                .unwrap_or(pos);
            let next_pending = next_site_pos(&batch.streams);
            let limit = shortest_end
                .min(next_pending.map_or(i64::MAX, |p| p - 1))
                .max(pos);
            for (stream, slot) in slots.iter_mut().enumerate() {
                if let Some(record) = slot {
                    if let Some(rest) = split_block(record, limit)? {
                        push_sorted(&mut batch.streams[stream], rest);
                    }
                }
            }
        } else {
            // A block overlapping a variant site contributes only this
            // position; the rest of the run is merged on its own.
            for (stream, slot) in slots.iter_mut().enumerate() {
                if let Some(record) = slot {
                    if record.is_block() {
                        if let Some(rest) = split_block(record, pos)? {
                            push_sorted(&mut batch.streams[stream], rest);
                        }
                    }
                }
            }
        }

        let group = SiteGroup {
            chrom: batch.chrom.clone(),
            pos,
            records: slots,
        };
        merge_site(&group, roster, lines)?;
        sites += 1;
    }
    Ok(sites)
}

pub fn process_batch(
    mut batch: Batch,
    roster: &[usize],
    sender: &Sender<MergeBatchResult>,
    queue_metrics: &PipelineQueueMetrics,
) -> Result<()> {
    queue_metrics.batch.decrement();
    let current_thread = thread::current();
    let worker_name = current_thread.name().unwrap_or("unnamed");
    log::debug!(
        "Worker [{worker_name}]: Processing batch {}: chrom={}, records={}",
        batch.index,
        batch.chrom,
        batch.record_count()
    );

    let started = Instant::now();
    let mut lines = String::new();
    let sites = merge_batch_sites(&mut batch, roster, &mut lines)?;
    queue_metrics.record_merge(started.elapsed());

    let result = MergeBatchResult {
        index: batch.index,
        chrom: batch.chrom,
        lines,
        sites,
    };
    log::debug!(
        "Worker [{worker_name}]: Sending result to writer: batch={}, sites={}",
        result.index,
        result.sites
    );
    queue_metrics.result.increment();
    if let Err(error) = sender.send(result) {
        queue_metrics.result.decrement();
        log::error!("Worker [{worker_name}]: Failed to send result to writer thread: {error}");
        return Err(crate::gvx_error!(
            "Failed to send result to writer thread: {error}"
        ));
    }
    Ok(())
}
