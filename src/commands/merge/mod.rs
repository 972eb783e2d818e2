use crate::{
    cli::MergeArgs,
    constants::{BATCH_RETUNE_INTERVAL, DEFAULT_BATCH_WALL_MS, QUEUE_CAPACITY_FACTOR},
    io::{
        batcher::{Batch, Batcher},
        gvcf_reader::{GvcfReaders, StreamCursor},
        gvcf_writer::{create_output_header, GvcfWriter},
    },
    utils::util::{format_number_with_commas, Result},
};
use crossbeam_channel::{bounded, Receiver, Sender};
use rayon::{prelude::*, ThreadPoolBuilder};
use std::{collections::HashSet, path::Path, sync::Arc, thread, time::Duration};

mod metrics;
mod reorder;
mod shutdown;
mod types;
mod worker;

pub use types::MergeBatchResult;

use metrics::PipelineQueueMetrics;
use reorder::ReorderBuffer;
use shutdown::finalize_merge_threads;
use worker::process_batch;

#[cfg(test)]
mod tests;

pub fn merge(args: MergeArgs) -> Result<()> {
    let gvcf_paths = args
        .process_gvcf_paths()
        .map_err(|error| crate::gvx_error!("{error}"))?;
    let reject_filters: HashSet<String> = args.merge_args.reject_filters.iter().cloned().collect();
    let gvcf_readers = GvcfReaders::new(gvcf_paths, &reject_filters)?;
    if gvcf_readers.n == 1 && !args.force_single {
        return Err(crate::gvx_error!(
            "Expected two or more files to merge, got only one. Use --force-single to proceed anyway"
        ));
    }

    let header = create_output_header(&gvcf_readers, args.force_samples, args.no_version)?;
    let mut writer = GvcfWriter::new(args.output.as_deref().map(Path::new))?;
    writer.write_header(&header)?;
    if args.print_header {
        return writer.finalize();
    }

    let roster = Arc::new(gvcf_readers.sample_roster());
    let cursors: Vec<StreamCursor> = gvcf_readers
        .readers
        .into_iter()
        .map(|reader| reader.cursor)
        .collect();

    let queue_capacity = (QUEUE_CAPACITY_FACTOR * args.num_threads).max(1);
    log::debug!("Pipeline queue capacity: {queue_capacity}");
    let queue_metrics = Arc::new(PipelineQueueMetrics::default());

    let (batch_sender, batch_receiver): (Sender<Batch>, Receiver<Batch>) =
        bounded(queue_capacity);
    let (result_sender, result_receiver): (Sender<MergeBatchResult>, Receiver<MergeBatchResult>) =
        bounded(queue_capacity);
    // One token per batch between submission and the ordered write. The
    // reader blocks once `queue_capacity` batches are in flight, which caps
    // how many completed batches the reorder heap can stage behind a slow
    // one.
    let (permit_sender, permit_receiver): (Sender<()>, Receiver<()>) = bounded(queue_capacity);

    let batch_size = args.merge_args.batch_size;
    let adaptive_batching = args.merge_args.adaptive_batching;
    let queue_metrics_reader = Arc::clone(&queue_metrics);
    let reader_thread = thread::spawn(move || -> Result<()> {
        let tx = batch_sender;
        let mut batcher = Batcher::new(cursors, batch_size);
        let target_wall = Duration::from_millis(DEFAULT_BATCH_WALL_MS);
        let mut retune_mark = (Duration::ZERO, 0u64);

        log::debug!("Reader thread started.");
        while let Some(batch) = batcher.next_batch()? {
            log::debug!(
                "Reader: Sending batch {}: chrom={}, records={}",
                batch.index,
                batch.chrom,
                batch.record_count()
            );
            if permit_sender.send(()).is_err() {
                log::error!("Failed to acquire batch permit. Writer closed.");
                return Err(crate::gvx_error!(
                    "Permit channel closed unexpectedly in reader thread"
                ));
            }
            queue_metrics_reader.batch.increment();
            if tx.send(batch).is_err() {
                queue_metrics_reader.batch.decrement();
                log::error!("Failed to send batch. Receiver closed.");
                return Err(crate::gvx_error!(
                    "Channel receiver closed unexpectedly in reader thread"
                ));
            }

            if adaptive_batching {
                let (elapsed, batches) = queue_metrics_reader.merge_totals();
                let (marked_elapsed, marked_batches) = retune_mark;
                let delta_batches = batches - marked_batches;
                if delta_batches >= BATCH_RETUNE_INTERVAL as u64 {
                    batcher.retune(
                        elapsed - marked_elapsed,
                        delta_batches as usize,
                        target_wall,
                    );
                    retune_mark = (elapsed, batches);
                }
            }
        }
        log::debug!("Reader thread finished. All inputs exhausted.");
        Ok(())
    });

    let queue_metrics_writer = Arc::clone(&queue_metrics);
    let writer_thread = thread::spawn(move || -> Result<GvcfWriter> {
        let mut writer_instance = writer;
        let mut reorder = ReorderBuffer::default();
        let mut total_sites = 0u64;

        log::debug!("Writer thread started.");
        for result in result_receiver {
            queue_metrics_writer.result.decrement();
            reorder.push(result);
            while let Some(ready) = reorder.pop_ready() {
                log::debug!(
                    "Writer: Writing batch {}: chrom={}, sites={}",
                    ready.index,
                    ready.chrom,
                    ready.sites
                );
                total_sites += ready.sites as u64;
                writer_instance.write_chunk(&ready.lines)?;
                // The token for this batch was sent before the batch entered
                // the pipeline, so this never blocks.
                let _ = permit_receiver.recv();
            }
        }
        if !reorder.is_empty() {
            return Err(crate::gvx_error!(
                "Writer stopped with {} batches still awaiting reorder",
                reorder.pending_len()
            ));
        }
        log::info!(
            "Wrote {} merged sites.",
            format_number_with_commas(total_sites)
        );
        Ok(writer_instance)
    });

    log::debug!(
        "Initializing merge thread pool with {} threads...",
        args.num_threads
    );
    let pool = ThreadPoolBuilder::new()
        .num_threads(args.num_threads)
        .thread_name(|i| format!("gvx-merge-{i}"))
        .build()
        .map_err(|e| crate::gvx_error!("Failed to initialize merge thread pool: {e}"))?;

    let roster_workers = Arc::clone(&roster);
    let queue_metrics_workers = Arc::clone(&queue_metrics);
    let worker_result: Result<()> = pool.install(|| {
        batch_receiver.into_iter().par_bridge().try_for_each_with(
            (result_sender, roster_workers, queue_metrics_workers),
            |state, batch| process_batch(batch, &state.1, &state.0, &state.2),
        )
    });

    let shutdown_result = finalize_merge_threads(reader_thread, writer_thread);

    let queue_snapshot = queue_metrics.snapshot();
    log::info!(
        "Pipeline queue peak depth: batch={} result={}",
        queue_snapshot.batch.peak,
        queue_snapshot.result.peak
    );

    worker_result?;
    let writer = shutdown_result?;
    writer.finalize()?;

    let (merge_elapsed, merged_batches) = queue_metrics.merge_totals();
    log::debug!("Merged {merged_batches} batches in {merge_elapsed:.2?} of worker time.");
    Ok(())
}
