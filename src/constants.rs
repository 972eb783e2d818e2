/// Target number of stream-0 records per batch before adaptive retuning.
pub const DEFAULT_BATCH_SIZE: usize = 2000;
pub const MIN_BATCH_SIZE: usize = 100;
pub const MAX_BATCH_SIZE: usize = 50_000;

/// Batches drained between adaptive batch-size adjustments.
pub const BATCH_RETUNE_INTERVAL: usize = 8;
/// Wall-clock target per batch that adaptive sizing steers toward.
pub const DEFAULT_BATCH_WALL_MS: u64 = 500;

/// Bounded channel capacity per pipeline queue, as a multiple of the worker
/// count. Caps the number of completed-but-unwritten batches.
pub const QUEUE_CAPACITY_FACTOR: usize = 2;

pub const DEFAULT_ADAPTIVE_BATCHING: bool = true;

/// FILTER keys whose records are dropped on input. These depth/quality
/// filters are known to be unreliable across the supported callers.
pub const DEFAULT_REJECT_FILTERS: &[&str] = &["LowGQX", "LowDepth", "RefCall"];

/// FORMAT strings that carry no informative per-sample fields.
pub const DEGENERATE_FORMATS: &[&str] = &[".", "GT"];

/// Deletion-spanning ALT marker.
pub const ALLELE_SPAN_DEL: &str = "*";
/// GATK-style "any other allele" placeholder.
pub const ALLELE_NON_REF: &str = "<NON_REF>";
/// DeepVariant-style "any other allele" placeholder.
pub const ALLELE_ANY_ALT: &str = "<*>";

/// REF placeholder for the continuation half of a split non-variant block.
pub const BLOCK_CONTINUATION_REF: &str = "N";

pub const MISSING_VALUE: &str = ".";
/// PL emitted for a genotype pair over an allele absent from the source
/// record.
pub const PL_ABSENT_ALLELE: &str = "255";
