/// Merged output for one batch: the rendered lines plus enough metadata
/// for the writer to restore submission order.
pub struct MergeBatchResult {
    pub index: usize,
    pub chrom: String,
    pub lines: String,
    pub sites: usize,
}
