use crate::{constants::BLOCK_CONTINUATION_REF, core::record::Record, utils::util::Result};

/// Truncates a non-variant block at `new_end` and returns the continuation
/// covering the remainder of the original interval.
///
/// No-op (`None`) when `record` is not a block, `new_end` is negative, or
/// `new_end` does not fall short of the block's END. A `new_end` before the
/// block's POS is a caller error and fatal.
///
/// The continuation starts at `new_end + 1` with the single-base `N`
/// placeholder REF; the actual base at that position is unknown without a
/// reference genome, and nothing downstream needs it.
pub fn split_block(record: &mut Record, new_end: i64) -> Result<Option<Record>> {
    let Some(end) = record.end else {
        return Ok(None);
    };
    if new_end < 0 || new_end >= end {
        return Ok(None);
    }
    if new_end < record.pos {
        return Err(crate::gvx_error!(
            "Cannot split block {}:{}-{} at {}: boundary precedes block start",
            record.chrom,
            record.pos,
            end,
            new_end
        ));
    }

    let mut rest = record.clone();
    rest.pos = new_end + 1;
    rest.reference = BLOCK_CONTINUATION_REF.to_string();
    record.end = Some(new_end);
    Ok(Some(rest))
}
