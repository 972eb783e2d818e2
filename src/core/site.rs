use crate::{
    constants::{BLOCK_CONTINUATION_REF, MISSING_VALUE, PL_ABSENT_ALLELE},
    core::{
        format::{format_column_string, FormatCatalog, FormatKey},
        record::{is_special_allele, special_allele_rank, Record},
    },
    utils::util::Result,
};

const MISSING_GT: &str = "./.";

/// One position's group of records, one slot per input stream.
#[derive(Debug)]
pub struct SiteGroup {
    pub chrom: String,
    pub pos: i64,
    pub records: Vec<Option<Record>>,
}

/// True when every contributing record is a non-variant block with no
/// concrete ALT, which routes the group through the block merge instead of
/// the variant merge.
pub fn is_pure_block_group(records: &[Option<Record>]) -> bool {
    let mut any = false;
    for record in records.iter().flatten() {
        if !record.is_block() || record.has_concrete_alt() {
            return false;
        }
        any = true;
    }
    any
}

/// Merges one site group into one output line appended to `out`.
pub fn merge_site(group: &SiteGroup, roster: &[usize], out: &mut String) -> Result<()> {
    if roster.len() != group.records.len() {
        return Err(crate::gvx_error!(
            "Sample roster covers {} streams but the group at {}:{} spans {}",
            roster.len(),
            group.chrom,
            group.pos,
            group.records.len()
        ));
    }
    if is_pure_block_group(&group.records) {
        merge_blocks(group, roster, out)
    } else {
        merge_variants(group, roster, out)
    }
}

fn contributing_records(group: &SiteGroup) -> Result<Vec<(usize, &Record)>> {
    let contributing: Vec<(usize, &Record)> = group
        .records
        .iter()
        .enumerate()
        .filter_map(|(stream, record)| record.as_ref().map(|r| (stream, r)))
        .collect();
    if contributing.is_empty() {
        return Err(crate::gvx_error!(
            "Empty record group at {}:{}",
            group.chrom,
            group.pos
        ));
    }
    Ok(contributing)
}

/// Longest REF in the group; ties prefer a concrete base over the block
/// continuation placeholder `N`.
fn canonical_reference<'a>(contributing: &[(usize, &'a Record)]) -> &'a str {
    let mut best = "";
    for (_, record) in contributing {
        let candidate = record.reference.as_str();
        let better = candidate.len() > best.len()
            || (candidate.len() == best.len()
                && best == BLOCK_CONTINUATION_REF
                && candidate != BLOCK_CONTINUATION_REF)
            || best.is_empty();
        if better {
            best = candidate;
        }
    }
    best
}

/// Extends a record's concrete ALTs to the canonical REF by appending the
/// REF suffix the record is missing. A REF that is neither a prefix of the
/// canonical REF nor the `N` placeholder indicates inconsistent
/// normalization upstream and is fatal.
fn unify_alts(record: &Record, canonical_ref: &str, chrom: &str, pos: i64) -> Result<Vec<String>> {
    if record.reference == canonical_ref || record.reference == BLOCK_CONTINUATION_REF {
        return Ok(record.alts.clone());
    }
    if !canonical_ref.starts_with(record.reference.as_str()) {
        return Err(crate::gvx_error!(
            "Inconsistent REF at {chrom}:{pos}: '{}' is not a prefix of '{canonical_ref}'",
            record.reference
        ));
    }
    let suffix = &canonical_ref[record.reference.len()..];
    Ok(record
        .alts
        .iter()
        .map(|alt| {
            if is_special_allele(alt) {
                alt.clone()
            } else {
                format!("{alt}{suffix}")
            }
        })
        .collect())
}

/// Deduplicated canonical ALT list: concrete alleles sorted by length then
/// lexicographically, special alleles appended last in fixed order.
fn canonical_alt_list(extended: &[Vec<String>]) -> Vec<String> {
    let mut concrete: Vec<String> = extended
        .iter()
        .flatten()
        .filter(|alt| !is_special_allele(alt))
        .cloned()
        .collect();
    concrete.sort_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));
    concrete.dedup();

    let mut specials: Vec<(u8, String)> = extended
        .iter()
        .flatten()
        .filter_map(|alt| special_allele_rank(alt).map(|rank| (rank, alt.clone())))
        .collect();
    specials.sort();
    specials.dedup();

    concrete.extend(specials.into_iter().map(|(_, alt)| alt));
    concrete
}

fn push_line_prefix(
    out: &mut String,
    chrom: &str,
    pos: i64,
    reference: &str,
    alt_column: &str,
    info: &str,
    format_column: &str,
) {
    out.push_str(chrom);
    out.push('\t');
    out.push_str(&pos.to_string());
    out.push_str("\t.\t");
    out.push_str(reference);
    out.push('\t');
    out.push_str(alt_column);
    out.push_str("\t.\t.\t");
    out.push_str(info);
    out.push('\t');
    out.push_str(format_column);
}

fn merge_variants(group: &SiteGroup, roster: &[usize], out: &mut String) -> Result<()> {
    let contributing = contributing_records(group)?;
    let canonical_ref = canonical_reference(&contributing).to_string();

    let mut extended: Vec<Vec<String>> = Vec::with_capacity(contributing.len());
    for (_, record) in &contributing {
        extended.push(unify_alts(record, &canonical_ref, &group.chrom, group.pos)?);
    }
    let canonical_alts = canonical_alt_list(&extended);
    let alt_column = if canonical_alts.is_empty() {
        MISSING_VALUE.to_string()
    } else {
        canonical_alts.join(",")
    };

    let catalog = FormatCatalog::from_groups(contributing.iter().map(|(_, r)| r.format.as_slice()));
    push_line_prefix(
        out,
        &group.chrom,
        group.pos,
        &canonical_ref,
        &alt_column,
        MISSING_VALUE,
        &catalog.to_format_column(),
    );

    let mut slot: Vec<Option<usize>> = vec![None; group.records.len()];
    for (k, (stream, _)) in contributing.iter().enumerate() {
        slot[*stream] = Some(k);
    }

    for (stream, &n_samples) in roster.iter().enumerate() {
        match slot[stream] {
            Some(k) => {
                let (_, record) = contributing[k];
                let alts = &extended[k];
                // Fast path: a stream already on the canonical REF/ALT and
                // FORMAT contributes its columns verbatim.
                if record.reference == canonical_ref
                    && *alts == canonical_alts
                    && record.format == catalog.keys()
                {
                    out.push('\t');
                    out.push_str(&record.samples);
                    continue;
                }

                let alt_map = alts
                    .iter()
                    .map(|alt| {
                        canonical_alts
                            .iter()
                            .position(|c| c == alt)
                            .ok_or_else(|| {
                                crate::gvx_error!(
                                    "ALT '{alt}' missing from canonical allele list at {}:{}",
                                    group.chrom,
                                    group.pos
                                )
                            })
                    })
                    .collect::<Result<Vec<usize>>>()?;
                let canon_to_old: Vec<Option<usize>> = canonical_alts
                    .iter()
                    .map(|c| alts.iter().position(|alt| alt == c))
                    .collect();

                for column in record.sample_columns() {
                    out.push('\t');
                    let remapped = remap_sample_column(
                        record,
                        column,
                        &alt_map,
                        &canon_to_old,
                        &catalog,
                        &group.chrom,
                        group.pos,
                    )?;
                    out.push_str(&remapped);
                }
            }
            None => {
                let column = missing_column(catalog.keys(), canonical_alts.len());
                for _ in 0..n_samples {
                    out.push('\t');
                    out.push_str(&column);
                }
            }
        }
    }
    out.push('\n');
    Ok(())
}

fn remap_sample_column(
    record: &Record,
    column: &str,
    alt_map: &[usize],
    canon_to_old: &[Option<usize>],
    catalog: &FormatCatalog,
    chrom: &str,
    pos: i64,
) -> Result<String> {
    // Trailing fields may legally be dropped from a sample column, so
    // lookups past the end resolve to "absent".
    let values: Vec<&str> = column.split(':').collect();
    let value_of = |key: FormatKey| -> Option<&str> {
        record
            .format
            .iter()
            .position(|k| *k == key)
            .and_then(|i| values.get(i).copied())
    };

    let mut parts: Vec<String> = Vec::with_capacity(catalog.keys().len());
    for key in catalog.keys() {
        let part = match key {
            FormatKey::Gt => remap_gt(value_of(FormatKey::Gt), alt_map, chrom, pos)?,
            FormatKey::Dp => remap_depth(record, &values, chrom, pos)?,
            FormatKey::Ft => value_of(FormatKey::Ft)
                .map(str::to_string)
                .unwrap_or_else(|| record.filter.clone()),
            key if key.is_copied_verbatim() => {
                value_of(*key).unwrap_or(MISSING_VALUE).to_string()
            }
            key if key.is_ad_family() => remap_allele_depths(*key, value_of(*key), canon_to_old),
            FormatKey::Pl => remap_likelihoods(value_of(FormatKey::Pl), canon_to_old),
            FormatKey::MinDp => {
                return Err(crate::gvx_error!(
                    "MIN_DP requested from a format catalog at {chrom}:{pos}"
                ))
            }
            key => {
                return Err(crate::gvx_error!(
                    "FORMAT key {key} has no merge rule at {chrom}:{pos}"
                ))
            }
        };
        parts.push(part);
    }
    Ok(parts.join(":"))
}

fn remap_gt(value: Option<&str>, alt_map: &[usize], chrom: &str, pos: i64) -> Result<String> {
    let Some(gt) = value else {
        return Ok(MISSING_GT.to_string());
    };
    let mut out = String::with_capacity(gt.len() + 2);
    let mut start = 0;
    for (i, c) in gt.char_indices() {
        if c == '/' || c == '|' {
            push_remapped_allele(&gt[start..i], alt_map, chrom, pos, &mut out)?;
            out.push(c);
            start = i + 1;
        }
    }
    push_remapped_allele(&gt[start..], alt_map, chrom, pos, &mut out)?;
    Ok(out)
}

fn push_remapped_allele(
    token: &str,
    alt_map: &[usize],
    chrom: &str,
    pos: i64,
    out: &mut String,
) -> Result<()> {
    if token == "." || token.is_empty() {
        out.push('.');
        return Ok(());
    }
    // 0 is the reference allele and never remaps.
    if token == "0" {
        out.push('0');
        return Ok(());
    }
    let index: usize = token
        .parse()
        .map_err(|e| crate::gvx_error!("Invalid GT allele index '{token}' at {chrom}:{pos}: {e}"))?;
    let mapped = alt_map.get(index - 1).ok_or_else(|| {
        crate::gvx_error!("GT allele index {index} has no matching ALT at {chrom}:{pos}")
    })?;
    out.push_str(&(mapped + 1).to_string());
    Ok(())
}

/// DP with the MIN_DP override: a block's MIN_DP value replaces DP and
/// MIN_DP itself is dropped. The gVCF convention puts MIN_DP after DP in
/// FORMAT; anything else is fatal.
fn remap_depth(record: &Record, values: &[&str], chrom: &str, pos: i64) -> Result<String> {
    let dp_idx = record.format.iter().position(|k| *k == FormatKey::Dp);
    let min_dp_idx = record.format.iter().position(|k| *k == FormatKey::MinDp);
    match (dp_idx, min_dp_idx) {
        (Some(di), Some(mi)) => {
            if mi < di {
                return Err(crate::gvx_error!(
                    "MIN_DP must appear after DP in FORMAT at {chrom}:{pos}"
                ));
            }
            Ok(values.get(mi).copied().unwrap_or(MISSING_VALUE).to_string())
        }
        (None, Some(_)) => Err(crate::gvx_error!(
            "MIN_DP without a preceding DP in FORMAT at {chrom}:{pos}"
        )),
        (Some(di), None) => Ok(values.get(di).copied().unwrap_or(MISSING_VALUE).to_string()),
        (None, None) => Ok(MISSING_VALUE.to_string()),
    }
}

/// AD-family remap: the reference entry (where the key carries one) is
/// copied, then one entry per canonical ALT, zero-filled for alleles the
/// sample's record never listed.
fn remap_allele_depths(key: FormatKey, value: Option<&str>, canon_to_old: &[Option<usize>]) -> String {
    let offset = usize::from(key.has_ref_entry());
    let total = canon_to_old.len() + offset;
    if total == 0 {
        return MISSING_VALUE.to_string();
    }
    let mut parts: Vec<String> = Vec::with_capacity(total);
    match value {
        Some(value) => {
            let source: Vec<&str> = value.split(',').collect();
            if offset == 1 {
                parts.push(source.first().copied().unwrap_or("0").to_string());
            }
            for old in canon_to_old {
                let entry = old
                    .and_then(|oi| source.get(oi + offset).copied())
                    .unwrap_or("0");
                parts.push(entry.to_string());
            }
        }
        None => parts.resize(total, "0".to_string()),
    }
    parts.join(",")
}

/// PL remap over every unordered pair of canonical alleles using the
/// triangular index `x + y*(y+1)/2`. Pairs over an allele the source record
/// never carried get the 255 sentinel; a source array too short to serve a
/// structurally-required pair is a known caller defect and collapses the
/// whole field to missing markers.
fn remap_likelihoods(value: Option<&str>, canon_to_old: &[Option<usize>]) -> String {
    let m = canon_to_old.len() + 1;
    let n_pairs = m * (m + 1) / 2;
    let missing = || vec![MISSING_VALUE; n_pairs].join(",");

    let Some(value) = value else {
        return missing();
    };
    let source: Vec<&str> = value.split(',').collect();
    let old_of: Vec<Option<usize>> = std::iter::once(Some(0))
        .chain(canon_to_old.iter().map(|old| old.map(|i| i + 1)))
        .collect();

    let mut parts: Vec<&str> = Vec::with_capacity(n_pairs);
    for y in 0..m {
        for x in 0..=y {
            match (old_of[x], old_of[y]) {
                (Some(ox), Some(oy)) => {
                    let (a, b) = if ox <= oy { (ox, oy) } else { (oy, ox) };
                    let src = a + b * (b + 1) / 2;
                    match source.get(src) {
                        Some(v) => parts.push(v),
                        None => return missing(),
                    }
                }
                _ => parts.push(PL_ABSENT_ALLELE),
            }
        }
    }
    parts.join(",")
}

/// The column emitted for each sample of a stream with no record at a
/// position.
pub fn missing_column(keys: &[FormatKey], n_alts: usize) -> String {
    let m = n_alts + 1;
    keys.iter()
        .map(|key| match key {
            FormatKey::Gt => MISSING_GT.to_string(),
            key if key.is_ad_family() => {
                let n = n_alts + usize::from(key.has_ref_entry());
                if n == 0 {
                    MISSING_VALUE.to_string()
                } else {
                    vec!["0"; n].join(",")
                }
            }
            FormatKey::Pl => vec![MISSING_VALUE; m * (m + 1) / 2].join(","),
            _ => MISSING_VALUE.to_string(),
        })
        .collect::<Vec<_>>()
        .join(":")
}

/// Merges overlapping non-variant blocks into one block record. Callers
/// truncate every contributor to a shared END first; diverging END or
/// FORMAT here means the inputs disagree about a supposedly-identical
/// block and is fatal.
fn merge_blocks(group: &SiteGroup, roster: &[usize], out: &mut String) -> Result<()> {
    let contributing = contributing_records(group)?;
    let (_, first) = contributing[0];
    let end = first.end.ok_or_else(|| {
        crate::gvx_error!(
            "Non-block record routed to block merge at {}:{}",
            group.chrom,
            group.pos
        )
    })?;

    for (stream, record) in contributing.iter().skip(1) {
        if record.end != Some(end) {
            return Err(crate::gvx_error!(
                "INFO mismatch inside non-variant block group at {}:{}: stream {} has END={:?}, expected END={}",
                group.chrom,
                group.pos,
                stream,
                record.end,
                end
            ));
        }
        if record.format != first.format {
            return Err(crate::gvx_error!(
                "FORMAT mismatch inside non-variant block group at {}:{}: stream {} has {}, expected {}",
                group.chrom,
                group.pos,
                stream,
                format_column_string(&record.format),
                format_column_string(&first.format)
            ));
        }
    }

    let reference = canonical_reference(&contributing);
    let alt_column = if first.alts.is_empty() {
        MISSING_VALUE.to_string()
    } else {
        first.alts.join(",")
    };
    push_line_prefix(
        out,
        &group.chrom,
        group.pos,
        reference,
        &alt_column,
        &format!("END={end}"),
        &format_column_string(&first.format),
    );

    let mut slot: Vec<Option<usize>> = vec![None; group.records.len()];
    for (k, (stream, _)) in contributing.iter().enumerate() {
        slot[*stream] = Some(k);
    }

    for (stream, &n_samples) in roster.iter().enumerate() {
        match slot[stream] {
            // Contributors share FORMAT by construction, so their columns
            // copy verbatim.
            Some(k) => {
                out.push('\t');
                out.push_str(&contributing[k].1.samples);
            }
            None => {
                let column = missing_column(&first.format, first.alts.len());
                for _ in 0..n_samples {
                    out.push('\t');
                    out.push_str(&column);
                }
            }
        }
    }
    out.push('\n');
    Ok(())
}
