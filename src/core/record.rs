use crate::{
    constants::{ALLELE_ANY_ALT, ALLELE_NON_REF, ALLELE_SPAN_DEL, DEGENERATE_FORMATS},
    core::format::FormatKey,
    utils::util::Result,
};
use std::collections::HashSet;

/// Returns true for the sentinel ALT tokens that are never trimmed or
/// extended and always sort after concrete alleles.
pub fn is_special_allele(allele: &str) -> bool {
    special_allele_rank(allele).is_some()
}

/// Fixed relative order of the special alleles in a canonical ALT list.
pub fn special_allele_rank(allele: &str) -> Option<u8> {
    match allele {
        ALLELE_SPAN_DEL => Some(0),
        ALLELE_NON_REF => Some(1),
        ALLELE_ANY_ALT => Some(2),
        _ => None,
    }
}

/// One accepted gVCF data line.
///
/// FILTER is cleared to `PASS` on acceptance and INFO is reduced to the
/// block end position, if any. The per-sample columns are kept as one
/// opaque tab-joined string and only split apart at merge time.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub chrom: String,
    pub pos: i64,
    pub reference: String,
    pub alts: Vec<String>,
    pub filter: String,
    /// Inclusive end of a non-variant block (`INFO END=`), if this record
    /// is one.
    pub end: Option<i64>,
    pub format: Vec<FormatKey>,
    pub samples: String,
}

impl Record {
    pub fn is_block(&self) -> bool {
        self.end.is_some()
    }

    pub fn has_concrete_alt(&self) -> bool {
        self.alts.iter().any(|a| !is_special_allele(a))
    }

    pub fn sample_columns(&self) -> impl Iterator<Item = &str> {
        self.samples.split('\t')
    }

    /// Strips flanking bases shared by REF and every concrete ALT.
    ///
    /// Suffix bases first, then prefix bases (advancing POS per stripped
    /// base), always keeping at least one base in REF and in every ALT.
    /// Special alleles are left untouched and keep their original relative
    /// positions. This is not left-alignment; callers are trusted to be
    /// internally consistent.
    fn normalize(&mut self) {
        if self.reference.len() < 2 {
            return;
        }

        let alts = std::mem::take(&mut self.alts);
        let mut specials: Vec<(usize, String)> = Vec::new();
        let mut concrete: Vec<String> = Vec::new();
        for (i, alt) in alts.into_iter().enumerate() {
            if is_special_allele(&alt) {
                specials.push((i, alt));
            } else {
                concrete.push(alt);
            }
        }

        if !concrete.is_empty() {
            loop {
                if self.reference.len() <= 1 {
                    break;
                }
                let last = self.reference.as_bytes()[self.reference.len() - 1];
                let shared = concrete
                    .iter()
                    .all(|a| a.len() > 1 && a.as_bytes()[a.len() - 1] == last);
                if !shared {
                    break;
                }
                self.reference.pop();
                for alt in &mut concrete {
                    alt.pop();
                }
            }

            loop {
                if self.reference.len() <= 1 {
                    break;
                }
                let first = self.reference.as_bytes()[0];
                let shared = concrete
                    .iter()
                    .all(|a| a.len() > 1 && a.as_bytes()[0] == first);
                if !shared {
                    break;
                }
                self.reference.remove(0);
                for alt in &mut concrete {
                    alt.remove(0);
                }
                self.pos += 1;
            }
        }

        let total = concrete.len() + specials.len();
        let mut concrete = concrete.into_iter();
        let mut specials = specials.into_iter().peekable();
        let mut rebuilt = Vec::with_capacity(total);
        for i in 0..total {
            if specials.peek().map_or(false, |(slot, _)| *slot == i) {
                let (_, allele) = specials.next().expect("peeked special allele");
                rebuilt.push(allele);
            } else {
                rebuilt.push(concrete.next().expect("concrete allele for slot"));
            }
        }
        self.alts = rebuilt;
    }
}

/// Per-stream parsing configuration, established once from the header.
#[derive(Debug, Clone)]
pub struct ParseOptions {
    pub reject_filters: HashSet<String>,
    /// Number of sample columns this stream must carry on every line.
    pub expected_samples: usize,
}

const FIXED_COLUMNS: usize = 9;

/// Parses one data line into a [`Record`], or `None` when the line is
/// rejected (unreliable FILTER key, degenerate FORMAT). Lines that do not
/// split into the required columns are fatal; the upstream format contract
/// is assumed.
pub fn parse_line(line: &str, options: &ParseOptions) -> Result<Option<Record>> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() < FIXED_COLUMNS + 1 {
        return Err(crate::gvx_error!(
            "Expected at least {} tab-separated columns, found {}: {}",
            FIXED_COLUMNS + 1,
            fields.len(),
            line
        ));
    }
    let n_samples = fields.len() - FIXED_COLUMNS;
    if n_samples != options.expected_samples {
        return Err(crate::gvx_error!(
            "Expected {} sample columns, found {}: {}",
            options.expected_samples,
            n_samples,
            line
        ));
    }

    let (chrom, pos, reference, alt, filter, info, format) = (
        fields[0], fields[1], fields[3], fields[4], fields[6], fields[7], fields[8],
    );

    if filter
        .split(';')
        .any(|key| options.reject_filters.contains(key))
    {
        return Ok(None);
    }
    if DEGENERATE_FORMATS.contains(&format) {
        return Ok(None);
    }

    let pos: i64 = pos
        .parse()
        .map_err(|e| crate::gvx_error!("Invalid POS '{pos}': {e}"))?;
    if pos < 1 {
        return Err(crate::gvx_error!("POS must be >= 1, found {pos}"));
    }
    if reference.is_empty() || reference == "." {
        return Err(crate::gvx_error!("Empty REF at {chrom}:{pos}"));
    }

    let alts: Vec<String> = if alt == "." {
        Vec::new()
    } else {
        alt.split(',').map(str::to_string).collect()
    };

    let end = parse_block_end(info, chrom, pos)?;

    let format = format
        .split(':')
        .map(|key| FormatKey::from_key(key, format))
        .collect::<Result<Vec<_>>>()?;

    let mut record = Record {
        chrom: chrom.to_string(),
        pos,
        reference: reference.to_string(),
        alts,
        filter: "PASS".to_string(),
        end,
        format,
        samples: fields[FIXED_COLUMNS..].join("\t"),
    };
    record.normalize();
    Ok(Some(record))
}

fn parse_block_end(info: &str, chrom: &str, pos: i64) -> Result<Option<i64>> {
    for field in info.split(';') {
        if let Some(value) = field.strip_prefix("END=") {
            let end: i64 = value
                .parse()
                .map_err(|e| crate::gvx_error!("Invalid END '{value}' at {chrom}:{pos}: {e}"))?;
            if end < pos {
                return Err(crate::gvx_error!(
                    "Block END {end} precedes POS at {chrom}:{pos}"
                ));
            }
            return Ok(Some(end));
        }
    }
    Ok(None)
}
