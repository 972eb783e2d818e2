use crate::{error::GvxError, utils::util::Result};
use std::fmt;

/// Per-sample data field keys understood by the merger. Anything else in a
/// FORMAT column is fatal: it signals an unsupported caller was fed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatKey {
    Gt,
    Gq,
    Gqx,
    Dp,
    Dpf,
    Dpi,
    Sb,
    Ft,
    Ps,
    Pgt,
    Pid,
    Af,
    Ad,
    Adf,
    Adr,
    Vaf,
    Pl,
    /// Consumed into DP during the merge, never emitted.
    MinDp,
}

impl FormatKey {
    pub fn from_key(key: &str, format_column: &str) -> Result<Self> {
        match key {
            "GT" => Ok(Self::Gt),
            "GQ" => Ok(Self::Gq),
            "GQX" => Ok(Self::Gqx),
            "DP" => Ok(Self::Dp),
            "DPF" => Ok(Self::Dpf),
            "DPI" => Ok(Self::Dpi),
            "SB" => Ok(Self::Sb),
            "FT" => Ok(Self::Ft),
            "PS" => Ok(Self::Ps),
            "PGT" => Ok(Self::Pgt),
            "PID" => Ok(Self::Pid),
            "AF" => Ok(Self::Af),
            "AD" => Ok(Self::Ad),
            "ADF" => Ok(Self::Adf),
            "ADR" => Ok(Self::Adr),
            "VAF" => Ok(Self::Vaf),
            "PL" => Ok(Self::Pl),
            "MIN_DP" => Ok(Self::MinDp),
            _ => Err(GvxError::UnknownFormatKey {
                key: key.to_string(),
                context: format_column.to_string(),
            }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gt => "GT",
            Self::Gq => "GQ",
            Self::Gqx => "GQX",
            Self::Dp => "DP",
            Self::Dpf => "DPF",
            Self::Dpi => "DPI",
            Self::Sb => "SB",
            Self::Ft => "FT",
            Self::Ps => "PS",
            Self::Pgt => "PGT",
            Self::Pid => "PID",
            Self::Af => "AF",
            Self::Ad => "AD",
            Self::Adf => "ADF",
            Self::Adr => "ADR",
            Self::Vaf => "VAF",
            Self::Pl => "PL",
            Self::MinDp => "MIN_DP",
        }
    }

    /// Canonical output position: the genotype call first, allelic-depth
    /// and likelihood families last.
    fn priority(&self) -> u8 {
        match self {
            Self::Gt => 0,
            Self::Gq => 1,
            Self::Gqx => 2,
            Self::Dp => 3,
            Self::Dpf => 4,
            Self::Dpi => 5,
            Self::Sb => 6,
            Self::Ft => 7,
            Self::Ps => 8,
            Self::Pgt => 9,
            Self::Pid => 10,
            Self::Af => 11,
            Self::Ad => 12,
            Self::Adf => 13,
            Self::Adr => 14,
            Self::Vaf => 15,
            Self::Pl => 16,
            Self::MinDp => u8::MAX,
        }
    }

    /// One value per allele, zero-filled for alleles a sample never saw.
    pub fn is_ad_family(&self) -> bool {
        matches!(self, Self::Ad | Self::Adf | Self::Adr | Self::Vaf)
    }

    /// AD-family keys carrying a leading reference-allele entry.
    pub fn has_ref_entry(&self) -> bool {
        matches!(self, Self::Ad | Self::Adf | Self::Adr)
    }

    /// Keys copied verbatim from the source sample column.
    pub fn is_copied_verbatim(&self) -> bool {
        matches!(
            self,
            Self::Gq
                | Self::Gqx
                | Self::Dp
                | Self::Dpf
                | Self::Dpi
                | Self::Sb
                | Self::Ft
                | Self::Ps
                | Self::Pgt
                | Self::Pid
                | Self::Af
        )
    }
}

impl fmt::Display for FormatKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn format_column_string(keys: &[FormatKey]) -> String {
    keys.iter()
        .map(FormatKey::as_str)
        .collect::<Vec<_>>()
        .join(":")
}

/// The ordered, deduplicated set of FORMAT keys observed across the records
/// merged at one position, in canonical priority order. MIN_DP is excluded:
/// it is consumed into DP rather than emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatCatalog {
    keys: Vec<FormatKey>,
}

impl FormatCatalog {
    pub fn from_groups<'a>(formats: impl Iterator<Item = &'a [FormatKey]>) -> Self {
        let mut keys: Vec<FormatKey> = Vec::new();
        for format in formats {
            for key in format {
                if *key != FormatKey::MinDp && !keys.contains(key) {
                    keys.push(*key);
                }
            }
        }
        keys.sort_by_key(FormatKey::priority);
        Self { keys }
    }

    pub fn keys(&self) -> &[FormatKey] {
        &self.keys
    }

    pub fn to_format_column(&self) -> String {
        format_column_string(&self.keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys_of(spec: &str) -> Vec<FormatKey> {
        spec.split(':')
            .map(|k| FormatKey::from_key(k, spec).expect("known key"))
            .collect()
    }

    #[test]
    fn test_catalog_orders_and_dedups() {
        let a = keys_of("GT:DP:AD:PL");
        let b = keys_of("GT:GQ:PL:DP");
        let catalog = FormatCatalog::from_groups([a.as_slice(), b.as_slice()].into_iter());
        assert_eq!(catalog.to_format_column(), "GT:GQ:DP:AD:PL");
    }

    #[test]
    fn test_catalog_excludes_min_dp() {
        let a = keys_of("GT:DP:MIN_DP:PL");
        let catalog = FormatCatalog::from_groups([a.as_slice()].into_iter());
        assert_eq!(catalog.to_format_column(), "GT:DP:PL");
    }

    #[test]
    fn test_catalog_puts_gt_first() {
        let a = keys_of("PL:AD:GQ:GT");
        let catalog = FormatCatalog::from_groups([a.as_slice()].into_iter());
        assert_eq!(catalog.keys()[0], FormatKey::Gt);
        assert_eq!(catalog.to_format_column(), "GT:GQ:AD:PL");
    }

    #[test]
    fn test_unknown_key_is_fatal() {
        let err = FormatKey::from_key("WOBBLE", "GT:WOBBLE").expect_err("unknown key");
        assert!(err.to_string().contains("WOBBLE"));
    }
}
