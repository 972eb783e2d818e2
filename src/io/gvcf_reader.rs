use crate::{
    core::record::{parse_line, ParseOptions, Record},
    error::GvxError,
    io::readers::open_gvcf_reader,
    utils::util::Result,
};
use std::{
    collections::HashSet,
    io::{BufRead, BufReader, Read},
    path::{Path, PathBuf},
};

/// Reads accepted records off one gVCF stream, one lookahead at a time.
///
/// The cursor owns a one-record pushback slot for the continuation half of
/// a block split at a batch boundary; the partitioner is the only caller
/// and never pushes more than one.
pub struct StreamCursor {
    reader: BufReader<Box<dyn Read + Send>>,
    path: PathBuf,
    options: ParseOptions,
    next: Option<Record>,
    pushback: Option<Record>,
    line_number: u64,
    accepted: u64,
    eof: bool,
}

impl StreamCursor {
    fn new(
        reader: BufReader<Box<dyn Read + Send>>,
        path: PathBuf,
        options: ParseOptions,
        line_number: u64,
    ) -> Self {
        Self {
            reader,
            path,
            options,
            next: None,
            pushback: None,
            line_number,
            accepted: 0,
            eof: false,
        }
    }

    pub fn peek(&mut self) -> Result<Option<&Record>> {
        self.fill()?;
        Ok(self.next.as_ref())
    }

    pub fn take(&mut self) -> Result<Option<Record>> {
        self.fill()?;
        Ok(self.next.take())
    }

    /// Re-queues the continuation of a block split at a batch boundary as
    /// this stream's next record.
    pub fn push_back(&mut self, record: Record) {
        debug_assert!(self.pushback.is_none(), "pushback slot already occupied");
        self.pushback = Some(record);
    }

    fn fill(&mut self) -> Result<()> {
        if self.next.is_some() {
            return Ok(());
        }
        if let Some(record) = self.pushback.take() {
            self.next = Some(record);
            return Ok(());
        }
        let mut line = String::new();
        while !self.eof {
            line.clear();
            let n = self.reader.read_line(&mut line).map_err(|e| {
                crate::gvx_error!("Error reading {} line {}: {e}", self.path.display(), self.line_number + 1)
            })?;
            if n == 0 {
                self.eof = true;
                break;
            }
            self.line_number += 1;
            let trimmed = line.trim_end_matches(['\n', '\r']);
            if trimmed.is_empty() {
                continue;
            }
            match parse_line(trimmed, &self.options).map_err(|e| {
                crate::gvx_error!("Error in {} line {}: {e}", self.path.display(), self.line_number)
            })? {
                Some(record) => {
                    self.accepted += 1;
                    self.next = Some(record);
                    return Ok(());
                }
                None => continue,
            }
        }
        // Every input must contribute at least one usable record.
        if self.accepted == 0 {
            return Err(GvxError::EmptyStream {
                path: self.path.clone(),
            });
        }
        Ok(())
    }
}

/// One opened gVCF input: header metadata, sample names, and the cursor
/// over its data lines.
pub struct GvcfReader {
    pub meta: Vec<String>,
    pub samples: Vec<String>,
    pub cursor: StreamCursor,
    pub index: usize,
}

impl GvcfReader {
    pub fn new(path: PathBuf, index: usize, reject_filters: &HashSet<String>) -> Result<Self> {
        log::trace!("Start loading gVCF {:?}", &path);
        let mut reader = open_gvcf_reader(&path)?;

        let mut meta = Vec::new();
        let mut line = String::new();
        let mut line_number = 0u64;
        let samples = loop {
            line.clear();
            let n = reader.read_line(&mut line).map_err(|e| {
                crate::gvx_error!("Error reading {} line {}: {e}", path.display(), line_number + 1)
            })?;
            if n == 0 {
                return Err(crate::gvx_error!(
                    "Missing #CHROM header line in {}",
                    path.display()
                ));
            }
            line_number += 1;
            let trimmed = line.trim_end_matches(['\n', '\r']);
            if trimmed.starts_with("##") {
                meta.push(trimmed.to_string());
            } else if trimmed.starts_with("#CHROM") {
                break parse_column_header(trimmed, &path)?;
            } else {
                return Err(crate::gvx_error!(
                    "Unexpected line before #CHROM header in {} line {}: {}",
                    path.display(),
                    line_number,
                    trimmed
                ));
            }
        };

        let options = ParseOptions {
            reject_filters: reject_filters.clone(),
            expected_samples: samples.len(),
        };
        Ok(Self {
            meta,
            samples,
            cursor: StreamCursor::new(reader, path, options, line_number),
            index,
        })
    }
}

const FIXED_HEADER_COLUMNS: [&str; 9] = [
    "#CHROM", "POS", "ID", "REF", "ALT", "QUAL", "FILTER", "INFO", "FORMAT",
];

fn parse_column_header(line: &str, path: &Path) -> Result<Vec<String>> {
    let columns: Vec<&str> = line.split('\t').collect();
    if columns.len() < FIXED_HEADER_COLUMNS.len() + 1 {
        return Err(crate::gvx_error!(
            "#CHROM header in {} must list the 9 fixed columns and at least one sample, found {} columns",
            path.display(),
            columns.len()
        ));
    }
    for (expected, found) in FIXED_HEADER_COLUMNS.iter().zip(&columns) {
        if expected != found {
            return Err(crate::gvx_error!(
                "Unexpected #CHROM header column '{found}' in {} (expected '{expected}')",
                path.display()
            ));
        }
    }
    Ok(columns[FIXED_HEADER_COLUMNS.len()..]
        .iter()
        .map(|s| s.to_string())
        .collect())
}

pub struct GvcfReaders {
    pub readers: Vec<GvcfReader>,
    pub n: usize,
}

impl GvcfReaders {
    pub fn new(paths: Vec<PathBuf>, reject_filters: &HashSet<String>) -> Result<Self> {
        let n = paths.len();
        let readers = paths
            .into_iter()
            .enumerate()
            .map(|(index, path)| GvcfReader::new(path, index, reject_filters))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { readers, n })
    }

    /// Fixed output column count per input stream, from the headers.
    pub fn sample_roster(&self) -> Vec<usize> {
        self.readers.iter().map(|r| r.samples.len()).collect()
    }

    /// All sample names in roster order. Duplicates across streams are
    /// fatal unless `force_samples`, which disambiguates them with the
    /// stream index.
    pub fn merged_sample_names(&self, force_samples: bool) -> Result<Vec<String>> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut duplicated: HashSet<String> = HashSet::new();
        for reader in &self.readers {
            for name in &reader.samples {
                if !seen.insert(name) {
                    duplicated.insert(name.clone());
                }
            }
        }
        if !duplicated.is_empty() && !force_samples {
            let mut names: Vec<String> = duplicated.into_iter().collect();
            names.sort();
            return Err(crate::gvx_error!(
                "Duplicate sample names across inputs: {}. Use --force-samples to disambiguate",
                names.join(", ")
            ));
        }

        let mut merged = Vec::new();
        for reader in &self.readers {
            for name in &reader.samples {
                if duplicated.contains(name) {
                    merged.push(format!("{}:{}", reader.index, name));
                } else {
                    merged.push(name.clone());
                }
            }
        }
        Ok(merged)
    }
}
