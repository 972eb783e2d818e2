use crate::{
    cli::FULL_VERSION,
    io::gvcf_reader::GvcfReaders,
    utils::util::Result,
};
use flate2::{Compression, write::GzEncoder};
use std::{
    env,
    io::{BufWriter, Write, stdout},
    path::{Path, PathBuf},
};
use tempfile::NamedTempFile;

enum OutputSink {
    Stdout(BufWriter<std::io::Stdout>),
    // Written next to the destination and persisted on finalize, so a
    // failed merge never leaves a truncated output behind.
    File {
        writer: Box<dyn Write + Send>,
        temp_file: Option<NamedTempFile>,
        path: PathBuf,
    },
}

pub struct GvcfWriter {
    sink: OutputSink,
}

impl GvcfWriter {
    pub fn new(output: Option<&Path>) -> Result<Self> {
        let sink = match output {
            None => OutputSink::Stdout(BufWriter::new(stdout())),
            Some(path) => {
                let dir = path.parent().filter(|d| !d.as_os_str().is_empty());
                let temp_file = match dir {
                    Some(dir) => NamedTempFile::new_in(dir),
                    None => NamedTempFile::new(),
                }
                .map_err(|e| {
                    crate::gvx_error!("Failed to create temporary output near {path:?}: {e}")
                })?;
                let file = temp_file.reopen().map_err(|e| {
                    crate::gvx_error!("Failed to open temporary output near {path:?}: {e}")
                })?;
                let writer: Box<dyn Write + Send> = if is_gzip_path(path) {
                    Box::new(GzEncoder::new(BufWriter::new(file), Compression::default()))
                } else {
                    Box::new(BufWriter::new(file))
                };
                OutputSink::File {
                    writer,
                    temp_file: Some(temp_file),
                    path: path.to_path_buf(),
                }
            }
        };
        Ok(Self { sink })
    }

    pub fn write_header(&mut self, header: &[String]) -> Result<()> {
        for line in header {
            self.write_line(line)?;
        }
        Ok(())
    }

    pub fn write_line(&mut self, line: &str) -> Result<()> {
        let writer: &mut dyn Write = match &mut self.sink {
            OutputSink::Stdout(w) => w,
            OutputSink::File { writer, .. } => writer,
        };
        writer
            .write_all(line.as_bytes())
            .and_then(|()| writer.write_all(b"\n"))
            .map_err(|e| crate::gvx_error!("Failed to write output record: {e}"))
    }

    /// Writes an already newline-terminated run of records.
    pub fn write_chunk(&mut self, chunk: &str) -> Result<()> {
        let writer: &mut dyn Write = match &mut self.sink {
            OutputSink::Stdout(w) => w,
            OutputSink::File { writer, .. } => writer,
        };
        writer
            .write_all(chunk.as_bytes())
            .map_err(|e| crate::gvx_error!("Failed to write output records: {e}"))
    }

    /// Flushes and, for file outputs, moves the temporary file into place.
    /// Must be called exactly once after the last record.
    pub fn finalize(mut self) -> Result<()> {
        match &mut self.sink {
            OutputSink::Stdout(w) => w
                .flush()
                .map_err(|e| crate::gvx_error!("Failed to flush output: {e}")),
            OutputSink::File {
                writer,
                temp_file,
                path,
            } => {
                writer
                    .flush()
                    .map_err(|e| crate::gvx_error!("Failed to flush output {path:?}: {e}"))?;
                // Drop the encoder before persisting so gzip trailers land.
                let placeholder: Box<dyn Write + Send> = Box::new(std::io::sink());
                drop(std::mem::replace(writer, placeholder));
                let temp_file = temp_file
                    .take()
                    .ok_or_else(|| crate::gvx_error!("Output {path:?} was already finalized"))?;
                temp_file
                    .persist(&path)
                    .map_err(|e| crate::gvx_error!("Failed to persist output {path:?}: {e}"))?;
                Ok(())
            }
        }
    }
}

fn is_gzip_path(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("gz") | Some("bgz")
    )
}

/// Builds the merged header: stream 0's meta lines, a tool provenance
/// pair, and a #CHROM line carrying every input's samples in roster order.
pub fn create_output_header(
    readers: &GvcfReaders,
    force_samples: bool,
    no_version: bool,
) -> Result<Vec<String>> {
    let mut header: Vec<String> = readers.readers[0].meta.clone();
    if header.is_empty() {
        header.push("##fileformat=VCFv4.2".to_string());
    }

    if !no_version {
        header.push(format!(
            "##{}Version={}",
            env!("CARGO_PKG_NAME"),
            FULL_VERSION.as_str()
        ));
        let command_line = env::args().collect::<Vec<String>>().join(" ");
        header.push(format!("##{}Command={}", env!("CARGO_PKG_NAME"), command_line));
    }

    let samples = readers.merged_sample_names(force_samples)?;
    let mut chrom_line =
        String::from("#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT");
    for sample in &samples {
        chrom_line.push('\t');
        chrom_line.push_str(sample);
    }
    header.push(chrom_line);
    Ok(header)
}
