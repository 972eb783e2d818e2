use crate::{error::GvxError, utils::util::Result};
use flate2::read::MultiGzDecoder;
use std::{
    fs::File,
    io::{BufReader, Read},
    path::Path,
};

/// Opens a gVCF text stream, transparently decoding gzip by extension.
/// Bulk bgzf handling is an external collaborator's responsibility; a
/// plain gzip wrapper is accepted because bgzf is gzip-compatible when
/// read sequentially.
pub fn open_gvcf_reader(path: &Path) -> Result<BufReader<Box<dyn Read + Send>>> {
    fn is_gzipped(path: &Path) -> bool {
        let path_str = path.to_string_lossy().to_lowercase();
        path_str.ends_with(".gz") || path_str.ends_with(".gzip")
    }
    let file = File::open(path)
        .map_err(|error| crate::gvx_error!("Failed to open file {}: {error}", path.display()))?;
    if is_gzipped(path) {
        let gz_decoder = MultiGzDecoder::new(file);
        if gz_decoder.header().is_some() {
            Ok(BufReader::new(Box::new(gz_decoder)))
        } else {
            Err(GvxError::InvalidGzipHeader {
                path: path.to_path_buf(),
            })
        }
    } else {
        Ok(BufReader::new(Box::new(file)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, Write};
    use tempfile::NamedTempFile;

    #[test]
    fn test_open_plain_text() {
        let mut temp_file = NamedTempFile::new().expect("temp file should be creatable");
        writeln!(temp_file, "##fileformat=VCFv4.2").expect("temp file should be writable");
        temp_file.flush().expect("temp file should flush");

        let reader = open_gvcf_reader(temp_file.path()).expect("reader should open");
        let first = reader.lines().next().expect("line expected");
        assert_eq!(first.expect("line should read"), "##fileformat=VCFv4.2");
    }

    #[test]
    fn test_gz_extension_without_gzip_header_is_fatal() {
        let temp_file = tempfile::Builder::new()
            .suffix(".gz")
            .tempfile()
            .expect("temp file should be creatable");
        std::fs::write(temp_file.path(), b"not gzip").expect("temp file should be writable");
        let err = open_gvcf_reader(temp_file.path())
            .err()
            .expect("bogus gzip should fail");
        assert!(matches!(err, GvxError::InvalidGzipHeader { .. }));
    }
}
