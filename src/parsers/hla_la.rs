// ==============================================================================
// hla_la.rs - HLA-LA Genotyping Output Parser
// ==============================================================================
// Description: Parser for HLA-LA *_R1_bestGuess_G.txt uploads
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================
// Format: Tab-delimited text, first line is the header
// Example:
//   Locus    Chromosome    Allele         Q1    Q2    AverageCoverage    ...
//   A        1             A*02:01:01G    1     1     45.2               ...
//   A        2             A*03:01:01G    1     1     44.8               ...
// ==============================================================================

use csv::{ReaderBuilder, StringRecord, Trim};
use flate2::read::GzDecoder;
use serde::Serialize;
use std::io::Read;
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::SampleId;
use crate::validator::{sha256_hex, ValidatedUpload};

const GZIP_MAGIC: [u8; 3] = [0x1f, 0x8b, 0x08];
const UTF8_BOM: &str = "\u{feff}";

/// One uploaded genotyping file as text cells, column-aligned to the header
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadedDataset {
    pub filename: String,
    pub sample: SampleId,
    /// SHA-256 of the uploaded bytes (before decompression)
    pub sha256: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl UploadedDataset {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Errors that can occur while parsing an upload
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("File is not valid UTF-8 text (invalid byte at offset {offset})")]
    Decode { offset: usize },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Tab-delimited parsing error: {0}")]
    CsvError(#[from] csv::Error),
}

/// Parser for HLA-LA best-guess typing files
#[derive(Debug, Clone, Default)]
pub struct HlaLaParser;

impl HlaLaParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse an uploaded file
    ///
    /// # Arguments
    /// * `bytes` - Raw upload, plain or gzip-compressed
    /// * `filename` - Upload filename; supplies the sample and trial identifiers
    ///
    /// # Returns
    /// * `Ok(UploadedDataset)` - One row per non-blank data line
    /// * `Err(ParseError)` - Unsupported content or undecodable text
    ///
    /// Rows shorter than the header are padded with empty cells and extra
    /// trailing cells are dropped.
    pub fn parse(&self, bytes: &[u8], filename: &str) -> Result<UploadedDataset, ParseError> {
        self.parse_hashed(bytes, filename, sha256_hex(bytes))
    }

    /// Parse an upload that already passed `UploadValidator`, reusing its hash
    pub fn parse_validated(
        &self,
        bytes: &[u8],
        upload: &ValidatedUpload,
    ) -> Result<UploadedDataset, ParseError> {
        self.parse_hashed(bytes, &upload.original_name, upload.hash_sha256.clone())
    }

    fn parse_hashed(&self, bytes: &[u8], filename: &str, sha256: String) -> Result<UploadedDataset, ParseError> {
        if !Self::is_text_filename(filename) {
            return Err(ParseError::UnsupportedFormat(format!(
                "expected a .txt or .tsv file, got '{}'",
                filename
            )));
        }

        let decompressed;
        let raw: &[u8] = if bytes.starts_with(&GZIP_MAGIC) {
            debug!("Decompressing gzip upload: {}", filename);
            let mut buffer = Vec::new();
            GzDecoder::new(bytes).read_to_end(&mut buffer)?;
            decompressed = buffer;
            &decompressed
        } else {
            bytes
        };

        let text = std::str::from_utf8(raw).map_err(|e| ParseError::Decode {
            offset: e.valid_up_to(),
        })?;
        let text = text.strip_prefix(UTF8_BOM).unwrap_or(text);

        let header_line = text
            .lines()
            .next()
            .filter(|line| !line.trim().is_empty())
            .ok_or_else(|| ParseError::UnsupportedFormat("file is empty".to_string()))?;

        if !header_line.contains('\t') {
            return Err(ParseError::UnsupportedFormat(
                "header line is not tab-delimited".to_string(),
            ));
        }

        let mut reader = ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(true)
            .flexible(true)
            .quoting(false)
            .trim(Trim::All)
            .from_reader(text.as_bytes());

        let columns: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

        let mut rows = Vec::new();
        let mut record = StringRecord::new();

        while reader.read_record(&mut record)? {
            if record.iter().all(str::is_empty) {
                continue;
            }

            let line = record.position().map(|p| p.line()).unwrap_or_default();
            rows.push(Self::align(&record, columns.len(), line));
        }

        let sample = SampleId::from_filename(filename);
        if !SampleId::has_read_marker(filename) {
            warn!(
                "Filename '{}' has no _R1 marker, using '{}' as sample id",
                filename, sample.sample_id
            );
        }

        debug!(
            "Parsed {} rows x {} columns for sample {}",
            rows.len(),
            columns.len(),
            sample.sample_id
        );

        Ok(UploadedDataset {
            filename: filename.to_string(),
            sample,
            sha256,
            columns,
            rows,
        })
    }

    fn is_text_filename(filename: &str) -> bool {
        let lower = filename.to_lowercase();
        let stem = lower.strip_suffix(".gz").unwrap_or(&lower);
        stem.ends_with(".txt") || stem.ends_with(".tsv")
    }

    /// Pad or truncate a record to the header width
    fn align(record: &StringRecord, width: usize, line: u64) -> Vec<String> {
        let mut fields: Vec<String> = record.iter().map(str::to_string).collect();

        if fields.len() != width {
            warn!(
                "Line {}: expected {} fields, found {}; {}",
                line,
                width,
                fields.len(),
                if fields.len() < width { "padding" } else { "truncating" }
            );
            fields.resize(width, String::new());
        }

        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    const HEADER: &str = "Locus\tChromosome\tAllele\tQ1\tQ2\tAverageCoverage\tproportionkMersCovered";

    fn sample_file() -> String {
        format!(
            "{}\nA\t1\tA*02:01:01G\t1\t1\t45.2\t1\nA\t2\tA*03:01:01G\t1\t1\t44.8\t1\nDQB1\t1\tDQB1*06:02:01G\t0.8\t1\t1.5\t0.95\n",
            HEADER
        )
    }

    #[test]
    fn test_parse_valid_file() {
        let parser = HlaLaParser::new();
        let dataset = parser
            .parse(sample_file().as_bytes(), "T1_S01_R1_bestGuess_G.txt")
            .unwrap();

        assert_eq!(dataset.len(), 3);
        assert_eq!(dataset.columns.len(), 7);
        assert_eq!(dataset.sample.sample_id, "T1_S01");
        assert_eq!(dataset.sample.trial_id, "T1");
        assert_eq!(dataset.rows[0][dataset.column_index("Allele").unwrap()], "A*02:01:01G");
        assert_eq!(dataset.rows[2][0], "DQB1");
        assert_eq!(dataset.sha256.len(), 64);
    }

    #[test]
    fn test_skips_blank_lines_and_crlf() {
        let contents = format!("{}\r\nA\t1\tx\t1\t1\t3\t1\r\n\r\nB\t1\ty\t1\t1\t3\t1\r\n", HEADER);
        let dataset = HlaLaParser::new().parse(contents.as_bytes(), "T1_S01_R1.txt").unwrap();

        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.rows[1][6], "1");
    }

    #[test]
    fn test_ragged_rows_are_aligned() {
        let contents = format!("{}\nA\t1\tx\nB\t1\ty\t1\t1\t3\t1\textra\n", HEADER);
        let dataset = HlaLaParser::new().parse(contents.as_bytes(), "T1_S01_R1.txt").unwrap();

        assert_eq!(dataset.rows[0].len(), 7);
        assert_eq!(dataset.rows[0][3], "");
        assert_eq!(dataset.rows[1].len(), 7);
        assert_eq!(dataset.rows[1][6], "1");
    }

    #[test]
    fn test_rejects_unsupported_extension() {
        let err = HlaLaParser::new()
            .parse(sample_file().as_bytes(), "report.pdf")
            .unwrap_err();
        assert!(matches!(err, ParseError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_rejects_non_tab_content() {
        let err = HlaLaParser::new()
            .parse(b"Locus,Chromosome,Allele\nA,1,x\n", "T1_S01_R1.txt")
            .unwrap_err();
        assert!(matches!(err, ParseError::UnsupportedFormat(_)));

        let err = HlaLaParser::new().parse(b"", "T1_S01_R1.txt").unwrap_err();
        assert!(matches!(err, ParseError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_rejects_invalid_utf8() {
        let mut bytes = format!("{}\nA\t1\t", HEADER).into_bytes();
        let offset = bytes.len();
        bytes.extend_from_slice(&[0xff, 0xfe, b'\n']);

        let err = HlaLaParser::new().parse(&bytes, "T1_S01_R1.txt").unwrap_err();
        match err {
            ParseError::Decode { offset: at } => assert_eq!(at, offset),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_parse_gzip_upload() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(sample_file().as_bytes()).unwrap();
        let compressed = encoder.finish().unwrap();

        let dataset = HlaLaParser::new()
            .parse(&compressed, "T1_S01_R1_bestGuess_G.txt.gz")
            .unwrap();

        assert_eq!(dataset.len(), 3);
        assert_eq!(dataset.sample.sample_id, "T1_S01");
    }

    #[test]
    fn test_parse_validated_reuses_upload_hash() {
        let bytes = sample_file().into_bytes();
        let upload = crate::validator::UploadValidator::new()
            .validate_upload(&bytes, "T1_S01_R1_bestGuess_G.txt")
            .unwrap();

        let dataset = HlaLaParser::new().parse_validated(&bytes, &upload).unwrap();
        assert_eq!(dataset.sha256, upload.hash_sha256);
        assert_eq!(dataset.filename, "T1_S01_R1_bestGuess_G.txt");
        assert_eq!(dataset.sample.sample_id, "T1_S01");

        let marked = ValidatedUpload {
            hash_sha256: "abc123".to_string(),
            ..upload
        };
        assert_eq!(HlaLaParser::new().parse_validated(&bytes, &marked).unwrap().sha256, "abc123");
    }

    #[test]
    fn test_strips_bom() {
        let contents = format!("\u{feff}{}\nA\t1\tx\t1\t1\t3\t1\n", HEADER);
        let dataset = HlaLaParser::new().parse(contents.as_bytes(), "T1_S01_R1.txt").unwrap();
        assert_eq!(dataset.columns[0], "Locus");
    }
}
