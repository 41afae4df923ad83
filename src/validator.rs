// ==============================================================================
// validator.rs - Upload and Sheet Name Validation
// ==============================================================================
// Description: Validates uploaded typing files (size, type, magic number) and
//              worksheet names before export
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// Security: Allowlist-only file types, magic number verification
// ==============================================================================

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, info};

use crate::parsers::ParseError;

const MAX_FILE_SIZE: usize = 50 * 1024 * 1024; // 50 MB

/// Worksheet names longer than this are rejected by spreadsheet applications
pub const MAX_SHEET_NAME_LEN: usize = 31;

const FORBIDDEN_SHEET_CHARS: [char; 7] = [':', '\\', '/', '?', '*', '[', ']'];

#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedUpload {
    pub original_name: String,
    pub extension: String,
    pub size: u64,
    pub hash_sha256: String,
    pub validated_at: chrono::DateTime<chrono::Utc>,
}

pub struct UploadValidator {
    max_file_size: usize,
    allowed_types: HashMap<String, Vec<u8>>,
}

impl UploadValidator {
    pub fn new() -> Self {
        let mut allowed_types = HashMap::new();

        // HLA-LA best-guess output (plain text, no specific magic number)
        allowed_types.insert("txt".to_string(), vec![]);
        allowed_types.insert("tsv".to_string(), vec![]);

        // Gzip compressed output
        allowed_types.insert("txt.gz".to_string(), vec![0x1f, 0x8b, 0x08]);
        allowed_types.insert("tsv.gz".to_string(), vec![0x1f, 0x8b, 0x08]);

        Self {
            max_file_size: MAX_FILE_SIZE,
            allowed_types,
        }
    }

    pub fn with_max_file_size(mut self, max_file_size: usize) -> Self {
        self.max_file_size = max_file_size;
        self
    }

    pub fn validate_upload(&self, bytes: &[u8], filename: &str) -> Result<ValidatedUpload, ParseError> {
        info!("Validating upload: {}", filename);

        // 1. Size check
        if bytes.len() > self.max_file_size {
            return Err(ParseError::UnsupportedFormat(format!(
                "file too large: {} bytes (max: {} bytes)",
                bytes.len(),
                self.max_file_size
            )));
        }
        debug!("Size check passed: {} bytes", bytes.len());

        // 2. Extension check (allowlist)
        let ext = Self::get_extension(filename);
        let expected_magic = self.allowed_types.get(&ext).ok_or_else(|| {
            ParseError::UnsupportedFormat(format!("invalid file type: .{}", ext))
        })?;
        debug!("Extension check passed: {}", ext);

        // 3. Magic number verification
        if !expected_magic.is_empty() && !bytes.starts_with(expected_magic) {
            return Err(ParseError::UnsupportedFormat(format!(
                "magic number mismatch for .{} file",
                ext
            )));
        }

        // 4. Compute SHA-256 hash
        let hash = sha256_hex(bytes);
        debug!("SHA-256: {}", hash);

        Ok(ValidatedUpload {
            original_name: filename.to_string(),
            extension: ext,
            size: bytes.len() as u64,
            hash_sha256: hash,
            validated_at: chrono::Utc::now(),
        })
    }

    fn get_extension(filename: &str) -> String {
        let lower = filename.to_lowercase();

        // Handle compound extensions like .txt.gz
        if let Some(stem) = lower.strip_suffix(".gz") {
            if let Some(inner) = stem.rsplit('.').next().filter(|_| stem.contains('.')) {
                return format!("{}.gz", inner);
            }
            return "gz".to_string();
        }

        match lower.rsplit_once('.') {
            Some((_, ext)) => ext.to_string(),
            None => String::new(),
        }
    }
}

impl Default for UploadValidator {
    fn default() -> Self {
        Self::new()
    }
}

/// Hex-encoded SHA-256 of a byte slice
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Reasons a sample identifier cannot be a worksheet name
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SheetNameError {
    #[error("sheet name is empty")]
    Empty,

    #[error("sheet name '{name}' is {len} characters (max: {max})", max = MAX_SHEET_NAME_LEN)]
    TooLong { name: String, len: usize },

    #[error("sheet name '{name}' contains forbidden character '{ch}'")]
    ForbiddenChar { name: String, ch: char },

    #[error("sheet name '{0}' cannot begin or end with an apostrophe")]
    Apostrophe(String),
}

/// Check that a sample identifier can be used as a worksheet name
pub fn validate_sheet_name(name: &str) -> Result<(), SheetNameError> {
    if name.is_empty() {
        return Err(SheetNameError::Empty);
    }

    let len = name.chars().count();
    if len > MAX_SHEET_NAME_LEN {
        return Err(SheetNameError::TooLong {
            name: name.to_string(),
            len,
        });
    }

    if let Some(ch) = name.chars().find(|c| FORBIDDEN_SHEET_CHARS.contains(c)) {
        return Err(SheetNameError::ForbiddenChar {
            name: name.to_string(),
            ch,
        });
    }

    if name.starts_with('\'') || name.ends_with('\'') {
        return Err(SheetNameError::Apostrophe(name.to_string()));
    }

    Ok(())
}
