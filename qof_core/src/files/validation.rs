use std::io::{self, SeekFrom};

use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};
use tracing::{debug, warn};

use super::models::FileOperationRequest;
use super::sniff::{self, HEADER_LEN, MIN_HEADER_LEN};
use crate::config::QofConfig;
use crate::storage::UploadBody;

pub const MAX_FILE_NAME_LENGTH: usize = 255;

lazy_static! {
    static ref PATH_CHARS: Regex = Regex::new(r"\.\.|[/\\]").unwrap();
    static ref CONTROL_CHARS: Regex = Regex::new(r"[\x00-\x1F\x7F]").unwrap();
}

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("File name cannot be empty")]
    EmptyFileName,

    #[error("File name too long: {length} characters (max: {max})")]
    FileNameTooLong { length: usize, max: usize },

    #[error("File name must not contain path separators or '..'")]
    IllegalPathCharacters,

    #[error("File name must not contain control characters")]
    ControlCharacters,

    #[error("File name must not start or end with '.'")]
    DotBoundary,

    #[error("File size is invalid or the file is empty")]
    InvalidFileSize,

    #[error("File too large: {size} bytes (max: {max} bytes)")]
    FileTooLarge { size: u64, max: u64 },

    #[error("File content does not match declared type {declared}")]
    ContentTypeMismatch { declared: String, detected: Option<String> },

    #[error("Upload stream cannot be rewound; supply a seekable stream for type verification")]
    StreamNotResettable,

    #[error("Private files require an owner")]
    MissingOwner,

    #[error("Failed to read upload header")]
    StreamRead(#[source] io::Error),
}

/// Upload checks that run before any byte reaches a backend.
#[derive(Debug, Clone)]
pub struct ContentValidator {
    max_file_size: i64,
    magic_number_detection: bool,
}

impl ContentValidator {
    /// `max_file_size <= 0` disables the size limit.
    pub fn new(max_file_size: i64, magic_number_detection: bool) -> Self {
        Self {
            max_file_size,
            magic_number_detection,
        }
    }

    pub fn from_config(config: &QofConfig) -> Self {
        Self::new(config.max_file_size, config.enable_magic_number_detection)
    }

    /// The size limit in bytes, `None` when disabled.
    pub fn max_file_size(&self) -> Option<u64> {
        (self.max_file_size > 0).then_some(self.max_file_size as u64)
    }

    /// Runs name, size and content-type checks in that order.
    ///
    /// Returns the sniffed type when the declared one has no known signature
    /// but the header does. The body is left positioned where it started.
    pub async fn validate_before_upload(
        &self,
        body: &mut UploadBody,
        request: &FileOperationRequest,
    ) -> Result<Option<&'static str>, ValidationError> {
        validate_file_name(&request.file_name)?;
        self.validate_file_size(request.file_size)?;

        let declared = normalize_content_type(&request.file_type);
        if !self.magic_number_detection || declared.is_empty() {
            return Ok(None);
        }

        let reader = match body {
            UploadBody::Seekable(reader) => reader,
            UploadBody::Sequential(_) => {
                warn!(file_name = %request.file_name, "Upload stream is not seekable, type verification impossible");
                return Err(ValidationError::StreamNotResettable);
            }
        };

        let header = peek_header(reader).await.map_err(ValidationError::StreamRead)?;
        check_content_type(&declared, &header, &request.file_name)
    }

    pub fn validate_file_size(&self, size: u64) -> Result<(), ValidationError> {
        if size == 0 {
            return Err(ValidationError::InvalidFileSize);
        }

        if self.max_file_size > 0 && size > self.max_file_size as u64 {
            warn!(size, max = self.max_file_size, "File exceeds size limit");
            return Err(ValidationError::FileTooLarge {
                size,
                max: self.max_file_size as u64,
            });
        }

        Ok(())
    }
}

pub fn validate_file_name(file_name: &str) -> Result<(), ValidationError> {
    let trimmed = file_name.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyFileName);
    }

    let length = file_name.chars().count();
    if length > MAX_FILE_NAME_LENGTH {
        return Err(ValidationError::FileNameTooLong {
            length,
            max: MAX_FILE_NAME_LENGTH,
        });
    }

    if PATH_CHARS.is_match(file_name) {
        warn!(file_name, "File name contains path characters");
        return Err(ValidationError::IllegalPathCharacters);
    }

    if CONTROL_CHARS.is_match(file_name) {
        warn!(file_name = %file_name.escape_debug(), "File name contains control characters");
        return Err(ValidationError::ControlCharacters);
    }

    if file_name.starts_with('.') || file_name.ends_with('.') {
        return Err(ValidationError::DotBoundary);
    }

    Ok(())
}

/// Lowercased `type/subtype` without parameters; empty for a blank input.
pub fn normalize_content_type(content_type: &str) -> String {
    let trimmed = content_type.trim();
    match trimmed.parse::<mime::Mime>() {
        Ok(parsed) => parsed.essence_str().to_lowercase(),
        Err(_) => trimmed.to_lowercase(),
    }
}

fn check_content_type(
    declared: &str,
    header: &[u8],
    file_name: &str,
) -> Result<Option<&'static str>, ValidationError> {
    if header.len() < MIN_HEADER_LEN {
        warn!(file_name, bytes = header.len(), "Header too short for type detection, keeping declared type");
        return Ok(None);
    }

    if sniff::is_known(declared) {
        if sniff::matches(declared, header) {
            return Ok(None);
        }

        let detected = sniff::detect(header);
        warn!(file_name, declared, detected = ?detected, "File content does not match declared type");
        return Err(ValidationError::ContentTypeMismatch {
            declared: declared.to_string(),
            detected: detected.map(str::to_string),
        });
    }

    let detected = sniff::detect(header);
    if let Some(detected) = detected {
        debug!(file_name, declared, detected, "Declared type has no signature, using detected type");
    }
    Ok(detected)
}

/// Reads up to [`HEADER_LEN`] bytes and seeks back to where reading began.
async fn peek_header<R>(reader: &mut R) -> io::Result<Vec<u8>>
where
    R: AsyncRead + AsyncSeek + Unpin,
{
    let start = reader.stream_position().await?;

    let mut header = vec![0u8; HEADER_LEN];
    let mut filled = 0;
    while filled < HEADER_LEN {
        let read = reader.read(&mut header[filled..]).await?;
        if read == 0 {
            break;
        }
        filled += read;
    }
    header.truncate(filled);

    reader.seek(SeekFrom::Start(start)).await?;
    Ok(header)
}
