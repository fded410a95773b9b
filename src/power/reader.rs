//! Checkin record tokenizing, identifier resolution and dump file reading

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use glob::glob;
use log::{debug, warn};

/// Fields every record starts with: schema version, owner id, category, type tag
pub const RECORD_PREFIX_LEN: usize = 4;

/// Error type for reader operations
#[derive(Debug, thiserror::Error)]
pub enum ReaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid glob pattern: {0}")]
    Pattern(#[from] glob::PatternError),
    #[error("Dump is not valid UTF-8: {0}")]
    Encoding(String),
}

/// Record category from the third prefix field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordCategory {
    /// Identity / info records, e.g. identifier-to-name mappings
    Info,
    /// Line-item statistics
    LineItem,
    Other,
}

impl RecordCategory {
    fn from_field(field: &str) -> Self {
        match field {
            "i" => RecordCategory::Info,
            "l" => RecordCategory::LineItem,
            _ => RecordCategory::Other,
        }
    }
}

/// One tokenized line of the checkin stream
#[derive(Debug, Clone, PartialEq)]
pub struct Record<'a> {
    fields: Vec<&'a str>,
}

impl<'a> Record<'a> {
    pub fn category(&self) -> RecordCategory {
        RecordCategory::from_field(self.fields[2])
    }

    pub fn type_tag(&self) -> &'a str {
        self.fields[3]
    }

    /// Owner id from the prefix, if it parses
    pub fn owner_id(&self) -> Option<u32> {
        self.fields[1].parse().ok()
    }

    pub fn fields(&self) -> &[&'a str] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Raw field, `None` when out of range or blank
    pub fn text(&self, index: usize) -> Option<&'a str> {
        self.fields.get(index).copied().filter(|f| !f.is_empty())
    }

    /// Unsigned field, 0 when missing or malformed
    pub fn u64_at(&self, index: usize) -> u64 {
        self.fields.get(index).map_or(0, |f| parse_u64(f))
    }

    /// Float field, 0.0 when missing or malformed
    pub fn f64_at(&self, index: usize) -> f64 {
        self.fields.get(index).map_or(0.0, |f| parse_f64(f))
    }
}

/// Split a checkin line into fields.
///
/// Returns `None` for lines shorter than the common prefix. Field meaning is left to the
/// caller.
pub fn decode_record(line: &str) -> Option<Record<'_>> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return None;
    }

    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() < RECORD_PREFIX_LEN {
        return None;
    }

    Some(Record { fields })
}

/// Parse a counter; durations are occasionally emitted as floats, which are truncated.
fn parse_u64(field: &str) -> u64 {
    field.parse::<u64>().ok().unwrap_or_else(|| {
        field
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && *v > 0.0)
            .map(|v| v as u64)
            .unwrap_or(0)
    })
}

fn parse_f64(field: &str) -> f64 {
    field
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

/// Value on each side of a marker token
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MarkerValue {
    /// Field immediately before the marker
    pub preceding: u64,
    /// Field immediately after the marker
    pub following: u64,
}

/// Locate `marker` among the fields at or after `start` and read its neighbours.
///
/// Absent markers, and neighbours that are missing or not numeric, read as zero.
pub fn find_marker_value(fields: &[&str], start: usize, marker: &str) -> MarkerValue {
    let position = fields
        .iter()
        .enumerate()
        .skip(start.max(1))
        .find(|(_, f)| **f == marker)
        .map(|(i, _)| i);

    match position {
        Some(i) => MarkerValue {
            preceding: parse_u64(fields[i - 1]),
            following: fields.get(i + 1).map_or(0, |f| parse_u64(f)),
        },
        None => MarkerValue::default(),
    }
}

/// Owner id to display name mapping for one decode pass
#[derive(Debug, Default, Clone)]
pub struct IdentifierRegistry {
    names: HashMap<u32, String>,
}

impl IdentifierRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a mapping
    pub fn record_mapping(&mut self, owner_id: u32, name: impl Into<String>) {
        self.names.insert(owner_id, name.into());
    }

    /// Mapped name, or `id:<owner_id>` for unknown owners
    pub fn resolve(&self, owner_id: u32) -> String {
        self.names
            .get(&owner_id)
            .cloned()
            .unwrap_or_else(|| format!("id:{}", owner_id))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Read a checkin dump from disk, transparently inflating `.gz` files
pub fn read_checkin_file(path: &Path) -> Result<String, ReaderError> {
    let mut bytes = Vec::new();
    File::open(path)?.read_to_end(&mut bytes)?;

    let is_gzip = path.extension().and_then(|e| e.to_str()) == Some("gz")
        || bytes.starts_with(&[0x1f, 0x8b]);

    if is_gzip {
        let mut decoder = GzDecoder::new(bytes.as_slice());
        let mut inflated = Vec::new();
        decoder.read_to_end(&mut inflated)?;
        bytes = inflated;
    }

    String::from_utf8(bytes).map_err(|e| ReaderError::Encoding(e.to_string()))
}

/// Expand glob patterns into a sorted, de-duplicated list of dump files
pub fn list_checkin_files(patterns: &[String]) -> Result<Vec<PathBuf>, ReaderError> {
    let mut files = Vec::new();

    for pattern in patterns {
        for entry in glob(pattern)? {
            match entry {
                Ok(path) if path.is_file() => files.push(path),
                Ok(path) => debug!("Skipping non-file match {:?}", path),
                Err(e) => warn!("Unreadable glob match for {}: {}", pattern, e),
            }
        }
    }

    files.sort();
    files.dedup();
    Ok(files)
}
