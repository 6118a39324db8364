// Tabular inputs: classifier, KATOTTH → KOATUU comparison table, place table

use std::io::Read;
use std::path::Path;

use serde::Deserialize;
use uaplaces_recon::source::{ClassifierRow, LegacyPair, PlaceRow};

use crate::error::IoError;

/// Classifier rows carry five code columns, the category and the name.
pub const CLASSIFIER_COLUMNS: usize = 7;

/// Read file and convert to UTF-8 if needed. Government exports are often
/// Windows-1251; a leading BOM is dropped either way.
pub fn read_file_as_utf8(path: &Path) -> Result<String, IoError> {
    let mut file = std::fs::File::open(path).map_err(|e| IoError::read(path, e))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes).map_err(|e| IoError::read(path, e))?;
    Ok(decode(bytes))
}

fn decode(bytes: Vec<u8>) -> String {
    let text = match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => {
            let bytes = e.into_bytes();
            let (decoded, _, _) = encoding_rs::WINDOWS_1251.decode(&bytes);
            decoded.into_owned()
        }
    };
    match text.strip_prefix('\u{feff}') {
        Some(rest) => rest.to_string(),
        None => text,
    }
}

fn reader(content: &str, delimiter: u8) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(content.as_bytes())
}

// ---------------------------------------------------------------------------
// Classifier
// ---------------------------------------------------------------------------

/// Parse the `;`-separated classifier. The header row is skipped; short rows
/// are logged and skipped.
pub fn parse_classifier(content: &str, path: &Path) -> Result<Vec<ClassifierRow>, IoError> {
    let mut rows = Vec::new();
    for (idx, result) in reader(content, b';').records().enumerate() {
        let record = result.map_err(|e| IoError::csv(path, e))?;
        if record.len() < CLASSIFIER_COLUMNS {
            log::warn!(
                "{}: row {} has {} columns, skipped",
                path.display(),
                idx + 2,
                record.len()
            );
            continue;
        }
        rows.push(ClassifierRow::new(
            record.iter().take(5),
            record.get(5).unwrap_or_default(),
            record.get(6).unwrap_or_default(),
        ));
    }
    Ok(rows)
}

pub fn read_classifier(path: &Path) -> Result<Vec<ClassifierRow>, IoError> {
    let content = read_file_as_utf8(path)?;
    parse_classifier(&content, path)
}

// ---------------------------------------------------------------------------
// Comparison table
// ---------------------------------------------------------------------------

/// Parse the `;`-separated comparison table: KATOTTH in the first column,
/// KOATUU in the second. Rows with a blank side are dropped here; numeric
/// validation is left to the engine.
pub fn parse_comparison_table(content: &str, path: &Path) -> Result<Vec<LegacyPair>, IoError> {
    let mut pairs = Vec::new();
    for result in reader(content, b';').records() {
        let record = result.map_err(|e| IoError::csv(path, e))?;
        let (Some(katotth), Some(koatuu)) = (record.get(0), record.get(1)) else {
            continue;
        };
        let (katotth, koatuu) = (katotth.trim(), koatuu.trim());
        if katotth.is_empty() || koatuu.is_empty() {
            continue;
        }
        pairs.push(LegacyPair { katotth: katotth.to_string(), koatuu: koatuu.to_string() });
    }
    Ok(pairs)
}

pub fn read_comparison_table(path: &Path) -> Result<Vec<LegacyPair>, IoError> {
    let content = read_file_as_utf8(path)?;
    parse_comparison_table(&content, path)
}

// ---------------------------------------------------------------------------
// Place table
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct PlaceCsvRow {
    #[serde(default)]
    katotth: String,
    #[serde(default)]
    osm_id: Option<String>,
    #[serde(default)]
    koatuu: Option<String>,
    #[serde(default)]
    postal_code: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Parse the comma-separated place table (`katotth,osm_id,koatuu,postal_code`
/// by header name; other columns are ignored).
pub fn parse_places(content: &str, path: &Path) -> Result<Vec<PlaceRow>, IoError> {
    let mut rows = Vec::new();
    for result in reader(content, b',').deserialize::<PlaceCsvRow>() {
        let row = result.map_err(|e| IoError::csv(path, e))?;
        let katotth = row.katotth.trim();
        if katotth.is_empty() {
            continue;
        }
        rows.push(PlaceRow {
            katotth: katotth.to_string(),
            osm_reference: non_empty(row.osm_id),
            legacy_code: non_empty(row.koatuu),
            postal_code: non_empty(row.postal_code),
        });
    }
    Ok(rows)
}

pub fn read_places(path: &Path) -> Result<Vec<PlaceRow>, IoError> {
    let content = read_file_as_utf8(path)?;
    parse_places(&content, path)
}
