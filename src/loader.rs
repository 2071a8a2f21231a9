use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord, Trim};
use thiserror::Error;

/// Date format used in the CSV file and the shows table.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Input file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// A data row that could not be turned into a [`ShowUrl`]. The row is skipped.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RowParseError {
    #[error("line {line}: missing {column} value")]
    MissingField { line: u64, column: &'static str },
    #[error("line {line}: invalid show date {value:?} (expected YYYY-MM-DD)")]
    InvalidDate { line: u64, value: String },
    #[error("line {line}: unreadable row: {message}")]
    Unreadable { line: u64, message: String },
}

/// One `(date, url)` pair from the input file.
#[derive(Debug, Clone, PartialEq)]
pub struct ShowUrl {
    pub date: NaiveDate,
    pub url: String,
    /// 1-based line in the input file, for reporting.
    pub line: u64,
}

/// Everything read from an input file: good rows in file order plus the rows
/// that were skipped.
#[derive(Debug, Default)]
pub struct LoadedRows {
    pub rows: Vec<ShowUrl>,
    pub skipped: Vec<RowParseError>,
}

/// Positions of the date and URL fields within a record.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Columns {
    date: usize,
    url: usize,
}

impl Columns {
    /// Find `date` and `url` by header name, falling back to the first two columns.
    fn from_header(header: &StringRecord) -> Self {
        let find = |name: &str| {
            header
                .iter()
                .position(|h| h.trim().trim_start_matches('\u{feff}').eq_ignore_ascii_case(name))
        };
        match (find("date"), find("url")) {
            (Some(date), Some(url)) => Self { date, url },
            _ => {
                log::warn!(
                    "Header {:?} lacks date/url columns, using first two columns",
                    header.iter().collect::<Vec<_>>()
                );
                Self { date: 0, url: 1 }
            }
        }
    }
}

/// Load show URLs from a CSV file with a header row.
pub fn load(path: &Path) -> Result<LoadedRows, LoadError> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(LoadError::NotFound(path.to_path_buf()));
        }
        Err(e) => return Err(e.into()),
    };
    log::info!("Reading show URLs from {}", path.display());
    read_rows(file)
}

/// Parse show URLs from any CSV source. The first row is treated as a header.
pub fn read_rows<R: Read>(reader: R) -> Result<LoadedRows, LoadError> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(reader);

    let columns = Columns::from_header(rdr.headers()?);
    let mut loaded = LoadedRows::default();

    for record in rdr.records() {
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                let skipped = unreadable_row(e)?;
                log::warn!("Skipping row: {skipped}");
                loaded.skipped.push(skipped);
                continue;
            }
        };
        // Header is line 1
        let line = record.position().map(|p| p.line()).unwrap_or(0);

        match parse_record(&record, columns, line) {
            Ok(row) => loaded.rows.push(row),
            Err(e) => {
                log::warn!("Skipping row: {e}");
                loaded.skipped.push(e);
            }
        }
    }

    log::debug!(
        "Loaded {} rows, skipped {}",
        loaded.rows.len(),
        loaded.skipped.len()
    );
    Ok(loaded)
}

/// Turn a CSV error confined to one record into a skipped row. Anything else
/// (I/O, a broken reader) is still fatal.
fn unreadable_row(e: csv::Error) -> Result<RowParseError, LoadError> {
    let line = match e.kind() {
        csv::ErrorKind::Utf8 { pos, .. } | csv::ErrorKind::UnequalLengths { pos, .. } => {
            Some(pos.as_ref().map(|p| p.line()).unwrap_or(0))
        }
        _ => None,
    };
    let Some(line) = line else {
        return Err(e.into());
    };
    let message = match e.kind() {
        csv::ErrorKind::Utf8 { err, .. } => format!("invalid UTF-8 in field {}", err.field() + 1),
        _ => e.to_string(),
    };
    Ok(RowParseError::Unreadable { line, message })
}

fn parse_record(
    record: &StringRecord,
    columns: Columns,
    line: u64,
) -> Result<ShowUrl, RowParseError> {
    let field = |idx: usize, column: &'static str| {
        record
            .get(idx)
            .filter(|v| !v.is_empty())
            .ok_or(RowParseError::MissingField { line, column })
    };

    let raw_date = field(columns.date, "date")?;
    let url = field(columns.url, "url")?;

    let date = NaiveDate::parse_from_str(raw_date, DATE_FORMAT).map_err(|_| {
        RowParseError::InvalidDate {
            line,
            value: raw_date.to_string(),
        }
    })?;

    Ok(ShowUrl {
        date,
        url: url.to_string(),
        line,
    })
}
