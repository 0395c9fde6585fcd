use crate::detect::PayloadKind;
use crate::error::{NormalizeFailed, ParseError};
use crate::table::{Cell, Table};
use bytes::Bytes;
use calamine::{Data, DataType, Reader, open_workbook_auto_from_rs};
use chrono::NaiveDateTime;
use parquet::file::reader::{FileReader, SerializedFileReader};
use parquet::record::Field;
use serde::Serialize;
use std::io::Cursor;
use tracing::debug;

pub const CONVERTED_NAME: &str = "converted.csv";
pub const RAW_NAME: &str = "raw.bin";

const DELIMITERS: [u8; 4] = [b',', b';', b'\t', b'|'];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    Csv,
    Raw,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConversionOutcome {
    Converted { csv: Vec<u8> },
    Raw { bytes: Vec<u8> },
}

impl ConversionOutcome {
    pub fn suggested_name(&self) -> &'static str {
        match self {
            ConversionOutcome::Converted { .. } => CONVERTED_NAME,
            ConversionOutcome::Raw { .. } => RAW_NAME,
        }
    }

    pub fn format(&self) -> OutputFormat {
        match self {
            ConversionOutcome::Converted { .. } => OutputFormat::Csv,
            ConversionOutcome::Raw { .. } => OutputFormat::Raw,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        match self {
            ConversionOutcome::Converted { csv } => csv,
            ConversionOutcome::Raw { bytes } => bytes,
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            ConversionOutcome::Converted { csv } => csv,
            ConversionOutcome::Raw { bytes } => bytes,
        }
    }
}

/// One way of turning delimited text into a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Delimited(u8),
    SingleColumn,
}

impl Strategy {
    /// Delimiters in the order they are tried, then the one-cell-per-line fallback.
    pub fn text_chain() -> Vec<Strategy> {
        DELIMITERS
            .iter()
            .map(|d| Strategy::Delimited(*d))
            .chain(std::iter::once(Strategy::SingleColumn))
            .collect()
    }

    pub fn parse(self, bytes: &[u8]) -> Result<Table, ParseError> {
        match self {
            Strategy::Delimited(delimiter) => parse_delimited(bytes, delimiter),
            Strategy::SingleColumn => parse_single_column(bytes),
        }
    }
}

/// Normalize a payload into CSV, or hand back the original bytes when no
/// strategy applies. Only a spreadsheet that cannot be opened is an error.
pub fn normalize(bytes: Vec<u8>, kind: PayloadKind) -> Result<ConversionOutcome, NormalizeFailed> {
    let parsed = match kind {
        PayloadKind::Spreadsheet => {
            Some(parse_spreadsheet(&bytes).map_err(|cause| NormalizeFailed { kind, cause })?)
        }
        // The PAR1 marker can also end a plain text file.
        PayloadKind::ColumnarBinary => match parse_columnar(bytes.clone()) {
            Ok(table) => Some(table),
            Err(err) => {
                debug!(error = %err, "columnar parse failed; trying delimited text");
                parse_text_chain(&bytes)
                    .or_else(|_| parse_spreadsheet(&bytes))
                    .ok()
            }
        },
        PayloadKind::DelimitedText => match parse_text_chain(&bytes) {
            Ok(table) => Some(table),
            Err(err) => {
                debug!(error = %err, "delimited text chain failed; trying spreadsheet");
                parse_spreadsheet(&bytes).ok()
            }
        },
        PayloadKind::Unknown => match parse_spreadsheet(&bytes) {
            Ok(table) => Some(table),
            Err(err) => {
                debug!(error = %err, "unknown payload is not a spreadsheet");
                None
            }
        },
    };

    let Some(table) = parsed else {
        return Ok(ConversionOutcome::Raw { bytes });
    };

    // Only serialization of an already-valid table can fail here.
    match table.to_csv() {
        Ok(csv) => Ok(ConversionOutcome::Converted { csv }),
        Err(err) => {
            debug!(error = %err, "csv serialization failed; keeping raw bytes");
            Ok(ConversionOutcome::Raw { bytes })
        }
    }
}

/// Run the delimited-text chain. A multi-column parse wins immediately; a
/// one-column parse is kept in case no later delimiter splits the rows.
pub fn parse_text_chain(bytes: &[u8]) -> Result<Table, ParseError> {
    let mut narrow = None;
    let mut last_err = ParseError::Empty;

    for strategy in Strategy::text_chain() {
        if strategy == Strategy::SingleColumn {
            if let Some(table) = narrow.take() {
                return Ok(table);
            }
        }
        match strategy.parse(bytes) {
            Ok(table) if table.width() > 1 || strategy == Strategy::SingleColumn => {
                debug!(?strategy, columns = table.width(), "text strategy accepted");
                return Ok(table);
            }
            Ok(table) => {
                if narrow.is_none() {
                    narrow = Some(table);
                }
            }
            Err(err) => {
                debug!(?strategy, error = %err, "text strategy rejected");
                last_err = err;
            }
        }
    }

    Err(last_err)
}

pub fn parse_delimited(bytes: &[u8], delimiter: u8) -> Result<Table, ParseError> {
    let text = std::str::from_utf8(bytes)?;
    if text.trim().is_empty() {
        return Err(ParseError::Empty);
    }

    let wrap = |source: csv::Error| ParseError::Delimited {
        delimiter: char::from(delimiter),
        source,
    };
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(false)
        .from_reader(text.as_bytes());

    let header: Vec<String> = reader
        .headers()
        .map_err(wrap)?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(wrap)?;
        rows.push(record.iter().map(Cell::text).collect());
    }

    Table::new(Some(header), rows)
}

pub fn parse_single_column(bytes: &[u8]) -> Result<Table, ParseError> {
    let text = std::str::from_utf8(bytes)?;
    let rows: Vec<Vec<Cell>> = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| vec![Cell::text(line)])
        .collect();
    if rows.is_empty() {
        return Err(ParseError::Empty);
    }
    Table::new(None, rows)
}

/// First worksheet of any workbook format calamine can open.
pub fn parse_spreadsheet(bytes: &[u8]) -> Result<Table, ParseError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or(ParseError::NoWorksheet)??;

    let mut rows = range.rows();
    let header = rows
        .next()
        .ok_or(ParseError::Empty)?
        .iter()
        .enumerate()
        .map(|(idx, cell)| match spreadsheet_cell(cell) {
            Cell::Empty => format!("Unnamed: {idx}"),
            other => other.to_string(),
        })
        .collect();
    let rows = rows
        .map(|row| row.iter().map(spreadsheet_cell).collect())
        .collect();

    Table::new(Some(header), rows)
}

fn spreadsheet_cell(data: &Data) -> Cell {
    match data {
        Data::Empty => Cell::Empty,
        Data::String(value) | Data::DateTimeIso(value) | Data::DurationIso(value) => {
            Cell::text(value.clone())
        }
        Data::Int(value) => Cell::Int(*value),
        Data::Float(value) if is_whole(*value) => Cell::Int(*value as i64),
        Data::Float(value) => Cell::Float(*value),
        Data::Bool(value) => Cell::Bool(*value),
        Data::DateTime(_) => data
            .as_datetime()
            .map(|dt: NaiveDateTime| Cell::Text(dt.format("%Y-%m-%d %H:%M:%S").to_string()))
            .unwrap_or_else(|| Cell::text(data.to_string())),
        other => Cell::text(other.to_string()),
    }
}

/// Spreadsheets store every number as a float; whole values inside the i64
/// range are integers.
fn is_whole(value: f64) -> bool {
    value.is_finite()
        && value.fract() == 0.0
        && value >= i64::MIN as f64
        && value < i64::MAX as f64
}

pub fn parse_columnar(bytes: Vec<u8>) -> Result<Table, ParseError> {
    let reader = SerializedFileReader::new(Bytes::from(bytes))?;
    let header: Vec<String> = reader
        .metadata()
        .file_metadata()
        .schema_descr()
        .root_schema()
        .get_fields()
        .iter()
        .map(|field| field.name().to_string())
        .collect();

    let mut rows = Vec::new();
    for row in reader.get_row_iter(None)? {
        let row = row?;
        rows.push(row.get_column_iter().map(|(_, f)| columnar_cell(f)).collect());
    }

    Table::new(Some(header), rows)
}

fn columnar_cell(field: &Field) -> Cell {
    match field {
        Field::Null => Cell::Empty,
        Field::Bool(value) => Cell::Bool(*value),
        Field::Byte(value) => Cell::Int(i64::from(*value)),
        Field::Short(value) => Cell::Int(i64::from(*value)),
        Field::Int(value) => Cell::Int(i64::from(*value)),
        Field::Long(value) => Cell::Int(*value),
        Field::UByte(value) => Cell::Int(i64::from(*value)),
        Field::UShort(value) => Cell::Int(i64::from(*value)),
        Field::UInt(value) => Cell::Int(i64::from(*value)),
        Field::Float(value) => Cell::Float(f64::from(*value)),
        Field::Double(value) => Cell::Float(*value),
        Field::Str(value) => Cell::text(value.clone()),
        other => Cell::text(other.to_string()),
    }
}
