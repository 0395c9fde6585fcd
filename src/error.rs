use crate::detect::PayloadKind;
use reqwest::StatusCode;
use thiserror::Error;

/// Why a single download attempt failed.
#[derive(Debug, Error)]
pub enum AttemptError {
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
    #[error("server responded with status {0}")]
    Status(StatusCode),
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("url must not be empty")]
    EmptyUrl,
    #[error("failed to build http client")]
    Client(#[source] reqwest::Error),
    #[error("download of {url} failed after {attempts} attempts")]
    DownloadExhausted {
        url: String,
        attempts: u32,
        #[source]
        cause: AttemptError,
    },
}

/// Failure of one parse strategy.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("spreadsheet could not be read")]
    Spreadsheet(#[from] calamine::Error),
    #[error("spreadsheet has no worksheet")]
    NoWorksheet,
    #[error("columnar payload could not be read")]
    Columnar(#[from] parquet::errors::ParquetError),
    #[error("delimited text did not parse with {delimiter:?}")]
    Delimited {
        delimiter: char,
        #[source]
        source: csv::Error,
    },
    #[error("payload is not valid UTF-8 text")]
    NotText(#[from] std::str::Utf8Error),
    #[error("payload is empty")]
    Empty,
    #[error("table has no columns")]
    NoColumns,
    #[error("row {row} has {found} cells, expected {expected}")]
    Ragged {
        row: usize,
        expected: usize,
        found: usize,
    },
}

#[derive(Debug, Error)]
#[error("no parse strategy produced a table for {kind} payload")]
pub struct NormalizeFailed {
    pub kind: PayloadKind,
    #[source]
    pub cause: ParseError,
}
