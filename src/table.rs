use crate::error::ParseError;
use anyhow::{Context, Result};
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl Cell {
    /// Text cell, with the empty string mapped to [`Cell::Empty`].
    pub fn text(value: impl Into<String>) -> Self {
        let value = value.into();
        if value.is_empty() {
            Cell::Empty
        } else {
            Cell::Text(value)
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Empty => Ok(()),
            Cell::Text(value) => f.write_str(value),
            Cell::Int(value) => write!(f, "{value}"),
            Cell::Float(value) => {
                if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
                    write!(f, "{value:.1}")
                } else {
                    write!(f, "{value}")
                }
            }
            Cell::Bool(value) => write!(f, "{value}"),
        }
    }
}

/// Rows of scalar cells with an optional header. All rows share one width.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    header: Option<Vec<String>>,
    rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new(header: Option<Vec<String>>, rows: Vec<Vec<Cell>>) -> Result<Self, ParseError> {
        let width = match (&header, rows.first()) {
            (Some(header), _) => header.len(),
            (None, Some(first)) => first.len(),
            (None, None) => 0,
        };
        if width == 0 {
            return Err(ParseError::NoColumns);
        }
        if let Some((row, cells)) = rows.iter().enumerate().find(|(_, r)| r.len() != width) {
            return Err(ParseError::Ragged {
                row,
                expected: width,
                found: cells.len(),
            });
        }
        Ok(Self { header, rows })
    }

    pub fn width(&self) -> usize {
        match &self.header {
            Some(header) => header.len(),
            None => self.rows.first().map(Vec::len).unwrap_or_default(),
        }
    }

    pub fn header(&self) -> Option<&[String]> {
        self.header.as_deref()
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    /// Every cell as it is written to CSV.
    pub fn text_rows(&self) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .map(|row| row.iter().map(Cell::to_string).collect())
            .collect()
    }

    /// Column labels, falling back to positional labels `0..width`.
    pub fn labels(&self) -> Vec<String> {
        match &self.header {
            Some(header) => header.clone(),
            None => (0..self.width()).map(|i| i.to_string()).collect(),
        }
    }

    pub fn to_csv(&self) -> Result<Vec<u8>> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b',')
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(Vec::new());

        writer
            .write_record(self.labels())
            .context("failed to write csv header")?;
        for row in &self.rows {
            writer
                .write_record(row.iter().map(Cell::to_string))
                .context("failed to write csv row")?;
        }

        writer
            .into_inner()
            .map_err(|err| anyhow::anyhow!(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_row(cells: &[&str]) -> Vec<Cell> {
        cells.iter().map(|c| Cell::text(*c)).collect()
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let err = Table::new(
            Some(vec!["a".into(), "b".into()]),
            vec![text_row(&["1", "2"]), text_row(&["3"])],
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ParseError::Ragged {
                row: 1,
                expected: 2,
                found: 1
            }
        ));
    }

    #[test]
    fn empty_table_has_no_columns() {
        assert!(matches!(Table::new(None, Vec::new()), Err(ParseError::NoColumns)));
    }

    #[test]
    fn csv_quotes_only_where_needed() {
        let table = Table::new(
            Some(vec!["name".into(), "note".into()]),
            vec![
                text_row(&["plain", "has,comma"]),
                text_row(&["say \"hi\"", "line\nbreak"]),
                vec![Cell::Empty, Cell::Int(7)],
            ],
        )
        .unwrap();

        let csv = String::from_utf8(table.to_csv().unwrap()).unwrap();
        assert_eq!(
            csv,
            "name,note\nplain,\"has,comma\"\n\"say \"\"hi\"\"\",\"line\nbreak\"\n,7\n"
        );
    }

    #[test]
    fn headerless_table_gets_positional_labels() {
        let table = Table::new(None, vec![text_row(&["x", "y"])]).unwrap();
        assert_eq!(table.labels(), vec!["0", "1"]);
        assert_eq!(table.to_csv().unwrap(), b"0,1\nx,y\n");
    }

    #[test]
    fn text_rows_match_written_cells() {
        let table = Table::new(
            None,
            vec![vec![Cell::Int(5), Cell::Float(2.0), Cell::Bool(false), Cell::Empty]],
        )
        .unwrap();
        assert_eq!(table.text_rows(), vec![vec!["5", "2.0", "false", ""]]);
    }

    #[test]
    fn scalar_cells_render_like_spreadsheet_exports() {
        assert_eq!(Cell::Float(3.0).to_string(), "3.0");
        assert_eq!(Cell::Float(1.25).to_string(), "1.25");
        assert_eq!(Cell::Bool(true).to_string(), "true");
        assert_eq!(Cell::Empty.to_string(), "");
        assert_eq!(Cell::text(""), Cell::Empty);
    }
}
