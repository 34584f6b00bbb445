use serde::Deserialize;
use serde_json::Number;

use crate::error::{Error, Result};

/// Source column name to output label.
pub const LABEL_MAP: [(&str, &str); 4] = [
    ("NAME", "LOCATION"),
    ("SAEPOV0_17_PT", "EST._CHILDREN_IN_POVERTY"),
    ("SAEPOVALL_PT", "EST_ALL_RESIDENTS_IN_POVERTY"),
    ("SAEMHI_PT", "EST_MEDIAN_HOUSEHOLD_INCOME"),
];

/// Columns the API echoes back from the query filters.
pub const DROPPED_COLUMNS: [&str; 4] = ["time", "state", "county", "YEAR"];

/// Output label for a source column, if it is renamed.
pub fn output_label(source: &str) -> Option<&'static str> {
    LABEL_MAP
        .iter()
        .find(|(from, _)| *from == source)
        .map(|(_, to)| *to)
}

fn is_dropped(source: &str) -> bool {
    DROPPED_COLUMNS.contains(&source)
}

/// One cell of the wire format. Nested arrays and objects match no variant.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Cell {
    Text(String),
    Number(Number),
    Flag(bool),
    Null,
}

impl From<Cell> for String {
    fn from(cell: Cell) -> Self {
        match cell {
            Cell::Text(s) => s,
            Cell::Number(n) => n.to_string(),
            Cell::Flag(b) => b.to_string(),
            Cell::Null => String::new(),
        }
    }
}

/// Rows as returned by the API. Row 0 holds the column names.
///
/// Every row is guaranteed to have as many cells as the header row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    rows: Vec<Vec<String>>,
}

impl RawResponse {
    /// Checks that `rows` is rectangular. `url` is only used for error context.
    pub fn new(rows: Vec<Vec<String>>, url: &str) -> Result<Self> {
        if let Some(header) = rows.first() {
            let width = header.len();
            if width == 0 {
                return Err(Error::format(url, "header row has no columns"));
            }
            if let Some((idx, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != width) {
                return Err(Error::format(
                    url,
                    format!(
                        "row {idx} has {} cells but the header has {width}",
                        row.len()
                    ),
                ));
            }
        }
        Ok(Self { rows })
    }

    /// Parses a JSON array of arrays of scalar cells.
    ///
    /// Strings are kept verbatim, numbers and booleans are stringified and
    /// `null` becomes an empty cell.
    pub fn from_json(body: &str, url: &str) -> Result<Self> {
        let rows: Vec<Vec<Cell>> = serde_json::from_str(body).map_err(|e| {
            Error::format(url, format!("body is not a JSON array of scalar rows: {e}"))
        })?;

        let rows = rows
            .into_iter()
            .map(|row| row.into_iter().map(String::from).collect())
            .collect();
        Self::new(rows, url)
    }

    pub fn header(&self) -> Option<&[String]> {
        self.rows.first().map(Vec::as_slice)
    }

    /// Rows after the header.
    pub fn data_rows(&self) -> &[Vec<String>] {
        self.rows.get(1..).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.data_rows().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub label: String,
    pub values: Vec<String>,
}

/// Labeled, row-aligned columns in output order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultTable {
    columns: Vec<Column>,
}

impl ResultTable {
    /// Builds a table from a header and rows. Rows shorter than the header are
    /// padded with empty cells; extra cells are ignored.
    pub fn from_rows<S: AsRef<str>>(labels: &[S], rows: &[Vec<String>]) -> Self {
        let columns = labels
            .iter()
            .enumerate()
            .map(|(i, label)| Column {
                label: label.as_ref().to_string(),
                values: rows
                    .iter()
                    .map(|r| r.get(i).cloned().unwrap_or_default())
                    .collect(),
            })
            .collect();
        Self { columns }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.label.as_str())
    }

    pub fn column(&self, label: &str) -> Option<&[String]> {
        self.columns
            .iter()
            .find(|c| c.label == label)
            .map(|c| c.values.as_slice())
    }

    pub fn row_count(&self) -> usize {
        self.columns.first().map_or(0, |c| c.values.len())
    }

    pub fn is_empty(&self) -> bool {
        self.row_count() == 0
    }

    /// Cells of row `idx`, in column order.
    pub fn row(&self, idx: usize) -> Option<Vec<&str>> {
        if idx >= self.row_count() {
            return None;
        }
        Some(self.columns.iter().map(|c| c.values[idx].as_str()).collect())
    }

    pub fn rows(&self) -> impl Iterator<Item = Vec<&str>> {
        (0..self.row_count()).filter_map(|i| self.row(i))
    }

    /// Fixed-width text rendering for terminal output.
    pub fn render(&self) -> String {
        let widths: Vec<usize> = self
            .columns
            .iter()
            .map(|c| {
                c.values
                    .iter()
                    .map(|v| v.chars().count())
                    .chain(std::iter::once(c.label.chars().count()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let line = |cells: Vec<&str>| -> String {
            cells
                .iter()
                .zip(&widths)
                .map(|(cell, &w)| format!("{cell:<w$}"))
                .collect::<Vec<_>>()
                .join("  ")
                .trim_end()
                .to_string()
        };

        let mut out = line(self.labels().collect());
        out.push('\n');
        for row in self.rows() {
            out.push_str(&line(row));
            out.push('\n');
        }
        out
    }
}

/// Promotes the header row, renames mapped columns and drops filter echoes.
///
/// A mapped source column missing from the response produces no output
/// column. Unmapped columns keep their source name.
pub fn transform(raw: &RawResponse) -> ResultTable {
    let Some(header) = raw.header() else {
        return ResultTable::default();
    };

    let columns = header
        .iter()
        .enumerate()
        .filter(|(_, name)| !is_dropped(name))
        .map(|(i, name)| Column {
            label: output_label(name).unwrap_or(name.as_str()).to_string(),
            values: raw.data_rows().iter().map(|r| r[i].clone()).collect(),
        })
        .collect();

    ResultTable { columns }
}
