// Shared structures for the source readers.

use std::collections::HashMap;
use std::path::Path;

use voter_zones::normalize::{parse_age, RawDob};

use crate::ingest::*;

/// One cell of a source row, as typed by the source.
#[derive(PartialEq, Debug, Clone)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    /// An Excel serial number the workbook marks as a date.
    Date(f64),
}

impl Cell {
    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            Cell::Number(_) | Cell::Date(_) => false,
        }
    }

    /// The trimmed text of the cell, `None` when empty.
    ///
    /// Whole numbers print without a decimal part, so that a mobile number
    /// or a voter id stored as a number reads like its text.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Cell::Empty => None,
            Cell::Text(s) => {
                let t = s.trim();
                if t.is_empty() {
                    None
                } else {
                    Some(t.to_string())
                }
            }
            Cell::Number(n) | Cell::Date(n) => Some(format_number(*n)),
        }
    }

    pub fn as_dob(&self) -> Option<RawDob> {
        match self {
            Cell::Empty => None,
            Cell::Text(s) if s.trim().is_empty() => None,
            Cell::Text(s) => Some(RawDob::Text(s.trim().to_string())),
            Cell::Number(n) => Some(RawDob::Serial(*n)),
            Cell::Date(n) => Some(RawDob::ExcelDate(*n)),
        }
    }

    pub fn as_age(&self) -> Option<i32> {
        match self {
            Cell::Number(n) => parse_age(&n.to_string()),
            Cell::Text(s) => parse_age(s),
            Cell::Empty | Cell::Date(_) => None,
        }
    }
}

fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct RawRow {
    /// Line number in the source, the header being line 1.
    pub lineno: usize,
    pub cells: Vec<Cell>,
}

impl RawRow {
    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(|c| c.is_empty())
    }

    pub fn get(&self, idx: usize) -> Option<&Cell> {
        self.cells.get(idx)
    }
}

/// One item read from a source.
#[derive(PartialEq, Debug, Clone)]
pub enum SourceRow {
    Data(RawRow),
    /// The line number of a row that could not be decoded.
    Unreadable(usize),
}

/// An opened source: its header, and its data rows read on demand.
pub struct SourceRows {
    pub header: Vec<String>,
    rows: Box<dyn Iterator<Item = IngestResult<SourceRow>>>,
}

impl SourceRows {
    pub fn new(header: Vec<String>, rows: impl Iterator<Item = IngestResult<SourceRow>> + 'static) -> Self {
        SourceRows {
            header,
            rows: Box::new(rows),
        }
    }

    /// Reads at most `size` rows. An empty chunk means the source is done.
    ///
    /// A source that fails to read further aborts with the error.
    pub fn next_chunk(&mut self, size: usize) -> IngestResult<Vec<SourceRow>> {
        let mut chunk = Vec::with_capacity(size);
        while chunk.len() < size {
            match self.rows.next() {
                Some(row) => chunk.push(row?),
                None => break,
            }
        }
        Ok(chunk)
    }
}

impl std::fmt::Debug for SourceRows {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceRows")
            .field("header", &self.header)
            .finish_non_exhaustive()
    }
}

/// The fields of a voter roll that are looked up in the header.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub enum Field {
    VoterId,
    Dob,
    Phone,
    Email,
    Region,
    FamilyNumber,
    Address,
    City,
    State,
    Name,
    Age,
}

impl Field {
    /// Matching order. Specific fragments go first so that a generic one
    /// such as `name` does not grab a column meant for another field.
    const MATCH_ORDER: [Field; 11] = [
        Field::VoterId,
        Field::Dob,
        Field::Phone,
        Field::Email,
        Field::Region,
        Field::FamilyNumber,
        Field::Address,
        Field::City,
        Field::State,
        Field::Name,
        Field::Age,
    ];

    const REQUIRED: [Field; 3] = [Field::VoterId, Field::Name, Field::Region];

    pub fn label(&self) -> &'static str {
        match self {
            Field::VoterId => "voter id",
            Field::Dob => "date of birth",
            Field::Phone => "mobile",
            Field::Email => "email",
            Field::Region => "voting region",
            Field::FamilyNumber => "family number",
            Field::Address => "address",
            Field::City => "city",
            Field::State => "state",
            Field::Name => "name",
            Field::Age => "age",
        }
    }

    fn patterns(&self) -> &'static [&'static str] {
        match self {
            Field::VoterId => &["vid", "voter id", "voter no", "voter_id", "voterid"],
            Field::Dob => &["dob", "birth"],
            Field::Phone => &["mobile", "phone", "contact", "whatsapp"],
            Field::Email => &["mail"],
            Field::Region => &["region", "zone"],
            Field::FamilyNumber => &["family no", "family number", "family id"],
            Field::Address => &["address"],
            Field::City => &["city", "town"],
            Field::State => &["state"],
            Field::Name => &["name"],
            Field::Age => &["age"],
        }
    }
}

/// Where each field sits in the rows of a source.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct ColumnMap {
    columns: HashMap<Field, usize>,
}

impl ColumnMap {
    pub fn get(&self, field: Field) -> Option<usize> {
        self.columns.get(&field).cloned()
    }

    /// The cell of a field in a row, if the column exists.
    pub fn cell<'a>(&self, row: &'a RawRow, field: Field) -> Option<&'a Cell> {
        self.get(field).and_then(|idx| row.get(idx))
    }

    /// The text of a field in a row, `None` when the column is absent or
    /// the cell is empty.
    pub fn text(&self, row: &RawRow, field: Field) -> Option<String> {
        self.cell(row, field).and_then(|c| c.as_text())
    }
}

/// Finds the columns of the known fields in a header.
///
/// Matching is a case-insensitive substring search. A header column is used
/// for at most one field. Fails with all the missing required columns.
pub fn map_columns(header: &[String]) -> IngestResult<ColumnMap> {
    let lowered: Vec<String> = header.iter().map(|h| h.trim().to_lowercase()).collect();
    let mut claimed = vec![false; header.len()];
    let mut columns = HashMap::new();
    for field in Field::MATCH_ORDER {
        let found = lowered.iter().enumerate().find(|(idx, h)| {
            !claimed[*idx] && field.patterns().iter().any(|p| h.contains(*p))
        });
        if let Some((idx, _)) = found {
            debug!("map_columns: {:?} -> column {} {:?}", field, idx, header[idx]);
            claimed[idx] = true;
            columns.insert(field, idx);
        }
    }

    let missing: Vec<&str> = Field::REQUIRED
        .iter()
        .filter(|f| !columns.contains_key(*f))
        .map(|f| f.label())
        .collect();
    ensure!(
        missing.is_empty(),
        MissingColumnsSnafu {
            columns: missing.join(", ")
        }
    );
    Ok(ColumnMap { columns })
}

pub fn simplify_file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or(path)
        .to_string()
}
