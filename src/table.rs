//! Column-oriented candidate table and its CSV form.
//!
//! List cells are written as bracketed literals (`["Python", "SQL"]`). The
//! reader also accepts single-quoted literals (`['Python', 'SQL']`), which is
//! how earlier exports of this dataset serialized lists.

use crate::error::CvSurveyError;
use crate::schema::{self, CandidateRecord, FieldKind, CANDIDATE_FIELDS, UNKNOWN};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::fmt;
use std::io::{Read, Write};
use std::path::Path;
use tracing::debug;

/// One table value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cell {
    Integer(i64),
    Text(String),
    List(Vec<String>),
}

impl Cell {
    /// The CSV field for this cell.
    pub fn to_field(&self) -> String {
        match self {
            Cell::Integer(n) => n.to_string(),
            Cell::Text(s) => s.clone(),
            Cell::List(items) => format_list_literal(items),
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Cell::Integer(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_field())
    }
}

impl FieldKind {
    /// The value stored when a field is absent.
    pub fn default_cell(&self) -> Cell {
        match self {
            FieldKind::Integer => Cell::Integer(0),
            FieldKind::List => Cell::List(Vec::new()),
            FieldKind::Text | FieldKind::Category(_) => Cell::Text(UNKNOWN.to_string()),
        }
    }

    /// Best-effort conversion of a text value. `None` means "treat as absent".
    pub fn coerce_str(&self, raw: &str) -> Option<Cell> {
        let s = raw.trim();
        if s.is_empty() {
            return None;
        }
        match self {
            FieldKind::Integer => parse_integer(s).map(Cell::Integer),
            FieldKind::Text | FieldKind::Category(_) => Some(Cell::Text(s.to_string())),
            FieldKind::List => {
                if s.starts_with('[') {
                    parse_list_literal(s).map(Cell::List)
                } else {
                    let items: Vec<String> = s
                        .split(',')
                        .map(str::trim)
                        .filter(|t| !t.is_empty())
                        .map(str::to_string)
                        .collect();
                    Some(Cell::List(items))
                }
            }
        }
    }
}

/// Parse `"27"`, `"27.0"` or `"27.9"` (truncated) into an integer.
pub(crate) fn parse_integer(s: &str) -> Option<i64> {
    let s = s.trim();
    if let Ok(n) = s.parse::<i64>() {
        return Some(n);
    }
    match s.parse::<f64>() {
        Ok(f) if f.is_finite() => Some(f.trunc() as i64),
        _ => None,
    }
}

/// A named column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub cells: Vec<Cell>,
}

impl Column {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cells: Vec::new(),
        }
    }

    /// True when every cell is an integer.
    pub fn is_numeric(&self) -> bool {
        !self.cells.is_empty() && self.cells.iter().all(|c| matches!(c, Cell::Integer(_)))
    }

    /// The value the render-mode heuristic inspects: the last row.
    pub fn representative(&self) -> Option<&Cell> {
        self.cells.last()
    }
}

/// All candidates, stored column by column. Every column has the same length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateTable {
    columns: Vec<Column>,
}

impl Default for CandidateTable {
    fn default() -> Self {
        Self::empty()
    }
}

impl CandidateTable {
    /// Schema columns, zero rows.
    pub fn empty() -> Self {
        Self {
            columns: CANDIDATE_FIELDS.iter().map(|f| Column::new(f.name)).collect(),
        }
    }

    /// Build a table from columns of equal length.
    pub fn from_columns(columns: Vec<Column>) -> Result<Self, CvSurveyError> {
        if let Some(first) = columns.first() {
            let rows = first.cells.len();
            if let Some(bad) = columns.iter().find(|c| c.cells.len() != rows) {
                return Err(CvSurveyError::Internal(format!(
                    "column '{}' has {} rows, expected {}",
                    bad.name,
                    bad.cells.len(),
                    rows
                )));
            }
        }
        Ok(Self { columns })
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn row_count(&self) -> usize {
        self.columns.first().map(|c| c.cells.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.row_count() == 0
    }

    /// Cells of row `idx`, in column order.
    pub fn row(&self, idx: usize) -> Option<Vec<&Cell>> {
        if idx >= self.row_count() {
            return None;
        }
        Some(self.columns.iter().map(|c| &c.cells[idx]).collect())
    }

    /// Typed view of every row. Missing schema columns take their defaults.
    pub fn records(&self) -> Vec<CandidateRecord> {
        let text = |name: &str, i: usize| match self.column(name).map(|c| &c.cells[i]) {
            Some(Cell::Text(s)) => s.clone(),
            Some(Cell::Integer(n)) => n.to_string(),
            Some(Cell::List(items)) => format_list_literal(items),
            None => UNKNOWN.to_string(),
        };
        let int = |name: &str, i: usize| {
            self.column(name)
                .and_then(|c| c.cells[i].as_integer())
                .unwrap_or(0)
        };
        let list = |name: &str, i: usize| match self.column(name).map(|c| &c.cells[i]) {
            Some(Cell::List(items)) => items.clone(),
            _ => Vec::new(),
        };

        (0..self.row_count())
            .map(|i| CandidateRecord {
                university: text("university", i),
                age: int("age", i),
                college: text("college", i),
                gender: text("gender", i),
                experience: int("experience", i),
                department: text("department", i),
                degree: text("degree", i),
                skills: list("skills", i),
            })
            .collect()
    }

    // ── CSV ──────────────────────────────────────────────────────────────

    /// Serialize as CSV: header row, then one row per candidate.
    pub fn write_csv_to<W: Write>(&self, writer: W) -> Result<(), csv::Error> {
        let mut wtr = csv::Writer::from_writer(writer);
        wtr.write_record(self.column_names())?;
        for i in 0..self.row_count() {
            wtr.write_record(self.columns.iter().map(|c| c.cells[i].to_field()))?;
        }
        wtr.flush()?;
        Ok(())
    }

    /// Write the table to `path`.
    ///
    /// The file is written next to its destination and renamed into place,
    /// so readers never observe a half-written table.
    pub fn write_csv(&self, path: &Path) -> Result<(), CvSurveyError> {
        let mut tmp = crate::output::temp_file_beside(path)?;
        self.write_csv_to(&mut tmp)
            .map_err(|e| CvSurveyError::TableFormat {
                path: path.to_path_buf(),
                detail: e.to_string(),
            })?;
        tmp.persist(path)
            .map_err(|e| CvSurveyError::OutputWriteFailed {
                path: path.to_path_buf(),
                source: e.error,
            })?;
        debug!("Wrote {} rows to {}", self.row_count(), path.display());
        Ok(())
    }

    /// Parse a CSV table.
    ///
    /// Schema columns are typed by their [`FieldKind`]; values that fail to
    /// coerce take the field default. Other columns become integer columns
    /// when every value is an integer, text columns otherwise.
    pub fn read_csv_from<R: Read>(reader: R) -> Result<Self, csv::Error> {
        let mut rdr = csv::Reader::from_reader(reader);
        let headers: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();

        let mut raw: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
        for record in rdr.records() {
            let record = record?;
            for (col, value) in raw.iter_mut().zip(record.iter()) {
                col.push(value.to_string());
            }
        }

        let columns = headers
            .into_iter()
            .zip(raw)
            .map(|(name, values)| {
                let cells = match schema::field(&name) {
                    Some(field) => values
                        .iter()
                        .map(|v| field.kind.coerce_str(v).unwrap_or_else(|| field.kind.default_cell()))
                        .collect(),
                    None => infer_cells(&values),
                };
                Column { name, cells }
            })
            .collect();

        Ok(Self { columns })
    }

    /// Read a CSV table from `path`.
    pub fn read_csv(path: &Path) -> Result<Self, CvSurveyError> {
        let file = std::fs::File::open(path).map_err(|e| CvSurveyError::TableFormat {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        Self::read_csv_from(file).map_err(|e| CvSurveyError::TableFormat {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })
    }
}

fn infer_cells(values: &[String]) -> Vec<Cell> {
    let ints: Option<Vec<i64>> = values.iter().map(|v| v.trim().parse::<i64>().ok()).collect();
    match ints {
        Some(ints) if !ints.is_empty() => ints.into_iter().map(Cell::Integer).collect(),
        _ => values.iter().map(|v| Cell::Text(v.clone())).collect(),
    }
}

// ── List literals ────────────────────────────────────────────────────────

/// Render a list as `["a", "b"]`.
pub fn format_list_literal(items: &[String]) -> String {
    let quoted: Vec<String> = items
        .iter()
        .map(|s| serde_json::to_string(s).unwrap_or_else(|_| format!("\"{s}\"")))
        .collect();
    format!("[{}]", quoted.join(", "))
}

static RE_LIST_SHAPE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)^\[.*\]$").unwrap());

/// Parse a bracketed list literal with double- or single-quoted items.
///
/// Returns `None` when `text` is not a list literal.
pub fn parse_list_literal(text: &str) -> Option<Vec<String>> {
    let text = text.trim();
    if !RE_LIST_SHAPE.is_match(text) {
        return None;
    }

    if let Ok(values) = serde_json::from_str::<Vec<Value>>(text) {
        return Some(
            values
                .into_iter()
                .map(|v| match v {
                    Value::String(s) => s,
                    other => other.to_string(),
                })
                .collect(),
        );
    }

    parse_quoted_items(&text[1..text.len() - 1])
}

fn parse_quoted_items(inner: &str) -> Option<Vec<String>> {
    let mut items = Vec::new();
    let mut chars = inner.chars().peekable();

    loop {
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        match chars.peek().copied() {
            None => break,
            Some(quote @ ('\'' | '"')) => {
                chars.next();
                let mut item = String::new();
                loop {
                    match chars.next()? {
                        '\\' => match chars.next()? {
                            'n' => item.push('\n'),
                            't' => item.push('\t'),
                            other => item.push(other),
                        },
                        c if c == quote => break,
                        c => item.push(c),
                    }
                }
                items.push(item);
            }
            Some(_) => {
                let mut bare = String::new();
                while let Some(&c) = chars.peek() {
                    if c == ',' {
                        break;
                    }
                    bare.push(c);
                    chars.next();
                }
                let bare = bare.trim();
                if bare.is_empty() || bare.contains(['\'', '"', '[', ']']) {
                    return None;
                }
                items.push(bare.to_string());
            }
        }

        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        match chars.next() {
            None => break,
            Some(',') => continue,
            Some(_) => return None,
        }
    }

    Some(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table() -> CandidateTable {
        let mut columns: Vec<Column> = CANDIDATE_FIELDS.iter().map(|f| Column::new(f.name)).collect();
        let rows: Vec<Vec<Cell>> = vec![
            vec![
                Cell::Text("Stanford University".into()),
                Cell::Integer(24),
                Cell::Text("Computer Science".into()),
                Cell::Text("Female".into()),
                Cell::Integer(2),
                Cell::Text("Software Engineering".into()),
                Cell::Text("Bachelor's".into()),
                Cell::List(vec!["Python".into(), "SQL".into()]),
            ],
            vec![
                Cell::Text("Unknown".into()),
                Cell::Integer(0),
                Cell::Text("Other".into()),
                Cell::Text("Male".into()),
                Cell::Integer(7),
                Cell::Text("Security".into()),
                Cell::Text("Master's".into()),
                Cell::List(vec![]),
            ],
        ];
        for row in rows {
            for (col, cell) in columns.iter_mut().zip(row) {
                col.cells.push(cell);
            }
        }
        CandidateTable::from_columns(columns).unwrap()
    }

    #[test]
    fn empty_table_has_schema_columns() {
        let t = CandidateTable::empty();
        assert_eq!(t.row_count(), 0);
        assert_eq!(t.column_names(), schema::column_names());
    }

    #[test]
    fn ragged_columns_are_rejected() {
        let mut a = Column::new("a");
        a.cells.push(Cell::Integer(1));
        let b = Column::new("b");
        assert!(CandidateTable::from_columns(vec![a, b]).is_err());
    }

    #[test]
    fn csv_round_trip_keeps_rows_columns_and_lists() {
        let table = sample_table();
        let mut buf = Vec::new();
        table.write_csv_to(&mut buf).unwrap();

        let text = String::from_utf8(buf.clone()).unwrap();
        assert!(text.starts_with("university,age,college,gender,experience,department,degree,skills\n"));
        assert!(text.contains(r#""[""Python"", ""SQL""]""#), "got: {text}");

        let back = CandidateTable::read_csv_from(buf.as_slice()).unwrap();
        assert_eq!(back.row_count(), 2);
        assert_eq!(back.column_names(), table.column_names());
        assert_eq!(back, table);
    }

    #[test]
    fn records_view_matches_cells() {
        let records = sample_table().records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].skills, vec!["Python", "SQL"]);
        assert_eq!(records[1].age, 0);
        assert_eq!(records[1].university, "Unknown");
    }

    #[test]
    fn reads_single_quoted_lists_from_older_exports() {
        let csv = "age,skills\n31,\"['Rust', 'Go']\"\n";
        let table = CandidateTable::read_csv_from(csv.as_bytes()).unwrap();
        assert_eq!(
            table.column("skills").unwrap().cells[0],
            Cell::List(vec!["Rust".into(), "Go".into()])
        );
        assert_eq!(table.column("age").unwrap().cells[0], Cell::Integer(31));
    }

    #[test]
    fn unknown_columns_are_inferred() {
        let csv = "score,city\n3,Cairo\n5,Giza\n";
        let table = CandidateTable::read_csv_from(csv.as_bytes()).unwrap();
        assert!(table.column("score").unwrap().is_numeric());
        assert!(!table.column("city").unwrap().is_numeric());
    }

    #[test]
    fn list_literal_formats() {
        assert_eq!(
            format_list_literal(&["Python".into(), "SQL".into()]),
            r#"["Python", "SQL"]"#
        );
        assert_eq!(format_list_literal(&[]), "[]");
    }

    #[test]
    fn list_literal_parsing() {
        assert_eq!(parse_list_literal("[]"), Some(vec![]));
        assert_eq!(
            parse_list_literal(r#"["C++", "Node.js"]"#),
            Some(vec!["C++".to_string(), "Node.js".to_string()])
        );
        assert_eq!(
            parse_list_literal(r"['It\'s', 'SQL',]"),
            Some(vec!["It's".to_string(), "SQL".to_string()])
        );
        assert_eq!(parse_list_literal("Bachelor's"), None);
        assert_eq!(parse_list_literal("['unterminated]"), None);
    }

    #[test]
    fn integer_coercion() {
        assert_eq!(parse_integer("27"), Some(27));
        assert_eq!(parse_integer("27.9"), Some(27));
        assert_eq!(parse_integer("n/a"), None);
        assert_eq!(FieldKind::Integer.coerce_str("  "), None);
        assert_eq!(
            FieldKind::List.coerce_str("Python, SQL"),
            Some(Cell::List(vec!["Python".into(), "SQL".into()]))
        );
    }
}
