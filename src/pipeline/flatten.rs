//! Flatten per-batch responses into one [`CandidateTable`].
//!
//! Every schema field becomes a column. Each candidate contributes exactly
//! one cell per column: its value coerced to the field's kind, or the
//! field default when the key is missing, `null`, empty, or of a type that
//! cannot be coerced.

use crate::pipeline::extract::ExtractionResponse;
use crate::schema::{FieldKind, FieldSpec, CANDIDATE_FIELDS};
use crate::table::{CandidateTable, Cell, Column};
use serde_json::{Map, Value};
use tracing::debug;

/// Build the candidate table from every successful response, in order.
pub fn flatten(responses: &[ExtractionResponse]) -> CandidateTable {
    let candidates: Vec<&Map<String, Value>> =
        responses.iter().flat_map(|r| r.candidates.iter()).collect();

    let columns: Vec<Column> = CANDIDATE_FIELDS
        .iter()
        .map(|field| Column {
            name: field.name.to_string(),
            cells: candidates.iter().map(|c| cell_for(field, c)).collect(),
        })
        .collect();

    debug!(
        "Flattened {} candidates from {} responses",
        candidates.len(),
        responses.len()
    );

    // Every column was built from the same candidate list.
    CandidateTable::from_columns(columns).unwrap_or_default()
}

fn cell_for(field: &FieldSpec, candidate: &Map<String, Value>) -> Cell {
    field.keys()
        .filter_map(|k| candidate.get(k))
        .find(|v| !v.is_null())
        .and_then(|v| field.kind.coerce_json(v))
        .unwrap_or_else(|| field.kind.default_cell())
}

impl FieldKind {
    /// Best-effort conversion of a JSON value. `None` means "treat as absent".
    pub fn coerce_json(&self, value: &Value) -> Option<Cell> {
        match (self, value) {
            (_, Value::Null) => None,
            (_, Value::String(s)) => self.coerce_str(s),

            (FieldKind::Integer, Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
                .map(Cell::Integer),
            (FieldKind::Integer, _) => None,

            (FieldKind::Text | FieldKind::Category(_), Value::Number(n)) => {
                Some(Cell::Text(n.to_string()))
            }
            (FieldKind::Text | FieldKind::Category(_), Value::Bool(b)) => {
                Some(Cell::Text(b.to_string()))
            }
            (FieldKind::Text | FieldKind::Category(_), _) => None,

            (FieldKind::List, Value::Array(items)) => Some(Cell::List(
                items
                    .iter()
                    .filter_map(|item| match item {
                        Value::Null => None,
                        Value::String(s) => {
                            let s = s.trim();
                            (!s.is_empty()).then(|| s.to_string())
                        }
                        other => Some(other.to_string()),
                    })
                    .collect(),
            )),
            (FieldKind::List, _) => None,
        }
    }
}
