//! The candidate schema: one fixed, ordered table of fields.
//!
//! Every stage reads the same table. The flattener uses it to pick defaults,
//! the Gemini client turns it into a `responseSchema`, the CSV reader uses it
//! to type known columns, and the report uses each field's [`RenderMode`].

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Sentinel stored in text columns when a field was not extracted.
pub const UNKNOWN: &str = "Unknown";

/// The three college buckets the model is asked to use.
pub const COLLEGE_CATEGORIES: &[&str] = &["Computer Science", "Engineering", "Other"];

/// Semantic type of a candidate field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Integer,
    Text,
    /// Text restricted to a fixed set of values.
    Category(&'static [&'static str]),
    /// Ordered sequence of text tokens.
    List,
}

/// How the report draws a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RenderMode {
    /// Frequency of each value, one bin per unit.
    Histogram,
    /// Tally of list entries, sorted by count, drawn as horizontal bars.
    RankedBar,
}

/// One entry of the candidate schema.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    /// Alternate keys accepted from the model.
    pub aliases: &'static [&'static str],
    pub kind: FieldKind,
    pub render: RenderMode,
    /// Short description used in the model instruction.
    pub description: &'static str,
}

/// The candidate schema, in column order.
pub const CANDIDATE_FIELDS: &[FieldSpec] = &[
    FieldSpec {
        name: "university",
        aliases: &[],
        kind: FieldKind::Text,
        render: RenderMode::Histogram,
        description: "Standardized university name",
    },
    FieldSpec {
        name: "age",
        aliases: &[],
        kind: FieldKind::Integer,
        render: RenderMode::Histogram,
        description: "Age in years",
    },
    FieldSpec {
        name: "college",
        aliases: &[],
        kind: FieldKind::Category(COLLEGE_CATEGORIES),
        render: RenderMode::Histogram,
        description: "Field of study bucket",
    },
    FieldSpec {
        name: "gender",
        aliases: &[],
        kind: FieldKind::Text,
        render: RenderMode::Histogram,
        description: "Stated gender (Female or Male)",
    },
    FieldSpec {
        name: "experience",
        aliases: &["experience_years"],
        kind: FieldKind::Integer,
        render: RenderMode::Histogram,
        description: "Total years of full-time professional experience",
    },
    FieldSpec {
        name: "department",
        aliases: &[],
        kind: FieldKind::Text,
        render: RenderMode::Histogram,
        description: "Academic department specialization",
    },
    FieldSpec {
        name: "degree",
        aliases: &["degrees"],
        kind: FieldKind::Text,
        render: RenderMode::Histogram,
        description: "Highest degree (Bachelor's, Master's, PhD)",
    },
    FieldSpec {
        name: "skills",
        aliases: &[],
        kind: FieldKind::List,
        render: RenderMode::RankedBar,
        description: "Technical skills",
    },
];

/// Look up a field by column name.
pub fn field(name: &str) -> Option<&'static FieldSpec> {
    CANDIDATE_FIELDS.iter().find(|f| f.name == name)
}

/// Column names in schema order.
pub fn column_names() -> Vec<&'static str> {
    CANDIDATE_FIELDS.iter().map(|f| f.name).collect()
}

impl FieldSpec {
    /// Keys to try, primary name first.
    pub fn keys(&self) -> impl Iterator<Item = &'static str> {
        std::iter::once(self.name).chain(self.aliases.iter().copied())
    }
}

/// Build the Gemini `responseSchema` (OpenAPI subset) for an extraction call.
///
/// ```text
/// { candidates: [ { university: STRING, age: INTEGER, …, skills: [STRING] } ] }
/// ```
pub fn response_schema() -> Value {
    let mut properties = serde_json::Map::new();
    for f in CANDIDATE_FIELDS {
        let prop = match f.kind {
            FieldKind::Integer => json!({ "type": "INTEGER", "description": f.description }),
            FieldKind::Text => json!({ "type": "STRING", "description": f.description }),
            FieldKind::Category(values) => json!({
                "type": "STRING",
                "enum": values,
                "description": f.description,
            }),
            FieldKind::List => json!({
                "type": "ARRAY",
                "items": { "type": "STRING" },
                "description": f.description,
            }),
        };
        properties.insert(f.name.to_string(), prop);
    }

    json!({
        "type": "OBJECT",
        "properties": {
            "candidates": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": Value::Object(properties),
                    "required": column_names(),
                }
            }
        },
        "required": ["candidates"],
    })
}

/// One extracted candidate with every field filled in.
///
/// Produced by [`crate::table::CandidateTable::records`] after flattening,
/// so absent values already hold their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub university: String,
    pub age: i64,
    pub college: String,
    pub gender: String,
    pub experience: i64,
    pub department: String,
    pub degree: String,
    pub skills: Vec<String>,
}

impl Default for CandidateRecord {
    fn default() -> Self {
        Self {
            university: UNKNOWN.to_string(),
            age: 0,
            college: UNKNOWN.to_string(),
            gender: UNKNOWN.to_string(),
            experience: 0,
            department: UNKNOWN.to_string(),
            degree: UNKNOWN.to_string(),
            skills: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_column_order() {
        assert_eq!(
            column_names(),
            vec![
                "university",
                "age",
                "college",
                "gender",
                "experience",
                "department",
                "degree",
                "skills"
            ]
        );
    }

    #[test]
    fn only_skills_renders_as_ranked_bar() {
        let ranked: Vec<_> = CANDIDATE_FIELDS
            .iter()
            .filter(|f| f.render == RenderMode::RankedBar)
            .map(|f| f.name)
            .collect();
        assert_eq!(ranked, vec!["skills"]);
    }

    #[test]
    fn degree_accepts_plural_alias() {
        let keys: Vec<_> = field("degree").unwrap().keys().collect();
        assert_eq!(keys, vec!["degree", "degrees"]);
    }

    #[test]
    fn response_schema_lists_college_enum() {
        let schema = response_schema();
        let college = &schema["properties"]["candidates"]["items"]["properties"]["college"];
        assert_eq!(college["enum"], json!(COLLEGE_CATEGORIES));
        let skills = &schema["properties"]["candidates"]["items"]["properties"]["skills"];
        assert_eq!(skills["type"], "ARRAY");
    }
}
