//! System instructions for candidate extraction.
//!
//! Callers can override the default via
//! [`crate::config::ExtractionConfig::system_prompt`]; the constants here are
//! used only when no override is provided.

use crate::schema::{FieldKind, CANDIDATE_FIELDS};

/// Separator placed between CVs inside one batch payload.
pub const CV_DELIMITER: &str = "\n\n\n";

/// Default system instruction for extracting candidate fields from CV text.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are an efficient HR assistant responsible for accurately extracting and classifying key details from CVs. The input may contain several CVs separated by blank lines; return one candidate entry per CV, in the order they appear.

Extract the following structured information:
- University: Extract and standardize the university name (e.g., "Stanford University" not "Stanford").
- College: Classify the field of study into one of these categories only: "Computer Science", "Engineering", or "Other".
- Department: Extract the specific department specialization (e.g., "Security", "Computer Science", "Information Systems", "Software Engineering"). Only include real academic departments.
- Age: Extract the candidate's age as a number.
- Experience: Calculate total years of full-time professional work experience.
- Gender: Extract stated gender (Female or Male).
- Skills: Extract a comprehensive list of the technical skills mentioned in the CV.
- Degree: Classify the highest degree obtained (e.g., Bachelor's, Master's, PhD).

Present all information with proper capitalization for each field. Ensure responses are accurate, consistent, and follow standard naming conventions."#;

/// Extra instruction for providers without native structured output.
///
/// Spells out the JSON shape the response parser expects.
pub fn json_output_instruction() -> String {
    let fields: Vec<String> = CANDIDATE_FIELDS
        .iter()
        .map(|f| {
            let ty = match f.kind {
                FieldKind::Integer => "integer".to_string(),
                FieldKind::Text => "string".to_string(),
                FieldKind::Category(values) => format!("one of {}", values.join(" | ")),
                FieldKind::List => "array of strings".to_string(),
            };
            format!("    \"{}\": {}", f.name, ty)
        })
        .collect();

    format!(
        "\n\nRespond with JSON only, no commentary and no code fences, in exactly this shape:\n\
         {{\"candidates\": [\n  {{\n{}\n  }}\n]}}",
        fields.join(",\n")
    )
}
