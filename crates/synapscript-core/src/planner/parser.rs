//! Planner response parsing.
//!
//! Model output is not reliably bare JSON. `extract_json` accepts, in order:
//! the whole text as JSON, the first ```` ```json ```` fenced block, or the
//! span from the first `{`/`[` to the last matching closer.

use serde_json::Value;

use super::{AutomationPlan, PlannerError};
use crate::code::safety;

const REQUIRED_FIELDS: [&str; 4] = ["understanding", "automation", "generated_code", "requirements"];

/// Pull a JSON value out of free-form model output.
pub fn extract_json(text: &str) -> Result<Value, PlannerError> {
    if let Ok(value) = serde_json::from_str(text.trim()) {
        return Ok(value);
    }

    let candidates = [fenced_json_block(text), outer_json_span(text)];
    if let Some(value) = candidates
        .into_iter()
        .flatten()
        .find_map(|candidate| serde_json::from_str(candidate).ok())
    {
        return Ok(value);
    }

    Err(PlannerError::InvalidResponse(
        "could not extract valid JSON from planner response".to_string(),
    ))
}

/// Parse, validate and safety-check a planner response.
pub fn parse_plan(text: &str) -> Result<AutomationPlan, PlannerError> {
    let value = extract_json(text)?;
    validate(&value)?;

    let plan: AutomationPlan = serde_json::from_value(value)
        .map_err(|e| PlannerError::InvalidResponse(e.to_string()))?;

    if let Some(pattern) = safety::scan(&plan.generated_code.code) {
        return Err(PlannerError::DangerousCode(pattern));
    }
    Ok(plan)
}

fn validate(value: &Value) -> Result<(), PlannerError> {
    for field in REQUIRED_FIELDS {
        if !truthy(value.get(field)) {
            return Err(PlannerError::InvalidResponse(format!(
                "missing required field: {field}"
            )));
        }
    }

    let automation = &value["automation"];
    if !truthy(automation.get("name")) || !truthy(automation.get("trigger")) {
        return Err(PlannerError::InvalidResponse(
            "incomplete automation definition".to_string(),
        ));
    }

    if !truthy(value["generated_code"].get("code")) {
        return Err(PlannerError::InvalidResponse(
            "no executable code generated".to_string(),
        ));
    }
    Ok(())
}

/// Empty strings, `false`, `0` and `null` count as missing.
fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

fn fenced_json_block(text: &str) -> Option<&str> {
    let start = text.find("```json")? + "```json".len();
    let rest = &text[start..];
    let end = rest.find("```")?;
    Some(rest[..end].trim())
}

/// First `{` .. last `}` or first `[` .. last `]`, whichever opens earlier.
fn outer_json_span(text: &str) -> Option<&str> {
    let span = |open: char, close: char| {
        let start = text.find(open)?;
        let end = text.rfind(close)?;
        (end > start).then_some((start, end))
    };

    let (start, end) = match (span('{', '}'), span('[', ']')) {
        (Some(obj), Some(arr)) => {
            if obj.0 < arr.0 {
                obj
            } else {
                arr
            }
        }
        (Some(obj), None) => obj,
        (None, Some(arr)) => arr,
        (None, None) => return None,
    };
    Some(&text[start..=end])
}
