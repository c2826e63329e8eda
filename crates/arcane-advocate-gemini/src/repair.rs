use arcane_advocate_core::CasePayload;
use serde_json::Value;

use crate::GenerationError;

/// Recover the JSON object embedded in raw model text.
///
/// Code-fence markers are stripped, then the text between the first `{` and the last `}`
/// (inclusive) is parsed.
///
/// # Errors
/// Returns [`GenerationError::Parse`] when no brace pair is present or the slice is not
/// valid JSON.
pub fn extract_json_payload(raw: &str) -> Result<Value, GenerationError> {
    let unfenced = raw.replace("```json", "").replace("```", "");
    let text = unfenced.trim();

    let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) else {
        return Err(GenerationError::Parse("no JSON object found in model response".to_string()));
    };
    if end < start {
        return Err(GenerationError::Parse("no JSON object found in model response".to_string()));
    }

    serde_json::from_str(&text[start..=end])
        .map_err(|err| GenerationError::Parse(format!("model response is not valid JSON: {err}")))
}

/// Repair, deserialize, and validate a case from raw model text.
///
/// # Errors
/// Returns [`GenerationError::Parse`] when repair fails, required fields are missing or
/// mistyped, or the case breaks a structural rule.
pub fn parse_case_payload(raw: &str) -> Result<CasePayload, GenerationError> {
    let value = extract_json_payload(raw)?;
    let mut payload: CasePayload = serde_json::from_value(value).map_err(|err| {
        GenerationError::Parse(format!("model response does not match the case schema: {err}"))
    })?;
    let cleared = payload.validate().map_err(|err| GenerationError::Parse(err.to_string()))?;
    for dangling in cleared {
        tracing::warn!(
            evidence_id = %dangling.evidence_id,
            unlocks = %dangling.unlocks,
            "dropping unlock reference to unknown evidence"
        );
    }
    Ok(payload)
}
