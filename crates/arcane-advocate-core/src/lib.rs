use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use time::OffsetDateTime;
use ulid::Ulid;

/// Number of most recent cases fed back into the prompt.
pub const HISTORY_CONTEXT_LIMIT: usize = 3;

const UNKNOWN_OUTCOME: &str = "Unknown";
const UNTITLED_CASE: &str = "Untitled";

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum CaseError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("encoding error: {0}")]
    Encoding(String),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct CaseId(pub Ulid);

impl CaseId {
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for CaseId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for CaseId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Current wall-clock time as epoch milliseconds.
#[must_use]
pub fn now_millis() -> i64 {
    let nanos = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    i64::try_from(nanos).unwrap_or(i64::MAX)
}

/// Lifecycle status of a stored case. Statuses written by other layers are kept verbatim.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(from = "String", into = "String")]
pub enum CaseStatus {
    Active,
    Resolved,
    Other(String),
}

impl CaseStatus {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Active => "active",
            Self::Resolved => "resolved",
            Self::Other(value) => value.as_str(),
        }
    }
}

impl From<String> for CaseStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "active" => Self::Active,
            "resolved" => Self::Resolved,
            _ => Self::Other(value),
        }
    }
}

impl From<CaseStatus> for String {
    fn from(value: CaseStatus) -> Self {
        match value {
            CaseStatus::Other(value) => value,
            known => known.as_str().to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    #[serde(alias = "Low", alias = "LOW")]
    Low,
    #[serde(alias = "Medium", alias = "MEDIUM")]
    Medium,
    #[serde(alias = "High", alias = "HIGH")]
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Judge {
    pub name: String,
    pub personality: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Prosecutor {
    pub name: String,
    pub style: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Witness {
    pub name: String,
    pub role: String,
    pub personality: String,
    pub pressure_tolerance: Level,
    pub testimony: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Evidence {
    pub id: String,
    pub name: String,
    pub description: String,
    pub credibility: Level,
    #[serde(default)]
    pub unlocks: Option<String>,
}

/// Narrative payload produced by the generation model, before bookkeeping is stamped on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CasePayload {
    pub tagline: String,
    pub case_title: String,
    pub fact_pattern: String,
    pub judge: Judge,
    pub prosecutor: Prosecutor,
    pub witnesses: Vec<Witness>,
    pub evidence: Vec<Evidence>,
    pub legal_theories: Vec<String>,
    #[serde(default)]
    pub moral_dilemma: Option<String>,
}

/// An `unlocks` reference that pointed at no evidence in the same case and was dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClearedUnlock {
    pub evidence_id: String,
    pub unlocks: String,
}

impl CasePayload {
    /// Check structural rules the wire shape alone cannot express, normalizing
    /// `unlocks` references in place.
    ///
    /// Blank or literal `"null"` references become `None`; references to ids missing
    /// from this case are cleared and returned so the caller can report them.
    ///
    /// # Errors
    /// Returns [`CaseError::Validation`] when the title is blank or evidence ids are blank
    /// or duplicated.
    pub fn validate(&mut self) -> Result<Vec<ClearedUnlock>, CaseError> {
        if self.case_title.trim().is_empty() {
            return Err(CaseError::Validation("caseTitle must not be blank".to_string()));
        }

        let mut ids = BTreeSet::new();
        for item in &self.evidence {
            if item.id.trim().is_empty() {
                return Err(CaseError::Validation(format!(
                    "evidence `{}` has a blank id",
                    item.name
                )));
            }
            if !ids.insert(item.id.clone()) {
                return Err(CaseError::Validation(format!("duplicate evidence id `{}`", item.id)));
            }
        }

        let mut cleared = Vec::new();
        for item in &mut self.evidence {
            let Some(target) = item.unlocks.take() else {
                continue;
            };
            let trimmed = target.trim();
            if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("null") {
                continue;
            }
            if ids.contains(trimmed) {
                item.unlocks = Some(trimmed.to_string());
            } else {
                cleared.push(ClearedUnlock { evidence_id: item.id.clone(), unlocks: target });
            }
        }
        Ok(cleared)
    }
}

/// One persisted case, kept as the JSON object it was stored as.
///
/// Bookkeeping fields (`id`, `timestamp`, `status`) live in the same object as the
/// narrative and are read through lenient accessors, so records written by older builds or
/// by the gameplay layer survive a read-modify-write unchanged whatever their shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct CaseRecord {
    pub fields: Map<String, Value>,
}

impl CaseRecord {
    #[must_use]
    pub fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Turn a freshly generated payload into an `active` record.
    ///
    /// # Errors
    /// Returns [`CaseError::Encoding`] when the payload does not encode as a JSON object.
    pub fn stamp(payload: CasePayload, id: CaseId, timestamp: i64) -> Result<Self, CaseError> {
        let narrative = match serde_json::to_value(payload)
            .map_err(|err| CaseError::Encoding(err.to_string()))?
        {
            Value::Object(map) => map,
            other => {
                return Err(CaseError::Encoding(format!(
                    "case payload encoded as {other}, expected an object"
                )))
            }
        };
        let mut fields = Map::new();
        fields.insert("id".to_string(), Value::String(id.to_string()));
        fields.insert("timestamp".to_string(), Value::from(timestamp));
        fields.insert("status".to_string(), Value::String(CaseStatus::Active.into()));
        fields.extend(narrative);
        Ok(Self { fields })
    }

    /// Identifier as text. Numeric ids from older records are rendered as strings.
    #[must_use]
    pub fn id(&self) -> Option<String> {
        match self.fields.get("id")? {
            Value::String(id) => Some(id.clone()),
            Value::Number(id) => Some(id.to_string()),
            _ => None,
        }
    }

    /// Creation time as stored, integral or not.
    #[must_use]
    pub fn timestamp(&self) -> Option<&Number> {
        self.fields.get("timestamp").and_then(|value| match value {
            Value::Number(number) => Some(number),
            _ => None,
        })
    }

    /// Set the timestamp unless a numeric one is already present. Returns the stored value.
    pub fn stamp_timestamp_with(&mut self, now: impl FnOnce() -> i64) -> Number {
        if let Some(existing) = self.timestamp() {
            return existing.clone();
        }
        let number = Number::from(now());
        self.fields.insert("timestamp".to_string(), Value::Number(number.clone()));
        number
    }

    #[must_use]
    pub fn status(&self) -> Option<CaseStatus> {
        self.fields.get("status").and_then(Value::as_str).map(|status| status.to_string().into())
    }

    #[must_use]
    pub fn case_title(&self) -> Option<&str> {
        self.fields.get("caseTitle").and_then(Value::as_str)
    }

    /// Outcome recorded by gameplay, if any. Empty strings and null count as unset;
    /// numbers and booleans are rendered as written.
    #[must_use]
    pub fn outcome(&self) -> Option<String> {
        match self.fields.get("outcome")? {
            Value::String(outcome) if !outcome.is_empty() => Some(outcome.clone()),
            Value::Number(outcome) => Some(outcome.to_string()),
            Value::Bool(outcome) => Some(outcome.to_string()),
            _ => None,
        }
    }
}

/// The whole persisted game state.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HistoryDocument {
    #[serde(default)]
    pub cases: Vec<CaseRecord>,
    #[serde(default)]
    pub settings: Map<String, Value>,
}

/// Digest of the last `limit` cases, one line each, oldest first.
#[must_use]
pub fn history_summary(cases: &[CaseRecord], limit: usize) -> String {
    let start = cases.len().saturating_sub(limit);
    cases[start..]
        .iter()
        .map(|record| {
            format!(
                "Case: {} — Outcome: {}",
                record.case_title().unwrap_or(UNTITLED_CASE),
                record.outcome().as_deref().unwrap_or(UNKNOWN_OUTCOME)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
