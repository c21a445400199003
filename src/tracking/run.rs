use std::collections::HashMap;

use serde_json::Value;

use crate::error::FieldError;

/// Lifecycle state of a run. Only finished runs are synced; unknown states
/// are preserved rather than rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    Finished,
    Running,
    Crashed,
    Failed,
    Killed,
    Other(String),
}

impl RunState {
    /// Parse the state string reported by the tracking service.
    pub fn parse(s: &str) -> Self {
        match s {
            "finished" => RunState::Finished,
            "running" => RunState::Running,
            "crashed" => RunState::Crashed,
            "failed" => RunState::Failed,
            "killed" => RunState::Killed,
            other => RunState::Other(other.to_string()),
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, RunState::Finished)
    }
}

/// Scalar value kinds a field lookup can produce.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Str(String),
    Num(f64),
    Bool(bool),
    Absent,
}

impl FieldValue {
    /// Render the value as a spreadsheet cell.
    ///
    /// NaN-like numbers render as the empty string, matching how existing
    /// rows are stringified on read-back.
    pub fn render(&self) -> String {
        match self {
            FieldValue::Str(s) => s.clone(),
            FieldValue::Num(n) if n.is_nan() => String::new(),
            FieldValue::Num(n) => render_number(*n),
            FieldValue::Bool(b) => b.to_string(),
            FieldValue::Absent => String::new(),
        }
    }
}

/// Whole numbers render without a trailing fraction so cell contents match
/// what the service shows for integer-valued metrics.
fn render_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// Entry kinds held by a [`FieldMap`].
#[derive(Debug, Clone, PartialEq)]
enum FieldEntry {
    Scalar(FieldValue),
    /// Arrays and objects: present in the source payload but not renderable
    /// as a single cell. Lookups surface these as explicit errors.
    Nested,
}

/// String-keyed bag of run config/summary values.
///
/// Keys iterate in first-seen order. Lookups return explicit values; a
/// missing key is `Absent`, never an error, so "key not found" does not flow
/// through error handling.
#[derive(Debug, Clone, Default)]
pub struct FieldMap {
    entries: Vec<(String, FieldEntry)>,
    index: HashMap<String, usize>,
}

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a parsed JSON object, classifying each value. Non-object
    /// payloads yield an empty map.
    pub fn from_json(value: &Value) -> Self {
        let mut map = FieldMap::new();
        if let Value::Object(fields) = value {
            for (key, raw) in fields {
                map.insert_raw(key.clone(), raw);
            }
        }
        map
    }

    fn insert_raw(&mut self, key: String, raw: &Value) {
        let entry = match raw {
            Value::Null => FieldEntry::Scalar(FieldValue::Absent),
            Value::Bool(b) => FieldEntry::Scalar(FieldValue::Bool(*b)),
            Value::Number(n) => match n.as_f64() {
                Some(f) => FieldEntry::Scalar(FieldValue::Num(f)),
                None => FieldEntry::Nested,
            },
            Value::String(s) => FieldEntry::Scalar(FieldValue::Str(s.clone())),
            Value::Array(_) | Value::Object(_) => FieldEntry::Nested,
        };
        self.push(key, entry);
    }

    pub fn insert(&mut self, key: impl Into<String>, value: FieldValue) {
        self.push(key.into(), FieldEntry::Scalar(value));
    }

    fn push(&mut self, key: String, entry: FieldEntry) {
        match self.index.get(&key) {
            Some(&i) => self.entries[i].1 = entry,
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, entry));
            }
        }
    }

    /// Look up a key. Missing keys are `Ok(Absent)`; keys holding nested
    /// payloads are an explicit per-field error.
    pub fn get(&self, key: &str) -> Result<FieldValue, FieldError> {
        match self.index.get(key).map(|&i| &self.entries[i].1) {
            None => Ok(FieldValue::Absent),
            Some(FieldEntry::Scalar(v)) => Ok(v.clone()),
            Some(FieldEntry::Nested) => Err(FieldError::Unrenderable {
                key: key.to_string(),
            }),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Keys in first-seen order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One recorded execution fetched from the tracking service. Immutable once
/// fetched; not owned by this system.
#[derive(Debug, Clone)]
pub struct Run {
    pub id: String,
    pub state: RunState,
    /// Raw owner identity as reported by the service
    pub user: String,
    pub config: FieldMap,
    pub summary: FieldMap,
}
