//! Row filters.
//!
//! A [`Filter`] is an ordered list of conditions, combined with AND. It does
//! two jobs: the in-memory backend evaluates it against JSON rows, and the
//! client-side query cache folds its deterministic [`signature`](Filter::signature)
//! into cache keys.

use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
enum Condition {
    /// `row[field] == value`
    Eq { field: String, value: Value },
    /// `row[field] != value`
    Ne { field: String, value: Value },
    /// `row[field] ∈ values`
    In { field: String, values: Vec<Value> },
    /// `row[f] == value` for at least one of the listed fields. Used for
    /// "subject is either participant" over (consumer_id, provider_id).
    EitherEq { fields: Vec<String>, value: Value },
}

impl Condition {
    fn matches(&self, row: &Value) -> bool {
        match self {
            Condition::Eq { field, value } => row.get(field) == Some(value),
            Condition::Ne { field, value } => row.get(field) != Some(value),
            Condition::In { field, values } => row
                .get(field)
                .map(|v| values.contains(v))
                .unwrap_or(false),
            Condition::EitherEq { fields, value } => {
                fields.iter().any(|f| row.get(f) == Some(value))
            }
        }
    }

    fn signature(&self) -> String {
        match self {
            Condition::Eq { field, value } => format!("eq({field})={value}"),
            Condition::Ne { field, value } => format!("ne({field})={value}"),
            Condition::In { field, values } => {
                let joined: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                format!("in({field})=[{}]", joined.join(","))
            }
            Condition::EitherEq { fields, value } => {
                format!("either({})={value}", fields.join("|"))
            }
        }
    }
}

/// Conjunction of row conditions, in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<Condition>,
}

impl Filter {
    /// Filter matching every row.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Eq {
            field: field.to_string(),
            value: value.into(),
        });
        self
    }

    pub fn ne(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Ne {
            field: field.to_string(),
            value: value.into(),
        });
        self
    }

    pub fn is_in(mut self, field: &str, values: Vec<Value>) -> Self {
        self.conditions.push(Condition::In {
            field: field.to_string(),
            values,
        });
        self
    }

    /// Match rows where any of `fields` equals `value`.
    pub fn either_eq(mut self, fields: &[&str], value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::EitherEq {
            fields: fields.iter().map(|f| f.to_string()).collect(),
            value: value.into(),
        });
        self
    }

    /// Evaluate against a JSON object row.
    pub fn matches(&self, row: &Value) -> bool {
        self.conditions.iter().all(|c| c.matches(row))
    }

    /// Deterministic textual form: equal filters built in the same order
    /// produce equal signatures, suitable as a cache-key component.
    pub fn signature(&self) -> String {
        let parts: Vec<String> = self.conditions.iter().map(|c| c.signature()).collect();
        parts.join("&")
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}
