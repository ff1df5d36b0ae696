//! Metrics query result rows.
//!
//! The join in [`super::usage`] consumes rows through the [`QueryRow`]
//! contract: labels looked up by name, plus the row's sample series. Running
//! queries is someone else's job; [`QueryResults::from_prometheus_json`]
//! decodes the body a Prometheus-compatible HTTP API returns.

use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::model::Vector;

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("query result is missing required field '{0}'")]
    MissingField(String),

    #[error("query result field '{field}' is not a string (found {found})")]
    InvalidField { field: String, found: &'static str },

    #[error("malformed query result: {0}")]
    Malformed(String),

    #[error("query failed with status '{status}': {message}")]
    Status { status: String, message: String },

    #[error("failed to decode query result: {0}")]
    Json(#[from] serde_json::Error),
}

/// One labelled series from a query result.
pub trait QueryRow {
    /// String value of label `name`. `Ok(None)` when the label is absent,
    /// an error when it is present but not a string.
    fn label(&self, name: &str) -> Result<Option<&str>, QueryError>;

    fn values(&self) -> &[Vector];

    /// Like [`QueryRow::label`], but an absent label is an error.
    fn required_label(&self, name: &str) -> Result<&str, QueryError> {
        self.label(name)?
            .ok_or_else(|| QueryError::MissingField(name.to_string()))
    }
}

/// A decoded row: the metric's label map and its samples.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub metric: Map<String, Value>,
    pub values: Vec<Vector>,
}

impl QueryResult {
    pub fn new(metric: Map<String, Value>, values: Vec<Vector>) -> Self {
        Self { metric, values }
    }

    /// Row with string labels.
    pub fn with_labels<'a>(
        labels: impl IntoIterator<Item = (&'a str, &'a str)>,
        values: Vec<Vector>,
    ) -> Self {
        let metric = labels
            .into_iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
            .collect();
        Self { metric, values }
    }
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl QueryRow for QueryResult {
    fn label(&self, name: &str) -> Result<Option<&str>, QueryError> {
        match self.metric.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(other) => Err(QueryError::InvalidField {
                field: name.to_string(),
                found: json_kind(other),
            }),
        }
    }

    fn values(&self) -> &[Vector] {
        &self.values
    }
}

// ---------------------------------------------------------------------------
// Prometheus response decoding
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct Envelope {
    status: String,
    #[serde(default)]
    data: Option<Data>,
    #[serde(default, rename = "errorType")]
    error_type: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct Data {
    #[serde(default)]
    result: Vec<RawSeries>,
}

#[derive(Deserialize)]
struct RawSeries {
    #[serde(default)]
    metric: Map<String, Value>,
    /// Range queries.
    #[serde(default)]
    values: Vec<(f64, String)>,
    /// Instant queries.
    #[serde(default)]
    value: Option<(f64, String)>,
}

fn parse_sample((timestamp, raw): &(f64, String)) -> Result<Vector, QueryError> {
    let value = raw
        .parse::<f64>()
        .map_err(|_| QueryError::Malformed(format!("sample value '{raw}' is not a number")))?;
    Ok(Vector::new(value, *timestamp))
}

/// Rows decoded from one query response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResults {
    rows: Vec<QueryResult>,
}

impl QueryResults {
    pub fn new(rows: Vec<QueryResult>) -> Self {
        Self { rows }
    }

    /// Decode a Prometheus `query` / `query_range` response body.
    pub fn from_prometheus_json(body: &str) -> Result<Self, QueryError> {
        let envelope: Envelope = serde_json::from_str(body)?;
        Self::from_envelope(envelope)
    }

    /// [`QueryResults::from_prometheus_json`] for an already-parsed body.
    pub fn from_value(body: Value) -> Result<Self, QueryError> {
        let envelope: Envelope = serde_json::from_value(body)?;
        Self::from_envelope(envelope)
    }

    fn from_envelope(envelope: Envelope) -> Result<Self, QueryError> {
        if envelope.status != "success" {
            let message = match (envelope.error_type, envelope.error) {
                (Some(kind), Some(err)) => format!("{kind}: {err}"),
                (None, Some(err)) => err,
                (Some(kind), None) => kind,
                (None, None) => "no error message".to_string(),
            };
            return Err(QueryError::Status {
                status: envelope.status,
                message,
            });
        }

        let data = envelope
            .data
            .ok_or_else(|| QueryError::Malformed("response has no 'data' field".into()))?;

        let mut rows = Vec::with_capacity(data.result.len());
        for series in data.result {
            let mut values = series
                .values
                .iter()
                .map(parse_sample)
                .collect::<Result<Vec<_>, _>>()?;
            if let Some(sample) = &series.value {
                values.push(parse_sample(sample)?);
            }
            rows.push(QueryResult::new(series.metric, values));
        }
        Ok(Self { rows })
    }

    pub fn rows(&self) -> &[QueryResult] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<QueryResult> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl From<Vec<QueryResult>> for QueryResults {
    fn from(rows: Vec<QueryResult>) -> Self {
        Self::new(rows)
    }
}
