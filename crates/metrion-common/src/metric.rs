use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Metric kind, addressing one of the two independent namespaces.
///
/// Counters accumulate signed 64-bit deltas; gauges hold the last reported
/// 64-bit float. The same name may exist as both kinds simultaneously and is
/// always addressed by `(kind, name)`.
///
/// # Examples
///
/// ```
/// use metrion_common::metric::MetricKind;
///
/// let kind: MetricKind = "counter".parse().unwrap();
/// assert_eq!(kind, MetricKind::Counter);
/// assert_eq!(kind.to_string(), "counter");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Gauge,
    Counter,
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricKind::Gauge => write!(f, "gauge"),
            MetricKind::Counter => write!(f, "counter"),
        }
    }
}

impl std::str::FromStr for MetricKind {
    type Err = ValidateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gauge" => Ok(MetricKind::Gauge),
            "counter" => Ok(MetricKind::Counter),
            _ => Err(ValidateError::UnknownKind(s.to_string())),
        }
    }
}

/// Validation failures for a wire envelope.
///
/// Handlers map [`ValidateError::EmptyId`] to 404 and everything else to 400,
/// matching the per-form response contracts.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ValidateError {
    #[error("metric id must not be empty")]
    EmptyId,
    #[error("unknown metric type: {0}")]
    UnknownKind(String),
    #[error("counter '{0}' requires a delta field")]
    MissingDelta(String),
    #[error("gauge '{0}' requires a value field")]
    MissingValue(String),
    #[error("metric '{0}' carries a payload field of the wrong kind")]
    KindMismatch(String),
    #[error("cannot parse '{value}' as {kind}")]
    BadNumber { kind: MetricKind, value: String },
}

/// The wire envelope: `{ id, type, delta?, value? }`.
///
/// Exactly one of `delta`/`value` is present on an ingest payload and must
/// match `type`. Read requests carry only `id` and `type`; the server echoes
/// the envelope back with the payload field populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Metric {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MetricKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

impl Metric {
    pub fn gauge(id: impl Into<String>, value: f64) -> Self {
        Self {
            id: id.into(),
            kind: MetricKind::Gauge,
            delta: None,
            value: Some(value),
        }
    }

    pub fn counter(id: impl Into<String>, delta: i64) -> Self {
        Self {
            id: id.into(),
            kind: MetricKind::Counter,
            delta: Some(delta),
            value: None,
        }
    }

    /// Parses the URL-form `(type, name, value)` triple into an envelope.
    pub fn from_url_parts(kind: &str, name: &str, raw: &str) -> Result<Self, ValidateError> {
        let kind: MetricKind = kind.parse()?;
        if name.is_empty() {
            return Err(ValidateError::EmptyId);
        }
        match kind {
            MetricKind::Gauge => {
                let value: f64 = raw.parse().map_err(|_| ValidateError::BadNumber {
                    kind,
                    value: raw.to_string(),
                })?;
                Ok(Metric::gauge(name, value))
            }
            MetricKind::Counter => {
                let delta: i64 = raw.parse().map_err(|_| ValidateError::BadNumber {
                    kind,
                    value: raw.to_string(),
                })?;
                Ok(Metric::counter(name, delta))
            }
        }
    }

    /// Validates an ingest envelope: non-empty id and exactly the payload
    /// field matching the kind.
    pub fn validate(&self) -> Result<(), ValidateError> {
        if self.id.is_empty() {
            return Err(ValidateError::EmptyId);
        }
        match self.kind {
            MetricKind::Gauge => {
                if self.delta.is_some() {
                    return Err(ValidateError::KindMismatch(self.id.clone()));
                }
                if self.value.is_none() {
                    return Err(ValidateError::MissingValue(self.id.clone()));
                }
            }
            MetricKind::Counter => {
                if self.value.is_some() {
                    return Err(ValidateError::KindMismatch(self.id.clone()));
                }
                if self.delta.is_none() {
                    return Err(ValidateError::MissingDelta(self.id.clone()));
                }
            }
        }
        Ok(())
    }

    /// Text rendering of the payload field, as served by the URL read form.
    ///
    /// Gauges use the shortest float representation that round-trips
    /// (`3.14` renders as `"3.14"`, not `"3.140000"`).
    pub fn format_value(&self) -> String {
        match self.kind {
            MetricKind::Gauge => self.value.map(|v| v.to_string()).unwrap_or_default(),
            MetricKind::Counter => self.delta.map(|d| d.to_string()).unwrap_or_default(),
        }
    }
}

/// A batch reduced to per-kind maps, ready for a bulk store update.
///
/// Duplicate counters are summed during the merge; duplicate gauges keep the
/// last writer. Since the two namespaces are independent, application order
/// between the maps does not matter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedBatch {
    pub gauges: HashMap<String, f64>,
    pub counters: HashMap<String, i64>,
}

impl MergedBatch {
    pub fn is_empty(&self) -> bool {
        self.gauges.is_empty() && self.counters.is_empty()
    }

    pub fn len(&self) -> usize {
        self.gauges.len() + self.counters.len()
    }
}

/// Validates every envelope in `batch` and merges it into per-kind maps.
///
/// The first invalid envelope aborts the whole batch.
///
/// # Examples
///
/// ```
/// use metrion_common::metric::{merge_batch, Metric};
///
/// let merged = merge_batch(&[
///     Metric::counter("x", 1),
///     Metric::counter("x", 2),
///     Metric::gauge("y", 3.14),
/// ])
/// .unwrap();
/// assert_eq!(merged.counters["x"], 3);
/// assert_eq!(merged.gauges["y"], 3.14);
/// ```
pub fn merge_batch(batch: &[Metric]) -> Result<MergedBatch, ValidateError> {
    let mut merged = MergedBatch::default();
    for m in batch {
        m.validate()?;
        match m.kind {
            MetricKind::Gauge => {
                // last writer wins within the batch
                merged.gauges.insert(m.id.clone(), m.value.unwrap_or(0.0));
            }
            MetricKind::Counter => {
                *merged.counters.entry(m.id.clone()).or_insert(0) += m.delta.unwrap_or(0);
            }
        }
    }
    Ok(merged)
}
