//! Metric values and the logging interface handed to training routines.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// A single logged metric value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Number(f64),
    List(Vec<f64>),
    Text(String),
}

impl MetricValue {
    /// Numeric view of the value, if it is a scalar.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetricValue::Number(value) => Some(*value),
            _ => None,
        }
    }

    /// Form of the value that survives JSON persistence: NaN and infinite
    /// numbers become their text rendering.
    pub fn storable(self) -> Self {
        match self {
            MetricValue::Number(value) if !value.is_finite() => {
                MetricValue::Text(value.to_string())
            }
            MetricValue::List(values) if values.iter().any(|v| !v.is_finite()) => {
                MetricValue::Text(MetricValue::List(values).to_string())
            }
            other => other,
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Number(value) => write!(f, "{value}"),
            MetricValue::List(values) => {
                write!(f, "[")?;
                for (idx, value) in values.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{value}")?;
                }
                write!(f, "]")
            }
            MetricValue::Text(value) => f.write_str(value),
        }
    }
}

/// Every value logged under each metric name, in logging order.
pub type MetricLog = BTreeMap<String, Vec<MetricValue>>;

/// Most recently logged value for `name`.
pub fn latest<'a>(log: &'a MetricLog, name: &str) -> Option<&'a MetricValue> {
    log.get(name).and_then(|values| values.last())
}

/// Sink for metrics and output lines emitted while a run executes.
///
/// Execution backends hand an implementation to the training code; the code
/// never reaches for a global run context.
pub trait RunLogger: Send + Sync {
    /// Appends a value under `name`.
    fn log_metric(&self, name: &str, value: MetricValue);

    /// Records one line of run output.
    fn log_line(&self, line: &str);

    fn log(&self, name: &str, value: f64) {
        self.log_metric(name, MetricValue::Number(value));
    }

    fn log_list(&self, name: &str, values: &[f64]) {
        self.log_metric(name, MetricValue::List(values.to_vec()));
    }

    fn log_text(&self, name: &str, value: &str) {
        self.log_metric(name, MetricValue::Text(value.to_string()));
    }
}

/// In-memory logger, handy for exercising routines outside a run.
#[derive(Debug, Default)]
pub struct MemoryLogger {
    metrics: Mutex<MetricLog>,
    lines: Mutex<Vec<String>>,
}

impl MemoryLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn metrics(&self) -> MetricLog {
        self.metrics
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

impl RunLogger for MemoryLogger {
    fn log_metric(&self, name: &str, value: MetricValue) {
        if let Ok(mut metrics) = self.metrics.lock() {
            metrics.entry(name.to_string()).or_default().push(value);
        }
    }

    fn log_line(&self, line: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(line.to_string());
        }
    }
}
