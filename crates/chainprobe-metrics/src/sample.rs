//! Metric samples in the Prometheus text exposition format.
//!
//! A [`MetricSample`] is a single `(name, labels, value)` observation.
//! Samples are built fresh every probe iteration, rendered once into a
//! push payload and then dropped.

use std::fmt;

use thiserror::Error;

/// Errors raised while building metric names and label sets.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SampleError {
    #[error("metric name must not be empty")]
    EmptyName,

    #[error("invalid metric name: {0:?}")]
    InvalidName(String),

    #[error("invalid label name: {0:?}")]
    InvalidLabel(String),
}

/// A validated, non-empty Prometheus metric name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetricName(String);

impl MetricName {
    /// Validate `name` against `[a-zA-Z_:][a-zA-Z0-9_:]*`.
    pub fn new(name: impl Into<String>) -> Result<Self, SampleError> {
        let name = name.into();
        if name.is_empty() {
            return Err(SampleError::EmptyName);
        }
        if !is_valid_name(&name, true) {
            return Err(SampleError::InvalidName(name));
        }
        Ok(Self(name))
    }

    /// Derive `<self>_<suffix>`, e.g. `e2e_latency` → `e2e_latency_success`.
    pub fn with_suffix(&self, suffix: &str) -> Result<Self, SampleError> {
        Self::new(format!("{}_{}", self.0, suffix))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ordered label set with unique keys.
///
/// Labels with an empty value are never stored: inserting one removes any
/// previous value for that key, so it is omitted from the rendered line
/// rather than emitted as `key=""`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Labels {
    pairs: Vec<(String, String)>,
}

impl Labels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a label. Insertion order is kept for new keys.
    pub fn insert(&mut self, key: &str, value: impl Into<String>) -> Result<(), SampleError> {
        if !is_valid_name(key, false) {
            return Err(SampleError::InvalidLabel(key.to_string()));
        }
        let value = value.into();
        let existing = self.pairs.iter().position(|(k, _)| k == key);

        match (existing, value.is_empty()) {
            (Some(idx), true) => {
                self.pairs.remove(idx);
            }
            (Some(idx), false) => self.pairs[idx].1 = value,
            (None, true) => {}
            (None, false) => self.pairs.push((key.to_string(), value)),
        }
        Ok(())
    }

    /// Insert a label whose value may be absent. `None` behaves like an
    /// empty value.
    pub fn insert_opt(
        &mut self,
        key: &str,
        value: Option<impl Into<String>>,
    ) -> Result<(), SampleError> {
        match value {
            Some(v) => self.insert(key, v),
            None => self.insert(key, String::new()),
        }
    }

    /// Builder-style [`Labels::insert`].
    pub fn with(mut self, key: &str, value: impl Into<String>) -> Result<Self, SampleError> {
        self.insert(key, value)?;
        Ok(self)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// One immutable `(name, labels, value)` observation.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    name: MetricName,
    labels: Labels,
    value: f64,
}

impl MetricSample {
    pub fn new(name: MetricName, labels: Labels, value: f64) -> Self {
        Self {
            name,
            labels,
            value,
        }
    }

    pub fn name(&self) -> &MetricName {
        &self.name
    }

    pub fn labels(&self) -> &Labels {
        &self.labels
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    /// Render as a single exposition line without a trailing newline.
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for MetricSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name.as_str())?;
        if !self.labels.is_empty() {
            f.write_str("{")?;
            for (i, (key, value)) in self.labels.iter().enumerate() {
                if i > 0 {
                    f.write_str(",")?;
                }
                write!(f, "{key}=\"{}\"", escape_label_value(value))?;
            }
            f.write_str("}")?;
        }
        write!(f, " {}", format_value(self.value))
    }
}

/// Render samples into one newline-terminated push payload.
pub fn render_payload(samples: &[MetricSample]) -> String {
    let mut out = String::new();
    for sample in samples {
        out.push_str(&sample.render());
        out.push('\n');
    }
    out
}

fn is_valid_name(s: &str, allow_colon: bool) -> bool {
    let mut chars = s.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    let head_ok = first.is_ascii_alphabetic() || first == '_' || (allow_colon && first == ':');
    head_ok && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || (allow_colon && c == ':'))
}

fn escape_label_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            other => out.push(other),
        }
    }
    out
}

fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value == f64::INFINITY {
        "+Inf".to_string()
    } else if value == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else {
        value.to_string()
    }
}
