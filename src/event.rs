//! Inbound telemetry event.
//!
//! Events are parsed once at ingress and then shared read-only (behind an `Arc`) by every
//! provider send spawned for them.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// One telemetry record as posted by a client.
///
/// Only `name` is required. Zero/empty values mean "absent" for the optional scalars, and an
/// explicit JSON `null` reads the same as an omitted field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryEvent {
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub time_unix_nano: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub trace_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub span_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub severity_text: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub severity_number: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub attributes: Map<String, Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub resource: Map<String, Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub dropped_attributes_count: u32,
}

impl TelemetryEvent {
    /// Minimal event with only a name; every optional field is absent.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            time_unix_nano: 0,
            trace_id: String::new(),
            span_id: String::new(),
            severity_text: String::new(),
            severity_number: 0,
            body: None,
            attributes: Map::new(),
            resource: Map::new(),
            dropped_attributes_count: 0,
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_resource(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.resource.insert(key.into(), value.into());
        self
    }

    /// Fill in a missing timestamp with the given receipt time.
    pub fn normalize_time(&mut self, received_unix_nano: i64) {
        if self.time_unix_nano == 0 {
            self.time_unix_nano = received_unix_nano;
        }
    }

    /// Event time as RFC3339 UTC with nanosecond precision, e.g. `2024-01-02T03:04:05.000000006Z`.
    pub fn rfc3339_time(&self) -> String {
        format_unix_nanos(self.time_unix_nano)
    }
}

/// Current wall-clock time in Unix nanoseconds, saturating past year 2262.
pub fn now_unix_nanos() -> i64 {
    Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX)
}

/// RFC3339 rendering used on the wire: always UTC, always nine fractional digits.
pub fn format_unix_nanos(unix_nanos: i64) -> String {
    let secs = unix_nanos.div_euclid(1_000_000_000);
    let nanos = unix_nanos.rem_euclid(1_000_000_000) as u32;
    DateTime::from_timestamp(secs, nanos)
        .unwrap_or_default()
        .to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
