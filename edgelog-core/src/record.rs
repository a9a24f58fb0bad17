use crate::error::EdgelogError;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One captured request, as it travels from the interceptor to the sink.
///
/// Fields are private: a record is validated once at construction (or
/// deserialization) and never mutated afterwards. The serialized field names
/// are the contract with whatever reads the sink downstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawLogRecord")]
pub struct LogRecord {
    method: String,
    origin: String,
    pathname: String,
    headers: BTreeMap<String, String>,
    timestamp: String,
}

/// Unvalidated wire shape. `origin` and `headers` are optional on input.
#[derive(Deserialize)]
struct RawLogRecord {
    method: String,
    #[serde(default)]
    origin: String,
    pathname: String,
    #[serde(default)]
    headers: BTreeMap<String, String>,
    timestamp: String,
}

impl TryFrom<RawLogRecord> for LogRecord {
    type Error = EdgelogError;

    fn try_from(raw: RawLogRecord) -> Result<Self, Self::Error> {
        LogRecord::new(
            raw.method,
            raw.origin,
            raw.pathname,
            raw.headers,
            raw.timestamp,
        )
    }
}

impl LogRecord {
    /// Build a record from parts, normalizing header names to lower case.
    ///
    /// Fails if `method`, `pathname` or `timestamp` is empty, or if
    /// `timestamp` is not an RFC 3339 instant.
    pub fn new<H, K, V>(
        method: impl Into<String>,
        origin: impl Into<String>,
        pathname: impl Into<String>,
        headers: H,
        timestamp: impl Into<String>,
    ) -> Result<Self, EdgelogError>
    where
        H: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let method = method.into();
        let pathname = pathname.into();
        let timestamp = timestamp.into();

        if method.trim().is_empty() {
            return Err(EdgelogError::InvalidRecord("method is empty".into()));
        }
        if pathname.is_empty() {
            return Err(EdgelogError::InvalidRecord("pathname is empty".into()));
        }
        if timestamp.is_empty() {
            return Err(EdgelogError::InvalidRecord("timestamp is empty".into()));
        }
        DateTime::parse_from_rfc3339(&timestamp).map_err(|e| {
            EdgelogError::InvalidRecord(format!("timestamp {timestamp:?} is not RFC 3339: {e}"))
        })?;

        Ok(Self {
            method,
            origin: origin.into(),
            pathname,
            headers: normalize_headers(headers),
            timestamp,
        })
    }

    /// Build a record stamped with the current wall-clock time.
    pub fn capture<H, K, V>(
        method: impl Into<String>,
        origin: impl Into<String>,
        pathname: impl Into<String>,
        headers: H,
    ) -> Result<Self, EdgelogError>
    where
        H: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        Self::new(method, origin, pathname, headers, format_timestamp(Utc::now()))
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn pathname(&self) -> &str {
        &self.pathname
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    /// Compact single-line JSON, the form written to the sink.
    pub fn to_json_line(&self) -> Result<String, EdgelogError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Millisecond-precision UTC timestamp, e.g. `2024-01-01T00:00:00.000Z`.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Lower-case every key; a later duplicate overwrites an earlier one.
fn normalize_headers<H, K, V>(headers: H) -> BTreeMap<String, String>
where
    H: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: Into<String>,
{
    let mut out = BTreeMap::new();
    for (name, value) in headers {
        out.insert(name.as_ref().to_ascii_lowercase(), value.into());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const SAMPLE: &str = r#"{"method":"GET","origin":"https://example.com","pathname":"/api/samples","headers":{"accept":"application/json"},"timestamp":"2024-01-01T00:00:00.000Z"}"#;

    fn no_headers() -> Vec<(String, String)> {
        Vec::new()
    }

    #[test]
    fn parses_sample_record() {
        let record: LogRecord = serde_json::from_str(SAMPLE).unwrap();
        assert_eq!(record.method(), "GET");
        assert_eq!(record.origin(), "https://example.com");
        assert_eq!(record.pathname(), "/api/samples");
        assert_eq!(record.header("Accept"), Some("application/json"));
        assert_eq!(record.timestamp(), "2024-01-01T00:00:00.000Z");
    }

    #[test]
    fn json_line_keeps_field_order_and_values() {
        let record: LogRecord = serde_json::from_str(SAMPLE).unwrap();
        assert_eq!(record.to_json_line().unwrap(), SAMPLE);
    }

    #[test]
    fn header_names_are_lowercased_last_write_wins() {
        let record = LogRecord::new(
            "GET",
            "",
            "/",
            vec![("X-Trace", "first"), ("x-trace", "second")],
            "2024-01-01T00:00:00.000Z",
        )
        .unwrap();
        assert_eq!(record.headers().len(), 1);
        assert_eq!(record.header("x-trace"), Some("second"));
    }

    #[test]
    fn missing_optional_fields_default() {
        let json = r#"{"method":"POST","pathname":"/api/users","timestamp":"2024-05-01T10:00:00.123Z"}"#;
        let record: LogRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.origin(), "");
        assert!(record.headers().is_empty());
    }

    #[test]
    fn empty_method_is_rejected() {
        let err = LogRecord::new("", "", "/", no_headers(), "2024-01-01T00:00:00.000Z");
        assert!(matches!(err, Err(EdgelogError::InvalidRecord(_))));
    }

    #[test]
    fn empty_pathname_is_rejected() {
        let err = LogRecord::new("GET", "", "", no_headers(), "2024-01-01T00:00:00.000Z");
        assert!(matches!(err, Err(EdgelogError::InvalidRecord(_))));
    }

    #[test]
    fn bad_timestamp_is_rejected() {
        assert!(LogRecord::new("GET", "", "/", no_headers(), "").is_err());
        assert!(LogRecord::new("GET", "", "/", no_headers(), "yesterday").is_err());
    }

    #[test]
    fn deserialization_applies_validation() {
        let json = r#"{"method":"","pathname":"/","timestamp":"2024-01-01T00:00:00.000Z"}"#;
        assert!(serde_json::from_str::<LogRecord>(json).is_err());
        let json = r#"{"method":"GET","timestamp":"2024-01-01T00:00:00.000Z"}"#;
        assert!(serde_json::from_str::<LogRecord>(json).is_err());
    }

    #[test]
    fn capture_stamps_parseable_time() {
        let record = LogRecord::capture("GET", "http://localhost", "/", no_headers()).unwrap();
        assert!(DateTime::parse_from_rfc3339(record.timestamp()).is_ok());
        assert!(record.timestamp().ends_with('Z'));
    }

    #[test]
    fn format_timestamp_uses_millis_and_z() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(format_timestamp(at), "2024-01-01T00:00:00.000Z");
    }
}
