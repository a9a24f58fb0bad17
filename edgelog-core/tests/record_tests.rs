use edgelog_core::record::{LogRecord, format_timestamp};
use edgelog_core::EdgelogError;
use chrono::Utc;
use std::collections::HashMap;

// =============================================================================
// Wire format
// =============================================================================

#[test]
fn test_sample_record_reserializes_to_same_json() {
    let body = serde_json::json!({
        "method": "GET",
        "origin": "https://example.com",
        "pathname": "/api/samples",
        "headers": { "accept": "application/json" },
        "timestamp": "2024-01-01T00:00:00.000Z"
    });

    let record: LogRecord = serde_json::from_value(body.clone()).unwrap();
    let line = record.to_json_line().unwrap();
    assert!(!line.contains('\n'));

    let back: serde_json::Value = serde_json::from_str(&line).unwrap();
    assert_eq!(back, body);
}

#[test]
fn test_line_roundtrip_preserves_every_field() {
    let headers = HashMap::from([
        ("Host".to_string(), "example.com".to_string()),
        ("User-Agent".to_string(), "curl/8.0".to_string()),
    ]);
    let record = LogRecord::capture("POST", "https://example.com", "/api/users", headers).unwrap();

    let line = record.to_json_line().unwrap();
    let parsed: LogRecord = serde_json::from_str(&line).unwrap();

    assert_eq!(parsed, record);
    assert_eq!(parsed.header("host"), Some("example.com"));
    assert_eq!(parsed.header("USER-AGENT"), Some("curl/8.0"));
}

#[test]
fn test_serialized_field_names_are_stable() {
    let record = LogRecord::new(
        "DELETE",
        "http://localhost:3000",
        "/api/samples/1",
        Vec::<(String, String)>::new(),
        format_timestamp(Utc::now()),
    )
    .unwrap();

    let value = serde_json::to_value(&record).unwrap();
    let mut keys: Vec<&str> = value.as_object().unwrap().keys().map(String::as_str).collect();
    keys.sort();
    assert_eq!(keys, vec!["headers", "method", "origin", "pathname", "timestamp"]);
}

// =============================================================================
// Rejection
// =============================================================================

#[test]
fn test_non_object_payloads_are_rejected() {
    for body in ["[]", "\"GET\"", "42", "null", "{\"method\":1}"] {
        assert!(
            serde_json::from_str::<LogRecord>(body).is_err(),
            "{body} should not parse as a record"
        );
    }
}

#[test]
fn test_new_reports_invalid_record_error() {
    let err = LogRecord::new("GET", "", "/", Vec::<(String, String)>::new(), "not-a-time")
        .unwrap_err();
    assert!(matches!(err, EdgelogError::InvalidRecord(_)));
    assert!(!err.is_persistence_fault());
}
