use edgelog_core::{EdgelogError, LogRecord};
use edgelog_observability::redact::HeaderRedactor;
use http::{HeaderMap, Method, Uri, header};

/// Build the log record for an inbound request, stamped with the current time.
pub fn capture_record(
    method: &Method,
    uri: &Uri,
    headers: &HeaderMap,
    redactor: &HeaderRedactor,
) -> Result<LogRecord, EdgelogError> {
    let captured = headers.iter().map(|(name, value)| {
        let raw = match value.to_str() {
            Ok(v) => v.to_string(),
            Err(_) => String::from_utf8_lossy(value.as_bytes()).into_owned(),
        };
        let logged = redactor.scrub(name.as_str(), &raw).to_string();
        (name.as_str().to_string(), logged)
    });

    LogRecord::capture(method.as_str(), origin(uri, headers), uri.path(), captured)
}

/// `scheme://host` as the client addressed it, or empty when no host is known.
///
/// Behind a load balancer the scheme comes from `x-forwarded-proto`.
pub fn origin(uri: &Uri, headers: &HeaderMap) -> String {
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .or_else(|| uri.scheme_str())
        .unwrap_or("http");

    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .or_else(|| uri.authority().map(|a| a.as_str()));

    match host {
        Some(host) => format!("{scheme}://{host}"),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.append(*k, HeaderValue::from_static(*v));
        }
        map
    }

    #[test]
    fn origin_from_host_header() {
        let uri: Uri = "/api/samples".parse().unwrap();
        let h = headers(&[("host", "example.com")]);
        assert_eq!(origin(&uri, &h), "http://example.com");
    }

    #[test]
    fn origin_prefers_forwarded_proto() {
        let uri: Uri = "/".parse().unwrap();
        let h = headers(&[("host", "example.com"), ("x-forwarded-proto", "https, http")]);
        assert_eq!(origin(&uri, &h), "https://example.com");
    }

    #[test]
    fn origin_falls_back_to_absolute_uri() {
        let uri: Uri = "https://api.example.com:8443/v1".parse().unwrap();
        assert_eq!(origin(&uri, &HeaderMap::new()), "https://api.example.com:8443");
    }

    #[test]
    fn origin_is_empty_without_host() {
        let uri: Uri = "/".parse().unwrap();
        assert_eq!(origin(&uri, &HeaderMap::new()), "");
    }

    #[test]
    fn capture_copies_method_path_and_headers() {
        let uri: Uri = "/api/samples?page=2".parse().unwrap();
        let h = headers(&[("host", "example.com"), ("accept", "application/json")]);
        let record = capture_record(&Method::GET, &uri, &h, &HeaderRedactor::default()).unwrap();

        assert_eq!(record.method(), "GET");
        assert_eq!(record.pathname(), "/api/samples");
        assert_eq!(record.origin(), "http://example.com");
        assert_eq!(record.header("accept"), Some("application/json"));
        assert_eq!(record.headers().len(), 2);
    }

    #[test]
    fn repeated_header_keeps_last_value() {
        let uri: Uri = "/".parse().unwrap();
        let h = headers(&[("x-tag", "one"), ("x-tag", "two")]);
        let record = capture_record(&Method::GET, &uri, &h, &HeaderRedactor::default()).unwrap();
        assert_eq!(record.header("x-tag"), Some("two"));
    }

    #[test]
    fn redacted_headers_are_masked() {
        let uri: Uri = "/".parse().unwrap();
        let h = headers(&[("authorization", "Bearer secret"), ("accept", "*/*")]);
        let redactor = HeaderRedactor::new(["authorization"]);
        let record = capture_record(&Method::POST, &uri, &h, &redactor).unwrap();
        assert_eq!(record.header("authorization"), Some("[REDACTED]"));
        assert_eq!(record.header("accept"), Some("*/*"));
    }

    #[test]
    fn non_utf8_header_value_is_captured_lossily() {
        let uri: Uri = "/".parse().unwrap();
        let mut h = HeaderMap::new();
        h.insert("x-bin", HeaderValue::from_bytes(b"caf\xe9").unwrap());
        let record = capture_record(&Method::GET, &uri, &h, &HeaderRedactor::default()).unwrap();
        assert!(record.header("x-bin").unwrap().starts_with("caf"));
    }
}
