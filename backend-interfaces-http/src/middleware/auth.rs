use std::io::Read;

use anyhow::{anyhow, Result};
use axum::http::HeaderMap;
use flate2::read::GzDecoder;

use backend_domain::{AuditIngestEntry, AuditIngestEnvelope, RuntimeConfig};

pub const AUDIT_SCHEMA_VERSION: &str = "v1";

pub fn authorize(config: &RuntimeConfig, headers: &HeaderMap) -> bool {
    if let Some(api_token) = &config.api_token {
        return extract_bearer(headers)
            .map(|v| v == *api_token)
            .unwrap_or(false);
    }
    true
}

pub fn parse_audit_entries(headers: &HeaderMap, body: &[u8]) -> Result<Vec<AuditIngestEntry>> {
    let content = maybe_gunzip(headers, body)?;
    let envelope: AuditIngestEnvelope = serde_json::from_str(&content)?;
    if envelope.schema_version.trim() != AUDIT_SCHEMA_VERSION {
        return Err(anyhow!(
            "unsupported schemaVersion '{}', expected '{}'",
            envelope.schema_version,
            AUDIT_SCHEMA_VERSION
        ));
    }
    Ok(envelope.entries)
}

fn maybe_gunzip(headers: &HeaderMap, body: &[u8]) -> Result<String> {
    if let Some(encoding) = headers.get("Content-Encoding") {
        if encoding.to_str().unwrap_or("") == "gzip" {
            let mut decoder = GzDecoder::new(body);
            let mut out = String::new();
            decoder.read_to_string(&mut out)?;
            return Ok(out);
        }
    }
    Ok(String::from_utf8(body.to_vec())?)
}

fn extract_bearer(headers: &HeaderMap) -> Option<String> {
    let value = headers.get("Authorization")?.to_str().ok()?.trim();
    let token = value.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        return None;
    }
    Some(token.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use axum::http::HeaderValue;
    use flate2::write::GzEncoder;
    use flate2::Compression;

    fn config(token: Option<&str>) -> RuntimeConfig {
        RuntimeConfig {
            bind_addr: "127.0.0.1:0".to_string(),
            api_token: token.map(ToString::to_string),
            max_body_bytes: 1024,
            request_timeout_seconds: 5,
        }
    }

    #[test]
    fn authorize_requires_matching_bearer_when_token_set() {
        let mut headers = HeaderMap::new();
        assert!(authorize(&config(None), &headers));
        assert!(!authorize(&config(Some("secret")), &headers));

        headers.insert("Authorization", HeaderValue::from_static("Bearer wrong"));
        assert!(!authorize(&config(Some("secret")), &headers));

        headers.insert("Authorization", HeaderValue::from_static("Bearer  secret "));
        assert!(authorize(&config(Some("secret")), &headers));

        headers.insert("Authorization", HeaderValue::from_static("Basic secret"));
        assert!(!authorize(&config(Some("secret")), &headers));
    }

    #[test]
    fn parses_plain_and_gzip_bodies() {
        let body = br#"{"schemaVersion":"v1","entries":[{"action":"ATTENDANCE_UPDATE","meta":{"studentId":"s1"}}]}"#;
        let plain = parse_audit_entries(&HeaderMap::new(), body).expect("plain body");
        assert_eq!(plain.len(), 1);

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(body).expect("compress");
        let compressed = encoder.finish().expect("finish");
        let mut headers = HeaderMap::new();
        headers.insert("Content-Encoding", HeaderValue::from_static("gzip"));
        let gz = parse_audit_entries(&headers, &compressed).expect("gzip body");
        assert_eq!(gz[0].action, "ATTENDANCE_UPDATE");
    }

    #[test]
    fn rejects_unknown_schema_version() {
        let body = br#"{"schemaVersion":"v0","entries":[]}"#;
        let err = parse_audit_entries(&HeaderMap::new(), body).expect_err("reject schema");
        assert!(err.to_string().contains("schemaVersion"));
    }
}
