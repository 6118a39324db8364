//! Shared HTTP plumbing for the remote sources.
//!
//! Every adapter goes through [`HttpClient`]: one blocking `reqwest` client
//! with the configured timeout and user agent, a fixed pause after every
//! request, and status classification into [`SourceError`]. Retrying is the
//! engine's job (`RetryPolicy`), so nothing here loops.

use std::thread;
use std::time::Duration;

use serde_json::Value;
use uaplaces_config::settings::FetchSettings;
use uaplaces_recon::source::SourceError;

use crate::exit_codes;
use crate::CliError;

// ── Constants ───────────────────────────────────────────────────────

/// Response bodies are quoted in errors up to this many bytes.
const BODY_SNIPPET: usize = 200;

// ── HttpClient ──────────────────────────────────────────────────────

pub(crate) struct HttpClient {
    http: reqwest::blocking::Client,
    source_name: &'static str,
    pause: Duration,
}

impl HttpClient {
    pub(crate) fn new(source_name: &'static str, fetch: &FetchSettings) -> Result<Self, CliError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(fetch.timeout())
            .user_agent(fetch.user_agent.clone())
            .build()
            .map_err(|e| CliError {
                code: exit_codes::EXIT_FETCH_CLIENT,
                message: format!("failed to build {source_name} HTTP client: {e}"),
                hint: None,
            })?;
        Ok(Self { http, source_name, pause: fetch.pause() })
    }

    pub(crate) fn source_name(&self) -> &'static str {
        self.source_name
    }

    pub(crate) fn get_json(&self, endpoint: &str, query: &[(&str, &str)]) -> Result<Value, SourceError> {
        self.send(self.http.get(endpoint).query(query))
    }

    pub(crate) fn post_json(&self, endpoint: &str, query: &[(&str, &str)]) -> Result<Value, SourceError> {
        self.send(self.http.post(endpoint).query(query))
    }

    fn send(&self, request: reqwest::blocking::RequestBuilder) -> Result<Value, SourceError> {
        let result = self.send_once(request);
        if !self.pause.is_zero() {
            thread::sleep(self.pause);
        }
        result
    }

    fn send_once(&self, request: reqwest::blocking::RequestBuilder) -> Result<Value, SourceError> {
        let resp = request
            .send()
            .map_err(|e| SourceError::transient(self.source_name, e.to_string()))?;
        let status = resp.status().as_u16();
        let text = resp
            .text()
            .map_err(|e| SourceError::transient(self.source_name, format!("failed to read response body: {e}")))?;

        // Retryable: 429, 5xx
        if status == 429 || status >= 500 {
            return Err(SourceError::transient(
                self.source_name,
                format!("HTTP {status}: {}", snippet(&text)),
            ));
        }
        if status >= 400 {
            return Err(SourceError::permanent(
                self.source_name,
                format!("HTTP {status}: {}", snippet(&text)),
            ));
        }

        let trimmed = text.trim_start_matches('\u{feff}');
        serde_json::from_str(trimmed).map_err(|e| {
            SourceError::permanent(
                self.source_name,
                format!("failed to parse JSON response: {e} (body: {})", snippet(trimmed)),
            )
        })
    }
}

fn snippet(text: &str) -> &str {
    let mut end = text.len().min(BODY_SNIPPET);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Check an endpoint before any request goes out.
pub(crate) fn parse_endpoint(name: &str, endpoint: &str) -> Result<String, CliError> {
    let url = url::Url::parse(endpoint).map_err(|e| CliError {
        code: exit_codes::EXIT_FETCH_CLIENT,
        message: format!("invalid {name} endpoint '{endpoint}': {e}"),
        hint: Some("check [endpoints] in the settings file".into()),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(CliError {
            code: exit_codes::EXIT_FETCH_CLIENT,
            message: format!("{name} endpoint must be http or https, got '{}'", url.scheme()),
            hint: None,
        });
    }
    Ok(url.to_string())
}

// ── JSON helpers ────────────────────────────────────────────────────

/// Non-empty trimmed string, whether the source sent it as a string or a number.
pub(crate) fn text_of(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
pub(crate) fn test_settings() -> FetchSettings {
    FetchSettings { pause_ms: 0, timeout_secs: 5, ..FetchSettings::default() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    #[test]
    fn test_success_parses_json() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/api").query_param("q", "1");
            then.status(200).body("\u{feff}{\"ok\": true}");
        });

        let client = HttpClient::new("test", &test_settings()).unwrap();
        let body = client.get_json(&server.url("/api"), &[("q", "1")]).unwrap();
        assert_eq!(body, json!({"ok": true}));
    }

    #[test]
    fn test_server_errors_are_transient() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/busy");
            then.status(504).body("gateway timeout");
        });
        server.mock(|when, then| {
            when.method(GET).path("/limited");
            then.status(429).body("slow down");
        });

        let client = HttpClient::new("test", &test_settings()).unwrap();
        let err = client.get_json(&server.url("/busy"), &[]).unwrap_err();
        assert!(err.retryable);
        assert!(err.message.contains("504"));
        assert!(client.get_json(&server.url("/limited"), &[]).unwrap_err().retryable);
    }

    #[test]
    fn test_client_errors_are_permanent() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/graphql");
            then.status(400).body("bad query");
        });

        let client = HttpClient::new("test", &test_settings()).unwrap();
        let err = client.post_json(&server.url("/graphql"), &[]).unwrap_err();
        assert!(!err.retryable);
        assert_eq!(err.source, "test");
    }

    #[test]
    fn test_invalid_json_is_permanent() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/html");
            then.status(200).body("<html>maintenance</html>");
        });

        let client = HttpClient::new("test", &test_settings()).unwrap();
        let err = client.get_json(&server.url("/html"), &[]).unwrap_err();
        assert!(!err.retryable);
        assert!(err.message.contains("maintenance"));
    }

    #[test]
    fn test_endpoint_validation() {
        assert!(parse_endpoint("overpass", "https://overpass-api.de/api/interpreter").is_ok());
        let err = parse_endpoint("overpass", "not a url").unwrap_err();
        assert_eq!(err.code, exit_codes::EXIT_FETCH_CLIENT);
        assert!(parse_endpoint("overpass", "ftp://example.org/").is_err());
    }

    #[test]
    fn test_text_of_accepts_numbers() {
        assert_eq!(text_of(Some(&json!(" UA01 "))), Some("UA01".into()));
        assert_eq!(text_of(Some(&json!(42))), Some("42".into()));
        assert_eq!(text_of(Some(&json!(""))), None);
        assert_eq!(text_of(Some(&json!(null))), None);
        assert_eq!(text_of(None), None);
    }
}
