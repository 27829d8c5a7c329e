//! Network sink: POSTs each record as JSON to a collector endpoint.

use super::Sink;
use crate::record::FieldRecord;
use crate::utils::config::DEFAULT_SINK_TIMEOUT;
use crate::utils::error::SinkError;
use log::debug;
use reqwest::blocking::Client;
use std::time::Duration;

/// Delivers records to an HTTP(S) endpoint
pub struct HttpSink {
    client: Client,
    endpoint: String,
    name: String,
}

impl HttpSink {
    /// Create a sink with the default timeout
    pub fn new(endpoint: impl Into<String>) -> Result<Self, SinkError> {
        Self::with_timeout(endpoint, DEFAULT_SINK_TIMEOUT)
    }

    /// Create a sink with a custom request timeout
    ///
    /// # Errors
    /// * `SinkError::InvalidEndpoint` - URL is empty or not http(s)
    /// * `SinkError::RequestFailed` - HTTP client cannot be built
    pub fn with_timeout(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, SinkError> {
        let endpoint = endpoint.into();
        validate_endpoint(&endpoint)?;

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(SinkError::RequestFailed)?;

        Ok(Self {
            client,
            name: format!("http:{}", endpoint),
            endpoint,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Sink for HttpSink {
    fn emit(&self, record: &FieldRecord) -> Result<(), SinkError> {
        debug!(
            "Posting record {} to {}",
            record.context_id, self.endpoint
        );

        let response = self
            .client
            .post(&self.endpoint)
            .json(record)
            .send()
            .map_err(SinkError::RequestFailed)?;

        if !response.status().is_success() {
            return Err(SinkError::Rejected(format!(
                "HTTP {}: {}",
                response.status(),
                response.text().unwrap_or_default()
            )));
        }

        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Endpoint must be a non-empty http:// or https:// URL
pub fn validate_endpoint(endpoint: &str) -> Result<(), SinkError> {
    if endpoint.is_empty() {
        return Err(SinkError::InvalidEndpoint(
            "Endpoint URL cannot be empty".to_string(),
        ));
    }

    if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
        return Err(SinkError::InvalidEndpoint(format!(
            "Endpoint must start with http:// or https:// ({})",
            endpoint
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ContextId;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    /// Accept one request, reply with `status_line`, hand back the raw body
    fn one_shot_server(status_line: &'static str) -> (String, thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/records", listener.local_addr().unwrap());

        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 4096];

            // Read headers, then as much body as Content-Length announces
            let body_start = loop {
                let n = stream.read(&mut buf).unwrap();
                assert!(n > 0, "client closed before sending headers");
                raw.extend_from_slice(&buf[..n]);
                if let Some(pos) = raw.windows(4).position(|w| w == b"\r\n\r\n") {
                    break pos + 4;
                }
            };
            let headers = String::from_utf8_lossy(&raw[..body_start]).to_lowercase();
            let length: usize = headers
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .map(|v| v.trim().parse().unwrap())
                .unwrap_or(0);
            while raw.len() < body_start + length {
                let n = stream.read(&mut buf).unwrap();
                assert!(n > 0, "client closed before sending body");
                raw.extend_from_slice(&buf[..n]);
            }

            let response = format!("{}\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok", status_line);
            stream.write_all(response.as_bytes()).unwrap();
            String::from_utf8_lossy(&raw[body_start..body_start + length]).to_string()
        });

        (url, handle)
    }

    fn sample() -> FieldRecord {
        let mut record = FieldRecord::new(ContextId::from(77));
        record.set("controller", "UsersController");
        record
    }

    #[test]
    fn test_validate_endpoint() {
        assert!(validate_endpoint("http://localhost:9200").is_ok());
        assert!(validate_endpoint("https://logs.example.com/ingest").is_ok());
        assert!(validate_endpoint("").is_err());
        assert!(validate_endpoint("ftp://localhost").is_err());
        assert!(HttpSink::new("udp://collector").is_err());
    }

    #[test]
    fn test_emit_posts_json() {
        let (url, server) = one_shot_server("HTTP/1.1 200 OK");
        let sink = HttpSink::new(url).unwrap();

        sink.emit(&sample()).unwrap();

        let body: serde_json::Value = serde_json::from_str(&server.join().unwrap()).unwrap();
        assert_eq!(body["context_id"], 77);
        assert_eq!(body["fields"]["controller"], "UsersController");
    }

    #[test]
    fn test_emit_non_success_is_rejected() {
        let (url, server) = one_shot_server("HTTP/1.1 503 Service Unavailable");
        let sink = HttpSink::new(url).unwrap();

        let result = sink.emit(&sample());
        server.join().unwrap();

        assert!(matches!(result, Err(SinkError::Rejected(_))));
    }
}
